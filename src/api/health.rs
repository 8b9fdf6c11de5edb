use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use aide::OperationOutput;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Utc};
use log::error;
use schemars::JsonSchema;
use serde::Serialize;

use crate::database::{AppState, DatabaseConnection};
use crate::error::ServiceResult;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/health", get_with(get_health, get_health_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct HealthDto {
    pub timestamp: DateTime<Utc>,
    pub connected: bool,
    pub user_count: Option<i64>,
    pub venue_count: Option<i64>,
    pub error: Option<String>,
}

impl HealthDto {
    pub fn healthy(&self) -> bool {
        self.connected && self.user_count.is_some() && self.venue_count.is_some()
    }
}

impl OperationOutput for HealthDto {
    type Inner = HealthDto;
}
impl IntoResponse for HealthDto {
    fn into_response(self) -> axum::response::Response {
        let status = if self.healthy() {
            StatusCode::OK
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        (status, Json(self)).into_response()
    }
}

async fn count_records(db: &mut DatabaseConnection) -> ServiceResult<(i64, i64)> {
    let users = db.count_users().await?;
    let venues = db.count_venues().await?;
    Ok((users, venues))
}

/// Does not use `RequestState`, a failing pool must still produce a report.
async fn get_health(State(app_state): State<AppState>) -> HealthDto {
    let mut health = HealthDto {
        timestamp: Utc::now(),
        connected: false,
        user_count: None,
        venue_count: None,
        error: None,
    };

    let mut db = match app_state.connection().await {
        Ok(db) => db,
        Err(e) => {
            error!("Health check could not acquire a connection: {:?}", e);
            health.error = Some(e.to_string());
            return health;
        }
    };

    match db.ping().await {
        Ok(()) => health.connected = true,
        Err(e) => {
            health.error = Some(e.to_string());
            return health;
        }
    }

    match count_records(&mut db).await {
        Ok((users, venues)) => {
            health.user_count = Some(users);
            health.venue_count = Some(venues);
        }
        Err(e) => health.error = Some(e.to_string()),
    }

    health
}

fn get_health_docs(op: TransformOperation) -> TransformOperation {
    op.description("Database round trip with user and venue counts.")
        .tag("health")
        .response::<200, Json<HealthDto>>()
        .response_with::<500, Json<HealthDto>, _>(|res| res.description("The database is not reachable!"))
}
