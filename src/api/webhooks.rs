use aide::axum::routing::post_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::Json;
use log::info;
use schemars::JsonSchema;
use serde::Serialize;

use crate::database::AppState;
use crate::error::ServiceResult;
use crate::request_state::RequestState;
use crate::tipping;

use super::dto::TipStatusDto;
use super::{JsonBody, Validate};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/webhooks/midtrans",
            post_with(midtrans_notification, midtrans_notification_docs),
        )
        .with_state(app_state)
}

// Notifications are checked by signature, not by shape.
impl Validate for serde_json::Value {}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct NotificationReceivedDto {
    pub received: bool,
    /// New status of the tip, absent when the notification changed nothing.
    pub status: Option<TipStatusDto>,
}

async fn midtrans_notification(
    mut state: RequestState,
    payload: JsonBody<serde_json::Value>,
) -> ServiceResult<Json<NotificationReceivedDto>> {
    let tip = tipping::handle_notification(&mut state.db, payload.0).await?;

    if let Some(tip) = &tip {
        info!("Tip {} is now {}", tip.order_id, tip.status.as_str());
    }

    Ok(Json(NotificationReceivedDto {
        received: true,
        status: tip.as_ref().map(|tip| (&tip.status).into()),
    }))
}

fn midtrans_notification_docs(op: TransformOperation) -> TransformOperation {
    op.description("Payment notification of the gateway. Every notification is logged.")
        .tag("webhooks")
        .response::<200, Json<NotificationReceivedDto>>()
        .response_with::<400, (), _>(|res| res.description("Malformed notification!"))
        .response_with::<403, (), _>(|res| res.description("Invalid signature!"))
        .response_with::<404, (), _>(|res| res.description("Unknown order id!"))
}
