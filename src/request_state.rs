use std::sync::Arc;

use aide::OperationInput;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::TypedHeader;
use headers::{authorization::Bearer, Authorization, Cookie};

use crate::{
    database::{AppState, DatabaseConnection},
    error::{ServiceError, ServiceResult},
    gateway::PaymentGateway,
    models::{Role, Session, User, Venue},
    SESSION_COOKIE_NAME,
};

/// Per request context: a database connection, the caller's session and the
/// payment gateway.
pub struct RequestState {
    pub db: DatabaseConnection,
    pub session: Option<Session>,
    pub gateway: Arc<dyn PaymentGateway>,
}

#[async_trait]
impl<S> FromRequestParts<S> for RequestState
where
    AppState: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let state = AppState::from_ref(state);

        let connection = state
            .pool
            .acquire()
            .await
            .map_err(|err| ServiceError::InternalServerError(err.to_string()))?;
        let mut db = DatabaseConnection { connection };

        let session_token = if let Ok(TypedHeader(Authorization(bearer))) =
            parts.extract::<TypedHeader<Authorization<Bearer>>>().await
        {
            Some(bearer.token().to_owned())
        } else if let Ok(TypedHeader(cookie)) = parts.extract::<TypedHeader<Cookie>>().await {
            cookie.get(SESSION_COOKIE_NAME).map(str::to_owned)
        } else {
            None
        };

        let session = match session_token {
            Some(token) => db.get_session_by_session_token(token).await?,
            None => None,
        };

        Ok(Self {
            db,
            session,
            gateway: state.gateway.clone(),
        })
    }
}

impl OperationInput for RequestState {}

impl RequestState {
    pub fn session_require(&self) -> ServiceResult<User> {
        match &self.session {
            Some(session) => Ok(session.user.clone()),
            None => Err(ServiceError::Unauthorized("Authentication required")),
        }
    }

    pub fn session_require_admin(&self) -> ServiceResult<User> {
        let user = self.session_require()?;
        if user.role != Role::Admin {
            return Err(ServiceError::Forbidden);
        }
        Ok(user)
    }

    /// Load a venue the caller manages. Admins may access every venue.
    pub async fn venue_require(&mut self, venue_id: u64) -> ServiceResult<Venue> {
        let user = self.session_require()?;

        let venue = self
            .db
            .get_venue_by_id(venue_id)
            .await?
            .ok_or(ServiceError::NotFound("Venue not found"))?;

        if user.role == Role::Admin || (user.role == Role::Manager && venue.manager_id == user.id) {
            return Ok(venue);
        }

        Err(ServiceError::Forbidden)
    }
}
