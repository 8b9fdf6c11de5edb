use aide::axum::ApiRouter;
use aide::gen::GenContext;
use aide::openapi::Operation;
use aide::OperationInput;
use axum::extract::{FromRequest, FromRequestParts, Query, Request};
use axum::http::request::Parts;
use axum::{async_trait, Json};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};

pub mod admin;
pub mod auth;
pub mod dto;
pub mod health;
pub mod payouts;
pub mod qr_codes;
pub mod staff;
pub mod tips;
pub mod venues;
pub mod webhooks;

pub fn init(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .merge(auth::router(app_state.clone()))
        .merge(venues::router(app_state.clone()))
        .merge(staff::router(app_state.clone()))
        .merge(qr_codes::router(app_state.clone()))
        .merge(tips::router(app_state.clone()))
        .merge(webhooks::router(app_state.clone()))
        .merge(payouts::router(app_state.clone()))
        .merge(admin::router(app_state.clone()))
        .merge(health::router(app_state))
}

/// Field rules of a request body or query. Reports the first violation.
pub trait Validate {
    fn validate(&self) -> ServiceResult<()> {
        Ok(())
    }
}

pub fn require_min_chars(value: &str, min: usize, message: &'static str) -> ServiceResult<()> {
    if value.trim().chars().count() < min {
        return Err(ServiceError::validation(message));
    }
    Ok(())
}

pub fn require_email(value: &str) -> ServiceResult<()> {
    let valid = match value.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !value.contains(char::is_whitespace)
        }
        None => false,
    };
    if !valid {
        return Err(ServiceError::validation("Invalid email address"));
    }
    Ok(())
}

pub fn require_url(value: &str) -> ServiceResult<()> {
    if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(ServiceError::validation("Invalid URL"));
    }
    Ok(())
}

/// Json body that reports malformed input as validation error.
pub struct JsonBody<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ServiceError::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(JsonBody(value))
    }
}

impl<T: JsonSchema> OperationInput for JsonBody<T> {
    fn operation_input(ctx: &mut GenContext, operation: &mut Operation) {
        Json::<T>::operation_input(ctx, operation);
    }
}

/// Query string that reports malformed input as validation error.
pub struct QueryParams<T>(pub T);

#[async_trait]
impl<S, T> FromRequestParts<S> for QueryParams<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Query(value) = Query::<T>::from_request_parts(parts, state)
            .await
            .map_err(|rejection| ServiceError::validation(rejection.body_text()))?;
        value.validate()?;
        Ok(QueryParams(value))
    }
}

impl<T: JsonSchema> OperationInput for QueryParams<T> {
    fn operation_input(ctx: &mut GenContext, operation: &mut Operation) {
        Query::<T>::operation_input(ctx, operation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_email() {
        assert!(require_email("manager@warung.id").is_ok());
        assert!(require_email("manager@warung").is_err());
        assert!(require_email("@warung.id").is_err());
        assert!(require_email("man ager@warung.id").is_err());
        assert!(require_email("manager").is_err());
    }

    #[test]
    fn test_require_min_chars() {
        assert!(require_min_chars("ab", 2, "too short").is_ok());
        assert_eq!(
            require_min_chars(" a ", 2, "too short"),
            Err(ServiceError::validation("too short"))
        );
    }
}
