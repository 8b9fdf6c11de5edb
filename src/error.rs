use aide::OperationOutput;
use axum::{http::StatusCode, response::IntoResponse, Json};
use log::error;
use schemars::JsonSchema;
use serde_json::json;

/// Represent errors in the application
///
/// All `ServiceError`s can be transformed to http errors. The `code` of the
/// response body is stable and meant for clients, the message for humans.
#[derive(Debug, Clone, PartialEq, JsonSchema)]
pub enum ServiceError {
    /// No (valid) session was presented.
    Unauthorized(&'static str),
    /// The session does not grant access to the requested resource.
    Forbidden,
    /// The request was malformed, the message names the first violation.
    Validation(String),
    NotFound(&'static str),
    /// A precondition on venue, qr code or payment state does not hold.
    State(String),
    InternalServerError(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn state(message: impl Into<String>) -> Self {
        ServiceError::State(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::Unauthorized(_) => "AUTH_REQUIRED",
            ServiceError::Forbidden => "FORBIDDEN",
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::State(_) => "STATE_ERROR",
            ServiceError::InternalServerError(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ServiceError::Forbidden => StatusCode::FORBIDDEN,
            ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::State(_) => StatusCode::BAD_REQUEST,
            ServiceError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

impl std::error::Error for ServiceError {}

/// Helper for `ServiceError` result
pub type ServiceResult<T> = Result<T, ServiceError>;

impl OperationOutput for ServiceError {
    type Inner = String;
}
impl IntoResponse for ServiceError {
    fn into_response(self) -> axum::response::Response {
        let message = match self {
            ServiceError::Unauthorized(message) => message.to_owned(),
            ServiceError::Forbidden => "Access denied".to_owned(),
            ServiceError::Validation(ref message) => message.clone(),
            ServiceError::NotFound(message) => message.to_owned(),
            ServiceError::State(ref message) => message.clone(),
            ServiceError::InternalServerError(ref cause) => {
                error!("Internal server error: {cause}");
                "Internal server error".to_owned()
            }
        };

        (
            self.status_code(),
            Json(json!({
                "code": self.code(),
                "message": message,
            })),
        )
            .into_response()
    }
}

impl From<sqlx::Error> for ServiceError {
    fn from(error: sqlx::Error) -> Self {
        ServiceError::InternalServerError(format!("Database error: {error}"))
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(error: reqwest::Error) -> Self {
        ServiceError::InternalServerError(format!("Payment gateway error: {error}"))
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(error: serde_json::Error) -> Self {
        ServiceError::InternalServerError(format!("Json error: {error}"))
    }
}

impl From<block_modes::BlockModeError> for ServiceError {
    fn from(error: block_modes::BlockModeError) -> Self {
        ServiceError::InternalServerError(format!("Decryption error: {error}"))
    }
}

impl From<block_modes::InvalidKeyIvLength> for ServiceError {
    fn from(error: block_modes::InvalidKeyIvLength) -> Self {
        ServiceError::InternalServerError(format!("Cipher setup error: {error}"))
    }
}

impl From<base64::DecodeError> for ServiceError {
    fn from(error: base64::DecodeError) -> Self {
        ServiceError::InternalServerError(format!("Base64 error: {error}"))
    }
}

impl From<qrcode::types::QrError> for ServiceError {
    fn from(error: qrcode::types::QrError) -> Self {
        ServiceError::InternalServerError(format!("Qr code error: {error}"))
    }
}

impl From<image::ImageError> for ServiceError {
    fn from(error: image::ImageError) -> Self {
        ServiceError::InternalServerError(format!("Image error: {error}"))
    }
}

impl From<std::io::Error> for ServiceError {
    fn from(error: std::io::Error) -> Self {
        ServiceError::InternalServerError(format!("IO error: {error}"))
    }
}

#[cfg(feature = "mail")]
impl From<lettre::error::Error> for ServiceError {
    fn from(error: lettre::error::Error) -> Self {
        ServiceError::InternalServerError(format!("Mail error: {error}"))
    }
}

#[cfg(feature = "mail")]
impl From<lettre::transport::smtp::Error> for ServiceError {
    fn from(error: lettre::transport::smtp::Error) -> Self {
        ServiceError::InternalServerError(format!("Smtp error: {error}"))
    }
}

#[cfg(feature = "mail")]
impl From<lettre::address::AddressError> for ServiceError {
    fn from(error: lettre::address::AddressError) -> Self {
        ServiceError::InternalServerError(format!("Mail address error: {error}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(ServiceError::Unauthorized("x").code(), "AUTH_REQUIRED");
        assert_eq!(ServiceError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(
            ServiceError::validation("Label is required").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::state("inactive").code(), "STATE_ERROR");
        assert_eq!(
            ServiceError::InternalServerError("boom".to_owned()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
