use aide::axum::routing::{delete_with, get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use aide::OperationOutput;
use axum::http::{header, StatusCode};
use axum::response::IntoResponse;
use axum::Json;
use chrono::{DateTime, Duration, Utc};
use headers::{HeaderMap, HeaderValue};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crypto::{generate_numeric_code, password_hash_create, password_hash_verify};
use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::request_state::RequestState;
use crate::{models, SESSION_COOKIE_NAME};

use super::dto::{RoleDto, VenueTypeDto};
use super::{require_email, require_min_chars, JsonBody, Validate};

const OTP_LENGTH: usize = 6;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/auth/register", post_with(auth_register, auth_register_docs))
        .api_route(
            "/auth/password",
            post_with(auth_password_based, auth_password_based_docs),
        )
        .api_route("/auth/otp/send", post_with(auth_otp_send, auth_otp_send_docs))
        .api_route(
            "/auth/otp/verify",
            post_with(auth_otp_verify, auth_otp_verify_docs),
        )
        .api_route(
            "/auth/account",
            get_with(auth_get_account, auth_get_account_docs),
        )
        .api_route("/auth", delete_with(auth_delete, auth_delete_docs))
        .with_state(app_state)
}

fn session_valid_until() -> DateTime<Utc> {
    Utc::now() + Duration::hours(12)
}

fn otp_valid_until() -> DateTime<Utc> {
    Utc::now() + Duration::minutes(10)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct AuthTokenDto {
    pub token: String,
}

impl OperationOutput for AuthTokenDto {
    type Inner = AuthTokenDto;
}
impl IntoResponse for AuthTokenDto {
    fn into_response(self) -> axum::response::Response {
        let mut header = HeaderMap::new();
        if let Ok(cookie) = HeaderValue::from_str(&format!(
            "{}={}; Path=/api/v1; HttpOnly; SameSite=Lax",
            SESSION_COOKIE_NAME, self.token
        )) {
            header.insert(header::SET_COOKIE, cookie);
        }
        (StatusCode::OK, header, Json(self)).into_response()
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct UserDto {
    pub id: u64,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: RoleDto,
}

impl From<&models::User> for UserDto {
    fn from(value: &models::User) -> Self {
        Self {
            id: value.id,
            email: value.email.clone(),
            phone: value.phone.clone(),
            role: (&value.role).into(),
        }
    }
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct RegisterDto {
    pub email: String,
    pub password: String,
    pub venue_name: String,
    pub venue_type: VenueTypeDto,
}

impl Validate for RegisterDto {
    fn validate(&self) -> ServiceResult<()> {
        require_email(&self.email)?;
        if self.password.chars().count() < 6 {
            return Err(ServiceError::validation(
                "Password must be at least 6 characters",
            ));
        }
        require_min_chars(
            &self.venue_name,
            2,
            "Venue name must be at least 2 characters",
        )
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct RegistrationDto {
    pub user_id: u64,
    pub venue_id: u64,
}

async fn auth_register(
    mut state: RequestState,
    form: JsonBody<RegisterDto>,
) -> ServiceResult<Json<RegistrationDto>> {
    let form = form.0;
    let email = form.email.trim().to_lowercase();

    let (user, venue) = state
        .db
        .register_manager(
            &email,
            password_hash_create(&form.password)?,
            form.venue_name.trim(),
            form.venue_type.into(),
        )
        .await?;
    info!("Registered venue {} for manager {}", venue.id, user.id);

    #[cfg(feature = "mail")]
    if let Err(e) = crate::mail::send_registration_mail(&email, &venue.name).await {
        log::warn!("Could not send mail: {:?}", e);
    }

    Ok(Json(RegistrationDto {
        user_id: user.id,
        venue_id: venue.id,
    }))
}

fn auth_register_docs(op: TransformOperation) -> TransformOperation {
    op.description("Register a venue manager together with a new draft venue.")
        .tag("auth")
        .response::<200, Json<RegistrationDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Invalid input or the email is already registered!")
        })
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct AuthPasswordBasedDto {
    pub email: String,
    pub password: String,
}

impl Validate for AuthPasswordBasedDto {}

async fn auth_password_based(
    mut state: RequestState,
    form: JsonBody<AuthPasswordBasedDto>,
) -> ServiceResult<AuthTokenDto> {
    let form = form.0;
    let user = state.db.get_user_by_email(form.email.trim()).await?;

    if let Some(user) = user {
        if let Some(password_hash) = &user.password_hash {
            if password_hash_verify(password_hash, &form.password)? {
                let token = state
                    .db
                    .create_session_token(user.id, session_valid_until())
                    .await?;

                return Ok(AuthTokenDto { token });
            }
        }
    }

    Err(ServiceError::Unauthorized("Invalid email or password"))
}

fn auth_password_based_docs(op: TransformOperation) -> TransformOperation {
    op.description("Login with email and password.")
        .tag("auth")
        .response::<200, Json<AuthTokenDto>>()
        .response_with::<401, (), _>(|res| res.description("Invalid email or password!"))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct OtpSendDto {
    pub email: Option<String>,
    pub phone: Option<String>,
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

impl OtpSendDto {
    fn phone(&self) -> Option<&str> {
        non_blank(&self.phone)
    }

    fn contact(&self) -> Option<&str> {
        self.phone().or_else(|| non_blank(&self.email))
    }
}

impl Validate for OtpSendDto {
    fn validate(&self) -> ServiceResult<()> {
        if let Some(email) = non_blank(&self.email) {
            require_email(email)?;
        }
        if self.contact().is_none() {
            return Err(ServiceError::validation("Phone or email is required"));
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct OtpSentDto {
    pub message: String,
}

/// Staff members log in with a one time code sent to their phone or email.
async fn auth_otp_send(
    mut state: RequestState,
    form: JsonBody<OtpSendDto>,
) -> ServiceResult<Json<OtpSentDto>> {
    let form = form.0;
    let contact = form
        .contact()
        .ok_or_else(|| ServiceError::validation("Phone or email is required"))?
        .to_owned();

    let user = state.db.get_user_by_contact(&contact).await?;
    let staff = match user {
        Some(user) => state.db.get_staff_by_user(user.id).await?,
        None => None,
    };
    if staff.is_none() {
        return Err(ServiceError::NotFound(
            "No staff account found with this contact",
        ));
    }

    let code = generate_numeric_code(OTP_LENGTH);
    let valid_until = otp_valid_until();
    state.db.store_otp_code(&contact, &code, valid_until).await?;

    if form.phone().is_some() {
        // No sms provider is configured, the code is only logged.
        info!("One time code for {contact} is {code}");
    } else {
        #[cfg(feature = "mail")]
        crate::mail::send_otp_code(&contact, &code, &valid_until).await?;
        #[cfg(not(feature = "mail"))]
        info!("One time code for {contact} is {code}");
    }

    Ok(Json(OtpSentDto {
        message: "OTP sent successfully".to_owned(),
    }))
}

fn auth_otp_send_docs(op: TransformOperation) -> TransformOperation {
    op.description("Send a one time login code to a staff member.")
        .tag("auth")
        .response::<200, Json<OtpSentDto>>()
        .response_with::<400, (), _>(|res| res.description("Phone or email is required!"))
        .response_with::<404, (), _>(|res| res.description("No staff account found!"))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct OtpVerifyDto {
    pub contact: String,
    pub code: String,
}

impl Validate for OtpVerifyDto {
    fn validate(&self) -> ServiceResult<()> {
        if self.code.len() != OTP_LENGTH || !self.code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ServiceError::validation("Code must be 6 digits"));
        }
        Ok(())
    }
}

async fn auth_otp_verify(
    mut state: RequestState,
    form: JsonBody<OtpVerifyDto>,
) -> ServiceResult<AuthTokenDto> {
    let form = form.0;
    let contact = form.contact.trim();

    if !state.db.consume_otp_code(contact, &form.code).await? {
        return Err(ServiceError::Unauthorized("Invalid or expired code"));
    }

    let user = state
        .db
        .get_user_by_contact(contact)
        .await?
        .ok_or(ServiceError::Unauthorized("Invalid or expired code"))?;

    let token = state
        .db
        .create_session_token(user.id, session_valid_until())
        .await?;
    Ok(AuthTokenDto { token })
}

fn auth_otp_verify_docs(op: TransformOperation) -> TransformOperation {
    op.description("Login with a one time code.")
        .tag("auth")
        .response::<200, Json<AuthTokenDto>>()
        .response_with::<401, (), _>(|res| res.description("Invalid or expired code!"))
}

async fn auth_delete(mut state: RequestState) -> ServiceResult<StatusCode> {
    if let Some(session) = state.session {
        state.db.delete_session_token(session.token).await?;
    }

    Ok(StatusCode::NO_CONTENT)
}

fn auth_delete_docs(op: TransformOperation) -> TransformOperation {
    op.description("Logout the current session.")
        .tag("auth")
        .response_with::<204, (), _>(|res| res.description("Logout was successfull!"))
}

pub async fn auth_get_account(state: RequestState) -> ServiceResult<Json<UserDto>> {
    let user = state.session_require()?;
    Ok(Json(UserDto::from(&user)))
}

fn auth_get_account_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the user of the current session.")
        .tag("auth")
        .response::<200, Json<UserDto>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register(email: &str, password: &str, venue_name: &str) -> RegisterDto {
        RegisterDto {
            email: email.to_owned(),
            password: password.to_owned(),
            venue_name: venue_name.to_owned(),
            venue_type: VenueTypeDto::Cafe,
        }
    }

    #[test]
    fn test_register_validation_reports_first_violation() {
        assert!(register("made@warung.id", "secret", "Warung").validate().is_ok());
        assert_eq!(
            register("made", "123", "W").validate(),
            Err(ServiceError::validation("Invalid email address"))
        );
        assert_eq!(
            register("made@warung.id", "123", "W").validate(),
            Err(ServiceError::validation(
                "Password must be at least 6 characters"
            ))
        );
        assert_eq!(
            register("made@warung.id", "secret", "W").validate(),
            Err(ServiceError::validation(
                "Venue name must be at least 2 characters"
            ))
        );
    }

    #[test]
    fn test_otp_contact() {
        let form = OtpSendDto {
            email: Some("ketut@warung.id".to_owned()),
            phone: None,
        };
        assert_eq!(form.contact(), Some("ketut@warung.id"));
        assert!(form.validate().is_ok());

        let form = OtpSendDto {
            email: None,
            phone: Some(" ".to_owned()),
        };
        assert!(form.validate().is_err());
    }

    #[test]
    fn test_otp_contact_skips_blank_phone() {
        let form = OtpSendDto {
            email: Some(" ketut@warung.id ".to_owned()),
            phone: Some("  ".to_owned()),
        };
        assert_eq!(form.contact(), Some("ketut@warung.id"));
        assert_eq!(form.phone(), None);
        assert!(form.validate().is_ok());

        let form = OtpSendDto {
            email: Some(String::new()),
            phone: Some("+6281234567".to_owned()),
        };
        assert_eq!(form.contact(), Some("+6281234567"));
        assert!(form.validate().is_ok());
    }
}
