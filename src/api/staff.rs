use aide::axum::routing::{get_with, put_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use axum::Json;
use chrono::{DateTime, Utc};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::{AppState, NewStaff};
use crate::error::{ServiceError, ServiceResult};
use crate::models;
use crate::request_state::RequestState;

use super::dto::{StaffRoleDto, StaffStatusDto};
use super::qr_codes::QrCodeDto;
use super::{require_email, require_min_chars, require_url, JsonBody, Validate};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/venue/:id/staff",
            get_with(list_staff, list_staff_docs).post_with(create_staff, create_staff_docs),
        )
        .api_route("/staff/:id", put_with(update_staff, update_staff_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct StaffDto {
    pub id: u64,
    pub venue_id: u64,
    pub user_id: Option<u64>,
    pub display_name: String,
    pub full_name: Option<String>,
    pub role: StaffRoleDto,
    pub avatar_url: Option<String>,
    pub participates_in_pool: bool,
    pub status: StaffStatusDto,
    pub created_at: DateTime<Utc>,
}

impl From<&models::Staff> for StaffDto {
    fn from(value: &models::Staff) -> Self {
        Self {
            id: value.id,
            venue_id: value.venue_id,
            user_id: value.user_id,
            display_name: value.display_name.clone(),
            full_name: value.full_name.clone(),
            role: (&value.role).into(),
            avatar_url: value.avatar_url.clone(),
            participates_in_pool: value.participates_in_pool,
            status: (&value.status).into(),
            created_at: value.created_at,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct StaffSummaryDto {
    #[serde(flatten)]
    pub staff: StaffDto,
    pub qr_code: Option<QrCodeDto>,
    pub tip_count: i64,
}

impl From<&models::StaffSummary> for StaffSummaryDto {
    fn from(value: &models::StaffSummary) -> Self {
        Self {
            staff: StaffDto::from(&value.staff),
            qr_code: value.qr_code.as_ref().map(QrCodeDto::from),
            tip_count: value.tip_count,
        }
    }
}

async fn list_staff(
    mut state: RequestState,
    Path(venue_id): Path<u64>,
) -> ServiceResult<Json<Vec<StaffSummaryDto>>> {
    let venue = state.venue_require(venue_id).await?;

    let staff = state.db.get_staff_summaries(venue.id).await?;
    Ok(Json(staff.iter().map(|s| s.into()).collect()))
}

fn list_staff_docs(op: TransformOperation) -> TransformOperation {
    op.description("List the staff of a venue with their personal QR code.")
        .tag("staff")
        .response::<200, Json<Vec<StaffSummaryDto>>>()
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

fn default_participates_in_pool() -> bool {
    true
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateStaffDto {
    pub display_name: String,
    pub full_name: Option<String>,
    pub role: StaffRoleDto,
    pub phone: Option<String>,
    pub email: Option<String>,
    #[serde(default = "default_participates_in_pool")]
    pub participates_in_pool: bool,
    pub avatar_url: Option<String>,
}

impl Validate for CreateStaffDto {
    fn validate(&self) -> ServiceResult<()> {
        require_min_chars(&self.display_name, 1, "Display name is required")?;
        if let Some(email) = &self.email {
            require_email(email)?;
        }
        if let Some(avatar_url) = &self.avatar_url {
            require_url(avatar_url)?;
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct CreatedStaffDto {
    pub staff: StaffDto,
    pub qr_code: QrCodeDto,
}

async fn create_staff(
    mut state: RequestState,
    Path(venue_id): Path<u64>,
    form: JsonBody<CreateStaffDto>,
) -> ServiceResult<Json<CreatedStaffDto>> {
    let venue = state.venue_require(venue_id).await?;
    let form = form.0;

    let (staff, qr_code) = state
        .db
        .create_staff_with_qr(
            venue.id,
            NewStaff {
                display_name: form.display_name.trim().to_owned(),
                full_name: form.full_name,
                role: form.role.into(),
                avatar_url: form.avatar_url,
                participates_in_pool: form.participates_in_pool,
                email: form.email.map(|email| email.trim().to_lowercase()),
                phone: form.phone.filter(|phone| !phone.trim().is_empty()),
            },
        )
        .await?;
    info!("Added staff {} with qr code {} to venue {}", staff.id, qr_code.short_code, venue.id);

    Ok(Json(CreatedStaffDto {
        staff: StaffDto::from(&staff),
        qr_code: QrCodeDto::from(&qr_code),
    }))
}

fn create_staff_docs(op: TransformOperation) -> TransformOperation {
    op.description("Add a staff member together with a personal QR code.")
        .tag("staff")
        .response::<200, Json<CreatedStaffDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateStaffDto {
    pub display_name: Option<String>,
    pub full_name: Option<String>,
    pub role: Option<StaffRoleDto>,
    pub avatar_url: Option<String>,
    pub participates_in_pool: Option<bool>,
    pub status: Option<StaffStatusDto>,
}

impl Validate for UpdateStaffDto {
    fn validate(&self) -> ServiceResult<()> {
        if let Some(display_name) = &self.display_name {
            require_min_chars(display_name, 1, "Display name is required")?;
        }
        if let Some(avatar_url) = &self.avatar_url {
            require_url(avatar_url)?;
        }
        Ok(())
    }
}

async fn update_staff(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<UpdateStaffDto>,
) -> ServiceResult<Json<StaffDto>> {
    state.session_require()?;
    let form = form.0;

    let mut staff = state
        .db
        .get_staff_by_id(id)
        .await?
        .ok_or(ServiceError::NotFound("Staff not found"))?;
    state.venue_require(staff.venue_id).await?;

    if let Some(display_name) = form.display_name {
        staff.display_name = display_name.trim().to_owned();
    }
    if let Some(full_name) = form.full_name {
        staff.full_name = Some(full_name);
    }
    if let Some(role) = form.role {
        staff.role = role.into();
    }
    if let Some(avatar_url) = form.avatar_url {
        staff.avatar_url = Some(avatar_url);
    }
    if let Some(participates_in_pool) = form.participates_in_pool {
        staff.participates_in_pool = participates_in_pool;
    }
    if let Some(status) = form.status {
        staff.status = status.into();
    }

    let staff = state.db.store_staff(staff).await?;
    Ok(Json(StaffDto::from(&staff)))
}

fn update_staff_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update a staff member. The personal QR code follows the staff status.")
        .tag("staff")
        .response::<200, Json<StaffDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<404, (), _>(|res| res.description("The requested staff member does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}
