use aide::axum::routing::{get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use axum::Json;
use chrono::{DateTime, Utc};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::crypto::encrypt_secret;
use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, Role};
use crate::request_state::RequestState;

use super::dto::{DistributionModeDto, GatewayEnvironmentDto, VenueStatusDto, VenueTypeDto};
use super::{require_email, require_min_chars, require_url, JsonBody, Validate};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/venue/current",
            get_with(get_current_venue, get_current_venue_docs),
        )
        .api_route(
            "/venue/:id",
            get_with(get_venue, get_venue_docs).put_with(update_venue, update_venue_docs),
        )
        .api_route(
            "/venue/:id/settings",
            get_with(get_venue_settings, get_venue_settings_docs)
                .put_with(update_venue_settings, update_venue_settings_docs),
        )
        .api_route(
            "/venue/:id/midtrans",
            post_with(connect_midtrans, connect_midtrans_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct VenueDto {
    pub id: u64,
    pub name: String,
    pub venue_type: VenueTypeDto,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
    pub timezone: String,
    pub manager_id: u64,
    pub status: VenueStatusDto,
    pub gateway_connected: bool,
    pub distribution_mode: DistributionModeDto,
    pub allow_staff_choice: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&models::Venue> for VenueDto {
    fn from(value: &models::Venue) -> Self {
        Self {
            id: value.id,
            name: value.name.clone(),
            venue_type: (&value.venue_type).into(),
            address: value.address.clone(),
            phone: value.phone.clone(),
            email: value.email.clone(),
            logo_url: value.logo_url.clone(),
            timezone: value.timezone.clone(),
            manager_id: value.manager_id,
            status: (&value.status).into(),
            gateway_connected: value.gateway_connected,
            distribution_mode: (&value.distribution_mode).into(),
            allow_staff_choice: value.allow_staff_choice,
            created_at: value.created_at,
        }
    }
}

async fn get_current_venue(mut state: RequestState) -> ServiceResult<Json<VenueDto>> {
    let user = state.session_require()?;

    let venue = match user.role {
        Role::Staff => match state.db.get_staff_by_user(user.id).await? {
            Some(staff) => state.db.get_venue_by_id(staff.venue_id).await?,
            None => None,
        },
        _ => state.db.get_venue_by_manager(user.id).await?,
    };

    match venue {
        Some(venue) => Ok(Json(VenueDto::from(&venue))),
        None => Err(ServiceError::NotFound("Venue not found")),
    }
}

fn get_current_venue_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the venue of the current user.")
        .tag("venues")
        .response::<200, Json<VenueDto>>()
        .response_with::<404, (), _>(|res| res.description("The user has no venue!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .security_requirement("SessionToken")
}

async fn get_venue(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<VenueDto>> {
    let venue = state.venue_require(id).await?;
    Ok(Json(VenueDto::from(&venue)))
}

fn get_venue_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get a venue by id.")
        .tag("venues")
        .response::<200, Json<VenueDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct UpdateVenueDto {
    pub name: Option<String>,
    pub venue_type: Option<VenueTypeDto>,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub logo_url: Option<String>,
    pub timezone: Option<String>,
    pub distribution_mode: Option<DistributionModeDto>,
    pub allow_staff_choice: Option<bool>,
}

impl Validate for UpdateVenueDto {
    fn validate(&self) -> ServiceResult<()> {
        if let Some(name) = &self.name {
            require_min_chars(name, 2, "Venue name must be at least 2 characters")?;
        }
        if let Some(email) = &self.email {
            require_email(email)?;
        }
        if let Some(logo_url) = &self.logo_url {
            require_url(logo_url)?;
        }
        if let Some(timezone) = &self.timezone {
            require_min_chars(timezone, 1, "Timezone must not be empty")?;
        }
        Ok(())
    }
}

async fn update_venue(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<UpdateVenueDto>,
) -> ServiceResult<Json<VenueDto>> {
    let mut venue = state.venue_require(id).await?;
    let form = form.0;

    if let Some(name) = form.name {
        venue.name = name.trim().to_owned();
    }
    if let Some(venue_type) = form.venue_type {
        venue.venue_type = venue_type.into();
    }
    if let Some(address) = form.address {
        venue.address = Some(address);
    }
    if let Some(phone) = form.phone {
        venue.phone = Some(phone);
    }
    if let Some(email) = form.email {
        venue.email = Some(email);
    }
    if let Some(logo_url) = form.logo_url {
        venue.logo_url = Some(logo_url);
    }
    if let Some(timezone) = form.timezone {
        venue.timezone = timezone;
    }
    if let Some(distribution_mode) = form.distribution_mode {
        venue.distribution_mode = distribution_mode.into();
    }
    if let Some(allow_staff_choice) = form.allow_staff_choice {
        venue.allow_staff_choice = allow_staff_choice;
    }

    let venue = state.db.store_venue(venue).await?;
    Ok(Json(VenueDto::from(&venue)))
}

fn update_venue_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update the profile of a venue. Missing fields stay unchanged.")
        .tag("venues")
        .response::<200, Json<VenueDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct VenueSettingsDto {
    pub distribution_mode: DistributionModeDto,
    pub allow_staff_choice: bool,
    pub gateway_connected: bool,
    pub merchant_id: Option<String>,
    pub environment: Option<GatewayEnvironmentDto>,
}

impl From<&models::Venue> for VenueSettingsDto {
    fn from(value: &models::Venue) -> Self {
        Self {
            distribution_mode: (&value.distribution_mode).into(),
            allow_staff_choice: value.allow_staff_choice,
            gateway_connected: value.gateway_connected,
            merchant_id: value.credentials.as_ref().map(|c| c.merchant_id.clone()),
            environment: value.credentials.as_ref().map(|c| (&c.environment).into()),
        }
    }
}

async fn get_venue_settings(
    mut state: RequestState,
    Path(id): Path<u64>,
) -> ServiceResult<Json<VenueSettingsDto>> {
    let venue = state.venue_require(id).await?;
    Ok(Json(VenueSettingsDto::from(&venue)))
}

fn get_venue_settings_docs(op: TransformOperation) -> TransformOperation {
    op.description("Get the tip distribution settings and gateway state of a venue.")
        .tag("venues")
        .response::<200, Json<VenueSettingsDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct SaveVenueSettingsDto {
    pub distribution_mode: Option<DistributionModeDto>,
    pub allow_staff_choice: Option<bool>,
}

impl Validate for SaveVenueSettingsDto {}

async fn update_venue_settings(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<SaveVenueSettingsDto>,
) -> ServiceResult<Json<VenueSettingsDto>> {
    let mut venue = state.venue_require(id).await?;
    let form = form.0;

    if let Some(distribution_mode) = form.distribution_mode {
        venue.distribution_mode = distribution_mode.into();
    }
    if let Some(allow_staff_choice) = form.allow_staff_choice {
        venue.allow_staff_choice = allow_staff_choice;
    }

    let venue = state.db.store_venue(venue).await?;
    Ok(Json(VenueSettingsDto::from(&venue)))
}

fn update_venue_settings_docs(op: TransformOperation) -> TransformOperation {
    op.description("Update the tip distribution settings of a venue.")
        .tag("venues")
        .response::<200, Json<VenueSettingsDto>>()
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct ConnectMidtransDto {
    pub merchant_id: String,
    pub server_key: String,
    pub client_key: String,
    pub environment: GatewayEnvironmentDto,
}

impl Validate for ConnectMidtransDto {
    fn validate(&self) -> ServiceResult<()> {
        require_min_chars(&self.merchant_id, 1, "Merchant id is required")?;
        require_min_chars(&self.server_key, 1, "Server key is required")?;
        require_min_chars(&self.client_key, 1, "Client key is required")
    }
}

async fn connect_midtrans(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<ConnectMidtransDto>,
) -> ServiceResult<Json<VenueSettingsDto>> {
    let venue = state.venue_require(id).await?;
    let form = form.0;

    let credentials = models::MerchantCredentials {
        merchant_id: form.merchant_id.trim().to_owned(),
        server_key_encrypted: encrypt_secret(form.server_key.trim())?,
        client_key: form.client_key.trim().to_owned(),
        environment: form.environment.into(),
    };

    let venue = state
        .db
        .connect_venue_gateway(venue.id, &credentials)
        .await?;
    info!(
        "Venue {} connected merchant {} ({})",
        venue.id,
        credentials.merchant_id,
        credentials.environment.as_str()
    );

    Ok(Json(VenueSettingsDto::from(&venue)))
}

fn connect_midtrans_docs(op: TransformOperation) -> TransformOperation {
    op.description("Connect the venue's Midtrans merchant account. Activates draft venues.")
        .tag("venues")
        .response::<200, Json<VenueSettingsDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid input!"))
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}
