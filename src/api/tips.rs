use aide::axum::routing::get_with;
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use axum::Json;
use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::ServiceResult;
use crate::models;
use crate::request_state::RequestState;
use crate::tipping::{self, TipContext, TipRequest, MAX_POLLS, POLL_INTERVAL_MS};

use super::dto::{DistributionModeDto, QrTypeDto, StaffRoleDto, TipStatusDto, TipTypeDto};
use super::{JsonBody, Validate};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/tip/:short_code",
            get_with(resolve_tip, resolve_tip_docs).post_with(create_tip, create_tip_docs),
        )
        .api_route("/tips/:order_id", get_with(poll_tip, poll_tip_docs))
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TipQrCodeDto {
    pub id: u64,
    pub qr_type: QrTypeDto,
    pub label: String,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TipVenueDto {
    pub id: u64,
    pub name: String,
    pub logo_url: Option<String>,
    pub distribution_mode: DistributionModeDto,
    pub allow_staff_choice: bool,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TipStaffDto {
    pub id: u64,
    pub display_name: String,
    pub avatar_url: Option<String>,
    pub role: StaffRoleDto,
}

impl From<&models::Staff> for TipStaffDto {
    fn from(value: &models::Staff) -> Self {
        Self {
            id: value.id,
            display_name: value.display_name.clone(),
            avatar_url: value.avatar_url.clone(),
            role: (&value.role).into(),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TipContextDto {
    pub qr_code: TipQrCodeDto,
    pub venue: TipVenueDto,
    pub staff: Option<TipStaffDto>,
    pub selectable_staff: Vec<TipStaffDto>,
}

impl From<&TipContext> for TipContextDto {
    fn from(value: &TipContext) -> Self {
        Self {
            qr_code: TipQrCodeDto {
                id: value.qr_code.id,
                qr_type: (&value.qr_code.qr_type).into(),
                label: value.qr_code.label.clone(),
            },
            venue: TipVenueDto {
                id: value.venue.id,
                name: value.venue.name.clone(),
                logo_url: value.venue.logo_url.clone(),
                distribution_mode: (&value.venue.distribution_mode).into(),
                allow_staff_choice: value.venue.allow_staff_choice,
            },
            staff: value.staff.as_ref().map(TipStaffDto::from),
            selectable_staff: value.selectable_staff.iter().map(TipStaffDto::from).collect(),
        }
    }
}

async fn resolve_tip(
    mut state: RequestState,
    Path(short_code): Path<String>,
) -> ServiceResult<Json<TipContextDto>> {
    let context = tipping::resolve(&mut state.db, &short_code).await?;
    Ok(Json(TipContextDto::from(&context)))
}

fn resolve_tip_docs(op: TransformOperation) -> TransformOperation {
    op.description("Resolve a scanned qr code to its venue and receiver.")
        .tag("tips")
        .response::<200, Json<TipContextDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("The qr code or the venue does not accept tips!")
        })
        .response_with::<404, (), _>(|res| res.description("The qr code does not exist!"))
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct CreateTipDto {
    pub amount: i64,
    #[serde(default)]
    pub guest_pays_fee: bool,
    pub tip_type: Option<TipTypeDto>,
    pub staff_id: Option<u64>,
}

impl Validate for CreateTipDto {}

impl From<CreateTipDto> for TipRequest {
    fn from(value: CreateTipDto) -> Self {
        Self {
            amount: value.amount,
            guest_pays_fee: value.guest_pays_fee,
            tip_type: value.tip_type.map(|t| t.into()),
            staff_id: value.staff_id,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct CreatedTipDto {
    pub tip_id: u64,
    pub order_id: String,
    pub snap_token: String,
    pub redirect_url: String,
    pub amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
    pub total_amount: i64,
}

async fn create_tip(
    mut state: RequestState,
    Path(short_code): Path<String>,
    form: JsonBody<CreateTipDto>,
) -> ServiceResult<Json<CreatedTipDto>> {
    let form = form.0;
    let gateway = state.gateway.clone();

    let created =
        tipping::create_tip(&mut state.db, gateway.as_ref(), &short_code, form.into()).await?;
    let amounts = created.tip.amounts;

    Ok(Json(CreatedTipDto {
        tip_id: created.tip.id,
        order_id: created.tip.order_id,
        snap_token: created.snap_token,
        redirect_url: created.redirect_url,
        amount: amounts.amount,
        platform_fee: amounts.platform_fee,
        net_amount: amounts.net_amount,
        total_amount: amounts.total_amount,
    }))
}

fn create_tip_docs(op: TransformOperation) -> TransformOperation {
    op.description("Create a pending tip and open a payment at the gateway.")
        .tag("tips")
        .response::<200, Json<CreatedTipDto>>()
        .response_with::<400, (), _>(|res| {
            res.description("Invalid amount or the qr code does not accept tips!")
        })
        .response_with::<404, (), _>(|res| res.description("The qr code does not exist!"))
        .response_with::<500, (), _>(|res| res.description("The payment gateway failed!"))
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TipProgressDto {
    pub order_id: String,
    pub status: TipStatusDto,
    pub tip_type: TipTypeDto,
    pub amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
    pub total_amount: i64,
    pub guest_pays_fee: bool,
    pub payment_type: Option<String>,
    pub venue_name: String,
    pub staff_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    /// Polling policy of the status page.
    pub poll_interval_ms: u64,
    pub max_polls: u32,
}

impl From<&models::TipRecord> for TipProgressDto {
    fn from(value: &models::TipRecord) -> Self {
        let tip = &value.tip;
        Self {
            order_id: tip.order_id.clone(),
            status: (&tip.status).into(),
            tip_type: (&tip.tip_type).into(),
            amount: tip.amounts.amount,
            platform_fee: tip.amounts.platform_fee,
            net_amount: tip.amounts.net_amount,
            total_amount: tip.amounts.total_amount,
            guest_pays_fee: tip.amounts.guest_pays_fee,
            payment_type: tip.payment_type.clone(),
            venue_name: value.venue_name.clone(),
            staff_name: value.staff_name.clone(),
            created_at: tip.created_at,
            paid_at: tip.paid_at,
            poll_interval_ms: POLL_INTERVAL_MS,
            max_polls: MAX_POLLS,
        }
    }
}

async fn poll_tip(
    mut state: RequestState,
    Path(order_id): Path<String>,
) -> ServiceResult<Json<TipProgressDto>> {
    let gateway = state.gateway.clone();
    let record = tipping::poll_status(&mut state.db, gateway.as_ref(), &order_id).await?;
    Ok(Json(TipProgressDto::from(&record)))
}

fn poll_tip_docs(op: TransformOperation) -> TransformOperation {
    op.description("Current status of a tip. Pending tips are checked at the gateway.")
        .tag("tips")
        .response::<200, Json<TipProgressDto>>()
        .response_with::<404, (), _>(|res| res.description("The tip does not exist!"))
}
