use aide::axum::routing::{get_with, put_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use axum::Json;
use chrono::{DateTime, Utc};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::{AppState, TipFilter};
use crate::error::{ServiceError, ServiceResult};
use crate::models::{self, GatewayEnvironment, VenueStatus};
use crate::reports::{self, DashboardPeriod};
use crate::request_state::RequestState;

use super::dto::{TipStatusDto, VenueStatusDto};
use super::payouts::DateRangeQueryDto;
use super::venues::VenueDto;
use super::{JsonBody, QueryParams, Validate};

const DEFAULT_TRANSACTION_LIMIT: i64 = 100;

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route("/admin/stats", get_with(get_stats, get_stats_docs))
        .api_route("/admin/venues", get_with(list_venues, list_venues_docs))
        .api_route(
            "/admin/venue/:id/status",
            put_with(update_venue_status, update_venue_status_docs),
        )
        .api_route(
            "/admin/transactions",
            get_with(list_transactions, list_transactions_docs),
        )
        .api_route(
            "/admin/commissions",
            get_with(get_commissions, get_commissions_docs),
        )
        .with_state(app_state)
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PlatformStatsDto {
    pub total_venues: i64,
    pub active_venues: i64,
    pub total_transactions: i64,
    pub total_volume: i64,
    pub today_transactions: i64,
    pub failed_today: i64,
}

impl From<&models::PlatformStats> for PlatformStatsDto {
    fn from(value: &models::PlatformStats) -> Self {
        Self {
            total_venues: value.total_venues,
            active_venues: value.active_venues,
            total_transactions: value.total_transactions,
            total_volume: value.total_volume,
            today_transactions: value.today_transactions,
            failed_today: value.failed_today,
        }
    }
}

async fn get_stats(mut state: RequestState) -> ServiceResult<Json<PlatformStatsDto>> {
    state.session_require_admin()?;

    let today_start = DashboardPeriod::Today.start(Utc::now());
    let stats = state.db.get_platform_stats(today_start).await?;
    Ok(Json(PlatformStatsDto::from(&stats)))
}

fn get_stats_docs(op: TransformOperation) -> TransformOperation {
    op.description("Platform wide counters.")
        .tag("admin")
        .response::<200, Json<PlatformStatsDto>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GatewayStateDto {
    Live,
    Test,
    NotConnected,
}

impl From<&models::Venue> for GatewayStateDto {
    fn from(value: &models::Venue) -> Self {
        match &value.credentials {
            Some(credentials) if value.gateway_connected => match credentials.environment {
                GatewayEnvironment::Production => GatewayStateDto::Live,
                GatewayEnvironment::Sandbox => GatewayStateDto::Test,
            },
            _ => GatewayStateDto::NotConnected,
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct VenueActivityDto {
    pub id: u64,
    pub name: String,
    pub area: String,
    pub gateway_state: GatewayStateDto,
    pub status: VenueStatusDto,
    pub total_volume: i64,
    pub last_activity: Option<DateTime<Utc>>,
    pub staff_count: i64,
}

impl From<&models::VenueActivity> for VenueActivityDto {
    fn from(value: &models::VenueActivity) -> Self {
        Self {
            id: value.venue.id,
            name: value.venue.name.clone(),
            area: value
                .venue
                .address
                .clone()
                .unwrap_or_else(|| "Unknown".to_owned()),
            gateway_state: (&value.venue).into(),
            status: (&value.venue.status).into(),
            total_volume: value.total_volume,
            last_activity: value.last_activity,
            staff_count: value.staff_count,
        }
    }
}

async fn list_venues(mut state: RequestState) -> ServiceResult<Json<Vec<VenueActivityDto>>> {
    state.session_require_admin()?;

    let venues = state.db.get_venue_activities().await?;
    Ok(Json(venues.iter().map(|v| v.into()).collect()))
}

fn list_venues_docs(op: TransformOperation) -> TransformOperation {
    op.description("All venues with gateway state and tip volume.")
        .tag("admin")
        .response::<200, Json<Vec<VenueActivityDto>>>()
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct VenueStatusUpdateDto {
    pub status: VenueStatusDto,
}

impl Validate for VenueStatusUpdateDto {
    fn validate(&self) -> ServiceResult<()> {
        if self.status == VenueStatusDto::Draft {
            return Err(ServiceError::validation(
                "Invalid status. Must be ACTIVE or BLOCKED",
            ));
        }
        Ok(())
    }
}

async fn update_venue_status(
    mut state: RequestState,
    Path(id): Path<u64>,
    form: JsonBody<VenueStatusUpdateDto>,
) -> ServiceResult<Json<VenueDto>> {
    let admin = state.session_require_admin()?;
    let status: VenueStatus = form.0.status.into();

    let venue = state.db.set_venue_status(id, status).await?;
    info!(
        "Admin {} set venue {} to {}",
        admin.id,
        venue.id,
        status.as_str()
    );

    Ok(Json(VenueDto::from(&venue)))
}

fn update_venue_status_docs(op: TransformOperation) -> TransformOperation {
    op.description("Activate or block a venue.")
        .tag("admin")
        .response::<200, Json<VenueDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid status!"))
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct TransactionQueryDto {
    pub status: Option<TipStatusDto>,
    pub venue_id: Option<u64>,
    /// Gateway status of the latest notification, `all` disables the filter.
    pub midtrans_status: Option<String>,
    pub limit: Option<i64>,
}

impl Validate for TransactionQueryDto {
    fn validate(&self) -> ServiceResult<()> {
        if let Some(limit) = self.limit {
            if limit < 1 {
                return Err(ServiceError::validation("limit must be positive"));
            }
        }
        Ok(())
    }
}

impl From<TransactionQueryDto> for TipFilter {
    fn from(value: TransactionQueryDto) -> Self {
        Self {
            status: value.status.map(|s| s.into()),
            venue_id: value.venue_id,
            gateway_status: value.midtrans_status.filter(|s| !s.is_empty() && s != "all"),
            limit: value.limit.unwrap_or(DEFAULT_TRANSACTION_LIMIT),
        }
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TransactionDto {
    pub id: u64,
    pub order_id: String,
    pub venue: String,
    pub amount: i64,
    pub midtrans_status: String,
    pub status: TipStatusDto,
    pub payment_method: String,
    pub staff_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub error_message: Option<String>,
}

impl From<&(models::TipRecord, String)> for TransactionDto {
    fn from((record, gateway_status): &(models::TipRecord, String)) -> Self {
        let tip = &record.tip;
        Self {
            id: tip.id,
            order_id: tip.order_id.clone(),
            venue: record.venue_name.clone(),
            amount: tip.amounts.amount,
            midtrans_status: gateway_status.clone(),
            status: (&tip.status).into(),
            payment_method: tip
                .payment_type
                .clone()
                .unwrap_or_else(|| "Unknown".to_owned()),
            staff_name: record.staff_name.clone(),
            created_at: tip.created_at,
            error_message: (tip.status == models::TipStatus::Failed)
                .then(|| "Payment failed".to_owned()),
        }
    }
}

async fn list_transactions(
    mut state: RequestState,
    query: QueryParams<TransactionQueryDto>,
) -> ServiceResult<Json<Vec<TransactionDto>>> {
    state.session_require_admin()?;

    let filter = TipFilter::from(query.0);
    let records = state.db.get_tip_records(&filter).await?;
    Ok(Json(records.iter().map(|r| r.into()).collect()))
}

fn list_transactions_docs(op: TransformOperation) -> TransformOperation {
    op.description("Latest tips across all venues with their gateway status.")
        .tag("admin")
        .response::<200, Json<Vec<TransactionDto>>>()
        .response_with::<400, (), _>(|res| res.description("Invalid filter!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct VenueCommissionDto {
    pub venue_id: u64,
    pub venue_name: String,
    pub total_tips: i64,
    pub transaction_count: i64,
    pub platform_fee: i64,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct CommissionReportDto {
    pub period: String,
    pub total_tips: i64,
    pub total_platform_fee: i64,
    pub total_transactions: i64,
    pub venues: Vec<VenueCommissionDto>,
}

impl From<&reports::CommissionReport> for CommissionReportDto {
    fn from(value: &reports::CommissionReport) -> Self {
        Self {
            period: format!("{}_{}", value.range.start, value.range.end),
            total_tips: value.total_tips,
            total_platform_fee: value.total_platform_fee,
            total_transactions: value.total_transactions,
            venues: value
                .venues
                .iter()
                .map(|v| VenueCommissionDto {
                    venue_id: v.venue_id,
                    venue_name: v.venue_name.clone(),
                    total_tips: v.total_tips,
                    transaction_count: v.transaction_count,
                    platform_fee: v.platform_fee,
                })
                .collect(),
        }
    }
}

async fn get_commissions(
    mut state: RequestState,
    query: QueryParams<DateRangeQueryDto>,
) -> ServiceResult<Json<CommissionReportDto>> {
    state.session_require_admin()?;
    let range = query.0.range()?;

    let tips = state
        .db
        .get_paid_tip_records(None, range.start_time(), range.end_time())
        .await?;
    let report = reports::build_commission_report(range, &tips);

    Ok(Json(CommissionReportDto::from(&report)))
}

fn get_commissions_docs(op: TransformOperation) -> TransformOperation {
    op.description("Platform commission per venue over paid tips of a period.")
        .tag("admin")
        .response::<200, Json<CommissionReportDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid date range!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_filter() {
        let filter = TipFilter::from(TransactionQueryDto {
            status: Some(TipStatusDto::Paid),
            venue_id: None,
            midtrans_status: Some("all".to_owned()),
            limit: None,
        });

        assert_eq!(filter.status, Some(models::TipStatus::Paid));
        assert_eq!(filter.gateway_status, None);
        assert_eq!(filter.limit, DEFAULT_TRANSACTION_LIMIT);
    }

    #[test]
    fn test_venue_status_update_rejects_draft() {
        let form = VenueStatusUpdateDto {
            status: VenueStatusDto::Draft,
        };
        assert!(form.validate().is_err());

        let form = VenueStatusUpdateDto {
            status: VenueStatusDto::Blocked,
        };
        assert!(form.validate().is_ok());
    }
}
