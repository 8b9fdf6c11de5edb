use aide::axum::routing::{get_with, post_with};
use aide::axum::ApiRouter;
use aide::transform::TransformOperation;
use axum::extract::Path;
use axum::Json;
use chrono::{NaiveDate, Utc};
use log::info;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::database::AppState;
use crate::error::{ServiceError, ServiceResult};
use crate::reports::{self, DashboardPeriod, DateRange};
use crate::request_state::RequestState;

use super::dto::{PayoutStatusDto, StaffRoleDto};
use super::{JsonBody, QueryParams, Validate};

pub fn router(app_state: AppState) -> ApiRouter {
    ApiRouter::new()
        .api_route(
            "/venue/:id/payouts",
            get_with(get_payout_report, get_payout_report_docs),
        )
        .api_route(
            "/venue/:id/payouts/mark-paid",
            post_with(mark_paid, mark_paid_docs),
        )
        .api_route(
            "/venue/:id/dashboard",
            get_with(get_dashboard, get_dashboard_docs),
        )
        .with_state(app_state)
}

/// `start` and `end` as `YYYY-MM-DD`, both inclusive.
#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct DateRangeQueryDto {
    pub start: Option<String>,
    pub end: Option<String>,
}

impl DateRangeQueryDto {
    pub fn range(&self) -> ServiceResult<DateRange> {
        match (&self.start, &self.end) {
            (Some(start), Some(end)) => DateRange::parse(start, end),
            _ => Err(ServiceError::validation("start and end dates required")),
        }
    }
}

impl Validate for DateRangeQueryDto {
    fn validate(&self) -> ServiceResult<()> {
        self.range().map(|_| ())
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct StaffPayoutDto {
    pub staff_id: u64,
    pub display_name: String,
    pub role: StaffRoleDto,
    pub tips_count: i64,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
    pub status: PayoutStatusDto,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct PayoutReportDto {
    pub id: Option<u64>,
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    pub total_gross: i64,
    pub total_fee: i64,
    pub total_net: i64,
    pub status: PayoutStatusDto,
    pub staff_payouts: Vec<StaffPayoutDto>,
}

impl From<&reports::PayoutReport> for PayoutReportDto {
    fn from(value: &reports::PayoutReport) -> Self {
        Self {
            id: value.payout_id,
            period_start: value.range.start,
            period_end: value.range.end,
            total_gross: value.total_gross,
            total_fee: value.total_fee,
            total_net: value.total_net,
            status: (&value.status).into(),
            staff_payouts: value
                .staff_payouts
                .iter()
                .map(|s| StaffPayoutDto {
                    staff_id: s.staff_id,
                    display_name: s.display_name.clone(),
                    role: (&s.role).into(),
                    tips_count: s.tips_count,
                    gross_amount: s.gross_amount,
                    platform_fee: s.platform_fee,
                    net_amount: s.net_amount,
                    status: (&s.status).into(),
                })
                .collect(),
        }
    }
}

async fn load_payout_report(
    state: &mut RequestState,
    venue_id: u64,
    range: DateRange,
) -> ServiceResult<reports::PayoutReport> {
    let payout = state.db.get_payout_for_period(venue_id, &range).await?;
    let allocations = state.db.get_allocation_records(venue_id, &range).await?;

    Ok(reports::build_payout_report(
        payout.map(|p| p.id),
        range,
        &allocations,
    ))
}

async fn get_payout_report(
    mut state: RequestState,
    Path(venue_id): Path<u64>,
    query: QueryParams<DateRangeQueryDto>,
) -> ServiceResult<Json<PayoutReportDto>> {
    let venue = state.venue_require(venue_id).await?;
    let range = query.0.range()?;

    let report = load_payout_report(&mut state, venue.id, range).await?;
    Ok(Json(PayoutReportDto::from(&report)))
}

fn get_payout_report_docs(op: TransformOperation) -> TransformOperation {
    op.description("Tip allocations of a period grouped per staff member.")
        .tag("payouts")
        .response::<200, Json<PayoutReportDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid date range!"))
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct MarkPaidDto {
    pub period_start: NaiveDate,
    pub period_end: NaiveDate,
    /// Only mark the allocations of this staff member.
    pub staff_id: Option<u64>,
}

impl Validate for MarkPaidDto {
    fn validate(&self) -> ServiceResult<()> {
        DateRange::inclusive(self.period_start, self.period_end).map(|_| ())
    }
}

async fn mark_paid(
    mut state: RequestState,
    Path(venue_id): Path<u64>,
    form: JsonBody<MarkPaidDto>,
) -> ServiceResult<Json<PayoutReportDto>> {
    let venue = state.venue_require(venue_id).await?;
    let form = form.0;
    let range = DateRange::inclusive(form.period_start, form.period_end)?;

    if let Some(staff_id) = form.staff_id {
        match state.db.get_staff_by_id(staff_id).await? {
            Some(staff) if staff.venue_id == venue.id => {}
            _ => return Err(ServiceError::NotFound("Staff not found")),
        }
    }

    let payout = state
        .db
        .mark_payout_paid(venue.id, &range, form.staff_id)
        .await?;
    info!(
        "Payout {} of venue {} for {} to {} is {}",
        payout.id,
        venue.id,
        range.start,
        range.end,
        payout.status.as_str()
    );

    let report = load_payout_report(&mut state, venue.id, range).await?;
    Ok(Json(PayoutReportDto::from(&report)))
}

fn mark_paid_docs(op: TransformOperation) -> TransformOperation {
    op.description("Record that the tips of a period were handed out to the staff.")
        .tag("payouts")
        .response::<200, Json<PayoutReportDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid date range!"))
        .response_with::<404, (), _>(|res| {
            res.description("The requested venue or staff member does not exist!")
        })
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[derive(Debug, PartialEq, Deserialize, JsonSchema)]
pub struct DashboardQueryDto {
    /// `today`, `week` or `month`, defaults to `today`.
    pub period: Option<String>,
}

impl DashboardQueryDto {
    fn period(&self) -> ServiceResult<DashboardPeriod> {
        DashboardPeriod::parse(self.period.as_deref().unwrap_or("today"))
    }
}

impl Validate for DashboardQueryDto {
    fn validate(&self) -> ServiceResult<()> {
        self.period().map(|_| ())
    }
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct TopStaffDto {
    pub staff_id: u64,
    pub display_name: String,
    pub total_tips: i64,
    pub tips_count: i64,
}

#[derive(Debug, PartialEq, Serialize, JsonSchema)]
pub struct DashboardDto {
    pub total_tips: i64,
    pub transaction_count: i64,
    pub average_tip: i64,
    pub active_staff: i64,
    pub top_staff: Vec<TopStaffDto>,
    pub has_pending_payouts: bool,
}

impl From<&reports::Dashboard> for DashboardDto {
    fn from(value: &reports::Dashboard) -> Self {
        Self {
            total_tips: value.total_tips,
            transaction_count: value.transaction_count,
            average_tip: value.average_tip,
            active_staff: value.active_staff,
            top_staff: value
                .top_staff
                .iter()
                .map(|s| TopStaffDto {
                    staff_id: s.staff_id,
                    display_name: s.display_name.clone(),
                    total_tips: s.total_tips,
                    tips_count: s.tips_count,
                })
                .collect(),
            has_pending_payouts: value.has_pending_payouts,
        }
    }
}

async fn get_dashboard(
    mut state: RequestState,
    Path(venue_id): Path<u64>,
    query: QueryParams<DashboardQueryDto>,
) -> ServiceResult<Json<DashboardDto>> {
    let venue = state.venue_require(venue_id).await?;
    let period = query.0.period()?;

    let now = Utc::now();
    let tips = state
        .db
        .get_paid_tip_records(Some(venue.id), period.start(now), now)
        .await?;
    let active_staff = state.db.count_active_staff(venue.id).await?;
    let has_pending_payouts = state.db.has_pending_allocations(venue.id).await?;

    let dashboard = reports::build_dashboard(&tips, active_staff, has_pending_payouts);
    Ok(Json(DashboardDto::from(&dashboard)))
}

fn get_dashboard_docs(op: TransformOperation) -> TransformOperation {
    op.description("Tip metrics of a venue for today, this week or this month.")
        .tag("payouts")
        .response::<200, Json<DashboardDto>>()
        .response_with::<400, (), _>(|res| res.description("Invalid period!"))
        .response_with::<404, (), _>(|res| res.description("The requested venue does not exist!"))
        .response_with::<401, (), _>(|res| res.description("Missing login!"))
        .response_with::<403, (), _>(|res| res.description("Missing permissions!"))
        .security_requirement_scopes("SessionToken", ["admin", "manager"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_range_query() {
        let query = DateRangeQueryDto {
            start: Some("2024-01-01".to_owned()),
            end: Some("2024-01-31".to_owned()),
        };
        assert!(query.validate().is_ok());

        let query = DateRangeQueryDto {
            start: Some("2024-01-01".to_owned()),
            end: None,
        };
        assert_eq!(
            query.validate(),
            Err(ServiceError::validation("start and end dates required"))
        );

        let query = DateRangeQueryDto {
            start: Some("2024-02-01".to_owned()),
            end: Some("2024-01-01".to_owned()),
        };
        assert!(query.validate().is_err());
    }

    #[test]
    fn test_dashboard_period_defaults_to_today() {
        let query = DashboardQueryDto { period: None };
        assert_eq!(query.period(), Ok(DashboardPeriod::Today));

        let query = DashboardQueryDto {
            period: Some("year".to_owned()),
        };
        assert!(query.validate().is_err());
    }
}
