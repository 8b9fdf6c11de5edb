//! Aggregations behind dashboards, commission and payout reports.
//!
//! The database hands over plain records, everything here is pure.

use std::collections::HashMap;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone, Utc};

use crate::error::{ServiceError, ServiceResult};
use crate::fees::platform_fee;
use crate::models::{AllocationRecord, PayoutStatus, StaffRole, TipRecord};

/// Inclusive range of calendar days, evaluated in UTC.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

/// Years a report range may cover.
const REPORT_YEARS: std::ops::RangeInclusive<i32> = 2000..=9999;

impl DateRange {
    pub fn inclusive(start: NaiveDate, end: NaiveDate) -> ServiceResult<Self> {
        if !REPORT_YEARS.contains(&start.year()) || !REPORT_YEARS.contains(&end.year()) {
            return Err(ServiceError::validation(
                "Dates must be between 2000-01-01 and 9999-12-31",
            ));
        }
        if end < start {
            return Err(ServiceError::validation("End date must not be before start date"));
        }
        Ok(Self { start, end })
    }

    /// Parse `YYYY-MM-DD` query values.
    pub fn parse(start: &str, end: &str) -> ServiceResult<Self> {
        let parse = |value: &str| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .map_err(|_| ServiceError::validation(format!("Invalid date '{value}'")))
        };
        Self::inclusive(parse(start)?, parse(end)?)
    }

    pub fn start_time(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.start.and_time(NaiveTime::MIN))
    }

    /// The last millisecond of the end day.
    pub fn end_time(&self) -> DateTime<Utc> {
        Utc.from_utc_datetime(&self.end.and_time(NaiveTime::MIN)) + Duration::days(1)
            - Duration::milliseconds(1)
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DashboardPeriod {
    Today,
    Week,
    Month,
}

impl DashboardPeriod {
    pub fn parse(value: &str) -> ServiceResult<Self> {
        match value {
            "today" => Ok(DashboardPeriod::Today),
            "week" => Ok(DashboardPeriod::Week),
            "month" => Ok(DashboardPeriod::Month),
            _ => Err(ServiceError::validation(
                "Period must be one of today, week or month",
            )),
        }
    }

    /// Start of the current day, week (monday) or month.
    pub fn start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now.date_naive();
        let day = match self {
            DashboardPeriod::Today => today,
            DashboardPeriod::Week => {
                today - Duration::days(today.weekday().num_days_from_monday() as i64)
            }
            DashboardPeriod::Month => today.with_day(1).unwrap_or(today),
        };
        Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct VenueCommission {
    pub venue_id: u64,
    pub venue_name: String,
    /// Sum of the net amounts of the paid tips.
    pub total_tips: i64,
    pub transaction_count: i64,
    pub platform_fee: i64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct CommissionReport {
    pub range: DateRange,
    pub total_tips: i64,
    pub total_platform_fee: i64,
    pub total_transactions: i64,
    pub venues: Vec<VenueCommission>,
}

/// Commission per venue over paid tips, largest venue first.
pub fn build_commission_report(range: DateRange, tips: &[TipRecord]) -> CommissionReport {
    let mut venues: Vec<VenueCommission> = Vec::new();
    let mut index: HashMap<u64, usize> = HashMap::new();

    for record in tips {
        let position = *index.entry(record.tip.venue_id).or_insert_with(|| {
            venues.push(VenueCommission {
                venue_id: record.tip.venue_id,
                venue_name: record.venue_name.clone(),
                total_tips: 0,
                transaction_count: 0,
                platform_fee: 0,
            });
            venues.len() - 1
        });
        let venue = &mut venues[position];
        venue.total_tips += record.tip.amounts.net_amount;
        venue.transaction_count += 1;
    }

    for venue in venues.iter_mut() {
        venue.platform_fee = platform_fee(venue.total_tips);
    }
    venues.sort_by(|a, b| b.total_tips.cmp(&a.total_tips));

    CommissionReport {
        range,
        total_tips: venues.iter().map(|v| v.total_tips).sum(),
        total_platform_fee: venues.iter().map(|v| v.platform_fee).sum(),
        total_transactions: venues.iter().map(|v| v.transaction_count).sum(),
        venues,
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct StaffPayout {
    pub staff_id: u64,
    pub display_name: String,
    pub role: StaffRole,
    pub tips_count: i64,
    pub gross_amount: i64,
    pub platform_fee: i64,
    pub net_amount: i64,
    pub status: PayoutStatus,
}

#[derive(Debug, PartialEq, Clone)]
pub struct PayoutReport {
    pub payout_id: Option<u64>,
    pub range: DateRange,
    pub total_gross: i64,
    pub total_fee: i64,
    pub total_net: i64,
    pub status: PayoutStatus,
    pub staff_payouts: Vec<StaffPayout>,
}

/// Group allocations per staff member. The fee is only shown, it was
/// already retained when the tip was paid.
pub fn build_payout_report(
    payout_id: Option<u64>,
    range: DateRange,
    allocations: &[AllocationRecord],
) -> PayoutReport {
    let mut staff_payouts: Vec<StaffPayout> = Vec::new();
    let mut index: HashMap<u64, usize> = HashMap::new();

    for record in allocations {
        let allocation = &record.allocation;
        let position = *index.entry(allocation.staff_id).or_insert_with(|| {
            staff_payouts.push(StaffPayout {
                staff_id: allocation.staff_id,
                display_name: record.staff_display_name.clone(),
                role: record.staff_role,
                tips_count: 0,
                gross_amount: 0,
                platform_fee: 0,
                net_amount: 0,
                status: PayoutStatus::Paid,
            });
            staff_payouts.len() - 1
        });
        let entry = &mut staff_payouts[position];
        entry.tips_count += 1;
        entry.gross_amount += allocation.amount;
        if allocation.status == PayoutStatus::Pending {
            entry.status = PayoutStatus::Pending;
        }
    }

    for entry in staff_payouts.iter_mut() {
        entry.platform_fee = platform_fee(entry.gross_amount);
        entry.net_amount = entry.gross_amount - entry.platform_fee;
    }
    staff_payouts.sort_by(|a, b| {
        b.gross_amount
            .cmp(&a.gross_amount)
            .then(a.staff_id.cmp(&b.staff_id))
    });

    let status = if !staff_payouts.is_empty()
        && staff_payouts.iter().all(|s| s.status == PayoutStatus::Paid)
    {
        PayoutStatus::Paid
    } else {
        PayoutStatus::Pending
    };

    PayoutReport {
        payout_id,
        range,
        total_gross: staff_payouts.iter().map(|s| s.gross_amount).sum(),
        total_fee: staff_payouts.iter().map(|s| s.platform_fee).sum(),
        total_net: staff_payouts.iter().map(|s| s.net_amount).sum(),
        status,
        staff_payouts,
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct TopStaff {
    pub staff_id: u64,
    pub display_name: String,
    pub total_tips: i64,
    pub tips_count: i64,
}

#[derive(Debug, PartialEq, Clone)]
pub struct Dashboard {
    pub total_tips: i64,
    pub transaction_count: i64,
    pub average_tip: i64,
    pub active_staff: i64,
    pub top_staff: Vec<TopStaff>,
    pub has_pending_payouts: bool,
}

const TOP_STAFF_LIMIT: usize = 5;

/// Venue metrics over the paid tips of a period.
pub fn build_dashboard(tips: &[TipRecord], active_staff: i64, has_pending_payouts: bool) -> Dashboard {
    let total_tips: i64 = tips.iter().map(|r| r.tip.amounts.net_amount).sum();
    let transaction_count = tips.len() as i64;
    let average_tip = if transaction_count > 0 {
        (total_tips + transaction_count / 2) / transaction_count
    } else {
        0
    };

    let mut top_staff: Vec<TopStaff> = Vec::new();
    let mut index: HashMap<u64, usize> = HashMap::new();
    for record in tips {
        let (Some(staff_id), Some(name)) = (record.tip.staff_id, record.staff_name.as_ref()) else {
            continue;
        };
        let position = *index.entry(staff_id).or_insert_with(|| {
            top_staff.push(TopStaff {
                staff_id,
                display_name: name.clone(),
                total_tips: 0,
                tips_count: 0,
            });
            top_staff.len() - 1
        });
        top_staff[position].total_tips += record.tip.amounts.net_amount;
        top_staff[position].tips_count += 1;
    }
    top_staff.sort_by(|a, b| {
        b.total_tips
            .cmp(&a.total_tips)
            .then(a.staff_id.cmp(&b.staff_id))
    });
    top_staff.truncate(TOP_STAFF_LIMIT);

    Dashboard {
        total_tips,
        transaction_count,
        average_tip,
        active_staff,
        top_staff,
        has_pending_payouts,
    }
}

#[cfg(test)]
mod tests {
    use chrono::Timelike;

    use super::*;
    use crate::models::{Tip, TipAllocation, TipAmounts, TipStatus, TipType};

    fn date(value: &str) -> NaiveDate {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").unwrap()
    }

    fn paid_tip(venue_id: u64, venue_name: &str, amount: i64, staff: Option<(u64, &str)>) -> TipRecord {
        TipRecord {
            tip: Tip {
                id: 0,
                venue_id,
                qr_code_id: 1,
                staff_id: staff.map(|(id, _)| id),
                amounts: TipAmounts::compute(amount, false).unwrap(),
                tip_type: if staff.is_some() { TipType::Personal } else { TipType::Pool },
                status: TipStatus::Paid,
                order_id: format!("TIP-{venue_id}-{amount}"),
                payment_type: None,
                created_at: Utc::now(),
                paid_at: Some(Utc::now()),
            },
            venue_name: venue_name.to_owned(),
            staff_name: staff.map(|(_, name)| name.to_owned()),
        }
    }

    fn allocation(staff_id: u64, name: &str, amount: i64, status: PayoutStatus) -> AllocationRecord {
        AllocationRecord {
            allocation: TipAllocation {
                id: 0,
                tip_id: 1,
                staff_id,
                amount,
                date: Utc::now(),
                payout_id: None,
                status,
            },
            staff_display_name: name.to_owned(),
            staff_role: StaffRole::Waiter,
        }
    }

    #[test]
    fn test_date_range_bounds() {
        let range = DateRange::parse("2024-03-01", "2024-03-31").unwrap();
        assert_eq!(range.start_time().to_rfc3339(), "2024-03-01T00:00:00+00:00");

        let end = range.end_time();
        assert_eq!(end.date_naive(), date("2024-03-31"));
        assert_eq!((end.hour(), end.minute(), end.second()), (23, 59, 59));
        assert_eq!(end.timestamp_subsec_millis(), 999);

        assert!(DateRange::parse("2024-03-02", "2024-03-01").is_err());
        assert!(DateRange::parse("01.03.2024", "2024-03-01").is_err());
    }

    #[test]
    fn test_date_range_rejects_extreme_years() {
        assert_eq!(
            DateRange::parse("+262142-12-31", "+262142-12-31"),
            Err(ServiceError::validation(
                "Dates must be between 2000-01-01 and 9999-12-31"
            ))
        );
        assert!(DateRange::parse("1999-12-31", "2024-01-01").is_err());
        assert!(DateRange::inclusive(NaiveDate::MIN, date("2024-01-01")).is_err());

        let range = DateRange::parse("9999-12-31", "9999-12-31").unwrap();
        assert_eq!(range.end_time().date_naive(), date("9999-12-31"));
    }

    #[test]
    fn test_commission_report() {
        let range = DateRange::inclusive(date("2024-01-01"), date("2024-01-31")).unwrap();
        let tips = vec![
            paid_tip(1, "Warung Sari", 50_000, None),
            paid_tip(2, "Kopi Kita", 20_000, None),
            paid_tip(1, "Warung Sari", 100_000, None),
        ];

        let report = build_commission_report(range, &tips);

        assert_eq!(report.venues.len(), 2);
        assert_eq!(report.venues[0].venue_name, "Warung Sari");
        assert_eq!(report.venues[0].total_tips, 142_500);
        assert_eq!(report.venues[0].platform_fee, 7_125);
        assert_eq!(report.venues[0].transaction_count, 2);
        assert_eq!(report.venues[1].total_tips, 19_000);
        assert_eq!(report.venues[1].platform_fee, 950);
        assert_eq!(report.total_tips, 161_500);
        assert_eq!(report.total_platform_fee, 8_075);
        assert_eq!(report.total_transactions, 3);
    }

    #[test]
    fn test_commission_report_empty() {
        let range = DateRange::inclusive(date("2024-01-01"), date("2024-01-01")).unwrap();
        let report = build_commission_report(range, &[]);
        assert!(report.venues.is_empty());
        assert_eq!(report.total_tips, 0);
    }

    #[test]
    fn test_payout_report() {
        let range = DateRange::inclusive(date("2024-01-01"), date("2024-01-07")).unwrap();
        let allocations = vec![
            allocation(1, "Agung", 47_500, PayoutStatus::Pending),
            allocation(2, "Wayan", 10_001, PayoutStatus::Paid),
            allocation(1, "Agung", 9_500, PayoutStatus::Pending),
        ];

        let report = build_payout_report(None, range, &allocations);

        assert_eq!(report.staff_payouts.len(), 2);
        let agung = &report.staff_payouts[0];
        assert_eq!(agung.display_name, "Agung");
        assert_eq!(agung.tips_count, 2);
        assert_eq!(agung.gross_amount, 57_000);
        assert_eq!(agung.platform_fee, 2_850);
        assert_eq!(agung.net_amount, 54_150);
        assert_eq!(agung.status, PayoutStatus::Pending);

        let wayan = &report.staff_payouts[1];
        assert_eq!(wayan.platform_fee, 501);
        assert_eq!(wayan.net_amount, 9_500);
        assert_eq!(wayan.status, PayoutStatus::Paid);

        assert_eq!(report.total_gross, 67_001);
        assert_eq!(report.total_fee, 3_351);
        assert_eq!(report.total_net, report.total_gross - report.total_fee);
        assert_eq!(report.status, PayoutStatus::Pending);
    }

    #[test]
    fn test_payout_report_all_paid() {
        let range = DateRange::inclusive(date("2024-01-01"), date("2024-01-07")).unwrap();
        let allocations = vec![allocation(1, "Agung", 1_000, PayoutStatus::Paid)];
        assert_eq!(
            build_payout_report(Some(3), range, &allocations).status,
            PayoutStatus::Paid
        );
        assert_eq!(
            build_payout_report(None, range, &[]).status,
            PayoutStatus::Pending
        );
    }

    #[test]
    fn test_dashboard() {
        let tips = vec![
            paid_tip(1, "Warung Sari", 50_000, Some((7, "Agung"))),
            paid_tip(1, "Warung Sari", 20_000, Some((8, "Wayan"))),
            paid_tip(1, "Warung Sari", 10_000, None),
            paid_tip(1, "Warung Sari", 30_000, Some((8, "Wayan"))),
        ];

        let dashboard = build_dashboard(&tips, 3, true);

        assert_eq!(dashboard.total_tips, 104_500);
        assert_eq!(dashboard.transaction_count, 4);
        assert_eq!(dashboard.average_tip, 26_125);
        assert_eq!(dashboard.active_staff, 3);
        assert!(dashboard.has_pending_payouts);
        assert_eq!(dashboard.top_staff.len(), 2);
        assert_eq!(dashboard.top_staff[0].display_name, "Agung");
        assert_eq!(dashboard.top_staff[0].total_tips, 47_500);
        assert_eq!(dashboard.top_staff[1].tips_count, 2);
        assert_eq!(dashboard.top_staff[1].total_tips, 47_500);
    }

    #[test]
    fn test_dashboard_period_start() {
        // 2024-05-16 is a thursday
        let now = Utc.with_ymd_and_hms(2024, 5, 16, 15, 30, 0).unwrap();
        assert_eq!(
            DashboardPeriod::Today.start(now),
            Utc.with_ymd_and_hms(2024, 5, 16, 0, 0, 0).unwrap()
        );
        assert_eq!(
            DashboardPeriod::Week.start(now),
            Utc.with_ymd_and_hms(2024, 5, 13, 0, 0, 0).unwrap()
        );
        assert_eq!(
            DashboardPeriod::Month.start(now),
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        assert!(DashboardPeriod::parse("year").is_err());
    }
}
