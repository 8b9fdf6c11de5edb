use chrono::{DateTime, NaiveDate, Utc};
use sqlx::Connection;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{AllocationRecord, Payout, PayoutStatus, StaffRole, TipAllocation};
use crate::reports::DateRange;

use super::{from_id, parse_text, to_id, DatabaseConnection};

#[derive(sqlx::FromRow)]
struct PayoutRow {
    id: i64,
    venue_id: i64,
    period_start: NaiveDate,
    period_end: NaiveDate,
    total_amount: i64,
    status: String,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<PayoutRow> for Payout {
    type Error = ServiceError;

    fn try_from(row: PayoutRow) -> Result<Self, Self::Error> {
        Ok(Payout {
            id: to_id(row.id),
            venue_id: to_id(row.venue_id),
            period_start: row.period_start,
            period_end: row.period_end,
            total_amount: row.total_amount,
            status: parse_text(&row.status, PayoutStatus::parse)?,
            paid_at: row.paid_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct AllocationRecordRow {
    id: i64,
    tip_id: i64,
    staff_id: i64,
    amount: i64,
    date: DateTime<Utc>,
    payout_id: Option<i64>,
    status: String,
    staff_display_name: String,
    staff_role: String,
}

impl TryFrom<AllocationRecordRow> for AllocationRecord {
    type Error = ServiceError;

    fn try_from(row: AllocationRecordRow) -> Result<Self, Self::Error> {
        Ok(AllocationRecord {
            allocation: TipAllocation {
                id: to_id(row.id),
                tip_id: to_id(row.tip_id),
                staff_id: to_id(row.staff_id),
                amount: row.amount,
                date: row.date,
                payout_id: row.payout_id.map(to_id),
                status: parse_text(&row.status, PayoutStatus::parse)?,
            },
            staff_display_name: row.staff_display_name,
            staff_role: parse_text(&row.staff_role, StaffRole::parse)?,
        })
    }
}

const PAYOUT_COLUMNS: &str = "id, venue_id, period_start, period_end, total_amount, status, paid_at";

impl DatabaseConnection {
    pub async fn get_payout_for_period(
        &mut self,
        venue_id: u64,
        range: &DateRange,
    ) -> ServiceResult<Option<Payout>> {
        let row: Option<PayoutRow> = sqlx::query_as(&format!(
            "SELECT {PAYOUT_COLUMNS} FROM payouts WHERE venue_id = $1 AND period_start = $2 AND period_end = $3"
        ))
        .bind(from_id(venue_id))
        .bind(range.start)
        .bind(range.end)
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(Payout::try_from).transpose()
    }

    /// Allocations of a venue within the period that are either unassigned or
    /// belong to the payout of exactly this period.
    pub async fn get_allocation_records(
        &mut self,
        venue_id: u64,
        range: &DateRange,
    ) -> ServiceResult<Vec<AllocationRecord>> {
        let rows: Vec<AllocationRecordRow> = sqlx::query_as(
            "SELECT a.id, a.tip_id, a.staff_id, a.amount, a.date, a.payout_id, a.status, \
                    s.display_name AS staff_display_name, s.role AS staff_role \
             FROM tip_allocations a \
             JOIN staff s ON s.id = a.staff_id \
             LEFT JOIN payouts p ON p.id = a.payout_id \
             WHERE s.venue_id = $1 AND a.date >= $2 AND a.date <= $3 \
             AND (a.payout_id IS NULL OR (p.period_start = $4 AND p.period_end = $5)) \
             ORDER BY a.date, a.id",
        )
        .bind(from_id(venue_id))
        .bind(range.start_time())
        .bind(range.end_time())
        .bind(range.start)
        .bind(range.end)
        .fetch_all(&mut *self.connection)
        .await?;

        rows.into_iter().map(AllocationRecord::try_from).collect()
    }

    /// Record that the allocations of a period were paid out, either all of
    /// them or the ones of a single staff member.
    ///
    /// The payout is only marked paid once all of its allocations are paid.
    pub async fn mark_payout_paid(
        &mut self,
        venue_id: u64,
        range: &DateRange,
        staff_id: Option<u64>,
    ) -> ServiceResult<Payout> {
        let mut tx = self.connection.begin().await?;

        let payout_id: i64 = sqlx::query_scalar(
            "INSERT INTO payouts (venue_id, period_start, period_end) VALUES ($1, $2, $3) \
             ON CONFLICT (venue_id, period_start, period_end) DO UPDATE SET venue_id = EXCLUDED.venue_id \
             RETURNING id",
        )
        .bind(from_id(venue_id))
        .bind(range.start)
        .bind(range.end)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE tip_allocations a SET payout_id = $1 FROM staff s \
             WHERE s.id = a.staff_id AND s.venue_id = $2 AND a.payout_id IS NULL \
             AND a.date >= $3 AND a.date <= $4",
        )
        .bind(payout_id)
        .bind(from_id(venue_id))
        .bind(range.start_time())
        .bind(range.end_time())
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "UPDATE tip_allocations SET status = 'PAID' \
             WHERE payout_id = $1 AND ($2::BIGINT IS NULL OR staff_id = $2)",
        )
        .bind(payout_id)
        .bind(staff_id.map(from_id))
        .execute(&mut *tx)
        .await?;

        let row: PayoutRow = sqlx::query_as(&format!(
            "UPDATE payouts SET \
                total_amount = (SELECT COALESCE(SUM(amount), 0)::BIGINT FROM tip_allocations WHERE payout_id = $1), \
                status = CASE WHEN EXISTS ( \
                    SELECT 1 FROM tip_allocations WHERE payout_id = $1 AND status = 'PENDING' \
                ) THEN 'PENDING' ELSE 'PAID' END, \
                paid_at = CASE WHEN EXISTS ( \
                    SELECT 1 FROM tip_allocations WHERE payout_id = $1 AND status = 'PENDING' \
                ) THEN NULL ELSE now() END \
             WHERE id = $1 RETURNING {PAYOUT_COLUMNS}"
        ))
        .bind(payout_id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        row.try_into()
    }

    /// Whether the venue has allocations that were not paid out yet.
    pub async fn has_pending_allocations(&mut self, venue_id: u64) -> ServiceResult<bool> {
        let pending: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM tip_allocations a JOIN staff s ON s.id = a.staff_id \
             WHERE s.venue_id = $1 AND a.status = 'PENDING')",
        )
        .bind(from_id(venue_id))
        .fetch_one(&mut *self.connection)
        .await?;
        Ok(pending)
    }
}
