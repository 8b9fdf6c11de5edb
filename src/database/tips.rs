use chrono::{DateTime, Utc};
use log::{info, warn};
use sqlx::{Connection, PgConnection};

use crate::error::{ServiceError, ServiceResult};
use crate::fees::split_evenly;
use crate::models::{Tip, TipAmounts, TipRecord, TipStatus, TipType};

use super::staff::pool_participants;
use super::{from_id, parse_text, to_id, DatabaseConnection};

/// A tip before it has been stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTip {
    pub venue_id: u64,
    pub qr_code_id: u64,
    pub staff_id: Option<u64>,
    pub amounts: TipAmounts,
    pub tip_type: TipType,
    pub order_id: String,
}

/// Filter of the admin transaction listing.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TipFilter {
    pub status: Option<TipStatus>,
    pub venue_id: Option<u64>,
    /// Gateway status as reported by the latest notification, eg. `settlement`.
    pub gateway_status: Option<String>,
    pub limit: i64,
}

#[derive(sqlx::FromRow)]
struct TipRow {
    id: i64,
    venue_id: i64,
    qr_code_id: i64,
    staff_id: Option<i64>,
    amount: i64,
    platform_fee: i64,
    net_amount: i64,
    total_amount: i64,
    guest_pays_fee: bool,
    tip_type: String,
    status: String,
    order_id: String,
    payment_type: Option<String>,
    created_at: DateTime<Utc>,
    paid_at: Option<DateTime<Utc>>,
}

impl TryFrom<TipRow> for Tip {
    type Error = ServiceError;

    fn try_from(row: TipRow) -> Result<Self, Self::Error> {
        Ok(Tip {
            id: to_id(row.id),
            venue_id: to_id(row.venue_id),
            qr_code_id: to_id(row.qr_code_id),
            staff_id: row.staff_id.map(to_id),
            amounts: TipAmounts {
                amount: row.amount,
                platform_fee: row.platform_fee,
                net_amount: row.net_amount,
                total_amount: row.total_amount,
                guest_pays_fee: row.guest_pays_fee,
            },
            tip_type: parse_text(&row.tip_type, TipType::parse)?,
            status: parse_text(&row.status, TipStatus::parse)?,
            order_id: row.order_id,
            payment_type: row.payment_type,
            created_at: row.created_at,
            paid_at: row.paid_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TipRecordRow {
    #[sqlx(flatten)]
    tip: TipRow,
    venue_name: String,
    staff_name: Option<String>,
}

impl TryFrom<TipRecordRow> for TipRecord {
    type Error = ServiceError;

    fn try_from(row: TipRecordRow) -> Result<Self, Self::Error> {
        Ok(TipRecord {
            tip: row.tip.try_into()?,
            venue_name: row.venue_name,
            staff_name: row.staff_name,
        })
    }
}

const TIP_COLUMNS: &str = "id, venue_id, qr_code_id, staff_id, amount, platform_fee, net_amount, \
    total_amount, guest_pays_fee, tip_type, status, order_id, payment_type, created_at, paid_at";

const TIP_RECORD_SELECT: &str = "SELECT t.id, t.venue_id, t.qr_code_id, t.staff_id, t.amount, \
    t.platform_fee, t.net_amount, t.total_amount, t.guest_pays_fee, t.tip_type, t.status, \
    t.order_id, t.payment_type, t.created_at, t.paid_at, \
    v.name AS venue_name, s.display_name AS staff_name \
    FROM tips t JOIN venues v ON v.id = t.venue_id LEFT JOIN staff s ON s.id = t.staff_id";

/// Attribute the net amount of a paid tip to staff members.
async fn allocate_tip(connection: &mut PgConnection, tip: &Tip) -> ServiceResult<()> {
    let shares: Vec<(u64, i64)> = match (tip.tip_type, tip.staff_id) {
        (TipType::Personal, Some(staff_id)) => vec![(staff_id, tip.amounts.net_amount)],
        _ => {
            let participants = pool_participants(connection, tip.venue_id).await?;
            if participants.is_empty() {
                warn!(
                    "Venue {} has no pool participants, tip {} stays unallocated",
                    tip.venue_id, tip.order_id
                );
            }
            let amounts = split_evenly(tip.amounts.net_amount, participants.len());
            participants
                .iter()
                .map(|staff| staff.id)
                .zip(amounts)
                .collect()
        }
    };

    for (staff_id, amount) in shares {
        sqlx::query(
            "INSERT INTO tip_allocations (tip_id, staff_id, amount, date, status) VALUES ($1, $2, $3, $4, 'PENDING')",
        )
        .bind(from_id(tip.id))
        .bind(from_id(staff_id))
        .bind(amount)
        .bind(tip.created_at)
        .execute(&mut *connection)
        .await?;
    }

    Ok(())
}

impl DatabaseConnection {
    pub async fn insert_tip(&mut self, tip: NewTip) -> ServiceResult<Tip> {
        let row: TipRow = sqlx::query_as(&format!(
            "INSERT INTO tips (venue_id, qr_code_id, staff_id, amount, platform_fee, net_amount, \
             total_amount, guest_pays_fee, tip_type, status, order_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11) RETURNING {TIP_COLUMNS}"
        ))
        .bind(from_id(tip.venue_id))
        .bind(from_id(tip.qr_code_id))
        .bind(tip.staff_id.map(from_id))
        .bind(tip.amounts.amount)
        .bind(tip.amounts.platform_fee)
        .bind(tip.amounts.net_amount)
        .bind(tip.amounts.total_amount)
        .bind(tip.amounts.guest_pays_fee)
        .bind(tip.tip_type.as_str())
        .bind(TipStatus::Pending.as_str())
        .bind(&tip.order_id)
        .fetch_one(&mut *self.connection)
        .await?;

        row.try_into()
    }

    pub async fn get_tip_by_order_id(&mut self, order_id: &str) -> ServiceResult<Option<Tip>> {
        let row: Option<TipRow> =
            sqlx::query_as(&format!("SELECT {TIP_COLUMNS} FROM tips WHERE order_id = $1"))
                .bind(order_id)
                .fetch_optional(&mut *self.connection)
                .await?;

        row.map(Tip::try_from).transpose()
    }

    pub async fn get_tip_record_by_order_id(
        &mut self,
        order_id: &str,
    ) -> ServiceResult<Option<TipRecord>> {
        let row: Option<TipRecordRow> =
            sqlx::query_as(&format!("{TIP_RECORD_SELECT} WHERE t.order_id = $1"))
                .bind(order_id)
                .fetch_optional(&mut *self.connection)
                .await?;

        row.map(TipRecord::try_from).transpose()
    }

    /// Move a pending tip into a terminal status.
    ///
    /// Returns the updated tip, or `None` if the tip was not pending anymore.
    /// Paid tips get their allocations in the same transaction.
    pub async fn transition_tip_status(
        &mut self,
        order_id: &str,
        status: TipStatus,
        payment_type: Option<&str>,
    ) -> ServiceResult<Option<Tip>> {
        if !status.is_terminal() {
            return Ok(None);
        }

        let mut tx = self.connection.begin().await?;

        let row: Option<TipRow> = sqlx::query_as(&format!(
            "UPDATE tips SET status = $2, payment_type = COALESCE($3, payment_type), \
             paid_at = CASE WHEN $2 = 'PAID' THEN now() ELSE paid_at END \
             WHERE order_id = $1 AND status = 'PENDING' RETURNING {TIP_COLUMNS}"
        ))
        .bind(order_id)
        .bind(status.as_str())
        .bind(payment_type)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };
        let tip = Tip::try_from(row)?;

        if tip.status == TipStatus::Paid {
            allocate_tip(&mut tx, &tip).await?;
        }

        tx.commit().await?;
        info!("Tip {} is now {}", tip.order_id, tip.status.as_str());
        Ok(Some(tip))
    }

    /// Paid tips created within `[start, end]`, optionally of one venue.
    pub async fn get_paid_tip_records(
        &mut self,
        venue_id: Option<u64>,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> ServiceResult<Vec<TipRecord>> {
        let rows: Vec<TipRecordRow> = sqlx::query_as(&format!(
            "{TIP_RECORD_SELECT} WHERE t.status = 'PAID' AND t.created_at >= $1 AND t.created_at <= $2 \
             AND ($3::BIGINT IS NULL OR t.venue_id = $3) ORDER BY t.created_at"
        ))
        .bind(start)
        .bind(end)
        .bind(venue_id.map(from_id))
        .fetch_all(&mut *self.connection)
        .await?;

        rows.into_iter().map(TipRecord::try_from).collect()
    }

    /// Tips for the admin listing, newest first, with the gateway status of
    /// the latest notification (`pending` if there is none).
    pub async fn get_tip_records(
        &mut self,
        filter: &TipFilter,
    ) -> ServiceResult<Vec<(TipRecord, String)>> {
        #[derive(sqlx::FromRow)]
        struct Row {
            #[sqlx(flatten)]
            record: TipRecordRow,
            gateway_status: String,
        }

        let rows: Vec<Row> = sqlx::query_as(&format!(
            "SELECT * FROM ( \
                {TIP_RECORD_SELECT_WITH_GATEWAY} \
             ) records \
             WHERE ($1::TEXT IS NULL OR status = $1) \
             AND ($2::BIGINT IS NULL OR venue_id = $2) \
             AND ($3::TEXT IS NULL OR gateway_status = $3) \
             ORDER BY created_at DESC, id DESC LIMIT $4",
            TIP_RECORD_SELECT_WITH_GATEWAY = tip_record_select_with_gateway()
        ))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.venue_id.map(from_id))
        .bind(filter.gateway_status.as_deref())
        .bind(filter.limit)
        .fetch_all(&mut *self.connection)
        .await?;

        rows.into_iter()
            .map(|row| Ok((TipRecord::try_from(row.record)?, row.gateway_status)))
            .collect()
    }
}

fn tip_record_select_with_gateway() -> String {
    TIP_RECORD_SELECT.replacen(
        " FROM tips t",
        ", COALESCE(( \
            SELECT w.payload->>'transaction_status' FROM webhook_logs w \
            WHERE w.order_id = t.order_id ORDER BY w.created_at DESC, w.id DESC LIMIT 1 \
         ), 'pending') AS gateway_status FROM tips t",
        1,
    )
}
