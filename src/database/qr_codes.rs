use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{QrCode, QrCodeSummary, QrStatus, QrType, Staff, Venue};
use crate::qr::generate_short_code;

use super::staff::{StaffRow, STAFF_COLUMNS};
use super::{from_id, parse_text, to_id, DatabaseConnection};

/// Outcome of removing a qr code.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum QrRemoval {
    Deleted,
    /// The code has tips and was only switched to inactive.
    Deactivated,
}

#[derive(sqlx::FromRow)]
pub(super) struct QrCodeRow {
    id: i64,
    venue_id: i64,
    short_code: String,
    qr_type: String,
    label: String,
    status: String,
    staff_id: Option<i64>,
    created_at: DateTime<Utc>,
}

impl TryFrom<QrCodeRow> for QrCode {
    type Error = ServiceError;

    fn try_from(row: QrCodeRow) -> Result<Self, Self::Error> {
        Ok(QrCode {
            id: to_id(row.id),
            venue_id: to_id(row.venue_id),
            short_code: row.short_code,
            qr_type: parse_text(&row.qr_type, QrType::parse)?,
            label: row.label,
            status: parse_text(&row.status, QrStatus::parse)?,
            staff_id: row.staff_id.map(to_id),
            created_at: row.created_at,
        })
    }
}

pub(super) const QR_CODE_COLUMNS: &str =
    "id, venue_id, short_code, qr_type, label, status, staff_id, created_at";

pub(super) async fn insert_qr_code(
    connection: &mut PgConnection,
    venue_id: u64,
    qr_type: QrType,
    label: &str,
    staff_id: Option<u64>,
) -> ServiceResult<QrCode> {
    let row: QrCodeRow = sqlx::query_as(&format!(
        "INSERT INTO qr_codes (venue_id, short_code, qr_type, label, status, staff_id) \
         VALUES ($1, $2, $3, $4, $5, $6) RETURNING {QR_CODE_COLUMNS}"
    ))
    .bind(from_id(venue_id))
    .bind(generate_short_code())
    .bind(qr_type.as_str())
    .bind(label)
    .bind(QrStatus::Active.as_str())
    .bind(staff_id.map(from_id))
    .fetch_one(&mut *connection)
    .await?;

    row.try_into()
}

impl DatabaseConnection {
    pub async fn get_qr_code_by_id(&mut self, id: u64) -> ServiceResult<Option<QrCode>> {
        let row: Option<QrCodeRow> =
            sqlx::query_as(&format!("SELECT {QR_CODE_COLUMNS} FROM qr_codes WHERE id = $1"))
                .bind(from_id(id))
                .fetch_optional(&mut *self.connection)
                .await?;

        row.map(QrCode::try_from).transpose()
    }

    pub async fn get_qr_code_by_short_code(
        &mut self,
        short_code: &str,
    ) -> ServiceResult<Option<QrCode>> {
        let row: Option<QrCodeRow> = sqlx::query_as(&format!(
            "SELECT {QR_CODE_COLUMNS} FROM qr_codes WHERE short_code = $1"
        ))
        .bind(short_code)
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(QrCode::try_from).transpose()
    }

    /// Qr codes of a venue ordered by type and newest first, with staff and tip counts.
    pub async fn get_qr_code_summaries(
        &mut self,
        venue_id: u64,
    ) -> ServiceResult<Vec<QrCodeSummary>> {
        let rows: Vec<QrCodeRow> = sqlx::query_as(&format!(
            "SELECT {QR_CODE_COLUMNS} FROM qr_codes WHERE venue_id = $1 ORDER BY qr_type, created_at DESC, id DESC"
        ))
        .bind(from_id(venue_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let staff_rows: Vec<StaffRow> =
            sqlx::query_as(&format!("SELECT {STAFF_COLUMNS} FROM staff WHERE venue_id = $1"))
                .bind(from_id(venue_id))
                .fetch_all(&mut *self.connection)
                .await?;

        let tip_counts: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT qr_code_id, COUNT(*) FROM tips WHERE venue_id = $1 GROUP BY qr_code_id",
        )
        .bind(from_id(venue_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let mut staff = HashMap::new();
        for row in staff_rows {
            let member = Staff::try_from(row)?;
            staff.insert(member.id, member);
        }
        let tip_counts: HashMap<u64, i64> = tip_counts
            .into_iter()
            .map(|(qr_code_id, count)| (to_id(qr_code_id), count))
            .collect();

        rows.into_iter()
            .map(|row| {
                let qr_code = QrCode::try_from(row)?;
                Ok(QrCodeSummary {
                    staff: qr_code.staff_id.and_then(|id| staff.get(&id).cloned()),
                    tip_count: tip_counts.get(&qr_code.id).copied().unwrap_or(0),
                    qr_code,
                })
            })
            .collect()
    }

    /// Create a table or venue qr code.
    ///
    /// Personal qr codes are only created together with their staff member.
    pub async fn create_qr_code(
        &mut self,
        venue: &Venue,
        qr_type: QrType,
        label: &str,
    ) -> ServiceResult<QrCode> {
        if qr_type == QrType::Personal {
            return Err(ServiceError::validation(
                "Personal QR codes are created with their staff member",
            ));
        }
        if !venue.gateway_connected {
            return Err(ServiceError::state(
                "Please connect Midtrans before creating QR codes",
            ));
        }

        insert_qr_code(&mut self.connection, venue.id, qr_type, label, None).await
    }

    /// Persist label and status of a qr code. Type, venue and staff never change.
    pub async fn store_qr_code(&mut self, qr_code: QrCode) -> ServiceResult<QrCode> {
        let row: Option<QrCodeRow> = sqlx::query_as(&format!(
            "UPDATE qr_codes SET label = $2, status = $3 WHERE id = $1 RETURNING {QR_CODE_COLUMNS}"
        ))
        .bind(from_id(qr_code.id))
        .bind(&qr_code.label)
        .bind(qr_code.status.as_str())
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ServiceError::NotFound("QR code not found")),
        }
    }

    pub async fn count_tips_for_qr_code(&mut self, id: u64) -> ServiceResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tips WHERE qr_code_id = $1")
            .bind(from_id(id))
            .fetch_one(&mut *self.connection)
            .await?;
        Ok(count)
    }

    /// Delete a qr code, or deactivate it if tips reference it.
    pub async fn remove_qr_code(&mut self, qr_code: &QrCode) -> ServiceResult<QrRemoval> {
        if qr_code.qr_type == QrType::Personal {
            return Err(ServiceError::state(
                "Personal QR codes cannot be deleted directly. Deactivate the staff member instead.",
            ));
        }

        if self.count_tips_for_qr_code(qr_code.id).await? > 0 {
            sqlx::query("UPDATE qr_codes SET status = $2 WHERE id = $1")
                .bind(from_id(qr_code.id))
                .bind(QrStatus::Inactive.as_str())
                .execute(&mut *self.connection)
                .await?;
            return Ok(QrRemoval::Deactivated);
        }

        sqlx::query("DELETE FROM qr_codes WHERE id = $1")
            .bind(from_id(qr_code.id))
            .execute(&mut *self.connection)
            .await?;
        Ok(QrRemoval::Deleted)
    }
}
