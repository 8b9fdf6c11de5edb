use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    QrCode, QrStatus, QrType, Role, Staff, StaffRole, StaffStatus, StaffSummary, User,
};

use super::qr_codes::{insert_qr_code, QrCodeRow, QR_CODE_COLUMNS};
use super::users::insert_user;
use super::{from_id, parse_text, to_id, DatabaseConnection};

/// Input for a new staff member, the login fields are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStaff {
    pub display_name: String,
    pub full_name: Option<String>,
    pub role: StaffRole,
    pub avatar_url: Option<String>,
    pub participates_in_pool: bool,
    pub email: Option<String>,
    pub phone: Option<String>,
}

#[derive(sqlx::FromRow)]
pub(super) struct StaffRow {
    id: i64,
    venue_id: i64,
    user_id: Option<i64>,
    display_name: String,
    full_name: Option<String>,
    role: String,
    avatar_url: Option<String>,
    participates_in_pool: bool,
    status: String,
    created_at: DateTime<Utc>,
}

impl TryFrom<StaffRow> for Staff {
    type Error = ServiceError;

    fn try_from(row: StaffRow) -> Result<Self, Self::Error> {
        Ok(Staff {
            id: to_id(row.id),
            venue_id: to_id(row.venue_id),
            user_id: row.user_id.map(to_id),
            display_name: row.display_name,
            full_name: row.full_name,
            role: parse_text(&row.role, StaffRole::parse)?,
            avatar_url: row.avatar_url,
            participates_in_pool: row.participates_in_pool,
            status: parse_text(&row.status, StaffStatus::parse)?,
            created_at: row.created_at,
        })
    }
}

pub(super) const STAFF_COLUMNS: &str = "id, venue_id, user_id, display_name, full_name, role, \
    avatar_url, participates_in_pool, status, created_at";

/// Active staff members of a venue that share pooled tips, in id order.
pub(super) async fn pool_participants(
    connection: &mut PgConnection,
    venue_id: u64,
) -> ServiceResult<Vec<Staff>> {
    let rows: Vec<StaffRow> = sqlx::query_as(&format!(
        "SELECT {STAFF_COLUMNS} FROM staff \
         WHERE venue_id = $1 AND status = 'ACTIVE' AND participates_in_pool = TRUE ORDER BY id"
    ))
    .bind(from_id(venue_id))
    .fetch_all(&mut *connection)
    .await?;

    rows.into_iter().map(Staff::try_from).collect()
}

impl DatabaseConnection {
    pub async fn get_staff_by_id(&mut self, id: u64) -> ServiceResult<Option<Staff>> {
        let row: Option<StaffRow> =
            sqlx::query_as(&format!("SELECT {STAFF_COLUMNS} FROM staff WHERE id = $1"))
                .bind(from_id(id))
                .fetch_optional(&mut *self.connection)
                .await?;

        row.map(Staff::try_from).transpose()
    }

    pub async fn get_staff_by_user(&mut self, user_id: u64) -> ServiceResult<Option<Staff>> {
        let row: Option<StaffRow> = sqlx::query_as(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff WHERE user_id = $1 ORDER BY id LIMIT 1"
        ))
        .bind(from_id(user_id))
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(Staff::try_from).transpose()
    }

    pub async fn get_pool_participants(&mut self, venue_id: u64) -> ServiceResult<Vec<Staff>> {
        pool_participants(&mut self.connection, venue_id).await
    }

    /// Staff of a venue with their personal qr code and number of tips, newest first.
    pub async fn get_staff_summaries(&mut self, venue_id: u64) -> ServiceResult<Vec<StaffSummary>> {
        let rows: Vec<StaffRow> = sqlx::query_as(&format!(
            "SELECT {STAFF_COLUMNS} FROM staff WHERE venue_id = $1 ORDER BY created_at DESC, id DESC"
        ))
        .bind(from_id(venue_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let qr_rows: Vec<QrCodeRow> = sqlx::query_as(&format!(
            "SELECT {QR_CODE_COLUMNS} FROM qr_codes WHERE venue_id = $1 AND staff_id IS NOT NULL"
        ))
        .bind(from_id(venue_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let tip_counts: Vec<(i64, i64)> = sqlx::query_as(
            "SELECT staff_id, COUNT(*) FROM tips WHERE venue_id = $1 AND staff_id IS NOT NULL GROUP BY staff_id",
        )
        .bind(from_id(venue_id))
        .fetch_all(&mut *self.connection)
        .await?;

        let mut qr_codes = HashMap::new();
        for row in qr_rows {
            let qr_code = QrCode::try_from(row)?;
            if let Some(staff_id) = qr_code.staff_id {
                qr_codes.insert(staff_id, qr_code);
            }
        }
        let tip_counts: HashMap<u64, i64> = tip_counts
            .into_iter()
            .map(|(staff_id, count)| (to_id(staff_id), count))
            .collect();

        rows.into_iter()
            .map(|row| {
                let staff = Staff::try_from(row)?;
                Ok(StaffSummary {
                    qr_code: qr_codes.remove(&staff.id),
                    tip_count: tip_counts.get(&staff.id).copied().unwrap_or(0),
                    staff,
                })
            })
            .collect()
    }

    /// Create a staff member with its personal qr code and, if contact data
    /// is given, a staff login.
    pub async fn create_staff_with_qr(
        &mut self,
        venue_id: u64,
        new_staff: NewStaff,
    ) -> ServiceResult<(Staff, QrCode)> {
        if let Some(email) = new_staff.email.as_deref() {
            if self.get_user_by_email(email).await?.is_some() {
                return Err(ServiceError::validation("Email is already registered"));
            }
        }

        let mut tx = self.connection.begin().await?;

        let user_id = if new_staff.email.is_some() || new_staff.phone.is_some() {
            let user = insert_user(
                &mut tx,
                &User {
                    id: 0,
                    email: new_staff.email.clone(),
                    phone: new_staff.phone.clone(),
                    password_hash: None,
                    role: Role::Staff,
                },
            )
            .await?;
            Some(from_id(user.id))
        } else {
            None
        };

        let row: StaffRow = sqlx::query_as(&format!(
            "INSERT INTO staff (venue_id, user_id, display_name, full_name, role, avatar_url, participates_in_pool, status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING {STAFF_COLUMNS}"
        ))
        .bind(from_id(venue_id))
        .bind(user_id)
        .bind(&new_staff.display_name)
        .bind(&new_staff.full_name)
        .bind(new_staff.role.as_str())
        .bind(&new_staff.avatar_url)
        .bind(new_staff.participates_in_pool)
        .bind(StaffStatus::Active.as_str())
        .fetch_one(&mut *tx)
        .await?;
        let staff = Staff::try_from(row)?;

        let qr_code = insert_qr_code(
            &mut tx,
            venue_id,
            QrType::Personal,
            &staff.display_name,
            Some(staff.id),
        )
        .await?;

        tx.commit().await?;
        Ok((staff, qr_code))
    }

    /// Persist the editable fields of a staff member.
    ///
    /// The status of the personal qr code follows the status of the staff member.
    pub async fn store_staff(&mut self, staff: Staff) -> ServiceResult<Staff> {
        let mut tx = self.connection.begin().await?;

        let row: Option<StaffRow> = sqlx::query_as(&format!(
            "UPDATE staff SET display_name = $2, full_name = $3, role = $4, avatar_url = $5, \
             participates_in_pool = $6, status = $7 WHERE id = $1 RETURNING {STAFF_COLUMNS}"
        ))
        .bind(from_id(staff.id))
        .bind(&staff.display_name)
        .bind(&staff.full_name)
        .bind(staff.role.as_str())
        .bind(&staff.avatar_url)
        .bind(staff.participates_in_pool)
        .bind(staff.status.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            return Err(ServiceError::NotFound("Staff not found"));
        };
        let staff = Staff::try_from(row)?;

        let qr_status = match staff.status {
            StaffStatus::Active => QrStatus::Active,
            StaffStatus::Inactive => QrStatus::Inactive,
        };
        sqlx::query("UPDATE qr_codes SET status = $2 WHERE staff_id = $1")
            .bind(from_id(staff.id))
            .bind(qr_status.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(staff)
    }

    pub async fn count_active_staff(&mut self, venue_id: u64) -> ServiceResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM staff WHERE venue_id = $1 AND status = 'ACTIVE'",
        )
        .bind(from_id(venue_id))
        .fetch_one(&mut *self.connection)
        .await?;
        Ok(count)
    }
}
