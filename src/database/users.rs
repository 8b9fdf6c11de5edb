use chrono::{DateTime, Utc};
use sqlx::{Connection, PgConnection};

use crate::crypto::generate_random_string;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{Role, Session, User, Venue, VenueType};

use super::venues::insert_draft_venue;
use super::{from_id, parse_text, to_id, DatabaseConnection};

/// Wrong guesses a one time code survives.
pub const MAX_OTP_ATTEMPTS: i32 = 5;

#[derive(sqlx::FromRow)]
pub(super) struct UserRow {
    id: i64,
    email: Option<String>,
    phone: Option<String>,
    password_hash: Option<Vec<u8>>,
    role: String,
}

impl TryFrom<UserRow> for User {
    type Error = ServiceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(User {
            id: to_id(row.id),
            email: row.email,
            phone: row.phone,
            password_hash: row.password_hash,
            role: parse_text(&row.role, Role::parse)?,
        })
    }
}

const USER_COLUMNS: &str = "id, email, phone, password_hash, role";

pub(super) async fn insert_user(connection: &mut PgConnection, user: &User) -> ServiceResult<User> {
    let row: UserRow = sqlx::query_as(&format!(
        "INSERT INTO users (email, phone, password_hash, role) VALUES ($1, $2, $3, $4) RETURNING {USER_COLUMNS}"
    ))
    .bind(&user.email)
    .bind(&user.phone)
    .bind(&user.password_hash)
    .bind(user.role.as_str())
    .fetch_one(&mut *connection)
    .await?;

    row.try_into()
}

impl DatabaseConnection {
    pub async fn get_user_by_id(&mut self, id: u64) -> ServiceResult<Option<User>> {
        let row: Option<UserRow> =
            sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
                .bind(from_id(id))
                .fetch_optional(&mut *self.connection)
                .await?;

        row.map(User::try_from).transpose()
    }

    pub async fn get_user_by_email(&mut self, email: &str) -> ServiceResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1)"
        ))
        .bind(email)
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Look up a user by email address or phone number.
    pub async fn get_user_by_contact(&mut self, contact: &str) -> ServiceResult<Option<User>> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE lower(email) = lower($1) OR phone = $1 ORDER BY id LIMIT 1"
        ))
        .bind(contact)
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(User::try_from).transpose()
    }

    /// Insert the user if its id is `0`, update it otherwise.
    pub async fn store_user(&mut self, user: User) -> ServiceResult<User> {
        if user.id == 0 {
            return insert_user(&mut self.connection, &user).await;
        }

        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET email = $2, phone = $3, password_hash = $4, role = $5 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(from_id(user.id))
        .bind(&user.email)
        .bind(&user.phone)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ServiceError::NotFound("User not found")),
        }
    }

    /// Create a manager together with its draft venue.
    pub async fn register_manager(
        &mut self,
        email: &str,
        password_hash: Vec<u8>,
        venue_name: &str,
        venue_type: VenueType,
    ) -> ServiceResult<(User, Venue)> {
        if self.get_user_by_email(email).await?.is_some() {
            return Err(ServiceError::validation("Email is already registered"));
        }

        let mut tx = self.connection.begin().await?;

        let user = insert_user(
            &mut tx,
            &User {
                id: 0,
                email: Some(email.to_owned()),
                phone: None,
                password_hash: Some(password_hash),
                role: Role::Manager,
            },
        )
        .await?;
        let venue = insert_draft_venue(&mut tx, user.id, venue_name, venue_type).await?;

        tx.commit().await?;
        Ok((user, venue))
    }

    pub async fn count_users(&mut self) -> ServiceResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users")
            .fetch_one(&mut *self.connection)
            .await?;
        Ok(count)
    }

    pub async fn create_session_token(
        &mut self,
        user_id: u64,
        valid_until: DateTime<Utc>,
    ) -> ServiceResult<String> {
        let token = generate_random_string(64);

        sqlx::query("INSERT INTO sessions (token, user_id, valid_until) VALUES ($1, $2, $3)")
            .bind(&token)
            .bind(from_id(user_id))
            .bind(valid_until)
            .execute(&mut *self.connection)
            .await?;

        Ok(token)
    }

    pub async fn get_session_by_session_token(
        &mut self,
        token: String,
    ) -> ServiceResult<Option<Session>> {
        let row: Option<(i64, DateTime<Utc>)> = sqlx::query_as(
            "SELECT user_id, valid_until FROM sessions WHERE token = $1 AND valid_until > now()",
        )
        .bind(&token)
        .fetch_optional(&mut *self.connection)
        .await?;

        let Some((user_id, valid_until)) = row else {
            return Ok(None);
        };

        Ok(self
            .get_user_by_id(to_id(user_id))
            .await?
            .map(|user| Session {
                user,
                token,
                valid_until,
            }))
    }

    pub async fn delete_session_token(&mut self, token: String) -> ServiceResult<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    pub async fn store_otp_code(
        &mut self,
        contact: &str,
        code: &str,
        valid_until: DateTime<Utc>,
    ) -> ServiceResult<()> {
        sqlx::query("INSERT INTO otp_codes (contact, code, valid_until) VALUES ($1, $2, $3)")
            .bind(contact)
            .bind(code)
            .bind(valid_until)
            .execute(&mut *self.connection)
            .await?;
        Ok(())
    }

    /// Mark the newest unexpired code of `contact` as used if `code` matches it.
    ///
    /// Every mismatch counts as an attempt, after `MAX_OTP_ATTEMPTS` the code is
    /// no longer accepted. Returns `false` if the code was not consumed.
    pub async fn consume_otp_code(&mut self, contact: &str, code: &str) -> ServiceResult<bool> {
        let mut tx = self.connection.begin().await?;

        let pending: Option<(i64, String)> = sqlx::query_as(
            "SELECT id, code FROM otp_codes
             WHERE contact = $1 AND used = FALSE AND valid_until > now() AND attempts < $2
             ORDER BY id DESC LIMIT 1
             FOR UPDATE",
        )
        .bind(contact)
        .bind(MAX_OTP_ATTEMPTS)
        .fetch_optional(&mut *tx)
        .await?;

        let Some((id, expected)) = pending else {
            return Ok(false);
        };

        let consumed = expected == code;
        let statement = if consumed {
            "UPDATE otp_codes SET used = TRUE WHERE id = $1"
        } else {
            "UPDATE otp_codes SET attempts = attempts + 1 WHERE id = $1"
        };
        sqlx::query(statement).bind(id).execute(&mut *tx).await?;

        tx.commit().await?;
        Ok(consumed)
    }
}
