use chrono::{DateTime, Utc};
use sqlx::PgConnection;

use crate::error::{ServiceError, ServiceResult};
use crate::models::{
    DistributionMode, GatewayEnvironment, MerchantCredentials, Venue, VenueStatus, VenueType,
};

use super::{from_id, parse_text, to_id, DatabaseConnection};

#[derive(sqlx::FromRow)]
pub(super) struct VenueRow {
    id: i64,
    name: String,
    venue_type: String,
    address: Option<String>,
    phone: Option<String>,
    email: Option<String>,
    logo_url: Option<String>,
    timezone: String,
    manager_id: i64,
    status: String,
    gateway_connected: bool,
    merchant_id: Option<String>,
    server_key_encrypted: Option<String>,
    client_key: Option<String>,
    gateway_environment: Option<String>,
    distribution_mode: String,
    allow_staff_choice: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<VenueRow> for Venue {
    type Error = ServiceError;

    fn try_from(row: VenueRow) -> Result<Self, Self::Error> {
        let credentials = match (
            row.merchant_id,
            row.server_key_encrypted,
            row.client_key,
            row.gateway_environment,
        ) {
            (Some(merchant_id), Some(server_key_encrypted), Some(client_key), Some(environment)) => {
                Some(MerchantCredentials {
                    merchant_id,
                    server_key_encrypted,
                    client_key,
                    environment: parse_text(&environment, GatewayEnvironment::parse)?,
                })
            }
            _ => None,
        };

        Ok(Venue {
            id: to_id(row.id),
            name: row.name,
            venue_type: parse_text(&row.venue_type, VenueType::parse)?,
            address: row.address,
            phone: row.phone,
            email: row.email,
            logo_url: row.logo_url,
            timezone: row.timezone,
            manager_id: to_id(row.manager_id),
            status: parse_text(&row.status, VenueStatus::parse)?,
            gateway_connected: row.gateway_connected,
            credentials,
            distribution_mode: parse_text(&row.distribution_mode, DistributionMode::parse)?,
            allow_staff_choice: row.allow_staff_choice,
            created_at: row.created_at,
        })
    }
}

pub(super) const VENUE_COLUMNS: &str = "id, name, venue_type, address, phone, email, logo_url, \
    timezone, manager_id, status, gateway_connected, merchant_id, server_key_encrypted, \
    client_key, gateway_environment, distribution_mode, allow_staff_choice, created_at";

pub(super) async fn insert_draft_venue(
    connection: &mut PgConnection,
    manager_id: u64,
    name: &str,
    venue_type: VenueType,
) -> ServiceResult<Venue> {
    let row: VenueRow = sqlx::query_as(&format!(
        "INSERT INTO venues (name, venue_type, manager_id, status) VALUES ($1, $2, $3, $4) RETURNING {VENUE_COLUMNS}"
    ))
    .bind(name)
    .bind(venue_type.as_str())
    .bind(from_id(manager_id))
    .bind(VenueStatus::Draft.as_str())
    .fetch_one(&mut *connection)
    .await?;

    row.try_into()
}

impl DatabaseConnection {
    pub async fn get_venue_by_id(&mut self, id: u64) -> ServiceResult<Option<Venue>> {
        let row: Option<VenueRow> =
            sqlx::query_as(&format!("SELECT {VENUE_COLUMNS} FROM venues WHERE id = $1"))
                .bind(from_id(id))
                .fetch_optional(&mut *self.connection)
                .await?;

        row.map(Venue::try_from).transpose()
    }

    /// The venue managed by the given user, the oldest one if there are several.
    pub async fn get_venue_by_manager(&mut self, manager_id: u64) -> ServiceResult<Option<Venue>> {
        let row: Option<VenueRow> = sqlx::query_as(&format!(
            "SELECT {VENUE_COLUMNS} FROM venues WHERE manager_id = $1 ORDER BY id LIMIT 1"
        ))
        .bind(from_id(manager_id))
        .fetch_optional(&mut *self.connection)
        .await?;

        row.map(Venue::try_from).transpose()
    }

    pub async fn get_all_venues(&mut self) -> ServiceResult<Vec<Venue>> {
        let rows: Vec<VenueRow> = sqlx::query_as(&format!(
            "SELECT {VENUE_COLUMNS} FROM venues ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&mut *self.connection)
        .await?;

        rows.into_iter().map(Venue::try_from).collect()
    }

    /// Persist the editable profile and settings of a venue.
    ///
    /// Status and gateway credentials have their own operations.
    pub async fn store_venue(&mut self, venue: Venue) -> ServiceResult<Venue> {
        let row: Option<VenueRow> = sqlx::query_as(&format!(
            "UPDATE venues SET name = $2, venue_type = $3, address = $4, phone = $5, email = $6, \
             logo_url = $7, timezone = $8, distribution_mode = $9, allow_staff_choice = $10 \
             WHERE id = $1 RETURNING {VENUE_COLUMNS}"
        ))
        .bind(from_id(venue.id))
        .bind(&venue.name)
        .bind(venue.venue_type.as_str())
        .bind(&venue.address)
        .bind(&venue.phone)
        .bind(&venue.email)
        .bind(&venue.logo_url)
        .bind(&venue.timezone)
        .bind(venue.distribution_mode.as_str())
        .bind(venue.allow_staff_choice)
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ServiceError::NotFound("Venue not found")),
        }
    }

    /// Store merchant credentials. A draft venue becomes active with its first connection.
    pub async fn connect_venue_gateway(
        &mut self,
        id: u64,
        credentials: &MerchantCredentials,
    ) -> ServiceResult<Venue> {
        let row: Option<VenueRow> = sqlx::query_as(&format!(
            "UPDATE venues SET merchant_id = $2, server_key_encrypted = $3, client_key = $4, \
             gateway_environment = $5, gateway_connected = TRUE, \
             status = CASE WHEN status = 'DRAFT' THEN 'ACTIVE' ELSE status END \
             WHERE id = $1 RETURNING {VENUE_COLUMNS}"
        ))
        .bind(from_id(id))
        .bind(&credentials.merchant_id)
        .bind(&credentials.server_key_encrypted)
        .bind(&credentials.client_key)
        .bind(credentials.environment.as_str())
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ServiceError::NotFound("Venue not found")),
        }
    }

    pub async fn set_venue_status(&mut self, id: u64, status: VenueStatus) -> ServiceResult<Venue> {
        let row: Option<VenueRow> = sqlx::query_as(&format!(
            "UPDATE venues SET status = $2 WHERE id = $1 RETURNING {VENUE_COLUMNS}"
        ))
        .bind(from_id(id))
        .bind(status.as_str())
        .fetch_optional(&mut *self.connection)
        .await?;

        match row {
            Some(row) => row.try_into(),
            None => Err(ServiceError::NotFound("Venue not found")),
        }
    }

    pub async fn count_venues(&mut self) -> ServiceResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM venues")
            .fetch_one(&mut *self.connection)
            .await?;
        Ok(count)
    }
}
