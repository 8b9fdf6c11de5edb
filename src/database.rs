use std::sync::Arc;

use log::info;
use sqlx::migrate::Migrator;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};

use crate::error::{ServiceError, ServiceResult};
use crate::gateway::{MidtransGateway, PaymentGateway};

mod migration;
mod payouts;
mod qr_codes;
mod staff;
mod stats;
mod tips;
mod users;
mod venues;
mod webhook_logs;

#[cfg(test)]
mod tests;

pub use qr_codes::QrRemoval;
pub use staff::NewStaff;
pub use tips::{NewTip, TipFilter};

#[derive(Clone)]
pub struct AppState {
    pub pool: Pool<Postgres>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl AppState {
    pub async fn connect(url: &str) -> ServiceResult<AppState> {
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await?;

        Self::from_pool(pool).await
    }

    pub async fn from_pool(pool: Pool<Postgres>) -> ServiceResult<AppState> {
        let migrator = Migrator::new(migration::postgresql_migrations())
            .await
            .map_err(|e| ServiceError::InternalServerError(format!("load migrations: {e}")))?;
        migrator
            .run(&pool)
            .await
            .map_err(|e| ServiceError::InternalServerError(format!("run migrations: {e}")))?;
        info!("Database migrations are up to date");

        Ok(AppState {
            pool,
            gateway: Arc::new(MidtransGateway::new()),
        })
    }

    pub fn with_gateway(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.gateway = gateway;
        self
    }

    pub async fn connection(&self) -> ServiceResult<DatabaseConnection> {
        let connection = self.pool.acquire().await?;
        Ok(DatabaseConnection { connection })
    }
}

/// A pooled connection with the repository queries of the service.
pub struct DatabaseConnection {
    pub connection: PoolConnection<Postgres>,
}

/// Convert a stored id into the public representation.
fn to_id(value: i64) -> u64 {
    value as u64
}

fn from_id(value: u64) -> i64 {
    value as i64
}

/// Parse a text column that holds one of the model enums.
fn parse_text<T>(value: &str, parse: fn(&str) -> Option<T>) -> ServiceResult<T> {
    parse(value).ok_or_else(|| {
        ServiceError::InternalServerError(format!("Unexpected value '{value}' in database"))
    })
}
