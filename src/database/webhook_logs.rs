use chrono::{DateTime, Utc};

use crate::error::ServiceResult;
use crate::models::WebhookLog;

use super::{to_id, DatabaseConnection};

#[derive(sqlx::FromRow)]
struct WebhookLogRow {
    id: i64,
    order_id: Option<String>,
    payload: serde_json::Value,
    created_at: DateTime<Utc>,
}

impl From<WebhookLogRow> for WebhookLog {
    fn from(row: WebhookLogRow) -> Self {
        WebhookLog {
            id: to_id(row.id),
            order_id: row.order_id,
            payload: row.payload,
            created_at: row.created_at,
        }
    }
}

impl DatabaseConnection {
    /// Keep the raw notification, independent of whether it can be processed.
    pub async fn store_webhook_log(
        &mut self,
        order_id: Option<&str>,
        payload: &serde_json::Value,
    ) -> ServiceResult<WebhookLog> {
        let row: WebhookLogRow = sqlx::query_as(
            "INSERT INTO webhook_logs (order_id, payload) VALUES ($1, $2) \
             RETURNING id, order_id, payload, created_at",
        )
        .bind(order_id)
        .bind(payload)
        .fetch_one(&mut *self.connection)
        .await?;

        Ok(row.into())
    }

    pub async fn get_latest_webhook_log(
        &mut self,
        order_id: &str,
    ) -> ServiceResult<Option<WebhookLog>> {
        let row: Option<WebhookLogRow> = sqlx::query_as(
            "SELECT id, order_id, payload, created_at FROM webhook_logs \
             WHERE order_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(order_id)
        .fetch_optional(&mut *self.connection)
        .await?;

        Ok(row.map(WebhookLog::from))
    }
}
