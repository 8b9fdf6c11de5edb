use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::error::ServiceResult;
use crate::models::{PlatformStats, VenueActivity};

use super::{to_id, DatabaseConnection};

impl DatabaseConnection {
    /// Platform wide counters, "today" starts at `today_start`.
    pub async fn get_platform_stats(
        &mut self,
        today_start: DateTime<Utc>,
    ) -> ServiceResult<PlatformStats> {
        let (total_venues, active_venues): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE status = 'ACTIVE') FROM venues",
        )
        .fetch_one(&mut *self.connection)
        .await?;

        let (total_transactions, total_volume, today_transactions, failed_today): (
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            "SELECT COUNT(*), \
                    COALESCE(SUM(amount) FILTER (WHERE status = 'PAID'), 0)::BIGINT, \
                    COUNT(*) FILTER (WHERE created_at >= $1), \
                    COUNT(*) FILTER (WHERE created_at >= $1 AND status = 'FAILED') \
             FROM tips",
        )
        .bind(today_start)
        .fetch_one(&mut *self.connection)
        .await?;

        Ok(PlatformStats {
            total_venues,
            active_venues,
            total_transactions,
            total_volume,
            today_transactions,
            failed_today,
        })
    }

    /// All venues with staff count, paid volume and the time of the latest tip.
    pub async fn get_venue_activities(&mut self) -> ServiceResult<Vec<VenueActivity>> {
        let venues = self.get_all_venues().await?;

        let staff_counts: Vec<(i64, i64)> =
            sqlx::query_as("SELECT venue_id, COUNT(*) FROM staff GROUP BY venue_id")
                .fetch_all(&mut *self.connection)
                .await?;

        let tip_activity: Vec<(i64, i64, Option<DateTime<Utc>>)> = sqlx::query_as(
            "SELECT venue_id, COALESCE(SUM(amount) FILTER (WHERE status = 'PAID'), 0)::BIGINT, MAX(created_at) \
             FROM tips GROUP BY venue_id",
        )
        .fetch_all(&mut *self.connection)
        .await?;

        let staff_counts: HashMap<u64, i64> = staff_counts
            .into_iter()
            .map(|(venue_id, count)| (to_id(venue_id), count))
            .collect();
        let tip_activity: HashMap<u64, (i64, Option<DateTime<Utc>>)> = tip_activity
            .into_iter()
            .map(|(venue_id, volume, last)| (to_id(venue_id), (volume, last)))
            .collect();

        Ok(venues
            .into_iter()
            .map(|venue| {
                let (total_volume, last_activity) =
                    tip_activity.get(&venue.id).copied().unwrap_or((0, None));
                VenueActivity {
                    staff_count: staff_counts.get(&venue.id).copied().unwrap_or(0),
                    total_volume,
                    last_activity,
                    venue,
                }
            })
            .collect())
    }

    /// Round trip used by the health check.
    pub async fn ping(&mut self) -> ServiceResult<()> {
        sqlx::query("SELECT 1").execute(&mut *self.connection).await?;
        Ok(())
    }
}
