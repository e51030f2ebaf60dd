//! Idempotency marker repository (SQLx).
//!
//! One row per external payment event id, written with create-if-absent
//! semantics: the INSERT either claims the event or reports that it was
//! already processed, which is the authoritative duplicate gate.

use sqlx::FromRow;
use tracing::{debug, instrument};

use crate::database::DbPool;
use crate::database::time::now_ms;

/// A marker row awaiting (or past) its credit grant.
#[derive(Debug, Clone, FromRow)]
pub struct PaymentMarker {
    pub event_id: String,
    pub owner_key: String,
    pub credits: i64,
}

pub struct IdempotencyRepository {
    pool: DbPool,
}

impl IdempotencyRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Claim an event id. Returns `true` when this call created the marker,
    /// `false` when the event was already processed.
    #[instrument(skip(self))]
    pub async fn try_mark(
        &self,
        event_id: &str,
        owner_key: &str,
        credits: i64,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            r#"
            INSERT INTO payment_events (event_id, processed_at, owner_key, credits, credited)
            VALUES (?, ?, ?, ?, 0)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event_id)
        .bind(now_ms())
        .bind(owner_key)
        .bind(credits)
        .execute(&self.pool)
        .await?;

        let created = result.rows_affected() > 0;
        if !created {
            debug!(event_id = %event_id, "Event already marked");
        }
        Ok(created)
    }

    /// Record that the grant for an event completed.
    pub async fn mark_credited(&self, event_id: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE payment_events SET credited = 1 WHERE event_id = ?")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Markers whose grant never completed, oldest first.
    pub async fn unapplied(&self, limit: i64) -> Result<Vec<PaymentMarker>, sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT event_id, owner_key, credits
            FROM payment_events
            WHERE credited = 0
            ORDER BY processed_at ASC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::test_pool;

    #[tokio::test]
    async fn test_second_mark_is_distinguishable() {
        let repo = IdempotencyRepository::new(test_pool().await);

        assert!(repo.try_mark("evt-1", "owner-1", 100).await.unwrap());
        assert!(!repo.try_mark("evt-1", "owner-1", 100).await.unwrap());
    }

    #[tokio::test]
    async fn test_unapplied_tracking() {
        let repo = IdempotencyRepository::new(test_pool().await);

        repo.try_mark("evt-1", "owner-1", 100).await.unwrap();
        repo.try_mark("evt-2", "owner-2", 50).await.unwrap();
        repo.mark_credited("evt-1").await.unwrap();

        let pending = repo.unapplied(10).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].event_id, "evt-2");
        assert_eq!(pending[0].credits, 50);
    }
}
