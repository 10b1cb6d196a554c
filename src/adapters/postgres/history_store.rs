//! PostgreSQL state history store.
//!
//! Implements `EventPublisher` by appending envelopes to
//! `subscription_history`. Duplicate event ids are ignored.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};

use crate::domain::foundation::{DomainError, EventEnvelope};
use crate::ports::EventPublisher;

use super::codec::db_error;

pub struct PostgresHistoryStore {
    pool: PgPool,
}

impl PostgresHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn insert(
        tx: &mut Transaction<'_, Postgres>,
        event: &EventEnvelope,
    ) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO subscription_history (
                event_id, event_type, schema_version, aggregate_id, aggregate_type,
                occurred_at, payload
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (event_id) DO NOTHING
            "#,
        )
        .bind(event.event_id.as_str())
        .bind(&event.event_type)
        .bind(event.schema_version as i32)
        .bind(&event.aggregate_id)
        .bind(&event.aggregate_type)
        .bind(event.occurred_at.as_datetime())
        .bind(&event.payload)
        .execute(&mut **tx)
        .await
        .map_err(|e| db_error("append history event", e))?;
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for PostgresHistoryStore {
    async fn publish(&self, event: EventEnvelope) -> Result<(), DomainError> {
        self.publish_all(vec![event]).await
    }

    async fn publish_all(&self, events: Vec<EventEnvelope>) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| db_error("begin transaction", e))?;
        for event in &events {
            Self::insert(&mut tx, event).await?;
        }
        tx.commit()
            .await
            .map_err(|e| db_error("commit history events", e))?;

        tracing::debug!(count = events.len(), "Appended state history events");
        Ok(())
    }
}
