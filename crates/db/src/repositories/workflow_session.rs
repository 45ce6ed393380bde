use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use brokerflow_core::workflow::{
    PutOutcome, SessionKey, StoreError, StoredWorkflow, WorkflowFamily, WorkflowStore,
};

use super::RepositoryError;
use crate::DbPool;

/// `workflow_session` backed store. A write saved earlier than the stored row
/// leaves the row untouched.
pub struct SqlWorkflowStore {
    pool: DbPool,
}

impl SqlWorkflowStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    async fn upsert(&self, record: StoredWorkflow) -> Result<PutOutcome, RepositoryError> {
        let revision = i64::try_from(record.revision).map_err(|_| {
            RepositoryError::Decode(format!("revision {} does not fit in i64", record.revision))
        })?;

        let result = sqlx::query(
            "INSERT INTO workflow_session (
                session_key,
                family,
                revision,
                payload_json,
                saved_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(session_key) DO UPDATE SET
                family = excluded.family,
                revision = excluded.revision,
                payload_json = excluded.payload_json,
                saved_at = excluded.saved_at,
                updated_at = excluded.updated_at
             WHERE excluded.saved_at >= workflow_session.saved_at",
        )
        .bind(record.key.as_str())
        .bind(record.family.as_str())
        .bind(revision)
        .bind(&record.payload_json)
        .bind(format_timestamp(record.saved_at))
        .bind(format_timestamp(Utc::now()))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            tracing::debug!(
                event_name = "db.workflow_session.stale_write_ignored",
                session_key = %record.key,
                revision = record.revision,
                "stored session was saved later"
            );
            return Ok(PutOutcome::Stale);
        }

        Ok(PutOutcome::Written)
    }

    async fn find(&self, key: &SessionKey) -> Result<Option<StoredWorkflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                session_key,
                family,
                revision,
                payload_json,
                saved_at
             FROM workflow_session
             WHERE session_key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(session_from_row).transpose()
    }

    async fn remove(&self, key: &SessionKey) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM workflow_session WHERE session_key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl WorkflowStore for SqlWorkflowStore {
    async fn put(&self, record: StoredWorkflow) -> Result<PutOutcome, StoreError> {
        Ok(self.upsert(record).await?)
    }

    async fn get(&self, key: &SessionKey) -> Result<Option<StoredWorkflow>, StoreError> {
        Ok(self.find(key).await?)
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), StoreError> {
        Ok(self.remove(key).await?)
    }
}

fn session_from_row(row: SqliteRow) -> Result<StoredWorkflow, RepositoryError> {
    let family_raw = row.try_get::<String, _>("family")?;
    let family = WorkflowFamily::parse(&family_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown workflow family `{family_raw}`"))
    })?;

    Ok(StoredWorkflow {
        key: SessionKey(row.try_get("session_key")?),
        family,
        revision: parse_u64("revision", row.try_get("revision")?)?,
        payload_json: row.try_get("payload_json")?,
        saved_at: parse_timestamp("saved_at", row.try_get("saved_at")?)?,
    })
}

fn parse_u64(column: &str, value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| {
        RepositoryError::Decode(format!(
            "invalid value for `{column}` (expected non-negative u64): {value}"
        ))
    })
}

// Fixed width so that SQLite compares `saved_at` in time order.
fn format_timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}
