use chrono::{DateTime, Utc};
use sqlx::{SqliteExecutor, SqlitePool};

use crate::models::OrderRecord;

/// Column values for one outcome write.
pub struct OrderUpsert<'a> {
    pub id: &'a str,
    pub sequence_number: Option<i64>,
    pub status: &'a str,
    pub error_message: Option<&'a str>,
    pub retry_increment: i64,
    pub artifact_name: Option<&'a str>,
    pub completed_at: Option<DateTime<Utc>>,
    pub now: DateTime<Utc>,
}

pub async fn find_by_id<'e, E>(executor: E, id: &str) -> Result<Option<OrderRecord>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, OrderRecord>("SELECT * FROM orders WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Status and retry count only, for the eligibility check.
pub async fn find_state<'e, E>(executor: E, id: &str) -> Result<Option<(String, i64)>, sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query_as::<_, (String, i64)>("SELECT status, retry_count FROM orders WHERE id = ?1")
        .bind(id)
        .fetch_optional(executor)
        .await
}

/// Insert or update in one statement. A new row starts at `retry_count = retry_increment`.
/// `completed_at` is always overwritten, so any non-DONE write clears it.
pub async fn upsert<'e, E>(executor: E, row: &OrderUpsert<'_>) -> Result<(), sqlx::Error>
where
    E: SqliteExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO orders
             (id, sequence_number, status, error_message, retry_count,
              artifact_name, completed_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
         ON CONFLICT(id) DO UPDATE SET
             sequence_number = COALESCE(excluded.sequence_number, orders.sequence_number),
             status = excluded.status,
             error_message = excluded.error_message,
             retry_count = orders.retry_count + ?5,
             artifact_name = excluded.artifact_name,
             completed_at = excluded.completed_at,
             updated_at = excluded.updated_at",
    )
    .bind(row.id)
    .bind(row.sequence_number)
    .bind(row.status)
    .bind(row.error_message)
    .bind(row.retry_increment)
    .bind(row.artifact_name)
    .bind(row.completed_at)
    .bind(row.now)
    .execute(executor)
    .await?;
    Ok(())
}

pub async fn count_by_status(
    pool: &SqlitePool,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<(String, i64)>, sqlx::Error> {
    match since {
        Some(since) => {
            sqlx::query_as::<_, (String, i64)>(
                "SELECT status, COUNT(*) FROM orders
                 WHERE updated_at >= ?1
                 GROUP BY status",
            )
            .bind(since)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, (String, i64)>(
                "SELECT status, COUNT(*) FROM orders GROUP BY status",
            )
            .fetch_all(pool)
            .await
        }
    }
}

/// Rows for the export snapshot, most recently updated first.
pub async fn list_recent(
    pool: &SqlitePool,
    since: Option<DateTime<Utc>>,
) -> Result<Vec<OrderRecord>, sqlx::Error> {
    match since {
        Some(since) => {
            sqlx::query_as::<_, OrderRecord>(
                "SELECT * FROM orders
                 WHERE updated_at >= ?1
                 ORDER BY updated_at DESC, id ASC",
            )
            .bind(since)
            .fetch_all(pool)
            .await
        }
        None => {
            sqlx::query_as::<_, OrderRecord>(
                "SELECT * FROM orders ORDER BY updated_at DESC, id ASC",
            )
            .fetch_all(pool)
            .await
        }
    }
}

pub async fn list_pending_ids(pool: &SqlitePool, ceiling: i64) -> Result<Vec<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>(
        "SELECT id FROM orders
         WHERE status IN ('RETRY', 'PENDING') AND retry_count < ?1
         ORDER BY created_at ASC, id ASC",
    )
    .bind(ceiling)
    .fetch_all(pool)
    .await
}
