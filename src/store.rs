use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

use crate::db;
use crate::db::orders::OrderUpsert;
use crate::error::AppError;
use crate::models::{IssueResult, OrderRecord, OrderStatus, Summary};

/// Stored error messages are cut to this many characters.
pub const ERROR_MESSAGE_MAX_CHARS: usize = 500;

/// Message written when lazy promotion moves a RETRY order to ERROR.
pub const CEILING_REACHED_MESSAGE: &str = "Retry ceiling reached";

/// Header row of the export snapshot, in table column order.
pub const EXPORT_COLUMNS: [&str; 9] = [
    "id",
    "sequence_number",
    "status",
    "error_message",
    "retry_count",
    "artifact_name",
    "completed_at",
    "created_at",
    "updated_at",
];

/// Durable per-order state shared by every dispatcher worker.
///
/// The pool holds a single connection, so writes are serialized. Each public
/// operation is one statement or one short transaction; nothing is held across
/// network I/O.
#[derive(Clone)]
pub struct OrderStore {
    pool: SqlitePool,
    retry_ceiling: i64,
}

impl OrderStore {
    /// Open (creating if missing) the database at `database_url` and apply migrations.
    pub async fn open(database_url: &str, retry_ceiling: u32) -> Result<Self, AppError> {
        let opts = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        Self::new(pool, retry_ceiling).await
    }

    /// Transient in-memory store. The single connection is never recycled,
    /// since dropping it would discard the database.
    pub async fn open_in_memory(retry_ceiling: u32) -> Result<Self, AppError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::new(pool, retry_ceiling).await
    }

    pub async fn new(pool: SqlitePool, retry_ceiling: u32) -> Result<Self, AppError> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self {
            pool,
            retry_ceiling: i64::from(retry_ceiling),
        })
    }

    pub async fn get(&self, id: &str) -> Result<Option<OrderRecord>, AppError> {
        Ok(db::orders::find_by_id(&self.pool, id).await?)
    }

    /// Stored status, or `None` if the order was never attempted.
    /// Unrecognized status text is reported as `None` with a warning.
    pub async fn get_status(&self, id: &str) -> Result<Option<OrderStatus>, AppError> {
        let state = db::orders::find_state(&self.pool, id).await?;
        Ok(state.and_then(|(status, _)| match status.parse() {
            Ok(status) => Some(status),
            Err(e) => {
                tracing::warn!("Order {id}: {e}");
                None
            }
        }))
    }

    pub async fn get_retry_count(&self, id: &str) -> Result<i64, AppError> {
        let state = db::orders::find_state(&self.pool, id).await?;
        Ok(state.map(|(_, count)| count).unwrap_or(0))
    }

    /// Whether the dispatcher should attempt this order.
    ///
    /// A RETRY order at or above the ceiling is promoted to ERROR here, inside
    /// the same transaction as the read, and reported as not eligible.
    pub async fn eligible(&self, id: &str) -> Result<bool, AppError> {
        let mut tx = self.pool.begin().await?;

        let eligible = match db::orders::find_state(&mut *tx, id).await? {
            None => true,
            Some((status, retry_count)) => match status.parse::<OrderStatus>() {
                Ok(status) if status.is_terminal() => false,
                Ok(OrderStatus::Retry) if retry_count >= self.retry_ceiling => {
                    tracing::warn!(
                        order_id = %id,
                        retry_count,
                        "Retry ceiling reached, promoting to ERROR"
                    );
                    let now = Utc::now();
                    db::orders::upsert(
                        &mut *tx,
                        &OrderUpsert {
                            id,
                            sequence_number: None,
                            status: OrderStatus::Error.as_str(),
                            error_message: Some(CEILING_REACHED_MESSAGE),
                            retry_increment: 0,
                            artifact_name: None,
                            completed_at: None,
                            now,
                        },
                    )
                    .await?;
                    false
                }
                Ok(_) => true,
                Err(e) => {
                    tracing::warn!("Order {id} skipped: {e}");
                    false
                }
            },
        };

        tx.commit().await?;
        Ok(eligible)
    }

    /// Upsert the outcome of an attempt.
    ///
    /// `completed_at` is set for DONE and cleared for everything else. The
    /// persisted retry counter grows by one only when `increment_retry` is set.
    pub async fn record_outcome(
        &self,
        id: &str,
        outcome: &IssueResult,
        increment_retry: bool,
        sequence_number: Option<i64>,
    ) -> Result<(), AppError> {
        if let Some(previous) = self.get_status(id).await?
            && !previous.can_transition_to(outcome.status)
        {
            // Flagged only. A DONE row loses completed_at here.
            tracing::warn!(
                order_id = %id,
                "Overwriting terminal status {previous} with {}",
                outcome.status
            );
        }

        let now = Utc::now();
        let error_message = outcome
            .error_message
            .as_deref()
            .map(|msg| truncate_chars(msg, ERROR_MESSAGE_MAX_CHARS));
        let completed_at = (outcome.status == OrderStatus::Done).then_some(now);

        db::orders::upsert(
            &self.pool,
            &OrderUpsert {
                id,
                sequence_number,
                status: outcome.status.as_str(),
                error_message,
                retry_increment: i64::from(increment_retry),
                artifact_name: outcome.artifact_name.as_deref(),
                completed_at,
                now,
            },
        )
        .await?;

        tracing::debug!(order_id = %id, status = %outcome.status, increment_retry, "Outcome recorded");
        Ok(())
    }

    pub async fn summary(&self, since: Option<DateTime<Utc>>) -> Result<Summary, AppError> {
        let rows = db::orders::count_by_status(&self.pool, since).await?;
        Ok(Summary::from_rows(rows))
    }

    /// Write matching rows, newest update first, as CSV with a header row.
    /// Returns the summary for the same slice so callers always get both.
    pub async fn export(
        &self,
        path: impl AsRef<Path>,
        since: Option<DateTime<Utc>>,
    ) -> Result<Summary, AppError> {
        let path = path.as_ref();
        let rows = db::orders::list_recent(&self.pool, since).await?;

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }

        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(EXPORT_COLUMNS)?;
        for row in &rows {
            writer.write_record([
                row.id.clone(),
                row.sequence_number.map(|n| n.to_string()).unwrap_or_default(),
                row.status.clone(),
                row.error_message.clone().unwrap_or_default(),
                row.retry_count.to_string(),
                row.artifact_name.clone().unwrap_or_default(),
                row.completed_at.map(|t| t.to_rfc3339()).unwrap_or_default(),
                row.created_at.to_rfc3339(),
                row.updated_at.to_rfc3339(),
            ])?;
        }
        writer.flush()?;

        let summary = self.summary(since).await?;

        tracing::info!("=== Run summary ===");
        tracing::info!("Done (DONE): {}", summary.count(OrderStatus::Done));
        tracing::info!("No receipt (NO_RECEIPT): {}", summary.count(OrderStatus::NoReceipt));
        tracing::info!("Waiting for retry (RETRY): {}", summary.count(OrderStatus::Retry));
        tracing::info!("Error (ERROR): {}", summary.count(OrderStatus::Error));
        tracing::info!("Report written: {} ({} rows)", path.display(), rows.len());

        Ok(summary)
    }

    /// RETRY/PENDING ids still under the ceiling, oldest first. Used by
    /// resumption tooling; the dispatcher discovers work from the listing instead.
    pub async fn pending_ids(&self) -> Result<Vec<String>, AppError> {
        Ok(db::orders::list_pending_ids(&self.pool, self.retry_ceiling).await?)
    }
}

fn truncate_chars(msg: &str, max: usize) -> &str {
    match msg.char_indices().nth(max) {
        Some((idx, _)) => &msg[..idx],
        None => msg,
    }
}
