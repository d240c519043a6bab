use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::OrderStatus;

#[derive(Debug, Clone, sqlx::FromRow, Serialize, Deserialize)]
pub struct OrderRecord {
    pub id: String,
    pub sequence_number: Option<i64>,
    pub status: String,
    pub error_message: Option<String>,
    pub retry_count: i64,
    pub artifact_name: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl OrderRecord {
    /// Parsed status; `None` for values written by something other than this crate.
    pub fn status(&self) -> Option<OrderStatus> {
        self.status.parse().ok()
    }
}
