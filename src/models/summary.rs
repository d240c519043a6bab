use std::collections::BTreeMap;

use serde::Serialize;

use super::OrderStatus;

/// Per-status row counts for a point-in-time slice of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub counts: BTreeMap<String, i64>,
}

impl Summary {
    pub fn from_rows(rows: Vec<(String, i64)>) -> Self {
        Self {
            counts: rows.into_iter().collect(),
        }
    }

    pub fn count(&self, status: OrderStatus) -> i64 {
        self.counts.get(status.as_str()).copied().unwrap_or(0)
    }

    pub fn total(&self) -> i64 {
        self.counts.values().sum()
    }

    /// Share of DONE rows, in percent. Zero when the slice is empty.
    pub fn success_rate(&self) -> f64 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        self.count(OrderStatus::Done) as f64 / total as f64 * 100.0
    }
}
