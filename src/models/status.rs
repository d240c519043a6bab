use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Processing status of one order, as persisted in the `orders.status` column.
///
/// A missing row is equivalent to `Pending`: the order has never been attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Pending,
    Retry,
    Done,
    NoReceipt,
    Error,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "PENDING",
            OrderStatus::Retry => "RETRY",
            OrderStatus::Done => "DONE",
            OrderStatus::NoReceipt => "NO_RECEIPT",
            OrderStatus::Error => "ERROR",
        }
    }

    /// Terminal statuses are never selected for processing again.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Done | OrderStatus::NoReceipt | OrderStatus::Error
        )
    }

    /// Whether a transition from `self` to `next` is allowed.
    ///
    /// Terminal statuses have no outgoing edges. Everything else may move to
    /// any status, including `Retry -> Retry` when another run exhausts its budget.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        next != OrderStatus::Pending
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(OrderStatus::Pending),
            "RETRY" => Ok(OrderStatus::Retry),
            "DONE" => Ok(OrderStatus::Done),
            "NO_RECEIPT" => Ok(OrderStatus::NoReceipt),
            "ERROR" => Ok(OrderStatus::Error),
            other => Err(format!("Unknown order status: {other}")),
        }
    }
}

/// Outcome of one receipt-issue attempt, produced by a handler variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueResult {
    pub status: OrderStatus,
    pub error_message: Option<String>,
    pub artifact_name: Option<String>,
}

impl IssueResult {
    pub fn done(artifact_name: impl Into<String>) -> Self {
        Self {
            status: OrderStatus::Done,
            error_message: None,
            artifact_name: Some(artifact_name.into()),
        }
    }

    pub fn no_receipt(reason: impl Into<String>) -> Self {
        Self::failed(OrderStatus::NoReceipt, reason)
    }

    pub fn retry(reason: impl Into<String>) -> Self {
        Self::failed(OrderStatus::Retry, reason)
    }

    pub fn error(reason: impl Into<String>) -> Self {
        Self::failed(OrderStatus::Error, reason)
    }

    fn failed(status: OrderStatus, reason: impl Into<String>) -> Self {
        Self {
            status,
            error_message: Some(reason.into()),
            artifact_name: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}
