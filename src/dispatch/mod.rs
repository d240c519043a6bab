pub mod partitioned;
pub mod sequential;

use std::future::Future;
use std::ops::AddAssign;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use tokio::sync::watch;

use crate::error::AppError;
use crate::models::{IssueResult, OrderStatus};
use crate::session::{DateRange, HandlerVariant, Session, SessionError};
use crate::store::OrderStore;

pub use partitioned::PartitionedDispatcher;
pub use sequential::SequentialDispatcher;

/// Cooperative stop flag. Dispatchers poll it at page boundaries only.
pub type Shutdown = watch::Receiver<bool>;

pub fn stop_requested(shutdown: &Shutdown) -> bool {
    *shutdown.borrow()
}

#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// In-run attempts per order, independent of the store's retry ceiling.
    pub order_retry_limit: u32,
    pub retry_delay: Duration,
    pub action_timeout: Duration,
    pub nav_timeout: Duration,
    pub date_range: DateRange,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            order_retry_limit: 3,
            retry_delay: Duration::from_secs(2),
            action_timeout: Duration::from_secs(60),
            nav_timeout: Duration::from_secs(30),
            date_range: DateRange::default(),
        }
    }
}

/// Aggregate counts for a page, a worker, or a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub processed: u64,
    pub skipped: u64,
    pub errors: u64,
}

impl Tally {
    pub fn new(processed: u64, skipped: u64, errors: u64) -> Self {
        Self {
            processed,
            skipped,
            errors,
        }
    }

    fn count(&mut self, outcome: RecordOutcome) {
        match outcome {
            RecordOutcome::Processed => self.processed += 1,
            RecordOutcome::Skipped => self.skipped += 1,
            RecordOutcome::Error => self.errors += 1,
        }
    }
}

impl AddAssign for Tally {
    fn add_assign(&mut self, rhs: Self) {
        self.processed += rhs.processed;
        self.skipped += rhs.skipped;
        self.errors += rhs.errors;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RecordOutcome {
    Processed,
    Skipped,
    Error,
}

impl From<OrderStatus> for RecordOutcome {
    fn from(status: OrderStatus) -> Self {
        match status {
            OrderStatus::Done => RecordOutcome::Processed,
            OrderStatus::NoReceipt => RecordOutcome::Skipped,
            OrderStatus::Retry | OrderStatus::Error | OrderStatus::Pending => RecordOutcome::Error,
        }
    }
}

/// Run a collaborator call under the navigation timeout.
pub(crate) async fn bounded<T, F>(limit: Duration, what: &str, fut: F) -> Result<T, SessionError>
where
    F: Future<Output = Result<T, SessionError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(SessionError::Timeout(format!("{what} after {limit:?}"))),
    }
}

/// Forward one page. Failures and timeouts count as "no further page".
pub(crate) async fn advance<S: Session>(session: &mut S, settings: &DispatchSettings, tag: &str) -> bool {
    match bounded(settings.nav_timeout, "next page", session.goto_next_page()).await {
        Ok(moved) => moved,
        Err(e) => {
            tracing::warn!("[{tag}] Next page transition failed: {e}");
            false
        }
    }
}

/// Work through every order on the list page the session is on, then leave
/// the session back on that list page so pagination can continue.
///
/// `position` counts ids seen across the whole run, shared by every worker;
/// each order's `sequence_number` is the value it claims from it.
///
/// A page whose ids cannot be read in time counts as one error and the caller
/// moves on. Any other extraction failure is returned.
pub(crate) async fn process_page<S: Session>(
    session: &mut S,
    store: &OrderStore,
    settings: &DispatchSettings,
    tag: &str,
    position: &AtomicI64,
) -> Result<Tally, AppError> {
    let list_url = session.current_url();
    let ids = match bounded(settings.nav_timeout, "extract ids", session.extract_ids()).await {
        Ok(ids) => ids,
        Err(SessionError::Timeout(msg)) => {
            tracing::warn!("[{tag}] Skipping page, order ids not read: {msg}");
            return Ok(Tally::new(0, 0, 1));
        }
        Err(e) => return Err(e.into()),
    };

    if ids.is_empty() {
        tracing::warn!("[{tag}] No orders found on this page");
        return Ok(Tally::default());
    }

    tracing::info!("[{tag}] Found {} orders on this page", ids.len());

    let mut tally = Tally::default();
    let total = ids.len();

    for (i, id) in ids.iter().enumerate() {
        let sequence_number = position.fetch_add(1, Ordering::Relaxed) + 1;

        match store.eligible(id).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::info!("[{tag}] [{}/{total}] Skipping {id}", i + 1);
                tally.count(RecordOutcome::Skipped);
                continue;
            }
            Err(e) => {
                tracing::error!("[{tag}] Eligibility check failed for {id}: {e}");
                tally.count(RecordOutcome::Error);
                continue;
            }
        }

        tracing::info!("[{tag}] [{}/{total}] Processing {id}", i + 1);

        let outcome = match process_order(session, store, settings, tag, &list_url, id, sequence_number).await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!("[{tag}] Processing error for {id}: {e}");
                RecordOutcome::Error
            }
        };
        tally.count(outcome);
    }

    if session.current_url() != list_url
        && let Err(e) = bounded(settings.nav_timeout, "return to list", session.goto_url(&list_url)).await
    {
        tracing::warn!("[{tag}] Could not return to list page: {e}");
    }

    Ok(tally)
}

async fn process_order<S: Session>(
    session: &mut S,
    store: &OrderStore,
    settings: &DispatchSettings,
    tag: &str,
    list_url: &str,
    id: &str,
    sequence_number: i64,
) -> Result<RecordOutcome, AppError> {
    // Earlier orders may have left the list for a detail page.
    bounded(settings.nav_timeout, "return to list", session.goto_url(list_url)).await?;

    let shortcut = bounded(
        settings.nav_timeout,
        "listing classification",
        session.can_handle_without_detail_page(id),
    )
    .await?;

    let variant = if shortcut {
        tracing::debug!("[{tag}] {id} handled from the listing");
        HandlerVariant::Specialized
    } else {
        match bounded(settings.nav_timeout, "detail navigation", session.goto_detail(id)).await {
            Ok(true) => session.detail_variant(),
            Ok(false) => {
                tracing::warn!("[{tag}] Detail page not reachable for {id}");
                return Ok(RecordOutcome::Error);
            }
            Err(e) => {
                tracing::warn!("[{tag}] Detail navigation failed for {id}: {e}");
                return Ok(RecordOutcome::Error);
            }
        }
    };
    tracing::debug!("[{tag}] {id} uses the {variant} handler");

    let result = issue_with_retry(session, store, settings, tag, variant, id, sequence_number).await?;
    Ok(RecordOutcome::from(result.status))
}

/// Per-order retry loop. A terminal result is stored as-is; running out of
/// in-run attempts stores RETRY and bumps the persisted retry counter, the only
/// path that does.
async fn issue_with_retry<S: Session>(
    session: &mut S,
    store: &OrderStore,
    settings: &DispatchSettings,
    tag: &str,
    variant: HandlerVariant,
    id: &str,
    sequence_number: i64,
) -> Result<IssueResult, AppError> {
    let limit = settings.order_retry_limit;
    let mut last: Option<IssueResult> = None;

    for attempt in 0..limit {
        if attempt > 0 {
            tracing::info!("[{tag}] Retry {}/{limit} for {id}", attempt + 1);
            tokio::time::sleep(settings.retry_delay).await;
        }

        let result = match tokio::time::timeout(settings.action_timeout, session.issue_action(variant, id)).await {
            Ok(result) => result,
            Err(_) => IssueResult::retry(format!("Action timed out after {:?}", settings.action_timeout)),
        };

        if result.is_terminal() {
            store.record_outcome(id, &result, false, Some(sequence_number)).await?;
            tracing::info!("[{tag}] {id} -> {}", result.status);
            return Ok(result);
        }

        tracing::warn!(
            "[{tag}] Retryable failure for {id}: {}",
            result.error_message.as_deref().unwrap_or("unknown")
        );
        last = Some(result);
    }

    let reason = last
        .and_then(|r| r.error_message)
        .unwrap_or_else(|| "unknown".to_string());
    let result = IssueResult::retry(format!("{limit} attempts failed: {reason}"));

    tracing::warn!("[{tag}] Retry budget exhausted for {id}, deferring to a later run");
    store.record_outcome(id, &result, true, Some(sequence_number)).await?;
    Ok(result)
}
