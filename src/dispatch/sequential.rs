use std::sync::atomic::AtomicI64;

use crate::error::AppError;
use crate::session::Session;
use crate::store::OrderStore;

use super::{advance, bounded, process_page, stop_requested, DispatchSettings, Shutdown, Tally};

/// Walks the whole list with one session, page after page.
pub struct SequentialDispatcher<'a> {
    store: &'a OrderStore,
    settings: &'a DispatchSettings,
}

impl<'a> SequentialDispatcher<'a> {
    pub fn new(store: &'a OrderStore, settings: &'a DispatchSettings) -> Self {
        Self { store, settings }
    }

    /// Process pages until there is no next page or a stop is requested.
    ///
    /// An unreachable list start or a failing extraction ends the run with an
    /// error; everything already recorded stays recorded. A page whose ids time
    /// out counts as one error and the walk continues.
    pub async fn run<S: Session>(&self, session: &mut S, shutdown: &Shutdown) -> Result<Tally, AppError> {
        tracing::info!("Processing order history ({})", self.settings.date_range.describe());

        bounded(
            self.settings.nav_timeout,
            "list start",
            session.goto_list_start(&self.settings.date_range),
        )
        .await?;

        let mut total = Tally::default();
        let position = AtomicI64::new(0);
        let mut page_num = 1;

        loop {
            if stop_requested(shutdown) {
                tracing::info!("Stop requested, ending before page {page_num}");
                break;
            }

            tracing::info!("--- Page {page_num} ---");

            let tally = process_page(session, self.store, self.settings, "seq", &position).await?;
            tracing::debug!("Page {page_num}: {tally:?}");
            total += tally;

            if !advance(session, self.settings, "seq").await {
                tracing::info!("Reached the last page");
                break;
            }
            page_num += 1;
        }

        tracing::info!(
            "All pages done: processed={} skipped={} errors={}",
            total.processed,
            total.skipped,
            total.errors
        );

        Ok(total)
    }
}
