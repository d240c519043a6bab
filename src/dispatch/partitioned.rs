use std::sync::atomic::AtomicI64;
use std::sync::Arc;

use crate::error::AppError;
use crate::session::Session;
use crate::store::OrderStore;

use super::{advance, bounded, process_page, stop_requested, DispatchSettings, Shutdown, Tally};

/// Splits the page stream across one session per worker.
///
/// Worker `k` of `N` owns pages `k+1, k+1+N, ...`. The list only moves forward,
/// so each worker walks `k` pages to its first page and `N` pages between the
/// pages it owns.
pub struct PartitionedDispatcher {
    store: OrderStore,
    settings: Arc<DispatchSettings>,
}

impl PartitionedDispatcher {
    pub fn new(store: OrderStore, settings: DispatchSettings) -> Self {
        Self {
            store,
            settings: Arc::new(settings),
        }
    }

    /// Run every worker to completion and sum their tallies.
    ///
    /// A worker that fails keeps what it counted before failing and adds one to
    /// `errors`; a panicked worker adds one. Neither affects the others. Nothing
    /// is returned before every worker has finished.
    pub async fn run<S: Session>(&self, sessions: Vec<S>, shutdown: Shutdown) -> Tally {
        let worker_count = sessions.len();
        tracing::info!("Starting partitioned dispatch ({worker_count} workers)");

        let position = Arc::new(AtomicI64::new(0));
        let mut handles = Vec::with_capacity(worker_count);
        for (id, session) in sessions.into_iter().enumerate() {
            handles.push((
                id,
                tokio::spawn(
                    Worker {
                        id,
                        worker_count,
                        tag: format!("W{id}"),
                        session,
                        store: self.store.clone(),
                        settings: self.settings.clone(),
                        position: position.clone(),
                        shutdown: shutdown.clone(),
                    }
                    .run(),
                ),
            ));
        }

        let mut total = Tally::default();
        for (id, handle) in handles {
            match handle.await {
                Ok((tally, Ok(()))) => total += tally,
                Ok((tally, Err(e))) => {
                    tracing::error!("Worker {id} failed: {e}");
                    total += tally;
                    total.errors += 1;
                }
                Err(e) => {
                    tracing::error!("Worker {id} aborted: {e}");
                    total.errors += 1;
                }
            }
        }

        tracing::info!(
            "All workers done: processed={} skipped={} errors={}",
            total.processed,
            total.skipped,
            total.errors
        );

        total
    }
}

/// One worker's share of the run.
struct Worker<S> {
    id: usize,
    worker_count: usize,
    tag: String,
    session: S,
    store: OrderStore,
    settings: Arc<DispatchSettings>,
    position: Arc<AtomicI64>,
    shutdown: Shutdown,
}

impl<S: Session> Worker<S> {
    /// Tally so far plus how the walk ended.
    async fn run(mut self) -> (Tally, Result<(), AppError>) {
        tracing::debug!("Worker {} started", self.id);
        let mut tally = Tally::default();
        let result = self.walk_pages(&mut tally).await;
        tracing::debug!("Worker {} stopped", self.id);
        (tally, result)
    }

    async fn walk_pages(&mut self, tally: &mut Tally) -> Result<(), AppError> {
        let tag = self.tag.as_str();
        let settings = self.settings.as_ref();

        bounded(
            settings.nav_timeout,
            "list start",
            self.session.goto_list_start(&settings.date_range),
        )
        .await?;

        for _ in 0..self.id {
            if !advance(&mut self.session, settings, tag).await {
                tracing::info!("[{tag}] No pages assigned, stopping");
                return Ok(());
            }
        }

        let mut page_num = self.id + 1;

        loop {
            if stop_requested(&self.shutdown) {
                tracing::info!("[{tag}] Stop requested");
                return Ok(());
            }

            tracing::info!("[{tag}] Processing page {page_num}");
            *tally += process_page(&mut self.session, &self.store, settings, tag, &self.position).await?;

            for _ in 0..self.worker_count {
                if !advance(&mut self.session, settings, tag).await {
                    tracing::info!("[{tag}] Reached the last page");
                    return Ok(());
                }
            }
            page_num += self.worker_count;
        }
    }
}
