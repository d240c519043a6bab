use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::dispatch::{
    stop_requested, DispatchSettings, PartitionedDispatcher, SequentialDispatcher, Shutdown, Tally,
};
use crate::error::AppError;
use crate::models::Summary;
use crate::notify::Notifier;
use crate::session::Session;
use crate::store::OrderStore;

/// What a run produced, handed to the notifier.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// `None` when dispatch never completed (login failure, stop before start, run error).
    pub tally: Option<Tally>,
    /// Counts for rows touched since `started_at`.
    pub summary: Summary,
    pub export_path: PathBuf,
    pub error: Option<String>,
}

/// Log in, dispatch, then always export, summarize and notify.
///
/// One session runs the sequential dispatcher; more than one runs the
/// partitioned dispatcher with one worker per session. Outcomes are committed
/// per order as they happen, so a failed or cancelled run still reports its
/// partial progress. Only a failure of the reporting step itself is returned
/// as `Err`.
pub async fn run_once<S: Session>(
    store: &OrderStore,
    settings: DispatchSettings,
    sessions: Vec<S>,
    export_path: &Path,
    notifier: &dyn Notifier,
    shutdown: Shutdown,
) -> Result<RunReport, AppError> {
    let run_id = Uuid::now_v7();
    let started_at = Utc::now();

    tracing::info!(run_id = %run_id, "Run started ({})", settings.date_range.describe());

    let (tally, error) = match dispatch(store, settings, sessions, shutdown).await {
        Ok(tally) => (tally, None),
        Err(e) => {
            tracing::error!(run_id = %run_id, "Run failed: {e}");
            (None, Some(e.to_string()))
        }
    };

    let summary = match store.export(export_path, Some(started_at)).await {
        Ok(summary) => summary,
        Err(e) => {
            tracing::error!("Export failed: {e}");
            store.summary(Some(started_at)).await?
        }
    };

    let report = RunReport {
        run_id,
        started_at,
        finished_at: Utc::now(),
        tally,
        summary,
        export_path: export_path.to_path_buf(),
        error,
    };

    if let Err(e) = notifier.notify(&report).await {
        tracing::error!("Notification failed: {e}");
    }

    tracing::info!(run_id = %run_id, "Run finished");
    Ok(report)
}

async fn dispatch<S: Session>(
    store: &OrderStore,
    settings: DispatchSettings,
    mut sessions: Vec<S>,
    shutdown: Shutdown,
) -> Result<Option<Tally>, AppError> {
    if sessions.is_empty() {
        return Err(AppError::Config("No sessions to dispatch with".to_string()));
    }

    for (i, session) in sessions.iter_mut().enumerate() {
        if stop_requested(&shutdown) {
            tracing::info!("Stop requested before dispatch");
            return Ok(None);
        }
        tracing::info!("Session {i} logging in");
        if !session.login().await? {
            return Err(AppError::Login(format!("session {i} could not log in")));
        }
    }

    if sessions.len() == 1 {
        let mut session = sessions.remove(0);
        let tally = SequentialDispatcher::new(store, &settings)
            .run(&mut session, &shutdown)
            .await?;
        return Ok(Some(tally));
    }

    let tally = PartitionedDispatcher::new(store.clone(), settings)
        .run(sessions, shutdown)
        .await;
    Ok(Some(tally))
}
