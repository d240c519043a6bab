use std::sync::Arc;

use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use orderbot::config::Config;
use orderbot::notify::{LogNotifier, Notifier, WebhookNotifier};
use orderbot::web::HttpSession;
use orderbot::{run_once, OrderStore};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Load config
    let config = Config::from_env().expect("Failed to load configuration");

    // Init tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(&config.log_level)
        }))
        .init();

    tracing::info!("Starting orderbot with {} worker(s)", config.workers);

    tokio::fs::create_dir_all(&config.download_dir).await?;

    // Open state store (runs migrations)
    let store = OrderStore::open(&config.database_url, config.retry_ceiling)
        .await
        .expect("Failed to open state store");

    tracing::info!("State store ready at {}", config.database_url);

    let web = Arc::new(config.web_config());
    let sessions = (0..config.workers)
        .map(|_| HttpSession::new(web.clone()))
        .collect::<Result<Vec<_>, _>>()?;

    let notifier: Box<dyn Notifier> = match &config.notify_webhook_url {
        Some(url) => Box::new(WebhookNotifier::new(url.clone())?),
        None => Box::new(LogNotifier),
    };

    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = stop_tx.send(true);
    });

    let report = run_once(
        &store,
        config.dispatch_settings(),
        sessions,
        &config.report_path,
        notifier.as_ref(),
        stop_rx,
    )
    .await?;

    if let Some(error) = report.error {
        tracing::error!("Run ended early: {error}");
        std::process::exit(1);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, finishing the current page");
}
