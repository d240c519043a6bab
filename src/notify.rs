use async_trait::async_trait;
use serde_json::json;

use crate::models::OrderStatus;
use crate::runner::RunReport;

#[derive(Debug)]
pub struct NotifyError {
    pub message: String,
}

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for NotifyError {}

impl From<String> for NotifyError {
    fn from(s: String) -> Self {
        NotifyError { message: s }
    }
}

/// Receives the end-of-run summary and export location.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, report: &RunReport) -> Result<(), NotifyError>;
}

/// Used when no delivery channel is configured.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, report: &RunReport) -> Result<(), NotifyError> {
        tracing::info!(
            run_id = %report.run_id,
            "No webhook configured, report stays local: {} orders, {:.1}% done, export at {}",
            report.summary.total(),
            report.summary.success_rate(),
            report.export_path.display()
        );
        Ok(())
    }
}

/// Posts a chat-style JSON message to an incoming webhook URL.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| format!("Failed to build webhook client: {e}"))?;

        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, report: &RunReport) -> Result<(), NotifyError> {
        let resp = self
            .client
            .post(&self.url)
            .json(&render_message(report))
            .send()
            .await
            .map_err(|e| format!("Webhook request failed: {e}"))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp
                .text()
                .await
                .unwrap_or_default()
                .chars()
                .take(256)
                .collect::<String>();
            return Err(format!("Webhook returned {status}: {body}").into());
        }

        tracing::info!("Run report sent to webhook");
        Ok(())
    }
}

pub fn render_message(report: &RunReport) -> serde_json::Value {
    let summary = &report.summary;
    let finished = report.finished_at.format("%Y-%m-%d %H:%M:%S");

    let mut blocks = vec![
        json!({
            "type": "header",
            "text": { "type": "plain_text", "text": "Order receipt run report" }
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Total:*\n{}", summary.total()) },
                { "type": "mrkdwn", "text": format!("*Success rate:*\n{:.1}%", summary.success_rate()) },
            ]
        }),
        json!({
            "type": "section",
            "fields": [
                { "type": "mrkdwn", "text": format!("*Saved:*\n{}", summary.count(OrderStatus::Done)) },
                { "type": "mrkdwn", "text": format!("*No receipt:*\n{}", summary.count(OrderStatus::NoReceipt)) },
                { "type": "mrkdwn", "text": format!("*Waiting for retry:*\n{}", summary.count(OrderStatus::Retry)) },
                { "type": "mrkdwn", "text": format!("*Errors:*\n{}", summary.count(OrderStatus::Error)) },
            ]
        }),
    ];

    let mut context = format!("Run {} | report: {}", report.run_id, report.export_path.display());
    if let Some(error) = &report.error {
        context.push_str(&format!(" | run aborted: {error}"));
    }
    blocks.push(json!({
        "type": "context",
        "elements": [ { "type": "mrkdwn", "text": context } ]
    }));

    json!({
        "text": format!("Order receipt run finished at {finished}"),
        "blocks": blocks,
    })
}
