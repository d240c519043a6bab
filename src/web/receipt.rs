use std::path::Path;

use reqwest::{Client, StatusCode};

use crate::models::IssueResult;
use crate::session::HandlerVariant;

use super::links::{order_block, receipt_href};
use super::{Page, WebConfig};

pub fn receipt_file_name(id: &str) -> String {
    format!("receipt_{id}.pdf")
}

pub fn is_pdf(content_type: Option<&str>, body: &[u8]) -> bool {
    content_type.is_some_and(|ct| ct.to_ascii_lowercase().starts_with("application/pdf"))
        || body.starts_with(b"%PDF")
}

/// One receipt attempt from the page the session is on.
///
/// Specialized orders look only at their own listing block when it is there;
/// standard orders use the whole detail page.
pub(crate) async fn issue(
    client: &Client,
    config: &WebConfig,
    page: &Page,
    variant: HandlerVariant,
    id: &str,
) -> IssueResult {
    let href = match variant {
        HandlerVariant::Specialized => match order_block(&page.body, id) {
            Some(block) => receipt_href(&block),
            None => receipt_href(&page.body),
        },
        HandlerVariant::Standard => receipt_href(&page.body),
    };

    let Some(href) = href else {
        return IssueResult::no_receipt("No receipt link on the page");
    };
    let url = match page.url.join(&href) {
        Ok(url) => url,
        Err(e) => return IssueResult::error(format!("Bad receipt link '{href}': {e}")),
    };

    tracing::debug!("Requesting receipt for {id} from {url}");
    let resp = match client.get(url).timeout(config.download_timeout).send().await {
        Ok(resp) => resp,
        Err(e) if e.is_timeout() => return IssueResult::retry(format!("Receipt request timed out: {e}")),
        Err(e) => return IssueResult::retry(format!("Receipt request failed: {e}")),
    };

    let status = resp.status();
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        return IssueResult::retry(format!("Receipt endpoint returned {status}"));
    }
    if !status.is_success() {
        return IssueResult::error(format!("Receipt endpoint returned {status}"));
    }

    let content_type = resp
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    let body = match resp.bytes().await {
        Ok(body) => body,
        Err(e) => return IssueResult::retry(format!("Receipt download interrupted: {e}")),
    };

    if !is_pdf(content_type.as_deref(), &body) {
        return IssueResult::retry(format!(
            "Receipt response was not a PDF ({})",
            content_type.as_deref().unwrap_or("no content type")
        ));
    }

    let name = receipt_file_name(id);
    match save(&config.download_dir, &name, &body).await {
        Ok(()) => {
            tracing::info!("Saved {name} ({} bytes)", body.len());
            IssueResult::done(name)
        }
        Err(e) => IssueResult::error(format!("Failed to save {name}: {e}")),
    }
}

async fn save(dir: &Path, name: &str, body: &[u8]) -> std::io::Result<()> {
    tokio::fs::create_dir_all(dir).await?;
    tokio::fs::write(dir.join(name), body).await
}
