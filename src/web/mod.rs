//! HTTP-backed session against the order history site.

pub mod links;
pub mod login;
pub mod receipt;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::models::IssueResult;
use crate::retry::RetryPolicy;
use crate::session::{
    first_match, AuthSession, DateRange, Extractor, Handler, HandlerVariant, Lookup, Navigator,
    SessionError,
};

use links::{LinkMatcher, NEXT_PAGE_CANDIDATES};

#[derive(Clone)]
pub struct Credentials {
    pub user_id: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("password", &"[redacted]")
            .finish()
    }
}

/// Site locations and limits shared by every session of a run.
#[derive(Debug, Clone)]
pub struct WebConfig {
    pub login_url: Url,
    pub list_url: Url,
    /// Host fragment that marks the specialized order flow (e.g. `books.`).
    pub specialized_host: String,
    pub download_dir: PathBuf,
    pub credentials: Credentials,
    pub nav_timeout: Duration,
    pub download_timeout: Duration,
    pub login_retry: RetryPolicy,
}

/// A loaded page: where the site ended up and what it sent back.
#[derive(Debug, Clone)]
pub struct Page {
    pub url: Url,
    pub body: String,
}

pub(crate) fn transport_error(e: reqwest::Error) -> SessionError {
    if e.is_timeout() {
        SessionError::Timeout(e.to_string())
    } else {
        SessionError::Transport(e.to_string())
    }
}

pub(crate) async fn fetch(client: &Client, url: Url) -> Result<Page, SessionError> {
    let resp = client
        .get(url)
        .send()
        .await
        .map_err(transport_error)?
        .error_for_status()
        .map_err(transport_error)?;

    let url = resp.url().clone();
    let body = resp.text().await.map_err(transport_error)?;
    Ok(Page { url, body })
}

/// One cookie jar and the page it is currently looking at.
pub struct HttpSession {
    client: Client,
    config: Arc<WebConfig>,
    page: Option<Page>,
}

impl HttpSession {
    pub fn new(config: Arc<WebConfig>) -> Result<Self, SessionError> {
        let client = Client::builder()
            .cookie_store(true)
            .timeout(config.nav_timeout)
            .build()
            .map_err(|e| SessionError::Transport(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            page: None,
        })
    }

    fn page(&self) -> Result<&Page, SessionError> {
        self.page
            .as_ref()
            .ok_or_else(|| SessionError::UnexpectedPage("No page loaded".into()))
    }

    async fn load(&mut self, url: Url) -> Result<(), SessionError> {
        let page = fetch(&self.client, url).await?;
        tracing::debug!("Loaded {}", page.url);
        self.page = Some(page);
        Ok(())
    }

    /// Follow the first href that `pick` finds on the current page, trying
    /// `candidates` in order. Each candidate gets its own navigation timeout.
    async fn follow_first(
        &mut self,
        candidates: &[LinkMatcher],
        pick: fn(&str, &LinkMatcher) -> Option<String>,
    ) -> Result<bool, SessionError> {
        let page = self.page()?;
        let base = page.url.clone();
        let body = page.body.clone();
        let client = self.client.clone();

        let lookup = first_match(candidates, self.config.nav_timeout, |candidate| {
            let target = pick(&body, candidate).and_then(|href| base.join(&href).ok());
            let client = client.clone();
            async move {
                match target {
                    Some(url) => fetch(&client, url).await.ok(),
                    None => None,
                }
            }
        })
        .await;

        match lookup {
            Lookup::Found(page) => {
                tracing::debug!("Followed to {}", page.url);
                self.page = Some(page);
                Ok(true)
            }
            Lookup::NotFound => Ok(false),
            Lookup::TimedOut => Err(SessionError::Timeout("No candidate link answered in time".into())),
        }
    }
}

/// Month filter as the list page expects it in its query string.
pub fn list_start_url(list_url: &Url, range: &DateRange) -> Url {
    let mut url = list_url.clone();
    if range.is_enabled() {
        let mut query = url.query_pairs_mut();
        if let Some(from) = range.from {
            query.append_pair("year", &from.year.to_string());
            query.append_pair("month", &from.month.to_string());
        }
        if let Some(to) = range.to {
            query.append_pair("to_year", &to.year.to_string());
            query.append_pair("to_month", &to.month.to_string());
        }
    }
    url
}

#[async_trait]
impl Navigator for HttpSession {
    async fn goto_list_start(&mut self, range: &DateRange) -> Result<(), SessionError> {
        let url = list_start_url(&self.config.list_url, range);
        tracing::info!("Opening order list ({})", range.describe());
        self.load(url).await
    }

    fn current_url(&self) -> String {
        self.page
            .as_ref()
            .map(|p| p.url.to_string())
            .unwrap_or_default()
    }

    async fn goto_url(&mut self, url: &str) -> Result<(), SessionError> {
        let target = match &self.page {
            Some(page) => page.url.join(url),
            None => Url::parse(url),
        }
        .map_err(|e| SessionError::UnexpectedPage(format!("Bad URL '{url}': {e}")))?;
        self.load(target).await
    }

    async fn goto_next_page(&mut self) -> Result<bool, SessionError> {
        self.follow_first(&NEXT_PAGE_CANDIDATES, links::next_page_href)
            .await
    }

    async fn goto_detail(&mut self, id: &str) -> Result<bool, SessionError> {
        let candidates = links::detail_candidates(id);
        self.follow_first(&candidates, links::detail_href).await
    }
}

#[async_trait]
impl Extractor for HttpSession {
    async fn extract_ids(&mut self) -> Result<Vec<String>, SessionError> {
        let page = self.page()?;
        Ok(links::extract_order_ids(&page.body, &page.url))
    }
}

#[async_trait]
impl Handler for HttpSession {
    async fn can_handle_without_detail_page(&mut self, id: &str) -> Result<bool, SessionError> {
        let page = self.page()?;
        let shortcut = links::order_block(&page.body, id)
            .is_some_and(|block| links::has_listing_receipt_link(&block));
        Ok(shortcut)
    }

    fn detail_variant(&self) -> HandlerVariant {
        let specialized = self
            .page
            .as_ref()
            .and_then(|p| p.url.host_str())
            .is_some_and(|host| host.contains(&self.config.specialized_host));
        if specialized {
            HandlerVariant::Specialized
        } else {
            HandlerVariant::Standard
        }
    }

    async fn issue_action(&mut self, variant: HandlerVariant, id: &str) -> IssueResult {
        match &self.page {
            Some(page) => receipt::issue(&self.client, &self.config, page, variant, id).await,
            None => IssueResult::error("No page loaded"),
        }
    }
}

#[async_trait]
impl AuthSession for HttpSession {
    async fn login(&mut self) -> Result<bool, SessionError> {
        let config = self.config.clone();
        let client = self.client.clone();

        let submitted = config
            .login_retry
            .execute_with_check(
                "Login",
                || {
                    let client = client.clone();
                    let config = config.clone();
                    async move { login::submit(&client, &config.login_url, &config.credentials).await }
                },
                || {
                    let client = client.clone();
                    let config = config.clone();
                    async move { login::is_logged_in(&client, &config.list_url, &config.login_url).await }
                },
            )
            .await;

        if submitted {
            tracing::info!("Logged in as {}", config.credentials.user_id);
        } else {
            tracing::error!("Login failed for {}", config.credentials.user_id);
        }
        self.page = None;
        Ok(submitted)
    }
}
