#![allow(dead_code)]

pub mod site;

use std::collections::{HashMap, HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use uuid::Uuid;

use orderbot::dispatch::{DispatchSettings, Shutdown};
use orderbot::models::IssueResult;
use orderbot::notify::{Notifier, NotifyError};
use orderbot::session::{
    AuthSession, DateRange, Extractor, Handler, HandlerVariant, Navigator, SessionError,
};
use orderbot::{OrderStore, RunReport};

/// Fresh in-memory store for one test.
pub async fn store(retry_ceiling: u32) -> OrderStore {
    OrderStore::open_in_memory(retry_ceiling)
        .await
        .expect("failed to open in-memory store")
}

/// Settings with no waiting between attempts.
pub fn fast_settings() -> DispatchSettings {
    DispatchSettings {
        order_retry_limit: 3,
        retry_delay: Duration::ZERO,
        action_timeout: Duration::from_secs(5),
        nav_timeout: Duration::from_secs(5),
        date_range: DateRange::default(),
    }
}

pub fn no_stop() -> (watch::Sender<bool>, Shutdown) {
    watch::channel(false)
}

pub fn temp_csv() -> PathBuf {
    std::env::temp_dir().join(format!("orderbot-test-{}.csv", Uuid::now_v7()))
}

/// A scripted order list shared by every session of a test.
///
/// Pages hold order ids; actions pop scripted outcomes per id and fall back to
/// DONE once the script runs dry.
#[derive(Default)]
pub struct FakeSite {
    pages: Vec<Vec<String>>,
    outcomes: Mutex<HashMap<String, VecDeque<IssueResult>>>,
    unreachable_details: HashSet<String>,
    /// Orders whose listing entry carries the receipt link itself.
    listing_shortcuts: HashSet<String>,
    /// Orders whose detail page belongs to the specialized flow.
    specialized_details: HashSet<String>,
    action_delay: Option<Duration>,
    /// (session label, 1-based page) for every page whose ids were extracted.
    visits: Mutex<Vec<(usize, usize)>>,
    attempts: Mutex<HashMap<String, u32>>,
    detail_visits: Mutex<Vec<String>>,
    variants: Mutex<HashMap<String, HandlerVariant>>,
}

impl FakeSite {
    pub fn new(pages: &[&[&str]]) -> Self {
        Self {
            pages: pages
                .iter()
                .map(|ids| ids.iter().map(|id| id.to_string()).collect())
                .collect(),
            ..Self::default()
        }
    }

    /// `n` pages with one id each, named `order-<page>`.
    pub fn numbered(n: usize) -> Self {
        Self {
            pages: (1..=n).map(|p| vec![format!("order-{p}")]).collect(),
            ..Self::default()
        }
    }

    pub fn script(self, id: &str, outcomes: Vec<IssueResult>) -> Self {
        self.outcomes
            .lock()
            .unwrap()
            .insert(id.to_string(), outcomes.into());
        self
    }

    pub fn unreachable_detail(mut self, id: &str) -> Self {
        self.unreachable_details.insert(id.to_string());
        self
    }

    pub fn listing_shortcut(mut self, id: &str) -> Self {
        self.listing_shortcuts.insert(id.to_string());
        self
    }

    pub fn specialized_detail(mut self, id: &str) -> Self {
        self.specialized_details.insert(id.to_string());
        self
    }

    pub fn slow_actions(mut self, delay: Duration) -> Self {
        self.action_delay = Some(delay);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn pages_visited_by(&self, label: usize) -> Vec<usize> {
        self.visits
            .lock()
            .unwrap()
            .iter()
            .filter(|(l, _)| *l == label)
            .map(|(_, p)| *p)
            .collect()
    }

    pub fn all_pages_visited(&self) -> Vec<usize> {
        let mut pages: Vec<usize> = self.visits.lock().unwrap().iter().map(|(_, p)| *p).collect();
        pages.sort_unstable();
        pages
    }

    pub fn attempts(&self, id: &str) -> u32 {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Ids whose detail page was opened, in order.
    pub fn detail_visits(&self) -> Vec<String> {
        self.detail_visits.lock().unwrap().clone()
    }

    /// Handler variant of the last action issued for `id`.
    pub fn variant_used(&self, id: &str) -> Option<HandlerVariant> {
        self.variants.lock().unwrap().get(id).copied()
    }
}

/// One session over a `FakeSite`, addressed by `fake://list?page=N`.
pub struct FakeSession {
    site: Arc<FakeSite>,
    label: usize,
    page: usize,
    detail: Option<String>,
    login_ok: bool,
    fail_extract_on: Option<usize>,
    slow_extract_on: Option<usize>,
}

impl FakeSession {
    pub fn new(site: Arc<FakeSite>, label: usize) -> Self {
        Self {
            site,
            label,
            page: 1,
            detail: None,
            login_ok: true,
            fail_extract_on: None,
            slow_extract_on: None,
        }
    }

    pub fn rejecting_login(mut self) -> Self {
        self.login_ok = false;
        self
    }

    /// Make extraction blow up on the given 1-based page.
    pub fn failing_on_page(mut self, page: usize) -> Self {
        self.fail_extract_on = Some(page);
        self
    }

    /// Make extraction hang on the given 1-based page. The visit is still recorded.
    pub fn slow_extract_on(mut self, page: usize) -> Self {
        self.slow_extract_on = Some(page);
        self
    }
}

pub fn sessions(site: &Arc<FakeSite>, n: usize) -> Vec<FakeSession> {
    (0..n).map(|label| FakeSession::new(site.clone(), label)).collect()
}

#[async_trait]
impl Navigator for FakeSession {
    async fn goto_list_start(&mut self, _range: &DateRange) -> Result<(), SessionError> {
        self.page = 1;
        self.detail = None;
        Ok(())
    }

    fn current_url(&self) -> String {
        match &self.detail {
            Some(id) => format!("fake://detail/{id}"),
            None => format!("fake://list?page={}", self.page),
        }
    }

    async fn goto_url(&mut self, url: &str) -> Result<(), SessionError> {
        let page = url
            .split_once("page=")
            .and_then(|(_, n)| n.parse().ok())
            .ok_or_else(|| SessionError::UnexpectedPage(url.to_string()))?;
        self.page = page;
        self.detail = None;
        Ok(())
    }

    async fn goto_next_page(&mut self) -> Result<bool, SessionError> {
        if self.page < self.site.pages.len() {
            self.page += 1;
            self.detail = None;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    async fn goto_detail(&mut self, id: &str) -> Result<bool, SessionError> {
        if self.site.unreachable_details.contains(id) {
            return Ok(false);
        }
        self.site.detail_visits.lock().unwrap().push(id.to_string());
        self.detail = Some(id.to_string());
        Ok(true)
    }
}

#[async_trait]
impl Extractor for FakeSession {
    async fn extract_ids(&mut self) -> Result<Vec<String>, SessionError> {
        if self.fail_extract_on == Some(self.page) {
            return Err(SessionError::UnexpectedPage(format!("page {} broke", self.page)));
        }
        self.site.visits.lock().unwrap().push((self.label, self.page));
        if self.slow_extract_on == Some(self.page) {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok(self
            .site
            .pages
            .get(self.page - 1)
            .cloned()
            .unwrap_or_default())
    }
}

#[async_trait]
impl Handler for FakeSession {
    async fn can_handle_without_detail_page(&mut self, id: &str) -> Result<bool, SessionError> {
        Ok(self.site.listing_shortcuts.contains(id))
    }

    fn detail_variant(&self) -> HandlerVariant {
        match &self.detail {
            Some(id) if self.site.specialized_details.contains(id) => HandlerVariant::Specialized,
            _ => HandlerVariant::Standard,
        }
    }

    async fn issue_action(&mut self, variant: HandlerVariant, id: &str) -> IssueResult {
        self.site
            .variants
            .lock()
            .unwrap()
            .insert(id.to_string(), variant);
        *self
            .site
            .attempts
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default() += 1;

        if let Some(delay) = self.site.action_delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self
            .site
            .outcomes
            .lock()
            .unwrap()
            .get_mut(id)
            .and_then(|queue| queue.pop_front());
        scripted.unwrap_or_else(|| IssueResult::done(format!("receipt_{id}.pdf")))
    }
}

#[async_trait]
impl AuthSession for FakeSession {
    async fn login(&mut self) -> Result<bool, SessionError> {
        Ok(self.login_ok)
    }
}

/// Keeps every report it is handed.
#[derive(Default)]
pub struct RecordingNotifier {
    pub reports: Mutex<Vec<RunReport>>,
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, report: &RunReport) -> Result<(), NotifyError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

/// Always fails, to show delivery problems do not fail the run.
pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _report: &RunReport) -> Result<(), NotifyError> {
        Err("webhook unreachable".to_string().into())
    }
}
