pub mod lookup;

use std::fmt;

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};

use crate::models::IssueResult;

pub use lookup::{first_match, Lookup};

/// Failure inside a collaborator call (navigation, extraction, login).
#[derive(Debug)]
pub enum SessionError {
    Timeout(String),
    Transport(String),
    UnexpectedPage(String),
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::Timeout(msg) => write!(f, "Timed out: {msg}"),
            SessionError::Transport(msg) => write!(f, "Transport error: {msg}"),
            SessionError::UnexpectedPage(msg) => write!(f, "Unexpected page: {msg}"),
        }
    }
}

impl std::error::Error for SessionError {}

/// Optional month range applied to the first list page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateRange {
    pub from: Option<YearMonth>,
    pub to: Option<YearMonth>,
}

impl DateRange {
    pub fn is_enabled(&self) -> bool {
        self.from.is_some() || self.to.is_some()
    }

    pub fn describe(&self) -> String {
        if !self.is_enabled() {
            return "Period: all".to_string();
        }
        let from = self.from.map(|m| m.to_string()).unwrap_or_else(|| "start".into());
        let to = self.to.map(|m| m.to_string()).unwrap_or_else(|| "now".into());
        format!("Period: {from} .. {to}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    /// Parse `YYYY-MM`.
    pub fn parse(s: &str) -> Result<Self, String> {
        let date = NaiveDate::parse_from_str(&format!("{}-01", s.trim()), "%Y-%m-%d")
            .map_err(|_| format!("Expected YYYY-MM, got '{s}'"))?;
        Ok(Self {
            year: date.year(),
            month: date.month(),
        })
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

/// The two kinds of order that need different receipt flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerVariant {
    /// Receipt flow starts on the order's detail page.
    Standard,
    /// Receipt flow can start from the listing entry itself.
    Specialized,
}

impl fmt::Display for HandlerVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HandlerVariant::Standard => f.write_str("standard"),
            HandlerVariant::Specialized => f.write_str("specialized"),
        }
    }
}

/// Forward-only movement through the paginated order list.
///
/// On `Ok(true)` / `Ok(())` the session is on a loaded page.
#[async_trait]
pub trait Navigator: Send {
    async fn goto_list_start(&mut self, range: &DateRange) -> Result<(), SessionError>;

    /// Location of the page currently loaded, used to come back to a list page.
    fn current_url(&self) -> String;

    async fn goto_url(&mut self, url: &str) -> Result<(), SessionError>;

    /// `Ok(false)` when there is no further page.
    async fn goto_next_page(&mut self) -> Result<bool, SessionError>;

    async fn goto_detail(&mut self, id: &str) -> Result<bool, SessionError>;
}

#[async_trait]
pub trait Extractor: Send {
    /// Ordered, de-duplicated order ids visible on the current page.
    async fn extract_ids(&mut self) -> Result<Vec<String>, SessionError>;
}

#[async_trait]
pub trait Handler: Send {
    /// Listing-page shortcut: the order can be handled without its detail page.
    async fn can_handle_without_detail_page(&mut self, id: &str) -> Result<bool, SessionError>;

    /// Variant implied by the page currently loaded (called after detail navigation).
    fn detail_variant(&self) -> HandlerVariant;

    /// One attempt at the receipt action. Faults are reported in the result.
    async fn issue_action(&mut self, variant: HandlerVariant, id: &str) -> IssueResult;
}

#[async_trait]
pub trait AuthSession: Send {
    async fn login(&mut self) -> Result<bool, SessionError>;
}

/// Everything one worker drives: a single logged-in session.
pub trait Session: Navigator + Extractor + Handler + AuthSession + 'static {}

impl<T> Session for T where T: Navigator + Extractor + Handler + AuthSession + 'static {}
