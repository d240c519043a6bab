use std::path::PathBuf;
use std::time::Duration;

use reqwest::Url;

use crate::dispatch::DispatchSettings;
use crate::retry::RetryPolicy;
use crate::session::{DateRange, YearMonth};
use crate::web::{Credentials, WebConfig};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub report_path: PathBuf,
    pub download_dir: PathBuf,
    pub credentials: Credentials,
    pub login_url: Url,
    pub list_url: Url,
    pub specialized_host: String,
    pub workers: usize,
    pub order_retry_limit: u32,
    pub retry_ceiling: u32,
    pub retry_delay: Duration,
    pub action_timeout: Duration,
    pub nav_timeout: Duration,
    pub date_range: DateRange,
    pub notify_webhook_url: Option<String>,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self, String> {
        let database_url = env_or("ORDERBOT_DATABASE_URL", "sqlite://data.db");
        let report_path = PathBuf::from(env_or("ORDERBOT_REPORT_PATH", "report.csv"));
        let download_dir = PathBuf::from(env_or("ORDERBOT_DOWNLOAD_DIR", "downloads"));

        let credentials = Credentials {
            user_id: env_required("ORDERBOT_USER_ID")?,
            password: env_required("ORDERBOT_PASSWORD")?,
        };

        let login_url = parse_url("ORDERBOT_LOGIN_URL", "https://www.rakuten.co.jp/")?;
        let list_url = parse_url("ORDERBOT_LIST_URL", "https://order.my.rakuten.co.jp/")?;
        let specialized_host = env_or("ORDERBOT_SPECIALIZED_HOST", "books.");

        let workers: usize = parse_positive("ORDERBOT_WORKERS", "3")?;
        let order_retry_limit: u32 = parse_positive("ORDERBOT_ORDER_RETRY_LIMIT", "3")?;
        let retry_ceiling: u32 = parse_positive("ORDERBOT_RETRY_CEILING", "3")?;

        let retry_delay = Duration::from_secs(parse_secs("ORDERBOT_RETRY_DELAY_SECS", "2")?);
        let action_timeout = Duration::from_secs(parse_secs("ORDERBOT_ACTION_TIMEOUT_SECS", "60")?);
        let nav_timeout = Duration::from_secs(parse_secs("ORDERBOT_NAV_TIMEOUT_SECS", "30")?);

        let date_range = DateRange {
            from: parse_month("ORDERBOT_DATE_FROM")?,
            to: parse_month("ORDERBOT_DATE_TO")?,
        };
        if let (Some(from), Some(to)) = (date_range.from, date_range.to)
            && from > to
        {
            return Err(format!(
                "ORDERBOT_DATE_FROM ({from}) is after ORDERBOT_DATE_TO ({to})"
            ));
        }

        let notify_webhook_url = std::env::var("ORDERBOT_NOTIFY_WEBHOOK_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let log_level = env_or("ORDERBOT_LOG_LEVEL", "info");

        Ok(Config {
            database_url,
            report_path,
            download_dir,
            credentials,
            login_url,
            list_url,
            specialized_host,
            workers,
            order_retry_limit,
            retry_ceiling,
            retry_delay,
            action_timeout,
            nav_timeout,
            date_range,
            notify_webhook_url,
            log_level,
        })
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            order_retry_limit: self.order_retry_limit,
            retry_delay: self.retry_delay,
            action_timeout: self.action_timeout,
            nav_timeout: self.nav_timeout,
            date_range: self.date_range,
        }
    }

    pub fn web_config(&self) -> WebConfig {
        WebConfig {
            login_url: self.login_url.clone(),
            list_url: self.list_url.clone(),
            specialized_host: self.specialized_host.clone(),
            download_dir: self.download_dir.clone(),
            credentials: self.credentials.clone(),
            nav_timeout: self.nav_timeout,
            download_timeout: self.action_timeout,
            login_retry: RetryPolicy::default(),
        }
    }
}

fn env_required(key: &str) -> Result<String, String> {
    std::env::var(key).map_err(|_| format!("Missing required environment variable: {key}"))
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_url(key: &str, default: &str) -> Result<Url, String> {
    Url::parse(&env_or(key, default)).map_err(|e| format!("Invalid {key}: {e}"))
}

fn parse_secs(key: &str, default: &str) -> Result<u64, String> {
    env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))
}

fn parse_positive<T>(key: &str, default: &str) -> Result<T, String>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
    T::Err: std::fmt::Display,
{
    let value: T = env_or(key, default)
        .parse()
        .map_err(|e| format!("Invalid {key}: {e}"))?;
    if value < T::from(1) {
        return Err(format!("{key} must be at least 1"));
    }
    Ok(value)
}

fn parse_month(key: &str) -> Result<Option<YearMonth>, String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => YearMonth::parse(&value)
            .map(Some)
            .map_err(|e| format!("Invalid {key}: {e}")),
        _ => Ok(None),
    }
}
