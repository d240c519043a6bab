//! A local order site served by axum, for driving `HttpSession` end to end.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Form, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{Html, IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use reqwest::Url;
use uuid::Uuid;

use orderbot::web::{Credentials, HttpSession, WebConfig};
use orderbot::RetryPolicy;

pub const USER: &str = "alice";
pub const PASSWORD: &str = "s3cret";

pub const SAVED: &str = "100-000-001";
pub const UNAVAILABLE: &str = "100-000-002";
pub const MISSING: &str = "100-000-003";
pub const NOT_PDF: &str = "100-000-004";
pub const NO_LINK: &str = "100-000-005";
pub const THROTTLED: &str = "100-000-006";
pub const ON_LAST_PAGE: &str = "100-000-007";
pub const LISTING_RECEIPT: &str = "200-000-001";

pub const LEGACY_LOGIN: &str = "/login";
pub const MODERN_LOGIN: &str = "/v2/login";

const PDF: &[u8] = b"%PDF-1.4\n%receipt\n";

const LEGACY_FORM: &str = r#"<html><body>
<form action="/login" method="post">
  <input type="hidden" name="token" value="t0k3n">
  <input type="text" name="u">
  <input type="password" name="p">
  <button>Sign in</button>
</form>
</body></html>"#;

const USERNAME_FORM: &str = r#"<html><body>
<form action="/v2/login/identify" method="post">
  <input type=hidden name=state value=s1>
  <input name=username>
</form>
</body></html>"#;

const PAGE_ONE: &str = r#"<html><body>
<ul class="orders">
  <li><div id=100-000-001><a href=/detail?order_number=100-000-001>注文詳細</a></div></li>
  <li><div id="100-000-002"><a href="/detail?order_number=100-000-002">注文詳細</a></div></li>
  <li><div id="100-000-003"><a href="/detail?order_number=100-000-003">注文詳細</a></div></li>
  <li><div id="100-000-004"><a href="/detail?order_number=100-000-004">注文詳細</a></div></li>
  <li><div id="100-000-005"><a href="/detail?order_number=100-000-005">注文詳細</a></div></li>
  <li><div id="100-000-006"><a href="/detail?order_number=100-000-006">注文詳細</a></div></li>
  <li><div id="200-000-001">
    <a href="/detail?order_number=200-000-001">注文詳細</a>
    <a class="status-info__receipt-link" href="javascript:postReceipt('/receipt/200-000-001')">領収書</a>
  </div></li>
</ul>
<nav>
  <a rel="next" class="disabled" href="/history?page=9">&rsaquo;</a>
  <a href="/history?page=2">次へ</a>
</nav>
</body></html>"#;

const PAGE_TWO: &str = r#"<html><body>
<ul class="orders">
  <li><div id="100-000-007"><a href="/detail?order_number=100-000-007">注文詳細</a></div></li>
</ul>
<nav><a rel="next" aria-disabled="true" href="/history?page=3">次へ</a></nav>
</body></html>"#;

#[derive(Clone)]
struct SiteState {
    /// Where pages bounce visitors without a session cookie.
    login_path: &'static str,
}

/// A running order site plus a private download directory.
pub struct TestSite {
    pub addr: SocketAddr,
    pub download_dir: PathBuf,
    login_path: &'static str,
}

impl TestSite {
    pub fn url(&self, path: &str) -> Url {
        Url::parse(&format!("http://{}{}", self.addr, path)).unwrap()
    }

    pub fn config(&self, password: &str) -> Arc<WebConfig> {
        Arc::new(WebConfig {
            login_url: self.url(self.login_path),
            list_url: self.url("/history"),
            specialized_host: "books.".to_string(),
            download_dir: self.download_dir.clone(),
            credentials: Credentials {
                user_id: USER.to_string(),
                password: password.to_string(),
            },
            nav_timeout: Duration::from_secs(5),
            download_timeout: Duration::from_secs(5),
            login_retry: RetryPolicy::new(2, Duration::ZERO),
        })
    }

    pub fn session(&self) -> HttpSession {
        HttpSession::new(self.config(PASSWORD)).expect("failed to build session")
    }

    pub fn saved(&self, id: &str) -> Option<Vec<u8>> {
        std::fs::read(self.download_dir.join(format!("receipt_{id}.pdf"))).ok()
    }
}

impl Drop for TestSite {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.download_dir);
    }
}

/// Serve the site on a random port. Unauthenticated list pages redirect to
/// `login_path`, which is also the login page the sessions are pointed at.
pub async fn spawn_site(login_path: &'static str) -> TestSite {
    let app = Router::new()
        .route(LEGACY_LOGIN, get(legacy_form).post(legacy_submit))
        .route(MODERN_LOGIN, get(username_form))
        .route("/v2/login/identify", post(identify))
        .route("/v2/login/password", post(password_submit))
        .route("/history", get(history))
        .route("/detail", get(detail))
        .route("/receipt/{id}", get(receipt))
        .with_state(SiteState { login_path });

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind to random port");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("Order site failed");
    });

    TestSite {
        addr,
        download_dir: std::env::temp_dir().join(format!("orderbot-receipts-{}", Uuid::now_v7())),
        login_path,
    }
}

fn field<'a>(form: &'a HashMap<String, String>, name: &str) -> &'a str {
    form.get(name).map(String::as_str).unwrap_or_default()
}

fn signed_in() -> Response {
    (
        [(header::SET_COOKIE, "session=ok; Path=/")],
        Html("<p>Welcome back</p>"),
    )
        .into_response()
}

fn has_session(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.split(';').any(|c| c.trim() == "session=ok"))
}

fn password_form(user: &str) -> String {
    format!(
        r#"<html><body>
<form action="/v2/login/password" method="post">
  <input type="hidden" name="username" value="{user}">
  <input type="password" name="password">
</form>
</body></html>"#
    )
}

async fn legacy_form() -> Html<&'static str> {
    Html(LEGACY_FORM)
}

async fn legacy_submit(Form(form): Form<HashMap<String, String>>) -> Response {
    if field(&form, "token") == "t0k3n" && field(&form, "u") == USER && field(&form, "p") == PASSWORD {
        signed_in()
    } else {
        Html(LEGACY_FORM).into_response()
    }
}

async fn username_form() -> Html<&'static str> {
    Html(USERNAME_FORM)
}

async fn identify(Form(form): Form<HashMap<String, String>>) -> Response {
    let user = field(&form, "username");
    if field(&form, "state") != "s1" || user.is_empty() {
        return Html(USERNAME_FORM).into_response();
    }
    Html(password_form(user)).into_response()
}

async fn password_submit(Form(form): Form<HashMap<String, String>>) -> Response {
    let user = field(&form, "username");
    if user == USER && field(&form, "password") == PASSWORD {
        signed_in()
    } else {
        Html(password_form(user)).into_response()
    }
}

async fn history(
    State(state): State<SiteState>,
    headers: HeaderMap,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if !has_session(&headers) {
        return Redirect::to(state.login_path).into_response();
    }
    match query.get("page").map(String::as_str).unwrap_or("1") {
        "1" => Html(PAGE_ONE).into_response(),
        "2" => Html(PAGE_TWO).into_response(),
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}

async fn detail(Query(query): Query<HashMap<String, String>>) -> Response {
    let id = field(&query, "order_number");
    if id == NO_LINK {
        return Html(format!("<h1>Order {id}</h1><p>Not yet available.</p>")).into_response();
    }
    Html(format!(
        r#"<h1>Order {id}</h1><a data-testid="receipt-link" href="/receipt/{id}">領収書を発行</a>"#
    ))
    .into_response()
}

async fn receipt(Path(id): Path<String>) -> Response {
    match id.as_str() {
        UNAVAILABLE => StatusCode::SERVICE_UNAVAILABLE.into_response(),
        MISSING => StatusCode::NOT_FOUND.into_response(),
        THROTTLED => StatusCode::TOO_MANY_REQUESTS.into_response(),
        NOT_PDF => Html("<html>Session expired</html>").into_response(),
        _ => ([(header::CONTENT_TYPE, "application/pdf")], PDF).into_response(),
    }
}
