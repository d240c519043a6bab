use std::sync::LazyLock;

use reqwest::{Client, Url};
use scraper::{Html, Selector};

use crate::session::SessionError;

use super::{fetch, Credentials};

static FORM: LazyLock<Selector> = LazyLock::new(|| Selector::parse("form").unwrap());
static NAMED_INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("input[name]").unwrap());
static HIDDEN_INPUT: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse(r#"input[type="hidden" i][name]"#).unwrap());

/// Login page generations the site serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginFlow {
    /// One form posting `u` and `p` together.
    Legacy,
    /// Username first, then a second form for the password.
    Modern,
}

impl LoginFlow {
    pub fn detect(body: &str) -> Option<Self> {
        let forms = login_forms(body);
        if forms.iter().any(|f| f.has("u") && f.has("p")) {
            return Some(LoginFlow::Legacy);
        }
        if forms.iter().any(|f| f.has("username")) {
            return Some(LoginFlow::Modern);
        }
        None
    }
}

#[derive(Debug, Clone)]
pub(crate) struct LoginForm {
    pub action: Option<String>,
    pub fields: Vec<String>,
    pub hidden: Vec<(String, String)>,
}

impl LoginForm {
    fn has(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    fn target(&self, page: &Url) -> Url {
        self.action
            .as_deref()
            .filter(|a| !a.is_empty())
            .and_then(|a| page.join(a).ok())
            .unwrap_or_else(|| page.clone())
    }
}

pub(crate) fn login_forms(body: &str) -> Vec<LoginForm> {
    let doc = Html::parse_document(body);
    doc.select(&FORM)
        .map(|form| LoginForm {
            action: form.value().attr("action").map(str::to_string),
            fields: form
                .select(&NAMED_INPUT)
                .filter_map(|input| input.value().attr("name"))
                .map(str::to_string)
                .collect(),
            hidden: form
                .select(&HIDDEN_INPUT)
                .filter_map(|input| {
                    let name = input.value().attr("name")?;
                    let value = input.value().attr("value").unwrap_or_default();
                    Some((name.to_string(), value.to_string()))
                })
                .collect(),
        })
        .collect()
}

/// One full login attempt: load the login page, pick the flow, submit.
pub(crate) async fn submit(
    client: &Client,
    login_url: &Url,
    credentials: &Credentials,
) -> Result<(), SessionError> {
    let page = fetch(client, login_url.clone()).await?;
    let flow = LoginFlow::detect(&page.body).ok_or_else(|| {
        SessionError::UnexpectedPage(format!("No login form at {}", page.url))
    })?;
    tracing::info!("Login flow: {flow:?}");

    let forms = login_forms(&page.body);
    match flow {
        LoginFlow::Legacy => {
            let form = forms
                .iter()
                .find(|f| f.has("u") && f.has("p"))
                .ok_or_else(|| SessionError::UnexpectedPage("Legacy form vanished".into()))?;
            let values = [
                ("u", credentials.user_id.as_str()),
                ("p", credentials.password.as_str()),
            ];
            post_form(client, form, &page.url, &values).await?;
        }
        LoginFlow::Modern => {
            let form = forms
                .iter()
                .find(|f| f.has("username"))
                .ok_or_else(|| SessionError::UnexpectedPage("Username form vanished".into()))?;
            let step = post_form(client, form, &page.url, &[("username", credentials.user_id.as_str())]).await?;

            let password_forms = login_forms(&step.body);
            let form = password_forms
                .iter()
                .find(|f| f.has("password"))
                .ok_or_else(|| {
                    SessionError::UnexpectedPage(format!("No password step at {}", step.url))
                })?;
            post_form(client, form, &step.url, &[("password", credentials.password.as_str())]).await?;
        }
    }

    Ok(())
}

async fn post_form(
    client: &Client,
    form: &LoginForm,
    page: &Url,
    values: &[(&str, &str)],
) -> Result<super::Page, SessionError> {
    let mut params: Vec<(&str, &str)> = form
        .hidden
        .iter()
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    params.extend_from_slice(values);

    let resp = client
        .post(form.target(page))
        .form(&params)
        .send()
        .await
        .map_err(super::transport_error)?
        .error_for_status()
        .map_err(super::transport_error)?;

    let url = resp.url().clone();
    let body = resp.text().await.map_err(super::transport_error)?;
    Ok(super::Page { url, body })
}

/// Logged in when the list page loads on the list host and not on the login page.
pub(crate) async fn is_logged_in(client: &Client, list_url: &Url, login_url: &Url) -> bool {
    match fetch(client, list_url.clone()).await {
        Ok(page) => landed_on_list(&page.url, list_url, login_url),
        Err(e) => {
            tracing::debug!("Login check failed: {e}");
            false
        }
    }
}

fn landed_on_list(landed: &Url, list_url: &Url, login_url: &Url) -> bool {
    let on_login_page =
        landed.host_str() == login_url.host_str() && landed.path() == login_url.path();
    landed.host_str() == list_url.host_str() && !on_login_page
}
