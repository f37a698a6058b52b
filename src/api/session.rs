use super::PortalTransport;
use crate::config::PortalUrls;
use crate::error::{CrawlError, Result};
use crate::models::{Credential, Session};
use crate::parser;
use async_trait::async_trait;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_LANGUAGE, REFERER, USER_AGENT};
use std::sync::Arc;
use tracing::{debug, info};

const BROWSER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// One authenticated browsing session against the portal.
///
/// Navigation has no overall timeout: class pages can take minutes to render
/// on the portal side. Only connecting is bounded.
#[derive(Clone)]
pub struct RemoteSession {
    client: reqwest::Client,
    jar: Arc<Jar>,
    urls: PortalUrls,
}

impl RemoteSession {
    /// Build an unauthenticated session with an empty cookie jar.
    pub fn new(urls: PortalUrls) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = reqwest::Client::builder()
            .cookie_provider(jar.clone())
            .connect_timeout(std::time::Duration::from_secs(30))
            .default_headers(Self::build_headers())
            .build()
            .map_err(|e| CrawlError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client, jar, urls })
    }

    fn build_headers() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_AGENT));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.8"));
        headers
    }

    /// Value of a cookie the portal set on this session.
    fn cookie(&self, name: &str) -> Option<String> {
        let base = url::Url::parse(&self.urls.base).ok()?;
        let header = self.jar.cookies(&base)?;
        let header = header.to_str().ok()?;
        header.split(';').find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key == name).then(|| value.to_string())
        })
    }

    async fn get_text(&self, url: &str) -> Result<(String, String)> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CrawlError::navigation(url, e))?;

        let status = response.status();
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::navigation(url, e))?;

        if !status.is_success() {
            return Err(CrawlError::navigation(url, format!("status {}", status)));
        }
        Ok((final_url, body))
    }

    /// Log in and return the teacher id the portal redirects to, if the
    /// landing URL carries one.
    pub async fn authenticate(&self, credential: &Credential) -> Result<Option<String>> {
        info!(identity = %credential.identity, "logging in");
        let (login_url, login_page) = self.get_text(&self.urls.login).await?;
        let form = parser::parse_login_form(&login_page);

        let action = match form.action.as_deref() {
            Some(action) => url::Url::parse(&login_url)
                .and_then(|base| base.join(action))
                .map(|u| u.to_string())
                .unwrap_or_else(|_| self.urls.login.clone()),
            None => self.urls.login.clone(),
        };

        let mut fields = vec![
            ("email", credential.identity.as_str()),
            ("password", credential.secret.as_str()),
        ];
        if let Some(token) = form.csrf_token.as_deref() {
            fields.push(("csrfmiddlewaretoken", token));
        }

        let response = self
            .client
            .post(&action)
            .header(REFERER, login_url.as_str())
            .form(&fields)
            .send()
            .await
            .map_err(|e| CrawlError::navigation(&action, e))?;
        let final_url = response.url().to_string();
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::navigation(&action, e))?;

        let teacher_id = parser::parse_login_result(&final_url, &body)
            .map_err(|warnings| CrawlError::Auth(warnings.join("; ")))?;
        debug!(teacher_id = ?teacher_id, "login accepted");
        Ok(teacher_id)
    }

    /// Authenticate and build the session context every later step reads.
    ///
    /// A `cached` teacher id wins over the one derived from this login.
    pub async fn open(&self, credential: Credential, cached: Option<String>) -> Result<Session> {
        let derived = self.authenticate(&credential).await?;
        let teacher_id = resolve_teacher_id(cached, derived)?;
        Ok(Session {
            credential,
            teacher_id,
        })
    }
}

/// Pick the teacher id for a session. Fails only when neither the cache nor
/// the login produced one.
pub fn resolve_teacher_id(cached: Option<String>, derived: Option<String>) -> Result<String> {
    cached.or(derived).ok_or_else(|| {
        CrawlError::Auth("logged in, but no teacher id could be derived from the landing page".into())
    })
}

#[async_trait]
impl PortalTransport for RemoteSession {
    async fn navigate(&self, url: &str) -> Result<String> {
        debug!(url, "navigate");
        self.get_text(url).await.map(|(_, body)| body)
    }

    async fn fetch(&self, url: &str) -> Result<String> {
        debug!(url, "fetch");
        self.get_text(url).await.map(|(_, body)| body)
    }

    async fn post_form(&self, url: &str, form: &[(&str, &str)]) -> Result<String> {
        debug!(url, "post");
        let mut request = self
            .client
            .post(url)
            .header("x-requested-with", "XMLHttpRequest")
            .header(REFERER, self.urls.base.as_str())
            .form(form);
        if let Some(token) = self.cookie("csrftoken") {
            request = request.header("x-csrftoken", token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CrawlError::navigation(url, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CrawlError::navigation(url, e))?;
        if !status.is_success() {
            return Err(CrawlError::navigation(url, format!("status {}", status)));
        }
        Ok(body)
    }
}
