use crate::error::{Error, Result};
use log::{debug, warn};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderValue, ACCEPT};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use url::Url;

const POLL_BACKOFF: Duration = Duration::from_millis(250);

pub enum AcceptType {
    Json,
    Html,
}

/// What came back from the provider, already read into memory.
#[derive(Debug)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub url: Url,
    pub body: String,
}

/// HTTP client and cookie jar owned by exactly one login attempt.
///
/// The jar is held explicitly (rather than through `cookie_store(true)`) so the
/// device trust cookie can be read back per URL. Once a username is bound, the
/// carrier refuses to be used for another one.
pub struct ApiClient {
    http_client: Client,
    cookie_jar: Arc<Jar>,
    username: OnceLock<String>,
    requests: AtomicU32,
}

impl ApiClient {
    pub fn new() -> Result<ApiClient> {
        let cookie_jar = Arc::new(Jar::default());
        let http_client = Client::builder()
            .cookie_provider(Arc::clone(&cookie_jar))
            .build()?;

        Ok(ApiClient {
            http_client,
            cookie_jar,
            username: OnceLock::new(),
            requests: AtomicU32::new(0),
        })
    }

    /// Ties this carrier to `username`. Binding the same name again is a no-op.
    pub fn bind_username(&self, username: &str) -> Result<()> {
        let bound = self.username.get_or_init(|| username.to_string());
        if bound != username {
            return Err(Error::SessionUserMismatch {
                bound: bound.clone(),
                requested: username.to_string(),
            });
        }

        Ok(())
    }

    /// POSTs a state-mutating JSON request.
    ///
    /// Retried once, immediately, and only if the connection could not be made:
    /// a request that reached Okta may already count towards its lockout limits.
    pub async fn post_json(&self, uri: &str, json: &Value) -> Result<ApiResponse> {
        with_retries(1, Duration::ZERO, reqwest::Error::is_connect, move || {
            self.send(self.json_request(uri, json))
        })
        .await
    }

    /// POSTs an idempotent status check, retrying transient network failures.
    ///
    /// Each attempt is bounded by `timeout`.
    pub async fn poll_json(
        &self,
        uri: &str,
        json: &Value,
        retries: u32,
        timeout: Duration,
    ) -> Result<ApiResponse> {
        with_retries(retries, POLL_BACKOFF, is_transient, move || {
            self.send(self.json_request(uri, json).timeout(timeout))
        })
        .await
    }

    pub async fn get(
        &self,
        url: &str,
        params: Option<HashMap<String, String>>,
        accept_type: AcceptType,
    ) -> Result<ApiResponse> {
        let mut url = Url::parse(url)?;

        for (key, value) in &params.unwrap_or_default() {
            url.query_pairs_mut()
                .append_pair(key.as_str(), value.as_str());
        }

        let request = self
            .http_client
            .get(url)
            .header(ACCEPT, ApiClient::accept_header(accept_type));

        self.send(request).await
    }

    /// How many requests this carrier has attempted, retries included.
    pub fn requests_sent(&self) -> u32 {
        self.requests.load(Ordering::Relaxed)
    }

    /// All cookies the jar would send to `url`, in jar order.
    pub fn cookies(&self, url: &Url) -> Vec<(String, String)> {
        let header = match self.cookie_jar.cookies(url) {
            Some(header) => header,
            None => return vec![],
        };

        header
            .to_str()
            .unwrap_or_default()
            .split(';')
            .filter_map(|pair| {
                let (name, value) = pair.trim().split_once('=')?;
                Some((name.to_string(), value.to_string()))
            })
            .collect()
    }

    pub fn cookie(&self, url: &Url, name: &str) -> Option<String> {
        self.cookies(url)
            .into_iter()
            .find(|(cookie_name, _)| cookie_name == name)
            .map(|(_, value)| value)
    }

    /// Stores a `Set-Cookie` style string as if `url` had sent it.
    pub(crate) fn set_cookie(&self, cookie: &str, url: &Url) {
        self.cookie_jar.add_cookie_str(cookie, url);
    }

    fn json_request(&self, uri: &str, json: &Value) -> RequestBuilder {
        self.http_client
            .post(uri)
            .json(json)
            .header(ACCEPT, ApiClient::accept_header(AcceptType::Json))
    }

    async fn send(&self, request: RequestBuilder) -> Result<ApiResponse> {
        let attempt = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().clone();
        let body = response.text().await?;

        debug!("#{} {} {}", attempt, status, redact(url.as_str()));

        Ok(ApiResponse { status, url, body })
    }

    fn accept_header(accept_type: AcceptType) -> HeaderValue {
        match accept_type {
            AcceptType::Html => {
                HeaderValue::from_static("text/html,application/xhtml+xml,application/xml")
            }
            AcceptType::Json => HeaderValue::from_static("application/json"),
        }
    }
}

fn is_transient(error: &reqwest::Error) -> bool {
    error.is_connect() || error.is_timeout()
}

/// Runs `attempt` until it returns something other than an HTTP error `retryable`
/// accepts, or `retries` extra attempts are spent. Retry `n` waits `backoff * n`.
async fn with_retries<F, Fut>(
    retries: u32,
    backoff: Duration,
    retryable: fn(&reqwest::Error) -> bool,
    mut attempt: F,
) -> Result<ApiResponse>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<ApiResponse>>,
{
    let mut retried = 0;
    loop {
        match attempt().await {
            Err(Error::Http(e)) if retried < retries && retryable(&e) => {
                retried += 1;
                warn!("request failed ({}), retry {}/{}", e, retried, retries);
                tokio::time::sleep(backoff * retried).await;
            }
            other => return other,
        }
    }
}

// query strings carry session and state tokens
fn redact(uri: &str) -> &str {
    uri.split('?').next().unwrap_or(uri)
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::MockServer;

    #[test]
    fn test_new() {
        let client = ApiClient::new();
        assert!(client.is_ok());
    }

    #[test]
    fn test_bind_username() {
        let client = ApiClient::new().unwrap();

        assert!(client.bind_username("user@example.com").is_ok());
        assert!(client.bind_username("user@example.com").is_ok());

        let err = client.bind_username("other@example.com").unwrap_err();
        assert!(matches!(
            err,
            Error::SessionUserMismatch { ref bound, ref requested }
                if bound == "user@example.com" && requested == "other@example.com"
        ));
    }

    #[test]
    fn test_cookies_are_scoped_by_url() {
        let client = ApiClient::new().unwrap();
        let url = Url::parse("https://idp.example.com/api/v1/authn").unwrap();
        client.set_cookie("sid=abc; Path=/", &url);
        client.set_cookie("JSESSIONID=xyz; Path=/app", &url);

        let root = Url::parse("https://idp.example.com/abc").unwrap();
        assert_eq!(client.cookie(&root, "sid"), Some(String::from("abc")));
        assert_eq!(client.cookie(&root, "JSESSIONID"), None);

        let app = Url::parse("https://idp.example.com/app/home").unwrap();
        assert_eq!(client.cookies(&app).len(), 2);

        let other = Url::parse("https://other.example.com/").unwrap();
        assert!(client.cookies(&other).is_empty());
    }

    #[tokio::test]
    async fn test_post_json_keeps_cookies() {
        let server = MockServer::start();
        let login_mock = server.mock(|when, then| {
            when.method("POST")
                .path("/api/v1/authn")
                .header("accept", "application/json")
                .json_body(serde_json::json!({ "username": "user" }));
            then.status(200)
                .header("content-type", "application/json")
                .header("set-cookie", "sid=the-session; Path=/")
                .body(r#"{"status":"SUCCESS"}"#);
        });

        let client = ApiClient::new().unwrap();
        let response = client
            .post_json(
                server.url("/api/v1/authn").as_str(),
                &serde_json::json!({ "username": "user" }),
            )
            .await
            .unwrap();

        login_mock.assert();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body, r#"{"status":"SUCCESS"}"#);

        let url = Url::parse(server.url("/anything").as_str()).unwrap();
        assert_eq!(client.cookie(&url, "sid"), Some(String::from("the-session")));
    }

    #[tokio::test]
    async fn test_get_with_params() {
        let server = MockServer::start();
        let page_mock = server.mock(|when, then| {
            when.method("GET")
                .path("/home/app")
                .query_param("sessionToken", "TheSessionToken");
            then.status(200).body("<html></html>");
        });

        let client = ApiClient::new().unwrap();
        let mut params = HashMap::new();
        params.insert(String::from("sessionToken"), String::from("TheSessionToken"));

        let response = client
            .get(server.url("/home/app").as_str(), Some(params), AcceptType::Html)
            .await
            .unwrap();

        page_mock.assert();
        assert_eq!(response.body, "<html></html>");
    }

    // a port nothing listens on
    fn closed_url() -> String {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        format!("http://127.0.0.1:{}/api/v1/authn", port)
    }

    #[tokio::test]
    async fn test_post_json_retries_connect_failure_once() {
        let client = ApiClient::new().unwrap();

        let err = client
            .post_json(closed_url().as_str(), &serde_json::json!({ "username": "user" }))
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http(ref e) if e.is_connect()));
        assert_eq!(client.requests_sent(), 2);
    }

    #[tokio::test]
    async fn test_post_json_does_not_retry_server_errors() {
        let server = MockServer::start();
        let login_mock = server.mock(|when, then| {
            when.method("POST").path("/api/v1/authn");
            then.status(500).body("oops");
        });

        let client = ApiClient::new().unwrap();
        let response = client
            .post_json(server.url("/api/v1/authn").as_str(), &serde_json::json!({}))
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(login_mock.hits(), 1);
        assert_eq!(client.requests_sent(), 1);
    }

    #[tokio::test]
    async fn test_poll_json_retries_connect_failures() {
        let client = ApiClient::new().unwrap();

        let err = client
            .poll_json(
                closed_url().as_str(),
                &serde_json::json!({ "stateToken": "abc" }),
                2,
                Duration::from_secs(5),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http(ref e) if e.is_connect()));
        assert_eq!(client.requests_sent(), 3);
    }

    #[tokio::test]
    async fn test_poll_json_retries_timeouts() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method("POST").path("/poll");
            then.status(200)
                .delay(Duration::from_secs(2))
                .body(r#"{"status":"MFA_CHALLENGE","factorResult":"WAITING"}"#);
        });

        let client = ApiClient::new().unwrap();
        let started = std::time::Instant::now();
        let err = client
            .poll_json(
                server.url("/poll").as_str(),
                &serde_json::json!({ "stateToken": "abc" }),
                1,
                Duration::from_millis(100),
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::Http(ref e) if e.is_timeout()));
        assert_eq!(client.requests_sent(), 2);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_redact() {
        assert_eq!(
            redact("https://idp.example.com/app?sessionToken=secret"),
            "https://idp.example.com/app"
        );
        assert_eq!(redact("https://idp.example.com/"), "https://idp.example.com/");
    }
}
