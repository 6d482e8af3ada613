use crate::http::api_client::ApiClient;
use log::{debug, info};
use url::Url;

/// The cookie Okta checks to recognise a remembered device.
pub const DEVICE_TOKEN_COOKIE: &str = "DT";

const AUTHN_PATH: &str = "/api/v1/authn";
const MAX_AGE_SECONDS: u64 = 30 * 24 * 60 * 60;

/// The locally generated device token for `username`.
pub fn device_token_name(username: &str) -> String {
    format!("okta_{}_saml2aws", username)
}

/// Stores the `DT` cookie for `username`, scoped to the host of `url`.
pub fn set_device_token_cookie(client: &ApiClient, url: &Url, username: &str) {
    let secure = match url.scheme() {
        "https" => "; Secure",
        _ => "",
    };
    let cookie = format!(
        "{}={}; Path=/; Max-Age={}{}",
        DEVICE_TOKEN_COOKIE,
        device_token_name(username),
        MAX_AGE_SECONDS,
        secure
    );

    client.set_cookie(cookie.as_str(), url);
}

/// Tries to return the `DT` cookie the session would send to the authn endpoint.
pub fn device_token(client: &ApiClient, base_url: &Url) -> Option<String> {
    client
        .cookie(&authn_url(base_url), DEVICE_TOKEN_COOKIE)
        .filter(|value| !value.is_empty())
}

/// Makes sure a `DT` cookie goes out with the login request, keeping one the
/// provider issued earlier. Returns the value that will be sent.
pub fn prime_device_token(client: &ApiClient, base_url: &Url, username: &str) -> String {
    if let Some(existing) = device_token(client, base_url) {
        debug!("reusing device token already in the session");
        return existing;
    }

    set_device_token_cookie(client, base_url, username);
    device_token_name(username)
}

/// Re-reads the `DT` cookie after a successful login.
///
/// Okta may answer `rememberDevice=true` with its own token; that value wins.
/// A cookie that vanished is written again.
pub fn confirm_device_token(
    client: &ApiClient,
    base_url: &Url,
    username: &str,
    primed: &str,
) -> String {
    match device_token(client, base_url) {
        Some(current) if current != primed => {
            info!("okta issued a new device token");
            current
        }
        Some(current) => current,
        None => {
            debug!("device token missing after login, setting it again");
            set_device_token_cookie(client, base_url, username);
            device_token_name(username)
        }
    }
}

fn authn_url(base_url: &Url) -> Url {
    let mut url = base_url.clone();
    url.set_path(AUTHN_PATH);
    url.set_query(None);
    url
}
