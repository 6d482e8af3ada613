use crate::error::Result;
use crate::http::api_client::{AcceptType, ApiClient};
use crate::okta::authenticator_client::{AuthenticatorClient, VerifySettings};
use crate::okta::device_token::{confirm_device_token, prime_device_token, DEVICE_TOKEN_COOKIE};
use crate::okta::prompter::MfaPrompter;
use crate::okta::saml_parsers::{parse_embed_page, saml_response, EmbedPage};
use crate::okta::webauthn::WebauthnSigner;
use crate::provider::{LoginDetails, SamlAssertion};
use crate::settings::{IdpAccount, OktaFlags};
use anyhow::anyhow;
use log::{debug, info};
use serde::Deserialize;
use std::collections::HashMap;
use tokio_util::sync::CancellationToken;
use url::Url;

const SESSION_PATH: &str = "/api/v1/sessions/me";
const STEP_UP_PATH: &str = "/login/step-up/redirect";

#[derive(Deserialize, Debug)]
struct SessionResponse {
    status: Option<String>,
    login: Option<String>,
}

/// Logs a user into Okta and returns the SAML assertion of one application.
///
/// One client serves one login attempt: its cookie jar refuses a second username.
pub struct OktaClient {
    client: ApiClient,
    flags: OktaFlags,
    prompter: Box<dyn MfaPrompter>,
    signer: Option<Box<dyn WebauthnSigner>>,
    verify_settings: VerifySettings,
    cancellation: CancellationToken,
}

impl OktaClient {
    pub fn new(account: &IdpAccount, prompter: Box<dyn MfaPrompter>) -> Result<OktaClient> {
        Ok(OktaClient {
            client: ApiClient::new()?,
            flags: account.flags(),
            prompter,
            signer: None,
            verify_settings: VerifySettings::default(),
            cancellation: CancellationToken::new(),
        })
    }

    pub fn with_webauthn_signer(mut self, signer: Box<dyn WebauthnSigner>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_verify_settings(mut self, verify_settings: VerifySettings) -> Self {
        self.verify_settings = verify_settings;
        self
    }

    /// A handle that aborts a pending push verification when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation.clone()
    }

    pub fn disable_sessions(&self) -> bool {
        self.flags.disable_sessions
    }

    pub fn remember_device(&self) -> bool {
        self.flags.remember_device
    }

    /// Runs the whole login and returns the assertion found on `login.url`.
    pub async fn authenticate(&self, login: &LoginDetails) -> Result<SamlAssertion> {
        self.client.bind_username(login.username.as_str())?;

        let app_url = Url::parse(login.url.as_str())?;
        let base_url = base_url(&app_url)?;
        let authenticator = self.authenticator();

        if !self.flags.disable_sessions
            && self.has_active_session(&base_url, login.username.as_str()).await
        {
            info!("reusing the existing okta session");
            return self
                .fetch_assertion(&authenticator, &base_url, &app_url, None, login)
                .await;
        }

        let primed = match self.flags.trust_device() {
            true => Some(prime_device_token(&self.client, &base_url, login.username.as_str())),
            false => None,
        };

        let session_token = authenticator
            .run(
                &base_url,
                login.username.as_str(),
                login.password.as_str(),
                login.mfa_token.as_deref(),
            )
            .await?;

        if let Some(primed) = primed {
            confirm_device_token(
                &self.client,
                &base_url,
                login.username.as_str(),
                primed.as_str(),
            );
        }

        self.fetch_assertion(&authenticator, &base_url, &app_url, Some(session_token), login)
            .await
    }

    fn authenticator(&self) -> AuthenticatorClient<'_> {
        AuthenticatorClient::new(
            &self.client,
            self.prompter.as_ref(),
            &self.verify_settings,
            &self.cancellation,
        )
        .with_signer(self.signer.as_deref())
        .remember_device(self.flags.trust_device())
    }

    /// Checks whether the cookie jar already holds an active session for `username`.
    ///
    /// A jar holding nothing but the device token has no session to offer, and
    /// any failure here just means logging in again.
    ///
    /// <https://developer.okta.com/docs/reference/api/sessions/#get-current-session>
    async fn has_active_session(&self, base_url: &Url, username: &str) -> bool {
        let mut url = base_url.clone();
        url.set_path(SESSION_PATH);

        let has_session_cookie = self
            .client
            .cookies(&url)
            .iter()
            .any(|(name, _)| name != DEVICE_TOKEN_COOKIE);
        if !has_session_cookie {
            return false;
        }

        let response = match self.client.get(url.as_str(), None, AcceptType::Json).await {
            Ok(response) => response,
            Err(e) => {
                debug!("could not check for an okta session: {}", e);
                return false;
            }
        };
        if !response.status.is_success() {
            debug!("no okta session to reuse ({})", response.status);
            return false;
        }

        let session: SessionResponse = match serde_json::from_str(response.body.as_str()) {
            Ok(session) => session,
            Err(_) => return false,
        };

        let active = session.status.as_deref() == Some("ACTIVE");
        let same_user = session
            .login
            .map(|login| login.eq_ignore_ascii_case(username))
            .unwrap_or(false);

        active && same_user
    }

    /// Opens the application embed link and pulls the assertion out of it.
    ///
    /// An application that requires extra verification sends a sign-in page
    /// instead; that transaction is completed once before giving up.
    async fn fetch_assertion(
        &self,
        authenticator: &AuthenticatorClient<'_>,
        base_url: &Url,
        app_url: &Url,
        session_token: Option<String>,
        login: &LoginDetails,
    ) -> Result<SamlAssertion> {
        let params = session_token.map(|token| HashMap::from([(String::from("sessionToken"), token)]));
        let page = self
            .client
            .get(app_url.as_str(), params, AcceptType::Html)
            .await?;

        let state_token = match parse_embed_page(page.body.as_str())? {
            EmbedPage::Assertion(raw) => return Ok(SamlAssertion::new(raw)),
            EmbedPage::StepUp(state_token) => state_token,
        };

        info!("application requires extra verification");
        authenticator
            .resume(base_url, state_token.as_str(), login.mfa_token.as_deref())
            .await?;

        let mut url = base_url.clone();
        url.set_path(STEP_UP_PATH);
        let params = HashMap::from([(String::from("stateToken"), state_token)]);
        let page = self
            .client
            .get(url.as_str(), Some(params), AcceptType::Html)
            .await?;

        saml_response(page.body.as_str()).map(SamlAssertion::new)
    }
}

fn base_url(app_url: &Url) -> Result<Url> {
    let host = app_url
        .host_str()
        .ok_or_else(|| anyhow!("couldn't get host from url"))?;

    let mut url = app_url.clone();
    url.set_path("/");
    url.set_query(None);
    url.set_fragment(None);
    debug!("okta host is {}", host);

    Ok(url)
}
