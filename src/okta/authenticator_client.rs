use crate::error::{Error, Result};
use crate::http::api_client::{ApiClient, ApiResponse};
use crate::okta::api_responses::{FactorResult, OktaError, Response, TransactionState};
use crate::okta::factors::{factor_at, MfaFactor, Verification};
use crate::okta::prompter::MfaPrompter;
use crate::okta::state_machine::{FactorPoller, PollState};
use crate::okta::webauthn::WebauthnSigner;
use anyhow::anyhow;
use log::{debug, info, warn};
use reqwest::StatusCode;
use serde_json::{Map, Value};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const AUTHN_PATH: &str = "/api/v1/authn";

/// Knobs for factor verification that are not part of the account configuration.
#[derive(Debug, Clone)]
pub struct VerifySettings {
    pub poll_interval: Duration,
    pub poll_timeout: Duration,
    /// Upper bound for one status check; the poll deadline always wins.
    pub poll_request_timeout: Duration,
    pub max_passcode_attempts: u32,
    pub poll_network_retries: u32,
}

impl Default for VerifySettings {
    fn default() -> Self {
        VerifySettings {
            poll_interval: Duration::from_secs(2),
            poll_timeout: Duration::from_secs(120),
            poll_request_timeout: Duration::from_secs(10),
            max_passcode_attempts: 3,
            poll_network_retries: 3,
        }
    }
}

/// How the primary authentication request ended.
#[derive(Debug)]
pub enum LoginOutcome {
    Success { session_token: String },
    MfaRequired(Response),
}

enum VerifyReply {
    Accepted(Response),
    WrongCode,
}

/// Goes through the Okta Authentication state machine to finally generate a session token.
///
/// See <https://developer.okta.com/docs/reference/api/authn/#transaction-state> for more details
/// on how Okta handles the authentication process.
pub struct AuthenticatorClient<'a> {
    client: &'a ApiClient,
    prompter: &'a dyn MfaPrompter,
    signer: Option<&'a dyn WebauthnSigner>,
    settings: &'a VerifySettings,
    cancellation: &'a CancellationToken,
    remember_device: bool,
}

impl<'a> AuthenticatorClient<'a> {
    pub fn new(
        client: &'a ApiClient,
        prompter: &'a dyn MfaPrompter,
        settings: &'a VerifySettings,
        cancellation: &'a CancellationToken,
    ) -> AuthenticatorClient<'a> {
        AuthenticatorClient {
            client,
            prompter,
            signer: None,
            settings,
            cancellation,
            remember_device: false,
        }
    }

    pub fn with_signer(mut self, signer: Option<&'a dyn WebauthnSigner>) -> Self {
        self.signer = signer;
        self
    }

    /// Asks Okta to remember this device on every factor verification.
    pub fn remember_device(mut self, remember_device: bool) -> Self {
        self.remember_device = remember_device;
        self
    }

    /// Runs the authentication process for a username/password and returns a session token.
    pub async fn run(
        &self,
        base_url: &Url,
        username: &str,
        password: &str,
        mfa_token: Option<&str>,
    ) -> Result<String> {
        let json = serde_json::json!({
            "username": username,
            "password": password,
            "options": {
                "multiOptionalFactorEnroll": false,
                "warnBeforePasswordExpired": false,
            },
        });

        let response = self.try_authorize(base_url, &json).await?;
        self.complete(response, mfa_token).await
    }

    /// Continues a transaction Okta started elsewhere (e.g. an app's extra verification page).
    pub async fn resume(
        &self,
        base_url: &Url,
        state_token: &str,
        mfa_token: Option<&str>,
    ) -> Result<String> {
        let json = serde_json::json!({ "stateToken": state_token });

        let response = self.try_authorize(base_url, &json).await?;
        self.complete(response, mfa_token).await
    }

    async fn complete(&self, response: Response, mfa_token: Option<&str>) -> Result<String> {
        match classify(response)? {
            LoginOutcome::Success { session_token } => Ok(session_token),
            LoginOutcome::MfaRequired(response) => {
                let response = self.mfa_required(&response, mfa_token).await?;

                response
                    .session_token()
                    .ok_or_else(|| anyhow!("could not get session token").into())
            }
        }
    }

    /// Try to authenticate against Okta
    ///
    /// <https://developer.okta.com/docs/reference/api/authn/#primary-authentication>
    async fn try_authorize(&self, base_url: &Url, json: &Value) -> Result<Response> {
        let mut url = base_url.clone();
        url.set_path(AUTHN_PATH);
        url.set_query(None);

        let reply = self.client.post_json(url.as_str(), json).await?;
        if reply.status == StatusCode::UNAUTHORIZED {
            return Err(Error::InvalidCredentials);
        }

        parse_response(reply)
    }

    /// An MFA challenge is required.
    ///
    /// The user chooses one of the enrolled factors and we verify it, returning the
    /// final `SUCCESS` response.
    ///
    /// <https://developer.okta.com/docs/reference/api/authn/#verify-factor>
    async fn mfa_required(&self, response: &Response, mfa_token: Option<&str>) -> Result<Response> {
        let state_token = response.state_token().ok_or(Error::StateTokenNotFound)?;

        let factors = response.factors();
        if factors.is_empty() {
            return Err(anyhow!("could not get factors").into());
        }

        let index = match factors.len() {
            1 => 0,
            _ => self.prompter.choose_factor(&factors)?,
        };
        let factor = factor_at(&factors, index)?;

        info!("verifying MFA factor {}", factor);

        let url = self.verify_url(factor)?;
        match factor.verification() {
            Verification::Passcode => {
                self.submit_codes(factor, url, state_token, "passCode", mfa_token)
                    .await
            }
            Verification::Answer => {
                self.submit_codes(factor, url, state_token, "answer", mfa_token)
                    .await
            }
            Verification::ChallengeThenPasscode => {
                self.challenge_then_passcode(factor, url, state_token, mfa_token)
                    .await
            }
            Verification::Push => self.mfa_push(factor, url, state_token).await,
            Verification::WebAuthn => self.mfa_webauthn(factor, url, state_token).await,
            Verification::Unsupported => Err(Error::UnsupportedFactor(factor.identifier())),
        }
    }

    /// Posts codes until one is accepted or the attempt budget is spent.
    async fn submit_codes(
        &self,
        factor: &MfaFactor,
        url: String,
        state_token: String,
        field: &str,
        mfa_token: Option<&str>,
    ) -> Result<Response> {
        let max_attempts = self.settings.max_passcode_attempts.max(1);

        for attempt in 1..=max_attempts {
            let code = match (attempt, mfa_token) {
                (1, Some(token)) => token.to_string(),
                _ => self.prompter.passcode(factor, attempt)?,
            };

            let mut json = Map::new();
            json.insert(String::from("stateToken"), Value::from(state_token.clone()));
            json.insert(field.to_string(), Value::from(code));

            match self.post_factor(url.as_str(), &Value::Object(json)).await? {
                VerifyReply::Accepted(response) => return expect_success(response),
                VerifyReply::WrongCode => {
                    warn!(
                        "{} rejected the code (attempt {}/{})",
                        factor.identifier(),
                        attempt,
                        max_attempts
                    );
                }
            }
        }

        Err(Error::FactorRejected(factor.identifier()))
    }

    /// SMS, voice call and email: the first request makes Okta send a code.
    async fn challenge_then_passcode(
        &self,
        factor: &MfaFactor,
        url: String,
        state_token: String,
        mfa_token: Option<&str>,
    ) -> Result<Response> {
        let json = serde_json::json!({ "stateToken": state_token });
        let response = parse_response(self.client.post_json(url.as_str(), &json).await?)?;

        match response.status() {
            Some(TransactionState::MfaChallenge) => {}
            Some(TransactionState::Success) => return Ok(response),
            Some(status) => return Err(Error::UnexpectedProviderStatus(status.as_str().to_string())),
            None => return Err(Error::UnexpectedProviderStatus(String::new())),
        }

        debug!("{} sent a code", factor.identifier());

        let state_token = response.state_token().unwrap_or(state_token);
        let next = match response.next() {
            Some(next) => self.with_remember_device(next)?,
            None => url,
        };

        self.submit_codes(factor, next, state_token, "passCode", mfa_token)
            .await
    }

    /// Push: polls until the user approves or rejects on their device.
    ///
    /// <https://developer.okta.com/docs/reference/api/authn/#response-example-waiting-for-3-number-verification-challenge-response>
    async fn mfa_push(&self, factor: &MfaFactor, url: String, state_token: String) -> Result<Response> {
        let json = serde_json::json!({ "stateToken": state_token });
        let mut response = parse_response(self.client.post_json(url.as_str(), &json).await?)?;
        let mut poller = FactorPoller::new(self.settings.poll_interval, self.settings.poll_timeout);
        let mut announced = false;

        loop {
            match poller.observe(&response)? {
                PollState::Approved => return expect_success(response),
                PollState::Rejected => return Err(Error::FactorRejected(factor.identifier())),
                PollState::TimedOut => return Err(Error::FactorTimeout(factor.identifier())),
                PollState::Challenged | PollState::Waiting => {}
            }

            if !announced {
                match response.correct_answer() {
                    Some(answer) => info!("waiting for push approval, select {} on your device", answer),
                    None => info!("waiting for push approval"),
                }
                announced = true;
            }

            // Okta may rotate the state token on every poll.
            let state_token = response.state_token().ok_or(Error::StateTokenNotFound)?;
            let next = response
                .next()
                .ok_or_else(|| anyhow!("could not get next page"))?;

            tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(poller.next_delay()) => {}
            }

            if poller.expire_if_due() == PollState::TimedOut {
                return Err(Error::FactorTimeout(factor.identifier()));
            }

            let json = serde_json::json!({ "stateToken": state_token });
            let request_timeout = self.settings.poll_request_timeout.min(poller.remaining());
            let reply = tokio::select! {
                biased;
                _ = self.cancellation.cancelled() => return Err(Error::Cancelled),
                _ = tokio::time::sleep(poller.remaining()) => {
                    return Err(Error::FactorTimeout(factor.identifier()))
                }
                reply = self.client.poll_json(
                    next.as_str(),
                    &json,
                    self.settings.poll_network_retries,
                    request_timeout,
                ) => reply,
            };

            let reply = match reply {
                Err(Error::Http(e)) if e.is_timeout() => match poller.expire_if_due() {
                    PollState::TimedOut => return Err(Error::FactorTimeout(factor.identifier())),
                    _ => return Err(Error::Http(e)),
                },
                reply => reply?,
            };

            response = parse_response(reply)?;
            debug!("poll {} for {}", poller.ticks(), factor.identifier());
        }
    }

    /// Attempt a WebAuthn challenge
    ///
    /// The first request returns the challenge, which the signer answers; the
    /// signature is then posted to the transaction's next link.
    async fn mfa_webauthn(
        &self,
        factor: &MfaFactor,
        url: String,
        state_token: String,
    ) -> Result<Response> {
        let signer = self
            .signer
            .ok_or_else(|| Error::UnsupportedFactor(factor.identifier()))?;

        let json = serde_json::json!({ "stateToken": state_token });
        let response = parse_response(self.client.post_json(url.as_str(), &json).await?)?;
        if response.status() == Some(TransactionState::Success) {
            return Ok(response);
        }

        let challenge = response
            .challenge()
            .ok_or_else(|| anyhow!("could not get challenge"))?;
        let credential_ids: Vec<String> = response
            .factor()
            .and_then(|challenged| challenged.credential_id())
            .or_else(|| factor.credential_id())
            .into_iter()
            .collect();

        let origin = Url::parse(url.as_str())?;
        let host = origin
            .host_str()
            .ok_or_else(|| anyhow!("couldn't get host from url"))?;

        let signature = signer.sign(challenge.as_str(), host, &credential_ids)?;
        let json = serde_json::json!({
            "stateToken": response.state_token().unwrap_or(state_token),
            "clientData": signature.client_data,
            "signatureData": signature.signature_data,
            "authenticatorData": signature.authenticator_data,
        });

        let next = match response.next() {
            Some(next) => self.with_remember_device(next)?,
            None => url,
        };

        match self.post_factor(next.as_str(), &json).await? {
            VerifyReply::Accepted(response) => expect_success(response),
            VerifyReply::WrongCode => Err(Error::FactorRejected(factor.identifier())),
        }
    }

    async fn post_factor(&self, url: &str, json: &Value) -> Result<VerifyReply> {
        let reply = self.client.post_json(url, json).await?;

        // invalid passcodes come back as 403 with an error body
        if reply.status == StatusCode::FORBIDDEN {
            if let Ok(error) = serde_json::from_str::<OktaError>(reply.body.as_str()) {
                debug!("factor verification refused: {}", error.code());
            }
            return Ok(VerifyReply::WrongCode);
        }

        let response = parse_response(reply)?;
        match response.factor_result() {
            Some(FactorResult::Rejected) => Ok(VerifyReply::WrongCode),
            _ => Ok(VerifyReply::Accepted(response)),
        }
    }

    fn verify_url(&self, factor: &MfaFactor) -> Result<String> {
        let url = factor
            .verify_url()
            .ok_or_else(|| anyhow!("could not get verification url"))?;

        self.with_remember_device(url)
    }

    fn with_remember_device(&self, url: String) -> Result<String> {
        if !self.remember_device {
            return Ok(url);
        }

        let mut url = Url::parse(url.as_str())?;
        let already_set = url.query_pairs().any(|(key, _)| key == "rememberDevice");
        if !already_set {
            url.query_pairs_mut().append_pair("rememberDevice", "true");
        }

        Ok(url.to_string())
    }
}

/// Sorts a primary authentication response into what happens next.
pub fn classify(response: Response) -> Result<LoginOutcome> {
    let status = response
        .status()
        .ok_or_else(|| Error::UnexpectedProviderStatus(String::new()))?;

    match status {
        TransactionState::Success => {
            let session_token = response
                .session_token()
                .ok_or_else(|| anyhow!("could not get session token"))?;

            Ok(LoginOutcome::Success { session_token })
        }
        TransactionState::MfaRequired => Ok(LoginOutcome::MfaRequired(response)),
        TransactionState::MfaEnroll => Err(Error::MfaEnrollmentRequired),
        TransactionState::LockedOut => Err(Error::LockedOut),
        TransactionState::PasswordExpired => Err(Error::PasswordExpired),
        other => Err(Error::UnexpectedProviderStatus(other.as_str().to_string())),
    }
}

fn expect_success(response: Response) -> Result<Response> {
    match response.status() {
        Some(TransactionState::Success) => Ok(response),
        Some(status) => Err(Error::UnexpectedProviderStatus(status.as_str().to_string())),
        None => Err(Error::UnexpectedProviderStatus(String::new())),
    }
}

fn parse_response(reply: ApiResponse) -> Result<Response> {
    if reply.status.is_success() {
        return Ok(serde_json::from_str(reply.body.as_str())?);
    }

    match serde_json::from_str::<OktaError>(reply.body.as_str()) {
        Ok(error) => Err(error.into_error()),
        Err(_) => Err(anyhow!("unexpected HTTP status {}", reply.status).into()),
    }
}
