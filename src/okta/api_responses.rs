use crate::error::Error;
use crate::okta::factors::{FactorRecord, MfaFactor};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct OktaError {
    error_code: String,
    error_summary: String,
}

impl OktaError {
    pub fn code(&self) -> &str {
        self.error_code.as_str()
    }

    pub fn into_error(self) -> Error {
        Error::Api {
            code: self.error_code,
            summary: self.error_summary,
        }
    }
}

/// <https://developer.okta.com/docs/reference/api/authn/#transaction-state>
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "String")]
pub enum TransactionState {
    MfaRequired,
    MfaChallenge,
    MfaEnroll,
    LockedOut,
    PasswordExpired,
    Success,
    Other(String),
}

impl From<String> for TransactionState {
    fn from(status: String) -> Self {
        match status.as_str() {
            "MFA_REQUIRED" => TransactionState::MfaRequired,
            "MFA_CHALLENGE" => TransactionState::MfaChallenge,
            "MFA_ENROLL" => TransactionState::MfaEnroll,
            "LOCKED_OUT" => TransactionState::LockedOut,
            "PASSWORD_EXPIRED" => TransactionState::PasswordExpired,
            "SUCCESS" => TransactionState::Success,
            _ => TransactionState::Other(status),
        }
    }
}

impl TransactionState {
    pub fn as_str(&self) -> &str {
        match self {
            TransactionState::MfaRequired => "MFA_REQUIRED",
            TransactionState::MfaChallenge => "MFA_CHALLENGE",
            TransactionState::MfaEnroll => "MFA_ENROLL",
            TransactionState::LockedOut => "LOCKED_OUT",
            TransactionState::PasswordExpired => "PASSWORD_EXPIRED",
            TransactionState::Success => "SUCCESS",
            TransactionState::Other(status) => status.as_str(),
        }
    }
}

/// <https://developer.okta.com/docs/reference/api/authn/#factor-result>
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "String")]
pub enum FactorResult {
    Challenge,
    Waiting,
    Rejected,
    Timeout,
    Success,
    Other(String),
}

impl From<String> for FactorResult {
    fn from(result: String) -> Self {
        match result.as_str() {
            "CHALLENGE" => FactorResult::Challenge,
            "WAITING" => FactorResult::Waiting,
            "REJECTED" => FactorResult::Rejected,
            "TIMEOUT" => FactorResult::Timeout,
            "SUCCESS" => FactorResult::Success,
            _ => FactorResult::Other(result),
        }
    }
}

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Response {
    state_token: Option<String>,
    session_token: Option<String>,
    status: Option<TransactionState>,
    factor_result: Option<FactorResult>,
    #[serde(rename = "_embedded")]
    embedded: Option<Embedded>,
    #[serde(rename = "_links")]
    links: Option<HashMap<String, Links>>,
}

impl Response {
    /// Tries to return the [`TransactionState`] of a response.
    pub fn status(&self) -> Option<TransactionState> {
        self.status.clone()
    }

    pub fn factor_result(&self) -> Option<FactorResult> {
        self.factor_result.clone()
    }

    /// Tries to return the state token to keep track of the transaction.
    pub fn state_token(&self) -> Option<String> {
        self.state_token.clone()
    }

    /// Tries to return the session token to run authorized API requests.
    ///
    /// This will only be filled if we successfully authorized the user.
    pub fn session_token(&self) -> Option<String> {
        self.session_token.clone()
    }

    /// The enrolled MFA factors, in the order Okta listed them.
    pub fn factors(&self) -> Vec<MfaFactor> {
        self.embedded
            .as_ref()
            .and_then(|embedded| embedded.factors.clone())
            .unwrap_or_default()
            .into_iter()
            .enumerate()
            .map(|(index, record)| MfaFactor::from_record(index, record))
            .collect()
    }

    /// The factor currently being challenged, as echoed back by a verify call.
    pub fn factor(&self) -> Option<MfaFactor> {
        let record = self.embedded.as_ref()?.factor.clone()?;
        Some(MfaFactor::from_record(0, record))
    }

    /// Tries to return the next page in the transaction.
    pub fn next(&self) -> Option<String> {
        self.links.as_ref()?.get("next")?.link()
    }

    /// Tries to return the WebAuthn challenge, wherever this response carries it.
    pub fn challenge(&self) -> Option<String> {
        let embedded = self.embedded.as_ref()?;

        embedded
            .challenge
            .as_ref()
            .and_then(|challenge| challenge.challenge.clone())
            .or_else(|| self.factor()?.challenge())
    }

    /// The number to pick on the phone when a push uses number matching.
    pub fn correct_answer(&self) -> Option<u32> {
        self.factor()?.correct_answer()
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub challenge: Option<String>,
    pub correct_answer: Option<u32>,
    pub user_verification: Option<String>,
    pub extensions: Option<Value>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
struct Embedded {
    #[serde(default)]
    factors: Option<Vec<FactorRecord>>,

    #[serde(default)]
    factor: Option<FactorRecord>,

    #[serde(default)]
    challenge: Option<Challenge>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(untagged)]
pub enum Links {
    Single(Link),
    Multi(Vec<Link>),
}

impl Links {
    /// Tries to return a valid link.
    pub fn link(&self) -> Option<String> {
        match self {
            Links::Single(l) => Some(l.href.clone()),
            Links::Multi(list) => {
                let link = list.first()?;
                Some(link.href.clone())
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[allow(dead_code)]
#[serde(rename_all = "camelCase")]
pub struct Link {
    name: Option<String>,
    href: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_keeps_unknown_values() {
        let response: Response =
            serde_json::from_str(r#"{"status":"RECOVERY_CHALLENGE"}"#).unwrap();

        assert_eq!(
            response.status(),
            Some(TransactionState::Other(String::from("RECOVERY_CHALLENGE")))
        );
        assert_eq!(response.status().unwrap().as_str(), "RECOVERY_CHALLENGE");
    }

    #[test]
    fn test_mfa_challenge_waiting() {
        let response: Response = serde_json::from_str(
            r#"{
                "stateToken": "TheStateToken",
                "status": "MFA_CHALLENGE",
                "factorResult": "WAITING",
                "_links": {
                    "next": {
                        "name": "poll",
                        "href": "https://idp.example.com/api/v1/authn/factors/opf1/verify"
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(response.status(), Some(TransactionState::MfaChallenge));
        assert_eq!(response.factor_result(), Some(FactorResult::Waiting));
        assert_eq!(response.state_token(), Some(String::from("TheStateToken")));
        assert_eq!(
            response.next(),
            Some(String::from(
                "https://idp.example.com/api/v1/authn/factors/opf1/verify"
            ))
        );
        assert!(response.factors().is_empty());
    }

    #[test]
    fn test_success() {
        let response: Response = serde_json::from_str(
            r#"{"status":"SUCCESS","sessionToken":"TheSessionToken","_embedded":{"user":{"id":"00u1"}}}"#,
        )
        .unwrap();

        assert_eq!(response.status(), Some(TransactionState::Success));
        assert_eq!(
            response.session_token(),
            Some(String::from("TheSessionToken"))
        );
    }

    #[test]
    fn test_webauthn_challenge_in_factor() {
        let response: Response = serde_json::from_str(
            r#"{
                "status": "MFA_CHALLENGE",
                "factorResult": "CHALLENGE",
                "_embedded": {
                    "factor": {
                        "id": "fwf1",
                        "factorType": "webauthn",
                        "provider": "FIDO",
                        "profile": { "credentialId": "TheCredentialId" },
                        "_embedded": { "challenge": { "challenge": "TheChallenge" } }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(response.challenge(), Some(String::from("TheChallenge")));
        assert_eq!(response.correct_answer(), None);
        assert_eq!(
            response.factor().unwrap().credential_id(),
            Some(String::from("TheCredentialId"))
        );
    }

    #[test]
    fn test_push_number_challenge() {
        let response: Response = serde_json::from_str(
            r#"{
                "status": "MFA_CHALLENGE",
                "factorResult": "WAITING",
                "_embedded": {
                    "factor": {
                        "factorType": "push",
                        "provider": "OKTA",
                        "_embedded": { "challenge": { "correctAnswer": 42 } }
                    }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(response.correct_answer(), Some(42));
        assert_eq!(response.challenge(), None);
    }

    #[test]
    fn test_multi_links() {
        let links: Links = serde_json::from_str(
            r#"[{"name":"a","href":"https://one"},{"name":"b","href":"https://two"}]"#,
        )
        .unwrap();

        assert_eq!(links.link(), Some(String::from("https://one")));
    }

    #[test]
    fn test_okta_error() {
        let error: OktaError = serde_json::from_str(
            r#"{"errorCode":"E0000004","errorSummary":"Authentication failed","errorLink":"E0000004","errorId":"oae1","errorCauses":[]}"#,
        )
        .unwrap();

        assert_eq!(error.code(), "E0000004");
        assert_eq!(
            error.into_error().to_string(),
            "okta error code E0000004 - Authentication failed"
        );
    }
}
