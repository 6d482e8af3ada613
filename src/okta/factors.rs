use crate::error::{Error, Result};
use crate::okta::api_responses::{Challenge, Links, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// A factor exactly as Okta lists it. Only `factorType` and `provider` can be
/// relied on; the profile shape depends on both.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FactorRecord {
    id: Option<String>,
    #[serde(default)]
    factor_type: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    profile: Option<Value>,
    #[serde(rename = "_links")]
    links: Option<HashMap<String, Links>>,
    #[serde(rename = "_embedded")]
    embedded: Option<FactorEmbedded>,
}

#[derive(Deserialize, Debug, Clone, PartialEq)]
struct FactorEmbedded {
    challenge: Option<Challenge>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FactorProvider {
    Okta,
    Google,
    Fido,
    Duo,
    Rsa,
    Symantec,
    Yubico,
    Other(String),
}

impl From<&str> for FactorProvider {
    fn from(provider: &str) -> Self {
        match provider {
            "OKTA" => FactorProvider::Okta,
            "GOOGLE" => FactorProvider::Google,
            "FIDO" => FactorProvider::Fido,
            "DUO" => FactorProvider::Duo,
            "RSA" => FactorProvider::Rsa,
            "SYMANTEC" => FactorProvider::Symantec,
            "YUBICO" => FactorProvider::Yubico,
            _ => FactorProvider::Other(provider.to_string()),
        }
    }
}

impl FactorProvider {
    pub fn as_str(&self) -> &str {
        match self {
            FactorProvider::Okta => "OKTA",
            FactorProvider::Google => "GOOGLE",
            FactorProvider::Fido => "FIDO",
            FactorProvider::Duo => "DUO",
            FactorProvider::Rsa => "RSA",
            FactorProvider::Symantec => "SYMANTEC",
            FactorProvider::Yubico => "YUBICO",
            FactorProvider::Other(provider) => provider.as_str(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenProfile {
    pub credential_id: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PushProfile {
    pub name: Option<String>,
    pub platform: Option<String>,
    pub device_type: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PhoneProfile {
    pub phone_number: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmailProfile {
    pub email: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionProfile {
    pub question: Option<String>,
    pub question_text: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WebAuthnProfile {
    pub credential_id: Option<String>,
    pub authenticator_name: Option<String>,
}

/// The factor method, each with the profile fields that method carries.
#[derive(Debug, Clone, PartialEq)]
pub enum FactorKind {
    Totp(TokenProfile),
    HardwareToken(TokenProfile),
    Token(TokenProfile),
    Push(PushProfile),
    Sms(PhoneProfile),
    Call(PhoneProfile),
    Email(EmailProfile),
    Question(QuestionProfile),
    WebAuthn(WebAuthnProfile),
    Web,
    Unknown { factor_type: String },
}

/// How a factor gets verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verification {
    /// One request carrying a code the user already has.
    Passcode,
    /// A first request makes Okta send a code, a second one submits it.
    ChallengeThenPasscode,
    /// One request carrying the answer to a security question.
    Answer,
    /// Approved out of band, the client polls.
    Push,
    /// A challenge signed by an authenticator.
    WebAuthn,
    Unsupported,
}

/// One enrolled factor, addressed by its position in Okta's list.
#[derive(Debug, Clone, PartialEq)]
pub struct MfaFactor {
    index: usize,
    id: Option<String>,
    provider: FactorProvider,
    kind: FactorKind,
    links: HashMap<String, Links>,
    challenge: Option<Challenge>,
}

impl MfaFactor {
    pub fn from_record(index: usize, record: FactorRecord) -> MfaFactor {
        let kind = match record.factor_type.as_str() {
            "token:software:totp" => FactorKind::Totp(profile(&record.profile)),
            "token:hardware" => FactorKind::HardwareToken(profile(&record.profile)),
            "token" => FactorKind::Token(profile(&record.profile)),
            "push" => FactorKind::Push(profile(&record.profile)),
            "sms" => FactorKind::Sms(profile(&record.profile)),
            "call" => FactorKind::Call(profile(&record.profile)),
            "email" => FactorKind::Email(profile(&record.profile)),
            "question" => FactorKind::Question(profile(&record.profile)),
            "webauthn" => FactorKind::WebAuthn(profile(&record.profile)),
            "web" => FactorKind::Web,
            _ => FactorKind::Unknown {
                factor_type: record.factor_type.clone(),
            },
        };

        MfaFactor {
            index,
            id: record.id,
            provider: FactorProvider::from(record.provider.as_str()),
            kind,
            links: record.links.unwrap_or_default(),
            challenge: record.embedded.and_then(|embedded| embedded.challenge),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn id(&self) -> Option<String> {
        self.id.clone()
    }

    pub fn provider(&self) -> &FactorProvider {
        &self.provider
    }

    pub fn kind(&self) -> &FactorKind {
        &self.kind
    }

    pub fn factor_type(&self) -> &str {
        match &self.kind {
            FactorKind::Totp(_) => "token:software:totp",
            FactorKind::HardwareToken(_) => "token:hardware",
            FactorKind::Token(_) => "token",
            FactorKind::Push(_) => "push",
            FactorKind::Sms(_) => "sms",
            FactorKind::Call(_) => "call",
            FactorKind::Email(_) => "email",
            FactorKind::Question(_) => "question",
            FactorKind::WebAuthn(_) => "webauthn",
            FactorKind::Web => "web",
            FactorKind::Unknown { factor_type } => factor_type.as_str(),
        }
    }

    /// `"<PROVIDER> <FACTOR TYPE>"`, e.g. `GOOGLE TOKEN:SOFTWARE:TOTP`.
    ///
    /// Several factors can share an identifier; only the index tells them apart.
    pub fn identifier(&self) -> String {
        format!("{} {}", self.provider.as_str(), self.factor_type()).to_uppercase()
    }

    /// The WebAuthn authenticator name, empty for every other factor.
    ///
    /// Push device names stay available through [`FactorKind::Push`].
    pub fn display_name(&self) -> String {
        match &self.kind {
            FactorKind::WebAuthn(profile) => profile.authenticator_name.clone().unwrap_or_default(),
            _ => String::new(),
        }
    }

    pub fn verification(&self) -> Verification {
        match &self.kind {
            FactorKind::Totp(_) | FactorKind::HardwareToken(_) | FactorKind::Token(_) => {
                Verification::Passcode
            }
            FactorKind::Sms(_) | FactorKind::Call(_) | FactorKind::Email(_) => {
                Verification::ChallengeThenPasscode
            }
            FactorKind::Question(_) => Verification::Answer,
            FactorKind::Push(_) => Verification::Push,
            FactorKind::WebAuthn(_) => Verification::WebAuthn,
            FactorKind::Web | FactorKind::Unknown { .. } => Verification::Unsupported,
        }
    }

    /// Tries to get the verification URL for a factor.
    pub fn verify_url(&self) -> Option<String> {
        self.links.get("verify")?.link()
    }

    /// Tries to get the credential ID for a factor.
    pub fn credential_id(&self) -> Option<String> {
        match &self.kind {
            FactorKind::WebAuthn(profile) => profile.credential_id.clone(),
            FactorKind::Totp(profile)
            | FactorKind::HardwareToken(profile)
            | FactorKind::Token(profile) => profile.credential_id.clone(),
            _ => None,
        }
    }

    pub fn challenge(&self) -> Option<String> {
        self.challenge.as_ref()?.challenge.clone()
    }

    pub fn correct_answer(&self) -> Option<u32> {
        self.challenge.as_ref()?.correct_answer
    }
}

impl fmt::Display for MfaFactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let display_name = self.display_name();
        match display_name.is_empty() {
            true => write!(f, "{}", self.identifier()),
            false => write!(f, "{} ({})", self.identifier(), display_name),
        }
    }
}

// A profile that does not fit its method is treated as empty rather than fatal.
fn profile<T: DeserializeOwned + Default>(value: &Option<Value>) -> T {
    value
        .clone()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

/// Returns the factor at `index` of an authentication response's factor list.
pub fn factor_at(factors: &[MfaFactor], index: usize) -> Result<&MfaFactor> {
    factors.get(index).ok_or(Error::FactorIndexOutOfRange {
        index,
        available: factors.len(),
    })
}

/// Answers "what is at position `index`" for a raw authentication response body,
/// as `(identifier, display name)`.
pub fn parse_mfa_identifier(body: &str, index: usize) -> Result<(String, String)> {
    let response: Response = serde_json::from_str(body)?;
    let factors = response.factors();
    let factor = factor_at(&factors, index)?;

    Ok((factor.identifier(), factor.display_name()))
}
