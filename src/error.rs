use thiserror::Error as DeriveError;

pub type Result<T> = std::result::Result<T, Error>;

/// Every way a login attempt can end without a SAML assertion.
///
/// All variants are terminal for the current attempt. The caller is expected to
/// match on the kind to decide whether to re-prompt for a password, offer a
/// different factor, or just try again later.
#[derive(DeriveError, Debug)]
pub enum Error {
    #[error("cannot find state token")]
    StateTokenNotFound,

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("okta requires MFA enrollment before login can proceed")]
    MfaEnrollmentRequired,

    #[error("the user account is locked out")]
    LockedOut,

    #[error("the password has expired")]
    PasswordExpired,

    #[error("no MFA factor at index {index} ({available} available)")]
    FactorIndexOutOfRange { index: usize, available: usize },

    #[error("MFA factor {0} was rejected")]
    FactorRejected(String),

    #[error("MFA factor {0} timed out")]
    FactorTimeout(String),

    #[error("MFA factor {0} is not supported")]
    UnsupportedFactor(String),

    #[error("could not find a SAMLResponse in the application page")]
    AssertionNotFound,

    #[error("unexpected okta status: {0}")]
    UnexpectedProviderStatus(String),

    #[error("okta error code {code} - {summary}")]
    Api { code: String, summary: String },

    #[error("session belongs to {bound}, refusing to log in as {requested}")]
    SessionUserMismatch { bound: String, requested: String },

    #[error("login was cancelled")]
    Cancelled,

    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Url(#[from] url::ParseError),

    #[error(transparent)]
    Config(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn test_state_token_message() {
        assert_eq!(
            Error::StateTokenNotFound.to_string(),
            "cannot find state token"
        );
    }

    #[test]
    fn test_api_error_summary() {
        let err = Error::Api {
            code: String::from("E0000047"),
            summary: String::from("API call exceeded rate limit"),
        };

        assert_eq!(
            err.to_string(),
            "okta error code E0000047 - API call exceeded rate limit"
        );
    }

    #[test]
    fn test_other_is_transparent() {
        let err: Error = anyhow!("could not get verification url").into();
        assert_eq!(err.to_string(), "could not get verification url");
    }
}
