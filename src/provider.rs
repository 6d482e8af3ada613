use crate::error::Result;
use crate::okta::okta_client::OktaClient;
use crate::okta::prompter::MfaPrompter;
use crate::settings::IdpAccount;
use anyhow::anyhow;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// What the user typed in, plus the application embed link to log into.
#[derive(Debug, Clone)]
pub struct LoginDetails {
    pub username: String,
    pub password: String,
    pub url: String,
    pub mfa_token: Option<String>,
}

/// The base64 `SAMLResponse` value, exactly as the identity provider sent it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamlAssertion {
    raw: String,
}

impl SamlAssertion {
    pub fn new(raw: String) -> SamlAssertion {
        SamlAssertion { raw }
    }

    pub fn raw(&self) -> &str {
        self.raw.as_str()
    }

    /// The assertion XML.
    pub fn decode(&self) -> Result<String> {
        let bytes = STANDARD
            .decode(self.raw.as_str())
            .map_err(|e| anyhow!("could not decode SAMLResponse: {}", e))?;
        let xml = String::from_utf8(bytes).map_err(|e| anyhow!("SAMLResponse is not UTF-8: {}", e))?;

        Ok(xml)
    }
}

/// Logs a user in and hands back a SAML assertion.
#[async_trait]
pub trait Provider {
    async fn authenticate(&self, login: &LoginDetails) -> Result<SamlAssertion>;
}

#[async_trait]
impl Provider for OktaClient {
    async fn authenticate(&self, login: &LoginDetails) -> Result<SamlAssertion> {
        OktaClient::authenticate(self, login).await
    }
}

/// The identity providers this crate can log into.
pub enum IdentityProvider {
    Okta(OktaClient),
}

impl IdentityProvider {
    /// Builds the provider named in `account`.
    pub fn new(account: &IdpAccount, prompter: Box<dyn MfaPrompter>) -> Result<IdentityProvider> {
        match account.provider().as_str() {
            "Okta" => Ok(IdentityProvider::Okta(OktaClient::new(account, prompter)?)),
            other => Err(anyhow!("unsupported identity provider {}", other).into()),
        }
    }
}

#[async_trait]
impl Provider for IdentityProvider {
    async fn authenticate(&self, login: &LoginDetails) -> Result<SamlAssertion> {
        match self {
            IdentityProvider::Okta(client) => client.authenticate(login).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::okta::prompter::FixedPrompter;

    fn account(provider: &str) -> IdpAccount {
        IdpAccount::from_toml(&format!(
            "url = \"https://idp.example.com/home/amazon_aws/0oa1/272\"\nusername = \"user@example.com\"\nprovider = \"{}\"\n",
            provider
        ))
        .unwrap()
    }

    #[test]
    fn test_decode() {
        let assertion = SamlAssertion::new(String::from("PHNhbWxwOlJlc3BvbnNlLz4="));
        assert_eq!(assertion.decode().unwrap(), "<samlp:Response/>");
    }

    #[test]
    fn test_decode_invalid() {
        let assertion = SamlAssertion::new(String::from("not base64!"));
        assert!(assertion.decode().is_err());
    }

    #[test]
    fn test_identity_provider() {
        let provider = IdentityProvider::new(&account("Okta"), Box::new(FixedPrompter::new(0)));
        assert!(matches!(provider, Ok(IdentityProvider::Okta(_))));

        let provider = IdentityProvider::new(&account("ADFS"), Box::new(FixedPrompter::new(0)));
        assert!(provider.is_err());
    }
}
