use crate::error::Result;
use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use url::Url;

/// One identity provider account as the outer configuration layer hands it over.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct IdpAccount {
    url: String,
    username: String,
    #[serde(default = "default_provider")]
    provider: String,
    #[serde(default)]
    disable_sessions: bool,
    #[serde(default)]
    disable_remember_device: bool,
}

/// The two effective switches the Okta engine runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OktaFlags {
    pub disable_sessions: bool,
    pub remember_device: bool,
}

fn default_provider() -> String {
    String::from("Okta")
}

impl IdpAccount {
    pub fn new(url: String, username: String) -> Result<Self> {
        let mut url = Url::parse(url.as_str())?;

        // remove query
        url.set_query(None);

        // remove trailing slash
        url.path_segments_mut()
            .map_err(|_| anyhow!("cannot be base"))?
            .pop_if_empty();

        Ok(IdpAccount {
            url: String::from(url),
            username,
            provider: default_provider(),
            disable_sessions: false,
            disable_remember_device: false,
        })
    }

    /// Reads a single account table, e.g.
    ///
    /// ```toml
    /// url = "https://example.okta.com/home/amazon_aws/0oa1/272"
    /// username = "user@example.com"
    /// disable_remember_device = true
    /// ```
    pub fn from_toml(contents: &str) -> Result<Self> {
        let account: IdpAccount = toml::from_str(contents)?;
        Url::parse(account.url.as_str())?;

        Ok(account)
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    pub fn username(&self) -> String {
        self.username.clone()
    }

    pub fn provider(&self) -> String {
        self.provider.clone()
    }

    pub fn set_disable_sessions(&mut self, disable_sessions: bool) {
        self.disable_sessions = disable_sessions;
    }

    pub fn set_disable_remember_device(&mut self, disable_remember_device: bool) {
        self.disable_remember_device = disable_remember_device;
    }

    /// The two flags are independent: disabling sessions leaves remember-device alone.
    pub fn flags(&self) -> OktaFlags {
        OktaFlags {
            disable_sessions: self.disable_sessions,
            remember_device: !self.disable_remember_device,
        }
    }
}

impl OktaFlags {
    /// Whether the device trust cookie is primed, requested and recorded.
    pub fn trust_device(&self) -> bool {
        self.remember_device && !self.disable_sessions
    }
}
