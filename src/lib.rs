pub mod error;
mod http;
pub mod okta;
pub mod provider;
pub mod settings;

pub use crate::error::{Error, Result};
pub use crate::okta::okta_client::OktaClient;
pub use crate::provider::{IdentityProvider, LoginDetails, Provider, SamlAssertion};
