pub mod api_responses;
pub mod authenticator_client;
pub mod device_token;
pub mod factors;
pub mod okta_client;
pub mod prompter;
pub mod saml_parsers;
pub mod state_machine;
pub mod state_token;
pub mod webauthn;
