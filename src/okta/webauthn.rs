use anyhow::Result;

/// The three fields Okta expects back for a signed WebAuthn challenge.
pub struct SignatureResponse {
    pub client_data: String,
    pub signature_data: String,
    pub authenticator_data: String,
}

/// Talks to a security key or platform authenticator.
///
/// Implemented outside this crate; the engine only hands over the challenge,
/// the relying party host and the allowed credential ids.
pub trait WebauthnSigner: Send + Sync {
    fn sign(
        &self,
        challenge: &str,
        host: &str,
        credential_ids: &[String],
    ) -> Result<SignatureResponse>;
}
