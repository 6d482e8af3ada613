use crate::error::{Error, Result};
use crate::okta::state_token::extract_state_token;
use select::document::Document;
use select::predicate::Attr;

/// What an application embed page turned out to be.
#[derive(Debug, PartialEq)]
pub enum EmbedPage {
    /// The base64 `SAMLResponse` form value.
    Assertion(String),
    /// Okta wants another factor first; carries the state token of that transaction.
    StepUp(String),
}

/// Tries to return the `SAMLResponse` hidden input of an HTML page.
pub fn saml_response(body: &str) -> Result<String> {
    let document = Document::from(body);
    let node = document.find(Attr("name", "SAMLResponse")).next();

    node.and_then(|element| element.attr("value"))
        .filter(|value| !value.is_empty())
        .map(String::from)
        .ok_or(Error::AssertionNotFound)
}

/// Sorts an embed page into an assertion or an extra verification request.
pub fn parse_embed_page(body: &str) -> Result<EmbedPage> {
    match saml_response(body) {
        Ok(assertion) => Ok(EmbedPage::Assertion(assertion)),
        Err(Error::AssertionNotFound) => match extract_state_token(body) {
            Ok(state_token) if !state_token.is_empty() => Ok(EmbedPage::StepUp(state_token)),
            _ => Err(Error::AssertionNotFound),
        },
        Err(err) => Err(err),
    }
}
