use crate::error::{Error, Result};
use regex::Regex;
use std::sync::OnceLock;

const STATE_TOKEN_PATTERN: &str =
    r#"stateToken\s*=\s*(?:'((?:[^'\\\n]|\\.)*)'|"((?:[^"\\\n]|\\.)*)")"#;

/// Finds the `stateToken = '...'` assignment Okta embeds in its sign-in pages.
///
/// Both quoting styles are accepted and JavaScript escapes inside the literal
/// (`\x2D`, `\u002D`, `\'`, ...) are decoded. A present-but-empty literal yields
/// an empty token, only a missing assignment is an error.
pub fn extract_state_token(body: &str) -> Result<String> {
    let captures = state_token_regex()?
        .captures(body)
        .ok_or(Error::StateTokenNotFound)?;
    let literal = captures
        .get(1)
        .or_else(|| captures.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default();

    Ok(unescape(literal))
}

// Compiled on first use and shared afterwards.
fn state_token_regex() -> Result<&'static Regex> {
    static REGEX: OnceLock<Regex> = OnceLock::new();

    if let Some(re) = REGEX.get() {
        return Ok(re);
    }

    let re = Regex::new(STATE_TOKEN_PATTERN).map_err(anyhow::Error::from)?;
    Ok(REGEX.get_or_init(|| re))
}

fn unescape(literal: &str) -> String {
    let mut token = String::with_capacity(literal.len());
    let mut chars = literal.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            token.push(c);
            continue;
        }

        match chars.next() {
            Some('x') => push_hex(&mut token, &mut chars, 2, "\\x"),
            Some('u') => push_hex(&mut token, &mut chars, 4, "\\u"),
            Some(other) => token.push(other),
            None => token.push('\\'),
        }
    }

    token
}

// Malformed escapes are kept verbatim.
fn push_hex<I>(token: &mut String, chars: &mut std::iter::Peekable<I>, width: usize, prefix: &str)
where
    I: Iterator<Item = char>,
{
    let mut digits = String::with_capacity(width);
    while digits.len() < width {
        match chars.peek() {
            Some(c) if c.is_ascii_hexdigit() => {
                digits.push(*c);
                chars.next();
            }
            _ => break,
        }
    }

    let decoded = match digits.len() == width {
        true => u32::from_str_radix(digits.as_str(), 16)
            .ok()
            .and_then(char::from_u32),
        false => None,
    };

    match decoded {
        Some(c) => token.push(c),
        None => {
            token.push_str(prefix);
            token.push_str(digits.as_str());
        }
    }
}
