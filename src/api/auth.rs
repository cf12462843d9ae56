//! Session header assembly from browser credentials.
//!
//! The API authenticates with the browser's cookie jar plus a CSRF token
//! copied out of the `ct0` cookie and a static bearer token. No login flow
//! is performed here; the caller supplies credentials lifted from an
//! existing browser session.

use std::collections::HashMap;

use reqwest::header::{self, HeaderMap, HeaderValue};

use crate::error::{Error, Result};

/// Parse a browser `Cookie:` header string into key/value pairs.
pub fn parse_cookie(cookie_str: &str) -> HashMap<String, String> {
    cookie_str
        .split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once('=')?;
            Some((key.trim().to_string(), value.trim().to_string()))
        })
        .collect()
}

/// Build the default headers carried by every API request.
pub fn session_headers(cookie_str: &str, auth_token: &str) -> Result<HeaderMap> {
    let cookies = parse_cookie(cookie_str);
    let csrf = cookies
        .get("ct0")
        .ok_or_else(|| Error::Authentication("cookie has no ct0 (CSRF) value".into()))?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::COOKIE,
        HeaderValue::from_str(cookie_str)
            .map_err(|_| Error::Authentication("cookie contains invalid header bytes".into()))?,
    );
    headers.insert(
        "x-csrf-token",
        HeaderValue::from_str(csrf)
            .map_err(|_| Error::Authentication("ct0 contains invalid header bytes".into()))?,
    );
    headers.insert(
        header::AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", auth_token))
            .map_err(|_| Error::Authentication("auth token contains invalid bytes".into()))?,
    );
    Ok(headers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_cookie_pairs() {
        let cookies = parse_cookie("ct0=abc123; auth_token=tok; lang=en");
        assert_eq!(cookies.get("ct0").map(String::as_str), Some("abc123"));
        assert_eq!(cookies.get("lang").map(String::as_str), Some("en"));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn ignores_malformed_pairs() {
        let cookies = parse_cookie("ct0=abc; garbage; =nokey");
        assert_eq!(cookies.get("ct0").map(String::as_str), Some("abc"));
        assert!(!cookies.contains_key("garbage"));
    }

    #[test]
    fn session_headers_carry_csrf_and_bearer() {
        let headers = session_headers("ct0=abc123; lang=en", "BEARER").unwrap();
        assert_eq!(headers.get("x-csrf-token").unwrap(), "abc123");
        assert_eq!(
            headers.get(header::AUTHORIZATION).unwrap(),
            "Bearer BEARER"
        );
    }

    #[test]
    fn missing_ct0_is_an_auth_error() {
        assert!(session_headers("lang=en", "BEARER").is_err());
    }
}
