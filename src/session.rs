//! Session credential carried in a request cookie.

use axum::http::{header::COOKIE, HeaderMap};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;

pub const DEFAULT_SESSION_COOKIE: &str = "access_token";

/// Opaque session token issued at login.
///
/// The raw value is only reachable through [`SessionToken::expose`], so it
/// never ends up in `Debug` output or trace spans.
#[derive(Clone)]
pub struct SessionToken(SecretString);

impl SessionToken {
    /// Build a token from a raw cookie value.
    ///
    /// Returns `None` when the value is empty or contains bytes that are not
    /// valid cookie octets; malformed cookies count as "no token".
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let value = raw.trim();
        let value = value
            .strip_prefix('"')
            .and_then(|v| v.strip_suffix('"'))
            .unwrap_or(value);

        if value.is_empty() || !value.bytes().all(is_cookie_octet) {
            return None;
        }

        Some(Self(SecretString::from(value.to_string())))
    }

    /// Read the named cookie from the request headers.
    #[must_use]
    pub fn from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<Self> {
        headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|header| header.to_str().ok())
            .flat_map(|value| value.split(';'))
            .find_map(|pair| {
                let (key, val) = pair.trim().split_once('=')?;
                if key.trim() == cookie_name {
                    Some(Self::parse(val))
                } else {
                    None
                }
            })
            .flatten()
    }

    #[must_use]
    pub fn expose(&self) -> &str {
        self.0.expose_secret()
    }

    /// `Cookie` header value used to present this token to the backend.
    #[must_use]
    pub fn cookie_header(&self, cookie_name: &str) -> String {
        format!("{cookie_name}={}", self.expose())
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken([REDACTED])")
    }
}

// RFC 6265 cookie-octet
const fn is_cookie_octet(b: u8) -> bool {
    matches!(b, 0x21 | 0x23..=0x2B | 0x2D..=0x3A | 0x3C..=0x5B | 0x5D..=0x7E)
}
