//! Credential extraction.

use crate::cookie::read_cookie;

/// Where a presented token came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialSource {
    /// The session cookie.
    Cookie,
    /// An `Authorization: Bearer` header.
    Bearer,
}

impl CredentialSource {
    pub fn as_str(self) -> &'static str {
        match self {
            CredentialSource::Cookie => "cookie",
            CredentialSource::Bearer => "bearer",
        }
    }
}

/// A candidate token, not yet verified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub token: String,
    pub source: CredentialSource,
}

/// Extract a candidate token from request headers.
///
/// The session cookie wins over the bearer header. Empty values count as absent.
pub fn extract_credential(
    cookie_header: Option<&str>,
    authorization: Option<&str>,
    cookie_name: &str,
) -> Option<Credential> {
    let from_cookie = cookie_header
        .and_then(|h| read_cookie(h, cookie_name))
        .filter(|t| !t.is_empty())
        .map(|t| Credential {
            token: t.to_string(),
            source: CredentialSource::Cookie,
        });

    from_cookie.or_else(|| {
        authorization
            .and_then(bearer_token)
            .map(|t| Credential {
                token: t.to_string(),
                source: CredentialSource::Bearer,
            })
    })
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}
