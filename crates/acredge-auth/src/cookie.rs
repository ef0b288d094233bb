//! Cookie helpers.

use crate::{Error, Result};
use httpdate::fmt_http_date;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// SameSite attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SameSite {
    /// SameSite=Strict
    Strict,
    /// SameSite=Lax
    Lax,
    /// SameSite=None
    None,
}

impl SameSite {
    fn as_str(self) -> &'static str {
        match self {
            SameSite::Strict => "Strict",
            SameSite::Lax => "Lax",
            SameSite::None => "None",
        }
    }
}

/// Options used to build the session cookie.
#[derive(Debug, Clone)]
pub struct CookieOptions {
    /// Cookie name.
    pub name: String,

    /// Cookie path.
    pub path: String,

    /// Optional cookie domain.
    pub domain: Option<String>,

    /// Send on HTTPS only.
    pub secure: bool,

    /// Not accessible to scripts.
    pub http_only: bool,

    /// SameSite attribute. `None` lets the frontend on another origin send it.
    pub same_site: SameSite,
}

impl Default for CookieOptions {
    fn default() -> Self {
        Self {
            name: "token".to_string(),
            path: "/".to_string(),
            domain: None,
            secure: true,
            http_only: true,
            same_site: SameSite::None,
        }
    }
}

fn validate(opts: &CookieOptions) -> Result<()> {
    if opts.name.is_empty() || opts.name.contains(['=', ';', ' ']) {
        return Err(Error::Validation(format!(
            "invalid cookie name: {:?}",
            opts.name
        )));
    }
    // Browsers drop SameSite=None cookies that are not Secure.
    if opts.same_site == SameSite::None && !opts.secure {
        return Err(Error::Validation(
            "SameSite=None cookies must be Secure".to_string(),
        ));
    }
    Ok(())
}

fn attributes(opts: &CookieOptions) -> Vec<String> {
    let mut parts = vec![format!("Path={}", opts.path)];
    if let Some(domain) = &opts.domain {
        parts.push(format!("Domain={domain}"));
    }
    if opts.secure {
        parts.push("Secure".to_string());
    }
    if opts.http_only {
        parts.push("HttpOnly".to_string());
    }
    parts.push(format!("SameSite={}", opts.same_site.as_str()));
    parts
}

/// Build a `Set-Cookie` header value carrying `token` for `max_age_seconds`.
///
/// Callers pass the token's remaining validity so the cookie dies with the session.
pub fn build_set_cookie(token: &str, max_age_seconds: u64, opts: &CookieOptions) -> Result<String> {
    validate(opts)?;

    let mut parts = vec![format!("{}={token}", opts.name)];
    parts.extend(attributes(opts));
    parts.push(format!("Max-Age={max_age_seconds}"));
    // Expires for older clients.
    let expires = SystemTime::now() + Duration::from_secs(max_age_seconds);
    parts.push(format!("Expires={}", fmt_http_date(expires)));

    Ok(parts.join("; "))
}

/// Build a `Set-Cookie` header value that clears the session cookie.
pub fn build_clear_cookie(opts: &CookieOptions) -> Result<String> {
    validate(opts)?;

    let mut parts = vec![format!("{}=", opts.name)];
    parts.extend(attributes(opts));
    parts.push("Max-Age=0".to_string());
    parts.push(format!("Expires={}", fmt_http_date(UNIX_EPOCH)));

    Ok(parts.join("; "))
}

/// Find cookie `name` in a `Cookie` request header value.
pub fn read_cookie<'a>(cookie_header: &'a str, name: &str) -> Option<&'a str> {
    cookie_header.split(';').find_map(|pair| {
        let (k, v) = pair.trim().split_once('=')?;
        (k.trim() == name).then(|| v.trim().trim_matches('"'))
    })
}
