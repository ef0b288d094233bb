use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use acredge_api::{Identity, SessionError};
use acredge_auth::{CookieOptions, SameSite};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE_NAME: &str = "acredge.toml";
pub const MIN_SECRET_LEN: usize = 32;

pub const DEFAULT_CONFIG_TOML: &str = r#"# acredge session authority

[server]
bind = "0.0.0.0:8000"
route_prefix = "/api/auth"

[session]
# Environment variable holding the HMAC signing secret (at least 32 bytes).
secret_ref = "JWT_SECRET"
default_lifetime_secs = 86400
remember_me_lifetime_secs = 604800
cache_ttl_secs = 300
cache_sweep_interval_secs = 60

[cookie]
name = "token"
path = "/"
same_site = "none"

[identity]
mode = "jwks"
jwks_url = "https://www.googleapis.com/service_accounts/v1/jwk/securetoken@system.gserviceaccount.com"
# issuer = "https://securetoken.google.com/<project-id>"
# audience = "<project-id>"
"#;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorityConfig {
    pub server: ServerConfig,
    pub session: SessionConfig,
    pub cookie: CookieConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub route_prefix: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:8000".to_string(),
            route_prefix: "/api/auth".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub secret_ref: String,
    pub default_lifetime_secs: u64,
    pub remember_me_lifetime_secs: u64,
    pub cache_ttl_secs: u64,
    pub cache_sweep_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            secret_ref: "JWT_SECRET".to_string(),
            default_lifetime_secs: 24 * 60 * 60,
            remember_me_lifetime_secs: 7 * 24 * 60 * 60,
            cache_ttl_secs: 300,
            cache_sweep_interval_secs: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    pub name: String,
    pub path: String,
    pub domain: Option<String>,
    pub same_site: SameSite,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "token".to_string(),
            path: "/".to_string(),
            domain: None,
            same_site: SameSite::None,
        }
    }
}

impl CookieConfig {
    /// Session cookies are always `Secure` and `HttpOnly`.
    pub fn to_options(&self) -> CookieOptions {
        CookieOptions {
            name: self.name.clone(),
            path: self.path.clone(),
            domain: self.domain.clone(),
            secure: true,
            http_only: true,
            same_site: self.same_site,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum IdentityConfig {
    /// Verify ID-token assertions against a provider JWKS.
    Jwks {
        jwks_url: String,
        #[serde(default)]
        issuer: Option<String>,
        #[serde(default)]
        audience: Option<String>,
        #[serde(default = "default_phone_claim")]
        phone_claim: String,
    },
    /// Fixed assertion -> phone table. Development only.
    Static {
        #[serde(default)]
        assertions: BTreeMap<String, String>,
    },
}

impl Default for IdentityConfig {
    fn default() -> Self {
        IdentityConfig::Static {
            assertions: BTreeMap::new(),
        }
    }
}

fn default_phone_claim() -> String {
    "phone_number".to_string()
}

/// Lifetimes the session authority works with, derived from [`SessionConfig`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub default_lifetime: Duration,
    pub remember_me_lifetime: Duration,
    pub cache_ttl: Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        SessionConfig::default().policy()
    }
}

impl SessionPolicy {
    pub fn lifetime_for(&self, remember_me: bool) -> Duration {
        if remember_me {
            self.remember_me_lifetime
        } else {
            self.default_lifetime
        }
    }

    pub fn shortest_lifetime(&self) -> Duration {
        self.default_lifetime.min(self.remember_me_lifetime)
    }
}

impl SessionConfig {
    pub fn policy(&self) -> SessionPolicy {
        SessionPolicy {
            default_lifetime: Duration::from_secs(self.default_lifetime_secs),
            remember_me_lifetime: Duration::from_secs(self.remember_me_lifetime_secs),
            cache_ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }
}

pub fn validate_config(cfg: &AuthorityConfig) -> Result<(), SessionError> {
    let s = &cfg.session;
    if s.default_lifetime_secs == 0 || s.remember_me_lifetime_secs == 0 {
        return Err(SessionError::Config(
            "session lifetimes must be positive".to_string(),
        ));
    }
    let policy = s.policy();
    if policy.cache_ttl > policy.shortest_lifetime() {
        return Err(SessionError::Config(format!(
            "cache_ttl_secs ({}) exceeds the shortest session lifetime ({}s)",
            s.cache_ttl_secs,
            policy.shortest_lifetime().as_secs()
        )));
    }
    if s.secret_ref.trim().is_empty() {
        return Err(SessionError::Config("session.secret_ref is empty".to_string()));
    }
    if cfg.cookie.name.trim().is_empty() {
        return Err(SessionError::Config("cookie.name is empty".to_string()));
    }
    if !cfg.server.route_prefix.is_empty() && !cfg.server.route_prefix.starts_with('/') {
        return Err(SessionError::Config(format!(
            "server.route_prefix must start with '/': {}",
            cfg.server.route_prefix
        )));
    }
    if let IdentityConfig::Jwks { jwks_url, .. } = &cfg.identity {
        if !(jwks_url.starts_with("https://") || jwks_url.starts_with("http://")) {
            return Err(SessionError::Config(format!(
                "identity.jwks_url must be an http(s) URL: {jwks_url:?}"
            )));
        }
    }
    Ok(())
}

pub fn validate_secret(secret: &str) -> Result<(), SessionError> {
    if secret.len() < MIN_SECRET_LEN {
        return Err(SessionError::Config(format!(
            "signing secret must be at least {MIN_SECRET_LEN} bytes"
        )));
    }
    Ok(())
}

/// Apply `ACREDGE_BIND`, then `PORT` (port only), from `lookup`.
pub fn apply_env_overrides(cfg: &mut AuthorityConfig, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(bind) = lookup("ACREDGE_BIND").filter(|b| !b.trim().is_empty()) {
        cfg.server.bind = bind;
    }
    if let Some(port) = lookup("PORT").and_then(|p| p.trim().parse::<u16>().ok()) {
        let host = cfg
            .server
            .bind
            .rsplit_once(':')
            .map_or("0.0.0.0", |(host, _)| host)
            .to_string();
        cfg.server.bind = format!("{host}:{port}");
    }
}

pub fn default_config_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".config").join("acredge")
    } else {
        PathBuf::from(".acredge")
    }
}

pub fn parse_config(content: &str) -> Result<AuthorityConfig, SessionError> {
    let cfg: AuthorityConfig = toml::from_str(content)
        .map_err(|e| SessionError::Config(format!("invalid TOML: {e}")))?;
    validate_config(&cfg)?;
    Ok(cfg)
}

pub fn load_config_from_dir(dir: &Path) -> Result<AuthorityConfig, SessionError> {
    load_config_from_file(&dir.join(CONFIG_FILE_NAME))
}

pub fn load_config_from_file(path: &Path) -> Result<AuthorityConfig, SessionError> {
    let content = fs::read_to_string(path)
        .map_err(|e| SessionError::Config(format!("failed to read {}: {e}", path.display())))?;
    parse_config(&content)
        .map_err(|e| SessionError::Config(format!("{}: {e}", path.display())))
}

pub fn write_default_config(dir: &Path) -> Result<PathBuf, SessionError> {
    fs::create_dir_all(dir)
        .map_err(|e| SessionError::Internal(format!("failed to create {}: {e}", dir.display())))?;

    let path = dir.join(CONFIG_FILE_NAME);
    if !path.exists() {
        fs::write(&path, DEFAULT_CONFIG_TOML).map_err(|e| {
            SessionError::Internal(format!("failed to write {}: {e}", path.display()))
        })?;
    }
    Ok(path)
}

/// Normalize a phone number into an identity claim.
///
/// Strips spaces, dashes, dots and parentheses; the result must be `+` followed by
/// 8 to 15 digits.
pub fn normalize_identity(raw: &str) -> Result<Identity, SessionError> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    let digits = cleaned
        .strip_prefix('+')
        .ok_or_else(|| SessionError::Validation(format!("phone number must start with '+': {raw:?}")))?;

    if !(8..=15).contains(&digits.len()) || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(SessionError::Validation(format!(
            "not a phone number: {raw:?}"
        )));
    }
    Ok(cleaned)
}
