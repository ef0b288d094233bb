use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Normalized phone number. Natural key of session and profile records.
pub type Identity = String;
pub type SignedToken = String;

/// A flat field map, the unit the durable store reads and writes.
pub type Document = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Sessions,
    Profiles,
}

impl Namespace {
    pub fn as_str(self) -> &'static str {
        match self {
            Namespace::Sessions => "sessions",
            Namespace::Profiles => "profiles",
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Durable session record. One per identity; re-issuance overwrites it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub identity: Identity,
    pub token: SignedToken,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSession {
    token: SignedToken,
    expires_at: DateTime<Utc>,
}

impl SessionRecord {
    /// A record whose expiry has passed is logically absent.
    pub fn is_live_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at > now
    }

    /// Whole seconds of validity left at `now`, zero once expired.
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.expires_at - now).num_seconds()).unwrap_or(0)
    }

    pub fn to_document(&self) -> Result<Document, SessionError> {
        to_document(&StoredSession {
            token: self.token.clone(),
            expires_at: self.expires_at,
        })
    }

    pub fn from_document(identity: &str, doc: Document) -> Result<Self, SessionError> {
        let stored: StoredSession = from_document(doc)?;
        Ok(Self {
            identity: identity.to_string(),
            token: stored.token,
            expires_at: stored.expires_at,
        })
    }
}

/// Profile provisioned on first successful login. Never overwritten by the session subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRecord {
    pub phone_number: Identity,
    #[serde(default)]
    pub same_number_on_whatsapp: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    pub created_at: DateTime<Utc>,
}

impl ProfileRecord {
    pub fn with_defaults(identity: &str, same_whatsapp: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            phone_number: identity.to_string(),
            same_number_on_whatsapp: if same_whatsapp {
                identity.to_string()
            } else {
                String::new()
            },
            name: String::new(),
            email: String::new(),
            created_at,
        }
    }

    pub fn to_document(&self) -> Result<Document, SessionError> {
        to_document(self)
    }

    pub fn from_document(doc: Document) -> Result<Self, SessionError> {
        from_document(doc)
    }
}

fn to_document<T: Serialize>(value: &T) -> Result<Document, SessionError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map.into_iter().collect()),
        Ok(other) => Err(SessionError::Internal(format!(
            "record serialized to non-object: {other}"
        ))),
        Err(e) => Err(SessionError::Internal(format!("record serialization failed: {e}"))),
    }
}

fn from_document<T: DeserializeOwned>(doc: Document) -> Result<T, SessionError> {
    serde_json::from_value(Value::Object(doc.into_iter().collect()))
        .map_err(|e| SessionError::CorruptRecord(e.to_string()))
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no credential presented")]
    NoCredential,
    #[error("invalid credential: {0}")]
    InvalidCredential(String),
    #[error("session expired")]
    Expired,
    #[error("no session on record")]
    SessionNotFound,
    #[error("presented token is not the current session")]
    SessionMismatch,
    #[error("not logged in")]
    NotLoggedIn,
    #[error("identity unverifiable: {0}")]
    IdentityUnverifiable(String),
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),
    #[error("corrupt record: {0}")]
    CorruptRecord(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl SessionError {
    /// Stable label for logs. Never sent to callers.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::NoCredential => "no_credential",
            SessionError::InvalidCredential(_) => "invalid_credential",
            SessionError::Expired => "expired",
            SessionError::SessionNotFound => "session_not_found",
            SessionError::SessionMismatch => "session_mismatch",
            SessionError::NotLoggedIn => "not_logged_in",
            SessionError::IdentityUnverifiable(_) => "identity_unverifiable",
            SessionError::StoreUnavailable(_) => "store_unavailable",
            SessionError::CorruptRecord(_) => "corrupt_record",
            SessionError::Validation(_) => "validation",
            SessionError::Config(_) => "config",
            SessionError::Internal(_) => "internal",
        }
    }

    /// Kinds that describe the caller's credential rather than a backend fault.
    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            SessionError::NoCredential
                | SessionError::InvalidCredential(_)
                | SessionError::Expired
                | SessionError::SessionNotFound
                | SessionError::SessionMismatch
                | SessionError::NotLoggedIn
        )
    }
}

/// Keyed document storage over the `sessions` and `profiles` namespaces.
///
/// Implementations bound their own calls with a timeout and report any I/O failure,
/// timeouts included, as [`SessionError::StoreUnavailable`].
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Document>, SessionError>;
    async fn set(&self, namespace: Namespace, key: &str, doc: Document) -> Result<(), SessionError>;
    async fn delete(&self, namespace: Namespace, key: &str) -> Result<(), SessionError>;
}

/// Turns an upstream identity assertion into a verified phone number.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, assertion: &str) -> Result<Identity, SessionError>;
}

/// Process-local positive cache of identity -> current token.
///
/// Absence is never an error. Reads and writes of one key must not tear.
pub trait TokenCache: Send + Sync {
    fn get(&self, identity: &str) -> Option<SignedToken>;
    fn put(&self, identity: &str, token: &str);

    /// Counter advanced by every [`TokenCache::evict`].
    fn generation(&self) -> u64;

    /// Store `token` only if no eviction has happened since `generation` was read.
    /// Returns whether the entry was written.
    fn put_if_current(&self, identity: &str, token: &str, generation: u64) -> bool;

    fn evict(&self, identity: &str);
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub trait SecretStore: Send + Sync {
    fn get(&self, secret_ref: &str) -> Result<String, SessionError>;
}
