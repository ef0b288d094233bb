//! The session authority: issues, validates, revokes and reports bearer sessions.
//!
//! The durable store is the source of truth. The token cache is a hint that lets the
//! common authenticated request skip a store round trip; it is only ever filled from a
//! store-confirmed value and only ever emptied by eviction, never consulted for a
//! revocation decision.

use std::sync::Arc;

use acredge_api::{Clock, DocumentStore, Identity, IdentityVerifier, SessionError, SessionRecord, TokenCache};
use acredge_auth::TokenCodec;
use acredge_core::SessionPolicy;
use chrono::{DateTime, Utc};

mod issuer;
mod records;
mod status;
mod terminator;
mod validator;

#[cfg(test)]
mod testutil;

/// External collaborators the authority is wired to.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn DocumentStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub cache: Arc<dyn TokenCache>,
    pub clock: Arc<dyn Clock>,
}

pub struct SessionAuthority {
    codec: TokenCodec,
    policy: SessionPolicy,
    store: Arc<dyn DocumentStore>,
    verifier: Arc<dyn IdentityVerifier>,
    cache: Arc<dyn TokenCache>,
    clock: Arc<dyn Clock>,
}

impl SessionAuthority {
    pub fn new(
        codec: TokenCodec,
        policy: SessionPolicy,
        collaborators: Collaborators,
    ) -> Result<Self, SessionError> {
        if policy.default_lifetime.is_zero() || policy.remember_me_lifetime.is_zero() {
            return Err(SessionError::Config(
                "session lifetimes must be positive".to_string(),
            ));
        }
        if policy.cache_ttl > policy.shortest_lifetime() {
            return Err(SessionError::Config(
                "cache TTL must not exceed the shortest session lifetime".to_string(),
            ));
        }

        let Collaborators {
            store,
            verifier,
            cache,
            clock,
        } = collaborators;

        Ok(Self {
            codec,
            policy,
            store,
            verifier,
            cache,
            clock,
        })
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedSession {
    pub identity: Identity,
    pub token: String,
    pub expires_at: DateTime<Utc>,
    /// True when an existing unexpired session was returned instead of minting.
    pub direct_login: bool,
}

impl IssuedSession {
    pub fn remaining_secs(&self, now: DateTime<Utc>) -> u64 {
        u64::try_from((self.expires_at - now).num_seconds()).unwrap_or(0)
    }
}

/// Result of a logout attempt that found an identity to revoke.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub identity: Identity,
    /// False when the durable delete failed; the cache entry was evicted regardless.
    pub store_revoked: bool,
}

/// Authoritative session state of one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStatus {
    pub identity: Identity,
    pub record: Option<SessionRecord>,
}

impl SessionStatus {
    pub fn is_valid(&self) -> bool {
        self.record.is_some()
    }

    pub fn token(&self) -> Option<&str> {
        self.record.as_ref().map(|r| r.token.as_str())
    }
}
