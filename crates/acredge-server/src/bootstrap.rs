//! Wiring configuration into a running authority.

use std::sync::Arc;
use std::time::Duration;

use acredge_api::{Clock, DocumentStore, IdentityVerifier, SecretStore, SessionError};
use acredge_auth::{JwksIdentityVerifier, JwksSource, MemoryTokenCache, TokenCodec, VerifyOptions};
use acredge_connectors::StaticIdentityVerifier;
use acredge_core::{AuthorityConfig, IdentityConfig, validate_config, validate_secret};
use acredge_runtime::{Collaborators, SessionAuthority};
use tokio::task::JoinHandle;

use crate::AppState;

pub struct Built {
    pub state: AppState,
    pub cache: Arc<MemoryTokenCache>,
}

pub fn build_state(
    cfg: &AuthorityConfig,
    secrets: &dyn SecretStore,
    store: Arc<dyn DocumentStore>,
    clock: Arc<dyn Clock>,
) -> Result<Built, SessionError> {
    validate_config(cfg)?;

    let secret = secrets.get(&cfg.session.secret_ref)?;
    validate_secret(&secret)?;

    let cookie = cfg.cookie.to_options();
    acredge_auth::build_clear_cookie(&cookie).map_err(|e| SessionError::Config(e.to_string()))?;

    let policy = cfg.session.policy();
    let cache = Arc::new(MemoryTokenCache::new(policy.cache_ttl, clock.clone()));
    let authority = SessionAuthority::new(
        TokenCodec::from_secret(secret.as_bytes()),
        policy,
        Collaborators {
            store,
            verifier: build_verifier(&cfg.identity),
            cache: cache.clone(),
            clock,
        },
    )?;

    Ok(Built {
        state: AppState {
            authority: Arc::new(authority),
            cookie: Arc::new(cookie),
        },
        cache,
    })
}

fn build_verifier(identity: &IdentityConfig) -> Arc<dyn IdentityVerifier> {
    match identity {
        IdentityConfig::Jwks {
            jwks_url,
            issuer,
            audience,
            phone_claim,
        } => Arc::new(JwksIdentityVerifier::new(
            JwksSource::Url(jwks_url.clone()),
            VerifyOptions {
                issuer: issuer.clone(),
                audience: audience.clone(),
                phone_claim: phone_claim.clone(),
                ..Default::default()
            },
        )),
        IdentityConfig::Static { assertions } => {
            tracing::warn!(
                entries = assertions.len(),
                "static identity verifier in use; not for production"
            );
            Arc::new(StaticIdentityVerifier::new(assertions.clone()))
        }
    }
}

/// Periodically purge expired cache entries until the handle is aborted.
pub fn spawn_cache_sweeper(cache: Arc<MemoryTokenCache>, every: Duration) -> JoinHandle<()> {
    let every = every.max(Duration::from_secs(1));
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        loop {
            ticker.tick().await;
            let purged = cache.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, remaining = cache.len(), "token cache swept");
            }
        }
    })
}
