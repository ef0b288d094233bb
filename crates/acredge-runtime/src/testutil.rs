use std::sync::Arc;

use acredge_auth::{MemoryTokenCache, TokenCodec};
use acredge_connectors::{ManualClock, MemoryDocumentStore, StaticIdentityVerifier};
use acredge_core::SessionPolicy;
use chrono::{DateTime, Utc};

use crate::{Collaborators, SessionAuthority};

pub(crate) const PHONE: &str = "+15551234567";
pub(crate) const SECRET: &[u8] = b"unit-test-secret-unit-test-secret!";

pub(crate) struct Fixture {
    pub authority: SessionAuthority,
    pub store: Arc<MemoryDocumentStore>,
    pub cache: Arc<MemoryTokenCache>,
    pub clock: Arc<ManualClock>,
}

impl Fixture {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        ));
        let store = Arc::new(MemoryDocumentStore::new());
        let policy = SessionPolicy::default();
        let cache = Arc::new(MemoryTokenCache::new(policy.cache_ttl, clock.clone()));
        let verifier = StaticIdentityVerifier::default()
            .with("good", PHONE)
            .with("formatted", "+1 (555) 123-4567")
            .with("garbled-phone", "5551234567");

        let authority = SessionAuthority::new(
            TokenCodec::from_secret(SECRET),
            policy,
            Collaborators {
                store: store.clone(),
                verifier: Arc::new(verifier),
                cache: cache.clone(),
                clock: clock.clone(),
            },
        )
        .unwrap();

        Self {
            authority,
            store,
            cache,
            clock,
        }
    }

    pub fn start(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }
}
