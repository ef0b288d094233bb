//! In-memory token cache.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use acredge_api::{Clock, SignedToken, TokenCache};
use chrono::{DateTime, Utc};
use dashmap::DashMap;

#[derive(Debug, Clone)]
struct CachedToken {
    token: SignedToken,
    exp_at: DateTime<Utc>,
}

/// TTL-bounded identity -> token cache.
///
/// Entries expire lazily on read and in bulk through [`MemoryTokenCache::purge_expired`].
/// Per-key operations go through a single `DashMap` shard lock, so a reader never sees a
/// half-written entry.
///
/// Every eviction advances a generation counter. [`TokenCache::put_if_current`] checks it
/// while holding the key's shard lock, so a write that raced an eviction is dropped.
pub struct MemoryTokenCache {
    entries: DashMap<String, CachedToken>,
    generation: AtomicU64,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl MemoryTokenCache {
    pub fn new(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            generation: AtomicU64::new(0),
            ttl,
            clock,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Number of entries, expired ones included until purged.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every expired entry and return how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, cached| cached.exp_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        // A TTL too large for chrono degenerates to "already expired".
        chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| now.checked_add_signed(ttl))
            .unwrap_or(now)
    }
}

impl std::fmt::Debug for MemoryTokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTokenCache")
            .field("entries", &self.entries.len())
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenCache for MemoryTokenCache {
    fn get(&self, identity: &str) -> Option<SignedToken> {
        let now = self.clock.now();
        // Release the shard guard before removing.
        let hit = self
            .entries
            .get(identity)
            .map(|cached| (cached.token.clone(), cached.exp_at > now));

        match hit {
            Some((token, true)) => Some(token),
            Some((_, false)) => {
                self.entries
                    .remove_if(identity, |_, cached| cached.exp_at <= now);
                None
            }
            None => None,
        }
    }

    fn put(&self, identity: &str, token: &str) {
        let exp_at = self.expiry_from(self.clock.now());
        self.entries.insert(
            identity.to_string(),
            CachedToken {
                token: token.to_string(),
                exp_at,
            },
        );
    }

    fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn put_if_current(&self, identity: &str, token: &str, generation: u64) -> bool {
        let exp_at = self.expiry_from(self.clock.now());
        let slot = self.entries.entry(identity.to_string());
        if self.generation.load(Ordering::SeqCst) != generation {
            return false;
        }
        slot.insert(CachedToken {
            token: token.to_string(),
            exp_at,
        });
        true
    }

    fn evict(&self, identity: &str) {
        // Bump before removing: a writer holding the shard lock either sees the new
        // generation or has its entry removed right after.
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.entries.remove(identity);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StepClock(Mutex<DateTime<Utc>>);

    impl StepClock {
        fn advance(&self, secs: i64) {
            let mut now = self.0.lock().unwrap();
            *now += chrono::Duration::seconds(secs);
        }
    }

    impl Clock for StepClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock().unwrap()
        }
    }

    fn cache() -> (MemoryTokenCache, Arc<StepClock>) {
        let clock = Arc::new(StepClock(Mutex::new(
            DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
        )));
        (
            MemoryTokenCache::new(Duration::from_secs(300), clock.clone()),
            clock,
        )
    }

    #[test]
    fn hit_within_ttl_miss_after() {
        let (cache, clock) = cache();
        cache.put("+1555", "tok");
        clock.advance(299);
        assert_eq!(cache.get("+1555").as_deref(), Some("tok"));
        clock.advance(1);
        assert_eq!(cache.get("+1555"), None);
        assert!(cache.is_empty(), "expired entry is removed on read");
    }

    #[test]
    fn put_overwrites_and_refreshes_ttl() {
        let (cache, clock) = cache();
        cache.put("+1555", "old");
        clock.advance(200);
        cache.put("+1555", "new");
        clock.advance(200);
        assert_eq!(cache.get("+1555").as_deref(), Some("new"));
    }

    #[test]
    fn evict_is_idempotent() {
        let (cache, _) = cache();
        cache.put("+1555", "tok");
        cache.evict("+1555");
        cache.evict("+1555");
        assert_eq!(cache.get("+1555"), None);
    }

    #[test]
    fn conditional_put_loses_to_an_eviction() {
        let (cache, _) = cache();
        let before = cache.generation();
        cache.evict("+1555");
        assert!(!cache.put_if_current("+1555", "revoked", before));
        assert_eq!(cache.get("+1555"), None);

        assert!(cache.put_if_current("+1555", "tok", cache.generation()));
        assert_eq!(cache.get("+1555").as_deref(), Some("tok"));
    }

    #[test]
    fn purge_only_drops_expired() {
        let (cache, clock) = cache();
        cache.put("+1", "a");
        clock.advance(250);
        cache.put("+2", "b");
        clock.advance(100);
        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("+2").as_deref(), Some("b"));
    }
}
