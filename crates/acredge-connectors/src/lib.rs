use std::collections::BTreeMap;
use std::sync::RwLock;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use acredge_api::{
    Clock, Document, DocumentStore, Identity, IdentityVerifier, Namespace, SecretStore,
    SessionError,
};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

pub struct EnvSecretStore;

impl SecretStore for EnvSecretStore {
    fn get(&self, secret_ref: &str) -> Result<String, SessionError> {
        std::env::var(secret_ref)
            .map_err(|_| SessionError::Config(format!("missing secret env var {secret_ref}")))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub reads: u64,
    pub writes: u64,
    pub deletes: u64,
}

impl StoreStats {
    pub fn total(&self) -> u64 {
        self.reads + self.writes + self.deletes
    }
}

/// In-process document store keyed by (namespace, key).
///
/// Counts every call, and can be switched into an outage where every call fails with
/// [`SessionError::StoreUnavailable`].
#[derive(Default)]
pub struct MemoryDocumentStore {
    docs: RwLock<BTreeMap<(Namespace, String), Document>>,
    unavailable: AtomicBool,
    reads: AtomicU64,
    writes: AtomicU64,
    deletes: AtomicU64,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            reads: self.reads.load(Ordering::SeqCst),
            writes: self.writes.load(Ordering::SeqCst),
            deletes: self.deletes.load(Ordering::SeqCst),
        }
    }

    pub fn len(&self, namespace: Namespace) -> usize {
        self.docs
            .read()
            .map(|docs| docs.keys().filter(|(ns, _)| *ns == namespace).count())
            .unwrap_or(0)
    }

    fn check_available(&self) -> Result<(), SessionError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(SessionError::StoreUnavailable(
                "memory store is in a simulated outage".to_string(),
            ));
        }
        Ok(())
    }
}

fn poisoned() -> SessionError {
    SessionError::Internal("document store poisoned".to_string())
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, namespace: Namespace, key: &str) -> Result<Option<Document>, SessionError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let docs = self.docs.read().map_err(|_| poisoned())?;
        Ok(docs.get(&(namespace, key.to_string())).cloned())
    }

    async fn set(&self, namespace: Namespace, key: &str, doc: Document) -> Result<(), SessionError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        docs.insert((namespace, key.to_string()), doc);
        Ok(())
    }

    async fn delete(&self, namespace: Namespace, key: &str) -> Result<(), SessionError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_available()?;
        let mut docs = self.docs.write().map_err(|_| poisoned())?;
        docs.remove(&(namespace, key.to_string()));
        Ok(())
    }
}

/// Verifier backed by a fixed assertion -> phone table.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentityVerifier {
    assertions: BTreeMap<String, Identity>,
}

impl StaticIdentityVerifier {
    pub fn new(assertions: BTreeMap<String, Identity>) -> Self {
        Self { assertions }
    }

    #[must_use]
    pub fn with(mut self, assertion: &str, phone: &str) -> Self {
        self.assertions
            .insert(assertion.to_string(), phone.to_string());
        self
    }
}

#[async_trait]
impl IdentityVerifier for StaticIdentityVerifier {
    async fn verify(&self, assertion: &str) -> Result<Identity, SessionError> {
        match self.assertions.get(assertion) {
            Some(phone) if phone.is_empty() => Err(SessionError::Validation(
                "assertion carries no phone number".to_string(),
            )),
            Some(phone) => Ok(phone.clone()),
            None => Err(SessionError::IdentityUnverifiable(
                "unknown assertion".to_string(),
            )),
        }
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        if let Ok(mut now) = self.now.write() {
            *now += by;
        }
    }

    pub fn set(&self, to: DateTime<Utc>) {
        if let Ok(mut now) = self.now.write() {
            *now = to;
        }
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now
            .read()
            .map_or_else(|poisoned| *poisoned.into_inner(), |now| *now)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    fn doc(token: &str) -> Document {
        Document::from([("token".to_string(), Value::String(token.to_string()))])
    }

    #[tokio::test]
    async fn namespaces_are_disjoint() {
        let store = MemoryDocumentStore::new();
        store.set(Namespace::Sessions, "+1", doc("a")).await.unwrap();
        assert!(store.get(Namespace::Profiles, "+1").await.unwrap().is_none());
        assert_eq!(store.get(Namespace::Sessions, "+1").await.unwrap(), Some(doc("a")));
        assert_eq!(store.len(Namespace::Sessions), 1);

        store.delete(Namespace::Sessions, "+1").await.unwrap();
        store.delete(Namespace::Sessions, "+1").await.unwrap();
        assert!(store.get(Namespace::Sessions, "+1").await.unwrap().is_none());
        assert_eq!(
            store.stats(),
            StoreStats {
                reads: 3,
                writes: 1,
                deletes: 2
            }
        );
    }

    #[tokio::test]
    async fn outage_fails_every_call() {
        let store = MemoryDocumentStore::new();
        store.set_unavailable(true);
        let err = store.get(Namespace::Sessions, "+1").await.unwrap_err();
        assert_eq!(err.kind(), "store_unavailable");
        assert!(store.set(Namespace::Sessions, "+1", doc("a")).await.is_err());
        store.set_unavailable(false);
        assert!(store.get(Namespace::Sessions, "+1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn static_verifier() {
        let v = StaticIdentityVerifier::default()
            .with("good", "+15551234567")
            .with("phoneless", "");
        assert_eq!(v.verify("good").await.unwrap(), "+15551234567");
        assert_eq!(v.verify("phoneless").await.unwrap_err().kind(), "validation");
        assert_eq!(v.verify("nope").await.unwrap_err().kind(), "identity_unverifiable");
    }

    #[test]
    fn manual_clock_moves_on_demand() {
        let start = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let clock = ManualClock::new(start);
        clock.advance(Duration::hours(1));
        assert_eq!(clock.now(), start + Duration::hours(1));
        clock.set(start);
        assert_eq!(clock.now(), start);
    }
}
