use acredge_api::{Namespace, ProfileRecord, SessionError, SessionRecord};
use chrono::{DateTime, Utc};

use crate::SessionAuthority;

impl SessionAuthority {
    pub(crate) async fn load_session(
        &self,
        identity: &str,
    ) -> Result<Option<SessionRecord>, SessionError> {
        self.store
            .get(Namespace::Sessions, identity)
            .await?
            .map(|doc| SessionRecord::from_document(identity, doc))
            .transpose()
    }

    pub(crate) async fn save_session(&self, record: &SessionRecord) -> Result<(), SessionError> {
        self.store
            .set(Namespace::Sessions, &record.identity, record.to_document()?)
            .await
    }

    pub(crate) async fn delete_session(&self, identity: &str) -> Result<(), SessionError> {
        self.store.delete(Namespace::Sessions, identity).await
    }

    /// Delete the record only while it still holds `token`. Returns whether it did.
    pub(crate) async fn delete_session_if_current(
        &self,
        identity: &str,
        token: &str,
    ) -> Result<bool, SessionError> {
        match self.load_session(identity).await {
            Ok(Some(record)) if record.token == token => {
                self.delete_session(identity).await?;
                Ok(true)
            }
            Ok(_) | Err(SessionError::CorruptRecord(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Delete a record already observed to be expired, unless a newer session has replaced
    /// it since. Failures are logged only; the record is logically absent either way.
    pub(crate) async fn lazy_delete(&self, identity: &str, expired_token: &str) {
        match self.delete_session_if_current(identity, expired_token).await {
            Ok(true) => tracing::debug!(identity, "removed expired session record"),
            Ok(false) => tracing::debug!(identity, "expired session already replaced"),
            Err(e) => tracing::warn!(identity, kind = e.kind(), error = %e, "lazy expiry delete failed"),
        }
    }

    /// Create the profile record if none exists. Never overwrites.
    pub(crate) async fn provision_profile(
        &self,
        identity: &str,
        same_whatsapp: bool,
        now: DateTime<Utc>,
    ) -> Result<bool, SessionError> {
        if self.store.get(Namespace::Profiles, identity).await?.is_some() {
            return Ok(false);
        }
        let profile = ProfileRecord::with_defaults(identity, same_whatsapp, now);
        self.store
            .set(Namespace::Profiles, identity, profile.to_document()?)
            .await?;
        Ok(true)
    }
}
