use acredge_api::{Identity, SessionError};

use crate::SessionAuthority;

impl SessionAuthority {
    /// Admit a presented token, or reject it.
    ///
    /// Every failure, a store outage included, denies. The error kind is for logs; callers
    /// should treat all of them as one unauthenticated outcome.
    pub async fn authenticate(&self, token: Option<&str>) -> Result<Identity, SessionError> {
        let result = self.authenticate_inner(token).await;
        if let Err(e) = &result {
            match e {
                SessionError::StoreUnavailable(_) | SessionError::CorruptRecord(_) => {
                    tracing::warn!(kind = e.kind(), error = %e, "authentication failed closed");
                }
                _ => tracing::debug!(kind = e.kind(), "authentication rejected"),
            }
        }
        result
    }

    async fn authenticate_inner(&self, token: Option<&str>) -> Result<Identity, SessionError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::NoCredential)?;

        // Pure check first: nothing that fails here reaches the cache or the store.
        let claims = self
            .codec
            .verify(token, self.clock.now())
            .map_err(acredge_auth::Error::into_credential_error)?;
        let identity = claims.phone_number;

        if self.cache.get(&identity).as_deref() == Some(token) {
            return Ok(identity);
        }

        // Read before the store so a logout landing in between is detectable.
        let generation = self.cache.generation();
        let record = self
            .load_session(&identity)
            .await?
            .ok_or(SessionError::SessionNotFound)?;

        if !record.is_live_at(self.clock.now()) {
            self.lazy_delete(&identity, &record.token).await;
            return Err(SessionError::Expired);
        }
        if record.token != token {
            return Err(SessionError::SessionMismatch);
        }

        if !self.cache.put_if_current(&identity, token, generation) {
            tracing::debug!(identity = %identity, "cache fill skipped after concurrent eviction");
        }
        Ok(identity)
    }
}
