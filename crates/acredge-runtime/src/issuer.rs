use acredge_api::{SessionError, SessionRecord};
use acredge_core::normalize_identity;

use crate::{IssuedSession, SessionAuthority};

impl SessionAuthority {
    /// Log an identity in.
    ///
    /// Returns the existing session when one is still live (`direct_login`); otherwise mints
    /// a token, overwrites the durable record with it and provisions a profile if none exists.
    /// Two concurrent logins for one identity race read-then-write; the later write wins.
    pub async fn login(
        &self,
        assertion: &str,
        remember_me: bool,
        same_whatsapp: bool,
    ) -> Result<IssuedSession, SessionError> {
        if assertion.trim().is_empty() {
            return Err(SessionError::Validation("assertion is required".to_string()));
        }

        let raw_phone = self.verifier.verify(assertion).await?;
        let identity = normalize_identity(&raw_phone)
            .map_err(|e| SessionError::IdentityUnverifiable(e.to_string()))?;

        let now = self.clock.now();
        match self.load_session(&identity).await {
            Ok(Some(existing)) if existing.is_live_at(now) => {
                tracing::info!(identity = %identity, direct_login = true, "session reused");
                return Ok(IssuedSession {
                    identity,
                    token: existing.token,
                    expires_at: existing.expires_at,
                    direct_login: true,
                });
            }
            Ok(_) => {}
            // About to be overwritten.
            Err(SessionError::CorruptRecord(e)) => {
                tracing::warn!(identity = %identity, error = %e, "replacing corrupt session record");
            }
            Err(e) => return Err(e),
        }

        let lifetime = chrono::Duration::from_std(self.policy.lifetime_for(remember_me))
            .map_err(|e| SessionError::Internal(format!("session lifetime out of range: {e}")))?;
        let minted = self
            .codec
            .mint(&identity, now, lifetime)
            .map_err(|e| SessionError::Internal(format!("token minting failed: {e}")))?;

        let record = SessionRecord {
            identity: identity.clone(),
            token: minted.token,
            expires_at: minted.expires_at,
        };
        self.save_session(&record).await?;

        match self.provision_profile(&identity, same_whatsapp, now).await {
            Ok(true) => tracing::info!(identity = %identity, "profile provisioned"),
            Ok(false) => {}
            Err(e) => tracing::warn!(
                identity = %identity,
                kind = e.kind(),
                error = %e,
                "profile provisioning skipped"
            ),
        }

        tracing::info!(identity = %identity, direct_login = false, remember_me, "session issued");
        Ok(IssuedSession {
            identity,
            token: record.token,
            expires_at: record.expires_at,
            direct_login: false,
        })
    }
}
