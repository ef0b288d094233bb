use acredge_api::SessionError;
use acredge_auth::peek_identity;

use crate::{Revocation, SessionAuthority};

impl SessionAuthority {
    /// Revoke the session of the identity a token names.
    ///
    /// A signature-valid token revokes even after it has expired. A token whose signature
    /// fails still names an identity, but only removes that identity's record when the
    /// record holds exactly the presented token; otherwise nothing is revoked and the
    /// token is rejected. The durable delete runs first; the cache is evicted whether or
    /// not it succeeded.
    pub async fn logout(&self, token: Option<&str>) -> Result<Revocation, SessionError> {
        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(SessionError::NotLoggedIn)?;

        let (identity, unverified) = match self.codec.verify_signature(token) {
            Ok(claims) => (claims.phone_number, None),
            Err(e) => match peek_identity(token) {
                Some(identity) => {
                    tracing::debug!(identity = %identity, error = %e, "logout with unverified token");
                    (identity, Some(e))
                }
                None => {
                    tracing::debug!(error = %e, "logout with unreadable token");
                    return Err(e.into_credential_error());
                }
            },
        };

        let store_result = if unverified.is_none() {
            self.delete_session(&identity).await.map(|()| true)
        } else {
            self.delete_session_if_current(&identity, token).await
        };
        self.cache.evict(&identity);

        let store_revoked = match store_result {
            Ok(true) => true,
            Ok(false) => {
                tracing::debug!(identity = %identity, "unverified token is not the current session");
                return Err(unverified.map_or(
                    SessionError::SessionMismatch,
                    acredge_auth::Error::into_credential_error,
                ));
            }
            Err(e) => {
                tracing::warn!(
                    identity = %identity,
                    kind = e.kind(),
                    error = %e,
                    "durable session delete failed; cache evicted"
                );
                false
            }
        };

        tracing::info!(identity = %identity, store_revoked, "session revoked");
        Ok(Revocation {
            identity,
            store_revoked,
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{Fixture, PHONE};
    use acredge_api::TokenCache;
    use acredge_auth::TokenCodec;
    use chrono::Duration;

    #[tokio::test]
    async fn logout_removes_both_layers() {
        let fx = Fixture::new();
        let issued = fx.authority.login("good", false, false).await.unwrap();
        fx.authority.authenticate(Some(&issued.token)).await.unwrap();
        assert!(fx.cache.get(PHONE).is_some());

        let revoked = fx.authority.logout(Some(&issued.token)).await.unwrap();
        assert!(revoked.store_revoked);
        assert!(fx.cache.get(PHONE).is_none());
        assert!(fx.authority.load_session(PHONE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_token_still_logs_out() {
        let fx = Fixture::new();
        let issued = fx.authority.login("good", false, false).await.unwrap();
        fx.clock.advance(Duration::days(2));

        let revoked = fx.authority.logout(Some(&issued.token)).await.unwrap();
        assert_eq!(revoked.identity, PHONE);
        assert!(fx.authority.load_session(PHONE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn forged_token_cannot_revoke_someone_else() {
        let fx = Fixture::new();
        fx.authority.login("good", false, false).await.unwrap();
        let forged = TokenCodec::from_secret(b"attacker-secret-attacker-secret!!")
            .mint(PHONE, fx.start(), Duration::hours(1))
            .unwrap();

        let err = fx.authority.logout(Some(&forged.token)).await.unwrap_err();
        assert_eq!(err.kind(), "invalid_credential");
        assert!(fx.authority.load_session(PHONE).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn unverified_current_token_still_revokes() {
        let fx = Fixture::new();
        let forged = TokenCodec::from_secret(b"rotated-secret-rotated-secret-0000")
            .mint(PHONE, fx.start(), Duration::hours(1))
            .unwrap();
        fx.authority
            .save_session(&acredge_api::SessionRecord {
                identity: PHONE.to_string(),
                token: forged.token.clone(),
                expires_at: forged.expires_at,
            })
            .await
            .unwrap();

        let revoked = fx.authority.logout(Some(&forged.token)).await.unwrap();
        assert!(revoked.store_revoked);
        assert!(fx.authority.load_session(PHONE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn store_failure_still_evicts_cache() {
        let fx = Fixture::new();
        let issued = fx.authority.login("good", false, false).await.unwrap();
        fx.authority.authenticate(Some(&issued.token)).await.unwrap();

        fx.store.set_unavailable(true);
        let revoked = fx.authority.logout(Some(&issued.token)).await.unwrap();
        assert!(!revoked.store_revoked);
        assert!(fx.cache.get(PHONE).is_none());
    }

    #[tokio::test]
    async fn nothing_to_log_out() {
        let fx = Fixture::new();
        assert_eq!(fx.authority.logout(None).await.unwrap_err().kind(), "not_logged_in");
        assert_eq!(
            fx.authority.logout(Some("random-bytes")).await.unwrap_err().kind(),
            "invalid_credential"
        );
        assert_eq!(fx.store.stats().total(), 0);
    }
}
