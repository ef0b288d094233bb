use acredge_api::SessionError;
use acredge_core::normalize_identity;

use crate::{SessionAuthority, SessionStatus};

impl SessionAuthority {
    /// Report the authoritative session state of an identity for silent recovery.
    ///
    /// Reads the durable store only. An expired record is deleted before being reported
    /// as invalid.
    pub async fn check_status(&self, identity: &str) -> Result<SessionStatus, SessionError> {
        let identity = normalize_identity(identity)?;

        let record = match self.load_session(&identity).await {
            Ok(record) => record,
            Err(SessionError::CorruptRecord(e)) => {
                tracing::warn!(identity = %identity, error = %e, "corrupt session record");
                None
            }
            Err(e) => return Err(e),
        };

        let record = match record {
            Some(r) if r.is_live_at(self.clock.now()) => Some(r),
            Some(expired) => {
                self.lazy_delete(&identity, &expired.token).await;
                None
            }
            None => None,
        };

        Ok(SessionStatus { identity, record })
    }
}

#[cfg(test)]
mod tests {
    use crate::testutil::{Fixture, PHONE};
    use chrono::Duration;

    #[tokio::test]
    async fn live_session_is_reported_with_token() {
        let fx = Fixture::new();
        let issued = fx.authority.login("good", true, false).await.unwrap();

        let status = fx.authority.check_status("+1 555 123 4567").await.unwrap();
        assert!(status.is_valid());
        assert_eq!(status.token(), Some(issued.token.as_str()));
    }

    #[tokio::test]
    async fn expired_session_is_deleted_and_invalid() {
        let fx = Fixture::new();
        fx.authority.login("good", false, false).await.unwrap();
        fx.clock.advance(Duration::hours(24));

        let status = fx.authority.check_status(PHONE).await.unwrap();
        assert!(!status.is_valid());
        assert_eq!(fx.store.stats().deletes, 1);
        assert!(fx.authority.load_session(PHONE).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unknown_identity_and_bad_input() {
        let fx = Fixture::new();
        assert!(!fx.authority.check_status(PHONE).await.unwrap().is_valid());
        assert_eq!(
            fx.authority.check_status("not-a-phone").await.unwrap_err().kind(),
            "validation"
        );
    }

    #[tokio::test]
    async fn bypasses_the_cache() {
        let fx = Fixture::new();
        let issued = fx.authority.login("good", false, false).await.unwrap();
        fx.authority.authenticate(Some(&issued.token)).await.unwrap();
        let reads = fx.store.stats().reads;

        fx.authority.check_status(PHONE).await.unwrap();
        assert_eq!(fx.store.stats().reads, reads + 1);
    }
}
