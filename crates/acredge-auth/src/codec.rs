//! Session token minting and verification.

use crate::{Error, Result};

use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};

/// Claims embedded in every session token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionClaims {
    /// Normalized phone number the session belongs to.
    pub phone_number: String,
    /// Issued-at, seconds since the epoch.
    pub iat: i64,
    /// Absolute expiry, seconds since the epoch.
    pub exp: i64,
}

impl SessionClaims {
    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A freshly minted token together with the instants it embeds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintedToken {
    pub token: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// HS256 codec keyed by a server-held secret.
///
/// Both operations take the current instant from the caller so the codec stays free of
/// clocks and I/O.
#[derive(Clone)]
pub struct TokenCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
}

impl std::fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCodec").finish_non_exhaustive()
    }
}

impl TokenCodec {
    pub fn from_secret(secret: &[u8]) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
        }
    }

    /// Mint a token for `identity` valid for `lifetime` from `now`.
    ///
    /// `now` is truncated to whole seconds, so the returned `expires_at` equals the
    /// embedded `exp` exactly.
    pub fn mint(&self, identity: &str, now: DateTime<Utc>, lifetime: Duration) -> Result<MintedToken> {
        if identity.is_empty() {
            return Err(Error::Validation("identity must not be empty".to_string()));
        }
        if lifetime <= Duration::zero() {
            return Err(Error::Validation("lifetime must be positive".to_string()));
        }

        let iat = now.timestamp();
        let exp = iat + lifetime.num_seconds();
        let claims = SessionClaims {
            phone_number: identity.to_string(),
            iat,
            exp,
        };
        let token = jsonwebtoken::encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;

        Ok(MintedToken {
            token,
            issued_at: DateTime::from_timestamp(iat, 0).unwrap_or(now),
            expires_at: claims.expires_at(),
        })
    }

    /// Verify signature and expiry. A token is expired once `now` reaches `exp`.
    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> Result<SessionClaims> {
        let claims = self.verify_signature(token)?;
        if claims.exp <= now.timestamp() {
            return Err(Error::Expired);
        }
        Ok(claims)
    }

    /// Verify the signature only, accepting tokens whose expiry has passed.
    pub fn verify_signature(&self, token: &str) -> Result<SessionClaims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        // Expiry is compared against the caller's clock in `verify`.
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.set_required_spec_claims(&["exp"]);

        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding, &validation)
            .map_err(map_jwt_error)?;
        if data.claims.phone_number.is_empty() {
            return Err(Error::InvalidJwt("empty phoneNumber claim".to_string()));
        }
        Ok(data.claims)
    }
}

fn map_jwt_error(e: jsonwebtoken::errors::Error) -> Error {
    match e.kind() {
        ErrorKind::InvalidSignature => Error::BadSignature,
        ErrorKind::ExpiredSignature => Error::Expired,
        ErrorKind::InvalidAlgorithm => Error::UnsupportedAlg(Algorithm::HS256),
        _ => Error::InvalidJwt(e.to_string()),
    }
}

/// Read the identity claim from a token's payload without checking the signature.
///
/// Only for revocation paths, where the claim selects which record to look at and is
/// never trusted as proof of anything.
pub fn peek_identity(token: &str) -> Option<String> {
    #[derive(Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Payload {
        phone_number: String,
    }

    let mut parts = token.split('.');
    let (_header, payload, _sig) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() {
        return None;
    }
    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload)
        .ok()?;
    let payload: Payload = serde_json::from_slice(&bytes).ok()?;
    (!payload.phone_number.is_empty()).then_some(payload.phone_number)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"test-secret-test-secret-test-secret";
    const PHONE: &str = "+15551234567";

    fn now() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn mint_then_verify_yields_identity() {
        let codec = TokenCodec::from_secret(SECRET);
        let minted = codec.mint(PHONE, now(), Duration::hours(24)).unwrap();
        assert_eq!(minted.expires_at, now() + Duration::hours(24));

        let claims = codec.verify(&minted.token, now()).unwrap();
        assert_eq!(claims.phone_number, PHONE);
        assert_eq!(claims.iat, now().timestamp());
        assert_eq!(claims.expires_at(), minted.expires_at);
    }

    #[test]
    fn minting_is_deterministic() {
        let codec = TokenCodec::from_secret(SECRET);
        let a = codec.mint(PHONE, now(), Duration::days(7)).unwrap();
        let b = codec.mint(PHONE, now(), Duration::days(7)).unwrap();
        assert_eq!(a, b);
        let later = codec.mint(PHONE, now() + Duration::seconds(1), Duration::days(7)).unwrap();
        assert_ne!(a.token, later.token);
    }

    #[test]
    fn expiry_is_enforced_at_the_boundary() {
        let codec = TokenCodec::from_secret(SECRET);
        let minted = codec.mint(PHONE, now(), Duration::seconds(10)).unwrap();
        assert!(codec.verify(&minted.token, now() + Duration::seconds(9)).is_ok());
        assert!(matches!(
            codec.verify(&minted.token, now() + Duration::seconds(10)),
            Err(Error::Expired)
        ));
        // Signature alone still verifies.
        assert!(codec.verify_signature(&minted.token).is_ok());
    }

    #[test]
    fn foreign_secret_is_a_signature_failure() {
        let minted = TokenCodec::from_secret(b"another-secret-another-secret-xx")
            .mint(PHONE, now(), Duration::hours(1))
            .unwrap();
        let codec = TokenCodec::from_secret(SECRET);
        assert!(matches!(codec.verify(&minted.token, now()), Err(Error::BadSignature)));
    }

    #[test]
    fn garbage_is_invalid() {
        let codec = TokenCodec::from_secret(SECRET);
        assert!(matches!(
            codec.verify("q8\u{1}zz-not-a-token", now()),
            Err(Error::InvalidJwt(_))
        ));
        assert!(matches!(codec.verify("", now()), Err(Error::InvalidJwt(_))));
    }

    #[test]
    fn rejects_empty_identity_and_lifetime() {
        let codec = TokenCodec::from_secret(SECRET);
        assert!(codec.mint("", now(), Duration::hours(1)).is_err());
        assert!(codec.mint(PHONE, now(), Duration::zero()).is_err());
    }

    #[test]
    fn peek_reads_payload_of_foreign_tokens() {
        let minted = TokenCodec::from_secret(b"another-secret-another-secret-xx")
            .mint(PHONE, now(), Duration::hours(1))
            .unwrap();
        assert_eq!(peek_identity(&minted.token).as_deref(), Some(PHONE));
        assert_eq!(peek_identity("a.b"), None);
        assert_eq!(peek_identity("a.%%%.c"), None);
    }

    #[test]
    fn credential_classification() {
        assert_eq!(Error::Expired.into_credential_error().kind(), "expired");
        assert_eq!(
            Error::BadSignature.into_credential_error().kind(),
            "invalid_credential"
        );
    }
}
