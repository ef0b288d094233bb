//! Error types.

use acredge_api::SessionError;
use thiserror::Error;

/// Crate result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Token is malformed or missing required fields.
    #[error("invalid JWT: {0}")]
    InvalidJwt(String),

    /// Signature does not match the payload.
    #[error("JWT signature mismatch")]
    BadSignature,

    /// Embedded expiry has passed.
    #[error("JWT expired")]
    Expired,

    /// Algorithm is not in the allow-list.
    #[error("unsupported JWT algorithm: {0:?}")]
    UnsupportedAlg(jsonwebtoken::Algorithm),

    /// Unable to fetch, parse, or use a JWKS.
    #[error("JWKS error: {0}")]
    Jwks(String),

    /// The JWKS does not contain a usable key for the token.
    #[error("no suitable key found in JWKS")]
    NoMatchingKey,

    /// Claims or options failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An error occurred while performing HTTP requests.
    #[cfg(feature = "fetch-reqwest")]
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    /// JSON parsing error.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// jsonwebtoken error.
    #[error(transparent)]
    Jwt(#[from] jsonwebtoken::errors::Error),
}

impl Error {
    /// Classify a failure to verify a presented session token.
    pub fn into_credential_error(self) -> SessionError {
        match self {
            Error::Expired => SessionError::Expired,
            other => SessionError::InvalidCredential(other.to_string()),
        }
    }
}
