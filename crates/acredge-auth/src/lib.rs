//! acredge-auth
//!
//! Credential plumbing for the acredge session authority:
//!
//! - **Minting and verifying session tokens** (`TokenCodec`, HS256, pure and I/O free)
//! - **Caching the current token per identity** (`MemoryTokenCache`, TTL-bounded, clock-injected)
//! - **Carrying credentials** over cookies or `Authorization: Bearer` headers
//! - **Verifying upstream identity assertions** against a JWKS (`JwksIdentityVerifier`)
//!
//! ## Quick start
//! ```no_run
//! use acredge_auth::TokenCodec;
//! use chrono::{Duration, Utc};
//!
//! # fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let codec = TokenCodec::from_secret(b"a-long-random-server-held-secret!");
//! let minted = codec.mint("+15551234567", Utc::now(), Duration::hours(24))?;
//! let claims = codec.verify(&minted.token, Utc::now())?;
//! assert_eq!(claims.phone_number, "+15551234567");
//! # Ok(()) }
//! ```

#![forbid(unsafe_code)]

mod cache;
mod codec;
mod cookie;
mod credential;
mod error;
mod jwks;

pub use cache::MemoryTokenCache;
pub use codec::{MintedToken, SessionClaims, TokenCodec, peek_identity};
pub use cookie::{CookieOptions, SameSite, build_clear_cookie, build_set_cookie, read_cookie};
pub use credential::{Credential, CredentialSource, extract_credential};
pub use error::{Error, Result};
pub use jwks::{Jwk, JwksIdentityVerifier, JwksSet, JwksSource, VerifyOptions};
