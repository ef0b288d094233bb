//! HTTP surface of the acredge session authority.
//!
//! Four routes under a configurable prefix (`/api/auth` by default):
//!
//! - `POST /login` issues or reuses a session and sets the session cookie
//! - `GET /check-login-status` reports the durable session state of an identity
//! - `POST /logout` revokes the presented session and clears the cookie
//! - `GET /check-auth` echoes the identity resolved by the authentication gate
//!
//! Every authentication failure answers with the same 401 body, whatever its cause.

#![forbid(unsafe_code)]

use std::sync::Arc;

use acredge_auth::CookieOptions;
use acredge_runtime::SessionAuthority;

pub mod bootstrap;
mod gate;
mod routes;

pub use gate::{AuthenticatedIdentity, require_session};
pub use routes::app;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub authority: Arc<SessionAuthority>,
    pub cookie: Arc<CookieOptions>,
}
