//! Authentication gate.

use acredge_api::Identity;
use acredge_auth::{Credential, extract_credential};
use axum::extract::{FromRequestParts, Request, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::AppState;
use crate::routes::unauthenticated;

/// Identity admitted by [`require_session`]. Handlers behind the gate extract this instead
/// of looking at tokens themselves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedIdentity(pub Identity);

impl<S: Send + Sync> FromRequestParts<S> for AuthenticatedIdentity {
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedIdentity>()
            .cloned()
            .ok_or_else(unauthenticated)
    }
}

/// Middleware admitting only requests whose credential authenticates.
pub async fn require_session(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let credential = credential_from_headers(req.headers(), &state.cookie.name);
    let token = credential.as_ref().map(|c| c.token.as_str());

    match state.authority.authenticate(token).await {
        Ok(identity) => {
            req.extensions_mut().insert(AuthenticatedIdentity(identity));
            next.run(req).await
        }
        Err(_) => unauthenticated().into_response(),
    }
}

pub(crate) fn credential_from_headers(headers: &HeaderMap, cookie_name: &str) -> Option<Credential> {
    // HTTP/2 clients may split cookies across several headers.
    let cookies = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let credential = extract_credential(
        (!cookies.is_empty()).then_some(cookies.as_str()),
        authorization,
        cookie_name,
    );
    if let Some(c) = &credential {
        tracing::trace!(source = c.source.as_str(), "credential presented");
    }
    credential
}

#[cfg(test)]
mod tests {
    use super::*;
    use acredge_auth::CredentialSource;
    use axum::http::HeaderValue;

    #[test]
    fn split_cookie_headers_are_joined() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("token=abc"));
        let c = credential_from_headers(&headers, "token").unwrap();
        assert_eq!(c.token, "abc");
        assert_eq!(c.source, CredentialSource::Cookie);
    }

    #[test]
    fn bearer_header_is_read() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer xyz"));
        let c = credential_from_headers(&headers, "token").unwrap();
        assert_eq!(c.source, CredentialSource::Bearer);
        assert!(credential_from_headers(&HeaderMap::new(), "token").is_none());
    }
}
