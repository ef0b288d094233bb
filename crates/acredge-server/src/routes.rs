use acredge_api::SessionError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::AppState;
use crate::gate::{AuthenticatedIdentity, credential_from_headers, require_session};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest {
    #[serde(alias = "idToken")]
    assertion: String,
    #[serde(default)]
    remember_me: bool,
    #[serde(default)]
    same_whatsapp: bool,
}

#[derive(Debug, Deserialize)]
struct StatusQuery {
    #[serde(alias = "phoneNumber")]
    identity: Option<String>,
}

/// Build the router. `route_prefix` of `""` or `"/"` mounts the routes at the root.
pub fn app(state: AppState, route_prefix: &str) -> Router {
    let gated = Router::new()
        .route("/check-auth", get(check_auth))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_session));

    let auth = Router::new()
        .route("/login", post(login))
        .route("/check-login-status", get(check_login_status))
        .route("/logout", post(logout))
        .merge(gated);

    let prefix = route_prefix.trim_end_matches('/');
    let router = if prefix.is_empty() {
        auth
    } else {
        Router::new().nest(prefix, auth)
    };

    router
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

pub(crate) fn unauthenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({"message": "Authentication failed"})),
    )
        .into_response()
}

fn respond(status: StatusCode, set_cookie: Option<String>, body: Value) -> Response {
    let mut resp = (status, Json(body)).into_response();
    if let Some(cookie) = set_cookie {
        match HeaderValue::from_str(&cookie) {
            Ok(v) => {
                resp.headers_mut().insert(header::SET_COOKIE, v);
            }
            Err(e) => {
                tracing::error!(error = %e, "unencodable Set-Cookie value");
                return internal_error();
            }
        }
    }
    resp
}

fn internal_error() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"message": "Internal server error"})),
    )
        .into_response()
}

fn session_cookie(state: &AppState, token: &str, max_age: u64) -> Option<String> {
    match acredge_auth::build_set_cookie(token, max_age, &state.cookie) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::error!(error = %e, "cannot build session cookie");
            None
        }
    }
}

fn clear_cookie(state: &AppState) -> Option<String> {
    match acredge_auth::build_clear_cookie(&state.cookie) {
        Ok(c) => Some(c),
        Err(e) => {
            tracing::error!(error = %e, "cannot build clearing cookie");
            None
        }
    }
}

async fn login(State(state): State<AppState>, payload: Result<Json<LoginRequest>, JsonRejection>) -> Response {
    let Json(req) = match payload {
        Ok(p) => p,
        Err(rejection) => {
            return respond(
                StatusCode::BAD_REQUEST,
                None,
                json!({"message": rejection.body_text()}),
            );
        }
    };

    match state
        .authority
        .login(&req.assertion, req.remember_me, req.same_whatsapp)
        .await
    {
        Ok(issued) => {
            let max_age = issued.remaining_secs(state.authority.now());
            let Some(cookie) = session_cookie(&state, &issued.token, max_age) else {
                return internal_error();
            };
            let message = if issued.direct_login {
                "Direct login successful"
            } else {
                "Logged in successfully"
            };
            respond(
                StatusCode::OK,
                Some(cookie),
                json!({"message": message, "directLogin": issued.direct_login}),
            )
        }
        Err(SessionError::Validation(msg)) => {
            tracing::debug!(error = %msg, "login rejected");
            respond(StatusCode::BAD_REQUEST, None, json!({"message": msg}))
        }
        Err(e @ SessionError::StoreUnavailable(_)) => {
            tracing::warn!(kind = e.kind(), error = %e, "login failed on store");
            let mut resp = respond(
                StatusCode::SERVICE_UNAVAILABLE,
                None,
                json!({"message": "Session store unavailable, retry shortly"}),
            );
            resp.headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from_static("1"));
            resp
        }
        Err(e @ SessionError::IdentityUnverifiable(_)) => {
            tracing::debug!(kind = e.kind(), error = %e, "login rejected");
            unauthenticated()
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "login failed");
            internal_error()
        }
    }
}

async fn check_login_status(
    State(state): State<AppState>,
    query: Result<Query<StatusQuery>, axum::extract::rejection::QueryRejection>,
) -> Response {
    let identity = match query {
        Ok(Query(StatusQuery { identity: Some(id) })) if !id.trim().is_empty() => {
            restore_plus(id)
        }
        _ => {
            return respond(
                StatusCode::BAD_REQUEST,
                None,
                json!({"message": "Phone number required"}),
            );
        }
    };

    // Status only. The stored token never leaves through this unauthenticated route.
    match state.authority.check_status(&identity).await {
        Ok(status) if status.is_valid() => respond(
            StatusCode::OK,
            None,
            json!({"message": "Auto-login successful", "requireLogin": false}),
        ),
        Ok(_) => respond(StatusCode::UNAUTHORIZED, None, json!({"requireLogin": true})),
        Err(SessionError::Validation(msg)) => {
            respond(StatusCode::BAD_REQUEST, None, json!({"message": msg}))
        }
        Err(e) => {
            tracing::warn!(kind = e.kind(), error = %e, "login status check failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                None,
                json!({"requireLogin": true}),
            )
        }
    }
}

/// Form decoding turns an unescaped `+` into a space.
fn restore_plus(raw: String) -> String {
    match raw.strip_prefix(' ') {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => format!("+{rest}"),
        _ => raw,
    }
}

async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let credential = credential_from_headers(&headers, &state.cookie.name);
    let token = credential.as_ref().map(|c| c.token.as_str());

    // The carrier is cleared on every outcome.
    let cleared = clear_cookie(&state);
    match state.authority.logout(token).await {
        Ok(revocation) if revocation.store_revoked => respond(
            StatusCode::OK,
            cleared,
            json!({"message": "Logged out successfully"}),
        ),
        Ok(_) => respond(
            StatusCode::INTERNAL_SERVER_ERROR,
            cleared,
            json!({"message": "Logout error occurred"}),
        ),
        Err(e) if e.is_unauthenticated() => {
            tracing::debug!(kind = e.kind(), "logout without a session");
            respond(
                StatusCode::UNAUTHORIZED,
                cleared,
                json!({"message": "Already logged out"}),
            )
        }
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "logout failed");
            respond(
                StatusCode::INTERNAL_SERVER_ERROR,
                cleared,
                json!({"message": "Logout error occurred"}),
            )
        }
    }
}

async fn check_auth(AuthenticatedIdentity(identity): AuthenticatedIdentity) -> Response {
    respond(
        StatusCode::OK,
        None,
        json!({
            "message": "Authenticated",
            "identity": identity,
            "user": {"phoneNumber": identity},
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::restore_plus;

    #[test]
    fn decoded_plus_is_restored() {
        assert_eq!(restore_plus(" 15551234567".to_string()), "+15551234567");
        assert_eq!(restore_plus("+15551234567".to_string()), "+15551234567");
        assert_eq!(restore_plus("  x".to_string()), "  x");
    }
}
