//! Session check and logout, plus the cookie plumbing shared with login.

use axum::{
    Json,
    extract::Extension,
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, InvalidHeaderValue, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use super::{
    error::AuthError,
    state::{AuthConfig, AuthState},
    storage::{self, SessionRecord},
    types::{AuthenticatedUserResponse, MessageResponse, UserResponse},
    utils::hash_session_token,
};

const SESSION_COOKIE_NAME: &str = "moneymagnet_session";

/// Resolve the session cookie (or bearer token) to the signed-in user.
#[utoipa::path(
    get,
    path = "/check_session",
    responses(
        (status = 200, description = "Session is active", body = AuthenticatedUserResponse),
        (status = 401, description = "No active session", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn check_session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
) -> Result<Response, AuthError> {
    let Some(token) = extract_session_token(&headers) else {
        return Ok(not_authenticated());
    };
    // Only the digest is ever compared against the database.
    let token_hash = hash_session_token(&token);

    let Some(SessionRecord { user_id }) = storage::lookup_session(&pool, &token_hash).await? else {
        return Ok(not_authenticated());
    };
    let Some(user) = storage::fetch_user_by_id(&pool, user_id).await? else {
        return Ok(not_authenticated());
    };

    Ok((
        StatusCode::OK,
        Json(AuthenticatedUserResponse {
            user: UserResponse::from(user),
        }),
    )
        .into_response())
}

/// Clear the session; idempotent whether or not a session row existed.
#[utoipa::path(
    delete,
    path = "/logout",
    responses(
        (status = 200, description = "Session cleared", body = MessageResponse)
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
) -> Response {
    if let Some(token) = extract_session_token(&headers) {
        let token_hash = hash_session_token(&token);
        if let Err(err) = storage::delete_session(&pool, &token_hash).await {
            error!("failed to delete session: {err:#}");
        }
    }

    // Always clear the cookie, even if the session row was already gone.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(auth_state.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
        .into_response()
}

fn not_authenticated() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(MessageResponse {
            message: "Not authenticated".to_string(),
        }),
    )
        .into_response()
}

/// Build the `HttpOnly` session cookie for a raw token.
pub(super) fn session_cookie(
    config: &AuthConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if config.session_cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        let trimmed = pair.trim();
        let mut parts = trimmed.splitn(2, '=');
        let key = parts.next()?.trim();
        let val = parts.next()?.trim();
        if key == SESSION_COOKIE_NAME && !val.is_empty() {
            return Some(val.to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?;
    let value = header.to_str().ok()?;
    let token = value.strip_prefix("Bearer ")?.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
