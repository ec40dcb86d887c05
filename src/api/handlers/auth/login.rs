//! Login: throttle check, password check, and TOTP check composed into a
//! single request.
//!
//! Both factors are submitted together; every terminal outcome other than
//! success leaves the pessimistic failure row from the throttle in place,
//! so the attempt log stays append-only and complete.

use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::authn::{
    password::verify_password,
    throttle::{LoginThrottle, ThrottleDecision},
};

use super::{
    error::AuthError,
    session::session_cookie,
    state::AuthState,
    storage::{self, UserRecord},
    types::{AuthenticatedUserResponse, ErrorResponse, LoginRequest, UserResponse},
    utils::extract_client_ip,
};

/// Outcome of the shared throttle + password preamble used by login and
/// two-factor recovery.
pub(super) struct FirstFactor {
    pub(super) user: UserRecord,
    pub(super) attempt_id: Uuid,
}

/// Run the throttle check and the password check, recording the attempt.
///
/// Unknown users and wrong passwords both yield `Unauthorized`; the caller
/// never learns which. Lockout is reported distinctly as `TooManyAttempts`.
pub(super) async fn check_first_factor(
    pool: &PgPool,
    headers: &HeaderMap,
    user_name: &str,
    password: &SecretString,
) -> Result<(LoginThrottle, FirstFactor), AuthError> {
    let client_ip = extract_client_ip(headers);
    let throttle = LoginThrottle::new(pool.clone());

    let decision = throttle.register_attempt(client_ip.as_deref()).await?;
    let ThrottleDecision::Allowed { attempt_id } = decision else {
        return Err(AuthError::TooManyAttempts);
    };

    let Some(user) = storage::lookup_user_by_name(pool, user_name).await? else {
        return Err(AuthError::Unauthorized);
    };
    if !verify_password(password.expose_secret(), &user.password_hash) {
        return Err(AuthError::Unauthorized);
    }

    Ok((throttle, FirstFactor { user, attempt_id }))
}

#[utoipa::path(
    post,
    path = "/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated; session cookie set", body = AuthenticatedUserResponse),
        (status = 401, description = "Unauthorized or locked out", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let (throttle, first_factor) =
        check_first_factor(&pool, &headers, &request.user_name, &request.password).await?;
    let FirstFactor { user, attempt_id } = first_factor;

    if !auth_state
        .provisioner()
        .verify_current(&user.totp_secret, &request.otp_code)
    {
        return Err(AuthError::Unauthorized);
    }

    let token =
        storage::insert_session(&pool, user.id, auth_state.config().session_ttl_seconds()).await?;
    throttle.record_success(attempt_id).await?;

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(auth_state.config(), &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }

    Ok((
        StatusCode::OK,
        response_headers,
        Json(AuthenticatedUserResponse {
            user: UserResponse::from(user),
        }),
    )
        .into_response())
}
