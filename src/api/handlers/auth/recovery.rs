//! Two-factor recovery: a single-use backup code substitutes for the TOTP
//! factor, and the TOTP secret rotates so the authenticator must re-enroll.
//!
//! Throttled identically to login. The code redemption and the secret
//! rotation share one transaction: either the code is spent and the secret
//! replaced, or neither happened.

use anyhow::{Context, anyhow};
use axum::{
    Json,
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use sqlx::PgPool;
use std::sync::Arc;

use crate::authn::backup_codes::{digest_backup_code, normalize_backup_code};

use super::{
    error::AuthError,
    login::{FirstFactor, check_first_factor},
    state::AuthState,
    storage,
    types::{ErrorResponse, RecoveryRequest, RecoveryResponse, UserResponse},
};

#[utoipa::path(
    post,
    path = "/two_factor_recovery",
    request_body = RecoveryRequest,
    responses(
        (status = 200, description = "Code redeemed; new provisioning URI returned", body = RecoveryResponse),
        (status = 401, description = "Unauthorized or locked out", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn two_factor_recovery(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<RecoveryRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };

    let (throttle, first_factor) =
        check_first_factor(&pool, &headers, &request.user_name, &request.password).await?;
    let FirstFactor { user, attempt_id } = first_factor;

    // Codes that cannot normalize can never match a minted code; same
    // uniform rejection as an unknown or spent code.
    let Some(normalized) = normalize_backup_code(&request.backup_code) else {
        return Err(AuthError::Unauthorized);
    };
    let code_digest = digest_backup_code(&normalized);

    let mut tx = pool.begin().await.context("begin recovery transaction")?;
    if storage::redeem_backup_code(&mut tx, user.id, &code_digest)
        .await?
        .is_none()
    {
        // Dropping the transaction rolls it back; nothing was spent.
        return Err(AuthError::Unauthorized);
    }

    let provisioned = auth_state
        .provisioner()
        .provision(&user.user_name)
        .map_err(|err| AuthError::Storage(anyhow!("TOTP provisioning failed: {err}")))?;
    storage::rotate_totp_secret(&mut tx, user.id, &provisioned.secret_base32).await?;
    let remaining = storage::count_unused_backup_codes(&mut tx, user.id).await?;
    tx.commit().await.context("commit recovery transaction")?;

    throttle.record_success(attempt_id).await?;

    Ok((
        StatusCode::OK,
        Json(RecoveryResponse {
            provisioning_descriptor: provisioned.otpauth_url,
            user: UserResponse::from(user),
            remaining_backup_codes: remaining,
        }),
    )
        .into_response())
}
