//! Account creation: a new household with its admin, or a member joining an
//! existing household by name and admission key.

use axum::{
    Json,
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secrecy::{ExposeSecret, SecretString};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, warn};

use crate::authn::{
    backup_codes::BackupCodeBatch,
    password::{PasswordError, hash_password, verify_password},
};

use super::{
    error::AuthError,
    state::AuthState,
    storage::{self, CreationOutcome, NewUser},
    types::{AccountCreatedResponse, CreateAccountRequest, ErrorResponse, UserResponse},
    utils::valid_email,
};

/// Create a household and its admin user, with TOTP enrollment and a
/// backup-code batch, as one atomic unit.
#[utoipa::path(
    post,
    path = "/create_super_user",
    request_body = CreateAccountRequest,
    responses(
        (status = 200, description = "Household and admin user created", body = AccountCreatedResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 402, description = "Account creation failed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn create_super_user(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateAccountRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };
    validate(&request)?;

    let password_hash = hash_secret_input(&request.password, "password")?;
    let admission_key_hash = hash_secret_input(&request.key, "key")?;
    let provisioned = provision_totp(&auth_state, &request.user_name)?;
    let batch = BackupCodeBatch::generate();

    let new_user = NewUser {
        user_name: request.user_name.trim(),
        password_hash: &password_hash,
        is_admin: true,
        first_name: request.first_name.trim(),
        last_name: request.last_name.trim(),
        email: &request.email,
        date_of_birth: request.date_of_birth,
        totp_secret: &provisioned.secret_base32,
    };

    let outcome = storage::create_household_with_admin(
        &pool,
        request.household_name.trim(),
        &admission_key_hash,
        &new_user,
        &batch.digests,
    )
    .await
    .map_err(|err| {
        error!("account creation failed: {err:#}");
        AuthError::AccountCreationFailed
    })?;

    created_response(outcome, provisioned.otpauth_url, batch.codes)
}

/// Create a member of an existing household. The household is resolved by
/// name and the admission key is treated as a lookup credential: a missing
/// household and a wrong key produce the same generic failure.
#[utoipa::path(
    post,
    path = "/create_user",
    request_body = CreateAccountRequest,
    responses(
        (status = 200, description = "Member created", body = AccountCreatedResponse),
        (status = 400, description = "Malformed request", body = ErrorResponse),
        (status = 402, description = "Account creation failed", body = ErrorResponse)
    ),
    tag = "auth"
)]
pub async fn create_user(
    pool: Extension<PgPool>,
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<CreateAccountRequest>>,
) -> Result<Response, AuthError> {
    let Some(Json(request)) = payload else {
        return Err(AuthError::InvalidInput("Missing payload".to_string()));
    };
    validate(&request)?;

    let household = storage::lookup_household(&pool, request.household_name.trim())
        .await
        .map_err(|err| {
            error!("household lookup failed: {err:#}");
            AuthError::AccountCreationFailed
        })?;
    let Some(household) = household else {
        warn!("member creation for unknown household");
        return Err(AuthError::AccountCreationFailed);
    };
    if !verify_password(request.key.expose_secret(), &household.admission_key_hash) {
        warn!("member creation with wrong admission key");
        return Err(AuthError::AccountCreationFailed);
    }

    let password_hash = hash_secret_input(&request.password, "password")?;
    let provisioned = provision_totp(&auth_state, &request.user_name)?;
    let batch = BackupCodeBatch::generate();

    let new_user = NewUser {
        user_name: request.user_name.trim(),
        password_hash: &password_hash,
        is_admin: false,
        first_name: request.first_name.trim(),
        last_name: request.last_name.trim(),
        email: &request.email,
        date_of_birth: request.date_of_birth,
        totp_secret: &provisioned.secret_base32,
    };

    let outcome = storage::create_member(&pool, household.id, &new_user, &batch.digests)
        .await
        .map_err(|err| {
            error!("member creation failed: {err:#}");
            AuthError::AccountCreationFailed
        })?;

    created_response(outcome, provisioned.otpauth_url, batch.codes)
}

fn validate(request: &CreateAccountRequest) -> Result<(), AuthError> {
    let required = [
        (&request.household_name, "household_name"),
        (&request.user_name, "user_name"),
        (&request.first_name, "first_name"),
        (&request.last_name, "last_name"),
    ];
    for (value, field) in required {
        if value.trim().is_empty() {
            return Err(AuthError::InvalidInput(format!(
                "{field} must not be empty"
            )));
        }
    }
    if !valid_email(&request.email) {
        return Err(AuthError::InvalidInput("email is not valid".to_string()));
    }
    Ok(())
}

fn hash_secret_input(value: &SecretString, field: &str) -> Result<String, AuthError> {
    hash_password(value.expose_secret()).map_err(|err| match err {
        PasswordError::Empty => AuthError::InvalidInput(format!("{field} must not be empty")),
        PasswordError::Hash => AuthError::Storage(anyhow::anyhow!("failed to hash {field}")),
    })
}

fn provision_totp(
    auth_state: &AuthState,
    user_name: &str,
) -> Result<crate::authn::totp::Provisioned, AuthError> {
    auth_state
        .provisioner()
        .provision(user_name.trim())
        .map_err(|err| AuthError::Storage(anyhow::anyhow!("TOTP provisioning failed: {err}")))
}

fn created_response(
    outcome: CreationOutcome,
    provisioning_descriptor: String,
    backup_codes: Vec<String>,
) -> Result<Response, AuthError> {
    match outcome {
        CreationOutcome::Created(user) => Ok((
            StatusCode::OK,
            Json(AccountCreatedResponse {
                provisioning_descriptor,
                user: UserResponse::from(user),
                backup_codes,
            }),
        )
            .into_response()),
        CreationOutcome::Conflict => {
            warn!("account creation conflict on household or user name");
            Err(AuthError::AccountCreationFailed)
        }
    }
}
