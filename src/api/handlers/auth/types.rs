//! Request/response types for the auth endpoints.
//!
//! Field spellings are part of the inherited wire contract: requests use
//! snake_case except `otpCode`, and responses use `provisioningDescriptor`,
//! `backupCodes`, and `remainingBackupCodes`. The `password_hash` request
//! field carries the plaintext password (hashed server-side); `password` is
//! accepted as an alias.

use chrono::NaiveDate;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::storage::UserRecord;

#[derive(ToSchema, Deserialize, Debug)]
pub struct CreateAccountRequest {
    pub household_name: String,
    /// Shared admission key gating self-registration into the household.
    #[schema(value_type = String)]
    pub key: SecretString,
    pub user_name: String,
    #[schema(value_type = String)]
    #[serde(rename = "password_hash", alias = "password")]
    pub password: SecretString,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[schema(value_type = String, format = Date)]
    pub date_of_birth: NaiveDate,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct LoginRequest {
    pub user_name: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    #[serde(rename = "otpCode")]
    pub otp_code: String,
}

#[derive(ToSchema, Deserialize, Debug)]
pub struct RecoveryRequest {
    pub user_name: String,
    #[schema(value_type = String)]
    pub password: SecretString,
    pub backup_code: String,
}

/// Public projection of a user row; never carries the password hash or the
/// TOTP secret.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct UserResponse {
    pub id: Uuid,
    pub user_name: String,
    pub is_admin: bool,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    #[schema(value_type = String, format = Date)]
    pub date_of_birth: NaiveDate,
    pub household_id: Uuid,
}

impl From<UserRecord> for UserResponse {
    fn from(record: UserRecord) -> Self {
        Self {
            id: record.id,
            user_name: record.user_name,
            is_admin: record.is_admin,
            first_name: record.first_name,
            last_name: record.last_name,
            email: record.email,
            date_of_birth: record.date_of_birth,
            household_id: record.household_id,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountCreatedResponse {
    /// `otpauth://` URI shown exactly once for authenticator enrollment.
    #[serde(rename = "provisioningDescriptor")]
    pub provisioning_descriptor: String,
    pub user: UserResponse,
    /// Raw backup codes, shown exactly once at mint.
    #[serde(rename = "backupCodes")]
    pub backup_codes: Vec<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AuthenticatedUserResponse {
    pub user: UserResponse,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RecoveryResponse {
    /// Fresh `otpauth://` URI for the rotated secret.
    #[serde(rename = "provisioningDescriptor")]
    pub provisioning_descriptor: String,
    pub user: UserResponse,
    /// Count of still-unused backup codes (raw values are unrecoverable).
    #[serde(rename = "remainingBackupCodes")]
    pub remaining_backup_codes: i64,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}
