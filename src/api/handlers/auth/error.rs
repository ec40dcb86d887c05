//! Error taxonomy for the authentication endpoints.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::error;

use super::types::ErrorResponse;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed request body; rejected before any side effect.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Uniform credential failure: wrong password, wrong one-time code,
    /// spent backup code, and unknown user all collapse into this variant
    /// so the response never reveals which factor failed.
    #[error("unauthorized")]
    Unauthorized,

    /// The source address tripped the lockout threshold.
    #[error("too many attempts")]
    TooManyAttempts,

    /// Household lookup miss, admission-key mismatch, duplicate user name,
    /// or a storage failure inside the creation transaction. Details stay in
    /// the server log; the wire message is generic.
    #[error("account creation failed")]
    AccountCreationFailed,

    /// Infrastructure failure; surfaced as a 5xx and logged.
    #[error(transparent)]
    Storage(#[from] anyhow::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::InvalidInput(reason) => {
                (StatusCode::BAD_REQUEST, Json(ErrorResponse { error: reason })).into_response()
            }
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Unauthorized".to_string(),
                }),
            )
                .into_response(),
            Self::TooManyAttempts => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "TooManyAttempts".to_string(),
                }),
            )
                .into_response(),
            Self::AccountCreationFailed => (
                StatusCode::PAYMENT_REQUIRED,
                Json(ErrorResponse {
                    error: "Account creation failed".to_string(),
                }),
            )
                .into_response(),
            Self::Storage(err) => {
                error!("storage failure: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(ErrorResponse {
                        error: "Internal server error".to_string(),
                    }),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::AuthError;
    use axum::{http::StatusCode, response::IntoResponse};

    #[test]
    fn status_codes_match_wire_contract() {
        assert_eq!(
            AuthError::InvalidInput("bad".to_string())
                .into_response()
                .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::TooManyAttempts.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AuthError::AccountCreationFailed.into_response().status(),
            StatusCode::PAYMENT_REQUIRED
        );
        assert_eq!(
            AuthError::Storage(anyhow::anyhow!("boom"))
                .into_response()
                .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
