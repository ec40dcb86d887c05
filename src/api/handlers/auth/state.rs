//! Auth configuration and shared handler state.

use crate::authn::totp::TotpProvisioner;

const DEFAULT_TOTP_ISSUER: &str = "Money Magnet";
const DEFAULT_SESSION_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_FRONTEND_BASE_URL: &str = "http://localhost:3000";

#[derive(Clone, Debug)]
pub struct AuthConfig {
    totp_issuer: String,
    session_ttl_seconds: i64,
    frontend_base_url: String,
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            totp_issuer: DEFAULT_TOTP_ISSUER.to_string(),
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            frontend_base_url: DEFAULT_FRONTEND_BASE_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_totp_issuer(mut self, issuer: String) -> Self {
        self.totp_issuer = issuer;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_frontend_base_url(mut self, url: String) -> Self {
        self.frontend_base_url = url;
        self
    }

    #[must_use]
    pub fn totp_issuer(&self) -> &str {
        &self.totp_issuer
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    /// Cookies are only marked `Secure` when the frontend is served over
    /// HTTPS, so local development over plain HTTP keeps working.
    #[must_use]
    pub fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared state for the auth handlers: the configuration plus the TOTP
/// provisioner derived from it.
#[derive(Debug)]
pub struct AuthState {
    config: AuthConfig,
    provisioner: TotpProvisioner,
}

impl AuthState {
    #[must_use]
    pub fn new(config: AuthConfig) -> Self {
        let provisioner = TotpProvisioner::new(config.totp_issuer());
        Self {
            config,
            provisioner,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn provisioner(&self) -> &TotpProvisioner {
        &self.provisioner
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, AuthState};

    #[test]
    fn defaults_match_service_conventions() {
        let config = AuthConfig::new();
        assert_eq!(config.totp_issuer(), "Money Magnet");
        assert_eq!(config.session_ttl_seconds(), 12 * 60 * 60);
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn builders_override_defaults() {
        let config = AuthConfig::new()
            .with_totp_issuer("Example".to_string())
            .with_session_ttl_seconds(60)
            .with_frontend_base_url("https://app.example.com".to_string());
        assert_eq!(config.totp_issuer(), "Example");
        assert_eq!(config.session_ttl_seconds(), 60);
        assert!(config.session_cookie_secure());
    }

    #[test]
    fn state_wires_provisioner_from_config() {
        let state = AuthState::new(AuthConfig::new().with_totp_issuer("Example".to_string()));
        assert_eq!(state.provisioner().issuer(), "Example");
    }
}
