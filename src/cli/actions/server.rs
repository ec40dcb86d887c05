use crate::api;
use anyhow::Result;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub totp_issuer: String,
    pub session_ttl_seconds: i64,
    pub frontend_base_url: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let auth_config = api::handlers::auth::AuthConfig::new()
        .with_totp_issuer(args.totp_issuer)
        .with_session_ttl_seconds(args.session_ttl_seconds)
        .with_frontend_base_url(args.frontend_base_url);

    api::new(args.port, args.dsn, auth_config).await
}
