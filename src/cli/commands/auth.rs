use anyhow::{Context, Result};
use clap::{Arg, Command};

pub const ARG_TOTP_ISSUER: &str = "totp-issuer";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_TOTP_ISSUER)
                .long(ARG_TOTP_ISSUER)
                .help("Issuer name embedded in TOTP provisioning URIs")
                .env("MONEYMAGNET_TOTP_ISSUER")
                .default_value("Money Magnet"),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("MONEYMAGNET_SESSION_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL, used for CORS and cookie security")
                .env("MONEYMAGNET_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
}

/// Parsed auth options.
#[derive(Debug)]
pub struct Options {
    pub totp_issuer: String,
    pub session_ttl_seconds: i64,
    pub frontend_base_url: String,
}

impl Options {
    /// Extract auth options from parsed matches.
    ///
    /// # Errors
    /// Returns an error if a defaulted argument is somehow missing.
    pub fn parse(matches: &clap::ArgMatches) -> Result<Self> {
        let totp_issuer = matches
            .get_one::<String>(ARG_TOTP_ISSUER)
            .cloned()
            .context("missing required argument: --totp-issuer")?;
        let session_ttl_seconds = matches
            .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
            .copied()
            .context("missing required argument: --session-ttl-seconds")?;
        let frontend_base_url = matches
            .get_one::<String>(ARG_FRONTEND_BASE_URL)
            .cloned()
            .context("missing required argument: --frontend-base-url")?;

        Ok(Self {
            totp_issuer,
            session_ttl_seconds,
            frontend_base_url,
        })
    }
}
