use crate::{
    api,
    cli::globals::GlobalArgs,
    security::{
        clock::SystemClock,
        config::{RateLimitConfig, SecurityConfig, TokenConfig},
        Security,
    },
    store::PgCredentialStore,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub globals: GlobalArgs,
    pub port: u16,
    pub jwt_secret: SecretString,
    pub jwt_ttl: Duration,
    pub jwt_issuer: String,
    pub jwt_audience: String,
    pub rate_limit_requests: usize,
    pub rate_limit_window: Duration,
    pub trust_proxy_headers: bool,
}

impl Args {
    fn security_config(&self) -> SecurityConfig {
        let token = TokenConfig::new(self.jwt_secret.clone())
            .with_ttl(self.jwt_ttl)
            .with_issuer(self.jwt_issuer.clone())
            .with_audience(self.jwt_audience.clone());

        SecurityConfig::new(token)
            .with_hasher(self.globals.hasher)
            .with_lockout(self.globals.lockout)
            .with_rate_limit(
                RateLimitConfig::new(self.rate_limit_requests, self.rate_limit_window)
                    .with_trust_proxy_headers(self.trust_proxy_headers),
            )
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the database is unreachable, the security settings are
/// rejected, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let pool = args.globals.connect().await?;
    let store = Arc::new(PgCredentialStore::new(pool));
    let security = Security::new(args.security_config(), store, Arc::new(SystemClock))
        .context("Invalid security configuration")?;

    api::new(args.port, Arc::new(security)).await
}

fn log_startup_args(args: &Args) {
    let lockout = args.globals.lockout;
    let rate_limit = if args.rate_limit_requests == 0 {
        "disabled".to_string()
    } else {
        format!(
            "{} per {}s, keyed by {}",
            args.rate_limit_requests,
            args.rate_limit_window.as_secs(),
            if args.trust_proxy_headers {
                "proxy headers"
            } else {
                "peer address"
            }
        )
    };
    let entries = [
        ("listen", format!("tcp:{}", args.port)),
        ("dsn", args.globals.redacted_dsn()),
        ("jwt_issuer", args.jwt_issuer.clone()),
        ("jwt_audience", args.jwt_audience.clone()),
        ("jwt_ttl", format!("{}s", args.jwt_ttl.as_secs())),
        (
            "lockout",
            format!(
                "{} failures, {}s",
                lockout.threshold(),
                lockout.duration().as_secs()
            ),
        ),
        ("store_timeout", format!("{}s", lockout.store_timeout().as_secs())),
        ("rate_limit", rate_limit),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "bastion {} - {}\n\n{title}:",
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
