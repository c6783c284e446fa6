use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

#[derive(Debug, Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    /// Signs live channel tokens. Never equal to `jwt_secret`.
    pub channel_token_secret: String,
    pub channel_token_ttl_secs: i64,
    pub reminder_interval_secs: u64,
    pub unique_registrations: bool,
    pub public_url: String,
    pub stripe_secret_key: Option<String>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unset keys take their defaults.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("GUDPALS_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("GUDPALS_JWT_SECRET is unset or still a placeholder");
        }

        let channel_token_secret = match get("GUDPALS_CHANNEL_TOKEN_SECRET").filter(|s| !s.is_empty()) {
            Some(secret) if secret == jwt_secret => {
                bail!("GUDPALS_CHANNEL_TOKEN_SECRET must differ from GUDPALS_JWT_SECRET")
            }
            Some(secret) => secret,
            None => format!("{}:channel-tokens", jwt_secret),
        };

        let host = get("GUDPALS_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("GUDPALS_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("GUDPALS_PORT")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("GUDPALS_HOST")?;

        let channel_token_ttl_secs: i64 = get("GUDPALS_CHANNEL_TOKEN_TTL_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("GUDPALS_CHANNEL_TOKEN_TTL_SECS")?
            .unwrap_or(3600);
        let reminder_interval_secs: u64 = get("GUDPALS_REMINDER_INTERVAL_SECS")
            .map(|v| v.parse())
            .transpose()
            .context("GUDPALS_REMINDER_INTERVAL_SECS")?
            .unwrap_or(300);
        let unique_registrations = get("GUDPALS_UNIQUE_REGISTRATIONS")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);

        Ok(Self {
            addr,
            db_path: get("GUDPALS_DB_PATH")
                .unwrap_or_else(|| "gudpals.db".into())
                .into(),
            jwt_secret,
            channel_token_secret,
            channel_token_ttl_secs,
            reminder_interval_secs,
            unique_registrations,
            public_url: get("GUDPALS_PUBLIC_URL").unwrap_or_else(|| format!("http://localhost:{}", port)),
            stripe_secret_key: get("STRIPE_SECRET_KEY").filter(|k| !k.is_empty()),
        })
    }
}
