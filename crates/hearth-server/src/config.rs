use std::path::PathBuf;

use anyhow::{Context, bail};

use hearth_gateway::presence::PresencePolicy;

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

/// SMS/voice credentials. All three must be set for dispatch to be enabled.
#[derive(Debug, Clone)]
pub struct TwilioConfig {
    pub account_sid: String,
    pub auth_token: String,
    pub from: String,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub presence_policy: PresencePolicy,
    pub twilio: Option<TwilioConfig>,
    pub cookie_secure: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("HEARTH_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("HEARTH_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port = match get("HEARTH_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid HEARTH_PORT: {}", raw))?,
            None => 3000,
        };

        let presence_policy = match get("HEARTH_PRESENCE_POLICY") {
            Some(raw) => raw.parse().map_err(anyhow::Error::msg)?,
            None => PresencePolicy::default(),
        };

        let twilio = match (
            get("HEARTH_TWILIO_SID"),
            get("HEARTH_TWILIO_TOKEN"),
            get("HEARTH_TWILIO_FROM"),
        ) {
            (Some(account_sid), Some(auth_token), Some(from)) => Some(TwilioConfig {
                account_sid,
                auth_token,
                from,
            }),
            _ => None,
        };

        Ok(Self {
            host: get("HEARTH_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            db_path: get("HEARTH_DB_PATH").unwrap_or_else(|| "hearth.db".into()).into(),
            jwt_secret,
            presence_policy,
            twilio,
            cookie_secure: get("HEARTH_COOKIE_SECURE").is_some_and(|v| v == "true" || v == "1"),
        })
    }
}
