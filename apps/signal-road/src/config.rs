use std::env;

use anyhow::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MailboxBackend {
    Memory,
    Redis,
}

impl MailboxBackend {
    fn from_env() -> Self {
        match env::var("SIGNAL_MAILBOX_BACKEND")
            .unwrap_or_else(|_| "memory".into())
            .as_str()
        {
            "redis" => MailboxBackend::Redis,
            _ => MailboxBackend::Memory,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub log_filter: String,
    pub mailbox_backend: MailboxBackend,
    pub redis_url: String,
    pub room_ttl_seconds: u64,
    pub jwt_secret: String,
    pub admin_token: Option<String>,
    pub require_accepted: bool,
    pub reset_candidates_on_offer: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let port = env::var("SIGNAL_ROAD_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(8080);
        let log_filter =
            env::var("RUST_LOG").unwrap_or_else(|_| "info,signal_road=debug".into());
        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
        let room_ttl_seconds =
            positive_seconds(env::var("ROOM_TTL_SECONDS").ok().as_deref(), 86_400); // one day
        let jwt_secret = env::var("SIGNAL_JWT_SECRET").unwrap_or_default();
        let admin_token = env::var("SIGNAL_ADMIN_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        let require_accepted = env::var("SIGNAL_REQUIRE_ACCEPTED")
            .map(|value| matches_truthy(&value))
            .unwrap_or(true);
        let reset_candidates_on_offer = env::var("SIGNAL_RESET_CANDIDATES_ON_OFFER")
            .map(|value| matches_truthy(&value))
            .unwrap_or(true);

        Self {
            port,
            log_filter,
            mailbox_backend: MailboxBackend::from_env(),
            redis_url,
            room_ttl_seconds,
            jwt_secret,
            admin_token,
            require_accepted,
            reset_candidates_on_offer,
        }
    }

    /// Settings `serve` refuses to start with.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.jwt_secret.trim().is_empty() {
            bail!("SIGNAL_JWT_SECRET must be set; an empty key lets anyone forge caller tokens");
        }
        if self.room_ttl_seconds == 0 {
            bail!("ROOM_TTL_SECONDS must be positive");
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            log_filter: "info,signal_road=debug".to_string(),
            mailbox_backend: MailboxBackend::Memory,
            redis_url: "redis://localhost:6379".to_string(),
            room_ttl_seconds: 86_400,
            jwt_secret: String::new(),
            admin_token: None,
            require_accepted: true,
            reset_candidates_on_offer: true,
        }
    }
}

fn positive_seconds(raw: Option<&str>, default: u64) -> u64 {
    raw.and_then(|value| value.trim().parse().ok())
        .filter(|secs| *secs > 0)
        .unwrap_or(default)
}

fn matches_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
