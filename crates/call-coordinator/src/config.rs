use std::env;
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1500;
pub const DEFAULT_HANG_UP_GRACE_MS: u64 = 3000;
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub poll_interval: Duration,
    pub ice_servers: Vec<String>,
    /// Longest hang-up waits for the mailbox to acknowledge the end.
    pub hang_up_grace: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            ice_servers: vec![DEFAULT_STUN_SERVER.to_string()],
            hang_up_grace: Duration::from_millis(DEFAULT_HANG_UP_GRACE_MS),
        }
    }
}

impl CoordinatorConfig {
    /// Reads `CALL_POLL_INTERVAL_MS`, `CALL_HANG_UP_GRACE_MS` and
    /// `CALL_ICE_SERVERS` (comma separated).
    pub fn from_env() -> Self {
        let poll_interval = positive_millis("CALL_POLL_INTERVAL_MS", DEFAULT_POLL_INTERVAL_MS);
        let hang_up_grace = positive_millis("CALL_HANG_UP_GRACE_MS", DEFAULT_HANG_UP_GRACE_MS);
        let ice_servers = env::var("CALL_ICE_SERVERS")
            .ok()
            .map(|value| parse_ice_servers(&value))
            .unwrap_or_default();
        Self::default()
            .with_poll_interval(poll_interval)
            .with_ice_servers(ice_servers)
            .with_hang_up_grace(hang_up_grace)
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_hang_up_grace(mut self, grace: Duration) -> Self {
        self.hang_up_grace = grace;
        self
    }

    /// An empty list keeps the public STUN default; NAT traversal needs at
    /// least one server.
    pub fn with_ice_servers(mut self, servers: Vec<String>) -> Self {
        if !servers.is_empty() {
            self.ice_servers = servers;
        }
        self
    }
}

fn positive_millis(var: &str, default: u64) -> Duration {
    let ms = env::var(var)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .filter(|ms| *ms > 0)
        .unwrap_or(default);
    Duration::from_millis(ms)
}

fn parse_ice_servers(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test_timeout::timeout]
    fn ice_server_list_is_trimmed() {
        assert_eq!(
            parse_ice_servers(" stun:a:3478 , ,turn:b:3478"),
            vec!["stun:a:3478".to_string(), "turn:b:3478".to_string()]
        );
    }

    #[test_timeout::timeout]
    fn empty_ice_list_keeps_default_stun() {
        let config = CoordinatorConfig::default().with_ice_servers(Vec::new());
        assert_eq!(config.ice_servers, vec![DEFAULT_STUN_SERVER.to_string()]);
        assert_eq!(config.poll_interval, Duration::from_millis(1500));
        assert_eq!(config.hang_up_grace, Duration::from_secs(3));
    }
}
