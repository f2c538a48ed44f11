use std::str::FromStr;
use std::time::Duration;

/// Relay configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Username accepted on the publish endpoint (HTTP Basic).
    pub auth_username: String,
    /// Password accepted on the publish endpoint (HTTP Basic).
    pub auth_password: String,
    /// How often the reaper sweeps dead connections.
    pub reaper_interval: Duration,
    /// Upper bound on how long a single push may wait for queue space.
    pub push_timeout: Duration,
    /// Per-connection outbound frame queue size.
    pub outbound_queue_capacity: usize,
    /// Token bucket size for the publish rate limiter.
    pub rate_limit_burst: u32,
    /// Token bucket refill rate (tokens per second).
    pub rate_limit_per_sec: u32,
    /// How often the server pings each connection and checks for a reply.
    pub heartbeat_interval: Duration,
    /// Consecutive silent intervals before a connection is considered dead.
    pub heartbeat_max_missed: u32,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unparsable values fall back to the default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            port: parsed_var("PORT").unwrap_or(defaults.port),
            auth_username: std::env::var("AUTH_USERNAME")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.auth_username),
            auth_password: std::env::var("AUTH_PASSWORD")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or(defaults.auth_password),
            reaper_interval: parsed_var("REAPER_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.reaper_interval),
            push_timeout: parsed_var("PUSH_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.push_timeout),
            outbound_queue_capacity: parsed_var("OUTBOUND_QUEUE_CAPACITY")
                .filter(|cap| *cap > 0)
                .unwrap_or(defaults.outbound_queue_capacity),
            rate_limit_burst: parsed_var("RATE_LIMIT_BURST").unwrap_or(defaults.rate_limit_burst),
            rate_limit_per_sec: parsed_var("RATE_LIMIT_PER_SEC")
                .unwrap_or(defaults.rate_limit_per_sec),
            heartbeat_interval: parsed_var("HEARTBEAT_INTERVAL_SECS")
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .unwrap_or(defaults.heartbeat_interval),
            heartbeat_max_missed: parsed_var("HEARTBEAT_MAX_MISSED")
                .filter(|n| *n > 0)
                .unwrap_or(defaults.heartbeat_max_missed),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_username: "admin".to_string(),
            auth_password: "supersecret".to_string(),
            reaper_interval: Duration::from_secs(30),
            push_timeout: Duration::from_millis(5000),
            outbound_queue_capacity: 64,
            rate_limit_burst: 60,
            rate_limit_per_sec: 10,
            heartbeat_interval: Duration::from_secs(20),
            heartbeat_max_missed: 2,
        }
    }
}

fn parsed_var<T: FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
