pub mod auth;
pub mod config;
pub mod error;
pub mod relay;
pub mod routes;

use std::sync::Arc;

use auth::rate_limit::RateLimiter;
use config::Config;
use relay::broadcast::Broadcaster;
use relay::registry::ChannelRegistry;

/// Shared application state available to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub channels: Arc<ChannelRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub rate_limiter: Arc<RateLimiter>,
}

impl AppState {
    /// Build fresh state with an empty registry. The reaper is started
    /// separately (see [`relay::reaper::spawn`]).
    pub fn new(config: Config) -> Self {
        let channels = Arc::new(ChannelRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(channels.clone(), config.push_timeout));
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit_burst,
            config.rate_limit_per_sec,
        ));
        Self {
            config: Arc::new(config),
            channels,
            broadcaster,
            rate_limiter,
        }
    }
}
