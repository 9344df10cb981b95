//! Application configuration loaded from environment variables.
//!
//! Every value is optional and falls back to a default suited to a local
//! development server:
//! - `TRADEWIRE_WS_URL`: STOMP WebSocket endpoint
//! - `TRADEWIRE_API_URL`: REST base URL
//! - `TRADEWIRE_TOKEN`: bearer credential (falls back to the keychain)
//! - `TRADEWIRE_RECONNECT_DELAY_SECS`, `TRADEWIRE_HANDSHAKE_TIMEOUT_SECS`,
//!   `TRADEWIRE_RESYNC_INTERVAL_SECS`: timings in whole seconds
//! - `TRADEWIRE_FEED_CAPACITY`: number of trade prints kept for display

use std::time::Duration;

use crate::TradewireError;

/// Default STOMP endpoint (raw WebSocket path of the server's SockJS registration).
const DEFAULT_WEBSOCKET_URL: &str = "ws://localhost:8080/ws/websocket";

/// Default REST base URL.
const DEFAULT_API_URL: &str = "http://localhost:8080";

const DEFAULT_RECONNECT_DELAY_SECS: u64 = 5;
const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RESYNC_INTERVAL_SECS: u64 = 30;
const DEFAULT_FEED_CAPACITY: usize = 20;

/// Top-level application configuration.
#[derive(Debug)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub sync: SyncConfig,
    /// Bearer token supplied through the environment, if any.
    pub token: Option<String>,
}

/// Where the platform lives.
#[derive(Debug)]
pub struct ServerConfig {
    pub websocket_url: String,
    pub api_url: String,
}

/// Timings and sizes used by the synchronization layer.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Fixed delay before each reconnect attempt.
    pub reconnect_delay: Duration,
    /// Upper bound on the WebSocket upgrade plus STOMP CONNECT exchange.
    pub handshake_timeout: Duration,
    /// How often the REST order snapshot is refreshed while connected.
    pub resync_interval: Duration,
    /// Capacity of the live trade feed.
    pub feed_capacity: usize,
    /// Startup attempts allowed while waiting for the endpoint to resolve.
    pub discovery_attempts: u32,
    /// Spacing between discovery attempts.
    pub discovery_interval: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(DEFAULT_RECONNECT_DELAY_SECS),
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            resync_interval: Duration::from_secs(DEFAULT_RESYNC_INTERVAL_SECS),
            feed_capacity: DEFAULT_FEED_CAPACITY,
            discovery_attempts: 10,
            discovery_interval: Duration::from_secs(1),
        }
    }
}

impl AppConfig {
    /// Builds the configuration from an arbitrary variable lookup.
    ///
    /// [`fetch_config`] passes the process environment; tests pass a map.
    ///
    /// # Errors
    ///
    /// Returns [`TradewireError::Config`] if a numeric variable does not
    /// parse or is zero.
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|s| !s.is_empty());

        let websocket_url =
            var("TRADEWIRE_WS_URL").unwrap_or_else(|| DEFAULT_WEBSOCKET_URL.to_string());
        let api_url = var("TRADEWIRE_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let reconnect_delay = secs(
            "TRADEWIRE_RECONNECT_DELAY_SECS",
            var("TRADEWIRE_RECONNECT_DELAY_SECS"),
            DEFAULT_RECONNECT_DELAY_SECS,
        )?;
        let handshake_timeout = secs(
            "TRADEWIRE_HANDSHAKE_TIMEOUT_SECS",
            var("TRADEWIRE_HANDSHAKE_TIMEOUT_SECS"),
            DEFAULT_HANDSHAKE_TIMEOUT_SECS,
        )?;
        let resync_interval = secs(
            "TRADEWIRE_RESYNC_INTERVAL_SECS",
            var("TRADEWIRE_RESYNC_INTERVAL_SECS"),
            DEFAULT_RESYNC_INTERVAL_SECS,
        )?;
        let feed_capacity = positive(
            "TRADEWIRE_FEED_CAPACITY",
            var("TRADEWIRE_FEED_CAPACITY"),
            DEFAULT_FEED_CAPACITY as u64,
        )? as usize;

        Ok(AppConfig {
            server: ServerConfig {
                websocket_url,
                api_url: api_url.trim_end_matches('/').to_string(),
            },
            sync: SyncConfig {
                reconnect_delay,
                handshake_timeout,
                resync_interval,
                feed_capacity,
                ..SyncConfig::default()
            },
            token: var("TRADEWIRE_TOKEN"),
        })
    }
}

/// Loads the application configuration from environment variables.
///
/// # Errors
///
/// Returns [`TradewireError::Config`] if a numeric variable is malformed.
pub fn fetch_config() -> crate::Result<AppConfig> {
    AppConfig::from_lookup(|name| std::env::var(name).ok())
}

fn secs(name: &str, raw: Option<String>, default: u64) -> crate::Result<Duration> {
    positive(name, raw, default).map(Duration::from_secs)
}

fn positive(name: &str, raw: Option<String>, default: u64) -> crate::Result<u64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    match raw.trim().parse::<u64>() {
        Ok(0) => Err(TradewireError::Config(format!("{name} must be greater than zero"))),
        Ok(value) => Ok(value),
        Err(_) => Err(TradewireError::Config(format!(
            "{name} must be a whole number, got {raw:?}"
        ))),
    }
}
