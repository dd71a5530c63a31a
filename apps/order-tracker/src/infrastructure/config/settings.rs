//! Tracker Configuration Settings
//!
//! Configuration types for the order tracker, loaded from environment
//! variables.

use std::time::Duration;

use crate::infrastructure::venue::messages::ORDERS_CHANNEL;
use crate::infrastructure::venue::reconnect::ReconnectConfig;

/// Venue connection settings.
#[derive(Debug, Clone)]
pub struct VenueSettings {
    /// WebSocket URL of the venue's streaming API.
    pub url: String,
    /// Channels to subscribe to on connect.
    pub channels: Vec<String>,
}

impl VenueSettings {
    /// Default subscription channel set.
    #[must_use]
    pub fn default_channels() -> Vec<String> {
        vec![ORDERS_CHANNEL.to_string()]
    }
}

/// WebSocket connection settings.
#[derive(Debug, Clone)]
pub struct WebSocketSettings {
    /// Fixed delay between reconnection attempts.
    pub reconnect_delay: Duration,
    /// Maximum consecutive reconnection attempts before giving up.
    pub max_reconnect_attempts: u32,
}

impl Default for WebSocketSettings {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_millis(3000),
            max_reconnect_attempts: 5,
        }
    }
}

impl WebSocketSettings {
    /// Convert to a transport reconnect configuration.
    #[must_use]
    pub const fn reconnect_config(&self) -> ReconnectConfig {
        ReconnectConfig {
            delay: self.reconnect_delay,
            max_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Registry settings.
#[derive(Debug, Clone)]
pub struct RegistrySettings {
    /// Capacity of the bounded recent-updates feed.
    pub recent_updates_capacity: usize,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            recent_updates_capacity: 256,
        }
    }
}

/// Complete tracker configuration.
#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Venue connection settings.
    pub venue: VenueSettings,
    /// WebSocket connection settings.
    pub websocket: WebSocketSettings,
    /// Registry settings.
    pub registry: RegistrySettings,
}

impl TrackerConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing
    /// or empty.
    pub fn from_env() -> Result<Self, ConfigError> {
        let url = std::env::var("VENUE_WS_URL")
            .map_err(|_| ConfigError::MissingEnvVar("VENUE_WS_URL".to_string()))?;

        if url.is_empty() {
            return Err(ConfigError::EmptyValue("VENUE_WS_URL".to_string()));
        }

        let channels = std::env::var("VENUE_CHANNELS")
            .ok()
            .map_or_else(VenueSettings::default_channels, |raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            });

        if channels.is_empty() {
            return Err(ConfigError::EmptyValue("VENUE_CHANNELS".to_string()));
        }

        let websocket = WebSocketSettings {
            reconnect_delay: parse_env_duration_millis(
                "ORDER_TRACKER_RECONNECT_DELAY_MS",
                WebSocketSettings::default().reconnect_delay,
            ),
            max_reconnect_attempts: parse_env_u32(
                "ORDER_TRACKER_MAX_RECONNECT_ATTEMPTS",
                WebSocketSettings::default().max_reconnect_attempts,
            ),
        };

        let registry = RegistrySettings {
            recent_updates_capacity: parse_env_usize(
                "ORDER_TRACKER_RECENT_UPDATES_CAPACITY",
                RegistrySettings::default().recent_updates_capacity,
            ),
        };

        Ok(Self {
            venue: VenueSettings { url, channels },
            websocket,
            registry,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
}

fn parse_env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_usize(key: &str, default: usize) -> usize {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_env_duration_millis(key: &str, default: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
