//! Configuration Module
//!
//! Configuration loading for the order tracker service.

mod settings;

pub use settings::{
    ConfigError, RegistrySettings, TrackerConfig, VenueSettings, WebSocketSettings,
};
