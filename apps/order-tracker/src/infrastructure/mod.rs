//! Infrastructure Layer - Adapters and external integrations.
//!
//! This layer contains the concrete implementations of the port
//! interfaces defined in the application layer.

/// Venue WebSocket transport and command adapter.
pub mod venue;

/// Configuration loading.
pub mod config;

/// Tracing setup.
pub mod telemetry;
