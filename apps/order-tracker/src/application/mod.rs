//! Application layer - Registry use cases and port definitions.

/// Outbound port for venue order commands.
pub mod ports;

/// The order registry: authoritative order state and queries.
pub mod registry;
