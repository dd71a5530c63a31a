//! Venue Integration
//!
//! WebSocket connectivity to the trading venue: wire types, frame
//! codec, bounded reconnection, the transport run loop, and the
//! command adapter the registry drives orders through.

pub mod codec;
pub mod commands;
pub mod messages;
pub mod reconnect;
pub mod transport;
