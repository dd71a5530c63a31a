#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Order Tracker - Real-Time Order Lifecycle Tracking
//!
//! Maintains a live registry of trading orders fed by a resilient
//! WebSocket connection to the venue. Order commands (place, cancel)
//! go out over the same socket; lifecycle pushes come back and are
//! merged into per-order state with stale-event and illegal-transition
//! protection.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Order state with no external dependencies
//!   - `order`: Order, status state machine, update merging
//!   - `dispatch`: Synchronous listener registry with panic isolation
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Venue command interface the registry drives
//!   - `registry`: Order registry with optimistic cancellation
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `venue`: WebSocket transport, wire codec, reconnection
//!   - `config`: Environment-based configuration
//!   - `telemetry`: Tracing setup
//!
//! # Data Flow
//!
//! ```text
//! Venue WS ──► Transport ──► TransportEvent ──► OrderRegistry ──► listeners
//!     ▲                                              │
//!     └────────── CommandSender ◄── VenueCommandPort ┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Order state and event dispatch with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::dispatch::{EventDispatcher, SubscriptionHandle};
pub use domain::order::{
    Order, OrderId, OrderSpec, OrderStatus, OrderStatusUpdate, OrderUpdateError, Side,
};

// Application layer
pub use application::ports::{VenueCommandError, VenueCommandPort};
pub use application::registry::{CancelError, HistoryChanged, OrderRegistry, PlaceError};

// Infrastructure config
pub use infrastructure::config::{
    ConfigError, RegistrySettings, TrackerConfig, VenueSettings, WebSocketSettings,
};

// Venue transport (for integration tests)
pub use infrastructure::venue::commands::VenueCommandClient;
pub use infrastructure::venue::reconnect::{ReconnectConfig, ReconnectPolicy};
pub use infrastructure::venue::transport::{
    CommandSender, TransportConfig, TransportError, TransportEvent, TransportHandle,
    VenueTransport,
};

// Telemetry
pub use infrastructure::telemetry::{TelemetryGuard, init as init_telemetry};
