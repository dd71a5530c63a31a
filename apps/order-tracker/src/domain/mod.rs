//! Domain layer - Order lifecycle types with no I/O dependencies.

/// Typed multi-subscriber event dispatch.
pub mod dispatch;

/// Order model, status state machine, and status updates.
pub mod order;
