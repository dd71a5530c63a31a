//! Venue Command Port (Driven Port)
//!
//! Interface for issuing order commands to the venue. The registry
//! talks to the venue exclusively through this port; the WebSocket
//! command client in the infrastructure layer is the production
//! adapter, and tests substitute a mock.

use async_trait::async_trait;

use crate::domain::order::{OrderId, OrderSpec};

/// Errors a venue command can come back with.
///
/// These are command-level failures reported by the venue (or the
/// connection carrying the command); they are returned to callers as
/// typed results, never raised further.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VenueCommandError {
    /// The venue rejected the command.
    #[error("venue rejected command: {reason}")]
    Rejected {
        /// Venue-reported reason.
        reason: String,
    },

    /// The command could not be delivered (connection down or closing).
    #[error("venue connection unavailable: {0}")]
    Unavailable(String),

    /// The venue answered with something the codec could not read.
    #[error("malformed venue response: {0}")]
    MalformedResponse(String),
}

/// Outbound order commands against the venue.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VenueCommandPort: Send + Sync {
    /// Submit a new order.
    ///
    /// `client_order_id` is the locally assigned id; the venue is
    /// expected to echo it in subsequent pushes for this order.
    ///
    /// # Errors
    ///
    /// Returns [`VenueCommandError`] if the venue rejects the order or
    /// the command cannot be delivered.
    async fn submit_order(
        &self,
        client_order_id: &OrderId,
        spec: &OrderSpec,
    ) -> Result<(), VenueCommandError>;

    /// Request cancellation of an order.
    ///
    /// Best-effort: success here means the venue accepted the request,
    /// not that the order is cancelled. Only a subsequent `cancelled`
    /// push confirms it.
    ///
    /// # Errors
    ///
    /// Returns [`VenueCommandError`] if the venue refuses the cancel or
    /// the command cannot be delivered.
    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), VenueCommandError>;
}
