//! Order Model and Status State Machine
//!
//! Domain types for tracking the lifecycle of a single order: the
//! `Order` record itself, the `OrderStatus` state machine that gates
//! every mutation, and the `OrderStatusUpdate` events that drive it.
//!
//! # Design
//!
//! An order is created locally as a `Pending` placeholder (or
//! synthesized from the first push referencing an unknown id) and is
//! mutated exclusively through [`Order::apply_update`], which enforces:
//!
//! - Forward-only status transitions per [`OrderStatus::can_transition_to`]
//! - Terminal-state immutability (late updates are rejected, not applied)
//! - Timestamp tie-breaking: an update stamped at or before the order's
//!   `updated_at` is a stale duplicate and is dropped
//! - `filled_amount` never decreases and never exceeds `amount`

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// =============================================================================
// Identifiers and Sides
// =============================================================================

/// Unique, opaque identifier for an order.
///
/// Assigned locally (a v4 UUID) when a placement command is issued, or
/// taken verbatim from the venue when the first push for an unknown
/// order arrives. Treated as an opaque string throughout; no structure
/// is assumed beyond uniqueness.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderId(String);

impl OrderId {
    /// Generate a fresh locally-assigned order id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for OrderId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for OrderId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Order direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    /// Buy order.
    Buy,
    /// Sell order.
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

// =============================================================================
// Order Status
// =============================================================================

/// Order status in the lifecycle.
///
/// ```text
/// Pending -> Submitted -> Open <-> PartiallyFilled -> Filled
///    \           \          \            /
///     +-----------+----------+----------+--> Cancelling -> Cancelled
///                  \                     \-> Rejected | Expired
/// ```
///
/// `Filled`, `Cancelled`, `Rejected` and `Expired` are terminal: no
/// edges leave them and an order in one of them is immutable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Created locally, placement command not yet acknowledged.
    Pending,
    /// Acknowledged by the venue, not yet on the book.
    Submitted,
    /// Resting on the book.
    Open,
    /// Partially executed, remainder still working.
    PartiallyFilled,
    /// Cancel requested, awaiting venue confirmation.
    Cancelling,
    /// Completely executed.
    Filled,
    /// Cancel confirmed by the venue.
    Cancelled,
    /// Rejected by the venue.
    Rejected,
    /// Expired venue-side (e.g. time-in-force elapsed).
    Expired,
}

impl OrderStatus {
    /// Returns true if the order is in a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Filled | Self::Cancelled | Self::Rejected | Self::Expired
        )
    }

    /// Returns true if the order counts as open (not yet terminal).
    #[must_use]
    pub const fn is_open(&self) -> bool {
        !self.is_terminal()
    }

    /// Returns true if a cancel request may be issued from this state.
    ///
    /// `Cancelling` is deliberately excluded: a second cancel while one
    /// is in flight is an invalid command, not a retry.
    #[must_use]
    pub const fn is_cancellable(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Submitted | Self::Open | Self::PartiallyFilled
        )
    }

    /// Check if a transition from `self` to `to` is legal.
    ///
    /// Working states may skip ahead (a venue can collapse
    /// `Submitted -> Filled` into one push) but never move backward.
    /// `Open <-> PartiallyFilled` is bidirectional and both allow
    /// self-transitions, since repeated partial fills and amend-style
    /// pushes re-report the same state. From `Cancelling`, fills that
    /// raced the cancel are still accepted.
    #[must_use]
    pub const fn can_transition_to(&self, to: Self) -> bool {
        matches!(
            (self, to),
            // From Pending
            (Self::Pending, Self::Submitted)
                | (Self::Pending, Self::Open)
                | (Self::Pending, Self::PartiallyFilled)
                | (Self::Pending, Self::Filled)
                | (Self::Pending, Self::Cancelling)
                | (Self::Pending, Self::Cancelled)
                | (Self::Pending, Self::Rejected)
                | (Self::Pending, Self::Expired)
                // From Submitted
                | (Self::Submitted, Self::Open)
                | (Self::Submitted, Self::PartiallyFilled)
                | (Self::Submitted, Self::Filled)
                | (Self::Submitted, Self::Cancelling)
                | (Self::Submitted, Self::Cancelled)
                | (Self::Submitted, Self::Rejected)
                | (Self::Submitted, Self::Expired)
                // From Open
                | (Self::Open, Self::Open)
                | (Self::Open, Self::PartiallyFilled)
                | (Self::Open, Self::Filled)
                | (Self::Open, Self::Cancelling)
                | (Self::Open, Self::Cancelled)
                | (Self::Open, Self::Rejected)
                | (Self::Open, Self::Expired)
                // From PartiallyFilled
                | (Self::PartiallyFilled, Self::Open)
                | (Self::PartiallyFilled, Self::PartiallyFilled)
                | (Self::PartiallyFilled, Self::Filled)
                | (Self::PartiallyFilled, Self::Cancelling)
                | (Self::PartiallyFilled, Self::Cancelled)
                | (Self::PartiallyFilled, Self::Rejected)
                | (Self::PartiallyFilled, Self::Expired)
                // From Cancelling (fill/cancel race tolerated)
                | (Self::Cancelling, Self::Cancelled)
                | (Self::Cancelling, Self::PartiallyFilled)
                | (Self::Cancelling, Self::Filled)
        )
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Submitted => write!(f, "submitted"),
            Self::Open => write!(f, "open"),
            Self::PartiallyFilled => write!(f, "partially_filled"),
            Self::Cancelling => write!(f, "cancelling"),
            Self::Filled => write!(f, "filled"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::Rejected => write!(f, "rejected"),
            Self::Expired => write!(f, "expired"),
        }
    }
}

// =============================================================================
// Status Updates
// =============================================================================

/// An inbound (or internally synthesized) order status event.
///
/// Ephemeral: drives exactly one registry mutation and a transient
/// recent-updates feed, and is not persisted beyond that.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderStatusUpdate {
    /// Order the update refers to.
    pub order_id: OrderId,
    /// Status reported by the event.
    pub status: OrderStatus,
    /// Venue timestamp of the event. Used as the tie-break stamp.
    pub timestamp: DateTime<Utc>,
    /// Quantity filled by this event (incremental, not cumulative).
    #[serde(default)]
    pub filled_delta: Option<Decimal>,
    /// Execution price for `filled_delta`.
    #[serde(default)]
    pub fill_price: Option<Decimal>,
    /// Fee charged by this event (incremental).
    #[serde(default)]
    pub fee_delta: Option<Decimal>,
    /// Venue-reported error, if the event carries one.
    #[serde(default)]
    pub error: Option<String>,
    /// Instrument name, when the push includes full order context.
    /// Only consulted when synthesizing a recovery record.
    #[serde(default)]
    pub instrument: Option<String>,
    /// Direction, for recovery synthesis.
    #[serde(default)]
    pub direction: Option<Side>,
    /// Total requested size, for recovery synthesis.
    #[serde(default)]
    pub amount: Option<Decimal>,
    /// Limit price, for recovery synthesis.
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl OrderStatusUpdate {
    /// Build a bare update carrying only a status and a stamp.
    ///
    /// Used for internally synthesized events (optimistic cancel,
    /// local rejection); inbound wire events populate the optional
    /// fields during decoding instead.
    #[must_use]
    pub const fn new(order_id: OrderId, status: OrderStatus, timestamp: DateTime<Utc>) -> Self {
        Self {
            order_id,
            status,
            timestamp,
            filled_delta: None,
            fill_price: None,
            fee_delta: None,
            error: None,
            instrument: None,
            direction: None,
            amount: None,
            price: None,
        }
    }
}

/// Why an update could not be applied to an order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderUpdateError {
    /// Update is stamped at or before the order's `updated_at`.
    #[error("stale update: event at {event} is not after order stamp {order}")]
    Stale {
        /// Timestamp carried by the update.
        event: DateTime<Utc>,
        /// Current `updated_at` of the order.
        order: DateTime<Utc>,
    },

    /// Order is already in a terminal state.
    #[error("order is terminal ({status}), update not applied")]
    Terminal {
        /// The terminal status the order is frozen in.
        status: OrderStatus,
    },

    /// The transition is not permitted by the state machine.
    #[error("invalid status transition: {from} -> {to}")]
    InvalidTransition {
        /// Current status.
        from: OrderStatus,
        /// Status the update asked for.
        to: OrderStatus,
    },
}

// =============================================================================
// Order Spec and Order
// =============================================================================

/// Parameters for placing a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderSpec {
    /// Instrument to trade.
    pub instrument: String,
    /// Buy or sell.
    pub direction: Side,
    /// Total requested size. Must be positive.
    pub amount: Decimal,
    /// Limit price.
    pub price: Decimal,
}

/// A single tracked order.
///
/// Snapshots of this type are what listeners and query callers
/// receive; the registry holds the only mutable copies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Unique order id.
    pub id: OrderId,
    /// Instrument name.
    pub instrument: String,
    /// Buy or sell.
    pub direction: Side,
    /// Total requested size.
    pub amount: Decimal,
    /// Limit price.
    pub price: Decimal,
    /// Cumulative filled size. Never decreases; never exceeds `amount`.
    pub filled_amount: Decimal,
    /// Volume-weighted average fill price. `Some` once any fill lands.
    pub average_price: Option<Decimal>,
    /// Cumulative fees.
    pub fee: Decimal,
    /// Current lifecycle status.
    pub status: OrderStatus,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Stamp of the last applied mutation. Monotonically non-decreasing.
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Create a pending order from a placement spec.
    #[must_use]
    pub fn from_spec(id: OrderId, spec: &OrderSpec, now: DateTime<Utc>) -> Self {
        Self {
            id,
            instrument: spec.instrument.clone(),
            direction: spec.direction,
            amount: spec.amount,
            price: spec.price,
            filled_amount: Decimal::ZERO,
            average_price: None,
            fee: Decimal::ZERO,
            status: OrderStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }

    /// Synthesize a minimal record for an update referencing an
    /// unknown order id (recovery path after reconnect).
    ///
    /// The record starts one instant before the update's own stamp so
    /// the triggering update itself still applies.
    #[must_use]
    pub fn recovered(update: &OrderStatusUpdate) -> Self {
        let epoch = update.timestamp - chrono::Duration::milliseconds(1);
        Self {
            id: update.order_id.clone(),
            instrument: update.instrument.clone().unwrap_or_default(),
            direction: update.direction.unwrap_or(Side::Buy),
            amount: update
                .amount
                .or(update.filled_delta)
                .unwrap_or(Decimal::ZERO),
            price: update.price.unwrap_or(Decimal::ZERO),
            filled_amount: Decimal::ZERO,
            average_price: None,
            fee: Decimal::ZERO,
            status: OrderStatus::Pending,
            created_at: epoch,
            updated_at: epoch,
        }
    }

    /// Fraction of the order that has filled, in `[0, 1]`.
    #[must_use]
    pub fn fill_fraction(&self) -> Decimal {
        if self.amount.is_zero() {
            Decimal::ZERO
        } else {
            self.filled_amount / self.amount
        }
    }

    /// Apply a validated status update to this order.
    ///
    /// On success the status, fill quantities, average price, fees and
    /// `updated_at` stamp are merged in. On failure nothing changes.
    ///
    /// # Errors
    ///
    /// Returns [`OrderUpdateError`] when the update is stale, the order
    /// is terminal, or the transition is illegal.
    pub fn apply_update(&mut self, update: &OrderStatusUpdate) -> Result<(), OrderUpdateError> {
        if self.status.is_terminal() {
            return Err(OrderUpdateError::Terminal {
                status: self.status,
            });
        }

        if update.timestamp <= self.updated_at {
            return Err(OrderUpdateError::Stale {
                event: update.timestamp,
                order: self.updated_at,
            });
        }

        if !self.status.can_transition_to(update.status) {
            return Err(OrderUpdateError::InvalidTransition {
                from: self.status,
                to: update.status,
            });
        }

        if let Some(delta) = update.filled_delta
            && delta > Decimal::ZERO
        {
            let new_filled = (self.filled_amount + delta).min(self.amount);
            let added = new_filled - self.filled_amount;

            if added > Decimal::ZERO
                && let Some(fill_price) = update.fill_price
            {
                self.average_price = Some(match self.average_price {
                    Some(avg) => {
                        let total = avg * self.filled_amount + fill_price * added;
                        total / new_filled
                    }
                    None => fill_price,
                });
            }

            self.filled_amount = new_filled;
        }

        if let Some(fee) = update.fee_delta {
            self.fee += fee;
        }

        self.status = update.status;
        self.updated_at = update.timestamp;

        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
