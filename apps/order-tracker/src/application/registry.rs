//! Order Registry
//!
//! The authoritative, process-local store of orders: the sole writer
//! of order records, fed by transport push events and local command
//! results, and queried by any number of independent readers.
//!
//! # Design
//!
//! - Orders are keyed by id in a single map behind a `parking_lot`
//!   lock; all mutation happens on the event/command control flow,
//!   queries return defensive copies.
//! - Open vs. completed are pure derived views recomputed from
//!   `status` on every call; there is no second collection to drift.
//! - Notification goes through two [`EventDispatcher`]s held as
//!   fields: a coarse "history changed" channel and a fine-grained
//!   per-update channel. Listeners never see live references.
//! - Optimistic mutations (`Cancelling`) do not advance the order's
//!   `updated_at` stamp: that stamp tracks venue time and is the
//!   apply-or-reject version for inbound pushes. Advancing it locally
//!   could make the venue's own confirmation look stale.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;

use crate::application::ports::VenueCommandPort;
use crate::domain::dispatch::{EventDispatcher, SubscriptionHandle};
use crate::domain::order::{Order, OrderId, OrderSpec, OrderStatus, OrderStatusUpdate};

/// Default capacity of the transient recent-updates feed.
const DEFAULT_RECENT_UPDATES_CAPACITY: usize = 256;

// =============================================================================
// Events and Errors
// =============================================================================

/// Coarse-grained notification: the order history set changed.
///
/// Carries no payload; listeners re-query the registry for snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryChanged;

/// Why a placement failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaceError {
    /// The spec is not placeable (non-positive amount).
    #[error("invalid order spec: {reason}")]
    InvalidSpec {
        /// What was wrong with it.
        reason: String,
    },

    /// The venue rejected the placement. The order remains in history
    /// with status `Rejected` under the reported id.
    #[error("order {order_id} rejected: {reason}")]
    Rejected {
        /// Id of the rejected order.
        order_id: OrderId,
        /// Venue-reported reason.
        reason: String,
    },
}

/// Why a cancellation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CancelError {
    /// No order with this id is known.
    #[error("order not found: {0}")]
    NotFound(OrderId),

    /// The order's current status does not permit cancellation.
    /// No command was issued.
    #[error("order not cancellable in status {status}")]
    InvalidState {
        /// Status the order was in at the time of the call.
        status: OrderStatus,
    },

    /// The venue refused the cancel; the order's status has been
    /// reverted to its pre-cancel value.
    #[error("venue refused cancel: {reason}")]
    Venue {
        /// Venue-reported reason.
        reason: String,
    },
}

// =============================================================================
// Registry
// =============================================================================

/// Authoritative order state, fed by the transport and local commands.
pub struct OrderRegistry {
    commands: Arc<dyn VenueCommandPort>,
    orders: RwLock<HashMap<OrderId, Order>>,
    /// Pre-cancel status per order with a cancel in flight, for the
    /// revert path when the venue refuses.
    pending_cancels: Mutex<HashMap<OrderId, OrderStatus>>,
    recent_updates: Mutex<VecDeque<OrderStatusUpdate>>,
    recent_capacity: usize,
    history_changed: EventDispatcher<HistoryChanged>,
    order_updated: EventDispatcher<OrderStatusUpdate>,
}

impl std::fmt::Debug for OrderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderRegistry")
            .field("orders", &self.orders.read().len())
            .field("pending_cancels", &self.pending_cancels.lock().len())
            .finish_non_exhaustive()
    }
}

impl OrderRegistry {
    /// Create a registry issuing commands through the given port.
    #[must_use]
    pub fn new(commands: Arc<dyn VenueCommandPort>) -> Self {
        Self::with_recent_capacity(commands, DEFAULT_RECENT_UPDATES_CAPACITY)
    }

    /// Create a registry with a custom recent-updates feed capacity.
    #[must_use]
    pub fn with_recent_capacity(commands: Arc<dyn VenueCommandPort>, capacity: usize) -> Self {
        Self {
            commands,
            orders: RwLock::new(HashMap::new()),
            pending_cancels: Mutex::new(HashMap::new()),
            recent_updates: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            recent_capacity: capacity,
            history_changed: EventDispatcher::new(),
            order_updated: EventDispatcher::new(),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// All known orders, newest `created_at` first. Cloned snapshots.
    #[must_use]
    pub fn order_history(&self) -> Vec<Order> {
        let mut orders: Vec<Order> = self.orders.read().values().cloned().collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        orders
    }

    /// Orders not yet in a terminal state, newest first.
    ///
    /// Includes `Cancelling`: a cancel in flight is not yet resolved.
    #[must_use]
    pub fn open_orders(&self) -> Vec<Order> {
        let mut orders = self.order_history();
        orders.retain(|o| o.status.is_open());
        orders
    }

    /// Orders in a terminal state, newest first.
    #[must_use]
    pub fn completed_orders(&self) -> Vec<Order> {
        let mut orders = self.order_history();
        orders.retain(|o| o.status.is_terminal());
        orders
    }

    /// Snapshot of a single order.
    #[must_use]
    pub fn get_order(&self, order_id: &OrderId) -> Option<Order> {
        self.orders.read().get(order_id).cloned()
    }

    /// The transient feed of recently applied updates, oldest first.
    #[must_use]
    pub fn recent_updates(&self) -> Vec<OrderStatusUpdate> {
        self.recent_updates.lock().iter().cloned().collect()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe to coarse-grained "history changed" notifications.
    ///
    /// Fires synchronously after any mutation of the order set.
    pub fn on_history_update<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&HistoryChanged) + Send + Sync + 'static,
    {
        self.history_changed.subscribe(listener)
    }

    /// Subscribe to fine-grained per-order updates.
    ///
    /// Fires with the triggering [`OrderStatusUpdate`] after it has
    /// been applied (or synthesized by a local command result).
    pub fn on_order_update<F>(&self, listener: F) -> SubscriptionHandle
    where
        F: Fn(&OrderStatusUpdate) + Send + Sync + 'static,
    {
        self.order_updated.subscribe(listener)
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// Place a new order.
    ///
    /// The order is recorded locally as `Pending` before the command
    /// goes out, so it is visible in `open_orders` immediately. On
    /// venue rejection it transitions directly to `Rejected` and the
    /// error comes back as a typed result carrying the order id.
    ///
    /// # Errors
    ///
    /// [`PlaceError::InvalidSpec`] for a non-positive amount (no
    /// command issued); [`PlaceError::Rejected`] when the venue turns
    /// the order down.
    pub async fn place_order(&self, spec: OrderSpec) -> Result<OrderId, PlaceError> {
        if spec.amount <= Decimal::ZERO {
            return Err(PlaceError::InvalidSpec {
                reason: format!("amount must be positive, got {}", spec.amount),
            });
        }

        let order_id = OrderId::new();
        let now = Utc::now();
        let order = Order::from_spec(order_id.clone(), &spec, now);

        self.orders.write().insert(order_id.clone(), order);
        self.history_changed.dispatch(&HistoryChanged);

        tracing::info!(
            order_id = %order_id,
            instrument = %spec.instrument,
            direction = %spec.direction,
            amount = %spec.amount,
            price = %spec.price,
            "order placed locally, submitting to venue"
        );

        match self.commands.submit_order(&order_id, &spec).await {
            Ok(()) => Ok(order_id),
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(order_id = %order_id, error = %reason, "placement rejected");

                {
                    let mut orders = self.orders.write();
                    if let Some(order) = orders.get_mut(&order_id) {
                        order.status = OrderStatus::Rejected;
                        order.updated_at = Utc::now();
                    }
                }

                let mut update =
                    OrderStatusUpdate::new(order_id.clone(), OrderStatus::Rejected, Utc::now());
                update.error = Some(reason.clone());
                self.record_and_notify(update);

                Err(PlaceError::Rejected { order_id, reason })
            }
        }
    }

    /// Request cancellation of an order.
    ///
    /// Transitions the order to `Cancelling` optimistically before the
    /// command goes out. `Ok` means the venue accepted the request;
    /// only a subsequent `cancelled` push resolves it. On venue
    /// refusal the order reverts to its pre-cancel status.
    ///
    /// # Errors
    ///
    /// [`CancelError::NotFound`] / [`CancelError::InvalidState`] fail
    /// immediately without issuing a command; [`CancelError::Venue`]
    /// reports a venue-side refusal (status already reverted).
    pub async fn cancel_order(&self, order_id: &OrderId) -> Result<(), CancelError> {
        let prior_status = {
            let mut orders = self.orders.write();
            let order = orders
                .get_mut(order_id)
                .ok_or_else(|| CancelError::NotFound(order_id.clone()))?;

            if !order.status.is_cancellable() {
                return Err(CancelError::InvalidState {
                    status: order.status,
                });
            }

            let prior = order.status;
            order.status = OrderStatus::Cancelling;
            prior
        };

        self.pending_cancels
            .lock()
            .insert(order_id.clone(), prior_status);

        let update =
            OrderStatusUpdate::new(order_id.clone(), OrderStatus::Cancelling, Utc::now());
        self.record_and_notify(update);

        tracing::info!(order_id = %order_id, from = %prior_status, "cancel requested");

        match self.commands.cancel_order(order_id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                let reason = e.to_string();
                tracing::warn!(order_id = %order_id, error = %reason, "cancel refused, reverting");

                // The pending-cancels map is the revert target's source
                // of truth: a racing push resolves the cancel and clears
                // the entry, in which case there is nothing to revert.
                let pending = self.pending_cancels.lock().remove(order_id);

                let reverted = {
                    let mut orders = self.orders.write();
                    match (orders.get_mut(order_id), pending) {
                        (Some(order), Some(prior))
                            if order.status == OrderStatus::Cancelling =>
                        {
                            order.status = prior;
                            Some(prior)
                        }
                        _ => None,
                    }
                };

                if let Some(prior) = reverted {
                    let mut update =
                        OrderStatusUpdate::new(order_id.clone(), prior, Utc::now());
                    update.error = Some(reason.clone());
                    self.record_and_notify(update);
                }

                Err(CancelError::Venue { reason })
            }
        }
    }

    /// Cancel every currently cancellable order.
    ///
    /// The target set is captured atomically before any command goes
    /// out; a failure on one order never blocks attempts on the
    /// others. Outcomes are reported per order id.
    pub async fn cancel_all_open_orders(&self) -> Vec<(OrderId, Result<(), CancelError>)> {
        let targets: Vec<OrderId> = {
            let orders = self.orders.read();
            orders
                .values()
                .filter(|o| o.status.is_cancellable())
                .map(|o| o.id.clone())
                .collect()
        };

        tracing::info!(count = targets.len(), "cancelling all open orders");

        let mut outcomes = Vec::with_capacity(targets.len());
        for order_id in targets {
            let result = self.cancel_order(&order_id).await;
            outcomes.push((order_id, result));
        }
        outcomes
    }

    // =========================================================================
    // Event Application
    // =========================================================================

    /// Apply an inbound status update.
    ///
    /// Unknown ids synthesize a minimal recovery record. Stale,
    /// terminal-state and backward-transition updates are logged as
    /// anomalies and dropped without mutation or notification.
    pub fn apply_update(&self, update: OrderStatusUpdate) {
        let applied = {
            let mut orders = self.orders.write();
            let order = orders.entry(update.order_id.clone()).or_insert_with(|| {
                tracing::info!(
                    order_id = %update.order_id,
                    "update for unknown order, synthesizing recovery record"
                );
                Order::recovered(&update)
            });

            match order.apply_update(&update) {
                Ok(()) => true,
                Err(e) => {
                    tracing::warn!(
                        order_id = %update.order_id,
                        status = %update.status,
                        error = %e,
                        "anomalous order update dropped"
                    );
                    false
                }
            }
        };

        if !applied {
            return;
        }

        // A confirmed resolution clears any in-flight cancel bookkeeping.
        if update.status != OrderStatus::Cancelling {
            self.pending_cancels.lock().remove(&update.order_id);
        }

        tracing::debug!(
            order_id = %update.order_id,
            status = %update.status,
            filled_delta = ?update.filled_delta,
            "order update applied"
        );

        self.record_and_notify(update);
    }

    // =========================================================================
    // Internal
    // =========================================================================

    /// Push to the recent-updates feed and fire both listener classes.
    ///
    /// Must be called with no registry locks held: listeners are free
    /// to call back into the query methods.
    fn record_and_notify(&self, update: OrderStatusUpdate) {
        {
            let mut recent = self.recent_updates.lock();
            recent.push_back(update.clone());
            while recent.len() > self.recent_capacity {
                recent.pop_front();
            }
        }

        self.order_updated.dispatch(&update);
        self.history_changed.dispatch(&HistoryChanged);
    }
}

// =============================================================================
// Tests
// =============================================================================
