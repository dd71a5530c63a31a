//! Venue Wire Protocol Types
//!
//! JSON-RPC 2.0 envelopes for the venue's streaming API: outbound
//! subscribe and order commands, inbound push notifications and call
//! responses.
//!
//! # Wire Format
//!
//! Outbound request:
//! ```json
//! {"jsonrpc":"2.0","id":3,"method":"subscribe","params":{"channels":["user.orders"]}}
//! ```
//!
//! Inbound push (only `method == "subscription"` frames with a
//! recognized order payload are accepted; everything else is dropped):
//! ```json
//! {"jsonrpc":"2.0","method":"subscription","params":{"channel":"user.orders",
//!  "data":{"order_id":"...","order_state":"open","instrument_name":"BTC-PERPETUAL",
//!          "direction":"buy","amount":"10","price":"50000","timestamp":1700000000000}}}
//! ```
//!
//! The exact schema of order pushes is assumed structurally analogous
//! to the subscription envelope; validate against the live venue
//! protocol before shipping.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::order::{OrderId, OrderSpec, OrderStatus, OrderStatusUpdate, Side};

/// JSON-RPC protocol version sent on every request.
pub const JSONRPC_VERSION: &str = "2.0";

/// Method name for channel subscription.
pub const METHOD_SUBSCRIBE: &str = "subscribe";
/// Method name for buy order placement.
pub const METHOD_BUY: &str = "private/buy";
/// Method name for sell order placement.
pub const METHOD_SELL: &str = "private/sell";
/// Method name for order cancellation.
pub const METHOD_CANCEL: &str = "private/cancel";
/// Method name the venue uses on push notifications.
pub const METHOD_SUBSCRIPTION: &str = "subscription";

/// Channel carrying order lifecycle pushes.
pub const ORDERS_CHANNEL: &str = "user.orders";

// =============================================================================
// Outbound Requests
// =============================================================================

/// Parameters of a subscribe request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscribeParams {
    /// Channels to subscribe to.
    pub channels: Vec<String>,
}

/// Parameters of a buy/sell placement request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceParams {
    /// Locally assigned order id, echoed back in pushes.
    pub client_order_id: OrderId,
    /// Instrument to trade.
    pub instrument_name: String,
    /// Requested size.
    pub amount: Decimal,
    /// Limit price.
    pub price: Decimal,
}

/// Parameters of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelParams {
    /// Order to cancel.
    pub order_id: OrderId,
}

/// Typed parameter payloads for outbound requests.
///
/// Serialized untagged: the `method` field of the envelope carries the
/// discriminator on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestParams {
    /// Subscribe to push channels.
    Subscribe(SubscribeParams),
    /// Place an order (method selects buy vs sell).
    Place(PlaceParams),
    /// Cancel an order.
    Cancel(CancelParams),
}

/// An outbound JSON-RPC request envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VenueRequest {
    /// Always "2.0".
    pub jsonrpc: String,
    /// Request id; responses are correlated by it.
    pub id: u64,
    /// Method name.
    pub method: String,
    /// Method parameters.
    pub params: RequestParams,
}

impl VenueRequest {
    /// Build a subscribe request for the given channels.
    #[must_use]
    pub fn subscribe(id: u64, channels: Vec<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: METHOD_SUBSCRIBE.to_string(),
            params: RequestParams::Subscribe(SubscribeParams { channels }),
        }
    }

    /// Build a placement request from an order spec.
    #[must_use]
    pub fn place(id: u64, client_order_id: OrderId, spec: &OrderSpec) -> Self {
        let method = match spec.direction {
            Side::Buy => METHOD_BUY,
            Side::Sell => METHOD_SELL,
        };
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params: RequestParams::Place(PlaceParams {
                client_order_id,
                instrument_name: spec.instrument.clone(),
                amount: spec.amount,
                price: spec.price,
            }),
        }
    }

    /// Build a cancel request.
    #[must_use]
    pub fn cancel(id: u64, order_id: OrderId) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: METHOD_CANCEL.to_string(),
            params: RequestParams::Cancel(CancelParams { order_id }),
        }
    }
}

// =============================================================================
// Inbound Frames
// =============================================================================

/// Error object inside a failed call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorObject {
    /// Venue error code.
    pub code: i64,
    /// Human-readable message.
    pub message: String,
}

/// Response to an outbound request, correlated by `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallResponse {
    /// Id of the request this answers.
    pub id: u64,
    /// Result payload on success.
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    /// Error on failure.
    #[serde(default)]
    pub error: Option<ErrorObject>,
}

/// Order lifecycle state as reported on the wire.
///
/// The venue never pushes the locally-synthesized states (`pending`,
/// `cancelling`); an unrecognized state fails deserialization and the
/// whole frame is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireOrderState {
    /// Acknowledged, not yet on the book.
    Submitted,
    /// Resting on the book.
    Open,
    /// Partially executed.
    PartiallyFilled,
    /// Completely executed.
    Filled,
    /// Cancelled.
    Cancelled,
    /// Rejected.
    Rejected,
    /// Expired.
    Expired,
}

impl From<WireOrderState> for OrderStatus {
    fn from(state: WireOrderState) -> Self {
        match state {
            WireOrderState::Submitted => Self::Submitted,
            WireOrderState::Open => Self::Open,
            WireOrderState::PartiallyFilled => Self::PartiallyFilled,
            WireOrderState::Filled => Self::Filled,
            WireOrderState::Cancelled => Self::Cancelled,
            WireOrderState::Rejected => Self::Rejected,
            WireOrderState::Expired => Self::Expired,
        }
    }
}

/// Payload of an order push on the orders channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPushData {
    /// Order id (the client id for locally placed orders, or a
    /// venue-assigned id for orders created elsewhere).
    pub order_id: OrderId,
    /// Reported lifecycle state.
    pub order_state: WireOrderState,
    /// Instrument name.
    pub instrument_name: String,
    /// Order direction.
    pub direction: Side,
    /// Total requested size.
    pub amount: Decimal,
    /// Limit price.
    pub price: Decimal,
    /// Size filled by this event (incremental).
    #[serde(default)]
    pub fill_amount: Option<Decimal>,
    /// Execution price of `fill_amount`.
    #[serde(default)]
    pub fill_price: Option<Decimal>,
    /// Fee charged by this event (incremental).
    #[serde(default)]
    pub fee: Option<Decimal>,
    /// Venue event timestamp, epoch milliseconds.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
    /// Venue-reported error, when the event carries one.
    #[serde(default)]
    pub reject_reason: Option<String>,
}

impl From<OrderPushData> for OrderStatusUpdate {
    fn from(data: OrderPushData) -> Self {
        Self {
            order_id: data.order_id,
            status: data.order_state.into(),
            timestamp: data.timestamp,
            filled_delta: data.fill_amount,
            fill_price: data.fill_price,
            fee_delta: data.fee,
            error: data.reject_reason,
            instrument: Some(data.instrument_name),
            direction: Some(data.direction),
            amount: Some(data.amount),
            price: Some(data.price),
        }
    }
}

/// Parameters of an inbound subscription push.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionParams {
    /// Channel the push belongs to.
    pub channel: String,
    /// Channel-specific payload.
    pub data: serde_json::Value,
}

/// A decoded inbound frame the transport acts on.
#[derive(Debug, Clone, PartialEq)]
pub enum VenueFrame {
    /// An order lifecycle push from the orders channel.
    OrderPush(OrderPushData),
    /// A response to an outbound request.
    CallResponse(CallResponse),
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn subscribe_request_wire_shape() {
        let request = VenueRequest::subscribe(7, vec![ORDERS_CHANNEL.to_string()]);
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();

        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "subscribe");
        assert_eq!(json["params"]["channels"][0], "user.orders");
    }

    #[test]
    fn place_request_method_tracks_direction() {
        let spec = OrderSpec {
            instrument: "BTC-PERPETUAL".to_string(),
            direction: Side::Sell,
            amount: dec!(2),
            price: dec!(64000),
        };
        let request = VenueRequest::place(3, OrderId::from("local-1"), &spec);
        assert_eq!(request.method, METHOD_SELL);

        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&request).unwrap()).unwrap();
        assert_eq!(json["params"]["instrument_name"], "BTC-PERPETUAL");
        assert_eq!(json["params"]["client_order_id"], "local-1");
    }

    #[test]
    fn order_push_decodes_and_converts() {
        let raw = r#"{
            "order_id": "venue-99",
            "order_state": "partially_filled",
            "instrument_name": "BTC-PERPETUAL",
            "direction": "buy",
            "amount": "10",
            "price": "50000",
            "fill_amount": "4",
            "fill_price": "49950",
            "fee": "0.1",
            "timestamp": 1700000000000
        }"#;

        let data: OrderPushData = serde_json::from_str(raw).unwrap();
        assert_eq!(data.order_state, WireOrderState::PartiallyFilled);

        let update: OrderStatusUpdate = data.into();
        assert_eq!(update.order_id, OrderId::from("venue-99"));
        assert_eq!(update.status, OrderStatus::PartiallyFilled);
        assert_eq!(update.filled_delta, Some(dec!(4)));
        assert_eq!(update.fill_price, Some(dec!(49950)));
        assert_eq!(update.fee_delta, Some(dec!(0.1)));
        assert_eq!(
            update.timestamp,
            DateTime::from_timestamp_millis(1_700_000_000_000).unwrap()
        );
    }

    #[test]
    fn unknown_order_state_fails_deserialization() {
        let raw = r#"{
            "order_id": "venue-99",
            "order_state": "halted",
            "instrument_name": "BTC-PERPETUAL",
            "direction": "buy",
            "amount": "10",
            "price": "50000",
            "timestamp": 1700000000000
        }"#;
        assert!(serde_json::from_str::<OrderPushData>(raw).is_err());
    }

    #[test]
    fn call_response_with_error() {
        let raw = r#"{"jsonrpc":"2.0","id":12,"error":{"code":10009,"message":"not_enough_funds"}}"#;
        let response: CallResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.id, 12);
        assert!(response.result.is_none());
        assert_eq!(response.error.unwrap().message, "not_enough_funds");
    }
}
