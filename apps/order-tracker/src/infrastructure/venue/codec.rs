//! JSON Frame Codec
//!
//! Encodes outbound JSON-RPC requests and decodes inbound frames from
//! the venue stream. Decoding is lossy on purpose: frames that are not
//! order pushes or call responses (heartbeats, other channels,
//! malformed payloads) are logged at debug level and dropped, never
//! surfaced as errors.

use super::messages::{
    CallResponse, METHOD_SUBSCRIPTION, OrderPushData, ORDERS_CHANNEL, SubscriptionParams,
    VenueFrame, VenueRequest,
};

/// Errors when encoding an outbound request.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Request failed to serialize.
    #[error("failed to encode request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Stateless codec for the venue's JSON wire format.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl JsonCodec {
    /// Encode an outbound request as a JSON text frame.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::Encode`] if serialization fails.
    pub fn encode(&self, request: &VenueRequest) -> Result<String, CodecError> {
        Ok(serde_json::to_string(request)?)
    }

    /// Decode an inbound text frame.
    ///
    /// Returns `None` for anything the transport should not act on:
    /// unparseable text, pushes from channels other than the orders
    /// channel, and order payloads that do not match the expected
    /// schema.
    #[must_use]
    pub fn decode(&self, text: &str) -> Option<VenueFrame> {
        let value: serde_json::Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(error) => {
                tracing::debug!(%error, "dropping unparseable frame");
                return None;
            }
        };

        if value.get("method").and_then(serde_json::Value::as_str) == Some(METHOD_SUBSCRIPTION) {
            return self.decode_push(value);
        }

        if value.get("id").is_some() {
            match serde_json::from_value::<CallResponse>(value) {
                Ok(response) => return Some(VenueFrame::CallResponse(response)),
                Err(error) => {
                    tracing::debug!(%error, "dropping malformed call response");
                    return None;
                }
            }
        }

        tracing::debug!("dropping frame with no method or id");
        None
    }

    fn decode_push(&self, value: serde_json::Value) -> Option<VenueFrame> {
        let params = match value.get("params") {
            Some(params) => params.clone(),
            None => {
                tracing::debug!("dropping subscription frame without params");
                return None;
            }
        };

        let params: SubscriptionParams = match serde_json::from_value(params) {
            Ok(params) => params,
            Err(error) => {
                tracing::debug!(%error, "dropping malformed subscription params");
                return None;
            }
        };

        if params.channel != ORDERS_CHANNEL {
            tracing::debug!(channel = %params.channel, "ignoring push from unrelated channel");
            return None;
        }

        match serde_json::from_value::<OrderPushData>(params.data) {
            Ok(data) => Some(VenueFrame::OrderPush(data)),
            Err(error) => {
                tracing::debug!(%error, "dropping unrecognized order payload");
                None
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
