//! Venue Command Client (Driven Adapter)
//!
//! Implements the registry's [`VenueCommandPort`] on top of the
//! transport's command channel. Each port call becomes a JSON-RPC
//! request on the shared socket; the awaited response decides the
//! outcome.

use async_trait::async_trait;

use super::messages::{CancelParams, METHOD_BUY, METHOD_CANCEL, METHOD_SELL, PlaceParams, RequestParams};
use super::transport::CommandSender;
use crate::application::ports::{VenueCommandError, VenueCommandPort};
use crate::domain::order::{OrderId, OrderSpec, Side};

/// Order command adapter over the venue WebSocket transport.
#[derive(Debug, Clone)]
pub struct VenueCommandClient {
    sender: CommandSender,
}

impl VenueCommandClient {
    /// Wrap a transport command sender.
    #[must_use]
    pub const fn new(sender: CommandSender) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl VenueCommandPort for VenueCommandClient {
    async fn submit_order(
        &self,
        client_order_id: &OrderId,
        spec: &OrderSpec,
    ) -> Result<(), VenueCommandError> {
        let method = match spec.direction {
            Side::Buy => METHOD_BUY,
            Side::Sell => METHOD_SELL,
        };
        let params = RequestParams::Place(PlaceParams {
            client_order_id: client_order_id.clone(),
            instrument_name: spec.instrument.clone(),
            amount: spec.amount,
            price: spec.price,
        });

        self.sender.call(method, params).await.map(|_| ())
    }

    async fn cancel_order(&self, order_id: &OrderId) -> Result<(), VenueCommandError> {
        let params = RequestParams::Cancel(CancelParams {
            order_id: order_id.clone(),
        });

        self.sender.call(METHOD_CANCEL, params).await.map(|_| ())
    }
}
