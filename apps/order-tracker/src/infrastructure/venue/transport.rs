//! Venue Stream Transport
//!
//! Owns the WebSocket connection to the venue: connects, subscribes to
//! the order channel, decodes pushes into lifecycle events, and
//! multiplexes outbound JSON-RPC commands over the same socket with
//! response correlation by request id.
//!
//! # Connection Lifecycle
//!
//! On any connection loss the transport retries with a fixed delay and
//! a bounded attempt budget ([`ReconnectPolicy`]); a successful
//! connection resets the budget. When the budget is spent a
//! [`TransportEvent::ConnectionExhausted`] is emitted and `run`
//! returns an error. Cancelling the token stops the transport at any
//! point, including during a pending reconnect delay.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::codec::{CodecError, JsonCodec};
use super::messages::{CallResponse, JSONRPC_VERSION, RequestParams, VenueFrame, VenueRequest};
use super::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::application::ports::VenueCommandError;
use crate::domain::order::OrderStatusUpdate;

// =============================================================================
// Error Type
// =============================================================================

/// Errors that can occur in the venue transport.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// WebSocket connection failed.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Codec error.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Maximum reconnection attempts exceeded.
    #[error("maximum reconnection attempts exceeded")]
    ReconnectAttemptsExhausted,

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Transport was started twice.
    #[error("transport already running")]
    AlreadyRunning,
}

// =============================================================================
// Transport Events
// =============================================================================

/// Events emitted by the transport over its event channel.
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// Connected and subscribed to the order channel.
    Connected,
    /// An established connection was lost. Only ever follows a
    /// [`TransportEvent::Connected`] for the same session.
    Disconnected,
    /// Reconnecting to the venue.
    Reconnecting {
        /// Reconnection attempt number.
        attempt: u32,
    },
    /// An order lifecycle update arrived on the stream.
    OrderUpdate(Box<OrderStatusUpdate>),
    /// The reconnect budget is spent; the transport has given up.
    ConnectionExhausted,
}

// =============================================================================
// Command Channel
// =============================================================================

/// Reply payload for an in-flight command.
type CommandOutcome = Result<serde_json::Value, VenueCommandError>;

/// An outbound command queued for the transport to send.
#[derive(Debug)]
pub struct CommandRequest {
    /// JSON-RPC method name.
    pub method: String,
    /// Method parameters.
    pub params: RequestParams,
    /// One-shot reply channel resolved when the response arrives.
    pub reply: oneshot::Sender<CommandOutcome>,
}

/// Cloneable handle for issuing commands through the transport.
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandRequest>,
}

impl CommandSender {
    /// Send a command and wait for the venue's response.
    ///
    /// # Errors
    ///
    /// Returns [`VenueCommandError::Unavailable`] if the transport has
    /// stopped or the connection dropped before a response arrived, or
    /// whatever error the venue answered with.
    pub async fn call(
        &self,
        method: &str,
        params: RequestParams,
    ) -> Result<serde_json::Value, VenueCommandError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        let request = CommandRequest {
            method: method.to_string(),
            params,
            reply: reply_tx,
        };

        self.tx
            .send(request)
            .await
            .map_err(|_| VenueCommandError::Unavailable("transport stopped".to_string()))?;

        reply_rx
            .await
            .map_err(|_| VenueCommandError::Unavailable("connection lost".to_string()))?
    }
}

// =============================================================================
// Transport Handle
// =============================================================================

/// Handle for stopping a running transport.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    cancel: CancellationToken,
}

impl TransportHandle {
    /// Stop the transport.
    ///
    /// Takes effect immediately: an open connection is torn down and a
    /// pending reconnect delay is abandoned without firing.
    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Whether the transport has been asked to stop.
    #[must_use]
    pub fn is_disconnected(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

// =============================================================================
// Transport Configuration
// =============================================================================

/// Configuration for the venue transport.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// WebSocket URL.
    pub url: String,
    /// Channels to subscribe to on connect.
    pub channels: Vec<String>,
    /// Reconnection configuration.
    pub reconnect: ReconnectConfig,
}

impl TransportConfig {
    /// Create a new configuration with default reconnection settings.
    #[must_use]
    pub fn new(url: String, channels: Vec<String>) -> Self {
        Self {
            url,
            channels,
            reconnect: ReconnectConfig::default(),
        }
    }
}

// =============================================================================
// Venue Transport
// =============================================================================

/// Command channel depth.
const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Venue WebSocket transport.
///
/// Single-writer design: the run loop owns both halves of the socket,
/// so commands from any number of [`CommandSender`] clones are
/// serialized through one channel and correlated with responses by
/// request id.
pub struct VenueTransport {
    config: TransportConfig,
    codec: JsonCodec,
    event_tx: mpsc::Sender<TransportEvent>,
    command_rx: Option<mpsc::Receiver<CommandRequest>>,
    cancel: CancellationToken,
    next_id: AtomicU64,
}

impl VenueTransport {
    /// Create a new transport together with its stop handle and
    /// command sender.
    #[must_use]
    pub fn new(
        config: TransportConfig,
        event_tx: mpsc::Sender<TransportEvent>,
        cancel: CancellationToken,
    ) -> (Self, TransportHandle, CommandSender) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let handle = TransportHandle {
            cancel: cancel.clone(),
        };
        let transport = Self {
            config,
            codec: JsonCodec,
            event_tx,
            command_rx: Some(command_rx),
            cancel,
            next_id: AtomicU64::new(1),
        };
        (transport, handle, CommandSender { tx: command_tx })
    }

    /// Run the transport connection loop.
    ///
    /// Connects, subscribes, and processes frames until cancelled or
    /// the reconnect budget is spent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::ReconnectAttemptsExhausted`] after the
    /// final failed attempt, or the underlying error for
    /// non-recoverable failures.
    pub async fn run(mut self) -> Result<(), TransportError> {
        let mut command_rx = self
            .command_rx
            .take()
            .ok_or(TransportError::AlreadyRunning)?;
        let mut policy = ReconnectPolicy::new(self.config.reconnect.clone());

        loop {
            if self.cancel.is_cancelled() {
                tracing::info!("venue transport cancelled");
                return Ok(());
            }

            let mut session_connected = false;
            match self
                .connect_and_stream(&mut command_rx, &mut policy, &mut session_connected)
                .await
            {
                Ok(()) => {
                    tracing::info!("venue connection closed gracefully");
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(error = %e, "venue connection error");

                    // A session that never came up was never announced;
                    // only a loss of an announced session is one.
                    if session_connected {
                        let _ = self.event_tx.send(TransportEvent::Disconnected).await;
                    }

                    if let Some(delay) = policy.next_delay() {
                        let attempt = policy.attempt_count();
                        tracing::info!(
                            attempt,
                            delay_ms = delay.as_millis(),
                            "reconnecting to venue stream"
                        );

                        let _ = self
                            .event_tx
                            .send(TransportEvent::Reconnecting { attempt })
                            .await;

                        tokio::select! {
                            () = self.cancel.cancelled() => {
                                tracing::info!("venue transport cancelled during reconnect delay");
                                return Ok(());
                            }
                            () = tokio::time::sleep(delay) => {}
                        }
                    } else {
                        tracing::error!("reconnect attempts exhausted, giving up");
                        let _ = self.event_tx.send(TransportEvent::ConnectionExhausted).await;
                        return Err(TransportError::ReconnectAttemptsExhausted);
                    }
                }
            }
        }
    }

    /// Connect, subscribe, and stream until error or cancellation.
    async fn connect_and_stream(
        &self,
        command_rx: &mut mpsc::Receiver<CommandRequest>,
        policy: &mut ReconnectPolicy,
        session_connected: &mut bool,
    ) -> Result<(), TransportError> {
        tracing::info!(url = %self.config.url, "connecting to venue stream");

        let (ws_stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        policy.reset();

        // In-flight commands awaiting responses, keyed by request id.
        let mut pending: HashMap<u64, oneshot::Sender<CommandOutcome>> = HashMap::new();

        let subscribe_id = self.next_request_id();
        let subscribe = VenueRequest::subscribe(subscribe_id, self.config.channels.clone());
        write
            .send(Message::Text(self.codec.encode(&subscribe)?.into()))
            .await?;

        let _ = self.event_tx.send(TransportEvent::Connected).await;
        *session_connected = true;

        let mut commands_open = true;
        let result = loop {
            tokio::select! {
                () = self.cancel.cancelled() => {
                    break Ok(());
                }
                command = command_rx.recv(), if commands_open => {
                    match command {
                        Some(command) => {
                            if let Err(e) = self
                                .send_command(command, &mut write, &mut pending)
                                .await
                            {
                                break Err(e);
                            }
                        }
                        None => {
                            tracing::debug!("command channel closed");
                            commands_open = false;
                        }
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            self.handle_frame(&text, subscribe_id, &mut pending).await;
                        }
                        Some(Ok(Message::Binary(data))) => {
                            match String::from_utf8(data.to_vec()) {
                                Ok(text) => {
                                    self.handle_frame(&text, subscribe_id, &mut pending).await;
                                }
                                Err(_) => {
                                    tracing::warn!(
                                        len = data.len(),
                                        "received non-UTF8 binary frame"
                                    );
                                }
                            }
                        }
                        Some(Ok(Message::Ping(data))) => {
                            if let Err(e) = write.send(Message::Pong(data)).await {
                                break Err(e.into());
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("server sent close frame");
                            break Err(TransportError::ConnectionClosed);
                        }
                        Some(Ok(_)) => {
                            // Ignore other frame types.
                        }
                        Some(Err(e)) => {
                            break Err(e.into());
                        }
                        None => {
                            tracing::info!("WebSocket stream ended");
                            break Err(TransportError::ConnectionClosed);
                        }
                    }
                }
            }
        };

        // The connection is gone; nothing in flight can complete.
        for (_, reply) in pending.drain() {
            let _ = reply.send(Err(VenueCommandError::Unavailable(
                "connection lost".to_string(),
            )));
        }

        result
    }

    /// Assign an id to a queued command and put it on the wire.
    async fn send_command<W>(
        &self,
        command: CommandRequest,
        write: &mut W,
        pending: &mut HashMap<u64, oneshot::Sender<CommandOutcome>>,
    ) -> Result<(), TransportError>
    where
        W: futures_util::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
    {
        let id = self.next_request_id();
        let request = VenueRequest {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: command.method,
            params: command.params,
        };

        let text = match self.codec.encode(&request) {
            Ok(text) => text,
            Err(e) => {
                let _ = command.reply.send(Err(VenueCommandError::Unavailable(format!(
                    "failed to encode command: {e}"
                ))));
                return Ok(());
            }
        };

        tracing::debug!(id, method = %request.method, "sending command");

        if let Err(e) = write.send(Message::Text(text.into())).await {
            let _ = command.reply.send(Err(VenueCommandError::Unavailable(
                "connection lost".to_string(),
            )));
            return Err(e.into());
        }

        pending.insert(id, command.reply);
        Ok(())
    }

    /// Decode and dispatch a single inbound text frame.
    async fn handle_frame(
        &self,
        text: &str,
        subscribe_id: u64,
        pending: &mut HashMap<u64, oneshot::Sender<CommandOutcome>>,
    ) {
        let Some(frame) = self.codec.decode(text) else {
            return;
        };

        match frame {
            VenueFrame::OrderPush(data) => {
                tracing::debug!(
                    order_id = %data.order_id,
                    state = ?data.order_state,
                    "order update received"
                );
                let _ = self
                    .event_tx
                    .send(TransportEvent::OrderUpdate(Box::new(data.into())))
                    .await;
            }
            VenueFrame::CallResponse(response) => {
                self.handle_response(response, subscribe_id, pending);
            }
        }
    }

    fn handle_response(
        &self,
        response: CallResponse,
        subscribe_id: u64,
        pending: &mut HashMap<u64, oneshot::Sender<CommandOutcome>>,
    ) {
        if response.id == subscribe_id {
            match response.error {
                Some(error) => {
                    tracing::error!(code = error.code, msg = %error.message, "subscribe refused");
                }
                None => {
                    tracing::info!(channels = ?self.config.channels, "subscription acknowledged");
                }
            }
            return;
        }

        let Some(reply) = pending.remove(&response.id) else {
            tracing::debug!(id = response.id, "response for unknown request id");
            return;
        };

        let outcome = match response.error {
            Some(error) => Err(VenueCommandError::Rejected {
                reason: error.message,
            }),
            None => Ok(response.result.unwrap_or(serde_json::Value::Null)),
        };
        let _ = reply.send(outcome);
    }

    fn next_request_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::super::messages::{CancelParams, METHOD_CANCEL};
    use super::*;
    use crate::domain::order::OrderId;

    fn fast_config(url: &str, max_attempts: u32) -> TransportConfig {
        TransportConfig {
            url: url.to_string(),
            channels: vec!["user.orders".to_string()],
            reconnect: ReconnectConfig {
                delay: Duration::from_millis(10),
                max_attempts,
            },
        }
    }

    #[tokio::test]
    async fn unreachable_venue_exhausts_reconnect_budget() {
        // Nothing listens on this port, every attempt is refused.
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let (transport, _handle, _commands) = VenueTransport::new(
            fast_config("ws://127.0.0.1:9", 3),
            event_tx,
            CancellationToken::new(),
        );

        let result = transport.run().await;
        assert!(matches!(
            result,
            Err(TransportError::ReconnectAttemptsExhausted)
        ));

        let mut reconnect_attempts = Vec::new();
        let mut disconnects = 0;
        let mut exhausted = false;
        while let Ok(event) = event_rx.try_recv() {
            match event {
                TransportEvent::Reconnecting { attempt } => reconnect_attempts.push(attempt),
                TransportEvent::Disconnected => disconnects += 1,
                TransportEvent::ConnectionExhausted => exhausted = true,
                _ => {}
            }
        }
        assert_eq!(reconnect_attempts, vec![1, 2, 3]);
        assert_eq!(
            disconnects, 0,
            "a session that never connected must not report a disconnect"
        );
        assert!(exhausted, "exhaustion must be surfaced as an event");
    }

    #[tokio::test]
    async fn disconnect_cancels_pending_reconnect() {
        let (event_tx, mut event_rx) = mpsc::channel(64);
        let mut config = fast_config("ws://127.0.0.1:9", 5);
        // Long enough that the test would time out if the delay ran.
        config.reconnect.delay = Duration::from_secs(60);

        let cancel = CancellationToken::new();
        let (transport, handle, _commands) =
            VenueTransport::new(config, event_tx, cancel);
        let runner = tokio::spawn(transport.run());

        // Wait for the first reconnect delay to start.
        loop {
            match event_rx.recv().await {
                Some(TransportEvent::Reconnecting { attempt }) => {
                    assert_eq!(attempt, 1);
                    break;
                }
                Some(_) => {}
                None => panic!("event channel closed before reconnect"),
            }
        }

        handle.disconnect();

        let result = tokio::time::timeout(Duration::from_secs(5), runner)
            .await
            .expect("disconnect must abort the pending reconnect")
            .expect("runner task panicked");
        tokio_test::assert_ok!(result, "cancellation is a graceful stop");
        assert!(handle.is_disconnected());
    }

    #[tokio::test]
    async fn command_fails_fast_when_transport_stopped() {
        let (event_tx, _event_rx) = mpsc::channel(64);
        let cancel = CancellationToken::new();
        let (transport, _handle, commands) = VenueTransport::new(
            fast_config("ws://127.0.0.1:9", 0),
            event_tx,
            cancel,
        );

        // Zero reconnect budget: run returns on the first failure.
        let _ = transport.run().await;

        let result = commands
            .call(
                METHOD_CANCEL,
                RequestParams::Cancel(CancelParams {
                    order_id: OrderId::from("gone"),
                }),
            )
            .await;
        assert!(matches!(result, Err(VenueCommandError::Unavailable(_))));
    }
}
