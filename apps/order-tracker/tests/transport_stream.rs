//! Transport Integration Tests
//!
//! Runs the venue transport against an in-process WebSocket server and
//! checks subscription on connect, push decoding with junk tolerance,
//! and command/response correlation.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use rust_decimal_macros::dec;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use order_tracker::{
    OrderId, OrderSpec, OrderStatus, ReconnectConfig, Side, TransportConfig, TransportEvent,
    VenueCommandClient, VenueCommandError, VenueCommandPort, VenueTransport,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

fn test_config(addr: std::net::SocketAddr) -> TransportConfig {
    TransportConfig {
        url: format!("ws://{addr}"),
        channels: vec!["user.orders".to_string()],
        reconnect: ReconnectConfig {
            delay: Duration::from_millis(10),
            max_attempts: 1,
        },
    }
}

fn order_push(order_id: &str, state: &str, qty: &str, ts: u64) -> String {
    format!(
        r#"{{"jsonrpc":"2.0","method":"subscription","params":{{"channel":"user.orders","data":{{"order_id":"{order_id}","order_state":"{state}","instrument_name":"BTC-PERPETUAL","direction":"buy","amount":"10","price":"50000","fill_amount":"{qty}","fill_price":"50000","timestamp":{ts}}}}}}}"#
    )
}

async fn next_event(rx: &mut mpsc::Receiver<TransportEvent>) -> TransportEvent {
    timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for transport event")
        .expect("event channel closed")
}

#[tokio::test]
async fn subscribes_on_connect_and_decodes_pushes() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // First frame from the client must be the subscribe request.
        let subscribe = ws.next().await.unwrap().unwrap();
        let subscribe: serde_json::Value =
            serde_json::from_str(subscribe.to_text().unwrap()).unwrap();
        assert_eq!(subscribe["jsonrpc"], "2.0");
        assert_eq!(subscribe["method"], "subscribe");
        assert_eq!(subscribe["params"]["channels"][0], "user.orders");
        let subscribe_id = subscribe["id"].as_u64().unwrap();

        ws.send(Message::Text(
            format!(r#"{{"jsonrpc":"2.0","id":{subscribe_id},"result":["user.orders"]}}"#).into(),
        ))
        .await
        .unwrap();

        // A real push, junk in between, then another push.
        ws.send(Message::Text(
            order_push("sv-1", "open", "0", 1_700_000_000_000).into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text("not json at all".into())).await.unwrap();
        ws.send(Message::Text(
            r#"{"jsonrpc":"2.0","method":"subscription","params":{"channel":"ticker.BTC","data":{"last":"50000"}}}"#.into(),
        ))
        .await
        .unwrap();
        ws.send(Message::Text(
            order_push("sv-1", "partially_filled", "4", 1_700_000_000_100).into(),
        ))
        .await
        .unwrap();

        // Keep the socket open until the client hangs up.
        while ws.next().await.is_some() {}
    });

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let (transport, handle, _commands) =
        VenueTransport::new(test_config(addr), event_tx, cancel);
    let runner = tokio::spawn(transport.run());

    assert!(matches!(
        next_event(&mut event_rx).await,
        TransportEvent::Connected
    ));

    let first = next_event(&mut event_rx).await;
    let TransportEvent::OrderUpdate(first) = first else {
        panic!("expected order update, got {first:?}");
    };
    assert_eq!(first.order_id, OrderId::from("sv-1"));
    assert_eq!(first.status, OrderStatus::Open);

    // The junk frames in between are dropped without an event.
    let second = next_event(&mut event_rx).await;
    let TransportEvent::OrderUpdate(second) = second else {
        panic!("expected order update, got {second:?}");
    };
    assert_eq!(second.status, OrderStatus::PartiallyFilled);
    assert_eq!(second.filled_delta, Some(dec!(4)));

    handle.disconnect();
    let result = timeout(RECV_TIMEOUT, runner).await.unwrap().unwrap();
    assert!(result.is_ok());
    server.abort();
}

#[tokio::test]
async fn commands_correlate_with_responses() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();

        // Subscribe request, acknowledged.
        let subscribe = ws.next().await.unwrap().unwrap();
        let subscribe: serde_json::Value =
            serde_json::from_str(subscribe.to_text().unwrap()).unwrap();
        let subscribe_id = subscribe["id"].as_u64().unwrap();
        ws.send(Message::Text(
            format!(r#"{{"jsonrpc":"2.0","id":{subscribe_id},"result":["user.orders"]}}"#).into(),
        ))
        .await
        .unwrap();

        // Cancel request succeeds.
        let cancel = ws.next().await.unwrap().unwrap();
        let cancel: serde_json::Value = serde_json::from_str(cancel.to_text().unwrap()).unwrap();
        assert_eq!(cancel["method"], "private/cancel");
        assert_eq!(cancel["params"]["order_id"], "ord-1");
        let cancel_id = cancel["id"].as_u64().unwrap();
        ws.send(Message::Text(
            format!(r#"{{"jsonrpc":"2.0","id":{cancel_id},"result":{{}}}}"#).into(),
        ))
        .await
        .unwrap();

        // Buy request is refused.
        let buy = ws.next().await.unwrap().unwrap();
        let buy: serde_json::Value = serde_json::from_str(buy.to_text().unwrap()).unwrap();
        assert_eq!(buy["method"], "private/buy");
        assert_eq!(buy["params"]["instrument_name"], "BTC-PERPETUAL");
        let buy_id = buy["id"].as_u64().unwrap();
        ws.send(Message::Text(
            format!(
                r#"{{"jsonrpc":"2.0","id":{buy_id},"error":{{"code":10009,"message":"not_enough_funds"}}}}"#
            )
            .into(),
        ))
        .await
        .unwrap();

        while ws.next().await.is_some() {}
    });

    let (event_tx, mut event_rx) = mpsc::channel(64);
    let cancel = CancellationToken::new();
    let (transport, handle, command_sender) =
        VenueTransport::new(test_config(addr), event_tx, cancel);
    let runner = tokio::spawn(transport.run());

    assert!(matches!(
        next_event(&mut event_rx).await,
        TransportEvent::Connected
    ));

    let client = VenueCommandClient::new(command_sender);

    let cancelled = client.cancel_order(&OrderId::from("ord-1")).await;
    assert!(cancelled.is_ok());

    let spec = OrderSpec {
        instrument: "BTC-PERPETUAL".to_string(),
        direction: Side::Buy,
        amount: dec!(1),
        price: dec!(50000),
    };
    let refused = client
        .submit_order(&OrderId::from("ord-2"), &spec)
        .await
        .unwrap_err();
    assert_eq!(
        refused,
        VenueCommandError::Rejected {
            reason: "not_enough_funds".to_string()
        }
    );

    handle.disconnect();
    let result = timeout(RECV_TIMEOUT, runner).await.unwrap().unwrap();
    assert!(result.is_ok());
    server.abort();
}
