// SPDX-License-Identifier: MIT OR Apache-2.0
//! End-to-end Socket receiver coverage against a local WebSocket server
//! standing in for the platform's Socket Mode endpoint.

use async_trait::async_trait;
use bolt_core::Envelope;
use bolt_receiver_socket::{Dispatcher, SocketReceiver, SocketReceiverConfig};
use bolt_runtime::{AckController, CancellationToken};
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;

struct EchoingDispatcher {
    reply: Value,
}

#[async_trait]
impl Dispatcher for EchoingDispatcher {
    async fn dispatch(&self, _envelope: Envelope, _cancellation: CancellationToken, ack: AckController) {
        let _ = ack.ack(self.reply.clone());
    }
}

/// Starts a bare WebSocket server that sends one envelope frame to whatever
/// client connects, then forwards every frame it receives back onto
/// `received`.
async fn spawn_platform_stub(received: mpsc::UnboundedSender<Message>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let (mut sink, mut source) = ws.split();

        let envelope = json!({
            "type": "event_callback",
            "team_id": "T1",
            "event": { "type": "app_mention", "user": "U1", "channel": "C1", "text": "hi" }
        });
        let frame = json!({ "envelope_id": "env-xyz", "payload": envelope }).to_string();
        sink.send(Message::Text(frame.into())).await.unwrap();

        while let Some(Ok(message)) = source.next().await {
            if received.send(message).is_err() {
                break;
            }
        }
    });

    format!("ws://{addr}")
}

#[tokio::test]
async fn inbound_envelope_is_dispatched_and_acked_with_matching_envelope_id() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let url = spawn_platform_stub(tx).await;

    let dispatcher = Arc::new(EchoingDispatcher { reply: json!({ "handled": true }) });
    let receiver = SocketReceiver::new(
        dispatcher,
        SocketReceiverConfig { url, unhandled_request_timeout_millis: 2000 },
    );

    let shutdown = CancellationToken::new();
    let shutdown_for_run = shutdown.clone();
    let run_handle = tokio::spawn(async move { receiver.run(shutdown_for_run).await });

    let ack = tokio::time::timeout(std::time::Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for ack frame")
        .expect("server channel closed");

    let Message::Text(text) = ack else { panic!("expected a text ack frame") };
    let parsed: Value = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed["envelope_id"], "env-xyz");
    assert_eq!(parsed["payload"]["handled"], true);

    shutdown.cancel();
    tokio::time::timeout(std::time::Duration::from_secs(2), run_handle)
        .await
        .expect("receiver did not shut down in time")
        .unwrap()
        .unwrap();
}
