// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-receiver-socket
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The Socket Receiver (§4.J): maintains a persistent duplex WebSocket
//! channel to the platform. Each inbound frame carries an `envelope_id`;
//! acknowledgement is an outbound frame carrying the same id alongside an
//! optional payload. The receiver wraps that id as the Ack Controller's
//! eventual response and otherwise defers entirely to the injected
//! [`Dispatcher`], exactly as the HTTP receiver does.

use async_trait::async_trait;
use bolt_classifier::ClassifyOutcome;
use bolt_core::Envelope;
use bolt_runtime::{AckController, CancellationToken};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, warn};

/// Runs the authorize → context-build → middleware → router pipeline for
/// one classified envelope — the same seam the HTTP receiver's own
/// `Dispatcher` trait fills.
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Process `envelope`. Implementations are responsible for calling
    /// `ack.ack(..)` themselves, directly or via the Router's default.
    async fn dispatch(&self, envelope: Envelope, cancellation: CancellationToken, ack: AckController);
}

#[derive(Debug, Clone, Deserialize)]
struct InboundFrame {
    #[serde(default)]
    envelope_id: Option<String>,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "type", default)]
    frame_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutboundAck {
    envelope_id: String,
    payload: Value,
}

/// Connection + ack-budget settings for a [`SocketReceiver`].
pub struct SocketReceiverConfig {
    /// The `wss://` URL to connect to (obtained out of band, e.g. via an
    /// `apps.connections.open`-style handshake — that call is an outbound
    /// platform API concern and out of scope here).
    pub url: String,
    /// Deadline, in milliseconds, before the Ack Controller's timer fires.
    pub unhandled_request_timeout_millis: u64,
}

/// The Socket Receiver (§4.J).
pub struct SocketReceiver {
    dispatcher: Arc<dyn Dispatcher>,
    config: SocketReceiverConfig,
}

impl SocketReceiver {
    /// Build a receiver around a given [`Dispatcher`] and connection config.
    #[must_use]
    pub fn new(dispatcher: Arc<dyn Dispatcher>, config: SocketReceiverConfig) -> Self {
        Self { dispatcher, config }
    }

    /// Connect and process frames until the socket closes or `shutdown`
    /// fires, at which point the channel is closed gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial connection attempt fails.
    pub async fn run(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        let (stream, _response) = tokio_tungstenite::connect_async(&self.config.url).await?;
        let (sink, mut source) = stream.split();
        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let writer_task = tokio::spawn(run_writer(sink, writer_rx));

        let deadline = Duration::from_millis(self.config.unhandled_request_timeout_millis);
        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    debug!(target: "bolt.receiver.socket", "shutdown requested, closing socket");
                    break;
                }
                next = source.next() => {
                    match next {
                        Some(Ok(message)) => handle_message(message, &self.dispatcher, &writer_tx, deadline),
                        Some(Err(err)) => {
                            warn!(target: "bolt.receiver.socket", %err, "socket read error");
                            break;
                        }
                        None => {
                            debug!(target: "bolt.receiver.socket", "socket closed by peer");
                            break;
                        }
                    }
                }
            }
        }

        drop(writer_tx);
        let _ = writer_task.await;
        Ok(())
    }
}

async fn run_writer<S>(mut sink: S, mut rx: mpsc::UnboundedReceiver<Message>)
where
    S: futures::Sink<Message, Error = tokio_tungstenite::tungstenite::Error> + Unpin,
{
    while let Some(message) = rx.recv().await {
        if let Err(err) = sink.send(message).await {
            warn!(target: "bolt.receiver.socket", %err, "failed to write to socket");
            break;
        }
    }
}

fn handle_message(
    message: Message,
    dispatcher: &Arc<dyn Dispatcher>,
    writer_tx: &mpsc::UnboundedSender<Message>,
    deadline: Duration,
) {
    let text = match message {
        Message::Text(text) => text,
        Message::Ping(payload) => {
            let _ = writer_tx.send(Message::Pong(payload));
            return;
        }
        Message::Close(_) => return,
        _ => return,
    };

    let frame: InboundFrame = match serde_json::from_str(&text) {
        Ok(frame) => frame,
        Err(err) => {
            warn!(target: "bolt.receiver.socket", %err, "malformed socket frame");
            return;
        }
    };

    let Some(envelope_id) = frame.envelope_id else {
        debug!(target: "bolt.receiver.socket", frame_type = ?frame.frame_type, "control frame, no envelope to dispatch");
        return;
    };

    dispatch_frame(envelope_id, frame.payload, dispatcher.clone(), writer_tx.clone(), deadline);
}

fn dispatch_frame(
    envelope_id: String,
    payload: Value,
    dispatcher: Arc<dyn Dispatcher>,
    writer_tx: mpsc::UnboundedSender<Message>,
    deadline: Duration,
) {
    let raw = serde_json::to_vec(&payload).unwrap_or_default();
    match bolt_classifier::classify(&raw, Some("application/json")) {
        ClassifyOutcome::SslCheck => send_ack(&writer_tx, envelope_id, Value::Null),
        ClassifyOutcome::UrlVerification { challenge } => {
            send_ack(&writer_tx, envelope_id, serde_json::json!({ "challenge": challenge }));
        }
        ClassifyOutcome::Unclassified => {
            debug!(target: "bolt.receiver.socket", "payload did not match any known envelope shape");
            send_ack(&writer_tx, envelope_id, Value::Null);
        }
        ClassifyOutcome::Envelope(envelope) => {
            let (controller, awaiter) = AckController::with_deadline(deadline);
            let cancellation = controller.cancellation();

            let task_dispatcher = dispatcher.clone();
            let task_controller = controller.clone();
            tokio::spawn(async move {
                task_dispatcher.dispatch(envelope, cancellation, task_controller).await;
            });

            tokio::spawn(async move {
                let body = awaiter.wait_or_deadline(&controller.cancellation()).await;
                send_ack(&writer_tx, envelope_id, body);
            });
        }
    }
}

fn send_ack(writer_tx: &mpsc::UnboundedSender<Message>, envelope_id: String, payload: Value) {
    let frame = OutboundAck { envelope_id, payload };
    match serde_json::to_string(&frame) {
        Ok(text) => {
            let _ = writer_tx.send(Message::Text(text.into()));
        }
        Err(err) => warn!(target: "bolt.receiver.socket", %err, "failed to encode ack frame"),
    }
}
