// SPDX-License-Identifier: MIT OR Apache-2.0
//! bolt-receiver-http
#![deny(unsafe_code)]
#![warn(missing_docs)]
//!
//! The HTTP ingress receiver (§4.J): binds a port, verifies + classifies
//! every inbound request to the events endpoint, and hands the classified
//! [`Envelope`] to an app-supplied [`Dispatcher`] alongside a fresh
//! [`AckController`]. Custom routes are matched with the standalone
//! [`routes`] matcher rather than Axum's own route table, since their set
//! is only known once [`bolt_config::AppConfig`] has been loaded.

/// Graceful-shutdown drain guard.
pub mod drain;
/// Request-id tagging and structured request logging.
pub mod middleware;
/// Standalone `:name`-segment path matcher for custom routes.
pub mod routes;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use bolt_classifier::ClassifyOutcome;
use bolt_core::Envelope;
use bolt_runtime::{AckController, CancellationToken};
use drain::DrainGuard;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Runs the authorize → context-build → middleware → router pipeline for
/// one classified envelope.
///
/// Implemented by the application assembly layer; the receiver only owns
/// transport concerns (verification, classification, response shape).
#[async_trait]
pub trait Dispatcher: Send + Sync {
    /// Process `envelope`. Implementations are responsible for calling
    /// `ack.ack(..)` themselves — directly, or via the Router's default
    /// empty-body ack when no listener matches (§4.G point 4).
    async fn dispatch(&self, envelope: Envelope, cancellation: CancellationToken, ack: AckController);
}

/// Handles one matched custom route (§6, §12.2).
#[async_trait]
pub trait CustomRouteHandler: Send + Sync {
    /// Handle a request matching this route's pattern.
    async fn handle(&self, params: BTreeMap<String, String>, query: BTreeMap<String, String>, body: Bytes) -> Response;
}

/// One registered custom route: its spec plus the handler to run.
pub struct CustomRoute {
    /// Method and `:name`-segmented path pattern, as configured.
    pub spec: bolt_config::CustomRouteSpec,
    /// Handler invoked on a match.
    pub handler: Arc<dyn CustomRouteHandler>,
}

/// Configuration the receiver needs beyond what [`Dispatcher`] already
/// captures — derived from [`bolt_config::AppConfig`] by the host.
pub struct HttpReceiverConfig {
    /// Path the events route is served from, e.g. `/slack/events`.
    pub events_path: String,
    /// Process-before-respond vs. respond-then-process (§4.E).
    pub process_before_response: bool,
    /// Deadline, in milliseconds, before the Ack Controller's timer fires.
    pub unhandled_request_timeout_millis: u64,
    /// Additional routes beyond the events endpoint.
    pub custom_routes: Vec<CustomRoute>,
}

struct AppState {
    verifier: Option<bolt_verify::RequestVerifier>,
    dispatcher: Arc<dyn Dispatcher>,
    config: HttpReceiverConfig,
    drain: Arc<DrainGuard>,
}

/// The HTTP Receiver (§4.J).
pub struct HttpReceiver {
    state: Arc<AppState>,
}

impl HttpReceiver {
    /// Build a receiver. `verifier` is `None` only when the host has chosen
    /// to skip HTTP verification entirely (e.g. a non-HTTP receiver is
    /// otherwise primary and this instance only serves custom routes).
    #[must_use]
    pub fn new(
        verifier: Option<bolt_verify::RequestVerifier>,
        dispatcher: Arc<dyn Dispatcher>,
        config: HttpReceiverConfig,
    ) -> Self {
        Self {
            state: Arc::new(AppState {
                verifier,
                dispatcher,
                config,
                drain: DrainGuard::new(),
            }),
        }
    }

    /// Build the Axum [`Router`] serving the events endpoint and every
    /// custom route.
    #[must_use]
    pub fn build_router(&self) -> Router {
        Router::new()
            .route(&self.state.config.events_path, post(handle_events))
            .fallback(handle_fallback)
            .layer(axum::middleware::from_fn(middleware::request_logger))
            .layer(axum::middleware::from_fn(middleware::request_id_middleware))
            .with_state(self.state.clone())
    }

    /// Bind `addr` and serve until `shutdown_deadline` has elapsed after a
    /// Ctrl-C/SIGTERM signal, draining in-flight requests (§4.J, §12.4).
    ///
    /// # Errors
    ///
    /// Returns an error if binding the listener fails.
    pub async fn start(&self, addr: std::net::SocketAddr, shutdown_deadline: Duration) -> anyhow::Result<()> {
        let listener = tokio::net::TcpListener::bind(addr).await?;
        let drain = self.state.drain.clone();
        let router = self.build_router();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                let _ = tokio::signal::ctrl_c().await;
            })
            .await?;

        drain.shutdown(shutdown_deadline).await;
        Ok(())
    }
}

async fn handle_events(State(state): State<Arc<AppState>>, headers: HeaderMap, body: Bytes) -> Response {
    let _permit = state.drain.enter();
    let raw_body = body.to_vec();
    let content_type = headers
        .get(axum::http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    if let Some(verifier) = &state.verifier {
        let timestamp = header_str(&headers, "x-bolt-request-timestamp");
        let signature = header_str(&headers, "x-bolt-signature");
        if let Err(err) = verifier.verify(timestamp, signature, &raw_body) {
            warn!(target: "bolt.receiver.http", %err, "request verification failed");
            return (StatusCode::UNAUTHORIZED, Json(json!({ "error": err.to_string() }))).into_response();
        }
    }

    match bolt_classifier::classify(&raw_body, content_type) {
        ClassifyOutcome::SslCheck => (StatusCode::OK, Json(json!({}))).into_response(),
        ClassifyOutcome::UrlVerification { challenge } => {
            (StatusCode::OK, Json(json!({ "challenge": challenge }))).into_response()
        }
        ClassifyOutcome::Unclassified => {
            debug!(target: "bolt.receiver.http", "request body did not match any known envelope shape");
            (StatusCode::OK, Json(json!({}))).into_response()
        }
        ClassifyOutcome::Envelope(mut envelope) => {
            apply_header_fields(&mut envelope, &headers);
            respond_to_envelope(&state, envelope).await
        }
    }
}

async fn respond_to_envelope(state: &Arc<AppState>, envelope: Envelope) -> Response {
    let deadline = Duration::from_millis(state.config.unhandled_request_timeout_millis);
    let (controller, awaiter) = AckController::with_deadline(deadline);
    let cancellation = controller.cancellation();

    let dispatcher = state.dispatcher.clone();
    let controller_for_task = controller.clone();
    tokio::spawn(async move {
        dispatcher.dispatch(envelope, cancellation, controller_for_task).await;
    });

    if state.config.process_before_response {
        let body = awaiter.wait_or_deadline(&controller.cancellation()).await;
        (StatusCode::OK, Json(body)).into_response()
    } else {
        (StatusCode::OK, Json(json!({}))).into_response()
    }
}

fn apply_header_fields(envelope: &mut Envelope, headers: &HeaderMap) {
    envelope.retry_num = header_str(headers, "x-bolt-retry-num")
        .and_then(|v| if v.is_empty() { None } else { v.parse().ok() });
    envelope.retry_reason = header_str(headers, "x-bolt-retry-reason")
        .filter(|v| !v.is_empty())
        .map(str::to_string);
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> &'a str {
    headers.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
}

async fn handle_fallback(State(state): State<Arc<AppState>>, headers: HeaderMap, uri: axum::http::Uri, method: axum::http::Method, body: Bytes) -> Response {
    let _permit = state.drain.enter();
    let _ = &headers;
    let path = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or(uri.path());
    for route in &state.config.custom_routes {
        if !route.spec.method.eq_ignore_ascii_case(method.as_str()) {
            continue;
        }
        if let Some(params) = routes::matches_pattern(&route.spec.path_pattern, path) {
            let query: BTreeMap<String, String> = uri
                .query()
                .map(|q| {
                    url_query_pairs(q)
                        .into_iter()
                        .collect()
                })
                .unwrap_or_default();
            return route.handler.handle(params, query, body).await;
        }
    }
    (StatusCode::NOT_FOUND, Json(json!({ "error": "no matching route" }))).into_response()
}

fn url_query_pairs(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (k.to_string(), v.to_string()),
            None => (pair.to_string(), String::new()),
        })
        .collect()
}
