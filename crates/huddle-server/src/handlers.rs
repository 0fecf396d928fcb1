//! Connection handling.
//!
//! The wire transport is a WebSocket carrying one protocol line per text
//! frame. Each connection runs one task that pumps the socket and the
//! relay's outbound queue; the relay itself never touches the network, so
//! a slow or dead socket only ever stalls its own task.

use crate::config::Config;
use crate::metrics::{self, ConnectionMetricsGuard};
use anyhow::Result;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{SinkExt, StreamExt};
use huddle_core::{Relay, RelayConfig};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Shared server state.
pub struct AppState {
    /// The relay engine.
    pub relay: Relay,
    /// Server configuration.
    pub config: Config,
}

impl AppState {
    /// Create new app state.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let relay = Relay::new(RelayConfig {
            max_users: config.limits.max_users,
            max_groups: config.limits.max_groups,
        });

        Self { relay, config }
    }
}

/// Run the HTTP/WebSocket server.
///
/// # Errors
///
/// Returns an error if the server fails to start.
pub async fn run_server(config: Config) -> Result<()> {
    let state = Arc::new(AppState::new(config.clone()));

    // Start metrics server if enabled
    if config.metrics.enabled {
        if let Err(e) = metrics::start_metrics_server(config.metrics.port) {
            error!("Failed to start metrics server: {}", e);
        }
    }

    let app = Router::new()
        .route(&config.transport.websocket_path, get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state);

    let addr = config.bind_addr()?;
    let listener = TcpListener::bind(addr).await?;

    info!("Huddle server listening on {}", addr);
    info!(
        "WebSocket endpoint: ws://{}{}",
        addr, config.transport.websocket_path
    );

    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check handler.
async fn health_handler(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let stats = state.relay.stats();
    axum::Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "connections": stats.connections,
        "rooms": stats.rooms,
    }))
}

/// WebSocket upgrade handler.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_websocket(socket, state))
}

/// Handle one WebSocket connection from accept to teardown.
async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) {
    let _metrics_guard = ConnectionMetricsGuard::new();

    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<String>();
    let conn = state.relay.connect(outbound_tx);

    debug!(connection = %conn, "WebSocket connected");

    let (mut sender, mut receiver) = socket.split();

    loop {
        tokio::select! {
            biased;

            // Drain the relay's outbound queue into the socket. A write
            // failure is the transport-level disconnect signal.
            line = outbound_rx.recv() => {
                match line {
                    Some(line) => {
                        metrics::record_line("outbound");
                        if sender.send(Message::Text(line)).await.is_err() {
                            break;
                        }
                    }
                    // Queue closed: the relay already tore this connection down.
                    None => break,
                }
            }

            // Receive from the WebSocket; each text frame is one command line.
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(line))) => {
                        metrics::record_line("inbound");
                        state.relay.handle_line(conn, &line);
                        metrics::set_active_rooms(state.relay.stats().rooms);
                    }
                    Some(Ok(Message::Binary(_))) => {
                        // Text protocol; binary frames are dropped.
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection = %conn, "Received close frame");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(connection = %conn, error = %e, "WebSocket error");
                        metrics::record_error("websocket");
                        break;
                    }
                    None => {
                        debug!(connection = %conn, "WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    state.relay.disconnect(conn);
    metrics::set_active_rooms(state.relay.stats().rooms);

    debug!(connection = %conn, "WebSocket disconnected");
}
