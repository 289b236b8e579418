//! WebSocket viewers.
//!
//! Each upgraded socket is split: the sending half becomes a registered
//! [`Consumer`] driven by the broadcaster, the receiving half is read here
//! for liveness probes and disconnects.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{ConnectInfo, Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use futures::future::BoxFuture;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::AppState;
use crate::broadcast::{Consumer, ConsumerInfo};
use crate::error::{Error, Result};
use crate::message::{self, Message};
use crate::source;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Number of recent lines to send on connect.
    pub n: Option<usize>,
}

/// Upgrade to a WebSocket and stream lines to the viewer.
///
/// # Route
///
/// `GET /ws?n=<initial lines>`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(query): Query<WsQuery>,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let initial = query.n.unwrap_or(state.initial_lines);
    ws.on_upgrade(move |socket| handle_socket(socket, addr, initial, state))
}

/// Sending half of one WebSocket.
struct WsConsumer {
    sender: Mutex<SplitSink<WebSocket, WsMessage>>,
}

impl Consumer for WsConsumer {
    fn send_text(&self, text: String) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            let mut sender = self.sender.lock().await;
            sender
                .send(WsMessage::Text(text.into()))
                .await
                .map_err(|e| Error::Send {
                    reason: e.to_string(),
                })
        })
    }
}

async fn handle_socket(socket: WebSocket, addr: SocketAddr, initial: usize, state: Arc<AppState>) {
    let (sender, mut receiver) = socket.split();
    let consumer = Arc::new(WsConsumer {
        sender: Mutex::new(sender),
    });
    let info = ConsumerInfo::new(addr.ip().to_string(), addr.port());

    let broadcaster = &state.broadcaster;
    let id = match broadcaster.register(consumer, Some(info)).await {
        Ok(id) => id,
        Err(e) => {
            warn!(%addr, error = %e, "WebSocket viewer could not be registered");
            return;
        }
    };

    let lines = source::read_last_n_lines(state.tailer.path(), initial).await;
    broadcaster.send_initial_lines(lines, id).await;

    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                if message::is_ping(text.as_str()) {
                    broadcaster.send_direct(&Message::Pong, id).await;
                }
            }
            Ok(WsMessage::Close(_)) => {
                debug!(consumer = %id, "WebSocket viewer closed the connection");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                debug!(consumer = %id, error = %e, "WebSocket error");
                break;
            }
        }

        // Pruned by a failed send
        if !broadcaster.is_registered(id).await {
            break;
        }
    }

    broadcaster.unregister(id).await;
}
