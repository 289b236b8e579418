//! HTTP and WebSocket host for the relay.
//!
//! The core only needs "send text to a viewer" and "accept a viewer"; this
//! module supplies both on top of axum and adds a few JSON status endpoints.

pub mod handlers;
pub mod router;
pub mod ws;

use crate::broadcast::Broadcaster;
use crate::error::{Error, Result};
use crate::tailer::Tailer;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

pub use router::build_router;

/// Shared state handed to every handler.
pub struct AppState {
    pub broadcaster: Arc<Broadcaster>,
    pub tailer: Arc<Tailer>,
    /// Lines sent to a viewer on connect when it does not ask for a count.
    pub initial_lines: usize,
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    pub fn new(broadcaster: Arc<Broadcaster>, tailer: Arc<Tailer>, initial_lines: usize) -> Self {
        Self {
            broadcaster,
            tailer,
            initial_lines,
            static_dir: None,
        }
    }

    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }
}

/// Bind to `addr` and serve until `shutdown` resolves.
pub async fn start_server<F>(addr: &str, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Bind(format!("invalid address {addr}: {e}")))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Bind(format!("bind failed on {addr}: {e}")))?;

    serve(listener, state, shutdown).await
}

/// Serve on an already bound listener until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    let router = build_router(state);

    info!(%addr, "Tail relay listening");

    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| Error::Serve(e.to_string()))
}
