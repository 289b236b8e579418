//! A relay that streams newly appended lines of a growing text file to many
//! live viewers, in the spirit of `tail -f` over a WebSocket.
//!
//! The pipeline has three parts:
//!
//! - [`source`]: file primitives (size, last N lines, lines appended since an
//!   offset, encoding detection).
//! - [`Tailer`]: polls one file, tracks its read offset, survives truncation
//!   and hands new lines to a [`LineSink`].
//! - [`Broadcaster`]: the registry of connected viewers, fanning each batch out
//!   and pruning viewers whose sends fail.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tail_relay::{Broadcaster, TailConfig, Tailer};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broadcaster = Arc::new(Broadcaster::new());
//!     let tailer = Tailer::with_sink(
//!         TailConfig::new("app.log", Duration::from_millis(100)),
//!         broadcaster.clone(),
//!     )?;
//!
//!     tailer.start().await;
//!     // register viewers with `broadcaster.register(..)`
//!     tailer.stop().await;
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod config;
mod error;
pub mod message;
pub mod server;
pub mod source;
mod stream;
pub mod tailer;

#[cfg(test)]
mod test_helpers;

pub use broadcast::{BroadcastReport, BroadcastStats, Broadcaster, Consumer, ConsumerId, ConsumerInfo};
pub use config::Config;
pub use error::{Error, Result};
pub use message::Message;
pub use source::TrailingLine;
pub use stream::LineStream;
pub use tailer::{LineSink, TailConfig, TailStatus, Tailer};

use std::path::Path;
use std::time::Duration;

/// Creates a stream of line batches appended to a file from now on.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tail_relay::tail_lines;
/// use tokio_stream::StreamExt;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut stream = tail_lines("app.log", Duration::from_millis(100)).await?;
///
///     while let Some(lines) = stream.next().await {
///         for line in lines {
///             println!("{}", line);
///         }
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail_lines<P: AsRef<Path>>(path: P, poll_interval: Duration) -> Result<LineStream> {
    LineStream::new(path, poll_interval).await
}
