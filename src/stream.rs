//! Stream adapter over a [`Tailer`] for library users who want batches
//! without running a broadcaster.

use crate::error::Result;
use crate::tailer::{TailConfig, Tailer};
use futures::Stream;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

/// A stream of line batches appended to a file after the stream was created.
pub struct LineStream {
    receiver: mpsc::UnboundedReceiver<Vec<String>>,
    tailer: Tailer,
}

impl LineStream {
    /// Start tailing `path`, polling every `poll_interval`.
    pub async fn new<P: AsRef<Path>>(path: P, poll_interval: Duration) -> Result<Self> {
        Self::with_config(TailConfig::new(path, poll_interval)).await
    }

    pub async fn with_config(config: TailConfig) -> Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let tailer = Tailer::with_sink(config, Arc::new(tx))?;
        tailer.start().await;

        Ok(LineStream {
            receiver: rx,
            tailer,
        })
    }

    pub fn tailer(&self) -> &Tailer {
        &self.tailer
    }

    /// Stop tailing. Batches already produced can still be read, after which
    /// the stream ends.
    pub async fn stop(&self) {
        self.tailer.stop().await;
        self.tailer.clear_sink().await;
    }
}

impl Stream for LineStream {
    type Item = Vec<String>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.receiver).poll_recv(cx)
    }
}
