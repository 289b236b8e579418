//! Registry of connected viewers and fan-out of messages to them.
//!
//! Delivery is best effort. A viewer whose send fails or stalls past the send
//! timeout is dropped from the registry; the other viewers are unaffected.

use crate::error::{Error, Result};
use crate::message::Message;
use crate::tailer::LineSink;
use futures::future::{self, BoxFuture};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Default time a single send may take before the viewer is considered dead.
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// A sink for text messages, typically one WebSocket connection.
pub trait Consumer: Send + Sync {
    /// Complete any transport handshake. Called once before registration.
    fn accept(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(future::ready(Ok(())))
    }

    /// Deliver one text frame.
    fn send_text(&self, text: String) -> BoxFuture<'_, Result<()>>;
}

/// Identity of a registered consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConsumerId(u64);

impl fmt::Display for ConsumerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional metadata kept alongside a consumer for observability.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ConsumerInfo {
    #[serde(rename = "client_host", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(rename = "client_port", skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl ConsumerInfo {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: Some(host.into()),
            port: Some(port),
            extra: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.insert(key.into(), value.into());
        self
    }
}

/// Snapshot of the registry.
#[derive(Debug, Clone, Serialize)]
pub struct BroadcastStats {
    pub active_connections: usize,
    pub connection_info: BTreeMap<String, ConsumerInfo>,
}

/// Outcome of one broadcast pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub pruned: usize,
}

struct Entry {
    consumer: Arc<dyn Consumer>,
    info: Option<ConsumerInfo>,
}

/// Owns the live set of consumers and delivers messages to them.
pub struct Broadcaster {
    consumers: RwLock<HashMap<ConsumerId, Entry>>,
    next_id: AtomicU64,
    send_timeout: Duration,
    epoch: Instant,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            consumers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            send_timeout,
            epoch: Instant::now(),
        }
    }

    /// Accept a consumer, add it to the registry and acknowledge the connection.
    ///
    /// If the accept step fails nothing is registered. If the acknowledgment
    /// cannot be delivered the consumer is removed again. Both failures are
    /// returned to the caller. A consumer that is already registered keeps
    /// its id and is not acknowledged again.
    pub async fn register(
        &self,
        consumer: Arc<dyn Consumer>,
        info: Option<ConsumerInfo>,
    ) -> Result<ConsumerId> {
        if let Some(id) = find_consumer(&*self.consumers.read().await, &consumer) {
            debug!(consumer = %id, "Connection already registered");
            return Ok(id);
        }

        if let Err(e) = consumer.accept().await {
            error!(error = %e, "Error accepting connection");
            return Err(e);
        }

        let id = ConsumerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let connections = {
            let mut consumers = self.consumers.write().await;
            // Registered concurrently while this call was accepting
            if let Some(existing) = find_consumer(&consumers, &consumer) {
                return Ok(existing);
            }
            consumers.insert(
                id,
                Entry {
                    consumer: Arc::clone(&consumer),
                    info,
                },
            );
            consumers.len()
        };
        info!(consumer = %id, connections, "New connection established");

        let acknowledged = match Message::connected().to_json() {
            Ok(text) => self.send_to(consumer.as_ref(), text).await,
            Err(e) => Err(e.into()),
        };
        if let Err(e) = acknowledged {
            error!(consumer = %id, error = %e, "Connection failed readiness acknowledgment");
            self.unregister(id).await;
            return Err(Error::Accept {
                reason: e.to_string(),
            });
        }

        Ok(id)
    }

    /// Remove a consumer. Returns whether it was registered.
    pub async fn unregister(&self, id: ConsumerId) -> bool {
        let (removed, connections) = {
            let mut consumers = self.consumers.write().await;
            (consumers.remove(&id).is_some(), consumers.len())
        };
        if removed {
            info!(consumer = %id, connections, "Connection disconnected");
        }
        removed
    }

    /// Send a message to one consumer, dropping it if delivery fails.
    pub async fn send_direct(&self, message: &Message, id: ConsumerId) {
        let consumer = match self.consumers.read().await.get(&id) {
            Some(entry) => Arc::clone(&entry.consumer),
            None => {
                debug!(consumer = %id, "Skipping send to unregistered connection");
                return;
            }
        };

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to serialize message");
                return;
            }
        };

        if let Err(e) = self.send_to(consumer.as_ref(), text).await {
            warn!(consumer = %id, error = %e, "Error sending personal message");
            self.unregister(id).await;
        }
    }

    /// Send a message to every registered consumer.
    ///
    /// Sends run concurrently. Consumers that fail are removed only after
    /// every send in the pass has finished.
    pub async fn broadcast(&self, message: &Message) -> BroadcastReport {
        let targets: Vec<(ConsumerId, Arc<dyn Consumer>)> = self
            .consumers
            .read()
            .await
            .iter()
            .map(|(id, entry)| (*id, Arc::clone(&entry.consumer)))
            .collect();

        if targets.is_empty() {
            return BroadcastReport::default();
        }

        let text = match message.to_json() {
            Ok(text) => text,
            Err(e) => {
                error!(error = %e, "Failed to serialize broadcast message");
                return BroadcastReport::default();
            }
        };

        let outcomes = future::join_all(targets.iter().map(|(id, consumer)| {
            let text = text.clone();
            async move { (*id, self.send_to(consumer.as_ref(), text).await) }
        }))
        .await;

        let failed: Vec<ConsumerId> = outcomes
            .into_iter()
            .filter_map(|(id, outcome)| match outcome {
                Ok(()) => None,
                Err(e) => {
                    warn!(consumer = %id, error = %e, "Error broadcasting to connection");
                    Some(id)
                }
            })
            .collect();

        let mut pruned = 0;
        for id in &failed {
            if self.unregister(*id).await {
                pruned += 1;
            }
        }
        if pruned > 0 {
            info!(pruned, "Cleaned up broken connections");
        }

        BroadcastReport {
            delivered: targets.len() - failed.len(),
            pruned,
        }
    }

    /// Broadcast a batch of newly appended lines.
    pub async fn broadcast_new_lines(&self, lines: Vec<String>) -> BroadcastReport {
        if lines.is_empty() {
            return BroadcastReport::default();
        }

        let count = lines.len();
        let report = self
            .broadcast(&Message::new_lines(lines, self.timestamp()))
            .await;
        debug!(
            lines = count,
            clients = report.delivered,
            "Broadcasted new lines"
        );
        report
    }

    /// Send the recent history snapshot to a newly connected consumer.
    pub async fn send_initial_lines(&self, lines: Vec<String>, id: ConsumerId) {
        let count = lines.len();
        self.send_direct(&Message::initial_lines(lines, self.timestamp()), id)
            .await;
        debug!(consumer = %id, lines = count, "Sent initial lines");
    }

    pub async fn connection_count(&self) -> usize {
        self.consumers.read().await.len()
    }

    pub async fn is_registered(&self, id: ConsumerId) -> bool {
        self.consumers.read().await.contains_key(&id)
    }

    pub async fn stats(&self) -> BroadcastStats {
        let consumers = self.consumers.read().await;
        BroadcastStats {
            active_connections: consumers.len(),
            connection_info: consumers
                .iter()
                .filter_map(|(id, entry)| {
                    entry.info.as_ref().map(|info| (id.to_string(), info.clone()))
                })
                .collect(),
        }
    }

    /// Seconds on a monotonic clock since this broadcaster was created.
    fn timestamp(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    async fn send_to(&self, consumer: &dyn Consumer, text: String) -> Result<()> {
        match tokio::time::timeout(self.send_timeout, consumer.send_text(text)).await {
            Ok(result) => result,
            Err(_) => Err(Error::SendTimeout {
                timeout: self.send_timeout,
            }),
        }
    }
}

/// Id of the entry holding this exact consumer, if any.
fn find_consumer(
    consumers: &HashMap<ConsumerId, Entry>,
    consumer: &Arc<dyn Consumer>,
) -> Option<ConsumerId> {
    consumers
        .iter()
        .find(|(_, entry)| {
            std::ptr::addr_eq(Arc::as_ptr(&entry.consumer), Arc::as_ptr(consumer))
        })
        .map(|(id, _)| *id)
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl LineSink for Broadcaster {
    fn deliver(&self, lines: Vec<String>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            self.broadcast_new_lines(lines).await;
            Ok(())
        })
    }
}
