//! JSON messages exchanged with connected viewers.

use serde::{Deserialize, Serialize};

/// Inbound text a viewer sends to check the connection is alive.
pub const PING: &str = "ping";

/// A message pushed to a viewer, tagged on the wire by its `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Message {
    ConnectionStatus {
        status: String,
        message: String,
    },
    InitialLines {
        lines: Vec<String>,
        count: usize,
        timestamp: f64,
    },
    NewLines {
        lines: Vec<String>,
        count: usize,
        timestamp: f64,
    },
    Pong,
}

impl Message {
    /// Readiness acknowledgment sent right after a viewer is registered.
    pub fn connected() -> Self {
        Self::ConnectionStatus {
            status: "connected".to_string(),
            message: "Successfully connected to log stream".to_string(),
        }
    }

    pub fn initial_lines(lines: Vec<String>, timestamp: f64) -> Self {
        Self::InitialLines {
            count: lines.len(),
            lines,
            timestamp,
        }
    }

    pub fn new_lines(lines: Vec<String>, timestamp: f64) -> Self {
        Self::NewLines {
            count: lines.len(),
            lines,
            timestamp,
        }
    }

    /// Serialize to the JSON text frame sent to viewers.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Whether inbound text from a viewer is a liveness probe.
pub fn is_ping(text: &str) -> bool {
    text.trim() == PING
}
