//! Test utilities for creating temporary log files and scripted consumers.

#[cfg(test)]
use crate::broadcast::Consumer;
#[cfg(test)]
use crate::error::{Error, Result};
#[cfg(test)]
use crate::message::Message;
#[cfg(test)]
use futures::future::{self, BoxFuture};
#[cfg(test)]
use std::fs::{File, OpenOptions};
#[cfg(test)]
use std::io::Write;
#[cfg(test)]
use std::path::{Path, PathBuf};
#[cfg(test)]
use std::sync::atomic::{AtomicUsize, Ordering};
#[cfg(test)]
use std::sync::{Arc, Mutex};

#[cfg(test)]
pub struct TempLogFile {
    pub path: PathBuf,
    _temp_dir: tempfile::TempDir,
}

#[cfg(test)]
impl TempLogFile {
    /// Create a new empty temporary log file
    pub fn new() -> std::io::Result<Self> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("test.log");

        File::create(&path)?;

        Ok(Self {
            path,
            _temp_dir: temp_dir,
        })
    }

    /// Create a temporary log file with one initial line
    pub fn with_content(content: &str) -> std::io::Result<Self> {
        let temp_file = Self::new()?;
        temp_file.append_content(content)?;
        Ok(temp_file)
    }

    /// Append a line followed by a newline
    pub fn append_content(&self, content: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;

        writeln!(file, "{}", content)?;
        file.flush()?;
        Ok(())
    }

    /// Append bytes exactly as given
    pub fn append_raw(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(bytes)?;
        file.flush()?;
        Ok(())
    }

    /// Truncate the file (simulate log rotation)
    pub fn truncate(&self) -> std::io::Result<()> {
        File::create(&self.path)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the temporary file
    pub fn dir(&self) -> &Path {
        self._temp_dir.path()
    }
}

/// Encode text as UTF-16LE without a byte order mark.
#[cfg(test)]
pub fn utf16le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|unit| unit.to_le_bytes()).collect()
}

#[cfg(test)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behavior {
    Healthy,
    FailSends,
    RejectAccept,
    Stall,
}

/// A consumer that records what it is sent and fails on demand.
#[cfg(test)]
pub struct RecordingConsumer {
    behavior: Mutex<Behavior>,
    sent: Mutex<Vec<String>>,
    attempts: AtomicUsize,
}

#[cfg(test)]
impl RecordingConsumer {
    pub fn new() -> Arc<Self> {
        Self::with_behavior(Behavior::Healthy)
    }

    pub fn with_behavior(behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            behavior: Mutex::new(behavior),
            sent: Mutex::new(Vec::new()),
            attempts: AtomicUsize::new(0),
        })
    }

    pub fn set_behavior(&self, behavior: Behavior) {
        *self.behavior.lock().unwrap() = behavior;
    }

    pub fn messages(&self) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|text| serde_json::from_str(text).unwrap())
            .collect()
    }

    /// Line batches received through `new_lines` messages
    pub fn new_lines(&self) -> Vec<Vec<String>> {
        self.messages()
            .into_iter()
            .filter_map(|message| match message {
                Message::NewLines { lines, .. } => Some(lines),
                _ => None,
            })
            .collect()
    }

    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Consumer for RecordingConsumer {
    fn accept(&self) -> BoxFuture<'_, Result<()>> {
        let result = match *self.behavior.lock().unwrap() {
            Behavior::RejectAccept => Err(Error::Accept {
                reason: "rejected by test".to_string(),
            }),
            _ => Ok(()),
        };
        Box::pin(future::ready(result))
    }

    fn send_text(&self, text: String) -> BoxFuture<'_, Result<()>> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let behavior = *self.behavior.lock().unwrap();
        match behavior {
            Behavior::FailSends => Box::pin(future::ready(Err(Error::Send {
                reason: "connection reset".to_string(),
            }))),
            Behavior::Stall => Box::pin(future::pending()),
            Behavior::Healthy | Behavior::RejectAccept => {
                self.sent.lock().unwrap().push(text);
                Box::pin(future::ready(Ok(())))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_temp_log_file_creation() {
        let temp_file = TempLogFile::new().unwrap();
        assert!(temp_file.path().exists());
        assert!(temp_file.path().starts_with(temp_file.dir()));
    }

    #[tokio::test]
    async fn test_temp_log_file_with_content() {
        let content = "test line";
        let temp_file = TempLogFile::with_content(content).unwrap();

        let file_content = std::fs::read_to_string(temp_file.path()).unwrap();
        assert_eq!(file_content, "test line\n");
    }

    #[tokio::test]
    async fn test_append_raw_and_truncate() {
        let temp_file = TempLogFile::new().unwrap();
        temp_file.append_raw(b"no newline").unwrap();
        assert_eq!(std::fs::read(temp_file.path()).unwrap(), b"no newline");

        temp_file.truncate().unwrap();
        assert_eq!(std::fs::metadata(temp_file.path()).unwrap().len(), 0);
    }

    #[test]
    fn test_utf16le() {
        assert_eq!(utf16le("a\n"), vec![0x61, 0x00, 0x0A, 0x00]);
    }

    #[tokio::test]
    async fn test_recording_consumer_behaviors() {
        let consumer = RecordingConsumer::new();
        consumer.send_text("{\"type\":\"pong\"}".to_string()).await.unwrap();
        assert_eq!(consumer.messages(), vec![Message::Pong]);

        consumer.set_behavior(Behavior::FailSends);
        assert!(consumer.send_text("ignored".to_string()).await.is_err());
        assert_eq!(consumer.send_attempts(), 2);
        assert_eq!(consumer.messages().len(), 1);
    }
}
