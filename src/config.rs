//! Command line and environment configuration for the relay binary.

use crate::source::TrailingLine;
use crate::tailer::TailConfig;
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

/// Stream a growing log file to WebSocket viewers.
#[derive(Debug, Clone, Parser)]
#[command(name = "tail-relay", version, about)]
pub struct Config {
    /// File to tail
    #[arg(long, env = "LOG_FILE_PATH", default_value = "logs/sample.log")]
    pub file: PathBuf,

    /// Lines sent to a viewer when it connects
    #[arg(long, env = "INITIAL_LINES", default_value_t = 10)]
    pub initial_lines: usize,

    /// Seconds between change checks
    #[arg(long, env = "POLL_INTERVAL", default_value_t = 0.1, value_parser = parse_poll_interval)]
    pub poll_interval: f64,

    /// Address to bind
    #[arg(long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = 8000)]
    pub port: u16,

    /// Directory served under /static
    #[arg(long, env = "STATIC_DIR")]
    pub static_dir: Option<PathBuf>,

    /// Milliseconds a viewer may take to accept one message
    #[arg(long, env = "SEND_TIMEOUT_MS", default_value_t = 5000)]
    pub send_timeout_ms: u64,

    /// Handling of a last line without a newline: emit or withhold
    #[arg(long, env = "PARTIAL_LINES", default_value = "emit")]
    pub partial_lines: TrailingLine,
}

fn parse_poll_interval(value: &str) -> Result<f64, String> {
    let seconds: f64 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    if !seconds.is_finite() || seconds <= 0.0 {
        return Err(format!("poll interval must be positive, got {value}"));
    }
    Ok(seconds)
}

impl Config {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.poll_interval)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn tail_config(&self) -> TailConfig {
        TailConfig::new(&self.file, self.poll_interval()).with_trailing(self.partial_lines)
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
