//! File access primitives for tailing a single text file.
//!
//! Every function here is total: missing files, permission problems and
//! reads racing with writers are logged and turned into empty results so the
//! polling loop never sees an I/O error.

use chardetng::EncodingDetector;
use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};
use std::collections::VecDeque;
use std::io::{ErrorKind, SeekFrom};
use std::path::Path;
use std::str::FromStr;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::{debug, info, warn};

/// Size of the blocks read backwards from the end of the file.
pub const CHUNK_SIZE: usize = 1024;

/// Number of bytes sampled from the start of the file for encoding detection.
pub const ENCODING_SAMPLE_SIZE: usize = 10_000;

/// What to do with a final line that has no terminator yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TrailingLine {
    /// Report it with the current batch.
    #[default]
    Emit,
    /// Leave it unread until a newline arrives.
    Withhold,
}

impl FromStr for TrailingLine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "emit" => Ok(Self::Emit),
            "withhold" => Ok(Self::Withhold),
            other => Err(format!(
                "unknown partial line policy '{other}', expected 'emit' or 'withhold'"
            )),
        }
    }
}

/// Current length of the file in bytes, or 0 when it is missing or unreadable.
pub async fn file_size(path: &Path) -> u64 {
    match fs::metadata(path).await {
        Ok(metadata) => metadata.len(),
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Could not stat file");
            }
            0
        }
    }
}

/// Whether the file currently exists.
pub async fn file_exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Read at most `n` non-blank lines nearest the end of the file, oldest first.
///
/// The file is read backwards in [`CHUNK_SIZE`] blocks until enough complete
/// lines are buffered or the start of the file is reached, so memory use
/// follows the size of the answer rather than the size of the file.
pub async fn read_last_n_lines(path: &Path, n: usize) -> Vec<String> {
    if n == 0 {
        return Vec::new();
    }

    match read_tail(path, n).await {
        Ok(lines) => lines,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "Failed to read last lines");
            }
            Vec::new()
        }
    }
}

async fn read_tail(path: &Path, n: usize) -> std::io::Result<Vec<String>> {
    let encoding = tail_encoding(detect_encoding(path).await);
    let unit = terminator(encoding).len() as u64;

    let mut file = File::open(path).await?;
    let len = file.metadata().await?.len();
    // Chunks must start on a code unit boundary even if the last write is half done.
    let mut pointer = len - len % unit;
    let mut chunks: VecDeque<Vec<u8>> = VecDeque::new();
    let mut terminators = 0usize;
    let mut wanted = n;

    loop {
        while pointer > 0 && terminators <= wanted {
            let read_size = (CHUNK_SIZE as u64).min(pointer) as usize;
            pointer -= read_size as u64;
            file.seek(SeekFrom::Start(pointer)).await?;
            let mut chunk = vec![0u8; read_size];
            file.read_exact(&mut chunk).await?;
            terminators += count_terminators(&chunk, encoding);
            chunks.push_front(chunk);
        }

        let at_file_start = pointer == 0;
        let buffer = chunks.make_contiguous().concat();
        let text = decode(&buffer, encoding, at_file_start);
        let mut lines = complete_lines(&text, at_file_start);

        if lines.len() >= n || at_file_start {
            let skip = lines.len().saturating_sub(n);
            return Ok(lines.split_off(skip));
        }

        // Blank lines used up the budget; look further back.
        wanted = wanted.saturating_mul(2).max(terminators);
    }
}

/// Lines in a buffer read backwards; the leading segment is partial unless
/// the buffer begins at the start of the file.
fn complete_lines(text: &str, at_file_start: bool) -> Vec<String> {
    match text.split_once('\n') {
        Some((_, rest)) if !at_file_start => split_lines(rest),
        Some(_) => split_lines(text),
        None if at_file_start => split_lines(text),
        None => Vec::new(),
    }
}

/// Read every non-blank line appended since `from_offset`.
///
/// Returns the lines together with the offset the next read should start at.
/// When nothing new is available the offset comes back unchanged.
pub async fn read_appended_lines(
    path: &Path,
    from_offset: u64,
    trailing: TrailingLine,
) -> (Vec<String>, u64) {
    match read_appended(path, from_offset, trailing).await {
        Ok(result) => result,
        Err(e) => {
            warn!(
                path = %path.display(),
                offset = from_offset,
                error = %e,
                "Failed to read appended lines"
            );
            (Vec::new(), from_offset)
        }
    }
}

async fn read_appended(
    path: &Path,
    from_offset: u64,
    trailing: TrailingLine,
) -> std::io::Result<(Vec<String>, u64)> {
    let current_size = file_size(path).await;
    let bytes_to_read = match calculate_bytes_to_read(current_size, from_offset) {
        Some(bytes) => bytes,
        None => return Ok((Vec::new(), from_offset)),
    };

    let encoding = detect_encoding(path).await;

    let mut file = File::open(path).await?;
    file.seek(SeekFrom::Start(from_offset)).await?;
    let mut raw = Vec::with_capacity(bytes_to_read as usize);
    // The file may shrink between the stat and the read; take what is there.
    file.take(bytes_to_read).read_to_end(&mut raw).await?;

    let consumed = match trailing {
        TrailingLine::Emit => raw.len(),
        TrailingLine::Withhold => terminated_len(&raw, encoding),
    };

    let text = decode(&raw[..consumed], encoding, from_offset == 0);
    Ok((split_lines(&text), from_offset + consumed as u64))
}

/// Calculate bytes to read based on current size and last offset
fn calculate_bytes_to_read(current_size: u64, last_offset: u64) -> Option<u64> {
    if current_size <= last_offset {
        None
    } else {
        Some(current_size - last_offset)
    }
}

/// Byte sequence of a newline in `encoding`.
fn terminator(encoding: &'static Encoding) -> &'static [u8] {
    if encoding == UTF_16LE {
        &[0x0A, 0x00]
    } else if encoding == UTF_16BE {
        &[0x00, 0x0A]
    } else {
        b"\n"
    }
}

/// Number of newlines in `bytes`, which must start on a code unit boundary.
fn count_terminators(bytes: &[u8], encoding: &'static Encoding) -> usize {
    let newline = terminator(encoding);
    bytes
        .chunks_exact(newline.len())
        .filter(|unit| *unit == newline)
        .count()
}

/// Length of the prefix of `bytes` that ends with a line terminator.
fn terminated_len(bytes: &[u8], encoding: &'static Encoding) -> usize {
    let newline = terminator(encoding);
    bytes
        .chunks_exact(newline.len())
        .rposition(|unit| unit == newline)
        .map_or(0, |index| (index + 1) * newline.len())
}

/// Split decoded content on newlines, strip terminators and drop blank lines
fn split_lines(content: &str) -> Vec<String> {
    content
        .split('\n')
        .filter_map(|part| {
            let line = part.trim_end_matches(['\r', '\n']);
            if line.trim().is_empty() {
                None
            } else {
                Some(line.to_string())
            }
        })
        .collect()
}

fn decode(bytes: &[u8], encoding: &'static Encoding, at_file_start: bool) -> String {
    let (text, _had_errors) = if at_file_start {
        encoding.decode_with_bom_removal(bytes)
    } else {
        encoding.decode_without_bom_handling(bytes)
    };
    text.into_owned()
}

/// Encoding used for backwards reads, which must find newlines byte-wise or
/// in UTF-16 code units.
fn tail_encoding(encoding: &'static Encoding) -> &'static Encoding {
    if encoding.is_ascii_compatible() || encoding == UTF_16LE || encoding == UTF_16BE {
        encoding
    } else {
        UTF_8
    }
}

/// Detect the text encoding from a sample of the start of the file.
///
/// A byte order mark wins. Valid UTF-8 (including plain ASCII) maps to UTF-8.
/// Anything else is whatever the detector guesses. Failures fall back to UTF-8.
pub async fn detect_encoding(path: &Path) -> &'static Encoding {
    match read_sample(path).await {
        Ok(sample) if !sample.is_empty() => classify(&sample),
        Ok(_) => UTF_8,
        Err(e) => {
            if e.kind() != ErrorKind::NotFound {
                debug!(path = %path.display(), error = %e, "Encoding detection failed");
            }
            UTF_8
        }
    }
}

async fn read_sample(path: &Path) -> std::io::Result<Vec<u8>> {
    let file = File::open(path).await?;
    let mut sample = Vec::with_capacity(ENCODING_SAMPLE_SIZE);
    file.take(ENCODING_SAMPLE_SIZE as u64)
        .read_to_end(&mut sample)
        .await?;
    Ok(sample)
}

fn classify(sample: &[u8]) -> &'static Encoding {
    if let Some((encoding, _bom_len)) = Encoding::for_bom(sample) {
        return encoding;
    }

    match std::str::from_utf8(sample) {
        Ok(_) => return UTF_8,
        // A sample cut through a multi-byte character is still UTF-8.
        Err(e) if e.error_len().is_none() => return UTF_8,
        Err(_) => {}
    }

    let mut detector = EncodingDetector::new();
    detector.feed(sample, sample.len() < ENCODING_SAMPLE_SIZE);
    detector.guess(None, true)
}

/// Create the file and its parent directories if they are missing.
///
/// Existing content is never touched. Returns `false` when creation fails.
pub async fn ensure_file_exists(path: &Path) -> bool {
    if file_exists(path).await {
        return true;
    }

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        if let Err(e) = fs::create_dir_all(parent).await {
            warn!(path = %parent.display(), error = %e, "Failed to create log directory");
            return false;
        }
    }

    match OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
    {
        Ok(_) => {
            info!(path = %path.display(), "Created log file");
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to create log file");
            false
        }
    }
}
