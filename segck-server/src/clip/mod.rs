//! Audio clipping
//!
//! Cuts the audio around a segment's chunk so the browser can play the
//! segment with some context on either side. Clipping is delegated to an
//! external tool; the store never touches audio bytes.

pub mod ffmpeg;
pub mod sox;

pub use ffmpeg::FfmpegClipper;
pub use sox::SoxClipper;

use segck_common::config::{ClipperBackend, ClipperConfig};
use segck_common::Chunk;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use thiserror::Error;

/// Clipper errors
#[derive(Debug, Error)]
pub enum ClipError {
    /// Tool binary not found in PATH
    #[error("{0} not found in PATH")]
    ToolNotFound(String),

    /// Tool could not be started
    #[error("Failed to execute {tool}: {reason}")]
    Execution { tool: String, reason: String },

    /// Tool ran and exited with a failure status
    #[error("{tool} failed ({status}): {stderr}")]
    Failed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Remote audio could not be downloaded
    #[error("audio URL {url} not reachable: {reason}")]
    Fetch { url: String, reason: String },

    /// No output encoding configured and none derivable from the source
    #[error("cannot determine audio encoding for {0}")]
    UnknownEncoding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of a clip
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClippedAudio {
    pub bytes: Vec<u8>,
    /// Encoding of `bytes`, e.g. `wav`
    pub file_type: String,
    /// Start of the clip within the source, in milliseconds
    pub offset: i64,
    /// The requested chunk relative to the clip start
    pub relative_chunk: Chunk,
}

/// External audio clipping capability
///
/// Implementations block; callers run them on the blocking pool.
pub trait AudioClipper: Send + Sync {
    /// Tool name for logs
    fn name(&self) -> &'static str;

    /// Cut `chunk` out of the audio at `url`, widened by `left_ms` before
    /// and `right_ms` after
    fn clip(
        &self,
        url: &str,
        chunk: Chunk,
        left_ms: i64,
        right_ms: i64,
    ) -> Result<ClippedAudio, ClipError>;
}

/// Span of source audio to cut, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipWindow {
    pub start: i64,
    pub end: i64,
}

impl ClipWindow {
    /// `chunk` widened by the context, never starting before 0
    pub fn around(chunk: Chunk, left_ms: i64, right_ms: i64) -> Self {
        Self {
            start: (chunk.start - left_ms).max(0),
            end: chunk.end + right_ms,
        }
    }

    pub fn duration_ms(&self) -> i64 {
        self.end - self.start
    }

    /// `chunk` shifted so that 0 is the window start
    pub fn relative(&self, chunk: Chunk) -> Chunk {
        Chunk::new(chunk.start - self.start, chunk.end - self.start)
    }

    pub(crate) fn into_clip(self, chunk: Chunk, bytes: Vec<u8>, file_type: String) -> ClippedAudio {
        ClippedAudio {
            bytes,
            file_type,
            offset: self.start,
            relative_chunk: self.relative(chunk),
        }
    }
}

/// Milliseconds as the decimal seconds both tools accept
pub(crate) fn seconds(ms: i64) -> String {
    format!("{}", ms as f64 / 1000.0)
}

/// Output encoding: the configured one, else the source file extension
pub fn encoding_for(url: &str, configured: Option<&str>) -> Result<String, ClipError> {
    if let Some(encoding) = configured.filter(|e| !e.is_empty()) {
        return Ok(encoding.to_string());
    }
    let path = url.split(['?', '#']).next().unwrap_or(url);
    Path::new(path)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| ext.to_ascii_lowercase())
        .ok_or_else(|| ClipError::UnknownEncoding(url.to_string()))
}

pub(crate) fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Filesystem path for a non-remote source
pub(crate) fn local_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
}

/// Check `binary` runs at all
pub(crate) fn probe(binary: &str, version_arg: &str) -> Result<(), ClipError> {
    match Command::new(binary).arg(version_arg).output() {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(ClipError::ToolNotFound(binary.to_string()))
        }
        Err(e) => Err(ClipError::Execution {
            tool: binary.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Map a finished process to its stdout, or to [`ClipError::Failed`]
pub(crate) fn check_output(
    tool: &str,
    output: std::process::Output,
) -> Result<Vec<u8>, ClipError> {
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(ClipError::Failed {
            tool: tool.to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

/// Clipper for the configured backend, after checking its tool is installed
pub fn build_clipper(config: &ClipperConfig) -> Result<Arc<dyn AudioClipper>, ClipError> {
    let clipper: Arc<dyn AudioClipper> = match config.backend {
        ClipperBackend::Ffmpeg => Arc::new(FfmpegClipper::new(config.encoding.clone())?),
        ClipperBackend::Sox => Arc::new(SoxClipper::new(config.encoding.clone())?),
    };
    Ok(clipper)
}
