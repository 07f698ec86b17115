//! sox backend
//!
//! Source bytes are streamed to `sox -t <type> - -t <encoding> - trim <start> <duration>`
//! on stdin and the clip is read from stdout. Remote sources are downloaded
//! first.

use super::{check_output, encoding_for, is_remote, local_path, probe, seconds};
use super::{AudioClipper, ClipError, ClipWindow, ClippedAudio};
use segck_common::Chunk;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

const SOX: &str = "sox";

pub struct SoxClipper {
    binary: String,
    encoding: Option<String>,
}

impl SoxClipper {
    /// Checks `sox` is in PATH
    pub fn new(encoding: Option<String>) -> Result<Self, ClipError> {
        Self::with_binary(SOX, encoding)
    }

    pub fn with_binary(binary: &str, encoding: Option<String>) -> Result<Self, ClipError> {
        probe(binary, "--version")?;
        Ok(Self {
            binary: binary.to_string(),
            encoding,
        })
    }

    fn source_bytes(&self, url: &str) -> Result<Vec<u8>, ClipError> {
        if !is_remote(url) {
            return Ok(std::fs::read(local_path(url))?);
        }

        let fetch_err = |reason: String| ClipError::Fetch {
            url: url.to_string(),
            reason,
        };
        let response = reqwest::blocking::get(url).map_err(|e| fetch_err(e.to_string()))?;
        if !response.status().is_success() {
            return Err(fetch_err(format!("status {}", response.status())));
        }
        let bytes = response.bytes().map_err(|e| fetch_err(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn run(&self, input: Vec<u8>, args: &[String]) -> Result<Vec<u8>, ClipError> {
        let execution_err = |e: std::io::Error| ClipError::Execution {
            tool: self.binary.clone(),
            reason: e.to_string(),
        };

        let mut child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(execution_err)?;

        // Feed stdin from its own thread so a full stdout pipe cannot deadlock us
        let writer = child.stdin.take().map(|mut stdin| {
            std::thread::spawn(move || stdin.write_all(&input))
        });

        let output = child.wait_with_output().map_err(execution_err)?;
        if let Some(writer) = writer {
            match writer.join() {
                Ok(Ok(())) => {}
                // sox stops reading once the trim end is reached
                Ok(Err(e)) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Ok(Err(e)) => warn!("Failed to write audio to {}: {}", self.binary, e),
                Err(_) => warn!("{} stdin writer panicked", self.binary),
            }
        }
        check_output(&self.binary, output)
    }
}

impl AudioClipper for SoxClipper {
    fn name(&self) -> &'static str {
        SOX
    }

    fn clip(
        &self,
        url: &str,
        chunk: Chunk,
        left_ms: i64,
        right_ms: i64,
    ) -> Result<ClippedAudio, ClipError> {
        let encoding = encoding_for(url, self.encoding.as_deref())?;
        let input_type = encoding_for(url, None)?;
        let window = ClipWindow::around(chunk, left_ms, right_ms);

        let input = self.source_bytes(url)?;
        debug!(
            url,
            bytes = input.len(),
            start_ms = window.start,
            end_ms = window.end,
            "Running sox"
        );

        let args = sox_args(&input_type, &encoding, window);
        let bytes = self.run(input, &args)?;
        Ok(window.into_clip(chunk, bytes, encoding))
    }
}

fn sox_args(input_type: &str, encoding: &str, window: ClipWindow) -> Vec<String> {
    vec![
        "-t".to_string(),
        input_type.to_string(),
        "-".to_string(),
        "-t".to_string(),
        encoding.to_string(),
        "-".to_string(),
        "trim".to_string(),
        seconds(window.start),
        seconds(window.duration_ms()),
    ]
}
