//! ffmpeg backend
//!
//! `ffmpeg -y -ss <start> -t <duration> -i <input> -f <encoding> <tmpfile>`.
//! ffmpeg reads http(s) sources itself, so remote URLs are passed through.

use super::{check_output, encoding_for, is_remote, local_path, probe, seconds};
use super::{AudioClipper, ClipError, ClipWindow, ClippedAudio};
use segck_common::Chunk;
use std::fs;
use std::process::Command;
use tracing::debug;

const FFMPEG: &str = "ffmpeg";

pub struct FfmpegClipper {
    binary: String,
    encoding: Option<String>,
}

impl FfmpegClipper {
    /// Checks `ffmpeg` is in PATH
    pub fn new(encoding: Option<String>) -> Result<Self, ClipError> {
        Self::with_binary(FFMPEG, encoding)
    }

    pub fn with_binary(binary: &str, encoding: Option<String>) -> Result<Self, ClipError> {
        probe(binary, "-version")?;
        Ok(Self {
            binary: binary.to_string(),
            encoding,
        })
    }
}

impl AudioClipper for FfmpegClipper {
    fn name(&self) -> &'static str {
        FFMPEG
    }

    fn clip(
        &self,
        url: &str,
        chunk: Chunk,
        left_ms: i64,
        right_ms: i64,
    ) -> Result<ClippedAudio, ClipError> {
        let encoding = encoding_for(url, self.encoding.as_deref())?;
        let window = ClipWindow::around(chunk, left_ms, right_ms);

        let input = if is_remote(url) {
            url.to_string()
        } else {
            local_path(url).to_string_lossy().to_string()
        };
        let tmp_file = std::env::temp_dir().join(format!(
            "segck-clip-{}.{}",
            uuid::Uuid::new_v4(),
            encoding
        ));

        debug!(
            url,
            start_ms = window.start,
            end_ms = window.end,
            output_file = %tmp_file.display(),
            "Running ffmpeg"
        );

        let output = Command::new(&self.binary)
            .args(["-y", "-loglevel", "error"])
            .args(["-ss", &seconds(window.start)])
            .args(["-t", &seconds(window.duration_ms())])
            .args(["-i", &input])
            .args(["-f", &encoding])
            .arg(&tmp_file)
            .output()
            .map_err(|e| ClipError::Execution {
                tool: self.binary.clone(),
                reason: e.to_string(),
            });

        let result = output
            .and_then(|output| check_output(&self.binary, output))
            .and_then(|_| fs::read(&tmp_file).map_err(ClipError::from));
        let _ = fs::remove_file(&tmp_file);

        Ok(window.into_clip(chunk, result?, encoding))
    }
}
