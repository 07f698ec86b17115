//! Configuration loading
//!
//! Settings are resolved in priority order:
//! 1. Command-line argument (or its environment variable fallback)
//! 2. TOML config file
//! 3. Compiled default
//!
//! A missing config file is not an error: a warning is logged and defaults
//! apply. A config file that exists but does not parse is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{info, warn};

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 7371;
pub const DEFAULT_CONTEXT_MS: i64 = 1000;

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TomlConfig {
    /// Project folder holding `source/` and `annotation/`
    #[serde(default)]
    pub project_dir: Option<PathBuf>,

    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,

    /// Browser client assets served at `/`
    #[serde(default)]
    pub static_dir: Option<PathBuf>,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub clipper: ClipperConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// External tool used to cut audio
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClipperBackend {
    #[default]
    Ffmpeg,
    Sox,
}

impl FromStr for ClipperBackend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(ClipperBackend::Ffmpeg),
            "sox" => Ok(ClipperBackend::Sox),
            other => Err(Error::Config(format!("unknown clipper backend: {}", other))),
        }
    }
}

impl fmt::Display for ClipperBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClipperBackend::Ffmpeg => write!(f, "ffmpeg"),
            ClipperBackend::Sox => write!(f, "sox"),
        }
    }
}

/// Audio clipping settings
#[derive(Debug, Clone, Deserialize)]
pub struct ClipperConfig {
    #[serde(default)]
    pub backend: ClipperBackend,

    /// Audio before the chunk start included in the clip
    #[serde(default = "default_context_ms")]
    pub left_context_ms: i64,

    /// Audio after the chunk end included in the clip
    #[serde(default = "default_context_ms")]
    pub right_context_ms: i64,

    /// Output encoding; the source file extension when unset
    #[serde(default)]
    pub encoding: Option<String>,
}

impl Default for ClipperConfig {
    fn default() -> Self {
        Self {
            backend: ClipperBackend::default(),
            left_context_ms: DEFAULT_CONTEXT_MS,
            right_context_ms: DEFAULT_CONTEXT_MS,
            encoding: None,
        }
    }
}

fn default_context_ms() -> i64 {
    DEFAULT_CONTEXT_MS
}

/// Platform config file location: `<config dir>/segck/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("segck").join("config.toml"))
}

/// Parse a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("cannot read {}: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid config {}: {}", path.display(), e)))
}

/// Load the config file named on the command line, or the platform default.
///
/// An explicitly named file must exist. A missing default file yields
/// built-in defaults.
pub fn resolve_toml_config(explicit: Option<&Path>) -> Result<TomlConfig> {
    if let Some(path) = explicit {
        info!("Loading config from {}", path.display());
        return load_toml_config(path);
    }

    match default_config_path() {
        Some(path) if path.exists() => {
            info!("Loading config from {}", path.display());
            load_toml_config(&path)
        }
        Some(path) => {
            warn!("No config file at {}, using defaults", path.display());
            Ok(TomlConfig::default())
        }
        None => {
            warn!("Could not determine config directory, using defaults");
            Ok(TomlConfig::default())
        }
    }
}

/// Values given on the command line (or via their environment variables)
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub project_dir: Option<PathBuf>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub static_dir: Option<PathBuf>,
    pub clipper: Option<ClipperBackend>,
    pub log_level: Option<String>,
}

/// Fully resolved server settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub project_dir: PathBuf,
    pub host: String,
    pub port: u16,
    pub static_dir: Option<PathBuf>,
    pub log_level: String,
    pub clipper: ClipperConfig,
}

impl Settings {
    /// Merge command-line values over the TOML file over defaults.
    /// The project dir has no default.
    pub fn resolve(cli: CliOverrides, toml: TomlConfig) -> Result<Self> {
        let project_dir = cli
            .project_dir
            .or(toml.project_dir)
            .ok_or_else(|| Error::Config("project dir not provided".to_string()))?;

        let mut clipper = toml.clipper;
        if let Some(backend) = cli.clipper {
            clipper.backend = backend;
        }
        if clipper.left_context_ms < 0 || clipper.right_context_ms < 0 {
            return Err(Error::Config("clip context must not be negative".to_string()));
        }

        Ok(Self {
            project_dir,
            host: cli
                .host
                .or(toml.host)
                .unwrap_or_else(|| DEFAULT_HOST.to_string()),
            port: cli.port.or(toml.port).unwrap_or(DEFAULT_PORT),
            static_dir: cli.static_dir.or(toml.static_dir),
            log_level: cli.log_level.unwrap_or(toml.logging.level),
            clipper,
        })
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
