//! Match configuration and validation.
//!
//! Settings come from the command line, optionally seeded from a TOML file
//! (`arena.toml` by default) that names engines and reusable presets.
//! Everything here is checked before any engine process is spawned.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that reject a run before it starts.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Failed to read a configuration or openings file from disk.
    #[error("Failed to read {path}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Failed to parse the configuration file as valid TOML.
    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    /// SPRT parameters out of range.
    #[error("Invalid SPRT parameters: {0}")]
    InvalidSprt(String),
    /// A match setting out of range.
    #[error("Invalid setting: {0}")]
    InvalidSetting(String),
    /// The openings file produced no usable position.
    #[error("No usable openings in {0}")]
    NoOpenings(PathBuf),
    /// Requested engine was not found in the configuration.
    #[error("Engine not found: {0}")]
    EngineNotFound(String),
    /// Requested preset was not found in the configuration.
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),
}

/// An engine as launched for every game: identity, command and UCI options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandle {
    /// Display name used in logs and reports.
    pub name: String,
    /// Path to the engine executable.
    pub path: PathBuf,
    /// Extra command-line arguments.
    pub args: Vec<String>,
    /// `Hash` option in megabytes, sent when the engine advertises it.
    pub hash_mb: u32,
    /// `Threads` option, sent when the engine advertises it.
    pub threads: u32,
}

impl EngineHandle {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            args: Vec::new(),
            hash_mb: DEFAULT_HASH_MB,
            threads: DEFAULT_THREADS,
        }
    }

    /// UCI options to apply after the handshake, in send order.
    pub fn options(&self) -> [(&'static str, String); 2] {
        [
            ("Hash", self.hash_mb.to_string()),
            ("Threads", self.threads.to_string()),
        ]
    }
}

pub const DEFAULT_HASH_MB: u32 = 8;
pub const DEFAULT_THREADS: u32 = 1;

/// Scheduling and per-game limits for one match.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchSettings {
    /// Maximum number of games before the run is declared inconclusive.
    pub games: u32,
    /// Time budget per move.
    pub movetime: Duration,
    /// Slack over `movetime` before a move request counts as a timeout.
    pub timeout_margin: Duration,
    /// Upper bound on the `uci`/`isready` exchange.
    pub handshake_timeout: Duration,
    /// Ply ceiling; a game reaching it is adjudicated a draw.
    pub max_plies: u32,
    /// Games played in parallel.
    pub concurrency: usize,
    /// Emit a progress report every this many finished games (0 disables).
    pub report_every: u32,
}

impl Default for MatchSettings {
    fn default() -> Self {
        Self {
            games: 200,
            movetime: Duration::from_millis(400),
            timeout_margin: Duration::from_millis(1000),
            handshake_timeout: Duration::from_secs(10),
            max_plies: 400,
            concurrency: 1,
            report_every: 10,
        }
    }
}

impl MatchSettings {
    /// Rejects settings no run could complete with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.games == 0 {
            return Err(ConfigError::InvalidSetting(
                "games must be at least 1".to_string(),
            ));
        }
        if self.movetime.is_zero() {
            return Err(ConfigError::InvalidSetting(
                "movetime must be positive".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidSetting(
                "concurrency must be at least 1".to_string(),
            ));
        }
        if self.max_plies == 0 {
            return Err(ConfigError::InvalidSetting(
                "max plies must be at least 1".to_string(),
            ));
        }
        if self.handshake_timeout.is_zero() {
            return Err(ConfigError::InvalidSetting(
                "handshake timeout must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Per-move wall-clock limit enforced by the driver.
    pub fn move_deadline(&self) -> Duration {
        self.movetime + self.timeout_margin
    }
}

/// Converts a seconds value from the command line into a duration.
pub fn duration_from_secs(secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| ConfigError::InvalidSetting(format!("not a valid duration: {}s", secs)))
}

/// Engine entry of the configuration file.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct EngineConfig {
    /// Path to the engine executable.
    pub path: PathBuf,
    /// Extra command-line arguments.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub hash_mb: Option<u32>,
    #[serde(default)]
    pub threads: Option<u32>,
}

impl EngineConfig {
    /// Builds the launch handle, letting explicit values win over the file.
    pub fn to_handle(&self, name: &str, hash_mb: Option<u32>, threads: Option<u32>) -> EngineHandle {
        EngineHandle {
            name: name.to_string(),
            path: self.path.clone(),
            args: self.args.clone(),
            hash_mb: hash_mb.or(self.hash_mb).unwrap_or(DEFAULT_HASH_MB),
            threads: threads.or(self.threads).unwrap_or(DEFAULT_THREADS),
        }
    }
}

/// Reusable match defaults. Every field is optional; flags override them.
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
pub struct PresetConfig {
    pub games: Option<u32>,
    /// Seconds per move.
    pub movetime: Option<f64>,
    pub openings: Option<PathBuf>,
    pub concurrency: Option<usize>,
    pub elo0: Option<f64>,
    pub elo1: Option<f64>,
    pub alpha: Option<f64>,
    pub beta: Option<f64>,
}

/// Contents of the arena configuration file.
#[derive(Debug, Deserialize, Serialize, Default)]
pub struct ArenaConfig {
    /// Map of engine names to their launch configuration.
    #[serde(default)]
    pub engines: HashMap<String, EngineConfig>,
    /// Map of preset names to match defaults.
    #[serde(default)]
    pub presets: HashMap<String, PresetConfig>,
}

impl ArenaConfig {
    /// Loads the configuration file at `path`.
    ///
    /// A missing file at the default location yields an empty configuration;
    /// a missing file that was asked for explicitly is an error.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let (config_path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (Self::default_path(), false),
        };
        if !explicit && !config_path.exists() {
            return Ok(Self::default());
        }
        let content =
            std::fs::read_to_string(&config_path).map_err(|source| ConfigError::ReadError {
                path: config_path.clone(),
                source,
            })?;
        Ok(toml::from_str(&content)?)
    }

    /// `arena.toml` in the current working directory.
    pub fn default_path() -> PathBuf {
        PathBuf::from("arena.toml")
    }

    /// Retrieves an engine configuration by name.
    pub fn get_engine(&self, name: &str) -> Result<&EngineConfig, ConfigError> {
        self.engines
            .get(name)
            .ok_or_else(|| ConfigError::EngineNotFound(name.to_string()))
    }

    /// Retrieves a preset by name.
    pub fn get_preset(&self, name: &str) -> Result<&PresetConfig, ConfigError> {
        self.presets
            .get(name)
            .ok_or_else(|| ConfigError::UnknownPreset(name.to_string()))
    }

    /// Resolves an `--engine-*` argument: a configured engine name, or else a path.
    pub fn resolve_engine(
        &self,
        name_or_path: &str,
        name: &str,
        hash_mb: Option<u32>,
        threads: Option<u32>,
    ) -> EngineHandle {
        match self.get_engine(name_or_path) {
            Ok(engine) => engine.to_handle(name, hash_mb, threads),
            Err(_) => EngineConfig {
                path: PathBuf::from(name_or_path),
                args: Vec::new(),
                hash_mb: None,
                threads: None,
            }
            .to_handle(name, hash_mb, threads),
        }
    }
}
