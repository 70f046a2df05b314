//! Config module.
//! Manages I/O for board_config.json (host, local slot, published path, board photo).
//! Uses serde for JSON serialization; a missing file means defaults.
//! Resolves the operating mode exactly once at startup.

use anyhow::{Context, Result};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_PATH: &str = "board_config.json";

/// Operating mode of the board editor
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Local slot, full create/edit/delete
    #[default]
    Setter,
    /// Published climbs.json, read-only
    Viewer,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Setter => write!(f, "setter (local, editable)"),
            Mode::Viewer => write!(f, "viewer (published, read-only)"),
        }
    }
}

impl Mode {
    /// Local developer hosts (`localhost`, `127.0.0.1`, `file:`) are setter mode,
    /// everything else is a published viewer.
    pub fn detect(host: &str) -> Mode {
        let url = match Url::parse(host) {
            Ok(url) => url,
            Err(e) => {
                log::warn!("Unparsable host '{}' ({}), falling back to viewer mode", host, e);
                return Mode::Viewer;
            }
        };
        if url.scheme() == "file" {
            return Mode::Setter;
        }
        match url.host_str() {
            Some("localhost") | Some("127.0.0.1") => Mode::Setter,
            _ => Mode::Viewer,
        }
    }

    pub fn is_setter(self) -> bool {
        self == Mode::Setter
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Runtime host the board is served from; drives mode detection and the published read path.
    pub host: String,
    /// Explicit override of the detected mode.
    pub mode: Option<Mode>,
    pub storage_dir: PathBuf,
    /// Versioned slot name; bump the suffix on incompatible record changes.
    pub storage_key: String,
    pub published_path: String,
    pub board_image: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "http://localhost:8000/".into(),
            mode: None,
            storage_dir: PathBuf::from(".garage-board"),
            storage_key: "garageBoardClimbs_v2".into(),
            published_path: "climbs.json".into(),
            board_image: PathBuf::from("board.jpg"),
        }
    }
}

impl Config {
    /// Reads `path`, or returns defaults when it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config {}", path.display()))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let serialized = serde_json::to_string_pretty(self)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    pub fn resolve_mode(&self) -> Mode {
        self.mode.unwrap_or_else(|| Mode::detect(&self.host))
    }

    /// File backing the local key-value slot.
    pub fn slot_path(&self) -> PathBuf {
        self.storage_dir.join(format!("{}.json", self.storage_key))
    }

    pub fn published_url(&self) -> Result<Url> {
        let base = Url::parse(&self.host).with_context(|| format!("Invalid host URL '{}'", self.host))?;
        base.join(&self.published_path)
            .with_context(|| format!("Cannot resolve '{}' against {}", self.published_path, base))
    }
}
