/// User settings for the triage workflow
///
/// Stored as JSON in the user's configuration directory. Every field has a
/// default, so a missing or partial file still yields usable settings.
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SettingsError;
use crate::pipeline::prefetch::{DEFAULT_WINDOW, DEFAULT_WORKERS};

/// Supported RAW file extensions (common formats)
const RAW_EXTENSIONS: [&str; 16] = [
    "nef", "dng", "cr2", "cr3", "arw", "raf", "orf", "rw2", "pef", "srw", "erf", "kdc", "dcr",
    "mos", "raw", "rwl",
];

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    // ========== Decoder ==========
    /// External RAW decoder program (dcraw or a compatible tool)
    pub decoder: PathBuf,

    /// Extra arguments placed before `-e -c <file>`, e.g. for wrappers
    pub decoder_args: Vec<String>,

    /// Longest edge of the decoded preview in pixels
    pub preview_max_dimension: u32,

    // ========== Pipeline ==========
    /// How many images after the current one are converted ahead of time
    pub prefetch_count: usize,

    /// Maximum number of concurrent prefetch conversions
    pub workers: usize,

    /// Move files the decoder cannot read straight to `skip`
    pub skip_unreadable: bool,

    // ========== Source ==========
    /// Directory offered first when picking the source folder
    pub initial_directory: Option<PathBuf>,

    /// File extensions treated as RAW sources (case-insensitive)
    pub extensions: Vec<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            decoder: PathBuf::from("dcraw"),
            decoder_args: Vec::new(),
            preview_max_dimension: 2048,
            prefetch_count: DEFAULT_WINDOW,
            workers: DEFAULT_WORKERS,
            skip_unreadable: true,
            initial_directory: None,
            extensions: RAW_EXTENSIONS.iter().map(|ext| ext.to_string()).collect(),
        }
    }
}

impl Settings {
    /// Convert to JSON string for storage
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Parse from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Where the settings file lives:
    /// - Linux: ~/.config/picknick/settings.json
    /// - macOS: ~/Library/Application Support/picknick/settings.json
    /// - Windows: %APPDATA%\picknick\settings.json
    pub fn default_path() -> Result<PathBuf, SettingsError> {
        let mut path = dirs::config_dir().ok_or(SettingsError::NoConfigDir)?;
        path.push("picknick");
        path.push("settings.json");
        Ok(path)
    }

    /// Load settings from `path`, returning defaults if the file is absent
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let json = fs::read_to_string(path)?;
        Ok(Self::from_json(&json)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
