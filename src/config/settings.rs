//! TOML-based configuration for navql.
//!
//! Example configuration:
//! ```toml
//! [transform]
//! localized_prefix = "localized"
//! skip_large_binaries = true
//!
//! [search]
//! types = ["cds.String"]
//! ```

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Transformation switches.
    pub transform: TransformSettings,

    /// Default search policy.
    pub search: SearchSettings,
}

/// Transformation switches.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct TransformSettings {
    /// Namespace of the localized entity variants (`localized.Books`).
    pub localized_prefix: String,

    /// Leave `cds.LargeBinary` elements out of wildcard expansion.
    pub skip_large_binaries: bool,
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            localized_prefix: "localized".to_string(),
            skip_large_binaries: true,
        }
    }
}

/// Settings for [`DefaultSearchColumns`](crate::search::DefaultSearchColumns).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Element types that take part in a search.
    pub types: Vec<String>,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            types: vec!["cds.String".to_string()],
        }
    }
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, SettingsError> {
        let settings: Settings = toml::from_str(content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `NAVQL_CONFIG`
    /// 2. `./navql.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("NAVQL_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("navql.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        Ok(Settings::default())
    }

    fn validate(&self) -> Result<(), SettingsError> {
        let prefix = &self.transform.localized_prefix;
        if prefix.is_empty() || prefix.contains(char::is_whitespace) {
            return Err(SettingsError::InvalidConfig(format!(
                "localized_prefix must be a plain name, got \"{}\"",
                prefix
            )));
        }
        Ok(())
    }
}
