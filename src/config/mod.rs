//! Configuration module for navql.
//!
//! Handles the TOML settings that tune the transformation.

mod settings;

pub use settings::{SearchSettings, Settings, SettingsError, TransformSettings};
