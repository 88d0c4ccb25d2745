//! Configuration for a story controller.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::FlowResult;

/// Configuration for a story controller.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    /// Directory behind `user://` addresses and bare save names.
    pub user_data_dir: PathBuf,
    /// Directory behind `res://` addresses.
    pub resource_dir: PathBuf,
    /// Upper bound on steps in one maximal continuation. 0 = unlimited.
    pub max_continuation_steps: usize,
    /// Maximum queued events (oldest dropped when exceeded). 0 = unlimited.
    pub max_events: usize,
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            user_data_dir: PathBuf::from("user"),
            resource_dir: PathBuf::from("."),
            max_continuation_steps: 10_000,
            max_events: 0,
        }
    }
}

impl FlowConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> FlowResult<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a TOML file.
    pub fn from_toml_file(path: &Path) -> FlowResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Set the user data directory.
    pub fn with_user_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_dir = dir.into();
        self
    }

    /// Set the resource directory.
    pub fn with_resource_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.resource_dir = dir.into();
        self
    }

    /// Set the maximal continuation step cap (0 = unlimited).
    pub fn with_max_continuation_steps(mut self, steps: usize) -> Self {
        self.max_continuation_steps = steps;
        self
    }

    /// Set the event queue capacity (0 = unlimited).
    pub fn with_max_events(mut self, max: usize) -> Self {
        self.max_events = max;
        self
    }
}
