#![forbid(unsafe_code)]

//! Engine configuration as data.
//!
//! [`EngineConfig`] is loaded from TOML or JSON. Every field has a default,
//! so an empty document yields `EngineConfig::default()`.
//!
//! ```toml
//! animation_delay_ms = 250
//!
//! [grid]
//! columns = 48
//! default_panel_width = 24
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Grid geometry used when placing incoming panels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub columns: u32,
    pub default_panel_width: u32,
    pub default_panel_height: u32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            columns: 48,
            default_panel_width: 24,
            default_panel_height: 15,
        }
    }
}

/// Top-level configuration for the composition engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub grid: GridConfig,
    /// Delay after the container is ready before panel animations are on.
    pub animation_delay_ms: u64,
    /// Prefix of the embedded control group's id.
    pub control_group_id_prefix: String,
    /// Stands in for the container id when the container is unsaved.
    pub new_container_id: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid: GridConfig::default(),
            animation_delay_ms: 500,
            control_group_id_prefix: String::from("control_group_"),
            new_container_id: String::from("new_dashboard"),
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(ConfigError::Toml)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(ConfigError::Json)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_json_str(&content)
    }

    /// Problems with the configured values. Empty means valid.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.grid.columns == 0 {
            errors.push("grid.columns must be > 0".into());
        }
        if self.grid.default_panel_width == 0 || self.grid.default_panel_width > self.grid.columns {
            errors.push(format!(
                "grid.default_panel_width must be in 1..={}, got {}",
                self.grid.columns, self.grid.default_panel_width
            ));
        }
        if self.grid.default_panel_height == 0 {
            errors.push("grid.default_panel_height must be > 0".into());
        }
        if self.new_container_id.is_empty() {
            errors.push("new_container_id must not be empty".into());
        }
        errors
    }

    /// `self` if valid, otherwise every problem at once.
    pub fn validated(self) -> Result<Self, ConfigError> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(self)
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    #[must_use]
    pub fn animation_delay(&self) -> Duration {
        Duration::from_millis(self.animation_delay_ms)
    }

    /// Id of the control group embedded in container `container_id`.
    #[must_use]
    pub fn control_group_id(&self, container_id: Option<&str>) -> String {
        format!(
            "{}{}",
            self.control_group_id_prefix,
            container_id.unwrap_or(&self.new_container_id)
        )
    }
}

/// Failure to load an [`EngineConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(serde_json::Error),

    #[error("validation errors: {}", .0.join("; "))]
    Validation(Vec<String>),
}
