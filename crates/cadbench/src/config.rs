//! Workbench configuration loaded from TOML.
//!
//! ```toml
//! [session]
//! namespace = "cadbench"
//! state_file = "state/session.json"
//!
//! [mesh]
//! linear_deflection = 0.1
//! angular_deflection = 0.5
//!
//! [kernel]
//! asset_dir = "assets"
//! assets = ["kernel.wasm"]
//!
//! [warmup]
//! enabled = true
//! idle_delay_ms = 50
//!
//! [export]
//! download_dir = "downloads"
//! ```
//!
//! Every key is optional.

use cadbench_kernel::KernelOptions;
use cadbench_tessellate::MeshParams;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur while loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("Failed to read config {}: {source}", .path.display())]
    Io {
        /// File that was read.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The file is not valid TOML for this schema.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range.
    #[error("Invalid config value: {0}")]
    Invalid(String),
}

/// Full workbench configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkbenchConfig {
    /// Session persistence.
    pub session: SessionConfig,
    /// Meshing tolerances.
    pub mesh: MeshParams,
    /// Kernel assets.
    pub kernel: KernelConfig,
    /// Background warmup.
    pub warmup: WarmupConfig,
    /// Export delivery.
    pub export: ExportConfig,
}

/// `[session]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Prefix of every persisted key.
    pub namespace: String,
    /// JSON state file. Without one, sessions live in memory.
    pub state_file: Option<PathBuf>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            namespace: "cadbench".into(),
            state_file: None,
        }
    }
}

/// `[kernel]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelConfig {
    /// Directory holding the kernel assets.
    pub asset_dir: Option<PathBuf>,
    /// Asset file names.
    pub assets: Vec<String>,
}

impl KernelConfig {
    /// Loader options for the kernel cache.
    pub fn options(&self) -> KernelOptions {
        KernelOptions {
            asset_dir: self.asset_dir.clone(),
            assets: self.assets.clone(),
        }
    }
}

/// `[warmup]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WarmupConfig {
    /// Start the warmup worker at all.
    pub enabled: bool,
    /// Delay before the worker starts reading assets.
    pub idle_delay_ms: u64,
}

impl Default for WarmupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            idle_delay_ms: 50,
        }
    }
}

impl WarmupConfig {
    /// The idle delay as a [`Duration`].
    pub fn idle_delay(&self) -> Duration {
        Duration::from_millis(self.idle_delay_ms)
    }
}

/// `[export]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Where downloads are delivered.
    pub download_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            download_dir: PathBuf::from("downloads"),
        }
    }
}

impl WorkbenchConfig {
    /// Read and validate a TOML config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "config loaded");
        Ok(config)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let MeshParams {
            linear_deflection,
            angular_deflection,
        } = self.mesh;
        if !(linear_deflection.is_finite() && linear_deflection > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "mesh.linear_deflection must be positive, got {linear_deflection}"
            )));
        }
        if !(angular_deflection.is_finite() && angular_deflection > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "mesh.angular_deflection must be positive, got {angular_deflection}"
            )));
        }
        if self.session.namespace.is_empty() {
            return Err(ConfigError::Invalid("session.namespace must not be empty".into()));
        }
        if self.kernel.asset_dir.is_none() && !self.kernel.assets.is_empty() {
            return Err(ConfigError::Invalid(
                "kernel.assets needs kernel.asset_dir".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_is_default() {
        let config = WorkbenchConfig::from_toml_str("").unwrap();
        assert_eq!(config, WorkbenchConfig::default());
        assert_eq!(config.session.namespace, "cadbench");
        assert_eq!(config.mesh.linear_deflection, 0.1);
        assert_eq!(config.mesh.angular_deflection, 0.5);
        assert_eq!(config.warmup.idle_delay(), Duration::from_millis(50));
        assert!(config.warmup.enabled);
    }

    #[test]
    fn test_partial_sections() {
        let config = WorkbenchConfig::from_toml_str(
            r#"
            [mesh]
            linear_deflection = 0.02

            [kernel]
            asset_dir = "assets"
            assets = ["kernel.wasm", "tables.bin"]
            "#,
        )
        .unwrap();
        assert_eq!(config.mesh.linear_deflection, 0.02);
        assert_eq!(config.mesh.angular_deflection, 0.5);
        let options = config.kernel.options();
        assert_eq!(options.asset_paths()[1], PathBuf::from("assets/tables.bin"));
    }

    #[test]
    fn test_validation() {
        assert!(matches!(
            WorkbenchConfig::from_toml_str("[mesh]\nlinear_deflection = 0.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkbenchConfig::from_toml_str("[mesh]\nangular_deflection = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkbenchConfig::from_toml_str("[kernel]\nassets = [\"a\"]"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            WorkbenchConfig::from_toml_str("[warmup]\nidle_delay_ms = \"soon\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_load_missing_file() {
        let err = WorkbenchConfig::load(Path::new("/nonexistent/cadbench.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
