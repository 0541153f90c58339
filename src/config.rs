//! Registry Compiler Project Configuration
//!
//! Handles parsing of `regc.toml`: where the registry headers live, where
//! generated artifacts go, and the default log level.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Name of the project configuration file.
pub const CONFIG_FILE_NAME: &str = "regc.toml";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file not found: {0}")]
    NotFound(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root configuration structure matching regc.toml.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RegcConfig {
    /// Registry header locations
    #[serde(default)]
    pub registry: RegistryConfig,

    /// Generated artifact locations and markers
    #[serde(default)]
    pub generator: GeneratorConfig,

    /// Logging defaults
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RegcConfig {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = std::fs::read_to_string(path)?;
        let config: RegcConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Find and load configuration by searching up from the given directory.
    ///
    /// Falls back to defaults when no regc.toml exists in any parent.
    pub fn find_and_load(start_dir: &Path) -> ConfigResult<Self> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let config_path = dir.join(CONFIG_FILE_NAME);
            if config_path.exists() {
                return Self::load(&config_path);
            }
            if !dir.pop() {
                return Ok(Self::default());
            }
        }
    }
}

/// Registry header locations, relative to the project directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegistryConfig {
    /// Directory holding the registry headers
    #[serde(default = "default_header_dir")]
    pub header_dir: PathBuf,

    #[serde(default = "default_sensor_header")]
    pub sensor_header: String,

    #[serde(default = "default_application_header")]
    pub application_header: String,

    #[serde(default = "default_unit_header")]
    pub unit_header: String,

    /// Only local includes under this sub-directory are inlined
    #[serde(default = "default_include_subdir")]
    pub include_subdir: String,

    /// Generated enum header, relative to `header_dir`
    #[serde(default = "default_enum_header")]
    pub enum_header: String,
}

fn default_header_dir() -> PathBuf {
    PathBuf::from("src/lib")
}

fn default_sensor_header() -> String {
    "sensor_library.h".to_string()
}

fn default_application_header() -> String {
    "application_presets.h".to_string()
}

fn default_unit_header() -> String {
    "units_registry.h".to_string()
}

fn default_include_subdir() -> String {
    "sensor_library/".to_string()
}

fn default_enum_header() -> String {
    "generated/registry_enums.h".to_string()
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            header_dir: default_header_dir(),
            sensor_header: default_sensor_header(),
            application_header: default_application_header(),
            unit_header: default_unit_header(),
            include_subdir: default_include_subdir(),
            enum_header: default_enum_header(),
        }
    }
}

impl RegistryConfig {
    pub fn header_dir(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.header_dir)
    }

    pub fn sensor_path(&self, project_dir: &Path) -> PathBuf {
        self.header_dir(project_dir).join(&self.sensor_header)
    }

    pub fn application_path(&self, project_dir: &Path) -> PathBuf {
        self.header_dir(project_dir).join(&self.application_header)
    }

    pub fn unit_path(&self, project_dir: &Path) -> PathBuf {
        self.header_dir(project_dir).join(&self.unit_header)
    }

    pub fn enum_path(&self, project_dir: &Path) -> PathBuf {
        self.header_dir(project_dir).join(&self.enum_header)
    }
}

/// Generated artifact settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorConfig {
    /// Header that receives the static config block
    #[serde(default = "default_config_header")]
    pub config_header: PathBuf,

    /// Output directory for calibration tables and thin libraries
    #[serde(default = "default_generated_dir")]
    pub generated_dir: PathBuf,

    #[serde(default = "default_start_marker")]
    pub start_marker: String,

    #[serde(default = "default_end_marker")]
    pub end_marker: String,

    #[serde(default = "default_backup_suffix")]
    pub backup_suffix: String,

    #[serde(default = "default_calibration_file")]
    pub calibration_file: String,

    #[serde(default = "default_sensor_thin_lib")]
    pub sensor_thin_lib: String,

    #[serde(default = "default_application_thin_lib")]
    pub application_thin_lib: String,

    /// Platform recorded when neither the command line nor the document names one
    #[serde(default = "default_platform")]
    pub platform: String,
}

fn default_config_header() -> PathBuf {
    PathBuf::from("src/config.h")
}

fn default_generated_dir() -> PathBuf {
    PathBuf::from("src/lib/generated")
}

fn default_start_marker() -> String {
    "#ifdef USE_STATIC_CONFIG".to_string()
}

fn default_end_marker() -> String {
    "#endif // USE_STATIC_CONFIG".to_string()
}

fn default_backup_suffix() -> String {
    ".bak".to_string()
}

fn default_calibration_file() -> String {
    "static_calibrations.h".to_string()
}

fn default_sensor_thin_lib() -> String {
    "sensor_library_static.h".to_string()
}

fn default_application_thin_lib() -> String {
    "application_presets_static.h".to_string()
}

fn default_platform() -> String {
    "uno".to_string()
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            config_header: default_config_header(),
            generated_dir: default_generated_dir(),
            start_marker: default_start_marker(),
            end_marker: default_end_marker(),
            backup_suffix: default_backup_suffix(),
            calibration_file: default_calibration_file(),
            sensor_thin_lib: default_sensor_thin_lib(),
            application_thin_lib: default_application_thin_lib(),
            platform: default_platform(),
        }
    }
}

/// Logging defaults, overridden by `-v` and `RUST_LOG`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegcConfig::default();
        assert_eq!(config.registry.header_dir, PathBuf::from("src/lib"));
        assert_eq!(config.registry.include_subdir, "sensor_library/");
        assert_eq!(config.generator.start_marker, "#ifdef USE_STATIC_CONFIG");
        assert_eq!(config.generator.end_marker, "#endif // USE_STATIC_CONFIG");
        assert_eq!(config.logging.level, "warn");
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[registry]
header_dir = "firmware/lib"
sensor_header = "sensors.h"

[generator]
config_header = "firmware/config.h"
backup_suffix = ".orig"

[logging]
level = "debug"
"#;
        let config: RegcConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.registry.header_dir, PathBuf::from("firmware/lib"));
        assert_eq!(config.registry.sensor_header, "sensors.h");
        assert_eq!(config.registry.unit_header, "units_registry.h");
        assert_eq!(config.generator.config_header, PathBuf::from("firmware/config.h"));
        assert_eq!(config.generator.backup_suffix, ".orig");
        assert_eq!(config.generator.calibration_file, "static_calibrations.h");
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_registry_paths() {
        let registry = RegistryConfig::default();
        let root = Path::new("/proj");
        assert_eq!(
            registry.sensor_path(root),
            PathBuf::from("/proj/src/lib/sensor_library.h")
        );
        assert_eq!(
            registry.enum_path(root),
            PathBuf::from("/proj/src/lib/generated/registry_enums.h")
        );
    }

    #[test]
    fn test_find_and_load_walks_up() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "[logging]\nlevel = \"info\"\n",
        )
        .unwrap();
        let nested = dir.path().join("a/b");
        std::fs::create_dir_all(&nested).unwrap();

        let config = RegcConfig::find_and_load(&nested).unwrap();
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_missing_file() {
        let err = RegcConfig::load(Path::new("/nonexistent/regc.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
