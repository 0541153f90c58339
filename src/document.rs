//! Persisted Static Configuration Document
//!
//! The versioned JSON file that records a finalized set of input
//! assignments. Only `schemaVersion: 1` in `"static"` mode is understood.
//!
//! ```json
//! {
//!   "schemaVersion": 1,
//!   "mode": "static",
//!   "metadata": { "toolVersion": "0.1.0", "platform": "uno", "timestamp": 1760000000 },
//!   "inputs": [
//!     { "idx": 0, "pin": "A0", "application": "CHT", "applicationIndex": 1,
//!       "sensor": "MAX6675", "sensorIndex": 1 }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// The only schema version this crate reads or writes.
pub const SCHEMA_VERSION: u64 = 1;

/// The only configuration mode this crate reads or writes.
pub const STATIC_MODE: &str = "static";

/// Document errors.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("Failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unsupported schemaVersion {0} (only 1 is supported)")]
    UnsupportedSchema(String),

    #[error("Unsupported mode {0} (only \"static\" is supported)")]
    UnsupportedMode(String),
}

/// Result type for document operations.
pub type DocumentResult<T> = Result<T, DocumentError>;

/// Where an input's calibration comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CalibrationSource {
    /// The sensor's built-in calibration
    #[serde(alias = "default")]
    Default,
    /// Parameters supplied for this input
    #[serde(alias = "custom")]
    Custom,
}

impl fmt::Display for CalibrationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CalibrationSource::Default => f.write_str("DEFAULT"),
            CalibrationSource::Custom => f.write_str("CUSTOM"),
        }
    }
}

/// Calibration attached to one input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomCalibration {
    /// THERMISTOR_STEINHART, PRESSURE_LINEAR, RPM, ...
    #[serde(rename = "type")]
    pub calibration_type: String,
    pub source: CalibrationSource,
    #[serde(default)]
    pub params: BTreeMap<String, serde_json::Number>,
}

impl CustomCalibration {
    pub fn is_custom(&self) -> bool {
        self.source == CalibrationSource::Custom
    }

    pub fn param(&self, name: &str) -> Option<&serde_json::Number> {
        self.params.get(name)
    }
}

/// One finalized input channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputAssignment {
    pub idx: u32,
    /// `A0`, `6`, or `I2C`
    pub pin: String,
    pub application: String,
    pub application_index: u32,
    pub sensor: String,
    pub sensor_index: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calibration: Option<CustomCalibration>,
}

impl InputAssignment {
    pub fn custom_calibration(&self) -> Option<&CustomCalibration> {
        self.calibration.as_ref().filter(|c| c.is_custom())
    }
}

/// Generation metadata; preserved unchanged across load and save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    pub tool_version: String,
    pub platform: String,
    /// Unix seconds
    pub timestamp: i64,
}

impl Metadata {
    pub fn new(tool_version: impl Into<String>, platform: impl Into<String>, at: DateTime<Utc>) -> Self {
        Self {
            tool_version: tool_version.into(),
            platform: platform.into(),
            timestamp: at.timestamp(),
        }
    }

    pub fn generated_at(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.timestamp, 0)
    }
}

/// The persisted configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigDocument {
    pub schema_version: u64,
    pub mode: String,
    pub metadata: Metadata,
    #[serde(default)]
    pub inputs: Vec<InputAssignment>,
}

impl ConfigDocument {
    /// Build a v1 static document from finalized inputs.
    pub fn from_inputs(inputs: &[InputAssignment], metadata: Metadata) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            mode: STATIC_MODE.to_string(),
            metadata,
            inputs: inputs.to_vec(),
        }
    }

    pub fn into_inputs(self) -> Vec<InputAssignment> {
        self.inputs
    }

    /// Parse a document, gating on schema version and mode first.
    pub fn from_json(text: &str) -> DocumentResult<Self> {
        let value: Value = serde_json::from_str(text)?;

        let version = value.get("schemaVersion");
        if version.and_then(Value::as_u64) != Some(SCHEMA_VERSION) {
            return Err(DocumentError::UnsupportedSchema(
                version.map_or_else(|| "missing".to_string(), Value::to_string),
            ));
        }

        let mode = value.get("mode");
        if mode.and_then(Value::as_str) != Some(STATIC_MODE) {
            return Err(DocumentError::UnsupportedMode(
                mode.map_or_else(|| "missing".to_string(), Value::to_string),
            ));
        }

        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> DocumentResult<String> {
        let mut text = serde_json::to_string_pretty(self)?;
        text.push('\n');
        Ok(text)
    }

    pub fn load(path: &Path) -> DocumentResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> DocumentResult<()> {
        std::fs::write(path, self.to_json()?).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}
