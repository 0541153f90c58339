//! Static Configuration Generator
//!
//! Emits the artifacts the firmware build consumes when it is compiled with
//! `USE_STATIC_CONFIG`:
//!
//! - the static config block, patched into `config.h` ([`config_block`])
//! - `static_calibrations.h` for inputs with custom calibrations ([`calibration`])
//! - optional thin registry headers holding only the selected entries ([`thin`])
//!
//! Every emitter is a pure function of its inputs plus a [`GenerationContext`];
//! the timestamp is injected, never read from the clock inside an emitter.
//!
//! ```text
//! inputs ──► calibration table ──┐
//!        ──► config block ───────┼──► Generator::generate ──► files
//!        ──► thin libraries ─────┘
//! ```

pub mod calibration;
pub mod config_block;
pub mod thin;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;
use tracing::info;

use crate::config::GeneratorConfig;
use crate::document::InputAssignment;
use crate::registry::Registries;

pub use calibration::{generate_calibration_file, CalibrationArtifact};
pub use config_block::{
    find_block, generate_config_block, patch_config_file, BlockLocation, BlockMarkers, PatchOutcome,
};
pub use thin::generate_thin_library;

/// Errors that can occur while generating artifacts.
#[derive(Debug, Error)]
pub enum GeneratorError {
    #[error("Failed to write {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config header {0} does not exist")]
    TargetMissing(PathBuf),

    #[error("{path}:{line}: '{start_marker}' has no matching '{end_marker}'; close or remove the block by hand")]
    UnterminatedBlock {
        path: PathBuf,
        start_marker: String,
        end_marker: String,
        line: usize,
    },

    #[error("Input {input}: unknown calibration type '{calibration_type}'")]
    UnknownCalibrationType { input: u32, calibration_type: String },

    #[error("Input {input}: {calibration_type} calibration is missing parameter '{param}'")]
    MissingCalibrationParam {
        input: u32,
        calibration_type: String,
        param: String,
    },

    #[error("Failed to replace {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for generator operations.
pub type GeneratorResult<T> = Result<T, GeneratorError>;

pub(crate) fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> GeneratorError + '_ {
    move |source| GeneratorError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Values stamped into every generated banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationContext {
    pub tool_version: String,
    pub platform: String,
    pub timestamp: DateTime<Utc>,
}

impl GenerationContext {
    pub fn new(
        tool_version: impl Into<String>,
        platform: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            tool_version: tool_version.into(),
            platform: platform.into(),
            timestamp,
        }
    }

    /// Context for this build of the tool at the current time.
    pub fn now(platform: impl Into<String>) -> Self {
        Self::new(crate::VERSION, platform, Utc::now())
    }

    /// RFC 3339 UTC, second precision.
    pub fn timestamp_rfc3339(&self) -> String {
        self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
    }
}

/// What a generation run wrote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationReport {
    pub config_header: PathBuf,
    pub patch: PatchOutcome,
    pub calibration: CalibrationArtifact,
    pub thin_libraries: Vec<PathBuf>,
}

/// Writes all artifacts for one finalized input list.
pub struct Generator {
    config: GeneratorConfig,
}

impl Generator {
    /// Create a new generator with the given artifact settings.
    pub fn new(config: GeneratorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GeneratorConfig {
        &self.config
    }

    pub fn markers(&self) -> BlockMarkers {
        BlockMarkers::from(&self.config)
    }

    /// Generate every artifact under `project_dir`.
    ///
    /// Calibration tables are rendered before anything is written, so an
    /// unusable calibration leaves the project untouched. I/O failures after
    /// that point leave already written artifacts in place.
    pub fn generate(
        &self,
        project_dir: &Path,
        registries: &Registries,
        inputs: &[InputAssignment],
        ctx: &GenerationContext,
        thin_libraries: bool,
    ) -> GeneratorResult<GenerationReport> {
        let calibrations = generate_calibration_file(inputs, ctx)?;

        let config_header = project_dir.join(&self.config.config_header);
        let block = generate_config_block(inputs, ctx, &self.markers());
        let patch = patch_config_file(
            &config_header,
            &block,
            &self.markers(),
            &self.config.backup_suffix,
        )?;

        let generated_dir = project_dir.join(&self.config.generated_dir);
        let calibration = calibration::write_calibration_file(
            &generated_dir.join(&self.config.calibration_file),
            calibrations.as_deref(),
        )?;

        let mut thin_paths = Vec::new();
        if thin_libraries {
            let sensors: BTreeSet<u32> = inputs.iter().map(|i| i.sensor_index).collect();
            let applications: BTreeSet<u32> =
                inputs.iter().map(|i| i.application_index).collect();

            let sensor_path = generated_dir.join(&self.config.sensor_thin_lib);
            let text = generate_thin_library(&registries.sensors, &sensors, ctx, &self.config.sensor_thin_lib);
            write_artifact(&sensor_path, &text)?;
            thin_paths.push(sensor_path);

            let app_path = generated_dir.join(&self.config.application_thin_lib);
            let text = generate_thin_library(
                &registries.applications,
                &applications,
                ctx,
                &self.config.application_thin_lib,
            );
            write_artifact(&app_path, &text)?;
            thin_paths.push(app_path);
        }

        Ok(GenerationReport {
            config_header,
            patch,
            calibration,
            thin_libraries: thin_paths,
        })
    }
}

/// Write a generated file, creating its directory.
pub(crate) fn write_artifact(path: &Path, content: &str) -> GeneratorResult<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(io_error(dir))?;
    }
    std::fs::write(path, content).map_err(io_error(path))?;
    info!(path = %path.display(), bytes = content.len(), "wrote artifact");
    Ok(())
}

/// `static_calibrations.h` -> `STATIC_CALIBRATIONS_H`
pub(crate) fn header_guard(file_name: &str) -> String {
    file_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
