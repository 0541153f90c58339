//! Registry Validation Engine
//!
//! Independent passes over compiled registries. A pass never stops at the
//! first finding and never depends on another pass having succeeded; the
//! engine runs them all and aggregates the findings.
//!
//! Users run: `regc validate --project-dir . --check-config --ci`

pub mod config_block;
pub mod pins;

use std::collections::BTreeMap;
use std::fmt;

use crate::document::InputAssignment;
use crate::hash::{djb2_16, format_hash};
use crate::registry::{FieldValue, PinType, Registries, Registry, RegistryEntry, RegistryKind};

pub use config_block::check_config_block;
pub use pins::{check_pin_compatibility, parse_pin, PinDesignator};

const PASS_GLYPH: &str = "✓";
const ERROR_GLYPH: &str = "✗";
const WARNING_GLYPH: &str = "⚠";

/// Validation error (the registries or configuration are invalid)
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Stored hash differs from the recomputed one
    HashMismatch {
        entry: String,
        field: &'static str,
        expected: u16,
        found: u16,
    },
    /// Named entry without an integer hash literal
    MissingHash { entry: String, field: &'static str },
    /// Two implemented entries share a hash
    HashCollision {
        kind: RegistryKind,
        hash: u16,
        first: String,
        second: String,
    },
    /// Two entries share an index
    DuplicateIndex {
        kind: RegistryKind,
        index: u32,
        first: String,
        second: String,
    },
    /// Application's default sensor does not exist
    MissingDefaultSensor { application: String, sensor: String },
    /// Application and its default sensor measure different things
    MeasurementTypeMismatch {
        application: String,
        expected: String,
        sensor: String,
        actual: String,
    },
    /// No static config block between the markers
    MissingConfigBlock { start_marker: String },
    /// Start marker without the matching end marker
    UnterminatedConfigBlock {
        start_marker: String,
        end_marker: String,
        line: usize,
    },
    /// Block lacks `NUM_CONFIGURED_INPUTS`
    MissingInputCount,
    /// Block lacks `INPUT_<i>_<FIELD>`
    MissingInputDefine { input: u32, define: String },
    /// `INPUT_<i>_APPLICATION`/`_SENSOR` that is not an integer index
    MalformedInputDefine {
        input: u32,
        define: String,
        value: String,
    },
    /// Two inputs on one pin
    DuplicatePin { pin: String, first: u32, second: u32 },
    /// Input references an application index that does not exist
    UnknownApplication { input: u32, index: u32 },
    /// Input references a sensor index that does not exist
    UnknownSensor { input: u32, index: u32 },
    /// I2C sensor on a non-I2C pin
    I2cPinRequired {
        input: u32,
        sensor: String,
        pin: String,
    },
    /// Non-I2C sensor on the I2C marker pin
    I2cPinReserved { input: u32, sensor: String },
    /// Analog sensor on a digital pin or vice versa
    PinTypeMismatch {
        input: u32,
        sensor: String,
        pin: String,
        required: PinType,
        actual: PinType,
    },
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::HashMismatch {
                entry,
                field,
                expected,
                found,
            } => {
                write!(
                    f,
                    "Hash mismatch for {} ({}). Expected {}, found {}",
                    entry,
                    field,
                    format_hash(*expected),
                    format_hash(*found)
                )
            }
            ValidationError::MissingHash { entry, field } => {
                write!(f, "{} has no integer {} literal", entry, field)
            }
            ValidationError::HashCollision {
                kind,
                hash,
                first,
                second,
            } => {
                write!(
                    f,
                    "{} hash collision: {} and {} have the same hash {}",
                    kind.label(),
                    second,
                    first,
                    format_hash(*hash)
                )
            }
            ValidationError::DuplicateIndex {
                kind,
                index,
                first,
                second,
            } => {
                write!(
                    f,
                    "{} index {} declared twice: {} and {}",
                    kind.label(),
                    index,
                    first,
                    second
                )
            }
            ValidationError::MissingDefaultSensor {
                application,
                sensor,
            } => {
                write!(
                    f,
                    "{} references non-existent SENSOR[{}]",
                    application, sensor
                )
            }
            ValidationError::MeasurementTypeMismatch {
                application,
                expected,
                sensor,
                actual,
            } => {
                write!(
                    f,
                    "Measurement type mismatch in {}. Expected {}, but {} provides {}",
                    application, expected, sensor, actual
                )
            }
            ValidationError::MissingConfigBlock { start_marker } => {
                write!(f, "Could not find the '{}' block", start_marker)
            }
            ValidationError::UnterminatedConfigBlock {
                start_marker,
                end_marker,
                line,
            } => write!(
                f,
                "'{}' on line {} has no matching '{}'",
                start_marker, line, end_marker
            ),
            ValidationError::MissingInputCount => {
                write!(f, "NUM_CONFIGURED_INPUTS is not defined in the static config block")
            }
            ValidationError::MissingInputDefine { input, define } => {
                write!(f, "INPUT_{}_{} is not defined", input, define)
            }
            ValidationError::MalformedInputDefine {
                input,
                define,
                value,
            } => write!(
                f,
                "INPUT_{}_{} must be an integer index (found {})",
                input, define, value
            ),
            ValidationError::DuplicatePin { pin, first, second } => {
                write!(
                    f,
                    "Duplicate pin assignment for {} on INPUT_{} (already used by INPUT_{})",
                    pin, second, first
                )
            }
            ValidationError::UnknownApplication { input, index } => {
                write!(f, "INPUT_{} references non-existent APP[{}]", input, index)
            }
            ValidationError::UnknownSensor { input, index } => {
                write!(f, "INPUT_{} references non-existent SENSOR[{}]", input, index)
            }
            ValidationError::I2cPinRequired { input, sensor, pin } => {
                write!(
                    f,
                    "Input {}: I2C sensor '{}' must use 'I2C' as pin (not {})",
                    input, sensor, pin
                )
            }
            ValidationError::I2cPinReserved { input, sensor } => {
                write!(
                    f,
                    "Input {}: Sensor '{}' cannot use 'I2C' as pin (only I2C sensors)",
                    input, sensor
                )
            }
            ValidationError::PinTypeMismatch {
                input,
                sensor,
                pin,
                required,
                actual,
            } => {
                write!(
                    f,
                    "Input {}: Sensor '{}' requires {} pin, but {} is {} pin",
                    input,
                    sensor,
                    with_article(*required),
                    pin,
                    with_article(*actual)
                )
            }
        }
    }
}

fn with_article(pin_type: PinType) -> String {
    match pin_type {
        PinType::Digital => format!("a {}", pin_type),
        PinType::Analog | PinType::I2c => format!("an {}", pin_type),
    }
}

/// Validation warning (valid, but probably not what was intended)
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationWarning {
    /// Application's default sensor is a placeholder
    UnimplementedDefaultSensor { application: String, sensor: String },
    /// Input selects a placeholder entry
    UnimplementedSelection { input: u32, entry: String },
}

impl std::fmt::Display for ValidationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationWarning::UnimplementedDefaultSensor {
                application,
                sensor,
            } => {
                write!(f, "{} references unimplemented {}", application, sensor)
            }
            ValidationWarning::UnimplementedSelection { input, entry } => {
                write!(f, "INPUT_{} selects unimplemented {}", input, entry)
            }
        }
    }
}

/// Findings of one pass.
#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Heading shown before the findings
    pub title: String,
    /// Line shown when the pass finds nothing
    pub success: String,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl PassReport {
    pub fn new(title: impl Into<String>, success: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            success: success.into(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.warnings.is_empty()
    }

    /// Glyph-prefixed lines for this pass.
    pub fn render(&self) -> String {
        let mut s = format!("{}...\n", self.title);
        if self.is_clean() {
            s.push_str(&format!("  {} {}\n", PASS_GLYPH, self.success));
        }
        for e in &self.errors {
            s.push_str(&format!("  {} {}\n", ERROR_GLYPH, e));
        }
        for w in &self.warnings {
            s.push_str(&format!("  {} {}\n", WARNING_GLYPH, w));
        }
        s
    }
}

/// Overall outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationStatus {
    Passed,
    PassedWithWarnings,
    Failed,
}

/// Aggregated findings of several passes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub passes: Vec<PassReport>,
}

impl ValidationReport {
    pub fn push(&mut self, pass: PassReport) {
        self.passes.push(pass);
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.passes.extend(other.passes);
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationError> {
        self.passes.iter().flat_map(|p| p.errors.iter())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationWarning> {
        self.passes.iter().flat_map(|p| p.warnings.iter())
    }

    pub fn error_count(&self) -> usize {
        self.passes.iter().map(|p| p.errors.len()).sum()
    }

    pub fn warning_count(&self) -> usize {
        self.passes.iter().map(|p| p.warnings.len()).sum()
    }

    pub fn is_valid(&self) -> bool {
        self.error_count() == 0
    }

    pub fn status(&self) -> ValidationStatus {
        match (self.error_count(), self.warning_count()) {
            (0, 0) => ValidationStatus::Passed,
            (0, _) => ValidationStatus::PassedWithWarnings,
            _ => ValidationStatus::Failed,
        }
    }

    pub fn summary(&self) -> String {
        let counts = format!(
            "({} errors, {} warnings)",
            self.error_count(),
            self.warning_count()
        );
        match self.status() {
            ValidationStatus::Passed => "PASSED".to_string(),
            ValidationStatus::PassedWithWarnings => format!("PASSED WITH WARNINGS {}", counts),
            ValidationStatus::Failed => format!("FAILED {}", counts),
        }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for pass in &self.passes {
            writeln!(f, "{}", pass.render())?;
        }
        write!(f, "Status: {}", self.summary())
    }
}

/// Run every registry-only pass.
pub fn validate_registries(registries: &Registries) -> ValidationReport {
    ValidationReport {
        passes: vec![
            check_hashes(registries),
            check_collisions(registries),
            check_indices(registries),
            check_references(registries),
            check_measurement_types(registries),
        ],
    }
}

/// Run the passes that need a finalized assignment list.
pub fn validate_assignments(
    inputs: &[InputAssignment],
    registries: &Registries,
) -> ValidationReport {
    ValidationReport {
        passes: vec![
            check_pin_compatibility(inputs, &registries.sensors),
            check_assignments(inputs, registries),
        ],
    }
}

fn name_hash_errors<E: RegistryEntry>(registry: &Registry<E>, errors: &mut Vec<ValidationError>) {
    for entry in registry {
        let Some(name) = entry.name() else { continue };
        verify_hash(entry.describe(), "nameHash", name, entry.name_hash(), errors);
    }
}

fn verify_hash(
    entry: String,
    field: &'static str,
    text: &str,
    stored: Option<u16>,
    errors: &mut Vec<ValidationError>,
) {
    let expected = djb2_16(text);
    match stored {
        None => errors.push(ValidationError::MissingHash { entry, field }),
        Some(found) if found != expected => errors.push(ValidationError::HashMismatch {
            entry,
            field,
            expected,
            found,
        }),
        Some(_) => {}
    }
}

/// Recompute every stored name hash (and unit alias hash).
pub fn check_hashes(registries: &Registries) -> PassReport {
    let mut report = PassReport::new(
        "Checking hash algorithm correctness",
        "All hashes match djb2 algorithm",
    );

    name_hash_errors(&registries.sensors, &mut report.errors);
    name_hash_errors(&registries.applications, &mut report.errors);
    name_hash_errors(&registries.units, &mut report.errors);

    for unit in &registries.units {
        if let Some(alias) = unit.alias.as_deref() {
            verify_hash(
                format!("{} alias {}", unit.describe(), alias),
                "aliasHash",
                alias,
                unit.alias_hash,
                &mut report.errors,
            );
        }
    }

    report
}

/// Record `hash` for `owner`, reporting a collision if it was already taken.
fn claim_hash(
    seen: &mut BTreeMap<u16, String>,
    kind: RegistryKind,
    hash: u16,
    owner: String,
    errors: &mut Vec<ValidationError>,
) {
    match seen.get(&hash) {
        Some(first) => errors.push(ValidationError::HashCollision {
            kind,
            hash,
            first: first.clone(),
            second: owner,
        }),
        None => {
            seen.insert(hash, owner);
        }
    }
}

fn name_collisions<E: RegistryEntry>(
    registry: &Registry<E>,
    seen: &mut BTreeMap<u16, String>,
    errors: &mut Vec<ValidationError>,
) {
    for entry in registry.implemented() {
        if let Some(hash) = entry.name_hash() {
            claim_hash(seen, E::KIND, hash, entry.describe(), errors);
        }
    }
}

/// Distinct implemented entries must not share a hash.
pub fn check_collisions(registries: &Registries) -> PassReport {
    let mut report = PassReport::new("Checking for hash collisions", "No hash collisions found");

    name_collisions(&registries.sensors, &mut BTreeMap::new(), &mut report.errors);
    name_collisions(
        &registries.applications,
        &mut BTreeMap::new(),
        &mut report.errors,
    );

    // Unit names and aliases share one lookup table in firmware
    let mut seen = BTreeMap::new();
    for unit in registries.units.implemented() {
        if let Some(hash) = unit.name_hash {
            claim_hash(&mut seen, RegistryKind::Unit, hash, unit.describe(), &mut report.errors);
        }
        if let (Some(alias), Some(hash)) = (unit.alias.as_deref(), unit.alias_hash) {
            if unit.name_hash != Some(hash) {
                claim_hash(
                    &mut seen,
                    RegistryKind::Unit,
                    hash,
                    format!("{} alias {}", unit.describe(), alias),
                    &mut report.errors,
                );
            }
        }
    }

    report
}

fn duplicate_indices<E: RegistryEntry>(registry: &Registry<E>, errors: &mut Vec<ValidationError>) {
    let mut seen: BTreeMap<u32, String> = BTreeMap::new();
    for entry in registry {
        match seen.get(&entry.index()) {
            Some(first) => errors.push(ValidationError::DuplicateIndex {
                kind: E::KIND,
                index: entry.index(),
                first: first.clone(),
                second: entry.describe(),
            }),
            None => {
                seen.insert(entry.index(), entry.describe());
            }
        }
    }
}

/// Every index appears once per registry.
pub fn check_indices(registries: &Registries) -> PassReport {
    let mut report = PassReport::new("Checking index uniqueness", "All indices are unique");
    duplicate_indices(&registries.sensors, &mut report.errors);
    duplicate_indices(&registries.applications, &mut report.errors);
    duplicate_indices(&registries.units, &mut report.errors);
    report
}

/// Implemented applications must name an existing default sensor.
pub fn check_references(registries: &Registries) -> PassReport {
    let mut report = PassReport::new("Checking cross-references", "All index references are valid");

    for app in registries.applications.implemented() {
        let target = app.default_sensor.as_ref();
        match target
            .and_then(|v| v.as_index())
            .and_then(|i| registries.sensors.get(i))
        {
            None => report.errors.push(ValidationError::MissingDefaultSensor {
                application: app.describe(),
                sensor: target.map_or_else(|| "none".to_string(), ToString::to_string),
            }),
            Some(sensor) if !sensor.is_implemented() => {
                report
                    .warnings
                    .push(ValidationWarning::UnimplementedDefaultSensor {
                        application: app.describe(),
                        sensor: sensor.describe(),
                    })
            }
            Some(_) => {}
        }
    }

    report
}

/// An application and its implemented default sensor measure the same quantity.
pub fn check_measurement_types(registries: &Registries) -> PassReport {
    let mut report = PassReport::new(
        "Checking measurement types",
        "All measurement types are consistent",
    );

    for app in registries.applications.implemented() {
        let Some(sensor) = app
            .default_sensor
            .as_ref()
            .and_then(|v| v.as_index())
            .and_then(|i| registries.sensors.get(i))
            .filter(|s| s.is_implemented())
        else {
            continue;
        };

        if app.expected_measurement_type != sensor.measurement_type {
            report.errors.push(ValidationError::MeasurementTypeMismatch {
                application: app.describe(),
                expected: show_value(app.expected_measurement_type.as_ref()),
                sensor: sensor.describe(),
                actual: show_value(sensor.measurement_type.as_ref()),
            });
        }
    }

    report
}

fn show_value(value: Option<&FieldValue>) -> String {
    value.map_or_else(|| "nothing".to_string(), ToString::to_string)
}

/// Every assignment names existing, preferably implemented, entries.
pub fn check_assignments(inputs: &[InputAssignment], registries: &Registries) -> PassReport {
    let mut report = PassReport::new(
        "Checking input assignments",
        "All inputs reference existing entries",
    );

    for input in inputs {
        match registries.applications.get(input.application_index) {
            None => report.errors.push(ValidationError::UnknownApplication {
                input: input.idx,
                index: input.application_index,
            }),
            Some(app) if !app.is_implemented() => {
                report.warnings.push(ValidationWarning::UnimplementedSelection {
                    input: input.idx,
                    entry: app.describe(),
                })
            }
            Some(_) => {}
        }

        match registries.sensors.get(input.sensor_index) {
            None => report.errors.push(ValidationError::UnknownSensor {
                input: input.idx,
                index: input.sensor_index,
            }),
            Some(sensor) if !sensor.is_implemented() => {
                report.warnings.push(ValidationWarning::UnimplementedSelection {
                    input: input.idx,
                    entry: sensor.describe(),
                })
            }
            Some(_) => {}
        }
    }

    report
}
