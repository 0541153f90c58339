//! Registry Header Compiler
//!
//! Compiles the firmware's macro-based registry headers into typed,
//! immutable [`Registries`]. The pipeline per header is:
//!
//! 1. inline local includes (sensor library only)
//! 2. extract string macros and raw entry blocks ([`extract`])
//! 3. assign indices (annotation, else position)
//! 4. resolve field text into typed values ([`resolve`])
//!
//! Steps 2-4 are pure; [`parse_registry`] runs them over text already in
//! memory. [`RegistryCompiler`] is the thin loader that reads the headers.
//!
//! # Example
//!
//! ```rust,ignore
//! use registry_compiler::compiler::RegistryCompiler;
//! use registry_compiler::config::RegistryConfig;
//!
//! let compiler = RegistryCompiler::new(RegistryConfig::default());
//! let registries = compiler.load(Path::new("."))?;
//! println!("{} sensors", registries.sensors.len());
//! ```

pub mod extract;
pub mod resolve;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::debug;

use crate::config::RegistryConfig;
use crate::registry::{
    Application, ArrayDecl, Registries, Registry, RegistryEntry, RegistryKind, Sensor,
    StringMacro, Unit,
};

pub use extract::{
    EntrySource, IndexedBlock, MacroInvocationSource, RawBlock, StructArraySource,
    X_SENSOR_PARAMS,
};
pub use resolve::{parse_enum_constants, Resolver};

/// Errors that can occur while compiling registry headers.
#[derive(Debug, Error)]
pub enum CompilerError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Registry block {block} not found in {path}")]
    MissingBlock { path: PathBuf, block: String },
}

/// Result type for compiler operations.
pub type CompilerResult<T> = Result<T, CompilerError>;

/// How one registry is declared inside its header.
#[derive(Debug, Clone)]
pub struct RegistryLayout {
    pub kind: RegistryKind,
    /// Name of the struct-literal array (`SENSOR_LIBRARY`, ...)
    pub array_name: String,
    /// Element type used when the array declaration itself is absent
    pub element_type: String,
    /// String macros supplied when the header does not define them
    pub default_macros: Vec<(String, String)>,
    /// Invocation form tried before the struct array, if any
    pub invocation: Option<MacroInvocationSource>,
}

impl RegistryLayout {
    pub fn sensors() -> Self {
        Self {
            kind: RegistryKind::Sensor,
            array_name: "SENSOR_LIBRARY".to_string(),
            element_type: "SensorInfo".to_string(),
            default_macros: vec![("PSTR_NONE".to_string(), "NONE".to_string())],
            invocation: Some(MacroInvocationSource::x_sensor()),
        }
    }

    pub fn applications() -> Self {
        Self {
            kind: RegistryKind::Application,
            array_name: "APPLICATION_PRESETS".to_string(),
            element_type: "ApplicationPreset".to_string(),
            default_macros: vec![("PSTR_APP_NONE".to_string(), "NONE".to_string())],
            invocation: None,
        }
    }

    pub fn units() -> Self {
        Self {
            kind: RegistryKind::Unit,
            array_name: "UNITS_REGISTRY".to_string(),
            element_type: "UnitsInfo".to_string(),
            default_macros: Vec::new(),
            invocation: None,
        }
    }
}

/// Compile one registry from header text.
///
/// `origin` only labels errors; nothing is read from disk.
pub fn parse_registry<E: RegistryEntry>(
    text: &str,
    layout: &RegistryLayout,
    enums: &BTreeMap<String, i64>,
    origin: &Path,
) -> CompilerResult<Registry<E>> {
    let mut macros = extract::extract_string_macros(text);
    for (name, value) in &layout.default_macros {
        macros.entry(name.clone()).or_insert_with(|| StringMacro {
            value: value.clone(),
            definition: None,
        });
    }

    let element_type = extract::find_struct_array(text, &layout.array_name)
        .map_or_else(|| layout.element_type.clone(), |a| a.element_type.to_string());

    let blocks = layout
        .invocation
        .as_ref()
        .and_then(|source| source.extract(text))
        .or_else(|| StructArraySource::new(layout.array_name.as_str()).extract(text))
        .ok_or_else(|| CompilerError::MissingBlock {
            path: origin.to_path_buf(),
            block: layout.array_name.clone(),
        })?;

    let resolver = Resolver::new(&macros, enums);
    let entries: Vec<E> = extract::assign_indices(blocks)
        .iter()
        .map(|block| E::from_record(resolver.resolve_block(block)))
        .collect();

    debug!(
        registry = %layout.kind,
        entries = entries.len(),
        macros = macros.len(),
        "parsed registry"
    );

    Ok(Registry::new(
        entries,
        macros,
        ArrayDecl {
            element_type,
            array_name: layout.array_name.clone(),
        },
    ))
}

/// Loads and compiles the three registry headers of a project.
pub struct RegistryCompiler {
    config: RegistryConfig,
}

impl RegistryCompiler {
    /// Create a new compiler with the given header locations.
    pub fn new(config: RegistryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Compile all three registries under `project_dir`.
    pub fn load(&self, project_dir: &Path) -> CompilerResult<Registries> {
        let enums = self.load_enum_constants(project_dir);
        Ok(Registries {
            sensors: self.load_sensors(project_dir, &enums)?,
            applications: self.load_applications(project_dir, &enums)?,
            units: self.load_units(project_dir, &enums)?,
        })
    }

    pub fn load_sensors(
        &self,
        project_dir: &Path,
        enums: &BTreeMap<String, i64>,
    ) -> CompilerResult<Registry<Sensor>> {
        let path = self.config.sensor_path(project_dir);
        let text = read_header(&path)?;
        let text = extract::inline_local_includes(&text, &path, &self.config.include_subdir);
        parse_registry(&text, &RegistryLayout::sensors(), enums, &path)
    }

    pub fn load_applications(
        &self,
        project_dir: &Path,
        enums: &BTreeMap<String, i64>,
    ) -> CompilerResult<Registry<Application>> {
        let path = self.config.application_path(project_dir);
        let text = read_header(&path)?;
        parse_registry(&text, &RegistryLayout::applications(), enums, &path)
    }

    pub fn load_units(
        &self,
        project_dir: &Path,
        enums: &BTreeMap<String, i64>,
    ) -> CompilerResult<Registry<Unit>> {
        let path = self.config.unit_path(project_dir);
        let text = read_header(&path)?;
        parse_registry(&text, &RegistryLayout::units(), enums, &path)
    }

    /// Enum constants from the generated header; empty when it does not exist yet.
    pub fn load_enum_constants(&self, project_dir: &Path) -> BTreeMap<String, i64> {
        let path = self.config.enum_path(project_dir);
        match std::fs::read_to_string(&path) {
            Ok(text) => parse_enum_constants(&text),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "no enum constants");
                BTreeMap::new()
            }
        }
    }
}

fn read_header(path: &Path) -> CompilerResult<String> {
    std::fs::read_to_string(path).map_err(|source| CompilerError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{EntrySyntax, FieldValue};

    const UNITS: &str = r#"
static const char PSTR_CELSIUS[] PROGMEM = "CELSIUS";
static const char PSTR_C[] PROGMEM = "C";

static const PROGMEM UnitsInfo UNITS_REGISTRY[] = {
    // Index 0: CELSIUS
    {
        .name = PSTR_CELSIUS,
        .alias = PSTR_C,
        .symbol = PSTR_C,
        .measurementType = MEASURE_TEMPERATURE,
        .conversionFactor = 1.0,
        .conversionOffset = 0.0,
        .nameHash = 0x82DD,
        .aliasHash = 0xB5E8
    },
};
"#;

    #[test]
    fn test_parse_units() {
        let units: Registry<Unit> = parse_registry(
            UNITS,
            &RegistryLayout::units(),
            &BTreeMap::new(),
            Path::new("units_registry.h"),
        )
        .unwrap();

        assert_eq!(units.len(), 1);
        assert_eq!(units.array.element_type, "UnitsInfo");
        let celsius = units.get(0).unwrap();
        assert_eq!(celsius.name(), Some("CELSIUS"));
        assert_eq!(celsius.alias.as_deref(), Some("C"));
        assert_eq!(celsius.name_hash, Some(0x82DD));
        assert_eq!(celsius.alias_hash, Some(0xB5E8));
        assert!(celsius.is_implemented());
        assert_eq!(
            celsius.record.field("conversionFactor"),
            Some(&FieldValue::Float(1.0))
        );
    }

    #[test]
    fn test_parse_is_idempotent() {
        let parse = || -> Registry<Unit> {
            parse_registry(
                UNITS,
                &RegistryLayout::units(),
                &BTreeMap::new(),
                Path::new("units_registry.h"),
            )
            .unwrap()
        };
        assert_eq!(parse(), parse());
    }

    #[test]
    fn test_missing_block_is_fatal() {
        let err = parse_registry::<Unit>(
            "static const char PSTR_C[] PROGMEM = \"C\";",
            &RegistryLayout::units(),
            &BTreeMap::new(),
            Path::new("units_registry.h"),
        )
        .unwrap_err();
        assert!(matches!(err, CompilerError::MissingBlock { ref block, .. } if block == "UNITS_REGISTRY"));
    }

    #[test]
    fn test_default_macros_and_placeholders() {
        let text = r#"
static const PROGMEM ApplicationPreset APPLICATION_PRESETS[] = {
    // Index 0: NONE
    { .name = PSTR_APP_NONE, .label = nullptr, .nameHash = 0x2F75 },
};
"#;
        let apps: Registry<Application> = parse_registry(
            text,
            &RegistryLayout::applications(),
            &BTreeMap::new(),
            Path::new("application_presets.h"),
        )
        .unwrap();
        let none = apps.get(0).unwrap();
        assert_eq!(none.name(), Some("NONE"));
        assert!(!none.is_implemented());
        assert!(apps.macros["PSTR_APP_NONE"].definition.is_none());
    }

    #[test]
    fn test_sensor_invocations_take_precedence() {
        let text = r#"
static const char PSTR_NONE_LABEL[] PROGMEM = "None";
static const char PSTR_CAN_IMPORT[] PROGMEM = "CAN_IMPORT";
static const char PSTR_CAN_IMPORT_LABEL[] PROGMEM = "CAN Import";

#define NONE_SENSORS \
    X_SENSOR(PSTR_NONE, nullptr, nullptr, nullptr, nullptr, MEASURE_TEMPERATURE, CAL_NONE, nullptr, 0, 0.0, 0.0, 0x2F75, PIN_ANALOG)
#define CAN_SENSORS \
    X_SENSOR(PSTR_CAN_IMPORT, PSTR_CAN_IMPORT_LABEL, nullptr, readCANSensor, nullptr, \
             MEASURE_TEMPERATURE, CAL_CAN_IMPORT, &default_can_cal, \
             100, -273.0, 1000.0, 0x2251, PIN_ANALOG)

static const PROGMEM SensorInfo SENSOR_LIBRARY[] = {
    NONE_SENSORS
    CAN_SENSORS
};
"#;
        let sensors: Registry<Sensor> = parse_registry(
            text,
            &RegistryLayout::sensors(),
            &BTreeMap::new(),
            Path::new("sensor_library.h"),
        )
        .unwrap();

        assert_eq!(sensors.len(), 2);
        let none = sensors.get(0).unwrap();
        assert_eq!(none.name(), Some("NONE"));
        assert!(!none.is_implemented());

        let can = sensors.get(1).unwrap();
        assert_eq!(can.name(), Some("CAN_IMPORT"));
        assert_eq!(can.record.syntax, EntrySyntax::MacroInvocation);
        assert_eq!(can.min_value, Some(-273.0));
        assert_eq!(can.min_read_interval, Some(100));
        assert_eq!(can.record.used_macros, vec!["PSTR_CAN_IMPORT", "PSTR_CAN_IMPORT_LABEL"]);
        assert_eq!(sensors.array.element_type, "SensorInfo");
    }

    #[test]
    fn test_misspelled_label_macro_is_a_placeholder() {
        let text = r#"
static const char PSTR_MAX6675_LABEL[] PROGMEM = "K-Type Thermocouple";

#define THERMOCOUPLE_SENSORS \
    X_SENSOR(PSTR_MAX6675, PSTR_MAX6675_LABLE, nullptr, readMAX6675, nullptr, \
             MEASURE_TEMPERATURE, CAL_NONE, nullptr, \
             250, 0.0, 1024.0, 0x2A23, PIN_DIGITAL)

static const PROGMEM SensorInfo SENSOR_LIBRARY[] = {
    THERMOCOUPLE_SENSORS
};
"#;
        let sensors: Registry<Sensor> = parse_registry(
            text,
            &RegistryLayout::sensors(),
            &BTreeMap::new(),
            Path::new("sensor_library.h"),
        )
        .unwrap();

        let max = sensors.get(0).unwrap();
        assert_eq!(max.name(), Some("MAX6675"));
        assert!(!max.is_implemented());
        assert_eq!(max.label, None);
    }
}
