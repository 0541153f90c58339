//! Registry Compiler Integration Tests
//!
//! Compiles the fixture firmware headers from disk and runs the validation
//! passes over them.

mod common;

use std::fs;

use registry_compiler::compiler::RegistryCompiler;
use registry_compiler::config::{RegcConfig, RegistryConfig};
use registry_compiler::hash::djb2_16;
use registry_compiler::registry::{EntrySyntax, FieldValue, PinType, RegistryEntry};
use registry_compiler::validate::{validate_registries, ValidationError, ValidationStatus};
use registry_compiler::CompilerError;

fn compiler() -> RegistryCompiler {
    RegistryCompiler::new(RegistryConfig::default())
}

#[test]
fn test_fixture_sensors_compile_in_order() {
    let registries = compiler().load(&common::fixture_project()).unwrap();
    let sensors = &registries.sensors;

    let names: Vec<_> = sensors.iter().map(|s| s.name().unwrap().to_string()).collect();
    assert_eq!(names, ["NONE", "MAX6675", "VDO_120C", "VDO_5BAR", "BME280"]);
    assert_eq!(sensors.array.element_type, "SensorInfo");

    let none = sensors.get(0).unwrap();
    assert!(!none.is_implemented());

    let max = sensors.get(1).unwrap();
    assert!(max.is_implemented());
    assert_eq!(max.record.syntax, EntrySyntax::MacroInvocation);
    assert_eq!(max.label.as_deref(), Some("K-Type Thermocouple (MAX6675)"));
    assert_eq!(
        max.description.as_deref(),
        Some("SPI thermocouple amplifier, 0-1024C, 0.25C resolution")
    );
    assert_eq!(max.pin_requirement, Some(PinType::Digital));
    assert_eq!(max.min_read_interval, Some(250));
    assert_eq!(max.name_hash, Some(djb2_16("MAX6675")));

    let vdo = sensors.get(2).unwrap();
    assert_eq!(vdo.min_value, Some(-40.0));
    assert_eq!(
        vdo.calibration_type,
        Some(FieldValue::Raw("CAL_THERMISTOR_STEINHART".into()))
    );

    assert_eq!(sensors.get(4).unwrap().pin_requirement, Some(PinType::I2c));
}

#[test]
fn test_commented_include_is_not_followed() {
    let project = common::scratch_project();
    let experimental = project
        .path()
        .join("src/lib/sensor_library/sensors/experimental.h");
    fs::write(
        &experimental,
        "#define EXPERIMENTAL_SENSORS \\\n    X_SENSOR(PSTR_NONE, nullptr, nullptr, nullptr, nullptr, MEASURE_RPM, CAL_NONE, nullptr, 0, 0.0, 0.0, 0x2F75, PIN_DIGITAL)\n",
    )
    .unwrap();

    let registries = compiler().load(project.path()).unwrap();
    assert_eq!(registries.sensors.len(), 5);
}

#[test]
fn test_fixture_applications_resolve_enum_references() {
    let registries = compiler().load(&common::fixture_project()).unwrap();
    let apps = &registries.applications;

    assert_eq!(apps.len(), 7);
    assert_eq!(apps.array.element_type, "ApplicationPreset");

    let none = apps.get(0).unwrap();
    assert_eq!(none.name.as_deref(), Some("NONE"));
    assert!(!none.is_implemented());

    let cht = apps.get(1).unwrap();
    assert_eq!(cht.label.as_deref(), Some("Cylinder Head Temperature"));
    assert_eq!(cht.default_sensor, Some(FieldValue::Int(1)));
    assert_eq!(cht.record.syntax, EntrySyntax::StructLiteral);

    let pressure = apps.get(5).unwrap();
    assert_eq!(pressure.default_sensor, Some(FieldValue::Int(3)));
    assert_eq!(
        pressure.expected_measurement_type,
        Some(FieldValue::Raw("MEASURE_PRESSURE".into()))
    );
}

#[test]
fn test_fixture_units() {
    let registries = compiler().load(&common::fixture_project()).unwrap();
    let units = &registries.units;

    assert_eq!(units.len(), 5);
    let celsius = units.get(0).unwrap();
    assert_eq!(celsius.name.as_deref(), Some("CELSIUS"));
    assert_eq!(celsius.alias.as_deref(), Some("C"));
    assert_eq!(celsius.alias_hash, Some(djb2_16("C")));
}

#[test]
fn test_fixture_validates_clean() {
    let registries = compiler().load(&common::fixture_project()).unwrap();
    let report = validate_registries(&registries);
    assert!(
        report.is_valid(),
        "Errors: {:?}",
        report.errors().collect::<Vec<_>>()
    );
    assert_eq!(report.status(), ValidationStatus::Passed);
}

#[test]
fn test_parsing_is_idempotent() {
    let first = compiler().load(&common::fixture_project()).unwrap();
    let second = compiler().load(&common::fixture_project()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_edited_hash_is_reported() {
    let project = common::scratch_project();
    let path = project.path().join("src/lib/application_presets.h");
    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, text.replace(".nameHash = 0xE1E5", ".nameHash = 0xD984")).unwrap();

    let registries = compiler().load(project.path()).unwrap();
    let report = validate_registries(&registries);
    let errors: Vec<_> = report.errors().cloned().collect();

    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::HashMismatch { entry, found: 0xD984, .. } if entry == "APP[2]:EGT"
    )));
    assert!(errors.iter().any(|e| matches!(
        e,
        ValidationError::HashCollision { first, second, .. }
            if first == "APP[1]:CHT" && second == "APP[2]:EGT"
    )));
    assert_eq!(report.status(), ValidationStatus::Failed);
}

#[test]
fn test_missing_registry_header_is_fatal() {
    let project = common::scratch_project();
    fs::remove_file(project.path().join("src/lib/units_registry.h")).unwrap();

    let err = compiler().load(project.path()).unwrap_err();
    assert!(matches!(err, CompilerError::Io { .. }));
}

#[test]
fn test_missing_array_is_fatal() {
    let project = common::scratch_project();
    let path = project.path().join("src/lib/units_registry.h");
    let text = fs::read_to_string(&path).unwrap();
    fs::write(&path, text.replace("UNITS_REGISTRY[]", "UNIT_TABLE[]")).unwrap();

    let err = compiler().load(project.path()).unwrap_err();
    assert!(matches!(err, CompilerError::MissingBlock { ref block, .. } if block == "UNITS_REGISTRY"));
}

#[test]
fn test_config_relocates_headers() {
    let project = common::scratch_project();
    let lib = project.path().join("src/lib");
    let firmware = project.path().join("firmware");
    fs::rename(&lib, &firmware).unwrap();
    fs::write(
        project.path().join("regc.toml"),
        "[registry]\nheader_dir = \"firmware\"\n",
    )
    .unwrap();

    let config = RegcConfig::find_and_load(project.path()).unwrap();
    let registries = RegistryCompiler::new(config.registry)
        .load(project.path())
        .unwrap();
    assert_eq!(registries.sensors.len(), 5);
    assert_eq!(
        registries.applications.get(6).unwrap().default_sensor,
        Some(FieldValue::Int(4))
    );
}
