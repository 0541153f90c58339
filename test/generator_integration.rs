//! Static Configuration Generator Integration Tests
//!
//! Runs the full generate path against a scratch copy of the fixture project.

mod common;

use std::fs;

use chrono::DateTime;
use registry_compiler::codegen::{CalibrationArtifact, GenerationContext, Generator};
use registry_compiler::compiler::RegistryCompiler;
use registry_compiler::config::{GeneratorConfig, RegistryConfig};
use registry_compiler::document::{ConfigDocument, DocumentError};
use registry_compiler::validate::{check_config_block, validate_assignments, ValidationError};
use registry_compiler::GeneratorError;

fn ctx() -> GenerationContext {
    GenerationContext::new(
        "0.1.0",
        "megaatmega2560",
        DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
    )
}

fn document() -> ConfigDocument {
    ConfigDocument::load(&common::fixtures_dir().join("static_config.json")).unwrap()
}

#[test]
fn test_generate_all_artifacts() {
    let project = common::scratch_project();
    let registries = RegistryCompiler::new(RegistryConfig::default())
        .load(project.path())
        .unwrap();
    let doc = document();
    assert!(validate_assignments(&doc.inputs, &registries).is_valid());

    let config_path = project.path().join("src/config.h");
    let original = fs::read(&config_path).unwrap();

    let generator = Generator::new(GeneratorConfig::default());
    let report = generator
        .generate(project.path(), &registries, &doc.inputs, &ctx(), true)
        .unwrap();

    // Backup is byte-identical to the original
    assert!(report.patch.replaced);
    assert_eq!(fs::read(&report.patch.backup).unwrap(), original);

    let patched = fs::read_to_string(&config_path).unwrap();
    assert!(patched.starts_with("#pragma once\n\n// Board configuration\n"));
    assert!(patched.ends_with("#endif // USE_STATIC_CONFIG\n\n#define ENABLE_ALARMS 1\n"));
    assert!(patched.contains("#define NUM_CONFIGURED_INPUTS 4\n"));
    assert!(patched.contains("// Input 2: OIL_PRESSURE (VDO_5BAR)\n"));
    assert!(patched.contains("#define INPUT_3_PIN I2C\n#define INPUT_3_APPLICATION 6\n#define INPUT_3_SENSOR 4\n"));
    assert_eq!(patched.matches("#ifdef USE_STATIC_CONFIG").count(), 1);

    // The patched block passes the structural check
    let check = check_config_block(&patched, &registries, &generator.markers());
    assert!(check.is_clean(), "{:?}", check.errors);

    let calibrations = project
        .path()
        .join("src/lib/generated/static_calibrations.h");
    assert_eq!(report.calibration, CalibrationArtifact::Written(calibrations.clone()));
    let text = fs::read_to_string(&calibrations).unwrap();
    assert!(text.contains("#define INPUT_1_CUSTOM_CALIBRATION\n"));
    assert!(text.contains("static const PROGMEM ThermistorSteinhartCalibration input_1_custom_cal = {\n"));
    assert!(text.contains("    .bias_resistor = 2200.0,\n"));
    // DEFAULT calibrations are not emitted
    assert!(!text.contains("INPUT_2_CUSTOM_CALIBRATION"));

    assert_eq!(report.thin_libraries.len(), 2);
    let sensors = fs::read_to_string(&report.thin_libraries[0]).unwrap();
    assert!(sensors.contains("static const char PSTR_NONE[] PROGMEM = \"NONE\";"));
    assert!(sensors.contains("X_SENSOR(PSTR_BME280"));
    assert!(sensors.contains("static const char PSTR_MAX6675_DESC[] PROGMEM = \"SPI thermocouple amplifier, \""));
    assert!(sensors.contains("#undef X_SENSOR"));

    let apps = fs::read_to_string(&report.thin_libraries[1]).unwrap();
    assert!(apps.contains("// Index 5: OIL_PRESSURE"));
    assert!(!apps.contains("PSTR_EGT"));
    assert!(!apps.contains("PSTR_COOLANT_TEMP"));
}

#[test]
fn test_regenerate_is_stable() {
    let project = common::scratch_project();
    let registries = RegistryCompiler::new(RegistryConfig::default())
        .load(project.path())
        .unwrap();
    let doc = document();
    let generator = Generator::new(GeneratorConfig::default());

    generator
        .generate(project.path(), &registries, &doc.inputs, &ctx(), false)
        .unwrap();
    let first = fs::read_to_string(project.path().join("src/config.h")).unwrap();

    generator
        .generate(project.path(), &registries, &doc.inputs, &ctx(), false)
        .unwrap();
    let second = fs::read_to_string(project.path().join("src/config.h")).unwrap();
    assert_eq!(first, second);

    // The second backup holds the first run's output
    let backup = fs::read_to_string(project.path().join("src/config.h.bak")).unwrap();
    assert_eq!(backup, first);
}

#[test]
fn test_stale_calibrations_removed() {
    let project = common::scratch_project();
    let registries = RegistryCompiler::new(RegistryConfig::default())
        .load(project.path())
        .unwrap();
    let generator = Generator::new(GeneratorConfig::default());
    let mut doc = document();

    generator
        .generate(project.path(), &registries, &doc.inputs, &ctx(), false)
        .unwrap();

    for input in &mut doc.inputs {
        input.calibration = None;
    }
    let report = generator
        .generate(project.path(), &registries, &doc.inputs, &ctx(), false)
        .unwrap();
    assert!(matches!(report.calibration, CalibrationArtifact::Removed(_)));
    assert!(report.thin_libraries.is_empty());
}

#[test]
fn test_bad_calibration_leaves_project_untouched() {
    let project = common::scratch_project();
    let registries = RegistryCompiler::new(RegistryConfig::default())
        .load(project.path())
        .unwrap();
    let mut doc = document();
    if let Some(cal) = doc.inputs[1].calibration.as_mut() {
        cal.calibration_type = "THERMISTOR_LOOKUP".into();
    }

    let config_path = project.path().join("src/config.h");
    let before = fs::read(&config_path).unwrap();
    let err = Generator::new(GeneratorConfig::default())
        .generate(project.path(), &registries, &doc.inputs, &ctx(), false)
        .unwrap_err();

    assert!(matches!(err, GeneratorError::UnknownCalibrationType { input: 1, .. }));
    assert_eq!(fs::read(&config_path).unwrap(), before);
    assert!(!project.path().join("src/config.h.bak").exists());
}

#[test]
fn test_missing_config_header() {
    let project = common::scratch_project();
    let registries = RegistryCompiler::new(RegistryConfig::default())
        .load(project.path())
        .unwrap();
    fs::remove_file(project.path().join("src/config.h")).unwrap();

    let err = Generator::new(GeneratorConfig::default())
        .generate(project.path(), &registries, &document().inputs, &ctx(), false)
        .unwrap_err();
    assert!(matches!(err, GeneratorError::TargetMissing(_)));
}

#[test]
fn test_pin_gate_flags_fixture() {
    let registries = RegistryCompiler::new(RegistryConfig::default())
        .load(&common::fixture_project())
        .unwrap();
    let doc = ConfigDocument::load(&common::fixtures_dir().join("bad_pins.json")).unwrap();

    let report = validate_assignments(&doc.inputs, &registries);
    let errors: Vec<_> = report.errors().cloned().collect();
    assert_eq!(errors.len(), 2);
    assert!(matches!(errors[0], ValidationError::PinTypeMismatch { input: 0, .. }));
    assert!(matches!(errors[1], ValidationError::I2cPinRequired { input: 1, .. }));
}

#[test]
fn test_document_round_trip_preserves_metadata() {
    let dir = tempfile::tempdir().unwrap();
    let doc = document();
    let path = dir.path().join("saved.json");
    doc.save(&path).unwrap();

    let reloaded = ConfigDocument::load(&path).unwrap();
    assert_eq!(reloaded, doc);
    assert_eq!(reloaded.metadata.timestamp, 1_700_000_000);
    assert!(reloaded.inputs[0].calibration.is_none());
    assert!(!fs::read_to_string(&path).unwrap().contains("\"calibration\": null"));
}

#[test]
fn test_document_mode_gate() {
    let text = fs::read_to_string(common::fixtures_dir().join("static_config.json")).unwrap();
    let err = ConfigDocument::from_json(&text.replace("\"static\"", "\"dynamic\"")).unwrap_err();
    assert!(matches!(err, DocumentError::UnsupportedMode(_)));

    let err = ConfigDocument::from_json(&text.replace("\"schemaVersion\": 1", "\"schemaVersion\": 2"))
        .unwrap_err();
    assert!(matches!(err, DocumentError::UnsupportedSchema(_)));
}
