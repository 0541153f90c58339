//! Static calibration table emission (`static_calibrations.h`).

use std::path::{Path, PathBuf};

use tracing::info;

use super::{header_guard, io_error, write_artifact, GenerationContext, GeneratorError, GeneratorResult};
use crate::document::{CustomCalibration, InputAssignment};

/// Firmware struct for one calibration type and how parameters map onto it.
#[derive(Debug, Clone, Copy)]
pub struct CalibrationLayout {
    pub struct_name: &'static str,
    /// `(firmware field, accepted parameter names)` in struct order
    pub fields: &'static [(&'static str, &'static [&'static str])],
}

const STEINHART: CalibrationLayout = CalibrationLayout {
    struct_name: "ThermistorSteinhartCalibration",
    fields: &[
        ("bias_resistor", &["biasResistor"]),
        ("steinhart_a", &["steinhartA"]),
        ("steinhart_b", &["steinhartB"]),
        ("steinhart_c", &["steinhartC"]),
    ],
};

const BETA: CalibrationLayout = CalibrationLayout {
    struct_name: "BetaCalibration",
    fields: &[
        ("bias_resistor", &["biasResistor"]),
        ("beta", &["beta"]),
        ("r0", &["r0"]),
        ("t0", &["t0"]),
    ],
};

const LINEAR: CalibrationLayout = CalibrationLayout {
    struct_name: "LinearCalibration",
    fields: &[
        ("voltage_min", &["voltageMin"]),
        ("voltage_max", &["voltageMax"]),
        ("output_min", &["pressureMin", "outputMin"]),
        ("output_max", &["pressureMax", "outputMax"]),
    ],
};

const POLYNOMIAL: CalibrationLayout = CalibrationLayout {
    struct_name: "PressurePolynomialCalibration",
    fields: &[
        ("bias_resistor", &["biasResistor"]),
        ("poly_a", &["polyA"]),
        ("poly_b", &["polyB"]),
        ("poly_c", &["polyC"]),
    ],
};

const VOLTAGE_DIVIDER: CalibrationLayout = CalibrationLayout {
    struct_name: "VoltageDividerCalibration",
    fields: &[
        ("r1", &["r1"]),
        ("r2", &["r2"]),
        ("correction", &["correction"]),
        ("offset", &["offset"]),
    ],
};

const RPM: CalibrationLayout = CalibrationLayout {
    struct_name: "RPMCalibration",
    fields: &[
        ("poles", &["poles"]),
        ("pulley_ratio", &["pulleyRatio"]),
        ("calibration_mult", &["calibrationMult"]),
        ("timeout_ms", &["timeoutMs"]),
        ("min_rpm", &["minRpm"]),
        ("max_rpm", &["maxRpm"]),
    ],
};

/// Look up the layout for a calibration type (`CAL_` prefix optional).
pub fn layout_for(calibration_type: &str) -> Option<CalibrationLayout> {
    let bare = calibration_type.trim();
    let bare = bare.strip_prefix("CAL_").unwrap_or(bare);
    match bare.to_ascii_uppercase().as_str() {
        "THERMISTOR_STEINHART" => Some(STEINHART),
        "THERMISTOR_BETA" => Some(BETA),
        "PRESSURE_LINEAR" | "LINEAR" => Some(LINEAR),
        "PRESSURE_POLYNOMIAL" => Some(POLYNOMIAL),
        "VOLTAGE_DIVIDER" => Some(VOLTAGE_DIVIDER),
        "RPM" => Some(RPM),
        _ => None,
    }
}

/// Render one `input_<i>_custom_cal` constant.
fn render_calibration(position: usize, input: &InputAssignment, cal: &CustomCalibration) -> GeneratorResult<String> {
    let layout = layout_for(&cal.calibration_type).ok_or_else(|| GeneratorError::UnknownCalibrationType {
        input: input.idx,
        calibration_type: cal.calibration_type.clone(),
    })?;

    let mut out = format!(
        "// Input {}: {} ({}) - {}\n#define INPUT_{}_CUSTOM_CALIBRATION\nstatic const PROGMEM {} input_{}_custom_cal = {{\n",
        position,
        input.application,
        input.sensor,
        cal.calibration_type,
        position,
        layout.struct_name,
        position
    );

    for (field, names) in layout.fields {
        let value = names
            .iter()
            .find_map(|name| cal.param(name))
            .ok_or_else(|| GeneratorError::MissingCalibrationParam {
                input: input.idx,
                calibration_type: cal.calibration_type.clone(),
                param: names[0].to_string(),
            })?;
        out.push_str(&format!("    .{} = {},\n", field, value));
    }

    out.push_str("};\n");
    Ok(out)
}

/// Render `static_calibrations.h`, or `None` when no input has a custom
/// calibration.
pub fn generate_calibration_file(
    inputs: &[InputAssignment],
    ctx: &GenerationContext,
) -> GeneratorResult<Option<String>> {
    let mut sections = Vec::new();
    for (position, input) in inputs.iter().enumerate() {
        if let Some(cal) = input.custom_calibration() {
            sections.push(render_calibration(position, input, cal)?);
        }
    }
    if sections.is_empty() {
        return Ok(None);
    }

    let guard = header_guard("static_calibrations.h");
    let mut out = String::new();
    out.push_str("// Custom input calibrations for USE_STATIC_CONFIG builds\n");
    out.push_str(&format!(
        "// Generated by regc v{} for {} at {}\n",
        ctx.tool_version,
        ctx.platform,
        ctx.timestamp_rfc3339()
    ));
    out.push_str("// Do not edit by hand.\n\n");
    out.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));
    out.push_str("#include \"../sensor_types.h\"\n");
    for section in sections {
        out.push('\n');
        out.push_str(&section);
    }
    out.push_str(&format!("\n#endif // {}\n", guard));
    Ok(Some(out))
}

/// What happened to the calibration artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CalibrationArtifact {
    Written(PathBuf),
    /// A stale file was deleted
    Removed(PathBuf),
    /// Nothing to write and nothing to delete
    NotNeeded,
}

/// Write the calibration file, or delete a stale one when `content` is `None`.
pub fn write_calibration_file(path: &Path, content: Option<&str>) -> GeneratorResult<CalibrationArtifact> {
    match content {
        Some(text) => {
            write_artifact(path, text)?;
            Ok(CalibrationArtifact::Written(path.to_path_buf()))
        }
        None if path.exists() => {
            std::fs::remove_file(path).map_err(io_error(path))?;
            info!(path = %path.display(), "removed calibration table (no custom calibrations)");
            Ok(CalibrationArtifact::Removed(path.to_path_buf()))
        }
        None => Ok(CalibrationArtifact::NotNeeded),
    }
}
