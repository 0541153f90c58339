//! Checks an existing static config block against the registries.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{PassReport, ValidationError};
use crate::codegen::config_block::{find_block, BlockLocation, BlockMarkers};
use crate::registry::Registries;

static INPUT_COUNT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*#define\s+NUM_CONFIGURED_INPUTS\s+(\d+)\b")
        .expect("valid input count pattern")
});

static INPUT_DEFINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^\s*#define\s+INPUT_(\d+)_(PIN|APPLICATION|SENSOR)\s+(\S+)")
        .expect("valid input define pattern")
});

/// `INPUT_<i>_*` values of one block, keyed by input and field.
fn input_defines(block: &str) -> BTreeMap<(u32, String), String> {
    INPUT_DEFINE_RE
        .captures_iter(block)
        .filter_map(|caps| {
            let input = caps[1].parse().ok()?;
            Some(((input, caps[2].to_string()), caps[3].to_string()))
        })
        .collect()
}

/// Validate the static config block in `text` (the content of `config.h`).
pub fn check_config_block(text: &str, registries: &Registries, markers: &BlockMarkers) -> PassReport {
    let mut report = PassReport::new("Checking config.h", "config.h is valid");

    let block = match find_block(text.as_bytes(), markers) {
        BlockLocation::Found(range) => &text[range],
        BlockLocation::Unterminated(start) => {
            report.errors.push(ValidationError::UnterminatedConfigBlock {
                start_marker: markers.start.clone(),
                end_marker: markers.end.clone(),
                line: text[..start].lines().count() + 1,
            });
            return report;
        }
        BlockLocation::Absent => {
            report.errors.push(ValidationError::MissingConfigBlock {
                start_marker: markers.start.clone(),
            });
            return report;
        }
    };

    let Some(count) = INPUT_COUNT_RE
        .captures(block)
        .and_then(|caps| caps[1].parse::<u32>().ok())
    else {
        report.errors.push(ValidationError::MissingInputCount);
        return report;
    };

    let defines = input_defines(block);
    let mut pins: BTreeMap<String, u32> = BTreeMap::new();

    for input in 0..count {
        let mut field = |name: &str| -> Option<String> {
            let value = defines.get(&(input, name.to_string())).cloned();
            if value.is_none() {
                report.errors.push(ValidationError::MissingInputDefine {
                    input,
                    define: name.to_string(),
                });
            }
            value
        };

        let pin = field("PIN");
        let application = field("APPLICATION");
        let sensor = field("SENSOR");

        if let Some(pin) = pin {
            match pins.get(&pin) {
                Some(&first) => report.errors.push(ValidationError::DuplicatePin {
                    pin,
                    first,
                    second: input,
                }),
                None => {
                    pins.insert(pin, input);
                }
            }
        }

        let mut index_of = |name: &str, value: Option<String>| -> Option<u32> {
            let value = value?;
            match value.parse::<u32>() {
                Ok(index) => Some(index),
                Err(_) => {
                    report.errors.push(ValidationError::MalformedInputDefine {
                        input,
                        define: name.to_string(),
                        value,
                    });
                    None
                }
            }
        };

        let application = index_of("APPLICATION", application);
        let sensor = index_of("SENSOR", sensor);

        if let Some(index) = application {
            if registries.applications.get(index).is_none() {
                report
                    .errors
                    .push(ValidationError::UnknownApplication { input, index });
            }
        }

        if let Some(index) = sensor {
            if registries.sensors.get(index).is_none() {
                report.errors.push(ValidationError::UnknownSensor { input, index });
            }
        }
    }

    report
}
