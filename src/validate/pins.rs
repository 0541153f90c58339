//! Pin/sensor compatibility checks.

use std::fmt;

use super::{PassReport, ValidationError};
use crate::document::InputAssignment;
use crate::registry::{PinType, Registry, RegistryEntry, Sensor};

/// Marker pin string for I2C-bus sensors.
pub const I2C_PIN: &str = "I2C";

/// A parsed pin designator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinDesignator {
    I2c,
    Analog(u32),
    Digital(u32),
}

impl PinDesignator {
    pub fn pin_type(&self) -> PinType {
        match self {
            PinDesignator::I2c => PinType::I2c,
            PinDesignator::Analog(_) => PinType::Analog,
            PinDesignator::Digital(_) => PinType::Digital,
        }
    }
}

impl fmt::Display for PinDesignator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinDesignator::I2c => f.write_str(I2C_PIN),
            PinDesignator::Analog(n) => write!(f, "A{}", n),
            PinDesignator::Digital(n) => write!(f, "{}", n),
        }
    }
}

/// Parse `I2C`, `A<n>` or `<n>` (case-insensitive).
pub fn parse_pin(pin: &str) -> Option<PinDesignator> {
    let pin = pin.trim().to_ascii_uppercase();
    if pin == I2C_PIN {
        return Some(PinDesignator::I2c);
    }
    match pin.strip_prefix('A') {
        Some(number) => number.parse().ok().map(PinDesignator::Analog),
        None => pin.parse().ok().map(PinDesignator::Digital),
    }
}

/// Pins must suit the pin class their sensor declares.
pub fn check_pin_compatibility(inputs: &[InputAssignment], sensors: &Registry<Sensor>) -> PassReport {
    let mut report = PassReport::new(
        "Checking pin compatibility",
        "All pins match their sensor requirements",
    );

    for input in inputs {
        let Some(sensor) = sensors.get(input.sensor_index) else {
            continue;
        };
        let Some(required) = sensor.pin_requirement else {
            continue;
        };
        let name = sensor.name().unwrap_or(&input.sensor).to_string();
        let is_i2c_pin = input.pin.trim().eq_ignore_ascii_case(I2C_PIN);

        if required == PinType::I2c {
            if !is_i2c_pin {
                report.errors.push(ValidationError::I2cPinRequired {
                    input: input.idx,
                    sensor: name,
                    pin: input.pin.clone(),
                });
            }
            continue;
        }

        if is_i2c_pin {
            report.errors.push(ValidationError::I2cPinReserved {
                input: input.idx,
                sensor: name,
            });
            continue;
        }

        let Some(actual) = parse_pin(&input.pin).map(|p| p.pin_type()) else {
            continue;
        };
        if actual != required {
            report.errors.push(ValidationError::PinTypeMismatch {
                input: input.idx,
                sensor: name,
                pin: input.pin.clone(),
                required,
                actual,
            });
        }
    }

    report
}
