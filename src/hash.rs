//! DJB2-16 Name Hash
//!
//! The firmware resolves sensors, applications and units by a 16-bit,
//! case-insensitive DJB2 hash of their name. Every hash this crate computes
//! or verifies must agree bit-for-bit with the firmware's `djb2_hash()`.
//!
//! ```text
//! hash = 5381
//! for c in upper(name): hash = (hash << 5) + hash + c
//! result = hash & 0xFFFF
//! ```

/// DJB2 seed value.
pub const DJB2_SEED: u32 = 5381;

/// Compute the 16-bit case-insensitive DJB2 hash of `name`.
///
/// The empty string hashes to 0, matching the firmware's null-string guard.
///
/// ```
/// use registry_compiler::hash::djb2_16;
///
/// assert_eq!(djb2_16(""), 0);
/// assert_eq!(djb2_16("Max6675"), djb2_16("MAX6675"));
/// ```
pub fn djb2_16(name: &str) -> u16 {
    if name.is_empty() {
        return 0;
    }

    let mut hash = DJB2_SEED;
    for c in name.to_uppercase().chars() {
        hash = (hash << 5).wrapping_add(hash).wrapping_add(c as u32);
    }

    (hash & 0xFFFF) as u16
}

/// Render a hash the way the registry headers spell it (`0x2F75`).
pub fn format_hash(hash: u16) -> String {
    format!("0x{:04X}", hash)
}

/// Parse a hash literal (`0x2F75` or decimal) into a 16-bit value.
pub fn parse_hash(literal: &str) -> Option<u16> {
    let literal = literal.trim();
    if let Some(hex) = literal
        .strip_prefix("0x")
        .or_else(|| literal.strip_prefix("0X"))
    {
        u16::from_str_radix(hex, 16).ok()
    } else {
        literal.parse().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_string() {
        assert_eq!(djb2_16(""), 0);
    }

    #[test]
    fn test_known_registry_hashes() {
        // Values taken from the shipped registry headers
        assert_eq!(djb2_16("NONE"), 0x2F75);
        assert_eq!(djb2_16("CHT"), 0xD984);
        assert_eq!(djb2_16("CELSIUS"), 0x82DD);
        assert_eq!(djb2_16("C"), 0xB5E8);
        assert_eq!(djb2_16("F"), 0xB5EB);
        assert_eq!(djb2_16("BAR"), 0xD45A);
        assert_eq!(djb2_16("CAN_IMPORT"), 0x2251);
    }

    #[test]
    fn test_case_insensitive() {
        assert_eq!(djb2_16("celsius"), djb2_16("CELSIUS"));
        assert_eq!(djb2_16("Max6675"), djb2_16("MAX6675"));
        assert_eq!(djb2_16("oil_temp"), djb2_16("OIL_TEMP"));
    }

    #[test]
    fn test_single_char() {
        // 5381 * 33 + 'A'
        let expected = ((5381u32 * 33 + 'A' as u32) & 0xFFFF) as u16;
        assert_eq!(djb2_16("a"), expected);
    }

    #[test]
    fn test_long_name_wraps() {
        // Long names overflow 32 bits; only the low 16 bits matter
        let name = "A_VERY_LONG_SENSOR_NAME_THAT_OVERFLOWS_THE_ACCUMULATOR";
        let mut exact: u128 = 5381;
        for c in name.chars() {
            exact = (exact * 33 + c as u128) & 0xFFFF_FFFF;
        }
        assert_eq!(djb2_16(name), (exact & 0xFFFF) as u16);
    }

    #[test]
    fn test_format_and_parse() {
        assert_eq!(format_hash(0x2F75), "0x2F75");
        assert_eq!(format_hash(0x00AB), "0x00AB");
        assert_eq!(parse_hash("0x2F75"), Some(0x2F75));
        assert_eq!(parse_hash("0XD984"), Some(0xD984));
        assert_eq!(parse_hash("42"), Some(42));
        assert_eq!(parse_hash("0x1FFFF"), None);
        assert_eq!(parse_hash("PSTR_X"), None);
    }
}
