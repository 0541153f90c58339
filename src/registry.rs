//! Registry Data Model
//!
//! Resolved, immutable snapshots of the three firmware registries:
//! sensors, application presets, and display units. Entries keep every
//! resolved field by name plus the verbatim source text they came from, so
//! diagnostics can report any field and thin libraries can re-emit the
//! original definition instead of re-serializing it.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::hash::parse_hash;

/// Which registry an entry belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RegistryKind {
    Sensor,
    Application,
    Unit,
}

impl RegistryKind {
    /// Diagnostic tag used in findings (`SENSOR[3]`, `APP[1]`, `UNIT[0]`).
    pub fn tag(&self) -> &'static str {
        match self {
            RegistryKind::Sensor => "SENSOR",
            RegistryKind::Application => "APP",
            RegistryKind::Unit => "UNIT",
        }
    }

    /// Human-readable registry name.
    pub fn label(&self) -> &'static str {
        match self {
            RegistryKind::Sensor => "Sensor",
            RegistryKind::Application => "Application",
            RegistryKind::Unit => "Unit",
        }
    }
}

impl fmt::Display for RegistryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// A resolved field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// `nullptr` / `NULL`
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    /// Value of a string macro the field referenced
    Str(String),
    /// Unresolved text, kept verbatim (trimmed)
    Raw(String),
}

impl FieldValue {
    pub fn is_null(&self) -> bool {
        matches!(self, FieldValue::Null)
    }

    /// A `PSTR_` symbol with no string macro definition.
    pub fn is_unresolved_macro(&self) -> bool {
        matches!(self, FieldValue::Raw(raw) if raw.starts_with("PSTR_"))
    }

    /// String view of resolved strings and raw text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Str(s) | FieldValue::Raw(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Interpret the value as a registry index.
    pub fn as_index(&self) -> Option<u32> {
        self.as_int().and_then(|v| u32::try_from(v).ok())
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FieldValue::Int(v) => Some(*v as f64),
            FieldValue::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("nullptr"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(v) => write!(f, "{}", v),
            FieldValue::Float(v) => write!(f, "{:?}", v),
            FieldValue::Str(s) | FieldValue::Raw(s) => f.write_str(s),
        }
    }
}

/// Pin class a sensor requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PinType {
    Analog,
    Digital,
    I2c,
}

impl PinType {
    /// Parse a `PIN_ANALOG` / `PIN_DIGITAL` / `PIN_I2C` symbol.
    pub fn from_symbol(symbol: &str) -> Option<Self> {
        let bare = symbol.trim();
        let bare = bare.strip_prefix("PIN_").unwrap_or(bare);
        match bare.to_ascii_lowercase().as_str() {
            "analog" => Some(PinType::Analog),
            "digital" => Some(PinType::Digital),
            "i2c" => Some(PinType::I2c),
            _ => None,
        }
    }
}

impl fmt::Display for PinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PinType::Analog => f.write_str("analog"),
            PinType::Digital => f.write_str("digital"),
            PinType::I2c => f.write_str("I2C"),
        }
    }
}

/// Which header syntax an entry was declared with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntrySyntax {
    /// `{ .field = value, ... }` element of a bracketed array
    StructLiteral,
    /// `X_SENSOR(arg, ...)` invocation
    MacroInvocation,
}

/// Resolved fields of one entry, independent of registry type.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRecord {
    pub index: u32,
    pub fields: BTreeMap<String, FieldValue>,
    /// String macros referenced by this entry, in field order
    pub used_macros: Vec<String>,
    /// Verbatim source span, including a leading index annotation
    pub raw_block: String,
    pub syntax: EntrySyntax,
    pub implemented: bool,
}

impl EntryRecord {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    fn string_field(&self, name: &str) -> Option<String> {
        self.field(name)
            .filter(|v| !v.is_unresolved_macro())
            .and_then(FieldValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    }

    fn hash_field(&self, name: &str) -> Option<u16> {
        match self.field(name)? {
            FieldValue::Int(v) => u16::try_from(*v).ok(),
            FieldValue::Raw(text) => parse_hash(text),
            _ => None,
        }
    }
}

/// Behaviour shared by every registry entry type.
pub trait RegistryEntry: Sized {
    const KIND: RegistryKind;

    /// Build the typed entry from a resolved record.
    fn from_record(record: EntryRecord) -> Self;

    fn record(&self) -> &EntryRecord;

    fn name(&self) -> Option<&str>;

    /// Hash literal stored in the source, if it parsed as an integer.
    fn name_hash(&self) -> Option<u16>;

    fn index(&self) -> u32 {
        self.record().index
    }

    fn is_implemented(&self) -> bool {
        self.record().implemented
    }

    /// `SENSOR[3]:MAX6675` style label for diagnostics.
    fn describe(&self) -> String {
        match self.name() {
            Some(name) => format!("{}[{}]:{}", Self::KIND.tag(), self.index(), name),
            None => format!("{}[{}]", Self::KIND.tag(), self.index()),
        }
    }
}

/// A hardware sensor definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub record: EntryRecord,
    pub name: Option<String>,
    pub name_hash: Option<u16>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub measurement_type: Option<FieldValue>,
    pub calibration_type: Option<FieldValue>,
    pub pin_requirement: Option<PinType>,
    pub min_value: Option<f64>,
    pub max_value: Option<f64>,
    pub min_read_interval: Option<i64>,
}

impl RegistryEntry for Sensor {
    const KIND: RegistryKind = RegistryKind::Sensor;

    fn from_record(record: EntryRecord) -> Self {
        // Unknown PSTR_ name symbols fall back to the bare identifier
        let name = match record.field("name") {
            Some(FieldValue::Raw(sym)) => Some(sym.strip_prefix("PSTR_").unwrap_or(sym).to_string()),
            _ => record.string_field("name"),
        };

        Self {
            name,
            name_hash: record.hash_field("nameHash"),
            label: record.string_field("label"),
            description: record.string_field("description"),
            measurement_type: record.field("measurementType").cloned(),
            calibration_type: record.field("calibrationType").cloned(),
            pin_requirement: record
                .field("pinTypeRequirement")
                .and_then(FieldValue::as_str)
                .and_then(PinType::from_symbol),
            min_value: record.field("minValue").and_then(FieldValue::as_f64),
            max_value: record.field("maxValue").and_then(FieldValue::as_f64),
            min_read_interval: record.field("minReadInterval").and_then(FieldValue::as_int),
            record,
        }
    }

    fn record(&self) -> &EntryRecord {
        &self.record
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn name_hash(&self) -> Option<u16> {
        self.name_hash
    }
}

/// An application preset (CHT, OIL_PRESSURE, ...).
#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub record: EntryRecord,
    pub name: Option<String>,
    pub name_hash: Option<u16>,
    pub label: Option<String>,
    pub expected_measurement_type: Option<FieldValue>,
    /// Index into the sensor registry, or an unresolved symbol
    pub default_sensor: Option<FieldValue>,
}

impl RegistryEntry for Application {
    const KIND: RegistryKind = RegistryKind::Application;

    fn from_record(record: EntryRecord) -> Self {
        Self {
            name: record.string_field("name"),
            name_hash: record.hash_field("nameHash"),
            label: record.string_field("label"),
            expected_measurement_type: record.field("expectedMeasurementType").cloned(),
            default_sensor: record.field("defaultSensor").cloned(),
            record,
        }
    }

    fn record(&self) -> &EntryRecord {
        &self.record
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn name_hash(&self) -> Option<u16> {
        self.name_hash
    }
}

/// A display unit with a name and a short alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Unit {
    pub record: EntryRecord,
    pub name: Option<String>,
    pub name_hash: Option<u16>,
    pub alias: Option<String>,
    pub alias_hash: Option<u16>,
    pub symbol: Option<String>,
    pub measurement_type: Option<FieldValue>,
}

impl RegistryEntry for Unit {
    const KIND: RegistryKind = RegistryKind::Unit;

    fn from_record(record: EntryRecord) -> Self {
        Self {
            name: record.string_field("name"),
            name_hash: record.hash_field("nameHash"),
            alias: record.string_field("alias"),
            alias_hash: record.hash_field("aliasHash"),
            symbol: record.string_field("symbol"),
            measurement_type: record.field("measurementType").cloned(),
            record,
        }
    }

    fn record(&self) -> &EntryRecord {
        &self.record
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn name_hash(&self) -> Option<u16> {
        self.name_hash
    }
}

/// A string macro definition (`static const char PSTR_X[] PROGMEM = "...";`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StringMacro {
    pub value: String,
    /// Verbatim definition statement, `None` for built-in defaults
    pub definition: Option<String>,
}

/// Array declaration an entry collection was (or will be) emitted into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArrayDecl {
    pub element_type: String,
    pub array_name: String,
}

/// An ordered, immutable registry of typed entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Registry<E> {
    entries: Vec<E>,
    pub macros: BTreeMap<String, StringMacro>,
    pub array: ArrayDecl,
}

impl<E: RegistryEntry> Registry<E> {
    pub fn new(entries: Vec<E>, macros: BTreeMap<String, StringMacro>, array: ArrayDecl) -> Self {
        Self {
            entries,
            macros,
            array,
        }
    }

    pub fn kind(&self) -> RegistryKind {
        E::KIND
    }

    pub fn entries(&self) -> &[E] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, E> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Look up an entry by its registry index (first declaration wins).
    pub fn get(&self, index: u32) -> Option<&E> {
        self.entries.iter().find(|e| e.index() == index)
    }

    pub fn indices(&self) -> BTreeSet<u32> {
        self.entries.iter().map(RegistryEntry::index).collect()
    }

    pub fn implemented(&self) -> impl Iterator<Item = &E> {
        self.entries.iter().filter(|e| e.is_implemented())
    }
}

impl<'a, E> IntoIterator for &'a Registry<E> {
    type Item = &'a E;
    type IntoIter = std::slice::Iter<'a, E>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// The full capability catalog for one compiler run.
#[derive(Debug, Clone, PartialEq)]
pub struct Registries {
    pub sensors: Registry<Sensor>,
    pub applications: Registry<Application>,
    pub units: Registry<Unit>,
}
