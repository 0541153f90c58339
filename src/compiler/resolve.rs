//! Record Resolver
//!
//! Turns extracted field text into typed [`FieldValue`]s. Resolution never
//! fails: anything the resolver does not recognise is kept as raw text.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use super::extract::{concat_string_literals, strip_comments, IndexedBlock};
use crate::registry::{EntryRecord, FieldValue, StringMacro};

static ENUM_CONSTANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-Za-z_]\w*)\s*=\s*(\d+)\b").expect("valid enum pattern"));

/// Parse `NAME = <decimal>` constants from a generated enum header.
pub fn parse_enum_constants(text: &str) -> BTreeMap<String, i64> {
    let code = strip_comments(text);
    ENUM_CONSTANT_RE
        .captures_iter(&code)
        .filter_map(|caps| Some((caps[1].to_string(), caps[2].parse().ok()?)))
        .collect()
}

/// Field resolver over one registry's macros and the shared enum constants.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'a> {
    macros: &'a BTreeMap<String, StringMacro>,
    enums: &'a BTreeMap<String, i64>,
}

impl<'a> Resolver<'a> {
    pub fn new(macros: &'a BTreeMap<String, StringMacro>, enums: &'a BTreeMap<String, i64>) -> Self {
        Self { macros, enums }
    }

    /// Resolve one field's literal text.
    pub fn resolve_value(&self, text: &str) -> FieldValue {
        let text = text.trim();

        if let Some(m) = self.macros.get(text) {
            return FieldValue::Str(m.value.clone());
        }
        if let Some(&value) = self.enums.get(text) {
            return FieldValue::Int(value);
        }

        match text {
            "nullptr" | "NULL" => return FieldValue::Null,
            "true" => return FieldValue::Bool(true),
            "false" => return FieldValue::Bool(false),
            _ => {}
        }

        if let Some(value) = parse_number(text) {
            return value;
        }
        if let Some(value) = concat_string_literals(text) {
            return FieldValue::Str(value);
        }

        FieldValue::Raw(text.to_string())
    }

    /// Resolve every field of an indexed block into an entry record.
    pub fn resolve_block(&self, indexed: &IndexedBlock) -> EntryRecord {
        let mut fields = BTreeMap::new();
        let mut used_macros: Vec<String> = Vec::new();

        for (name, text) in &indexed.block.fields {
            let text = text.trim();
            if self.macros.contains_key(text) && !used_macros.iter().any(|m| m == text) {
                used_macros.push(text.to_string());
            }
            let value = self.resolve_value(text);
            if value.is_unresolved_macro() {
                warn!(index = indexed.index, field = %name, symbol = text, "undefined string macro kept as raw text");
            }
            fields.insert(name.clone(), value);
        }

        // Placeholders carry a null label (or a null name when there is no
        // label); an undefined string macro counts as missing too
        let implemented = fields
            .get("label")
            .or_else(|| fields.get("name"))
            .is_some_and(|value| !value.is_null() && !value.is_unresolved_macro());

        EntryRecord {
            index: indexed.index,
            fields,
            used_macros,
            raw_block: indexed.block.raw.clone(),
            syntax: indexed.block.syntax,
            implemented,
        }
    }
}

/// Hex, integer and float literals with the usual C suffixes.
fn parse_number(text: &str) -> Option<FieldValue> {
    let is_int_suffix = |c: char| matches!(c, 'u' | 'U' | 'l' | 'L');

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        return i64::from_str_radix(hex.trim_end_matches(is_int_suffix), 16)
            .ok()
            .map(FieldValue::Int);
    }

    let first = text.chars().next()?;
    if !(first.is_ascii_digit() || matches!(first, '-' | '+' | '.')) {
        return None;
    }

    let as_float = |t: &str| {
        t.trim_end_matches(['f', 'F'])
            .parse::<f64>()
            .ok()
            .map(FieldValue::Float)
    };

    if text.contains('.') {
        return as_float(text);
    }
    if let Ok(value) = text.trim_end_matches(is_int_suffix).parse::<i64>() {
        return Some(FieldValue::Int(value));
    }
    if text.contains(['e', 'E']) {
        return as_float(text);
    }
    None
}
