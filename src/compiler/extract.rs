//! Header Text Extractor
//!
//! Pulls the pieces the registry compiler cares about out of raw header text:
//! string macros, struct-literal array elements, and `X_SENSOR(...)`
//! invocations. Nothing here understands C beyond comments, string literals
//! and bracket nesting; the dialect is narrow on purpose.

use std::collections::{BTreeMap, HashSet};
use std::ops::Range;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::registry::{EntrySyntax, StringMacro};

static STRING_MACRO_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"static\s+const\s+char\s+(PSTR_\w+)\s*\[\s*\]\s*PROGMEM\s*=\s*((?:"(?:[^"\\]|\\.)*"\s*)+);"#,
    )
    .expect("valid string macro pattern")
});

static STRING_LITERAL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""((?:[^"\\]|\\.)*)""#).expect("valid literal pattern"));

static INCLUDE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?m)^\s*#\s*include\s+"([^"]+)""#).expect("valid include pattern"));

static INDEX_ANNOTATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?://|/\*)\s*Index\s+(\d+)\s*:").expect("valid annotation pattern"));

static DESIGNATED_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^\.(\w+)\s*=\s*(.*)$").expect("valid field pattern"));

static LINE_CONTINUATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\\r?\n\s*").expect("valid continuation pattern"));

static MACRO_REFERENCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^PSTR_\w+$").expect("valid macro reference pattern"));

/// Argument order of the `X_SENSOR` invocation form.
pub const X_SENSOR_PARAMS: [&str; 13] = [
    "name",
    "label",
    "description",
    "readFunction",
    "initFunction",
    "measurementType",
    "calibrationType",
    "defaultCalibration",
    "minReadInterval",
    "minValue",
    "maxValue",
    "nameHash",
    "pinTypeRequirement",
];

/// One entry's worth of unresolved source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Index taken from an `Index N:` annotation, if one preceded the entry
    pub annotated_index: Option<u32>,
    /// Verbatim source span
    pub raw: String,
    /// `(field name, literal text)` in source order
    pub fields: Vec<(String, String)>,
    pub syntax: EntrySyntax,
}

/// A raw block paired with its final registry index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedBlock {
    pub index: u32,
    pub block: RawBlock,
}

/// A strategy for finding registry entries in header text.
pub trait EntrySource {
    /// Extract the entries in declaration order.
    ///
    /// Returns `None` when the collection is not declared in `text` at all.
    fn extract(&self, text: &str) -> Option<Vec<RawBlock>>;
}

/// `static const PROGMEM Type NAME[] = { {...}, {...} };`
#[derive(Debug, Clone)]
pub struct StructArraySource {
    pub array_name: String,
}

impl StructArraySource {
    pub fn new(array_name: impl Into<String>) -> Self {
        Self {
            array_name: array_name.into(),
        }
    }
}

impl EntrySource for StructArraySource {
    fn extract(&self, text: &str) -> Option<Vec<RawBlock>> {
        let array = find_struct_array(text, &self.array_name)?;
        Some(struct_elements(array.body))
    }
}

/// Function-style macro invocations with a fixed argument list.
#[derive(Debug, Clone)]
pub struct MacroInvocationSource {
    macro_name: String,
    params: Vec<String>,
    pattern: Regex,
}

impl MacroInvocationSource {
    pub fn new(macro_name: &str, params: &[&str]) -> Self {
        let pattern = Regex::new(&format!(r"\b{}\s*\(", regex::escape(macro_name)))
            .expect("escaped macro name is a valid pattern");
        Self {
            macro_name: macro_name.to_string(),
            params: params.iter().map(|p| p.to_string()).collect(),
            pattern,
        }
    }

    /// The `X_SENSOR` form used by the modular sensor library.
    pub fn x_sensor() -> Self {
        Self::new("X_SENSOR", &X_SENSOR_PARAMS)
    }

    pub fn macro_name(&self) -> &str {
        &self.macro_name
    }

    pub fn params(&self) -> &[String] {
        &self.params
    }
}

impl EntrySource for MacroInvocationSource {
    fn extract(&self, text: &str) -> Option<Vec<RawBlock>> {
        let lex = classify(text);
        let mut blocks = Vec::new();

        for m in self.pattern.find_iter(text) {
            if lex[m.start()] != Lex::Code {
                continue;
            }
            let open = m.end() - 1;
            let Some(close) = matching_close(text, &lex, open, b'(', b')') else {
                debug!(macro_name = %self.macro_name, offset = open, "unterminated invocation");
                continue;
            };

            let args_text = LINE_CONTINUATION_RE.replace_all(&text[open + 1..close], " ");
            let args: Vec<&str> = split_top_level(&args_text)
                .into_iter()
                .map(str::trim)
                .collect();

            // Documentation examples use bare identifiers, real entries a string macro
            if args.len() != self.params.len() || !MACRO_REFERENCE_RE.is_match(args[0]) {
                continue;
            }

            blocks.push(RawBlock {
                annotated_index: None,
                raw: text[m.start()..=close].to_string(),
                fields: self
                    .params
                    .iter()
                    .cloned()
                    .zip(args.iter().map(|a| a.to_string()))
                    .collect(),
                syntax: EntrySyntax::MacroInvocation,
            });
        }

        if blocks.is_empty() {
            None
        } else {
            Some(blocks)
        }
    }
}

/// A located struct-literal array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructArray<'a> {
    pub element_type: &'a str,
    /// Text between the outer braces
    pub body: &'a str,
}

/// Find `static const PROGMEM <Type> <name>[] = { ... }` in `text`.
pub fn find_struct_array<'a>(text: &'a str, array_name: &str) -> Option<StructArray<'a>> {
    let pattern = Regex::new(&format!(
        r"static\s+const\s+(?:PROGMEM\s+)?(\w+)\s+{}\s*\[\s*\]\s*(?:PROGMEM\s*)?=\s*\{{",
        regex::escape(array_name)
    ))
    .expect("escaped array name is a valid pattern");

    let lex = classify(text);
    let found = pattern.captures_iter(text).find_map(|caps| {
        let whole = caps.get(0)?;
        if lex[whole.start()] != Lex::Code {
            return None;
        }
        let open = whole.end() - 1;
        let close = matching_close(text, &lex, open, b'{', b'}')?;
        Some(StructArray {
            element_type: caps.get(1)?.as_str(),
            body: &text[open + 1..close],
        })
    });
    found
}

/// Split a struct-array body into its top-level `{...}` elements.
fn struct_elements(body: &str) -> Vec<RawBlock> {
    let lex = classify(body);
    let bytes = body.as_bytes();
    let mut blocks = Vec::new();
    let mut pending: Option<(u32, usize)> = None;
    let mut i = 0;

    while i < bytes.len() {
        match lex[i] {
            Lex::LineComment | Lex::BlockComment => {
                let start = i;
                while i < bytes.len() && matches!(lex[i], Lex::LineComment | Lex::BlockComment) {
                    i += 1;
                }
                if let Some(caps) = INDEX_ANNOTATION_RE.captures(&body[start..i]) {
                    if let Ok(index) = caps[1].parse() {
                        pending = Some((index, start));
                    }
                }
                continue;
            }
            Lex::Code if bytes[i] == b'{' => {
                let Some(close) = matching_close(body, &lex, i, b'{', b'}') else {
                    break;
                };
                let raw_start = pending.map_or(i, |(_, start)| start);
                blocks.push(RawBlock {
                    annotated_index: pending.map(|(index, _)| index),
                    raw: body[raw_start..=close].to_string(),
                    fields: designated_fields(&body[i + 1..close]),
                    syntax: EntrySyntax::StructLiteral,
                });
                pending = None;
                i = close + 1;
                continue;
            }
            _ => {}
        }
        i += 1;
    }

    blocks
}

/// Parse `.field = value, ...` pairs, in any order, ignoring comments.
fn designated_fields(inner: &str) -> Vec<(String, String)> {
    let code = strip_comments(inner);
    split_top_level(&code)
        .into_iter()
        .filter_map(|segment| {
            let caps = DESIGNATED_FIELD_RE.captures(segment.trim())?;
            Some((caps[1].to_string(), caps[2].trim().to_string()))
        })
        .collect()
}

/// Assign final indices: an explicit annotation wins, otherwise the
/// element's position among its siblings.
pub fn assign_indices(blocks: Vec<RawBlock>) -> Vec<IndexedBlock> {
    blocks
        .into_iter()
        .enumerate()
        .map(|(position, block)| IndexedBlock {
            index: block.annotated_index.unwrap_or(position as u32),
            block,
        })
        .collect()
}

/// Collect every `PSTR_*` string macro defined in `text`.
pub fn extract_string_macros(text: &str) -> BTreeMap<String, StringMacro> {
    let lex = classify(text);
    let mut macros = BTreeMap::new();

    for caps in STRING_MACRO_RE.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if lex[whole.start()] != Lex::Code {
            continue;
        }
        let value: String = STRING_LITERAL_RE
            .captures_iter(&caps[2])
            .map(|lit| decode_c_string(&lit[1]))
            .collect();
        macros.insert(
            caps[1].to_string(),
            StringMacro {
                value,
                definition: Some(whole.as_str().to_string()),
            },
        );
    }

    macros
}

/// Concatenate adjacent quoted literals (`"a" "b"`), or `None` if `text` is
/// not made only of string literals.
pub fn concat_string_literals(text: &str) -> Option<String> {
    let text = text.trim();
    if !text.starts_with('"') {
        return None;
    }
    let mut value = String::new();
    let mut rest = text;
    while !rest.is_empty() {
        let caps = STRING_LITERAL_RE.captures(rest)?;
        let whole = caps.get(0)?;
        if whole.start() != 0 {
            return None;
        }
        value.push_str(&decode_c_string(&caps[1]));
        rest = rest[whole.end()..].trim_start();
    }
    Some(value)
}

/// Decode C escape sequences inside a string literal body.
pub fn decode_c_string(literal: &str) -> String {
    let src = literal.as_bytes();
    let mut bytes = Vec::with_capacity(src.len());
    let mut i = 0;

    while i < src.len() {
        if src[i] != b'\\' || i + 1 >= src.len() {
            bytes.push(src[i]);
            i += 1;
            continue;
        }
        let escape = src[i + 1];
        i += 2;
        match escape {
            b'n' => bytes.push(b'\n'),
            b't' => bytes.push(b'\t'),
            b'r' => bytes.push(b'\r'),
            b'0' => bytes.push(0),
            b'\\' | b'"' | b'\'' | b'?' => bytes.push(escape),
            b'x' => {
                let start = i;
                while i < src.len() && i - start < 2 && src[i].is_ascii_hexdigit() {
                    i += 1;
                }
                match u8::from_str_radix(&literal[start..i], 16) {
                    Ok(byte) => bytes.push(byte),
                    Err(_) => bytes.extend_from_slice(b"\\x"),
                }
            }
            other => {
                bytes.push(b'\\');
                bytes.push(other);
            }
        }
    }

    String::from_utf8_lossy(&bytes).into_owned()
}

/// Append the contents of local includes that live under `subdir`.
///
/// Only one level is followed. Includes outside `subdir`, repeated includes
/// and unreadable files are skipped.
pub fn inline_local_includes(text: &str, header_path: &Path, subdir: &str) -> String {
    let header_dir = header_path.parent().unwrap_or_else(|| Path::new(""));
    let root = normalize_path(&header_dir.join(subdir.trim_end_matches('/')));
    let lex = classify(text);

    let mut visited = HashSet::new();
    visited.insert(normalize_path(header_path));

    let mut collected = text.to_string();
    for caps in INCLUDE_RE.captures_iter(text) {
        let (Some(whole), Some(target)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        if lex[whole.end() - 1] != Lex::Str {
            continue;
        }

        let path = normalize_path(&header_dir.join(target.as_str()));
        if !path.starts_with(&root) {
            continue;
        }
        if !visited.insert(path.clone()) {
            debug!(path = %path.display(), "skipping repeated include");
            continue;
        }

        match std::fs::read_to_string(&path) {
            Ok(content) => {
                collected.push('\n');
                collected.push_str(&content);
            }
            Err(e) => debug!(path = %path.display(), error = %e, "skipping unreadable include"),
        }
    }

    collected
}

/// Lexically normalize `.` and `..` components.
fn normalize_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Lexical class of one byte of header text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lex {
    Code,
    LineComment,
    BlockComment,
    Str,
    Char,
}

/// Classify every byte of `text` as code, comment or literal.
pub(crate) fn classify(text: &str) -> Vec<Lex> {
    let bytes = text.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut state = Lex::Code;
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        let next = bytes.get(i + 1).copied();
        match state {
            Lex::Code => match (b, next) {
                (b'/', Some(b'/')) => {
                    state = Lex::LineComment;
                    out.extend([Lex::LineComment; 2]);
                    i += 2;
                    continue;
                }
                (b'/', Some(b'*')) => {
                    state = Lex::BlockComment;
                    out.extend([Lex::BlockComment; 2]);
                    i += 2;
                    continue;
                }
                (b'"', _) => {
                    state = Lex::Str;
                    out.push(Lex::Str);
                }
                (b'\'', _) => {
                    state = Lex::Char;
                    out.push(Lex::Char);
                }
                _ => out.push(Lex::Code),
            },
            Lex::LineComment => {
                if b == b'\n' {
                    state = Lex::Code;
                    out.push(Lex::Code);
                } else {
                    out.push(Lex::LineComment);
                }
            }
            Lex::BlockComment => {
                if b == b'*' && next == Some(b'/') {
                    out.extend([Lex::BlockComment; 2]);
                    state = Lex::Code;
                    i += 2;
                    continue;
                }
                out.push(Lex::BlockComment);
            }
            Lex::Str | Lex::Char => {
                if b == b'\\' && next.is_some() {
                    out.extend([state; 2]);
                    i += 2;
                    continue;
                }
                out.push(state);
                let quote = if state == Lex::Str { b'"' } else { b'\'' };
                // Unterminated literals end at the line
                if b == quote || b == b'\n' {
                    state = Lex::Code;
                }
            }
        }
        i += 1;
    }

    out
}

/// Byte ranges of all comments in `text`.
pub(crate) fn comment_spans(text: &str) -> Vec<Range<usize>> {
    let lex = classify(text);
    let mut spans = Vec::new();
    let mut start = None;
    for (i, class) in lex.iter().enumerate() {
        let in_comment = matches!(class, Lex::LineComment | Lex::BlockComment);
        match (in_comment, start) {
            (true, None) => start = Some(i),
            (false, Some(s)) => {
                spans.push(s..i);
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        spans.push(s..lex.len());
    }
    spans
}

/// Position of the delimiter closing the one at `open`.
fn matching_close(text: &str, lex: &[Lex], open: usize, opener: u8, closer: u8) -> Option<usize> {
    let bytes = text.as_bytes();
    let mut depth = 0usize;
    for i in open..bytes.len() {
        if lex[i] != Lex::Code {
            continue;
        }
        if bytes[i] == opener {
            depth += 1;
        } else if bytes[i] == closer {
            depth -= 1;
            if depth == 0 {
                return Some(i);
            }
        }
    }
    None
}

/// Split on commas that are outside brackets, literals and comments.
pub(crate) fn split_top_level(text: &str) -> Vec<&str> {
    let lex = classify(text);
    let bytes = text.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, &b) in bytes.iter().enumerate() {
        if lex[i] != Lex::Code {
            continue;
        }
        match b {
            b'(' | b'{' | b'[' => depth += 1,
            b')' | b'}' | b']' => depth -= 1,
            b',' if depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }

    let tail = &text[start..];
    if !tail.trim().is_empty() {
        parts.push(tail);
    }
    parts
}

/// Remove comments, keeping string literals intact.
pub(crate) fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for span in comment_spans(text) {
        out.push_str(&text[last..span.start]);
        out.push(' ');
        last = span.end;
    }
    out.push_str(&text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_macros_concatenate() {
        let text = r#"
static const char PSTR_CHT[] PROGMEM = "CHT";
static const char PSTR_DEG[] PROGMEM = "Temp " "\xC2\xB0"
    "C";
// static const char PSTR_OLD[] PROGMEM = "gone";
"#;
        let macros = extract_string_macros(text);
        assert_eq!(macros["PSTR_CHT"].value, "CHT");
        assert_eq!(macros["PSTR_DEG"].value, "Temp °C");
        assert!(!macros.contains_key("PSTR_OLD"));
        assert!(macros["PSTR_CHT"]
            .definition
            .as_deref()
            .is_some_and(|d| d.starts_with("static const char PSTR_CHT")));
    }

    #[test]
    fn test_decode_escapes() {
        assert_eq!(decode_c_string(r"a\nb"), "a\nb");
        assert_eq!(decode_c_string(r#"say \"hi\""#), "say \"hi\"");
        assert_eq!(decode_c_string(r"\x41\x42"), "AB");
        assert_eq!(decode_c_string(r"back\\slash"), "back\\slash");
    }

    #[test]
    fn test_concat_string_literals() {
        assert_eq!(concat_string_literals(r#""ab" "cd""#), Some("abcd".into()));
        assert_eq!(concat_string_literals("PSTR_X"), None);
        assert_eq!(concat_string_literals(r#""ab" junk"#), None);
    }

    #[test]
    fn test_struct_array_annotations_and_fields() {
        let text = r#"
static const PROGMEM ApplicationPreset APPLICATION_PRESETS[] = {
    // Index 0: APP_NONE (placeholder)
    {
        .name = PSTR_APP_NONE,
        .label = nullptr,
        .nameHash = 0x2F75,  // djb2_hash("NONE"), reserved
    },

    // ===== TEMPERATURE =====
    // Index 5: CHT
    {
        .nameHash = 0xD984,
        .name = PSTR_CHT, /* primary key */
        .defaultMinValue = -1.0
    },
    {
        .name = PSTR_EGT,
    }
};
"#;
        let array = find_struct_array(text, "APPLICATION_PRESETS").unwrap();
        assert_eq!(array.element_type, "ApplicationPreset");

        let blocks = StructArraySource::new("APPLICATION_PRESETS")
            .extract(text)
            .unwrap();
        assert_eq!(blocks.len(), 3);
        assert_eq!(blocks[0].annotated_index, Some(0));
        assert!(blocks[0].raw.starts_with("// Index 0: APP_NONE"));
        assert_eq!(
            blocks[0].fields,
            vec![
                ("name".to_string(), "PSTR_APP_NONE".to_string()),
                ("label".to_string(), "nullptr".to_string()),
                ("nameHash".to_string(), "0x2F75".to_string()),
            ]
        );
        assert_eq!(blocks[1].annotated_index, Some(5));
        assert_eq!(blocks[1].fields[1], ("name".into(), "PSTR_CHT".into()));
        assert_eq!(blocks[1].fields[2], ("defaultMinValue".into(), "-1.0".into()));
        assert_eq!(blocks[2].annotated_index, None);

        let indexed = assign_indices(blocks);
        let indices: Vec<u32> = indexed.iter().map(|b| b.index).collect();
        assert_eq!(indices, vec![0, 5, 2]);
    }

    #[test]
    fn test_missing_array() {
        assert!(find_struct_array("int x = 1;", "UNITS_REGISTRY").is_none());
        assert!(StructArraySource::new("UNITS_REGISTRY")
            .extract("// static const PROGMEM UnitsInfo UNITS_REGISTRY[] = {};")
            .is_none());
    }

    #[test]
    fn test_macro_invocations() {
        let text = r#"
// X_SENSOR(name, label, description, readFunc, initFunc, measType, calType, defaultCal, minInterval, minVal, maxVal, hash, pinType)
#define X_SENSOR(name, label, desc, readFn, initFn, measType, calType, defCal, minInt, minVal, maxVal, hash, pinType) \
    { name, label, desc, readFn, initFn, measType, calType, defCal, minInt, minVal, maxVal, hash, pinType },

#define CAN_SENSORS \
    X_SENSOR(PSTR_CAN_IMPORT, PSTR_CAN_IMPORT_LABEL, PSTR_CAN_IMPORT_DESC, readCANSensor, nullptr, \
             MEASURE_TEMPERATURE, CAL_CAN_IMPORT, &default_can_cal, \
             100, -273.0, 1000.0, 0x2251, PIN_ANALOG)
"#;
        let blocks = MacroInvocationSource::x_sensor().extract(text).unwrap();
        assert_eq!(blocks.len(), 1);
        let block = &blocks[0];
        assert!(block.raw.starts_with("X_SENSOR(PSTR_CAN_IMPORT"));
        assert!(block.raw.ends_with("PIN_ANALOG)"));
        assert_eq!(block.fields.len(), 13);
        assert_eq!(block.fields[0], ("name".into(), "PSTR_CAN_IMPORT".into()));
        assert_eq!(block.fields[5], ("measurementType".into(), "MEASURE_TEMPERATURE".into()));
        assert_eq!(block.fields[7], ("defaultCalibration".into(), "&default_can_cal".into()));
        assert_eq!(block.fields[11], ("nameHash".into(), "0x2251".into()));
        assert_eq!(block.fields[12], ("pinTypeRequirement".into(), "PIN_ANALOG".into()));
    }

    #[test]
    fn test_macro_invocation_absent() {
        assert!(MacroInvocationSource::x_sensor()
            .extract("static const int x = 0;")
            .is_none());
    }

    #[test]
    fn test_split_top_level_respects_nesting() {
        let parts = split_top_level(r#"a, f(b, c), { d, e }, "x,y", g"#);
        let parts: Vec<&str> = parts.into_iter().map(str::trim).collect();
        assert_eq!(parts, vec!["a", "f(b, c)", "{ d, e }", "\"x,y\"", "g"]);
    }

    #[test]
    fn test_strip_comments_keeps_strings() {
        let code = strip_comments("a = \"// not a comment\", // comment\nb /* c */ = 1");
        assert!(code.contains("\"// not a comment\""));
        assert!(!code.contains("// comment"));
        assert!(!code.contains("/* c */"));
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path(Path::new("src/lib/./sensor_library/../hash.h")),
            PathBuf::from("src/lib/hash.h")
        );
    }
}
