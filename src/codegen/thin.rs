//! Thin registry headers: only the entries a static configuration uses.
//!
//! Entries are re-emitted from their verbatim source text, together with
//! the string macros they reference, so the output matches what a developer
//! wrote rather than a re-serialization of the parsed fields.

use std::collections::BTreeSet;

use super::{header_guard, GenerationContext};
use crate::compiler::X_SENSOR_PARAMS;
use crate::registry::{EntrySyntax, Registry, RegistryEntry};

/// Render a thin header for the entries at `referenced` (plus the index-0
/// placeholder when the registry declares one), in declaration order.
pub fn generate_thin_library<E: RegistryEntry>(
    registry: &Registry<E>,
    referenced: &BTreeSet<u32>,
    ctx: &GenerationContext,
    file_name: &str,
) -> String {
    let selected: Vec<&E> = registry
        .iter()
        .filter(|e| e.index() == 0 || referenced.contains(&e.index()))
        .collect();

    let mut used_macros: Vec<&str> = Vec::new();
    for entry in &selected {
        for name in &entry.record().used_macros {
            if !used_macros.contains(&name.as_str()) {
                used_macros.push(name);
            }
        }
    }

    let guard = header_guard(file_name);
    let mut out = String::new();
    out.push_str(&format!(
        "// Thin {} registry for USE_STATIC_CONFIG builds\n",
        registry.kind().label().to_lowercase()
    ));
    out.push_str(&format!(
        "// Generated by regc v{} for {} at {}\n",
        ctx.tool_version,
        ctx.platform,
        ctx.timestamp_rfc3339()
    ));
    out.push_str(&format!(
        "// {} of {} entries kept; registry indices are unchanged in the config block.\n\n",
        selected.len(),
        registry.len()
    ));
    out.push_str(&format!("#ifndef {}\n#define {}\n\n", guard, guard));

    out.push_str("// ===== STRING LITERALS =====\n");
    for name in &used_macros {
        let Some(m) = registry.macros.get(*name) else {
            continue;
        };
        match &m.definition {
            Some(definition) => out.push_str(definition),
            None => out.push_str(&format!(
                "static const char {}[] PROGMEM = \"{}\";",
                name,
                escape_c_string(&m.value)
            )),
        }
        out.push('\n');
    }

    let invocations = selected
        .iter()
        .any(|e| e.record().syntax == EntrySyntax::MacroInvocation);
    out.push('\n');
    if invocations {
        out.push_str(&x_sensor_expansion());
        out.push('\n');
    }

    out.push_str(&format!(
        "static const PROGMEM {} {}[] = {{\n",
        registry.array.element_type, registry.array.array_name
    ));
    for entry in &selected {
        let raw = entry.record().raw_block.trim();
        out.push_str("    ");
        out.push_str(raw);
        // X_SENSOR supplies its own trailing comma
        if entry.record().syntax == EntrySyntax::StructLiteral {
            out.push(',');
        }
        out.push('\n');
    }
    out.push_str("};\n");

    if invocations {
        out.push_str("\n#undef X_SENSOR\n");
    }
    out.push_str(&format!("\n#endif // {}\n", guard));
    out
}

/// `#define X_SENSOR(...)` expanding each invocation into a struct literal.
fn x_sensor_expansion() -> String {
    let params = X_SENSOR_PARAMS.join(", ");
    format!("#define X_SENSOR({}) \\\n    {{ {} }},\n", params, params)
}

fn escape_c_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c => out.push(c),
        }
    }
    out
}
