//! Static config block emission and in-place patching.

use std::fs;
use std::io::Write;
use std::ops::Range;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::info;

use super::{io_error, GenerationContext, GeneratorError, GeneratorResult};
use crate::config::GeneratorConfig;
use crate::document::InputAssignment;

/// Start and end lines delimiting the generated block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockMarkers {
    pub start: String,
    pub end: String,
}

impl Default for BlockMarkers {
    fn default() -> Self {
        Self::from(&GeneratorConfig::default())
    }
}

impl From<&GeneratorConfig> for BlockMarkers {
    fn from(config: &GeneratorConfig) -> Self {
        Self {
            start: config.start_marker.clone(),
            end: config.end_marker.clone(),
        }
    }
}

/// Render the static config block, markers included, ending in a newline.
pub fn generate_config_block(
    inputs: &[InputAssignment],
    ctx: &GenerationContext,
    markers: &BlockMarkers,
) -> String {
    let mut out = String::new();
    out.push_str(&markers.start);
    out.push('\n');
    out.push_str("// ============================================================\n");
    out.push_str("// Static input configuration\n");
    out.push_str(&format!(
        "// Generated by regc v{} for {}\n",
        ctx.tool_version, ctx.platform
    ));
    out.push_str(&format!("// Generated at {}\n", ctx.timestamp_rfc3339()));
    out.push_str("// Do not edit by hand; re-run `regc generate` instead.\n");
    out.push_str("// ============================================================\n\n");
    out.push_str(&format!("#define NUM_CONFIGURED_INPUTS {}\n", inputs.len()));

    for (i, input) in inputs.iter().enumerate() {
        out.push('\n');
        out.push_str(&format!(
            "// Input {}: {} ({})\n",
            i, input.application, input.sensor
        ));
        out.push_str(&format!("#define INPUT_{}_PIN {}\n", i, input.pin.trim()));
        out.push_str(&format!(
            "#define INPUT_{}_APPLICATION {}\n",
            i, input.application_index
        ));
        out.push_str(&format!("#define INPUT_{}_SENSOR {}\n", i, input.sensor_index));
    }

    out.push('\n');
    out.push_str(&markers.end);
    out.push('\n');
    out
}

/// Where a generated block sits in a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockLocation {
    /// From a line starting with the start marker through the first end
    /// marker after it (and its newline)
    Found(Range<usize>),
    /// A start marker at this offset with no end marker after it
    Unterminated(usize),
    Absent,
}

fn find_bytes(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() {
        return Some(0);
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Locate an existing block. Works on bytes so text outside the block is
/// never decoded.
pub fn find_block(text: &[u8], markers: &BlockMarkers) -> BlockLocation {
    let start_marker = markers.start.as_bytes();
    let end_marker = markers.end.as_bytes();

    let mut offset = 0;
    let mut start = None;
    for line in text.split_inclusive(|&b| b == b'\n') {
        if line.starts_with(start_marker) {
            start = Some(offset);
            break;
        }
        offset += line.len();
    }
    let Some(start) = start else {
        return BlockLocation::Absent;
    };

    let search_from = start + start_marker.len();
    let Some(found) = find_bytes(&text[search_from..], end_marker) else {
        return BlockLocation::Unterminated(start);
    };
    let mut end = search_from + found + end_marker.len();
    if text[end..].starts_with(b"\r\n") {
        end += 2;
    } else if text[end..].starts_with(b"\n") {
        end += 1;
    }
    BlockLocation::Found(start..end)
}

/// A start marker without a matching end marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnterminatedBlock {
    /// 1-based line of the start marker
    pub line: usize,
}

/// Replace the existing block or append a new one. Returns the new content
/// and whether a block was replaced.
pub fn splice_block(
    text: &[u8],
    block: &str,
    markers: &BlockMarkers,
) -> Result<(Vec<u8>, bool), UnterminatedBlock> {
    match find_block(text, markers) {
        BlockLocation::Found(range) => {
            let mut out = Vec::with_capacity(text.len() + block.len());
            out.extend_from_slice(&text[..range.start]);
            out.extend_from_slice(block.as_bytes());
            out.extend_from_slice(&text[range.end..]);
            Ok((out, true))
        }
        BlockLocation::Unterminated(start) => Err(UnterminatedBlock {
            line: text[..start].iter().filter(|&&b| b == b'\n').count() + 1,
        }),
        BlockLocation::Absent => {
            let mut out = text.to_vec();
            if !out.is_empty() && !out.ends_with(b"\n") {
                out.push(b'\n');
            }
            if !out.is_empty() {
                out.push(b'\n');
            }
            out.extend_from_slice(block.as_bytes());
            Ok((out, false))
        }
    }
}

/// What a patch did to the target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchOutcome {
    pub backup: PathBuf,
    /// `false` when the block was appended
    pub replaced: bool,
}

/// `<target><suffix>`, e.g. `config.h.bak`.
pub fn backup_path(target: &Path, suffix: &str) -> PathBuf {
    let mut name = target.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Patch `block` into `target`, leaving a byte-identical backup first.
///
/// The new content goes to a temporary file in the target's directory that
/// takes over the target's permissions and is then renamed over the target.
pub fn patch_config_file(
    target: &Path,
    block: &str,
    markers: &BlockMarkers,
    backup_suffix: &str,
) -> GeneratorResult<PatchOutcome> {
    if !target.is_file() {
        return Err(GeneratorError::TargetMissing(target.to_path_buf()));
    }

    let original = fs::read(target).map_err(io_error(target))?;
    let (patched, replaced) =
        splice_block(&original, block, markers).map_err(|e| GeneratorError::UnterminatedBlock {
            path: target.to_path_buf(),
            start_marker: markers.start.clone(),
            end_marker: markers.end.clone(),
            line: e.line,
        })?;
    let permissions = fs::metadata(target).map_err(io_error(target))?.permissions();

    let backup = backup_path(target, backup_suffix);
    fs::write(&backup, &original).map_err(io_error(&backup))?;

    let dir = match target.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let mut tmp = NamedTempFile::new_in(dir).map_err(io_error(dir))?;
    tmp.write_all(&patched).map_err(io_error(tmp.path()))?;
    fs::set_permissions(tmp.path(), permissions).map_err(io_error(tmp.path()))?;
    tmp.persist(target).map_err(|e| GeneratorError::Persist {
        path: target.to_path_buf(),
        source: e.error,
    })?;

    info!(
        path = %target.display(),
        backup = %backup.display(),
        replaced,
        "patched static config block"
    );
    Ok(PatchOutcome { backup, replaced })
}
