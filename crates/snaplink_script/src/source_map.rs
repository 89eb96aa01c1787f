//! Source map v3 decoding.
//!
//! Only what row translation needs is kept: for each generated line, the
//! mapped segments in column order. Unmapped (single-field) segments are
//! dropped while decoding.

use serde::Deserialize;

use crate::error::SourceMapError;

/// Raw JSON shape of a v3 map.
#[derive(Debug, Deserialize)]
struct RawSourceMap {
    version: u32,
    #[serde(default)]
    sources: Vec<Option<String>>,
    #[serde(default)]
    names: Vec<String>,
    mappings: String,
}

/// One mapped segment of a generated line. All positions are 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mapping {
    /// Column in the generated line.
    pub generated_column: u32,
    /// Index into [`SourceMap::sources`].
    pub source: u32,
    /// Line in the original source.
    pub original_line: u32,
    /// Column in the original source.
    pub original_column: u32,
    /// Index into [`SourceMap::names`], if the segment names a symbol.
    pub name: Option<u32>,
}

/// A decoded source map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceMap {
    sources: Vec<String>,
    names: Vec<String>,
    lines: Vec<Vec<Mapping>>,
}

impl SourceMap {
    /// Parses a v3 source map from its JSON text.
    pub fn parse(json: &str) -> Result<Self, SourceMapError> {
        let raw: RawSourceMap =
            serde_json::from_str(json).map_err(|e| SourceMapError::Json(e.to_string()))?;
        if raw.version != 3 {
            return Err(SourceMapError::UnsupportedVersion(raw.version));
        }
        Ok(Self {
            sources: raw
                .sources
                .into_iter()
                .map(Option::unwrap_or_default)
                .collect(),
            names: raw.names,
            lines: decode_mappings(&raw.mappings)?,
        })
    }

    /// Source file names, `""` for null entries.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Symbol names referenced by segments.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of generated lines covered by `mappings`.
    pub fn line_count(&self) -> usize {
        self.lines.len()
    }

    /// Mapped segments of `generated_line`, in column order.
    pub fn mappings_on_line(&self, generated_line: usize) -> &[Mapping] {
        self.lines.get(generated_line).map_or(&[], Vec::as_slice)
    }

    /// Original line of the first segment on `generated_line`, if it has one.
    pub fn original_line(&self, generated_line: usize) -> Option<usize> {
        self.mappings_on_line(generated_line)
            .first()
            .map(|m| m.original_line as usize)
    }

    /// Original row for a generated line.
    ///
    /// Lines without segments take the original line of the nearest earlier
    /// mapped line. With no mapped line at or before `generated_line`, the
    /// generated line itself is returned.
    pub fn original_row(&self, generated_line: usize) -> usize {
        let end = generated_line.saturating_add(1).min(self.lines.len());
        self.lines[..end]
            .iter()
            .rev()
            .find_map(|line| line.first())
            .map_or(generated_line, |m| m.original_line as usize)
    }
}

fn base64_value(ch: char) -> Option<i64> {
    let v = match ch {
        'A'..='Z' => ch as u32 - 'A' as u32,
        'a'..='z' => ch as u32 - 'a' as u32 + 26,
        '0'..='9' => ch as u32 - '0' as u32 + 52,
        '+' => 62,
        '/' => 63,
        _ => return None,
    };
    Some(i64::from(v))
}

/// Decodes the base64 VLQ values of one segment.
fn decode_segment(segment: &str, line: usize) -> Result<Vec<i64>, SourceMapError> {
    let mut values = Vec::with_capacity(5);
    let mut value = 0i64;
    let mut shift = 0u32;
    let mut pending = false;

    for ch in segment.chars() {
        let digit = base64_value(ch).ok_or(SourceMapError::InvalidBase64 { ch, line })?;
        if shift > 55 {
            return Err(SourceMapError::MalformedSegment {
                line,
                reason: "VLQ value overflows".to_string(),
            });
        }
        value |= (digit & 0x1f) << shift;
        if digit & 0x20 != 0 {
            shift += 5;
            pending = true;
        } else {
            let magnitude = value >> 1;
            values.push(if value & 1 == 1 { -magnitude } else { magnitude });
            value = 0;
            shift = 0;
            pending = false;
        }
    }

    if pending {
        return Err(SourceMapError::MalformedSegment {
            line,
            reason: "truncated VLQ value".to_string(),
        });
    }
    Ok(values)
}

fn to_u32(value: i64, line: usize, field: &str) -> Result<u32, SourceMapError> {
    u32::try_from(value).map_err(|_| SourceMapError::MalformedSegment {
        line,
        reason: format!("{field} out of range: {value}"),
    })
}

/// Decodes a `mappings` string into per-line mapped segments.
fn decode_mappings(mappings: &str) -> Result<Vec<Vec<Mapping>>, SourceMapError> {
    let mut lines = Vec::new();
    let (mut source, mut original_line, mut original_column, mut name) = (0i64, 0i64, 0i64, 0i64);

    for (line_no, line) in mappings.split(';').enumerate() {
        let mut generated_column = 0i64;
        let mut segments = Vec::new();

        for segment in line.split(',').filter(|s| !s.is_empty()) {
            let fields = decode_segment(segment, line_no)?;
            generated_column += fields[0];
            match fields.len() {
                1 => continue,
                4 | 5 => {
                    source += fields[1];
                    original_line += fields[2];
                    original_column += fields[3];
                    let name_index = if fields.len() == 5 {
                        name += fields[4];
                        Some(to_u32(name, line_no, "name index")?)
                    } else {
                        None
                    };
                    segments.push(Mapping {
                        generated_column: to_u32(generated_column, line_no, "generated column")?,
                        source: to_u32(source, line_no, "source index")?,
                        original_line: to_u32(original_line, line_no, "original line")?,
                        original_column: to_u32(original_column, line_no, "original column")?,
                        name: name_index,
                    });
                }
                n => {
                    return Err(SourceMapError::MalformedSegment {
                        line: line_no,
                        reason: format!("segment has {n} fields"),
                    });
                }
            }
        }
        lines.push(segments);
    }

    Ok(lines)
}
