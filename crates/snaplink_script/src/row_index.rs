//! Mapping from rows of the assembled script back to original files.
//!
//! The index is a sorted table of disjoint, inclusive row ranges, one per
//! embedded module body. Rows outside every range belong to generated
//! scaffolding and translate to [`EMBEDDED`].
//!
//! A range built from a module with a source map carries the original row of
//! every body line, precomputed from the map. The same table is serialized
//! into the script as `snapshotSections`, so the script can translate rows on
//! its own and [`RowIndex::from_script`] can recover the index later.

use serde::{Deserialize, Serialize};

use crate::error::ScriptError;
use crate::source_map::SourceMap;

/// Path reported for rows that belong to no module.
pub const EMBEDDED: &str = "<embedded>";

/// Name of the auxiliary-data field holding the serialized row table.
pub const SECTIONS_FIELD: &str = "snapshotSections";

/// The rows of one module body in the assembled script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRange {
    /// First row of the body, 0-based.
    pub start_row: usize,
    /// Last row of the body, inclusive.
    pub end_row: usize,
    /// Module key of the module.
    pub relative_path: String,
    /// Original row of each body line, when the module has a source map.
    pub original_rows: Option<Vec<usize>>,
    /// The module's source map. Not serialized.
    #[serde(skip)]
    pub source_map: Option<SourceMap>,
}

impl RowRange {
    /// Creates a range, precomputing original rows from `source_map`.
    pub fn new(
        start_row: usize,
        end_row: usize,
        relative_path: impl Into<String>,
        source_map: Option<SourceMap>,
    ) -> Self {
        let original_rows = source_map
            .as_ref()
            .map(|sm| (0..=end_row - start_row).map(|local| sm.original_row(local)).collect());
        Self {
            start_row,
            end_row,
            relative_path: relative_path.into(),
            original_rows,
            source_map,
        }
    }

    fn contains(&self, row: usize) -> bool {
        self.start_row <= row && row <= self.end_row
    }

    fn original_row(&self, row: usize) -> usize {
        let local = row - self.start_row;
        match &self.original_rows {
            Some(rows) => rows.get(local).copied().unwrap_or(local),
            None => local,
        }
    }
}

/// Result of translating a script row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslatedRow {
    /// Module key, or [`EMBEDDED`] for scaffolding rows.
    pub relative_path: String,
    /// Row in the original file, or the script row itself for scaffolding.
    pub row: usize,
}

/// Sorted table of disjoint row ranges.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowIndex {
    ranges: Vec<RowRange>,
}

impl RowIndex {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an index from ranges, checking they are well formed, sorted
    /// and disjoint.
    pub fn from_ranges(ranges: Vec<RowRange>) -> Result<Self, ScriptError> {
        let mut index = Self::new();
        for range in ranges {
            index.push(range)?;
        }
        Ok(index)
    }

    /// Recovers the index from the `snapshotSections` table embedded in an
    /// assembled script.
    pub fn from_script(script: &str) -> Result<Self, ScriptError> {
        let prefix = "var snapshotAuxiliaryData = ";
        let line = script
            .lines()
            .find_map(|line| line.strip_prefix(prefix))
            .ok_or_else(|| ScriptError::InvalidRowIndex("no auxiliary data in script".to_string()))?;
        let json = line.strip_suffix(';').unwrap_or(line);

        let mut value: serde_json::Value = serde_json::from_str(json)?;
        let sections = value
            .get_mut(SECTIONS_FIELD)
            .map(serde_json::Value::take)
            .ok_or_else(|| ScriptError::InvalidRowIndex(format!("missing `{SECTIONS_FIELD}`")))?;
        let ranges: Vec<RowRange> = serde_json::from_value(sections)?;
        Self::from_ranges(ranges)
    }

    /// Appends a range after all existing ones.
    pub fn push(&mut self, range: RowRange) -> Result<(), ScriptError> {
        if range.end_row < range.start_row {
            return Err(ScriptError::InvalidRowIndex(format!(
                "range for `{}` ends before it starts",
                range.relative_path
            )));
        }
        if let Some(last) = self.ranges.last() {
            if range.start_row <= last.end_row {
                return Err(ScriptError::InvalidRowIndex(format!(
                    "range for `{}` at row {} overlaps or precedes `{}`",
                    range.relative_path, range.start_row, last.relative_path
                )));
            }
        }
        if let Some(rows) = &range.original_rows {
            if rows.len() != range.end_row - range.start_row + 1 {
                return Err(ScriptError::InvalidRowIndex(format!(
                    "range for `{}` has {} original rows for {} lines",
                    range.relative_path,
                    rows.len(),
                    range.end_row - range.start_row + 1
                )));
            }
        }
        self.ranges.push(range);
        Ok(())
    }

    /// The ranges in row order.
    pub fn ranges(&self) -> &[RowRange] {
        &self.ranges
    }

    /// Number of ranges.
    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    /// Whether the index has no ranges.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Translates a 0-based script row to its original file and row.
    pub fn translate(&self, row: usize) -> TranslatedRow {
        let idx = self.ranges.partition_point(|r| r.end_row < row);
        match self.ranges.get(idx) {
            Some(range) if range.contains(row) => TranslatedRow {
                relative_path: range.relative_path.clone(),
                row: range.original_row(row),
            },
            _ => TranslatedRow {
                relative_path: EMBEDDED.to_string(),
                row,
            },
        }
    }
}
