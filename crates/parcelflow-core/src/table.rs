//! # Table Module
//!
//! The hierarchically-indexed result table and the merge that builds it.
//!
//! Rows are keyed by `(subject, session, source, region group, region)` and
//! columns are measures. Per-unit fragments and the aggregated result share
//! one type, [`Table`]; aggregation is a sequence of [`Table::merge`] calls.
//!
//! ## Merge Rule
//!
//! - A filled cell in the fragment overwrites the table (recomputation).
//! - An empty cell in the fragment never clears a filled one.
//! - Rows and columns only ever get added.

use crate::PipelineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Leading CSV columns naming the row index.
pub const INDEX_COLUMNS: [&str; 5] = ["subject", "session", "source", "region_group", "region"];

/// Row index of the table.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RowKey {
    pub subject: String,
    pub session: String,
    pub source: String,
    /// Region group label (`lh`, `rh`, `subcortex`).
    pub region_group: String,
    /// Region label within the group.
    pub region: String,
}

/// One row flattened for serialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableRecord {
    #[serde(flatten)]
    pub key: RowKey,
    pub values: BTreeMap<String, Option<String>>,
}

/// A table of opaque measurement strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    /// Column names in first-seen order.
    columns: Vec<String>,
    rows: BTreeMap<RowKey, BTreeMap<String, Option<String>>>,
}

impl Table {
    /// Create an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn ensure_column(&mut self, column: &str) {
        if !self.columns.iter().any(|c| c == column) {
            self.columns.push(column.to_string());
        }
    }

    /// Write a cell, creating its row and column as needed.
    pub fn set(&mut self, row: RowKey, column: &str, value: Option<String>) {
        self.ensure_column(column);
        self.rows
            .entry(row)
            .or_default()
            .insert(column.to_string(), value);
    }

    /// Value of a cell; `None` when absent or empty.
    #[must_use]
    pub fn get(&self, row: &RowKey, column: &str) -> Option<&str> {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(column))
            .and_then(|cell| cell.as_deref())
    }

    /// Whether a cell address exists (filled or empty).
    #[must_use]
    pub fn contains(&self, row: &RowKey, column: &str) -> bool {
        self.rows
            .get(row)
            .is_some_and(|cells| cells.contains_key(column))
    }

    /// Column names in first-seen order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Row keys in index order.
    pub fn row_keys(&self) -> impl Iterator<Item = &RowKey> {
        self.rows.keys()
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of filled cells.
    #[must_use]
    pub fn filled_cells(&self) -> usize {
        self.rows
            .values()
            .map(|cells| cells.values().filter(|c| c.is_some()).count())
            .sum()
    }

    /// Merge `fragment` into this table.
    pub fn merge(&mut self, fragment: &Table) {
        for column in &fragment.columns {
            self.ensure_column(column);
        }
        for (key, cells) in &fragment.rows {
            let row = self.rows.entry(key.clone()).or_default();
            for (column, value) in cells {
                match value {
                    Some(_) => {
                        row.insert(column.clone(), value.clone());
                    }
                    None => {
                        row.entry(column.clone()).or_insert(None);
                    }
                }
            }
        }
    }

    /// Rows flattened for serialization, in index order.
    #[must_use]
    pub fn records(&self) -> Vec<TableRecord> {
        self.rows
            .iter()
            .map(|(key, cells)| TableRecord {
                key: key.clone(),
                values: self
                    .columns
                    .iter()
                    .map(|c| (c.clone(), cells.get(c).cloned().flatten()))
                    .collect(),
            })
            .collect()
    }

    /// Render as wide CSV: index columns, then measures in column order.
    ///
    /// Empty cells render as empty fields. The output is byte-identical for
    /// identical tables.
    pub fn to_csv(&self) -> Result<String, PipelineError> {
        String::from_utf8(self.csv_bytes()?)
            .map_err(|e| PipelineError::SerializationError(format!("table csv: {e}")))
    }

    /// Compute a BLAKE3 hash of the CSV rendering.
    ///
    /// # Requires
    ///
    /// This function is only available with the `crypto-hash` feature enabled.
    #[cfg(feature = "crypto-hash")]
    pub fn blake3_hex(&self) -> Result<String, PipelineError> {
        Ok(blake3::hash(&self.csv_bytes()?).to_hex().to_string())
    }

    fn csv_bytes(&self) -> Result<Vec<u8>, PipelineError> {
        let csv_err = |e: csv::Error| PipelineError::SerializationError(format!("table csv: {e}"));
        let mut writer = csv::WriterBuilder::new()
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer
            .write_record(INDEX_COLUMNS.iter().copied().chain(self.columns.iter().map(String::as_str)))
            .map_err(csv_err)?;
        for (key, cells) in &self.rows {
            let index = [
                key.subject.as_str(),
                key.session.as_str(),
                key.source.as_str(),
                key.region_group.as_str(),
                key.region.as_str(),
            ];
            let values = self
                .columns
                .iter()
                .map(|c| cells.get(c).and_then(|v| v.as_deref()).unwrap_or_default());
            writer
                .write_record(index.into_iter().chain(values))
                .map_err(csv_err)?;
        }

        writer
            .into_inner()
            .map_err(|e| PipelineError::SerializationError(format!("table csv: {}", e.error())))
    }
}

/// Merge `fragment` into `existing` and return the result.
#[must_use]
pub fn merge(mut existing: Table, fragment: &Table) -> Table {
    existing.merge(fragment);
    existing
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    fn key(region: &str) -> RowKey {
        RowKey {
            subject: "01".into(),
            session: "01".into(),
            source: "sub-01_ses-01_T1w".into(),
            region_group: "lh".into(),
            region: region.into(),
        }
    }

    #[test]
    fn merge_adds_columns_without_touching_others() {
        let mut table = Table::new();
        table.set(key("1"), "area", Some("6000".into()));

        let mut fragment = Table::new();
        fragment.set(key("1"), "volume", Some("17000".into()));

        let merged = merge(table, &fragment);
        assert_eq!(merged.get(&key("1"), "area"), Some("6000"));
        assert_eq!(merged.get(&key("1"), "volume"), Some("17000"));
        assert_eq!(merged.columns(), &["area".to_string(), "volume".to_string()]);
    }

    #[test]
    fn empty_cells_never_clear_filled_ones() {
        let mut table = Table::new();
        table.set(key("1"), "area", Some("6000".into()));

        let mut fragment = Table::new();
        fragment.set(key("1"), "area", None);
        fragment.set(key("2"), "area", None);

        table.merge(&fragment);
        assert_eq!(table.get(&key("1"), "area"), Some("6000"));
        assert!(table.contains(&key("2"), "area"));
        assert_eq!(table.get(&key("2"), "area"), None);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn filled_cells_overwrite() {
        let mut table = Table::new();
        table.set(key("1"), "area", Some("6000".into()));

        let mut fragment = Table::new();
        fragment.set(key("1"), "area", Some("6100".into()));

        table.merge(&fragment);
        assert_eq!(table.get(&key("1"), "area"), Some("6100"));
        assert_eq!(table.filled_cells(), 1);
    }

    #[test]
    fn csv_rendering_is_ordered_and_escaped() {
        let mut table = Table::new();
        table.set(key("2"), "area", Some("1".into()));
        table.set(key("1"), "area", Some("a,b".into()));
        table.set(key("1"), "volume", None);

        let csv = table.to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "subject,session,source,region_group,region,area,volume");
        assert_eq!(lines[1], "01,01,sub-01_ses-01_T1w,lh,1,\"a,b\",");
        assert_eq!(lines[2], "01,01,sub-01_ses-01_T1w,lh,2,1,");
    }

    #[test]
    fn records_cover_every_column() {
        let mut table = Table::new();
        table.set(key("1"), "area", Some("1".into()));
        table.set(key("2"), "volume", Some("2".into()));

        let records = table.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].values.len(), 2);
        assert_eq!(records[0].values.get("volume"), Some(&None));
    }
}
