//! # Statistics Module
//!
//! Turns a toolkit statistics report into rows indexed by region label.
//!
//! Reports are whitespace-separated tables preceded by `#` comment lines;
//! the column names come from the `# ColHeaders` line. Structure names are
//! translated to region labels through the scheme's color lookup table, whose
//! data lines read `<index> <name> <r> <g> <b> <a>`.

use crate::PipelineError;
use std::collections::BTreeMap;
use std::path::Path;

/// Header line prefix naming the report columns.
const COL_HEADERS: &str = "# ColHeaders";

/// Column holding the structure name in every report flavour.
const STRUCT_NAME: &str = "StructName";

// =============================================================================
// LOOKUP TABLE
// =============================================================================

/// Structure name to region label mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LookupTable {
    labels: BTreeMap<String, String>,
}

impl LookupTable {
    /// Read a color lookup table from disk.
    pub fn read(path: &Path) -> Result<Self, PipelineError> {
        if !path.is_file() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path).map_err(|e| PipelineError::io(path, &e))?;
        Self::parse(&text, path)
    }

    /// Parse lookup table text; `origin` only names the source in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, PipelineError> {
        let mut labels = BTreeMap::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            match (fields.next(), fields.next()) {
                (Some(index), Some(name)) => {
                    labels.insert(name.to_string(), index.to_string());
                }
                _ => {
                    return Err(PipelineError::StatsParseError {
                        path: origin.to_path_buf(),
                        reason: format!("lookup line {} has no structure name", number + 1),
                    });
                }
            }
        }
        Ok(Self { labels })
    }

    /// Region label of a structure.
    #[must_use]
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// =============================================================================
// STATS TABLE
// =============================================================================

/// A parsed report: column values per region label.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsTable {
    columns: Vec<String>,
    rows: BTreeMap<String, BTreeMap<String, String>>,
}

impl StatsTable {
    /// Report columns in file order.
    #[must_use]
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Region labels, sorted.
    pub fn regions(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(String::as_str)
    }

    /// Value of `column` for `region`.
    #[must_use]
    pub fn get(&self, region: &str, column: &str) -> Option<&str> {
        self.rows
            .get(region)
            .and_then(|row| row.get(column))
            .map(String::as_str)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// =============================================================================
// PARSER
// =============================================================================

/// Pure function from a report file to a stats table.
pub trait StatsParser: Send + Sync {
    fn parse(&self, report: &Path, lookup: &LookupTable) -> Result<StatsTable, PipelineError>;
}

/// Parser for FreeSurfer `.stats` reports (surface and segmentation).
#[derive(Debug, Clone, Copy, Default)]
pub struct FreeSurferStatsParser;

impl FreeSurferStatsParser {
    /// Parse report text; `origin` only names the source in errors.
    pub fn parse_text(
        &self,
        text: &str,
        origin: &Path,
        lookup: &LookupTable,
    ) -> Result<StatsTable, PipelineError> {
        let malformed = |reason: String| PipelineError::StatsParseError {
            path: origin.to_path_buf(),
            reason,
        };

        let mut columns: Option<Vec<String>> = None;
        let mut rows = BTreeMap::new();

        for (number, line) in text.lines().enumerate() {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            if let Some(header) = trimmed.strip_prefix(COL_HEADERS) {
                columns = Some(header.split_whitespace().map(str::to_string).collect());
                continue;
            }
            if trimmed.starts_with('#') {
                continue;
            }

            let Some(columns) = columns.as_ref() else {
                return Err(malformed(format!(
                    "data on line {} before the column header",
                    number + 1
                )));
            };
            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() != columns.len() {
                return Err(malformed(format!(
                    "line {} has {} fields, expected {}",
                    number + 1,
                    fields.len(),
                    columns.len()
                )));
            }

            let row: BTreeMap<String, String> = columns
                .iter()
                .cloned()
                .zip(fields.iter().map(|f| f.to_string()))
                .collect();
            let name = row
                .get(STRUCT_NAME)
                .ok_or_else(|| malformed(format!("no {STRUCT_NAME} column")))?;
            let label = lookup
                .label(name)
                .ok_or_else(|| malformed(format!("structure '{name}' is not in the lookup table")))?
                .to_string();
            rows.insert(label, row);
        }

        let columns = columns.ok_or_else(|| malformed("no column header".to_string()))?;
        Ok(StatsTable { columns, rows })
    }
}

impl StatsParser for FreeSurferStatsParser {
    fn parse(&self, report: &Path, lookup: &LookupTable) -> Result<StatsTable, PipelineError> {
        if !report.is_file() {
            return Err(PipelineError::FileNotFound(report.to_path_buf()));
        }
        let text = std::fs::read_to_string(report).map_err(|e| PipelineError::io(report, &e))?;
        self.parse_text(&text, report, lookup)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;

    const LUT: &str = "\
#$Id: schemeX.ctab
  0  unknown          25   5  25   0
  1  precentral       60  20 220   0
  2  postcentral     220  20  20   0
";

    const APARC: &str = "\
# Title Cortical Parcellation Statistics
# TableCol  1 ColHeader StructName
# ColHeaders StructName NumVert SurfArea GrayVol ThickAvg ThickStd MeanCurv GausCurv FoldInd CurvInd
precentral  9000 6000 17000 2.5 0.6 0.11 0.02 120 10.1
postcentral 7000 4200 10500 2.0 0.5 0.12 0.03  90  8.7
";

    const ASEG: &str = "\
# ColHeaders  Index SegId NVoxels Volume_mm3 StructName normMean normStdDev normMin normMax normRange
  1   1  7500  7512.3  precentral  80.1  9.9  30  110  80
";

    fn lookup() -> LookupTable {
        LookupTable::parse(LUT, Path::new("lut")).unwrap()
    }

    #[test]
    fn lookup_maps_names_to_indices() {
        let lut = lookup();
        assert_eq!(lut.len(), 3);
        assert_eq!(lut.label("precentral"), Some("1"));
        assert_eq!(lut.label("insula"), None);
    }

    #[test]
    fn parses_surface_report() {
        let table = FreeSurferStatsParser
            .parse_text(APARC, Path::new("lh.x.stats"), &lookup())
            .unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(table.regions().collect::<Vec<_>>(), vec!["1", "2"]);
        assert_eq!(table.get("1", "GrayVol"), Some("17000"));
        assert_eq!(table.get("2", "ThickAvg"), Some("2.0"));
        assert_eq!(table.columns()[0], "StructName");
    }

    #[test]
    fn parses_segmentation_report() {
        let table = FreeSurferStatsParser
            .parse_text(ASEG, Path::new("x_subcortex.stats"), &lookup())
            .unwrap();
        assert_eq!(table.get("1", "Volume_mm3"), Some("7512.3"));
        assert_eq!(table.get("1", "normStdDev"), Some("9.9"));
    }

    #[test]
    fn unknown_structure_is_parse_error() {
        let report = "# ColHeaders StructName SurfArea\ninsula 10\n";
        let result = FreeSurferStatsParser.parse_text(report, Path::new("r"), &lookup());
        assert!(matches!(result, Err(PipelineError::StatsParseError { .. })));
    }

    #[test]
    fn ragged_and_headerless_reports_rejected() {
        let ragged = "# ColHeaders StructName SurfArea\nprecentral 10 11\n";
        assert!(matches!(
            FreeSurferStatsParser.parse_text(ragged, Path::new("r"), &lookup()),
            Err(PipelineError::StatsParseError { .. })
        ));

        let headerless = "# nothing here\n";
        assert!(matches!(
            FreeSurferStatsParser.parse_text(headerless, Path::new("r"), &lookup()),
            Err(PipelineError::StatsParseError { reason, .. }) if reason == "no column header"
        ));
    }

    #[test]
    fn missing_report_is_file_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = FreeSurferStatsParser.parse(&dir.path().join("absent.stats"), &lookup());
        assert!(matches!(result, Err(PipelineError::FileNotFound(_))));
    }
}
