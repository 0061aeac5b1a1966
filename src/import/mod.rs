//! CSV import for Fiji/ImageJ measurement exports.
//!
//! The importer is tolerant about header spelling. It expects columns for:
//! - Source file name (`file`)
//! - Series index within the file (`series`)
//! - Intensity inside the sequestration region (`intIn`)
//! - Total intensity (`intTot`)
//! - Optionally the precomputed fraction (`fracIn`)
//!
//! Cells are kept as raw text; typing and validation happen in
//! [`crate::preprocess`] so that bad rows can be counted instead of aborting
//! the whole import.
//!
//! ## Example
//!
//! ```rust,ignore
//! use image_quant::import::MeasurementImporter;
//!
//! let records = MeasurementImporter::new().import("Results.csv")?;
//! ```

use std::io::Read;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// One raw row of a measurement export, before typing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRecord {
    /// 1-based line number in the source (header is line 1).
    pub line: usize,
    /// Source image file name.
    pub file: String,
    /// Series index cell.
    pub series: Option<String>,
    /// Intensity inside the region of interest.
    pub int_in: Option<String>,
    /// Total intensity.
    pub int_tot: Option<String>,
    /// Fraction inside, if the export carries it.
    pub frac_in: Option<String>,
}

impl RawRecord {
    /// Build a record from already-typed values. Handy for synthetic tables.
    #[must_use]
    pub fn new(file: impl Into<String>, series: u32, int_in: f64, int_tot: f64) -> Self {
        Self {
            line: 0,
            file: file.into(),
            series: Some(series.to_string()),
            int_in: Some(int_in.to_string()),
            int_tot: Some(int_tot.to_string()),
            frac_in: None,
        }
    }

    /// Attach a precomputed `fracIn` cell.
    #[must_use]
    pub fn with_frac_in(mut self, frac_in: f64) -> Self {
        self.frac_in = Some(frac_in.to_string());
        self
    }
}

/// Column names to look up in the header.
#[derive(Debug, Clone, Default)]
pub struct ColumnNames {
    /// Column name for the source file.
    pub file: Option<String>,
    /// Column name for the series index.
    pub series: Option<String>,
    /// Column name for the inside intensity.
    pub int_in: Option<String>,
    /// Column name for the total intensity.
    pub int_tot: Option<String>,
    /// Column name for the fraction inside.
    pub frac_in: Option<String>,
}

impl ColumnNames {
    /// Try to find a column index by name (case-insensitive, with aliases).
    fn find_column(headers: &[&str], primary: Option<&str>, aliases: &[&str]) -> Option<usize> {
        if let Some(name) = primary {
            if let Some(idx) = find_header_index(headers, name) {
                return Some(idx);
            }
        }

        aliases
            .iter()
            .find_map(|alias| find_header_index(headers, alias))
    }
}

/// CSV importer for measurement exports.
#[derive(Debug, Clone, Default)]
pub struct MeasurementImporter {
    columns: ColumnNames,
}

impl MeasurementImporter {
    /// Create an importer that auto-detects columns.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the file column name.
    #[must_use]
    pub fn file_column(mut self, name: impl Into<String>) -> Self {
        self.columns.file = Some(name.into());
        self
    }

    /// Override the series column name.
    #[must_use]
    pub fn series_column(mut self, name: impl Into<String>) -> Self {
        self.columns.series = Some(name.into());
        self
    }

    /// Import records from a CSV file.
    pub fn import(&self, path: impl AsRef<Path>) -> Result<Vec<RawRecord>> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_path(path.as_ref())?;
        self.read_all(reader)
    }

    /// Import records from any reader yielding CSV text.
    pub fn import_reader<R: Read>(&self, reader: R) -> Result<Vec<RawRecord>> {
        let reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        self.read_all(reader)
    }

    fn read_all<R: Read>(&self, mut reader: csv::Reader<R>) -> Result<Vec<RawRecord>> {
        let headers: Vec<String> = reader.headers()?.iter().map(String::from).collect();
        let header_refs: Vec<&str> = headers.iter().map(String::as_str).collect();

        let required = |primary: Option<&str>, aliases: &[&str], canonical: &str| {
            ColumnNames::find_column(&header_refs, primary, aliases).ok_or_else(|| {
                Error::MissingColumn {
                    column: canonical.to_string(),
                    found: headers
                        .iter()
                        .filter(|h| !h.is_empty())
                        .cloned()
                        .collect::<Vec<_>>()
                        .join(", "),
                }
            })
        };

        let file_idx = required(
            self.columns.file.as_deref(),
            &["file", "filename", "file_name", "image", "label"],
            "file",
        )?;
        let series_idx = required(
            self.columns.series.as_deref(),
            &["series", "series_index", "serie"],
            "series",
        )?;
        let int_in_idx = required(
            self.columns.int_in.as_deref(),
            &["intIn", "int_in", "intensity_in"],
            "intIn",
        )?;
        let int_tot_idx = required(
            self.columns.int_tot.as_deref(),
            &["intTot", "int_tot", "intensity_total"],
            "intTot",
        )?;
        let frac_in_idx = ColumnNames::find_column(
            &header_refs,
            self.columns.frac_in.as_deref(),
            &["fracIn", "frac_in", "fraction_in"],
        );

        let mut records = Vec::new();
        let mut last_line = 1;

        for record in reader.records() {
            let record = record.map_err(|e| Error::CsvImport {
                line: e.position().map_or(last_line + 1, source_line),
                reason: e.to_string(),
            })?;
            let line = record.position().map_or(last_line + 1, source_line);
            last_line = line;

            // Fully blank lines carry nothing worth counting.
            if record.iter().all(str::is_empty) {
                continue;
            }

            let cell = |idx: usize| {
                record
                    .get(idx)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
            };

            records.push(RawRecord {
                line,
                file: record.get(file_idx).unwrap_or("").to_string(),
                series: cell(series_idx),
                int_in: cell(int_in_idx),
                int_tot: cell(int_tot_idx),
                frac_in: frac_in_idx.and_then(cell),
            });
        }

        tracing::debug!(rows = records.len(), "imported measurement rows");
        Ok(records)
    }
}

/// Line where a record starts in the source text.
fn source_line(position: &csv::Position) -> usize {
    usize::try_from(position.line()).unwrap_or(usize::MAX)
}

/// Find a header index by name (case-insensitive, ignoring `_`).
fn find_header_index(headers: &[&str], name: &str) -> Option<usize> {
    let wanted = normalize_header(name);
    if wanted.is_empty() {
        return None;
    }
    headers.iter().position(|h| normalize_header(h) == wanted)
}

fn normalize_header(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_header_index() {
        let headers = ["file", "series", "intIn", "intTot", " "];
        assert_eq!(find_header_index(&headers, "FILE"), Some(0));
        assert_eq!(find_header_index(&headers, "int_in"), Some(2));
        assert_eq!(find_header_index(&headers, "fracIn"), None);
        assert_eq!(find_header_index(&headers, ""), None);
    }

    #[test]
    fn test_import_with_blank_trailing_column() {
        let data = "file,series,intIn,intTot,fracIn, \n\
                    A_img1_x.tif,1,10,40,0.25,\n\
                    B_img2.tif,2,5,,,\n";
        let records = MeasurementImporter::new()
            .import_reader(data.as_bytes())
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].line, 2);
        assert_eq!(records[0].file, "A_img1_x.tif");
        assert_eq!(records[0].frac_in.as_deref(), Some("0.25"));
        assert_eq!(records[1].int_tot, None);
        assert_eq!(records[1].frac_in, None);
    }

    #[test]
    fn test_line_numbers_follow_source_text() {
        // A quoted field spanning two lines shifts every later record.
        let data = "file,series,intIn,intTot\nA_1,1,1,2\n\"B\n_2\",1,1,2\nC_3,1,1,2\n";
        let records = MeasurementImporter::new()
            .import_reader(data.as_bytes())
            .unwrap();
        let lines: Vec<usize> = records.iter().map(|r| r.line).collect();
        assert_eq!(lines, [2, 3, 5]);
        assert_eq!(records[1].file, "B\n_2");
    }

    #[test]
    fn test_import_without_frac_in() {
        let data = "file,series,int_in,int_tot\nA_1,1,1,2\n";
        let records = MeasurementImporter::new()
            .import_reader(data.as_bytes())
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].series.as_deref(), Some("1"));
        assert!(records[0].frac_in.is_none());
    }

    #[test]
    fn test_missing_required_column() {
        let data = "file,series,intIn\nA_1,1,1\n";
        let err = MeasurementImporter::new()
            .import_reader(data.as_bytes())
            .unwrap_err();
        match err {
            Error::MissingColumn { column, .. } => assert_eq!(column, "intTot"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_custom_column_names() {
        let data = "Label,Slice,intIn,intTot\nA_1,3,1,2\n";
        let records = MeasurementImporter::new()
            .file_column("Label")
            .series_column("Slice")
            .import_reader(data.as_bytes())
            .unwrap();
        assert_eq!(records[0].file, "A_1");
        assert_eq!(records[0].series.as_deref(), Some("3"));
    }

    #[test]
    fn test_import_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Results.csv");
        std::fs::write(&path, "file,series,intIn,intTot\nC_9_a,1,3,4\n").unwrap();

        let records = MeasurementImporter::new().import(&path).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].int_in.as_deref(), Some("3"));
    }
}
