//! Preprocessing of raw measurement records into a normalized table.
//!
//! Rows that cannot be typed are dropped and counted rather than aborting the
//! run; the counts come back in a [`PreprocessReport`]. Only conditions that
//! make the whole analysis meaningless (a whitelisted group with no rows, an
//! empty result, an image split across groups) are errors.
//!
//! ## Example
//!
//! ```rust,ignore
//! use image_quant::import::MeasurementImporter;
//! use image_quant::preprocess::Preprocessor;
//!
//! let records = MeasurementImporter::new().import("Results.csv")?;
//! let out = Preprocessor::new().with_whitelist(["A", "B"]).run(&records)?;
//! println!("{} rows kept, {} dropped", out.report.rows_retained, out.report.dropped_total());
//! ```

mod naming;
mod table;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use naming::{FilenamePrefix, FnNaming, RecordNaming};
pub use table::{ImageSummary, Measure, Measurement, MeasurementTable};

#[cfg(test)]
pub(crate) use table::measurement;

use crate::error::{Error, Result};
use crate::import::RawRecord;

/// Relative tolerance when checking a supplied `fracIn` against `intIn / intTot`.
pub const FRAC_IN_TOLERANCE: f64 = 1e-6;

/// Counts of what happened to each input row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessReport {
    /// Rows handed to the preprocessor.
    pub rows_read: usize,
    /// Rows in the output table.
    pub rows_retained: usize,
    /// Rows without a usable file name or group.
    pub dropped_malformed: usize,
    /// Rows with a missing, unparseable or negative numeric field.
    pub dropped_missing_numeric: usize,
    /// Rows with `intTot == 0`.
    pub dropped_zero_total: usize,
    /// Rows whose group is outside the whitelist.
    pub dropped_not_whitelisted: usize,
    /// Retained rows whose `fracIn` was absent or inconsistent and was derived.
    pub frac_in_recomputed: usize,
}

impl PreprocessReport {
    /// Total number of dropped rows.
    #[must_use]
    pub fn dropped_total(&self) -> usize {
        self.dropped_malformed
            + self.dropped_missing_numeric
            + self.dropped_zero_total
            + self.dropped_not_whitelisted
    }
}

/// Output of a preprocessing run.
#[derive(Debug, Clone)]
pub struct Preprocessed {
    /// Normalized table.
    pub table: MeasurementTable,
    /// Drop and recompute counts.
    pub report: PreprocessReport,
}

/// Why a single row was not retained.
enum RowOutcome {
    Keep(Measurement, bool),
    Malformed(String),
    MissingNumeric(String),
    ZeroTotal,
}

/// Turns raw records into a [`MeasurementTable`].
#[derive(Clone)]
pub struct Preprocessor {
    naming: Arc<dyn RecordNaming>,
    whitelist: Option<Vec<String>>,
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self {
            naming: Arc::new(FilenamePrefix),
            whitelist: None,
        }
    }
}

impl std::fmt::Debug for Preprocessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Preprocessor")
            .field("whitelist", &self.whitelist)
            .finish_non_exhaustive()
    }
}

impl Preprocessor {
    /// Preprocessor with the default file-name convention and no whitelist.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a different group/image naming convention.
    #[must_use]
    pub fn with_naming(mut self, naming: impl RecordNaming + 'static) -> Self {
        self.naming = Arc::new(naming);
        self
    }

    /// Retain only these groups.
    #[must_use]
    pub fn with_whitelist<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Retain only these groups if `groups` is `Some`.
    #[must_use]
    pub fn with_optional_whitelist(mut self, groups: Option<&[String]>) -> Self {
        self.whitelist = groups.map(<[String]>::to_vec);
        self
    }

    /// Type, filter and validate `records`.
    pub fn run(&self, records: &[RawRecord]) -> Result<Preprocessed> {
        let mut report = PreprocessReport {
            rows_read: records.len(),
            ..PreprocessReport::default()
        };
        let mut rows = Vec::with_capacity(records.len());

        for record in records {
            match self.process_row(record) {
                RowOutcome::Keep(m, recomputed) => {
                    if let Some(whitelist) = &self.whitelist {
                        if !whitelist.iter().any(|g| *g == m.group) {
                            report.dropped_not_whitelisted += 1;
                            continue;
                        }
                    }
                    if recomputed {
                        report.frac_in_recomputed += 1;
                    }
                    rows.push(m);
                }
                RowOutcome::Malformed(reason) => {
                    let err = Error::MalformedRecord {
                        line: record.line,
                        reason,
                    };
                    tracing::debug!(error = %err, "dropping row");
                    report.dropped_malformed += 1;
                }
                RowOutcome::MissingNumeric(reason) => {
                    tracing::debug!(line = record.line, %reason, "dropping row with bad numeric field");
                    report.dropped_missing_numeric += 1;
                }
                RowOutcome::ZeroTotal => {
                    tracing::warn!(
                        line = record.line,
                        file = %record.file,
                        "intTot is zero, cannot derive fracIn; dropping row"
                    );
                    report.dropped_zero_total += 1;
                }
            }
        }

        report.rows_retained = rows.len();

        if let Some(whitelist) = &self.whitelist {
            for group in whitelist {
                if !rows.iter().any(|m| m.group == *group) {
                    return Err(Error::EmptyGroup {
                        group: group.clone(),
                        context: "listed in groups whitelist".to_string(),
                    });
                }
            }
        }

        if rows.is_empty() {
            return Err(Error::EmptyDataset {
                rows_read: report.rows_read,
                dropped: report.dropped_total(),
            });
        }

        let table = MeasurementTable::new(rows)?;

        tracing::info!(
            rows_read = report.rows_read,
            rows_retained = report.rows_retained,
            dropped = report.dropped_total(),
            frac_in_recomputed = report.frac_in_recomputed,
            groups = table.groups().len(),
            images = table.image_count(),
            "preprocessed measurements"
        );

        Ok(Preprocessed { table, report })
    }

    fn process_row(&self, record: &RawRecord) -> RowOutcome {
        let file = record.file.trim();
        if file.is_empty() {
            return RowOutcome::Malformed("empty file field".to_string());
        }
        let Some(group) = self.naming.group(file).filter(|g| !g.is_empty()) else {
            return RowOutcome::Malformed(format!("no group derivable from '{file}'"));
        };
        let image_id = self.naming.image_id(file);
        if image_id.is_empty() {
            return RowOutcome::Malformed(format!("no image id derivable from '{file}'"));
        }

        let series = match parse_series(record.series.as_deref()) {
            Ok(s) => s,
            Err(reason) => return RowOutcome::MissingNumeric(reason),
        };
        let int_in = match parse_intensity("intIn", record.int_in.as_deref()) {
            Ok(v) => v,
            Err(reason) => return RowOutcome::MissingNumeric(reason),
        };
        let int_tot = match parse_intensity("intTot", record.int_tot.as_deref()) {
            Ok(v) => v,
            Err(reason) => return RowOutcome::MissingNumeric(reason),
        };
        if int_tot == 0.0 {
            return RowOutcome::ZeroTotal;
        }

        let derived = int_in / int_tot;
        let supplied = record
            .frac_in
            .as_deref()
            .and_then(|s| s.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite());
        let (frac_in, recomputed) = match supplied {
            Some(v) if frac_in_consistent(v, derived) => (v, false),
            _ => (derived, true),
        };

        RowOutcome::Keep(
            Measurement {
                image_id,
                file: file.to_string(),
                series,
                group,
                int_in,
                int_tot,
                frac_in,
            },
            recomputed,
        )
    }
}

fn frac_in_consistent(supplied: f64, derived: f64) -> bool {
    (supplied - derived).abs() <= FRAC_IN_TOLERANCE * derived.abs().max(1.0)
}

fn parse_series(cell: Option<&str>) -> std::result::Result<u32, String> {
    let cell = cell.ok_or_else(|| "missing series".to_string())?;
    let cell = cell.trim();
    // Some exports write the index as a float ("3.0").
    if let Ok(v) = cell.parse::<u32>() {
        return Ok(v);
    }
    match cell.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 && v <= f64::from(u32::MAX) => Ok(v as u32),
        _ => Err(format!("invalid series '{cell}'")),
    }
}

fn parse_intensity(column: &str, cell: Option<&str>) -> std::result::Result<f64, String> {
    let cell = cell.ok_or_else(|| format!("missing {column}"))?;
    match cell.trim().parse::<f64>() {
        Ok(v) if v.is_finite() && v >= 0.0 => Ok(v),
        Ok(v) => Err(format!("{column} out of range: {v}")),
        Err(_) => Err(format!("invalid {column} '{}'", cell.trim())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(file: &str, series: u32, int_in: f64, int_tot: f64) -> RawRecord {
        RawRecord::new(file, series, int_in, int_tot)
    }

    #[test]
    fn test_derives_group_image_and_frac_in() {
        let records = vec![
            raw("A_img1_a.tif", 1, 25.0, 100.0),
            raw("A_img1_b.tif", 2, 50.0, 100.0),
        ];
        let out = Preprocessor::new().run(&records).unwrap();

        let rows = out.table.rows();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].group, "A");
        assert_eq!(rows[0].image_id, rows[1].image_id);
        assert!((rows[0].frac_in - 0.25).abs() < 1e-12);
        assert_eq!(out.report.frac_in_recomputed, 2);
    }

    #[test]
    fn test_supplied_frac_in_kept_when_consistent() {
        let records = vec![
            raw("A_1", 1, 1.0, 3.0).with_frac_in(1.0 / 3.0),
            raw("A_2", 1, 1.0, 4.0).with_frac_in(0.9),
        ];
        let out = Preprocessor::new().run(&records).unwrap();

        assert_eq!(out.report.frac_in_recomputed, 1);
        for row in out.table.rows() {
            assert!((row.frac_in - row.int_in / row.int_tot).abs() < 1e-9);
        }
    }

    #[test]
    fn test_zero_total_never_survives() {
        let records = vec![raw("A_1", 1, 0.0, 0.0), raw("A_2", 1, 1.0, 2.0)];
        let out = Preprocessor::new().run(&records).unwrap();

        assert_eq!(out.report.dropped_zero_total, 1);
        assert!(out.table.rows().iter().all(|r| r.int_tot > 0.0));
    }

    #[test]
    fn test_malformed_and_missing_rows_counted() {
        let mut missing = raw("B_2", 1, 1.0, 2.0);
        missing.int_in = None;
        let mut bad_series = raw("B_3", 1, 1.0, 2.0);
        bad_series.series = Some("first".to_string());
        let mut negative = raw("B_4", 1, 1.0, 2.0);
        negative.int_tot = Some("-2".to_string());

        let records = vec![
            raw("", 1, 1.0, 2.0),
            missing,
            bad_series,
            negative,
            raw("B_1", 1, 1.0, 2.0),
        ];
        let out = Preprocessor::new().run(&records).unwrap();

        assert_eq!(out.report.rows_read, 5);
        assert_eq!(out.report.dropped_malformed, 1);
        assert_eq!(out.report.dropped_missing_numeric, 3);
        assert_eq!(out.report.rows_retained, 1);
        assert_eq!(out.report.dropped_total(), 4);
    }

    #[test]
    fn test_whitelist_filters() {
        let records = vec![
            raw("A_1", 1, 1.0, 2.0),
            raw("B_1", 1, 1.0, 2.0),
            raw("C_1", 1, 1.0, 2.0),
        ];
        let out = Preprocessor::new()
            .with_whitelist(["A", "C"])
            .run(&records)
            .unwrap();

        assert_eq!(out.table.groups(), vec!["A", "C"]);
        assert_eq!(out.report.dropped_not_whitelisted, 1);
    }

    #[test]
    fn test_whitelisted_group_without_rows_fails() {
        let records = vec![raw("A_1", 1, 1.0, 2.0), raw("B_1", 1, 1.0, 2.0)];
        let err = Preprocessor::new()
            .with_whitelist(["A", "Z"])
            .run(&records)
            .unwrap_err();

        match err {
            Error::EmptyGroup { group, .. } => assert_eq!(group, "Z"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_empty_dataset() {
        let records = vec![raw("A_1", 1, 1.0, 0.0)];
        assert!(matches!(
            Preprocessor::new().run(&records),
            Err(Error::EmptyDataset { rows_read: 1, dropped: 1 })
        ));
    }

    #[test]
    fn test_duplicates_preserved() {
        let records = vec![raw("A_1", 1, 1.0, 2.0), raw("A_1", 1, 1.0, 2.0)];
        let out = Preprocessor::new().run(&records).unwrap();
        assert_eq!(out.table.len(), 2);
    }

    #[test]
    fn test_every_image_has_one_group() {
        let records: Vec<RawRecord> = ["A", "B", "C"]
            .iter()
            .flat_map(|g| {
                (1..=3).flat_map(move |img| {
                    (1..=2).map(move |s| raw(&format!("{g}_img{img}_s{s}"), s, 1.0, 4.0))
                })
            })
            .collect();
        let out = Preprocessor::new().run(&records).unwrap();

        for row in out.table.rows() {
            assert_eq!(out.table.image_groups()[&row.image_id], row.group);
        }
        assert_eq!(out.table.image_count(), 9);
    }

    #[test]
    fn test_custom_naming() {
        let naming = FnNaming::new(
            |file: &str| file.split('-').next().map(String::from),
            |file: &str| file.rsplit_once('-').map_or(file, |(head, _)| head).to_string(),
        );
        let records = vec![raw("ctrl-1-1", 1, 1.0, 2.0), raw("kd-1-1", 1, 1.0, 2.0)];
        let out = Preprocessor::new().with_naming(naming).run(&records).unwrap();
        assert_eq!(out.table.groups(), vec!["ctrl", "kd"]);
    }

    #[test]
    fn test_parse_series_float() {
        assert_eq!(parse_series(Some("3.0")), Ok(3));
        assert!(parse_series(Some("2.5")).is_err());
        assert!(parse_series(None).is_err());
    }
}
