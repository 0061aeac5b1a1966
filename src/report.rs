//! Artifact writers.
//!
//! Results are written into one directory per run, named after the run date.
//! Tables go out as CSV (one serde row per record) and the contrast table
//! additionally as JSON together with the fitted variance components.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::pipeline::Analysis;
use crate::plot::ChartStyle;
use crate::preprocess::{Measure, MeasurementTable};
use crate::stats::{ContrastRow, CorrectionMethod};

/// JSON document for one dependent variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResultsDocument {
    /// Modelled column.
    pub dependent_variable: Measure,
    /// Correction applied to the p-values.
    pub correction: CorrectionMethod,
    /// Cutoff for the `ns` label.
    pub significance_cutoff: f64,
    /// Number of series rows in the fit.
    pub n_obs: usize,
    /// Number of images in the fit.
    pub n_images: usize,
    /// Within-image variance.
    pub residual_variance: f64,
    /// Between-image variance.
    pub random_intercept_variance: f64,
    /// REML log-likelihood at the optimum.
    pub reml_log_likelihood: f64,
    /// Contrast table.
    pub rows: Vec<ContrastRow>,
}

impl From<&Analysis> for ResultsDocument {
    fn from(analysis: &Analysis) -> Self {
        let r = &analysis.results;
        Self {
            dependent_variable: r.dependent_variable,
            correction: r.correction,
            significance_cutoff: r.significance_cutoff,
            n_obs: r.fit.n_obs,
            n_images: r.fit.n_images,
            residual_variance: r.fit.residual_variance,
            random_intercept_variance: r.fit.random_intercept_variance,
            reml_log_likelihood: r.fit.reml_log_likelihood,
            rows: r.rows.clone(),
        }
    }
}

/// Writes the artifacts of one run into `<root>/<date>/`.
#[derive(Debug, Clone)]
pub struct ReportWriter {
    dir: PathBuf,
    date: String,
}

impl ReportWriter {
    /// Writer for `<root>/<date>/`. Nothing is created until a write.
    #[must_use]
    pub fn dated(root: impl AsRef<Path>, date: impl Into<String>) -> Self {
        let date = date.into();
        Self {
            dir: root.as_ref().join(&date),
            date,
        }
    }

    /// Output directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, stem: &str, measure: Measure, ext: &str) -> PathBuf {
        self.dir.join(format!("{stem}_{measure}_{}.{ext}", self.date))
    }

    /// Write every artifact of one analysis. Returns the paths written.
    pub fn write_analysis(&self, analysis: &Analysis) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(&self.dir)?;
        let measure = analysis.measure();

        let results_csv = self.path("mixed_lme_results", measure, "csv");
        write_csv(&results_csv, &analysis.results.rows)?;

        let results_json = self.path("mixed_lme_results", measure, "json");
        let json = serde_json::to_string_pretty(&ResultsDocument::from(analysis))?;
        std::fs::write(&results_json, json)?;

        let summary_csv = self.path("group_summary", measure, "csv");
        write_csv(&summary_csv, &analysis.annotated.summaries)?;

        let per_image_csv = self.path("per_image", measure, "csv");
        write_csv(&per_image_csv, &analysis.per_image)?;

        let svg_path = self.path("barplot", measure, "svg");
        std::fs::write(&svg_path, analysis.annotated.chart.to_svg(&ChartStyle::default()))?;

        let written = vec![results_csv, results_json, summary_csv, per_image_csv, svg_path];
        for path in &written {
            tracing::debug!(path = %path.display(), "wrote artifact");
        }
        Ok(written)
    }

    /// Write the configuration snapshot.
    pub fn write_config(&self, config: &AnalysisConfig) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.dir.join("config.yaml");
        std::fs::write(&path, config.to_yaml()?)?;
        Ok(path)
    }
}

/// Write serde rows as CSV with a header.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Write the normalized measurement table as CSV.
pub fn write_table(path: &Path, table: &MeasurementTable) -> Result<()> {
    write_csv(path, table.rows())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::analyze;
    use crate::preprocess::measurement;

    fn analysis() -> Analysis {
        let mut rows = Vec::new();
        for (g, base) in [("A", 0.2), ("B", 0.6)] {
            for (i, off) in [0.03, -0.02, -0.01].iter().enumerate() {
                let id = format!("{g}_img{i}");
                rows.push(measurement(&id, 1, g, base + off + 0.01));
                rows.push(measurement(&id, 2, g, base + off - 0.01));
            }
        }
        let table = MeasurementTable::new(rows).unwrap();
        let plan = AnalysisConfig::new("x.csv").validate().unwrap();
        analyze(&table, Measure::FracIn, &plan).unwrap()
    }

    #[test]
    fn test_write_analysis_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::dated(dir.path(), "2024-05-01");
        let written = writer.write_analysis(&analysis()).unwrap();

        assert_eq!(written.len(), 5);
        for path in &written {
            assert!(path.starts_with(dir.path().join("2024-05-01")));
            assert!(path.exists(), "{}", path.display());
        }
        let csv = std::fs::read_to_string(writer.dir().join("mixed_lme_results_frac_in_2024-05-01.csv")).unwrap();
        let header = csv.lines().next().unwrap();
        assert!(header.starts_with("group1,group2,estimate,se,z_value,p_value,p_value_adj"));
        assert_eq!(csv.lines().count(), 2);

        let json = std::fs::read_to_string(writer.dir().join("mixed_lme_results_frac_in_2024-05-01.json")).unwrap();
        let doc: ResultsDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(doc.rows.len(), 1);
        assert_eq!(doc.n_images, 6);
    }

    #[test]
    fn test_write_config_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::dated(dir.path(), "2024-05-01");
        let config = AnalysisConfig::new("fiji.csv").with_groups(["A", "B"]);
        let path = writer.write_config(&config).unwrap();
        let back = AnalysisConfig::from_path(&path).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_writer_is_lazy() {
        let dir = tempfile::tempdir().unwrap();
        let writer = ReportWriter::dated(dir.path(), "2024-05-01");
        assert!(!writer.dir().exists());
    }
}
