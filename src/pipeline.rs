//! End-to-end analysis: import, preprocess, model, annotate.
//!
//! Fatal problems (bad input, empty groups, unknown comparison endpoints)
//! surface from [`prepare`] before any model is fitted. After that each
//! dependent variable is analyzed independently; [`analyze_batch`] runs them
//! in parallel and keeps their outcomes separate.

use std::path::Path;

use rayon::prelude::*;

use crate::config::AnalysisPlan;
use crate::error::Result;
use crate::import::{MeasurementImporter, RawRecord};
use crate::plot::{Annotated, annotate};
use crate::preprocess::{ImageSummary, Measure, MeasurementTable, Preprocessed, Preprocessor};
use crate::stats::{ModelResults, pairwise_contrasts, resolve_comparisons};

/// Everything produced for one dependent variable.
#[derive(Debug, Clone)]
pub struct Analysis {
    /// Model fit and contrast table.
    pub results: ModelResults,
    /// Group summaries and the annotated figure.
    pub annotated: Annotated,
    /// Series collapsed to one row per image.
    pub per_image: Vec<ImageSummary>,
}

impl Analysis {
    /// The analyzed column.
    #[must_use]
    pub fn measure(&self) -> Measure {
        self.results.dependent_variable
    }
}

/// Outcome of one dependent variable within a batch.
#[derive(Debug)]
pub struct MeasureOutcome {
    /// The analyzed column.
    pub measure: Measure,
    /// The analysis, or why it failed.
    pub result: Result<Analysis>,
}

/// Preprocess raw records under `plan` and check the comparisons against
/// the retained groups.
pub fn prepare(records: &[RawRecord], plan: &AnalysisPlan) -> Result<Preprocessed> {
    let preprocessed = Preprocessor::new()
        .with_optional_whitelist(plan.groups.as_deref())
        .run(records)?;
    resolve_comparisons(&preprocessed.table, plan.comparisons.as_deref())?;
    Ok(preprocessed)
}

/// Import a measurement table from disk and [`prepare`] it.
pub fn load(path: impl AsRef<Path>, plan: &AnalysisPlan) -> Result<Preprocessed> {
    let records = MeasurementImporter::new().import(path)?;
    prepare(&records, plan)
}

/// Fit, test and annotate one dependent variable.
pub fn analyze(table: &MeasurementTable, measure: Measure, plan: &AnalysisPlan) -> Result<Analysis> {
    let results = pairwise_contrasts(
        table,
        measure,
        plan.comparisons.as_deref(),
        plan.correction,
        plan.significance_cutoff,
    )?;
    let annotated = annotate(table, &results, &plan.plot_options());
    Ok(Analysis {
        per_image: table.collapse_per_image(measure),
        results,
        annotated,
    })
}

/// Analyze every dependent variable of the plan in parallel.
///
/// Outcomes come back in the plan's order.
#[must_use]
pub fn analyze_batch(table: &MeasurementTable, plan: &AnalysisPlan) -> Vec<MeasureOutcome> {
    plan.measures
        .par_iter()
        .map(|&measure| {
            let result = analyze(table, measure, plan);
            if let Err(e) = &result {
                tracing::warn!(measure = %measure, error = %e, "analysis failed");
            }
            MeasureOutcome { measure, result }
        })
        .collect()
}
