//! # image-quant
//!
//! Quantification of protein sequestration from Fiji/ImageJ measurement
//! exports.
//!
//! Each export row is one series of one image. The library normalizes those
//! rows into a tidy table, fits a random-intercept mixed model per dependent
//! variable (so that series of the same image are not counted as independent
//! replicates), tests group differences pairwise with multiple-comparison
//! correction, and builds an annotated bar chart with significance brackets.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use image_quant::config::AnalysisConfig;
//! use image_quant::pipeline::{analyze_batch, load};
//!
//! let config = AnalysisConfig::from_path("config.yaml")?;
//! let plan = config.validate()?;
//! let input = config.input_path().unwrap_or_else(|| "fiji.csv".into());
//! let prepared = load(&input, &plan)?;
//!
//! for outcome in analyze_batch(&prepared.table, &plan) {
//!     let analysis = outcome.result?;
//!     for row in &analysis.results.rows {
//!         println!("{} vs {}: {}", row.group1, row.group2, row.significance);
//!     }
//! }
//! # Ok::<(), image_quant::Error>(())
//! ```
//!
//! ## Modules
//!
//! - [`error`]: Error types for the library
//! - [`config`]: YAML configuration and its validated plan
//! - [`import`]: CSV import of raw measurement rows
//! - [`preprocess`]: Row validation, group/image derivation, the tidy table
//! - [`stats`]: Mixed model, contrasts, p-value correction, descriptive stats
//! - [`plot`]: Group summaries, bracket layout and SVG bar charts
//! - [`pipeline`]: End-to-end analysis, parallel over dependent variables
//! - [`report`]: CSV, JSON, SVG and YAML artifact writers

pub mod config;
pub mod error;
pub mod import;
pub mod pipeline;
pub mod plot;
pub mod preprocess;
pub mod report;
pub mod stats;

// Re-export commonly used types
pub use config::{AnalysisConfig, AnalysisPlan};
pub use error::{Error, Result};
pub use import::{MeasurementImporter, RawRecord};
pub use pipeline::{Analysis, MeasureOutcome, analyze, analyze_batch};
pub use plot::{Annotated, BarChart, GroupSummary, PlotOptions, annotate};
pub use preprocess::{Measure, Measurement, MeasurementTable, Preprocessor};
pub use stats::{Comparison, ContrastRow, CorrectionMethod, ModelResults, Summary};
