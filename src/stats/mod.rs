//! Statistical analysis of per-series measurements.
//!
//! ## Mixed Model
//!
//! - [`fit_random_intercept`]: REML fit of `dep ~ C(group) + (1 | image_id)`
//! - [`pairwise_contrasts`]: Wald tests of group differences with correction
//! - [`CorrectionMethod`]: Holm, Bonferroni, Šidák, Holm-Šidák, Benjamini-Hochberg
//! - [`significance_label`]: star tiers for adjusted p-values
//!
//! ## Core Statistics
//!
//! - [`Summary`]: Descriptive statistics (mean, std_dev, SEM)
//! - [`mean`], [`std_dev`], [`standard_error`]: Basic statistical functions

pub mod contrast;
pub mod correction;
pub mod mixed;

pub use contrast::{
    Comparison, ContrastRow, DEFAULT_SIGNIFICANCE_CUTOFF, ModelResults, NOT_SIGNIFICANT,
    contrast_rows, pairwise_contrasts, resolve_comparisons, significance_label,
    significance_label_with_cutoff,
};
pub use correction::CorrectionMethod;
pub use mixed::{Contrast, MixedModelFit, fit_random_intercept};

use serde::{Deserialize, Serialize};

/// Descriptive statistics for a set of measurements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Summary {
    /// Number of values.
    pub count: usize,
    /// Mean value.
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Standard error of the mean.
    pub sem: f64,
}

impl Summary {
    /// Compute summary statistics for a slice of values.
    ///
    /// Returns `None` if the slice is empty.
    #[must_use]
    pub fn compute(values: &[f64]) -> Option<Self> {
        if values.is_empty() {
            return None;
        }
        Some(Self {
            count: values.len(),
            mean: mean(values),
            std_dev: std_dev(values),
            sem: standard_error(values),
        })
    }
}

//=============================================================================
// Core Statistical Functions
//=============================================================================

/// Compute arithmetic mean.
///
/// # Example
///
/// ```
/// use image_quant::stats::mean;
///
/// assert!((mean(&[1.0, 2.0, 3.0, 4.0, 5.0]) - 3.0).abs() < 0.001);
/// ```
#[must_use]
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Compute sample standard deviation.
///
/// Uses Bessel's correction (N-1 denominator). Fewer than two values give 0.
///
/// # Example
///
/// ```
/// use image_quant::stats::std_dev;
///
/// let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
/// assert!((std_dev(&values) - 2.138).abs() < 0.001);
/// ```
#[must_use]
pub fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let variance = values.iter().map(|x| (x - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    variance.sqrt()
}

/// Standard error of the mean, `std_dev / sqrt(n)`.
///
/// ```
/// use image_quant::stats::standard_error;
///
/// assert!((standard_error(&[1.0, 3.0]) - 1.0).abs() < 1e-12);
/// assert_eq!(standard_error(&[4.0]), 0.0);
/// ```
#[must_use]
pub fn standard_error(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    std_dev(values) / (values.len() as f64).sqrt()
}
