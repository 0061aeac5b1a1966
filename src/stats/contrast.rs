//! Pairwise group contrasts from a fitted mixed model.
//!
//! Each comparison is a Wald z-test of `beta(group1) - beta(group2) = 0`
//! using the model's own coefficient covariance, so the random-intercept
//! structure carries into every standard error. P-values are then corrected
//! across the whole family and tiered into star labels.

use std::fmt;

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use super::correction::CorrectionMethod;
use super::mixed::{MixedModelFit, fit_random_intercept};
use crate::error::{Error, Result};
use crate::preprocess::{Measure, MeasurementTable};

/// Default significance cutoff.
pub const DEFAULT_SIGNIFICANCE_CUTOFF: f64 = 0.05;

/// Star thresholds, most stringent first.
const TIERS: [(f64, &str); 4] = [(0.0001, "****"), (0.001, "***"), (0.01, "**"), (0.05, "*")];

/// Label for a non-significant result.
pub const NOT_SIGNIFICANT: &str = "ns";

/// Map an adjusted p-value to a star label.
///
/// ```
/// use image_quant::stats::significance_label;
///
/// assert_eq!(significance_label(0.00005), "****");
/// assert_eq!(significance_label(0.03), "*");
/// assert_eq!(significance_label(0.05), "ns");
/// ```
#[must_use]
pub fn significance_label(p: f64) -> &'static str {
    TIERS
        .iter()
        .find(|(threshold, _)| p < *threshold)
        .map_or(NOT_SIGNIFICANT, |(_, label)| label)
}

/// Like [`significance_label`] but `ns` whenever `p >= cutoff`.
#[must_use]
pub fn significance_label_with_cutoff(p: f64, cutoff: f64) -> &'static str {
    if p < cutoff {
        significance_label(p)
    } else {
        NOT_SIGNIFICANT
    }
}

/// An unordered pair of distinct groups, kept in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "(String, String)", into = "(String, String)")]
pub struct Comparison {
    /// First group; the estimate is `group1 - group2`.
    pub group1: String,
    /// Second group.
    pub group2: String,
}

impl Comparison {
    /// Create a comparison, rejecting a group compared with itself.
    pub fn new(group1: impl Into<String>, group2: impl Into<String>) -> Result<Self> {
        let group1 = group1.into();
        let group2 = group2.into();
        if group1.trim().is_empty() || group2.trim().is_empty() {
            return Err(Error::InvalidComparison(format!(
                "empty group label in ({group1:?}, {group2:?})"
            )));
        }
        if group1 == group2 {
            return Err(Error::InvalidComparison(format!(
                "group '{group1}' compared with itself"
            )));
        }
        Ok(Self { group1, group2 })
    }

    /// All `C(g, 2)` pairs of `groups`, in the order the slice lists them.
    #[must_use]
    pub fn all_pairs(groups: &[String]) -> Vec<Self> {
        let mut pairs = Vec::new();
        for (i, a) in groups.iter().enumerate() {
            for b in &groups[i + 1..] {
                pairs.push(Self {
                    group1: a.clone(),
                    group2: b.clone(),
                });
            }
        }
        pairs
    }

    /// Whether both comparisons name the same two groups in any order.
    #[must_use]
    pub fn same_pair(&self, other: &Self) -> bool {
        (self.group1 == other.group1 && self.group2 == other.group2)
            || (self.group1 == other.group2 && self.group2 == other.group1)
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} vs {}", self.group1, self.group2)
    }
}

impl TryFrom<(String, String)> for Comparison {
    type Error = Error;

    fn try_from((a, b): (String, String)) -> Result<Self> {
        Self::new(a, b)
    }
}

impl From<Comparison> for (String, String) {
    fn from(c: Comparison) -> Self {
        (c.group1, c.group2)
    }
}

/// One row of the results table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContrastRow {
    /// First group.
    pub group1: String,
    /// Second group.
    pub group2: String,
    /// Estimated `mean(group1) - mean(group2)`.
    pub estimate: f64,
    /// Standard error of the estimate.
    pub se: f64,
    /// Wald statistic `estimate / se`.
    pub z_value: f64,
    /// Two-sided p-value before correction.
    pub p_value: f64,
    /// P-value after multiple-comparison correction.
    pub p_value_adj: f64,
    /// Lower bound of the 95% Wald interval.
    pub ci_lower: f64,
    /// Upper bound of the 95% Wald interval.
    pub ci_upper: f64,
    /// Star label of the adjusted p-value.
    pub significance: String,
}

impl ContrastRow {
    /// Whether the adjusted p-value is below `cutoff`.
    #[must_use]
    pub fn is_significant(&self, cutoff: f64) -> bool {
        self.p_value_adj < cutoff
    }
}

/// Results of one dependent-variable analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResults {
    /// Modelled column.
    pub dependent_variable: Measure,
    /// Correction applied to the p-value family.
    pub correction: CorrectionMethod,
    /// Cutoff used for the `ns` boundary.
    pub significance_cutoff: f64,
    /// The fitted model.
    pub fit: MixedModelFit,
    /// One row per comparison, in comparison order.
    pub rows: Vec<ContrastRow>,
}

/// Check every comparison endpoint against the retained groups.
pub fn resolve_comparisons(
    table: &MeasurementTable,
    comparisons: Option<&[Comparison]>,
) -> Result<Vec<Comparison>> {
    let groups = table.groups();
    match comparisons {
        None => Ok(Comparison::all_pairs(&groups)),
        Some(list) => {
            for c in list {
                for g in [&c.group1, &c.group2] {
                    if !groups.contains(g) {
                        return Err(Error::EmptyGroup {
                            group: g.clone(),
                            context: format!("comparison {c}"),
                        });
                    }
                }
            }
            Ok(list.to_vec())
        }
    }
}

/// Fit the model for `measure` and test every comparison.
///
/// Comparisons are validated before the fit; `None` means all pairs of the
/// retained groups in lexicographic order.
pub fn pairwise_contrasts(
    table: &MeasurementTable,
    measure: Measure,
    comparisons: Option<&[Comparison]>,
    correction: CorrectionMethod,
    significance_cutoff: f64,
) -> Result<ModelResults> {
    let comparisons = resolve_comparisons(table, comparisons)?;
    let fit = fit_random_intercept(table, measure)?;
    let rows = contrast_rows(&fit, &comparisons, correction, significance_cutoff)?;

    tracing::info!(
        measure = %measure,
        comparisons = rows.len(),
        significant = rows.iter().filter(|r| r.is_significant(significance_cutoff)).count(),
        correction = %correction,
        "computed pairwise contrasts"
    );

    Ok(ModelResults {
        dependent_variable: measure,
        correction,
        significance_cutoff,
        fit,
        rows,
    })
}

/// Wald tests for `comparisons` on an existing fit.
pub fn contrast_rows(
    fit: &MixedModelFit,
    comparisons: &[Comparison],
    correction: CorrectionMethod,
    significance_cutoff: f64,
) -> Result<Vec<ContrastRow>> {
    let normal = Normal::standard();
    let z_crit = normal.inverse_cdf(0.975);

    let mut rows = Vec::with_capacity(comparisons.len());
    for c in comparisons {
        let contrast = fit
            .contrast(&c.group1, &c.group2)
            .ok_or_else(|| Error::EmptyGroup {
                group: if fit.group_names.contains(&c.group1) {
                    c.group2.clone()
                } else {
                    c.group1.clone()
                },
                context: format!("comparison {c}"),
            })?;

        let z_value = contrast.estimate / contrast.se;
        let p_value = (2.0 * normal.sf(z_value.abs())).min(1.0);
        rows.push(ContrastRow {
            group1: c.group1.clone(),
            group2: c.group2.clone(),
            estimate: contrast.estimate,
            se: contrast.se,
            z_value,
            p_value,
            p_value_adj: p_value,
            ci_lower: contrast.estimate - z_crit * contrast.se,
            ci_upper: contrast.estimate + z_crit * contrast.se,
            significance: String::new(),
        });
    }

    let raw: Vec<f64> = rows.iter().map(|r| r.p_value).collect();
    for (row, adj) in rows.iter_mut().zip(correction.adjust(&raw)) {
        row.p_value_adj = adj;
        row.significance = significance_label_with_cutoff(adj, significance_cutoff).to_string();
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preprocess::{Measurement, measurement};

    fn four_group_table() -> MeasurementTable {
        let groups: [(&str, [f64; 3]); 4] = [
            ("A", [0.20, 0.22, 0.18]),
            ("B", [0.80, 0.82, 0.78]),
            ("C", [0.50, 0.55, 0.45]),
            ("D", [0.52, 0.46, 0.54]),
        ];
        let mut rows: Vec<Measurement> = Vec::new();
        for (g, image_means) in groups {
            for (i, m) in image_means.iter().enumerate() {
                let id = format!("{g}_img{i}");
                rows.push(measurement(&id, 1, g, m + 0.01));
                rows.push(measurement(&id, 2, g, m - 0.01));
            }
        }
        MeasurementTable::new(rows).unwrap()
    }

    #[test]
    fn test_labels() {
        assert_eq!(significance_label(0.00005), "****");
        assert_eq!(significance_label(0.0001), "***");
        assert_eq!(significance_label(0.0005), "***");
        assert_eq!(significance_label(0.005), "**");
        assert_eq!(significance_label(0.03), "*");
        assert_eq!(significance_label(0.2), "ns");
        assert_eq!(significance_label(1.0), "ns");
    }

    #[test]
    fn test_label_with_cutoff() {
        assert_eq!(significance_label_with_cutoff(0.03, 0.05), "*");
        assert_eq!(significance_label_with_cutoff(0.03, 0.01), "ns");
        assert_eq!(significance_label_with_cutoff(0.005, 0.01), "**");
    }

    #[test]
    fn test_comparison_rejects_self() {
        assert!(matches!(Comparison::new("A", "A"), Err(Error::InvalidComparison(_))));
        assert!(Comparison::new("A", "B").unwrap().same_pair(&Comparison::new("B", "A").unwrap()));
    }

    #[test]
    fn test_all_pairs_count() {
        let groups: Vec<String> = ["A", "B", "C", "D", "E"].map(String::from).to_vec();
        let pairs = Comparison::all_pairs(&groups);
        assert_eq!(pairs.len(), 10);
        assert_eq!(pairs[0], Comparison::new("A", "B").unwrap());
    }

    #[test]
    fn test_default_row_count_is_all_pairs() {
        let table = four_group_table();
        let results =
            pairwise_contrasts(&table, Measure::FracIn, None, CorrectionMethod::Holm, 0.05).unwrap();
        assert_eq!(results.rows.len(), 6);
    }

    #[test]
    fn test_explicit_row_count_and_order() {
        let table = four_group_table();
        let comparisons = vec![
            Comparison::new("D", "C").unwrap(),
            Comparison::new("A", "B").unwrap(),
        ];
        let results = pairwise_contrasts(
            &table,
            Measure::FracIn,
            Some(&comparisons),
            CorrectionMethod::Bonferroni,
            0.05,
        )
        .unwrap();

        assert_eq!(results.rows.len(), 2);
        assert_eq!(results.rows[0].group1, "D");
        assert_eq!(results.rows[1].group1, "A");
        assert!(results.rows[1].estimate < -0.5);
    }

    #[test]
    fn test_separated_and_indistinguishable_groups() {
        let table = four_group_table();
        let results =
            pairwise_contrasts(&table, Measure::FracIn, None, CorrectionMethod::Holm, 0.05).unwrap();

        let find = |a: &str, b: &str| {
            results
                .rows
                .iter()
                .find(|r| r.group1 == a && r.group2 == b)
                .unwrap()
                .clone()
        };
        let ab = find("A", "B");
        assert!(ab.p_value_adj < 0.05);
        assert_ne!(ab.significance, "ns");
        assert!(ab.ci_lower < ab.estimate && ab.estimate < ab.ci_upper);

        let cd = find("C", "D");
        assert_eq!(cd.significance, "ns");
        assert!(cd.ci_lower < 0.0 && cd.ci_upper > 0.0);

        for row in &results.rows {
            assert!(row.p_value_adj >= row.p_value);
        }
    }

    #[test]
    fn test_unknown_comparison_group_fails_before_fit() {
        // One row per group: the fit itself would fail, so an EmptyGroup
        // error proves validation ran first.
        let table = MeasurementTable::new(vec![
            measurement("A_1", 1, "A", 0.1),
            measurement("B_1", 1, "B", 0.2),
        ])
        .unwrap();
        let comparisons = vec![Comparison::new("A", "Z").unwrap()];
        match pairwise_contrasts(
            &table,
            Measure::FracIn,
            Some(&comparisons),
            CorrectionMethod::Holm,
            0.05,
        ) {
            Err(Error::EmptyGroup { group, .. }) => assert_eq!(group, "Z"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_comparison_deserializes_from_pair() {
        let c: Comparison = serde_json::from_str(r#"["A", "B"]"#).unwrap();
        assert_eq!(c.group2, "B");
        assert!(serde_json::from_str::<Comparison>(r#"["A", "A"]"#).is_err());
    }
}
