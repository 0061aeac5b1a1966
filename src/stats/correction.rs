//! Multiple-comparison p-value correction.
//!
//! All methods are applied to the whole family of p-values produced by one
//! analysis at once. Adjusted values are never smaller than the raw ones and
//! are capped at 1.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Supported correction methods.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum CorrectionMethod {
    /// Holm step-down (family-wise error rate).
    #[default]
    Holm,
    /// Bonferroni single-step.
    Bonferroni,
    /// Šidák single-step.
    Sidak,
    /// Holm step-down with Šidák per-step thresholds.
    HolmSidak,
    /// Benjamini-Hochberg (false discovery rate).
    FdrBh,
}

impl CorrectionMethod {
    /// Every supported method.
    pub const ALL: [Self; 5] = [
        Self::Holm,
        Self::Bonferroni,
        Self::Sidak,
        Self::HolmSidak,
        Self::FdrBh,
    ];

    /// Configuration name of the method.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Holm => "holm",
            Self::Bonferroni => "bonferroni",
            Self::Sidak => "sidak",
            Self::HolmSidak => "holm-sidak",
            Self::FdrBh => "fdr_bh",
        }
    }

    /// Adjust a family of p-values. Output order matches input order.
    #[must_use]
    pub fn adjust(self, p_values: &[f64]) -> Vec<f64> {
        let m = p_values.len();
        if m == 0 {
            return Vec::new();
        }
        let mf = m as f64;

        match self {
            Self::Bonferroni => p_values.iter().map(|p| (p * mf).min(1.0)).collect(),
            Self::Sidak => p_values.iter().map(|p| sidak(*p, mf)).collect(),
            Self::Holm => step_down(p_values, |p, rank| p * (m - rank) as f64),
            Self::HolmSidak => step_down(p_values, |p, rank| sidak(p, (m - rank) as f64)),
            Self::FdrBh => step_up_bh(p_values),
        }
    }
}

impl fmt::Display for CorrectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CorrectionMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim().to_ascii_lowercase();
        let canonical = match wanted.as_str() {
            "holm-sidak" | "holm_sidak" => "holm-sidak",
            "fdr_bh" | "fdr-bh" | "bh" | "benjamini-hochberg" => "fdr_bh",
            other => other,
        };
        Self::ALL
            .into_iter()
            .find(|m| m.name() == canonical)
            .ok_or_else(|| Error::UnsupportedCorrectionMethod {
                method: s.to_string(),
                supported: Self::ALL.map(Self::name).join(", "),
            })
    }
}

impl TryFrom<String> for CorrectionMethod {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<CorrectionMethod> for String {
    fn from(value: CorrectionMethod) -> Self {
        value.name().to_string()
    }
}

fn sidak(p: f64, m: f64) -> f64 {
    (1.0 - (1.0 - p).powf(m)).min(1.0)
}

/// Indices of `p_values` in ascending order of value.
fn ascending_order(p_values: &[f64]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..p_values.len()).collect();
    order.sort_by(|&a, &b| {
        p_values[a]
            .partial_cmp(&p_values[b])
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    order
}

/// Step-down: scale by rank, then enforce a running maximum.
fn step_down(p_values: &[f64], scale: impl Fn(f64, usize) -> f64) -> Vec<f64> {
    let mut adjusted = vec![0.0; p_values.len()];
    let mut running_max: f64 = 0.0;
    for (rank, idx) in ascending_order(p_values).into_iter().enumerate() {
        running_max = running_max.max(scale(p_values[idx], rank).min(1.0));
        adjusted[idx] = running_max;
    }
    adjusted
}

/// Benjamini-Hochberg step-up: scale by m/rank, then a running minimum from the top.
fn step_up_bh(p_values: &[f64]) -> Vec<f64> {
    let m = p_values.len() as f64;
    let order = ascending_order(p_values);
    let mut adjusted = vec![0.0; p_values.len()];
    let mut running_min: f64 = 1.0;
    for (rank, &idx) in order.iter().enumerate().rev() {
        let scaled = p_values[idx] * m / (rank + 1) as f64;
        running_min = running_min.min(scaled);
        adjusted[idx] = running_min;
    }
    adjusted
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: &[f64], b: &[f64]) -> bool {
        a.len() == b.len() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < 1e-12)
    }

    #[test]
    fn test_holm() {
        let adj = CorrectionMethod::Holm.adjust(&[0.01, 0.04, 0.03]);
        assert!(close(&adj, &[0.03, 0.06, 0.06]), "{adj:?}");
    }

    #[test]
    fn test_bonferroni_caps_at_one() {
        let adj = CorrectionMethod::Bonferroni.adjust(&[0.01, 0.04, 0.5]);
        assert!(close(&adj, &[0.03, 0.12, 1.0]), "{adj:?}");
    }

    #[test]
    fn test_fdr_bh() {
        let adj = CorrectionMethod::FdrBh.adjust(&[0.01, 0.04, 0.03]);
        assert!(close(&adj, &[0.03, 0.04, 0.04]), "{adj:?}");
    }

    #[test]
    fn test_sidak_single_value_unchanged() {
        for method in CorrectionMethod::ALL {
            let adj = method.adjust(&[0.02]);
            assert!((adj[0] - 0.02).abs() < 1e-12, "{method}");
        }
    }

    #[test]
    fn test_adjusted_never_below_raw_and_monotone() {
        let raw = [0.2, 0.001, 0.049, 0.0001, 0.7, 0.03, 0.03];
        for method in CorrectionMethod::ALL {
            let adj = method.adjust(&raw);
            for (p, a) in raw.iter().zip(&adj) {
                assert!(a >= p, "{method}: {a} < {p}");
                assert!(*a <= 1.0);
            }
            for i in 0..raw.len() {
                for j in 0..raw.len() {
                    if raw[i] < raw[j] {
                        assert!(adj[i] <= adj[j], "{method}: order broken at {i},{j}");
                    }
                }
            }
        }
    }

    #[test]
    fn test_empty_family() {
        assert!(CorrectionMethod::Holm.adjust(&[]).is_empty());
    }

    #[test]
    fn test_parse_method() {
        assert_eq!("Holm".parse::<CorrectionMethod>().unwrap(), CorrectionMethod::Holm);
        assert_eq!(
            "holm_sidak".parse::<CorrectionMethod>().unwrap(),
            CorrectionMethod::HolmSidak
        );
        match "tukey".parse::<CorrectionMethod>() {
            Err(Error::UnsupportedCorrectionMethod { method, supported }) => {
                assert_eq!(method, "tukey");
                assert!(supported.contains("bonferroni"));
            }
            other => panic!("unexpected: {other:?}"),
        }
    }
}
