//! Analysis configuration.
//!
//! [`AnalysisConfig`] is the serde view of the YAML file. It holds names as
//! strings so that a typo surfaces as a typed error from
//! [`AnalysisConfig::validate`] instead of a parse failure, and so that the
//! config round-trips unchanged into the snapshot artifact. Validation runs
//! before any data is read and yields an immutable [`AnalysisPlan`].

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::plot::PlotOptions;
use crate::preprocess::Measure;
use crate::stats::{Comparison, CorrectionMethod, DEFAULT_SIGNIFICANCE_CUTOFF};

/// One dependent variable or a list of them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DependentVariables {
    /// A single column name.
    One(String),
    /// Several column names, each analyzed independently.
    Many(Vec<String>),
}

impl Default for DependentVariables {
    fn default() -> Self {
        Self::One(Measure::default().name().to_string())
    }
}

impl DependentVariables {
    /// Names in declaration order.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        match self {
            Self::One(name) => vec![name.as_str()],
            Self::Many(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

/// Analysis configuration as written in YAML.
///
/// ```
/// use image_quant::config::AnalysisConfig;
///
/// let config = AnalysisConfig::from_yaml_str(
///     "input_table: fiji.csv\ngroups: [A, B]\np_adjust_method: bonferroni\n",
/// )
/// .unwrap();
/// let plan = config.validate().unwrap();
/// assert_eq!(plan.groups.as_deref(), Some(&["A".to_string(), "B".to_string()][..]));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Directory holding the input table and, by default, the output.
    #[serde(alias = "lsd1_image_group_path", skip_serializing_if = "Option::is_none")]
    pub input_dir: Option<PathBuf>,
    /// Measurement table, relative to `input_dir` unless absolute.
    #[serde(alias = "fiji_seq_table_rel_path", skip_serializing_if = "Option::is_none")]
    pub input_table: Option<PathBuf>,
    /// Groups to keep, in bar order. Empty or absent keeps every group.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<String>>,
    /// Explicit comparisons as two-element lists. Absent means all pairs.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comparisons: Option<Vec<Vec<String>>>,
    /// Column(s) to model.
    pub dependent_variable: DependentVariables,
    /// Multiple-comparison correction method name.
    pub p_adjust_method: String,
    /// Adjusted p-value at or above which a comparison is `ns`.
    pub significance_cutoff: f64,
    /// Hide brackets for non-significant comparisons.
    pub suppress_nonsignificant: bool,
    /// Print result tables to stdout.
    pub display_plots: bool,
    /// Write the dated artifact directory.
    pub save_artifacts: bool,
    /// Root of the artifact directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            input_dir: None,
            input_table: None,
            groups: None,
            comparisons: None,
            dependent_variable: DependentVariables::default(),
            p_adjust_method: CorrectionMethod::default().name().to_string(),
            significance_cutoff: DEFAULT_SIGNIFICANCE_CUTOFF,
            suppress_nonsignificant: false,
            display_plots: false,
            save_artifacts: true,
            output_path: None,
        }
    }
}

impl AnalysisConfig {
    /// Config for one input table with every other field defaulted.
    #[must_use]
    pub fn new(input_table: impl Into<PathBuf>) -> Self {
        Self {
            input_table: Some(input_table.into()),
            ..Default::default()
        }
    }

    /// Load a YAML config file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_yaml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Parse a YAML config.
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Serialize back to YAML.
    pub fn to_yaml(&self) -> Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Sets the group whitelist.
    #[must_use]
    pub fn with_groups<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.groups = Some(groups.into_iter().map(Into::into).collect());
        self
    }

    /// Sets explicit comparisons.
    #[must_use]
    pub fn with_comparisons<I, S>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, S)>,
        S: Into<String>,
    {
        self.comparisons = Some(
            pairs
                .into_iter()
                .map(|(a, b)| vec![a.into(), b.into()])
                .collect(),
        );
        self
    }

    /// Sets the correction method name.
    #[must_use]
    pub fn with_p_adjust_method(mut self, method: impl Into<String>) -> Self {
        self.p_adjust_method = method.into();
        self
    }

    /// Sets the dependent variables.
    #[must_use]
    pub fn with_dependent_variables<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependent_variable = DependentVariables::Many(names.into_iter().map(Into::into).collect());
        self
    }

    /// Path of the measurement table, joined onto `input_dir` when relative.
    #[must_use]
    pub fn input_path(&self) -> Option<PathBuf> {
        let table = self.input_table.as_ref()?;
        Some(match &self.input_dir {
            Some(dir) if table.is_relative() => dir.join(table),
            _ => table.clone(),
        })
    }

    /// Root for artifacts: `output_path`, else `input_dir`, else `.`.
    #[must_use]
    pub fn output_root(&self) -> PathBuf {
        self.output_path
            .clone()
            .or_else(|| self.input_dir.clone())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Check everything that does not need data.
    pub fn validate(&self) -> Result<AnalysisPlan> {
        let correction: CorrectionMethod = self.p_adjust_method.parse()?;

        let mut measures: Vec<Measure> = Vec::new();
        for name in self.dependent_variable.names() {
            let measure: Measure = name.parse()?;
            if !measures.contains(&measure) {
                measures.push(measure);
            }
        }
        if measures.is_empty() {
            return Err(Error::InvalidConfig(
                "dependent_variable lists no columns".to_string(),
            ));
        }

        let cutoff = self.significance_cutoff;
        if !(cutoff.is_finite() && cutoff > 0.0 && cutoff <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "significance_cutoff must be in (0, 1], got {cutoff}"
            )));
        }

        let groups = match self.groups.as_deref() {
            None | Some([]) => None,
            Some(list) => {
                let mut seen: Vec<String> = Vec::with_capacity(list.len());
                for g in list {
                    let g = g.trim();
                    if g.is_empty() {
                        return Err(Error::InvalidConfig("empty label in groups".to_string()));
                    }
                    if seen.iter().any(|s| s == g) {
                        return Err(Error::InvalidConfig(format!("group '{g}' listed twice")));
                    }
                    seen.push(g.to_string());
                }
                Some(seen)
            }
        };

        let comparisons = match self.comparisons.as_deref() {
            None | Some([]) => None,
            Some(pairs) => {
                let mut parsed: Vec<Comparison> = Vec::with_capacity(pairs.len());
                for pair in pairs {
                    let [a, b] = pair.as_slice() else {
                        return Err(Error::InvalidComparison(format!(
                            "expected two groups, got {pair:?}"
                        )));
                    };
                    let c = Comparison::new(a.trim(), b.trim())?;
                    if parsed.iter().any(|p| p.same_pair(&c)) {
                        return Err(Error::InvalidComparison(format!("{c} listed twice")));
                    }
                    if let Some(groups) = &groups {
                        for g in [&c.group1, &c.group2] {
                            if !groups.contains(g) {
                                return Err(Error::EmptyGroup {
                                    group: g.clone(),
                                    context: format!("comparison {c}; not listed in groups"),
                                });
                            }
                        }
                    }
                    parsed.push(c);
                }
                Some(parsed)
            }
        };

        Ok(AnalysisPlan {
            groups,
            comparisons,
            measures,
            correction,
            significance_cutoff: cutoff,
            suppress_nonsignificant: self.suppress_nonsignificant,
            display_plots: self.display_plots,
            save_artifacts: self.save_artifacts,
        })
    }
}

/// Validated, immutable settings shared by every stage.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisPlan {
    /// Group whitelist in bar order.
    pub groups: Option<Vec<String>>,
    /// Explicit comparisons, or `None` for all pairs.
    pub comparisons: Option<Vec<Comparison>>,
    /// Dependent variables, deduplicated, in declaration order.
    pub measures: Vec<Measure>,
    /// Correction applied per analysis.
    pub correction: CorrectionMethod,
    /// Cutoff for the `ns` label.
    pub significance_cutoff: f64,
    /// Hide brackets for non-significant comparisons.
    pub suppress_nonsignificant: bool,
    /// Print result tables to stdout.
    pub display_plots: bool,
    /// Write artifacts.
    pub save_artifacts: bool,
}

impl Default for AnalysisPlan {
    fn default() -> Self {
        Self {
            groups: None,
            comparisons: None,
            measures: vec![Measure::default()],
            correction: CorrectionMethod::default(),
            significance_cutoff: DEFAULT_SIGNIFICANCE_CUTOFF,
            suppress_nonsignificant: false,
            display_plots: false,
            save_artifacts: true,
        }
    }
}

impl AnalysisPlan {
    /// Plot options derived from the plan.
    #[must_use]
    pub fn plot_options(&self) -> PlotOptions {
        let options = PlotOptions::default()
            .with_suppress_nonsignificant(self.suppress_nonsignificant)
            .with_significance_cutoff(self.significance_cutoff);
        match &self.groups {
            Some(groups) => options.with_group_order(groups.clone()),
            None => options,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AnalysisConfig::from_yaml_str("input_table: data.csv\n").unwrap();
        let plan = config.validate().unwrap();
        assert_eq!(plan.measures, vec![Measure::FracIn]);
        assert_eq!(plan.correction, CorrectionMethod::Holm);
        assert!((plan.significance_cutoff - 0.05).abs() < 1e-12);
        assert!(plan.save_artifacts);
        assert!(!plan.display_plots);
        assert!(plan.groups.is_none());
        assert!(plan.comparisons.is_none());
    }

    #[test]
    fn test_legacy_keys_and_paths() {
        let yaml = "lsd1_image_group_path: /data/run1\nfiji_seq_table_rel_path: fiji.csv\n";
        let config = AnalysisConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.input_path(), Some(PathBuf::from("/data/run1/fiji.csv")));
        assert_eq!(config.output_root(), PathBuf::from("/data/run1"));
    }

    #[test]
    fn test_dependent_variable_list() {
        let yaml = "dependent_variable: [fracIn, int_tot, frac_in]\n";
        let plan = AnalysisConfig::from_yaml_str(yaml).unwrap().validate().unwrap();
        assert_eq!(plan.measures, vec![Measure::FracIn, Measure::IntTot]);
    }

    #[test]
    fn test_unsupported_method_rejected_at_config_time() {
        let config = AnalysisConfig::new("x.csv").with_p_adjust_method("tukey");
        assert!(matches!(
            config.validate(),
            Err(Error::UnsupportedCorrectionMethod { .. })
        ));
    }

    #[test]
    fn test_unsupported_dependent_variable() {
        let config = AnalysisConfig::new("x.csv").with_dependent_variables(["area"]);
        match config.validate() {
            Err(Error::UnsupportedDependentVariable { name, .. }) => assert_eq!(name, "area"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_cutoff_range() {
        for bad in [0.0, -0.1, 1.5, f64::NAN] {
            let config = AnalysisConfig {
                significance_cutoff: bad,
                ..AnalysisConfig::new("x.csv")
            };
            assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))), "{bad}");
        }
    }

    #[test]
    fn test_bad_comparisons() {
        let yaml = "comparisons: [[A, B, C]]\n";
        assert!(matches!(
            AnalysisConfig::from_yaml_str(yaml).unwrap().validate(),
            Err(Error::InvalidComparison(_))
        ));

        let dup = AnalysisConfig::new("x.csv").with_comparisons([("A", "B"), ("B", "A")]);
        assert!(matches!(dup.validate(), Err(Error::InvalidComparison(_))));

        let same = AnalysisConfig::new("x.csv").with_comparisons([("A", "A")]);
        assert!(matches!(same.validate(), Err(Error::InvalidComparison(_))));
    }

    #[test]
    fn test_comparison_outside_whitelist() {
        let config = AnalysisConfig::new("x.csv")
            .with_groups(["A", "B"])
            .with_comparisons([("A", "C")]);
        match config.validate() {
            Err(Error::EmptyGroup { group, .. }) => assert_eq!(group, "C"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn test_duplicate_group_rejected() {
        let config = AnalysisConfig::new("x.csv").with_groups(["A", "A"]);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn test_yaml_snapshot_round_trip() {
        let config = AnalysisConfig::new("fiji.csv")
            .with_groups(["B", "A"])
            .with_comparisons([("A", "B")]);
        let yaml = config.to_yaml().unwrap();
        assert_eq!(AnalysisConfig::from_yaml_str(&yaml).unwrap(), config);
    }

    #[test]
    fn test_plot_options_follow_group_order() {
        let plan = AnalysisConfig::new("x.csv")
            .with_groups(["C", "A"])
            .validate()
            .unwrap();
        assert_eq!(
            plan.plot_options().group_order,
            Some(vec!["C".to_string(), "A".to_string()])
        );
    }
}
