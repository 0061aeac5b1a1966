//! Per-group summaries and annotated bar charts.
//!
//! [`annotate`] turns a measurement table and a set of model results into a
//! [`BarChart`] value: one bar per group with a 95% normal CI, plus one
//! significance bracket per drawn comparison. Nothing here touches the
//! filesystem; rendering to SVG is a separate call.

mod chart;
mod layout;

pub use chart::{Bar, BarChart, ChartStyle, colors};
pub use layout::{BracketLayout, BracketPlacement, LayoutParams, layout_brackets};

use serde::{Deserialize, Serialize};

use crate::preprocess::{Measure, MeasurementTable};
use crate::stats::{DEFAULT_SIGNIFICANCE_CUTOFF, ModelResults, Summary};

/// Two-sided 95% normal quantile used for the bar CIs.
pub const CI_Z: f64 = 1.96;

/// Descriptive statistics of one group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Group label.
    pub group: String,
    /// Number of series rows.
    pub n: usize,
    /// Mean of the measure.
    pub mean: f64,
    /// Sample standard deviation.
    pub std_dev: f64,
    /// Standard error of the mean (0 for a single row).
    pub sem: f64,
    /// `mean - 1.96 * sem`.
    pub ci_lower: f64,
    /// `mean + 1.96 * sem`.
    pub ci_upper: f64,
}

impl GroupSummary {
    /// Highest point of the bar or its whisker.
    #[must_use]
    pub fn top(&self) -> f64 {
        self.mean.max(self.ci_upper)
    }
}

/// Bar order: `order` first (unknown labels ignored), then the remaining
/// groups lexicographically.
#[must_use]
pub fn bar_order(groups: &[String], order: Option<&[String]>) -> Vec<String> {
    let mut ordered: Vec<String> = Vec::with_capacity(groups.len());
    if let Some(order) = order {
        for g in order {
            if groups.contains(g) && !ordered.contains(g) {
                ordered.push(g.clone());
            }
        }
    }
    let mut rest: Vec<String> = groups.iter().filter(|g| !ordered.contains(g)).cloned().collect();
    rest.sort();
    ordered.extend(rest);
    ordered
}

/// Mean and CI of `measure` per group, in bar order.
///
/// Statistics run over every series row of the group, so `n` counts series.
/// The model accounts for the image structure; the bars do not.
#[must_use]
pub fn summarize_groups(
    table: &MeasurementTable,
    measure: Measure,
    order: Option<&[String]>,
) -> Vec<GroupSummary> {
    bar_order(&table.groups(), order)
        .into_iter()
        .filter_map(|group| {
            let values = table.values(measure, &group);
            let summary = Summary::compute(&values)?;
            Some(GroupSummary {
                n: summary.count,
                mean: summary.mean,
                std_dev: summary.std_dev,
                sem: summary.sem,
                ci_lower: summary.mean - CI_Z * summary.sem,
                ci_upper: summary.mean + CI_Z * summary.sem,
                group,
            })
        })
        .collect()
}

/// Options for [`annotate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlotOptions {
    /// Explicit left-to-right bar order.
    pub group_order: Option<Vec<String>>,
    /// Leave out brackets for non-significant comparisons.
    pub suppress_nonsignificant: bool,
    /// Adjusted p-value at or above which a comparison is `ns`.
    pub significance_cutoff: f64,
    /// Bracket stacking parameters.
    pub layout: LayoutParams,
    /// Chart title; defaults to the measure name.
    pub title: Option<String>,
    /// Y-axis label; defaults to the measure name.
    pub y_label: Option<String>,
}

impl Default for PlotOptions {
    fn default() -> Self {
        Self {
            group_order: None,
            suppress_nonsignificant: false,
            significance_cutoff: DEFAULT_SIGNIFICANCE_CUTOFF,
            layout: LayoutParams::default(),
            title: None,
            y_label: None,
        }
    }
}

impl PlotOptions {
    /// Sets the bar order.
    #[must_use]
    pub fn with_group_order(mut self, order: Vec<String>) -> Self {
        self.group_order = Some(order);
        self
    }

    /// Sets whether non-significant brackets are hidden.
    #[must_use]
    pub fn with_suppress_nonsignificant(mut self, suppress: bool) -> Self {
        self.suppress_nonsignificant = suppress;
        self
    }

    /// Sets the significance cutoff.
    #[must_use]
    pub fn with_significance_cutoff(mut self, cutoff: f64) -> Self {
        self.significance_cutoff = cutoff;
        self
    }
}

/// Group summaries plus the figure built from them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotated {
    /// One summary per bar, in bar order.
    pub summaries: Vec<GroupSummary>,
    /// The annotated figure.
    pub chart: BarChart,
    /// Whether the bracket stack went past its headroom budget.
    pub overflowed: bool,
}

/// Build the annotated bar chart for one analysis.
#[must_use]
pub fn annotate(table: &MeasurementTable, results: &ModelResults, options: &PlotOptions) -> Annotated {
    let measure = results.dependent_variable;
    let summaries = summarize_groups(table, measure, options.group_order.as_deref());
    let layout = layout_brackets(
        &summaries,
        &results.rows,
        &options.layout,
        options.suppress_nonsignificant,
        options.significance_cutoff,
    );
    let (y_min, _) = layout::data_range(&summaries);

    let bars = summaries
        .iter()
        .enumerate()
        .map(|(i, s)| Bar {
            label: s.group.clone(),
            value: s.mean,
            ci_lower: s.ci_lower,
            ci_upper: s.ci_upper,
            color: colors::nth(i).to_string(),
        })
        .collect();

    tracing::debug!(
        measure = %measure,
        bars = summaries.len(),
        brackets = layout.placements.len(),
        overflowed = layout.overflowed,
        "annotated bar chart"
    );

    let chart = BarChart {
        title: options.title.clone().unwrap_or_else(|| format!("{measure} by group")),
        x_label: "Group".to_string(),
        y_label: options.y_label.clone().unwrap_or_else(|| measure.name().to_string()),
        bars,
        brackets: layout.placements,
        y_min,
        y_max: layout.top,
    };

    Annotated {
        summaries,
        chart,
        overflowed: layout.overflowed,
    }
}
