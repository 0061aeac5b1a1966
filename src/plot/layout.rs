//! Vertical placement of significance brackets.
//!
//! Brackets are placed in result-table order. Each one sits above the
//! tallest bar (including its CI whisker) under its span and above every
//! earlier bracket whose span overlaps it. Spans that share an endpoint count
//! as overlapping. Disjoint spans may reuse the same height.

use serde::{Deserialize, Serialize};

use super::GroupSummary;
use crate::stats::ContrastRow;

/// Spacing of the bracket stack, as fractions of the data range.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutParams {
    /// Gap between the tallest bar under a span and its bracket.
    pub base_offset: f64,
    /// Vertical distance between stacked brackets.
    pub level_step: f64,
    /// Length of the bracket's downward ticks.
    pub tick: f64,
    /// Room reserved above a bracket for its label.
    pub label_gap: f64,
    /// Height above the tallest bar available to brackets before the
    /// layout counts as overflowed.
    pub headroom: f64,
}

impl Default for LayoutParams {
    fn default() -> Self {
        Self {
            base_offset: 0.05,
            level_step: 0.08,
            tick: 0.02,
            label_gap: 0.04,
            headroom: 0.6,
        }
    }
}

impl LayoutParams {
    /// Sets the headroom budget.
    #[must_use]
    pub fn with_headroom(mut self, headroom: f64) -> Self {
        self.headroom = headroom;
        self
    }
}

/// One drawn bracket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BracketPlacement {
    /// First group of the comparison.
    pub group1: String,
    /// Second group of the comparison.
    pub group2: String,
    /// Left bar index.
    pub x1: usize,
    /// Right bar index, always greater than `x1`.
    pub x2: usize,
    /// Height of the horizontal bar in data units.
    pub y: f64,
    /// Lower end of the downward ticks in data units.
    pub tick_bottom: f64,
    /// Significance label drawn above the bracket.
    pub label: String,
    /// Stacking tier, 0 for brackets that clear only the bars.
    pub level: usize,
}

impl BracketPlacement {
    /// Whether two spans overlap, counting a shared endpoint.
    #[must_use]
    pub fn overlaps(&self, x1: usize, x2: usize) -> bool {
        self.x1 <= x2 && x1 <= self.x2
    }
}

/// Result of [`layout_brackets`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BracketLayout {
    /// Brackets in placement order.
    pub placements: Vec<BracketPlacement>,
    /// Highest point used by bars, brackets and labels.
    pub top: f64,
    /// Whether some bracket went past the headroom budget.
    pub overflowed: bool,
}

/// Data range used to scale the layout offsets.
pub(crate) fn data_range(bars: &[GroupSummary]) -> (f64, f64) {
    let top = bars.iter().map(GroupSummary::top).fold(0.0_f64, f64::max);
    let bottom = bars.iter().map(|b| b.ci_lower.min(b.mean)).fold(0.0_f64, f64::min);
    (bottom, top)
}

/// Place a bracket for every drawable contrast row.
///
/// `bars` gives the bar order (index = x position). Rows naming a group that
/// has no bar are skipped. When `suppress_nonsignificant` is set, rows with
/// `p_value_adj >= cutoff` are not drawn; otherwise they are drawn with their
/// `ns` label.
#[must_use]
pub fn layout_brackets(
    bars: &[GroupSummary],
    rows: &[ContrastRow],
    params: &LayoutParams,
    suppress_nonsignificant: bool,
    cutoff: f64,
) -> BracketLayout {
    let (bottom, data_top) = data_range(bars);
    let range = if data_top - bottom > 0.0 { data_top - bottom } else { 1.0 };
    let budget = data_top + params.headroom * range;

    let position = |group: &str| bars.iter().position(|b| b.group == group);

    let mut placements: Vec<BracketPlacement> = Vec::new();
    for row in rows {
        if suppress_nonsignificant && !row.is_significant(cutoff) {
            continue;
        }
        let (Some(a), Some(b)) = (position(&row.group1), position(&row.group2)) else {
            tracing::debug!(
                group1 = %row.group1,
                group2 = %row.group2,
                "comparison has no bar; bracket skipped"
            );
            continue;
        };
        let (x1, x2) = (a.min(b), a.max(b));

        let bars_top = bars[x1..=x2].iter().map(GroupSummary::top).fold(f64::MIN, f64::max);
        let mut y = bars_top + params.base_offset * range;
        let mut level = 0;
        for placed in placements.iter().filter(|p| p.overlaps(x1, x2)) {
            y = y.max(placed.y + params.level_step * range);
            level = level.max(placed.level + 1);
        }

        placements.push(BracketPlacement {
            group1: row.group1.clone(),
            group2: row.group2.clone(),
            x1,
            x2,
            y,
            tick_bottom: y - params.tick * range,
            label: row.significance.clone(),
            level,
        });
    }

    let highest = placements.iter().map(|p| p.y).fold(data_top, f64::max);
    let overflowed = placements.iter().any(|p| p.y > budget);
    if overflowed {
        tracing::warn!(
            brackets = placements.len(),
            highest,
            budget,
            "significance brackets exceed the plot headroom; drawing all of them anyway"
        );
    }

    let top = if placements.is_empty() {
        data_top
    } else {
        highest + params.label_gap * range
    };

    BracketLayout {
        placements,
        top,
        overflowed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(group: &str, mean: f64, half_ci: f64) -> GroupSummary {
        GroupSummary {
            group: group.to_string(),
            n: 6,
            mean,
            std_dev: half_ci,
            sem: half_ci / 1.96,
            ci_lower: mean - half_ci,
            ci_upper: mean + half_ci,
        }
    }

    fn row(g1: &str, g2: &str, p_adj: f64, label: &str) -> ContrastRow {
        ContrastRow {
            group1: g1.to_string(),
            group2: g2.to_string(),
            estimate: 0.1,
            se: 0.01,
            z_value: 10.0,
            p_value: p_adj,
            p_value_adj: p_adj,
            ci_lower: 0.0,
            ci_upper: 0.2,
            significance: label.to_string(),
        }
    }

    fn bars() -> Vec<GroupSummary> {
        vec![
            bar("A", 0.2, 0.02),
            bar("B", 0.8, 0.05),
            bar("C", 0.5, 0.04),
            bar("D", 0.5, 0.03),
        ]
    }

    #[test]
    fn test_overlapping_spans_get_distinct_heights() {
        let rows = vec![
            row("A", "B", 0.001, "**"),
            row("A", "C", 0.001, "**"),
            row("B", "C", 0.001, "**"),
            row("A", "D", 0.001, "**"),
        ];
        let layout = layout_brackets(&bars(), &rows, &LayoutParams::default(), false, 0.05);
        assert_eq!(layout.placements.len(), 4);

        for (i, a) in layout.placements.iter().enumerate() {
            for b in &layout.placements[i + 1..] {
                if a.overlaps(b.x1, b.x2) {
                    assert!((a.y - b.y).abs() > 1e-9, "{a:?} and {b:?} collide");
                }
            }
        }
    }

    #[test]
    fn test_disjoint_spans_may_share_height() {
        let even = vec![bar("A", 0.5, 0.0), bar("B", 0.5, 0.0), bar("C", 0.5, 0.0), bar("D", 0.5, 0.0)];
        let rows = vec![row("A", "B", 0.01, "*"), row("C", "D", 0.01, "*")];
        let layout = layout_brackets(&even, &rows, &LayoutParams::default(), false, 0.05);
        assert_eq!(layout.placements[0].level, 0);
        assert_eq!(layout.placements[1].level, 0);
        assert!((layout.placements[0].y - layout.placements[1].y).abs() < 1e-12);
    }

    #[test]
    fn test_brackets_clear_ci_tops() {
        let bars = bars();
        let rows = vec![row("A", "B", 0.01, "*"), row("C", "D", 0.5, "ns")];
        let layout = layout_brackets(&bars, &rows, &LayoutParams::default(), false, 0.05);
        for p in &layout.placements {
            for b in &bars[p.x1..=p.x2] {
                assert!(p.y > b.ci_upper);
                assert!(p.y > b.mean);
            }
        }
        assert_eq!(layout.placements[1].label, "ns");
    }

    #[test]
    fn test_suppression_skips_nonsignificant() {
        let rows = vec![row("A", "B", 0.01, "*"), row("C", "D", 0.5, "ns")];
        let layout = layout_brackets(&bars(), &rows, &LayoutParams::default(), true, 0.05);
        assert_eq!(layout.placements.len(), 1);
        assert_eq!(layout.placements[0].group1, "A");
    }

    #[test]
    fn test_overflow_still_draws_every_bracket() {
        let groups = ["A", "B", "C", "D", "E", "F"];
        let bars: Vec<_> = groups.iter().map(|g| bar(g, 0.5, 0.05)).collect();
        let mut rows = Vec::new();
        for (i, a) in groups.iter().enumerate() {
            for b in &groups[i + 1..] {
                rows.push(row(a, b, 0.001, "**"));
            }
        }
        let params = LayoutParams::default().with_headroom(0.2);
        let layout = layout_brackets(&bars, &rows, &params, false, 0.05);
        assert_eq!(layout.placements.len(), 15);
        assert!(layout.overflowed);
        assert!(layout.top >= layout.placements.iter().map(|p| p.y).fold(0.0, f64::max));
    }

    #[test]
    fn test_reversed_comparison_spans_left_to_right() {
        let rows = vec![row("D", "A", 0.01, "*")];
        let layout = layout_brackets(&bars(), &rows, &LayoutParams::default(), false, 0.05);
        let p = &layout.placements[0];
        assert_eq!((p.x1, p.x2), (0, 3));
        assert_eq!(p.group1, "D");
    }

    #[test]
    fn test_missing_bar_skipped() {
        let rows = vec![row("A", "Q", 0.01, "*")];
        let layout = layout_brackets(&bars(), &rows, &LayoutParams::default(), false, 0.05);
        assert!(layout.placements.is_empty());
        assert!(!layout.overflowed);
    }

    #[test]
    fn test_ticks_scale_with_params_and_clear_bars() {
        let rows = vec![row("A", "B", 0.001, "**"), row("A", "C", 0.001, "**")];
        let bars = bars();
        // Range is 0.85 (CI top of B), bottom 0.
        let params = LayoutParams {
            tick: 0.04,
            ..LayoutParams::default()
        };
        let layout = layout_brackets(&bars, &rows, &params, false, 0.05);
        for p in &layout.placements {
            assert!((p.y - p.tick_bottom - 0.04 * 0.85).abs() < 1e-12);
            let under = bars[p.x1..=p.x2].iter().map(GroupSummary::top).fold(0.0, f64::max);
            assert!(p.tick_bottom > under);
        }
    }
}
