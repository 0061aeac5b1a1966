//! SVG rendering of annotated bar charts.
//!
//! A [`BarChart`] is a plain value: bars, error bars and brackets are all
//! explicit fields, so the same figure can be inspected in tests, serialized,
//! or rendered. Rendering supports light and dark mode via CSS media queries.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::layout::BracketPlacement;

/// One bar with its error bar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    /// Group label under the bar.
    pub label: String,
    /// Bar height (group mean).
    pub value: f64,
    /// Lower end of the error bar.
    pub ci_lower: f64,
    /// Upper end of the error bar.
    pub ci_upper: f64,
    /// CSS fill color.
    pub color: String,
}

/// An annotated bar chart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BarChart {
    /// Chart title.
    pub title: String,
    /// X-axis label.
    pub x_label: String,
    /// Y-axis label.
    pub y_label: String,
    /// Bars, left to right.
    pub bars: Vec<Bar>,
    /// Significance brackets, indexed by bar position.
    pub brackets: Vec<BracketPlacement>,
    /// Bottom of the y axis.
    pub y_min: f64,
    /// Top of the y axis.
    pub y_max: f64,
}

/// Pixel geometry of the rendered chart.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartStyle {
    /// Chart width in pixels.
    pub width: u32,
    /// Chart height in pixels.
    pub height: u32,
    /// Fraction of each slot filled by its bar.
    pub bar_width: f64,
    /// Number of horizontal grid lines.
    pub grid_lines: u32,
}

impl Default for ChartStyle {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            bar_width: 0.6,
            grid_lines: 5,
        }
    }
}

const MARGIN_TOP: u32 = 50;
const MARGIN_RIGHT: u32 = 30;
const MARGIN_BOTTOM: u32 = 70;
const MARGIN_LEFT: u32 = 90;

impl BarChart {
    /// Render the chart as a standalone SVG document.
    ///
    /// An empty chart renders as an empty string.
    ///
    /// ```
    /// use image_quant::plot::{Bar, BarChart, ChartStyle};
    ///
    /// let chart = BarChart {
    ///     title: "fracIn".to_string(),
    ///     x_label: "Group".to_string(),
    ///     y_label: "frac_in".to_string(),
    ///     bars: vec![Bar {
    ///         label: "A".to_string(),
    ///         value: 0.4,
    ///         ci_lower: 0.35,
    ///         ci_upper: 0.45,
    ///         color: "#3498db".to_string(),
    ///     }],
    ///     brackets: Vec::new(),
    ///     y_min: 0.0,
    ///     y_max: 0.5,
    /// };
    /// let svg = chart.to_svg(&ChartStyle::default());
    /// assert!(svg.starts_with("<svg"));
    /// ```
    #[must_use]
    pub fn to_svg(&self, style: &ChartStyle) -> String {
        if self.bars.is_empty() {
            return String::new();
        }
        let mut svg = String::with_capacity(8192);

        let width = style.width.max(MARGIN_LEFT + MARGIN_RIGHT + 10);
        let height = style.height.max(MARGIN_TOP + MARGIN_BOTTOM + 10);
        let plot_width = f64::from(width - MARGIN_LEFT - MARGIN_RIGHT);
        let plot_height = f64::from(height - MARGIN_TOP - MARGIN_BOTTOM);

        let (min_y, max_y) = if self.y_max > self.y_min {
            (self.y_min, self.y_max)
        } else {
            (self.y_min, self.y_min + 1.0)
        };
        let slot = plot_width / self.bars.len() as f64;

        let scale_y = |v: f64| -> f64 {
            f64::from(MARGIN_TOP) + (1.0 - (v - min_y) / (max_y - min_y)) * plot_height
        };
        let center_x = |i: usize| -> f64 { f64::from(MARGIN_LEFT) + (i as f64 + 0.5) * slot };

        let _ = writeln!(
            svg,
            r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 {width} {height}">"#
        );
        svg.push_str(
            r#"<style>
  :root {
    --bg-color: #ffffff;
    --text-color: #1a1a1a;
    --grid-color: #e0e0e0;
    --axis-color: #333333;
    --whisker-color: #1a1a1a;
  }
  @media (prefers-color-scheme: dark) {
    :root {
      --bg-color: #1a1a1a;
      --text-color: #e0e0e0;
      --grid-color: #404040;
      --axis-color: #b0b0b0;
      --whisker-color: #e0e0e0;
    }
  }
  .background { fill: var(--bg-color); }
  .title { font: bold 18px system-ui, sans-serif; fill: var(--text-color); }
  .axis-label { font: 13px system-ui, sans-serif; fill: var(--text-color); }
  .tick-label { font: 11px system-ui, sans-serif; fill: var(--text-color); }
  .sig-label { font: 13px system-ui, sans-serif; fill: var(--text-color); }
  .grid { stroke: var(--grid-color); stroke-width: 1; }
  .axis { stroke: var(--axis-color); stroke-width: 1.5; }
  .whisker { stroke: var(--whisker-color); stroke-width: 1.5; }
  .bracket { stroke: var(--text-color); stroke-width: 1.2; fill: none; }
</style>
"#,
        );

        let _ = writeln!(
            svg,
            r#"<rect class="background" width="{width}" height="{height}"/>"#
        );
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="30" text-anchor="middle" class="title">{}</text>"#,
            f64::from(width) / 2.0,
            escape(&self.title)
        );

        // Grid and y ticks
        let lines = style.grid_lines.max(1);
        for i in 0..=lines {
            let v = min_y + f64::from(i) / f64::from(lines) * (max_y - min_y);
            let y = scale_y(v);
            let _ = writeln!(
                svg,
                r#"<line x1="{}" y1="{y:.2}" x2="{}" y2="{y:.2}" class="grid"/>"#,
                MARGIN_LEFT,
                width - MARGIN_RIGHT
            );
            let _ = writeln!(
                svg,
                r#"<text x="{}" y="{:.2}" text-anchor="end" class="tick-label">{}</text>"#,
                MARGIN_LEFT - 10,
                y + 4.0,
                tick_label(v)
            );
        }

        // Axes
        let baseline = scale_y(0.0_f64.clamp(min_y, max_y));
        let _ = writeln!(
            svg,
            r#"<line x1="{}" y1="{baseline:.2}" x2="{}" y2="{baseline:.2}" class="axis"/>"#,
            MARGIN_LEFT,
            width - MARGIN_RIGHT
        );
        let _ = writeln!(
            svg,
            r#"<line x1="{0}" y1="{1}" x2="{0}" y2="{2}" class="axis"/>"#,
            MARGIN_LEFT,
            MARGIN_TOP,
            height - MARGIN_BOTTOM
        );

        // Bars with error bars
        let bar_px = slot * style.bar_width;
        for (i, bar) in self.bars.iter().enumerate() {
            let cx = center_x(i);
            let top = scale_y(bar.value);
            let (y, h) = if top <= baseline {
                (top, baseline - top)
            } else {
                (baseline, top - baseline)
            };
            let _ = writeln!(
                svg,
                r#"<rect x="{:.2}" y="{y:.2}" width="{bar_px:.2}" height="{h:.2}" fill="{}"/>"#,
                cx - bar_px / 2.0,
                bar.color
            );

            let lo = scale_y(bar.ci_lower);
            let hi = scale_y(bar.ci_upper);
            let cap = bar_px / 6.0;
            let _ = writeln!(
                svg,
                r#"<path d="M {cx:.2},{lo:.2} L {cx:.2},{hi:.2} M {:.2},{hi:.2} L {:.2},{hi:.2} M {:.2},{lo:.2} L {:.2},{lo:.2}" class="whisker"/>"#,
                cx - cap,
                cx + cap,
                cx - cap,
                cx + cap
            );

            let _ = writeln!(
                svg,
                r#"<text x="{cx:.2}" y="{}" text-anchor="middle" class="tick-label">{}</text>"#,
                height - MARGIN_BOTTOM + 20,
                escape(&bar.label)
            );
        }

        // Significance brackets
        for b in &self.brackets {
            let x1 = center_x(b.x1);
            let x2 = center_x(b.x2);
            let y = scale_y(b.y);
            let tick = scale_y(b.tick_bottom);
            let _ = writeln!(
                svg,
                r#"<path d="M {x1:.2},{tick:.2} L {x1:.2},{y:.2} L {x2:.2},{y:.2} L {x2:.2},{tick:.2}" class="bracket"/>"#
            );
            let _ = writeln!(
                svg,
                r#"<text x="{:.2}" y="{:.2}" text-anchor="middle" class="sig-label">{}</text>"#,
                (x1 + x2) / 2.0,
                y - 4.0,
                escape(&b.label)
            );
        }

        // Axis labels
        let _ = writeln!(
            svg,
            r#"<text x="{}" y="{}" text-anchor="middle" class="axis-label">{}</text>"#,
            f64::from(width) / 2.0,
            height - 20,
            escape(&self.x_label)
        );
        let _ = writeln!(
            svg,
            r#"<text x="25" y="{0}" text-anchor="middle" class="axis-label" transform="rotate(-90 25 {0})">{1}</text>"#,
            f64::from(height) / 2.0,
            escape(&self.y_label)
        );

        svg.push_str("</svg>\n");
        svg
    }
}

fn tick_label(v: f64) -> String {
    if v == 0.0 {
        "0".to_string()
    } else if v.abs() < 0.1 {
        format!("{v:.3}")
    } else if v.abs() < 100.0 {
        format!("{v:.2}")
    } else {
        format!("{v:.0}")
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
    out
}

/// Bar fill palette.
pub mod colors {
    /// Blue.
    pub const BLUE: &str = "#3498db";
    /// Red.
    pub const RED: &str = "#e74c3c";
    /// Green.
    pub const GREEN: &str = "#27ae60";
    /// Orange.
    pub const ORANGE: &str = "#e67e22";
    /// Purple.
    pub const PURPLE: &str = "#9b59b6";
    /// Teal.
    pub const TEAL: &str = "#16a085";

    const PALETTE: [&str; 6] = [BLUE, RED, GREEN, ORANGE, PURPLE, TEAL];

    /// Color for the `i`-th bar, cycling through the palette.
    #[must_use]
    pub fn nth(i: usize) -> &'static str {
        PALETTE[i % PALETTE.len()]
    }
}
