//! Normalized measurement table.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::stats::mean;

/// A column that can serve as the dependent variable of a model.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Measure {
    /// Intensity inside the sequestration region.
    IntIn,
    /// Total intensity.
    IntTot,
    /// `int_in / int_tot`.
    #[default]
    FracIn,
}

impl Measure {
    /// All modelable columns.
    pub const ALL: [Self; 3] = [Self::IntIn, Self::IntTot, Self::FracIn];

    /// Canonical snake_case name.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::IntIn => "int_in",
            Self::IntTot => "int_tot",
            Self::FracIn => "frac_in",
        }
    }

    /// Read this column from a measurement.
    #[must_use]
    pub fn value(self, m: &Measurement) -> f64 {
        match self {
            Self::IntIn => m.int_in,
            Self::IntTot => m.int_tot,
            Self::FracIn => m.frac_in,
        }
    }

    fn supported() -> String {
        Self::ALL.map(Self::name).join(", ")
    }
}

impl fmt::Display for Measure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Measure {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "int_in" | "intIn" => Ok(Self::IntIn),
            "int_tot" | "intTot" => Ok(Self::IntTot),
            "frac_in" | "fracIn" => Ok(Self::FracIn),
            other => Err(Error::UnsupportedDependentVariable {
                name: other.to_string(),
                supported: Self::supported(),
            }),
        }
    }
}

/// One retained image-series measurement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    /// Physical image the series belongs to; the random-effect unit.
    pub image_id: String,
    /// Source file name.
    pub file: String,
    /// Series index within the image.
    pub series: u32,
    /// Experimental condition.
    pub group: String,
    /// Intensity inside the region of interest.
    pub int_in: f64,
    /// Total intensity.
    pub int_tot: f64,
    /// Fraction of intensity inside.
    pub frac_in: f64,
}

/// One image collapsed to the mean of its series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageSummary {
    /// Image identifier.
    pub image_id: String,
    /// First file seen for the image.
    pub file: String,
    /// First series seen for the image.
    pub series: u32,
    /// Group of the image.
    pub group: String,
    /// Mean of the measure across series.
    pub mean: f64,
    /// Number of series rows that were averaged.
    pub sample_size: usize,
}

/// Normalized table of measurements, one row per image series.
///
/// Row order follows the input; nothing downstream depends on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MeasurementTable {
    rows: Vec<Measurement>,
}

impl MeasurementTable {
    /// Build a table, checking that every image belongs to a single group.
    pub fn new(rows: Vec<Measurement>) -> Result<Self> {
        let mut seen: BTreeMap<&str, &str> = BTreeMap::new();
        for row in &rows {
            match seen.get(row.image_id.as_str()).copied() {
                Some(group) if group != row.group => {
                    return Err(Error::InconsistentImageGroup {
                        image_id: row.image_id.clone(),
                        first: group.to_string(),
                        second: row.group.clone(),
                    });
                }
                Some(_) => {}
                None => {
                    seen.insert(&row.image_id, &row.group);
                }
            }
        }
        Ok(Self { rows })
    }

    /// All rows.
    #[must_use]
    pub fn rows(&self) -> &[Measurement] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Sorted unique group labels.
    #[must_use]
    pub fn groups(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.rows.iter().map(|r| r.group.as_str()).collect();
        set.into_iter().map(String::from).collect()
    }

    /// Values of `measure` for one group.
    #[must_use]
    pub fn values(&self, measure: Measure, group: &str) -> Vec<f64> {
        self.rows
            .iter()
            .filter(|r| r.group == group)
            .map(|r| measure.value(r))
            .collect()
    }

    /// Map from image id to its group.
    #[must_use]
    pub fn image_groups(&self) -> BTreeMap<String, String> {
        self.rows
            .iter()
            .map(|r| (r.image_id.clone(), r.group.clone()))
            .collect()
    }

    /// Number of distinct images.
    #[must_use]
    pub fn image_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.image_id.as_str())
            .collect::<BTreeSet<_>>()
            .len()
    }

    /// Collapse series to one value per image (mean of `measure`).
    ///
    /// Output is sorted by image id.
    #[must_use]
    pub fn collapse_per_image(&self, measure: Measure) -> Vec<ImageSummary> {
        let mut by_image: BTreeMap<&str, Vec<&Measurement>> = BTreeMap::new();
        for row in &self.rows {
            by_image.entry(&row.image_id).or_default().push(row);
        }

        by_image
            .into_iter()
            .map(|(image_id, rows)| {
                let values: Vec<f64> = rows.iter().map(|r| measure.value(r)).collect();
                let first = rows[0];
                ImageSummary {
                    image_id: image_id.to_string(),
                    file: first.file.clone(),
                    series: first.series,
                    group: first.group.clone(),
                    mean: mean(&values),
                    sample_size: rows.len(),
                }
            })
            .collect()
    }
}

#[cfg(test)]
pub(crate) fn measurement(image_id: &str, series: u32, group: &str, frac_in: f64) -> Measurement {
    Measurement {
        image_id: image_id.to_string(),
        file: format!("{image_id}_s{series}.tif"),
        series,
        group: group.to_string(),
        int_in: frac_in * 100.0,
        int_tot: 100.0,
        frac_in,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_measure_parse() {
        assert_eq!("fracIn".parse::<Measure>().unwrap(), Measure::FracIn);
        assert_eq!("int_tot".parse::<Measure>().unwrap(), Measure::IntTot);
        assert!(matches!(
            "area".parse::<Measure>(),
            Err(Error::UnsupportedDependentVariable { .. })
        ));
    }

    #[test]
    fn test_inconsistent_image_group() {
        let rows = vec![measurement("A_1", 1, "A", 0.1), measurement("A_1", 2, "B", 0.2)];
        let err = MeasurementTable::new(rows).unwrap_err();
        match err {
            Error::InconsistentImageGroup { image_id, first, second } => {
                assert_eq!(image_id, "A_1");
                assert_eq!(first, "A");
                assert_eq!(second, "B");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_groups_sorted() {
        let table = MeasurementTable::new(vec![
            measurement("C_1", 1, "C", 0.1),
            measurement("A_1", 1, "A", 0.2),
            measurement("C_2", 1, "C", 0.3),
        ])
        .unwrap();
        assert_eq!(table.groups(), vec!["A", "C"]);
        assert_eq!(table.values(Measure::FracIn, "C"), vec![0.1, 0.3]);
        assert_eq!(table.image_count(), 3);
    }

    #[test]
    fn test_collapse_per_image() {
        let table = MeasurementTable::new(vec![
            measurement("A_1", 1, "A", 0.2),
            measurement("A_1", 2, "A", 0.4),
            measurement("B_1", 1, "B", 0.5),
        ])
        .unwrap();

        let collapsed = table.collapse_per_image(Measure::FracIn);
        assert_eq!(collapsed.len(), 2);
        assert_eq!(collapsed[0].image_id, "A_1");
        assert_eq!(collapsed[0].sample_size, 2);
        assert!((collapsed[0].mean - 0.3).abs() < 1e-12);
        assert_eq!(collapsed[1].sample_size, 1);
    }
}
