//! The A-23 reference grid: empirical share of applicants with at least one
//! acceptance, by GPA bin and MCAT bin, plus the number of applicants per cell.

use ndarray::{Array2, arr2};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridError {
    #[error("Failed to read grid file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse grid TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Grid {what} has shape {found:?}; expected {expected:?}.")]
    Shape {
        what: &'static str,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Grid rate {0} is outside [0, 1].")]
    RateOutOfRange(f64),
}

/// One cell of the grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridCell<'a> {
    pub gpa_label: &'a str,
    pub mcat_label: &'a str,
    /// Representative GPA and MCAT of the bin.
    pub gpa: f64,
    pub mcat: f64,
    pub rate: f64,
    pub applicants: f64,
}

/// Rows are GPA bins (low to high), columns MCAT bins (low to high).
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceGrid {
    pub gpa_labels: Vec<String>,
    pub gpa_centers: Vec<f64>,
    pub mcat_labels: Vec<String>,
    pub mcat_centers: Vec<f64>,
    /// Fraction in [0, 1].
    pub rates: Array2<f64>,
    pub applicants: Array2<f64>,
}

/// On-disk layout. Rates are percentages, as published.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GridFile {
    gpa_labels: Vec<String>,
    gpa_centers: Vec<f64>,
    mcat_labels: Vec<String>,
    mcat_centers: Vec<f64>,
    rates_percent: Vec<Vec<f64>>,
    applicants: Vec<Vec<f64>>,
}

fn to_matrix(rows: &[Vec<f64>], what: &'static str, shape: (usize, usize)) -> Result<Array2<f64>, GridError> {
    let found = (rows.len(), rows.first().map_or(0, Vec::len));
    if found != shape || rows.iter().any(|r| r.len() != shape.1) {
        return Err(GridError::Shape {
            what,
            expected: shape,
            found,
        });
    }
    Ok(Array2::from_shape_fn(shape, |(i, j)| rows[i][j]))
}

const GPA_LABELS: [&str; 10] = [
    "<2.20", "2.20-2.39", "2.40-2.59", "2.60-2.79", "2.80-2.99", "3.00-3.19", "3.20-3.39",
    "3.40-3.59", "3.60-3.79", ">=3.80",
];
const GPA_CENTERS: [f64; 10] = [2.00, 2.30, 2.50, 2.70, 2.90, 3.10, 3.30, 3.50, 3.70, 3.90];
const MCAT_LABELS: [&str; 10] = [
    "<486", "486-489", "490-493", "494-497", "498-501", "502-505", "506-509", "510-513",
    "514-517", ">517",
];
const MCAT_CENTERS: [f64; 10] = [483.0, 487.5, 491.5, 495.5, 499.5, 503.5, 507.5, 511.5, 515.5, 521.0];

impl ReferenceGrid {
    /// The aggregate A-23 table bundled with the crate.
    pub fn builtin() -> Self {
        let rates_percent = arr2(&[
            [0.4, 0.5, 0.7, 0.9, 1.3, 2.0, 3.0, 5.0, 9.0, 15.0],
            [0.5, 0.6, 0.8, 1.1, 1.6, 2.4, 3.5, 6.0, 12.0, 20.0],
            [0.6, 0.7, 1.0, 1.4, 2.0, 3.0, 4.5, 8.0, 15.0, 25.0],
            [0.7, 0.9, 1.2, 1.8, 2.5, 3.8, 6.0, 11.0, 20.0, 32.0],
            [0.9, 1.1, 1.5, 2.4, 3.5, 5.0, 8.5, 15.0, 27.0, 40.0],
            [1.2, 1.4, 2.0, 3.3, 5.0, 7.6, 12.7, 21.6, 35.6, 50.0],
            [1.8, 2.2, 3.0, 4.4, 7.1, 11.5, 18.0, 28.9, 43.6, 60.4],
            [2.3, 3.0, 4.4, 6.7, 11.0, 16.6, 25.9, 39.0, 54.8, 69.6],
            [3.6, 4.3, 7.4, 10.3, 16.6, 24.6, 35.5, 49.6, 65.1, 78.5],
            [6.0, 7.2, 11.0, 16.4, 24.5, 33.7, 45.0, 59.6, 73.8, 84.9],
        ]);
        let applicants = arr2(&[
            [142.0, 244.0, 319.0, 344.0, 304.0, 221.0, 131.0, 64.0, 26.0, 5.0],
            [97.0, 188.0, 275.0, 330.0, 325.0, 263.0, 175.0, 95.0, 43.0, 10.0],
            [105.0, 231.0, 376.0, 503.0, 553.0, 498.0, 369.0, 224.0, 112.0, 31.0],
            [98.0, 242.0, 440.0, 657.0, 804.0, 808.0, 667.0, 451.0, 251.0, 81.0],
            [86.0, 242.0, 491.0, 816.0, 1114.0, 1248.0, 1148.0, 866.0, 537.0, 201.0],
            [81.0, 256.0, 579.0, 1073.0, 1633.0, 2039.0, 2090.0, 1758.0, 1214.0, 528.0],
            [58.0, 207.0, 520.0, 1075.0, 1824.0, 2539.0, 2902.0, 2721.0, 2095.0, 1059.0],
            [44.0, 179.0, 503.0, 1159.0, 2191.0, 3400.0, 4331.0, 4528.0, 3885.0, 2280.0],
            [32.0, 146.0, 455.0, 1170.0, 2465.0, 4265.0, 6056.0, 7058.0, 6752.0, 4600.0],
            [23.0, 118.0, 413.0, 1182.0, 2777.0, 5356.0, 8478.0, 11015.0, 11745.0, 9292.0],
        ]);
        Self {
            gpa_labels: GPA_LABELS.iter().map(|s| s.to_string()).collect(),
            gpa_centers: GPA_CENTERS.to_vec(),
            mcat_labels: MCAT_LABELS.iter().map(|s| s.to_string()).collect(),
            mcat_centers: MCAT_CENTERS.to_vec(),
            rates: rates_percent / 100.0,
            applicants,
        }
    }

    pub fn from_toml_str(text: &str) -> Result<Self, GridError> {
        let file: GridFile = toml::from_str(text)?;
        let shape = (file.gpa_centers.len(), file.mcat_centers.len());
        if file.gpa_labels.len() != shape.0 || file.mcat_labels.len() != shape.1 {
            return Err(GridError::Shape {
                what: "labels",
                expected: shape,
                found: (file.gpa_labels.len(), file.mcat_labels.len()),
            });
        }
        let rates = to_matrix(&file.rates_percent, "rates_percent", shape)? / 100.0;
        if let Some(&bad) = rates.iter().find(|r| !(0.0..=1.0).contains(*r)) {
            return Err(GridError::RateOutOfRange(bad));
        }
        Ok(Self {
            applicants: to_matrix(&file.applicants, "applicants", shape)?,
            gpa_labels: file.gpa_labels,
            gpa_centers: file.gpa_centers,
            mcat_labels: file.mcat_labels,
            mcat_centers: file.mcat_centers,
            rates,
        })
    }

    pub fn load(path: &Path) -> Result<Self, GridError> {
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    pub fn shape(&self) -> (usize, usize) {
        self.rates.dim()
    }

    pub fn total_applicants(&self) -> f64 {
        self.applicants.sum()
    }

    /// Cells in row-major order (GPA outer, MCAT inner).
    pub fn cells(&self) -> impl Iterator<Item = GridCell<'_>> {
        let (rows, cols) = self.shape();
        (0..rows).flat_map(move |i| {
            (0..cols).map(move |j| GridCell {
                gpa_label: &self.gpa_labels[i],
                mcat_label: &self.mcat_labels[j],
                gpa: self.gpa_centers[i],
                mcat: self.mcat_centers[j],
                rate: self.rates[[i, j]],
                applicants: self.applicants[[i, j]],
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_grid_is_monotone_in_both_directions() {
        let grid = ReferenceGrid::builtin();
        assert_eq!(grid.shape(), (10, 10));
        for i in 0..10 {
            for j in 1..10 {
                assert!(grid.rates[[i, j]] > grid.rates[[i, j - 1]]);
                assert!(grid.rates[[j, i]] > grid.rates[[j - 1, i]]);
            }
        }
        assert_eq!(grid.cells().count(), 100);
        assert!(grid.total_applicants() > 100_000.0);
    }

    #[test]
    fn grid_file_shape_is_checked() {
        let text = r#"
gpa_labels = ["low", "high"]
gpa_centers = [3.0, 3.8]
mcat_labels = ["low", "high"]
mcat_centers = [500.0, 515.0]
rates_percent = [[5.0, 20.0], [15.0]]
applicants = [[10.0, 10.0], [10.0, 10.0]]
"#;
        assert!(matches!(
            ReferenceGrid::from_toml_str(text),
            Err(GridError::Shape { what: "rates_percent", .. })
        ));

        let fixed = text.replace("[15.0]]", "[15.0, 60.0]]");
        let grid = ReferenceGrid::from_toml_str(&fixed).unwrap();
        let last = grid.cells().last().unwrap();
        assert_eq!(last.gpa_label, "high");
        assert!((last.rate - 0.60).abs() < 1e-12);
    }
}
