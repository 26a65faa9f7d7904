// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Above-threshold region of a response grid.
//!
//! The grid is smoothed, cells above `max - threshold * std` of the smoothed
//! values are selected, and only the 4-connected component holding the
//! strongest smoothed response is kept.

use ndarray::Array2;

use super::smoothing::gaussian_filter;

const SMOOTHING_SIGMA: f64 = 1.0;

/// Selected component with its centroid in fractional grid indices
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdRegion {
    pub mask: Array2<bool>,
    /// Column centroid
    pub azimuth: f64,
    /// Row centroid
    pub elevation: f64,
    /// Cell count
    pub area: f64,
}

impl ThresholdRegion {
    fn empty(dim: (usize, usize)) -> Self {
        Self {
            mask: Array2::from_elem(dim, false),
            azimuth: f64::NAN,
            elevation: f64::NAN,
            area: 0.0,
        }
    }

    /// More than half of the border cells selected
    ///
    /// A region that wraps the grid edge means the unit is suppressed by the
    /// stimulus rather than driven by it.
    pub fn covers_border(&self) -> bool {
        let (rows, cols) = self.mask.dim();
        let mut border = 0usize;
        let mut selected = 0usize;
        for ((row, col), &inside) in self.mask.indexed_iter() {
            if row == 0 || col == 0 || row + 1 == rows || col + 1 == cols {
                border += 1;
                if inside {
                    selected += 1;
                }
            }
        }
        selected as f64 > border as f64 / 2.0
    }
}

fn population_std(values: &Array2<f64>) -> f64 {
    let n = values.len() as f64;
    let mean = values.sum() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

fn max_value(values: &Array2<f64>) -> f64 {
    values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
}

fn min_value(values: &Array2<f64>) -> f64 {
    values.iter().copied().fold(f64::INFINITY, f64::min)
}

/// Labels 4-connected components of `mask`; returns the component id map and
/// the id whose peak in `strength` is largest (first in row-major order on ties)
fn strongest_component(mask: &Array2<bool>, strength: &Array2<f64>) -> (Array2<usize>, Option<usize>) {
    let (rows, cols) = mask.dim();
    let mut labels = Array2::<usize>::zeros((rows, cols));
    let mut next_label = 0usize;
    let mut best: Option<(usize, f64)> = None;
    let mut stack = Vec::new();

    for ((row, col), &inside) in mask.indexed_iter() {
        if !inside || labels[[row, col]] != 0 {
            continue;
        }
        next_label += 1;
        labels[[row, col]] = next_label;
        stack.push((row, col));
        let mut peak = f64::NEG_INFINITY;

        while let Some((r, c)) = stack.pop() {
            peak = peak.max(strength[[r, c]]);
            let neighbours = [
                (r.wrapping_sub(1), c),
                (r + 1, c),
                (r, c.wrapping_sub(1)),
                (r, c + 1),
            ];
            for (nr, nc) in neighbours {
                if nr < rows && nc < cols && mask[[nr, nc]] && labels[[nr, nc]] == 0 {
                    labels[[nr, nc]] = next_label;
                    stack.push((nr, nc));
                }
            }
        }

        if best.map_or(true, |(_, best_peak)| peak > best_peak) {
            best = Some((next_label, peak));
        }
    }

    (labels, best.map(|(label, _)| label))
}

/// Threshold `values` at fraction `threshold` of a standard deviation below
/// the smoothed peak
///
/// A flat grid (`max == min`, including all zero) selects nothing: NaN
/// centroid, zero area.
pub fn threshold_region(values: &Array2<f64>, threshold: f64) -> ThresholdRegion {
    let dim = values.dim();
    if values.is_empty() || max_value(values) == min_value(values) {
        return ThresholdRegion::empty(dim);
    }

    let smoothed = gaussian_filter(values, SMOOTHING_SIGMA);
    let cutoff = max_value(&smoothed) - population_std(&smoothed) * threshold;
    let above = smoothed.mapv(|v| v > cutoff);

    let (labels, best) = strongest_component(&above, &smoothed);
    let Some(best) = best else {
        return ThresholdRegion::empty(dim);
    };

    let mask = labels.mapv(|label| label == best);
    let mut count = 0usize;
    let mut row_sum = 0.0;
    let mut col_sum = 0.0;
    for ((row, col), &inside) in mask.indexed_iter() {
        if inside {
            count += 1;
            row_sum += row as f64;
            col_sum += col as f64;
        }
    }

    ThresholdRegion {
        azimuth: col_sum / count as f64,
        elevation: row_sum / count as f64,
        area: count as f64,
        mask,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_flat_grid_selects_nothing() {
        let region = threshold_region(&Array2::from_elem((9, 9), 5.2), 0.5);
        assert!(region.azimuth.is_nan());
        assert!(region.elevation.is_nan());
        assert_eq!(region.area, 0.0);
        assert!(!region.mask.iter().any(|&m| m));
    }

    #[test]
    fn test_single_peak() {
        let mut values = Array2::<f64>::zeros((9, 9));
        values[[2, 6]] = 10.0;
        let region = threshold_region(&values, 0.5);
        assert_eq!(region.azimuth, 6.0);
        assert_eq!(region.elevation, 2.0);
        assert_eq!(region.area, 1.0);
        assert!(!region.covers_border());
    }

    #[test]
    fn test_keeps_strongest_component() {
        let mut values = Array2::<f64>::zeros((15, 15));
        values[[2, 2]] = 10.0;
        values[[12, 12]] = 20.0;
        let region = threshold_region(&values, 0.5);
        assert!(region.mask[[12, 12]]);
        assert!(!region.mask[[2, 2]]);
        assert_eq!((region.elevation, region.azimuth), (12.0, 12.0));
    }

    #[test]
    fn test_strongest_component_labels() {
        let mask = array![[true, false, true], [true, false, false], [false, false, true]];
        let strength = array![[1.0, 0.0, 5.0], [2.0, 0.0, 0.0], [0.0, 0.0, 3.0]];
        let (labels, best) = strongest_component(&mask, &strength);
        assert_eq!(labels[[0, 0]], labels[[1, 0]]);
        assert_ne!(labels[[0, 0]], labels[[0, 2]]);
        assert_eq!(best, Some(labels[[0, 2]]));
    }

    #[test]
    fn test_border_coverage() {
        let mut mask = Array2::from_elem((3, 3), true);
        mask[[1, 1]] = false;
        let region = ThresholdRegion {
            mask,
            azimuth: 1.0,
            elevation: 1.0,
            area: 8.0,
        };
        assert!(region.covers_border());
    }
}
