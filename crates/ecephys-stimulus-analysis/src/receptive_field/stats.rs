// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Receptive-field summary statistics in grid-index units.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use super::gaussian_fit::{axis_spread, fit_gaussian, moments, FitOptions, Gaussian2D};
use super::grid::ReceptiveFieldGrid;
use super::threshold::threshold_region;

/// How `RfStats::area` is measured
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AreaMode {
    /// Cells in the selected above-threshold component
    #[default]
    Cells,
    /// Area of the fitted Gaussian above `threshold` times its peak,
    /// `π · width · height · (-2 ln threshold)`; NaN unless the fit converged
    FittedEllipse,
}

impl From<ecephys_config::AreaModeSetting> for AreaMode {
    fn from(setting: ecephys_config::AreaModeSetting) -> Self {
        match setting {
            ecephys_config::AreaModeSetting::Cells => AreaMode::Cells,
            ecephys_config::AreaModeSetting::FittedEllipse => AreaMode::FittedEllipse,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RfStatsOptions {
    pub area_mode: AreaMode,
    pub fit: FitOptions,
}

impl Default for RfStatsOptions {
    fn default() -> Self {
        Self {
            area_mode: AreaMode::Cells,
            fit: FitOptions::default(),
        }
    }
}

/// Center, spread and area of a receptive field
///
/// `azimuth` is the column coordinate and `elevation` the row coordinate.
/// `width` is the spread down the rows (elevation axis) and `height` the
/// spread along the columns (azimuth axis).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RfStats {
    pub azimuth: f64,
    pub elevation: f64,
    pub width: f64,
    pub height: f64,
    pub area: f64,
    pub found: bool,
}

impl RfStats {
    /// No receptive field: NaN everywhere, `found = false`
    pub fn missing() -> Self {
        Self {
            azimuth: f64::NAN,
            elevation: f64::NAN,
            width: f64::NAN,
            height: f64::NAN,
            area: f64::NAN,
            found: false,
        }
    }

    /// `(azimuth, elevation, width, height, area, found)`
    pub fn as_tuple(&self) -> (f64, f64, f64, f64, f64, bool) {
        (self.azimuth, self.elevation, self.width, self.height, self.area, self.found)
    }
}

/// [`rf_stats_with`] using cell-count area and the default fit settings
pub fn rf_stats(values: &Array2<f64>, threshold: f64) -> RfStats {
    rf_stats_with(values, threshold, &RfStatsOptions::default())
}

/// Summary statistics of a response grid indexed `[elevation][azimuth]`
///
/// * A flat grid selects no cells: center NaN, area 0. The spread still
///   comes from the Gaussian fit.
/// * A grid without mass (all zero) yields NaN everywhere and
///   `found = false`.
/// * A single non-zero cell yields zero spread with `found = true`.
/// * Mass confined to one row or one column skips the fit; the spread is
///   zero across the line and its second moment along it.
/// * When the selected region covers most of the border the field is
///   suppressive and the grid is inverted before thresholding again.
/// * A fit that does not converge keeps the moment-estimate spread and
///   reports `found = false`.
pub fn rf_stats_with(values: &Array2<f64>, threshold: f64, options: &RfStatsOptions) -> RfStats {
    let mut region = threshold_region(values, threshold);
    let mut working = values.clone();

    if region.covers_border() {
        let peak = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        working = values.mapv(|v| peak - v);
        region = threshold_region(&working, threshold);
        tracing::trace!(target: "ecephys_stimulus_analysis", "inverted suppressive receptive field");
    }

    let Some(start) = moments(&working) else {
        return RfStats::missing();
    };

    let Some((row_spread, col_spread)) = axis_spread(&working) else {
        return RfStats::missing();
    };

    let cell_area = |width: f64, height: f64, found: bool| match options.area_mode {
        AreaMode::Cells => region.area,
        AreaMode::FittedEllipse if found => {
            std::f64::consts::PI * width * height * (-2.0 * threshold.ln())
        }
        AreaMode::FittedEllipse => f64::NAN,
    };

    if row_spread == 0.0 || col_spread == 0.0 {
        return RfStats {
            azimuth: region.azimuth,
            elevation: region.elevation,
            width: row_spread,
            height: col_spread,
            area: cell_area(row_spread, col_spread, true),
            found: true,
        };
    }

    // opposite-center seed widths are zero when the center row or column
    // holds a single cell
    let seed = Gaussian2D {
        row_width: if start.row_width > 0.0 { start.row_width } else { row_spread },
        col_width: if start.col_width > 0.0 { start.col_width } else { col_spread },
        ..start
    };

    let outcome = fit_gaussian(&working, seed, &options.fit);
    let (width, height) = if outcome.converged {
        (outcome.params.row_width.abs(), outcome.params.col_width.abs())
    } else {
        tracing::debug!(
            target: "ecephys_stimulus_analysis",
            iterations = outcome.iterations,
            "gaussian fit did not converge; using moment estimates"
        );
        (seed.row_width.abs(), seed.col_width.abs())
    };

    RfStats {
        azimuth: region.azimuth,
        elevation: region.elevation,
        width,
        height,
        area: cell_area(width, height, outcome.converged),
        found: outcome.converged,
    }
}

/// Center strictly inside the grid on both axes (fractional indices)
pub fn rf_on_screen(grid: &ReceptiveFieldGrid, azimuth: f64, elevation: f64) -> bool {
    azimuth > 0.0
        && azimuth < grid.n_azimuths() as f64
        && elevation > 0.0
        && elevation < grid.n_elevations() as f64
}
