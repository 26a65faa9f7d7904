// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Receptive-field estimation.
//!
//! - **grid**: per-unit azimuth × elevation response maps
//! - **smoothing**: separable Gaussian filter
//! - **threshold**: strongest above-threshold component and its centroid
//! - **gaussian_fit**: moment seed and Levenberg–Marquardt fit
//! - **stats**: [`rf_stats`] combining the above

pub mod gaussian_fit;
pub mod grid;
pub mod smoothing;
pub mod stats;
pub mod threshold;

pub use gaussian_fit::{axis_spread, fit_gaussian, moments, FitOptions, FitOutcome, Gaussian2D};
pub use grid::{GridValue, ReceptiveFieldGrid};
pub use smoothing::gaussian_filter;
pub use stats::{rf_on_screen, rf_stats, rf_stats_with, AreaMode, RfStats, RfStatsOptions};
pub use threshold::{threshold_region, ThresholdRegion};
