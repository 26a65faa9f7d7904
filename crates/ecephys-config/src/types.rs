// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration type definitions
//!
//! This module defines all configuration structs that map to sections in
//! `ecephys_configuration.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct EcephysConfig {
    pub system: SystemConfig,
    pub stimulus: StimulusConfig,
    pub psth: PsthConfig,
    pub receptive_field: ReceptiveFieldConfig,
    pub running: RunningConfig,
    pub logging: LoggingConfig,
}

/// System-level configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SystemConfig {
    pub log_level: String,
    /// Worker threads for per-unit metrics (0 = rayon default)
    pub max_threads: usize,
    pub parallel: bool,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            max_threads: 0,
            parallel: true,
        }
    }
}

/// Which presentations make up the mapping stimulus and how they are parameterised
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StimulusConfig {
    pub stimulus_name: String,
    pub azimuth_column: String,
    pub elevation_column: String,
    /// Seconds
    pub trial_duration: f64,
    /// Seconds added to every display timestamp
    pub monitor_delay: f64,
}

impl Default for StimulusConfig {
    fn default() -> Self {
        Self {
            stimulus_name: "gabors".to_string(),
            azimuth_column: "x_position".to_string(),
            elevation_column: "y_position".to_string(),
            trial_duration: 0.25,
            monitor_delay: 0.0,
        }
    }
}

/// Peri-stimulus time histogram binning
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PsthConfig {
    pub bin_width: f64,
    pub window_start: f64,
    /// Defaults to `stimulus.trial_duration` when unset
    pub window_end: Option<f64>,
}

impl Default for PsthConfig {
    fn default() -> Self {
        Self {
            bin_width: 0.001,
            window_start: 0.0,
            window_end: None,
        }
    }
}

impl PsthConfig {
    /// End of the PSTH window, falling back to the trial duration
    pub fn resolved_window_end(&self, stimulus: &StimulusConfig) -> f64 {
        self.window_end.unwrap_or(stimulus.trial_duration)
    }
}

/// Area interpretation used by receptive-field statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaModeSetting {
    /// Count of cells in the thresholded component
    Cells,
    /// Area of the fitted Gaussian above the threshold fraction of its peak
    FittedEllipse,
}

/// Receptive-field estimation parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReceptiveFieldConfig {
    pub mask_threshold: f64,
    pub minimum_spike_count: f64,
    pub area_mode: AreaModeSetting,
    pub shuffle_count: usize,
    pub shuffle_seed: u64,
    pub max_fit_iterations: usize,
}

impl Default for ReceptiveFieldConfig {
    fn default() -> Self {
        Self {
            mask_threshold: 0.5,
            minimum_spike_count: 10.0,
            area_mode: AreaModeSetting::Cells,
            shuffle_count: 1000,
            shuffle_seed: 0,
            max_fit_iterations: 200,
        }
    }
}

/// Running-modulation parameters
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RunningConfig {
    /// cm/s; trials at or above this mean speed count as running
    pub speed_threshold: f64,
}

impl Default for RunningConfig {
    fn default() -> Self {
        Self { speed_threshold: 1.0 }
    }
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub format: LogFormat,
    pub log_dir: PathBuf,
    pub retention_days: u64,
    pub retention_runs: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            log_dir: PathBuf::from("./logs"),
            retention_days: 30,
            retention_runs: 10,
        }
    }
}
