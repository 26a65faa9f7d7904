// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration file loading with override support
//!
//! This module implements the 3-tier configuration loading system:
//! 1. TOML file (base defaults)
//! 2. Environment variables (runtime overrides)
//! 3. CLI arguments (explicit user overrides)

use crate::{AreaModeSetting, ConfigError, ConfigResult, EcephysConfig};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "ecephys_configuration.toml";

/// Find the ecephys configuration file
///
/// Search order:
/// 1. `ECEPHYS_CONFIG_PATH` environment variable
/// 2. Current working directory: `./ecephys_configuration.toml`
/// 3. Up to 5 parent directories
///
/// # Errors
///
/// Returns `ConfigError::FileNotFound` if no config file is found in any location
pub fn find_config_file() -> ConfigResult<PathBuf> {
    if let Ok(env_path) = env::var("ECEPHYS_CONFIG_PATH") {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        } else {
            return Err(ConfigError::FileNotFound(format!(
                "Config file specified by ECEPHYS_CONFIG_PATH not found: {}",
                path.display()
            )));
        }
    }

    let mut search_paths = Vec::new();

    if let Ok(cwd) = env::current_dir() {
        search_paths.push(cwd.join(CONFIG_FILE_NAME));

        let mut current = cwd.clone();
        for _ in 0..5 {
            if let Some(parent) = current.parent() {
                search_paths.push(parent.join(CONFIG_FILE_NAME));
                current = parent.to_path_buf();
            }
        }
    }

    for path in &search_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let search_list = search_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::FileNotFound(format!(
        "Configuration file '{}' not found in any of these locations:\n{}\n\nSet ECEPHYS_CONFIG_PATH environment variable to specify custom location.",
        CONFIG_FILE_NAME, search_list
    )))
}

/// Load configuration from TOML file
///
/// # Arguments
///
/// * `config_path` - Optional path to config file. If `None`, will search for config file.
/// * `cli_args` - Optional CLI argument overrides
///
/// # Errors
///
/// Returns error if config file is not found or contains invalid TOML
pub fn load_config(
    config_path: Option<&Path>,
    cli_args: Option<&HashMap<String, String>>,
) -> ConfigResult<EcephysConfig> {
    let config_file = if let Some(path) = config_path {
        path.to_path_buf()
    } else {
        find_config_file()?
    };

    let content = fs::read_to_string(&config_file)?;
    let mut config: EcephysConfig = toml::from_str(&content)?;

    apply_environment_overrides(&mut config);

    if let Some(cli) = cli_args {
        apply_cli_overrides(&mut config, cli)?;
    }

    Ok(config)
}

fn parse_bool(value: &str) -> bool {
    let value = value.to_lowercase();
    value == "true" || value == "1" || value == "yes"
}

fn parse_area_mode(value: &str) -> Option<AreaModeSetting> {
    match value.to_lowercase().as_str() {
        "cells" => Some(AreaModeSetting::Cells),
        "fitted_ellipse" => Some(AreaModeSetting::FittedEllipse),
        _ => None,
    }
}

/// Apply environment variable overrides to configuration
///
/// Supported environment variables:
/// - `ECEPHYS_LOG_LEVEL` -> `system.log_level`
/// - `ECEPHYS_MAX_THREADS` -> `system.max_threads`
/// - `ECEPHYS_PARALLEL` -> `system.parallel`
/// - `ECEPHYS_STIMULUS_NAME` -> `stimulus.stimulus_name`
/// - `ECEPHYS_MONITOR_DELAY` -> `stimulus.monitor_delay`
/// - `ECEPHYS_PSTH_BIN_WIDTH` -> `psth.bin_width`
/// - `ECEPHYS_MASK_THRESHOLD` -> `receptive_field.mask_threshold`
/// - `ECEPHYS_SHUFFLE_SEED` -> `receptive_field.shuffle_seed`
/// - `ECEPHYS_AREA_MODE` -> `receptive_field.area_mode`
/// - `ECEPHYS_RUN_SPEED_THRESHOLD` -> `running.speed_threshold`
///
/// Unparseable numeric values are ignored, leaving the file value in place.
pub fn apply_environment_overrides(config: &mut EcephysConfig) {
    if let Ok(value) = env::var("ECEPHYS_LOG_LEVEL") {
        config.system.log_level = value;
    }
    if let Ok(value) = env::var("ECEPHYS_MAX_THREADS") {
        if let Ok(threads) = value.parse::<usize>() {
            config.system.max_threads = threads;
        }
    }
    if let Ok(value) = env::var("ECEPHYS_PARALLEL") {
        config.system.parallel = parse_bool(&value);
    }

    if let Ok(value) = env::var("ECEPHYS_STIMULUS_NAME") {
        config.stimulus.stimulus_name = value;
    }
    if let Ok(value) = env::var("ECEPHYS_MONITOR_DELAY") {
        if let Ok(delay) = value.parse::<f64>() {
            config.stimulus.monitor_delay = delay;
        }
    }

    if let Ok(value) = env::var("ECEPHYS_PSTH_BIN_WIDTH") {
        if let Ok(width) = value.parse::<f64>() {
            config.psth.bin_width = width;
        }
    }

    if let Ok(value) = env::var("ECEPHYS_MASK_THRESHOLD") {
        if let Ok(threshold) = value.parse::<f64>() {
            config.receptive_field.mask_threshold = threshold;
        }
    }
    if let Ok(value) = env::var("ECEPHYS_SHUFFLE_SEED") {
        if let Ok(seed) = value.parse::<u64>() {
            config.receptive_field.shuffle_seed = seed;
        }
    }
    if let Ok(value) = env::var("ECEPHYS_AREA_MODE") {
        if let Some(mode) = parse_area_mode(&value) {
            config.receptive_field.area_mode = mode;
        }
    }

    if let Ok(value) = env::var("ECEPHYS_RUN_SPEED_THRESHOLD") {
        if let Ok(threshold) = value.parse::<f64>() {
            config.running.speed_threshold = threshold;
        }
    }
}

/// Apply CLI argument overrides to configuration
///
/// # Arguments
///
/// * `config` - Configuration to modify
/// * `cli_args` - HashMap of CLI arguments (e.g., `{"mask_threshold": "0.4", "bin_width": "0.002"}`)
///
/// # Errors
///
/// Unlike environment overrides, an unparseable CLI value is reported as
/// `ConfigError::InvalidValue`.
pub fn apply_cli_overrides(
    config: &mut EcephysConfig,
    cli_args: &HashMap<String, String>,
) -> ConfigResult<()> {
    fn parse<T: std::str::FromStr>(key: &str, value: &str) -> ConfigResult<T> {
        value
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(format!("{} = {:?}", key, value)))
    }

    if let Some(value) = cli_args.get("log_level") {
        config.system.log_level = value.clone();
    }
    if let Some(value) = cli_args.get("max_threads") {
        config.system.max_threads = parse("max_threads", value)?;
    }
    if let Some(value) = cli_args.get("parallel") {
        config.system.parallel = parse_bool(value);
    }

    if let Some(value) = cli_args.get("stimulus_name") {
        config.stimulus.stimulus_name = value.clone();
    }
    if let Some(value) = cli_args.get("azimuth_column") {
        config.stimulus.azimuth_column = value.clone();
    }
    if let Some(value) = cli_args.get("elevation_column") {
        config.stimulus.elevation_column = value.clone();
    }
    if let Some(value) = cli_args.get("trial_duration") {
        config.stimulus.trial_duration = parse("trial_duration", value)?;
    }
    if let Some(value) = cli_args.get("monitor_delay") {
        config.stimulus.monitor_delay = parse("monitor_delay", value)?;
    }

    if let Some(value) = cli_args.get("bin_width") {
        config.psth.bin_width = parse("bin_width", value)?;
    }
    if let Some(value) = cli_args.get("window_start") {
        config.psth.window_start = parse("window_start", value)?;
    }
    if let Some(value) = cli_args.get("window_end") {
        config.psth.window_end = Some(parse("window_end", value)?);
    }

    if let Some(value) = cli_args.get("mask_threshold") {
        config.receptive_field.mask_threshold = parse("mask_threshold", value)?;
    }
    if let Some(value) = cli_args.get("minimum_spike_count") {
        config.receptive_field.minimum_spike_count = parse("minimum_spike_count", value)?;
    }
    if let Some(value) = cli_args.get("shuffle_count") {
        config.receptive_field.shuffle_count = parse("shuffle_count", value)?;
    }
    if let Some(value) = cli_args.get("shuffle_seed") {
        config.receptive_field.shuffle_seed = parse("shuffle_seed", value)?;
    }
    if let Some(value) = cli_args.get("area_mode") {
        config.receptive_field.area_mode = parse_area_mode(value)
            .ok_or_else(|| ConfigError::InvalidValue(format!("area_mode = {:?}", value)))?;
    }

    if let Some(value) = cli_args.get("speed_threshold") {
        config.running.speed_threshold = parse("speed_threshold", value)?;
    }

    Ok(())
}
