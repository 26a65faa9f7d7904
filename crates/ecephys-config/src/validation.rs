// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration validation
//!
//! This module provides validation logic to ensure configuration values are
//! consistent and within valid ranges.

use crate::{ConfigError, ConfigResult, EcephysConfig};

/// Validation errors that can occur during config validation
#[derive(Debug, Clone)]
pub enum ConfigValidationError {
    MissingRequired { field: String },
    InvalidValue { field: String, reason: String },
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingRequired { field } => {
                write!(f, "Missing required configuration: {}", field)
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "Invalid configuration value for {}: {}", field, reason)
            }
        }
    }
}

/// Validate the complete configuration
///
/// Checks for:
/// - Required fields (stimulus name, parameter columns)
/// - Valid value ranges (thresholds, durations, bin widths)
/// - A non-empty PSTH window
///
/// # Errors
///
/// Returns `ConfigError::ValidationError` listing every violation
pub fn validate_config(config: &EcephysConfig) -> ConfigResult<()> {
    let mut errors = Vec::new();

    validate_required_fields(config, &mut errors);
    validate_value_ranges(config, &mut errors);
    validate_psth_window(config, &mut errors);

    if !errors.is_empty() {
        let error_messages = errors
            .iter()
            .map(|e| format!("  - {}", e))
            .collect::<Vec<_>>()
            .join("\n");

        return Err(ConfigError::ValidationError(format!(
            "Configuration validation failed:\n{}",
            error_messages
        )));
    }

    Ok(())
}

fn validate_required_fields(config: &EcephysConfig, errors: &mut Vec<ConfigValidationError>) {
    let required = [
        ("stimulus.stimulus_name", &config.stimulus.stimulus_name),
        ("stimulus.azimuth_column", &config.stimulus.azimuth_column),
        ("stimulus.elevation_column", &config.stimulus.elevation_column),
    ];
    for (field, value) in required {
        if value.trim().is_empty() {
            errors.push(ConfigValidationError::MissingRequired {
                field: field.to_string(),
            });
        }
    }
}

fn validate_value_ranges(config: &EcephysConfig, errors: &mut Vec<ConfigValidationError>) {
    let threshold = config.receptive_field.mask_threshold;
    if !(0.0..=1.0).contains(&threshold) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "receptive_field.mask_threshold".to_string(),
            reason: "must be between 0.0 and 1.0".to_string(),
        });
    }

    if !(config.stimulus.trial_duration > 0.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "stimulus.trial_duration".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if !config.stimulus.monitor_delay.is_finite() {
        errors.push(ConfigValidationError::InvalidValue {
            field: "stimulus.monitor_delay".to_string(),
            reason: "must be finite".to_string(),
        });
    }

    if !(config.psth.bin_width > 0.0) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "psth.bin_width".to_string(),
            reason: "must be positive".to_string(),
        });
    }

    if config.receptive_field.minimum_spike_count < 0.0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "receptive_field.minimum_spike_count".to_string(),
            reason: "must not be negative".to_string(),
        });
    }

    if config.receptive_field.shuffle_count == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "receptive_field.shuffle_count".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    if config.receptive_field.max_fit_iterations == 0 {
        errors.push(ConfigValidationError::InvalidValue {
            field: "receptive_field.max_fit_iterations".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }
}

fn validate_psth_window(config: &EcephysConfig, errors: &mut Vec<ConfigValidationError>) {
    let start = config.psth.window_start;
    let end = config.psth.resolved_window_end(&config.stimulus);
    if !(end > start) {
        errors.push(ConfigValidationError::InvalidValue {
            field: "psth.window_end".to_string(),
            reason: format!("window [{}, {}) is empty", start, end),
        });
    } else if config.psth.bin_width > 0.0 && (end - start) / config.psth.bin_width < 2.0 {
        // Fewer than two edges leaves no complete bin
        errors.push(ConfigValidationError::InvalidValue {
            field: "psth.bin_width".to_string(),
            reason: "must leave at least one complete bin inside the window".to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EcephysConfig;

    #[test]
    fn test_default_config_is_valid() {
        let config = EcephysConfig::default();
        let result = validate_config(&config);
        if let Err(e) = &result {
            eprintln!("Validation error: {}", e);
        }
        assert!(result.is_ok());
    }

    #[test]
    fn test_invalid_mask_threshold() {
        let mut config = EcephysConfig::default();
        config.receptive_field.mask_threshold = 1.5;

        let result = validate_config(&config);
        assert!(result.is_err());

        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("mask_threshold"));
            assert!(msg.contains("0.0 and 1.0"));
        }
    }

    #[test]
    fn test_missing_required_field() {
        let mut config = EcephysConfig::default();
        config.stimulus.azimuth_column = String::new();

        let result = validate_config(&config);
        assert!(result.is_err());

        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("stimulus.azimuth_column"));
        }
    }

    #[test]
    fn test_empty_psth_window() {
        let mut config = EcephysConfig::default();
        config.psth.window_start = 0.3;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("psth.window_end"));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_all_violations_are_reported() {
        let mut config = EcephysConfig::default();
        config.psth.bin_width = 0.0;
        config.stimulus.trial_duration = -1.0;
        config.receptive_field.shuffle_count = 0;

        let result = validate_config(&config);
        if let Err(ConfigError::ValidationError(msg)) = result {
            assert!(msg.contains("psth.bin_width"));
            assert!(msg.contains("stimulus.trial_duration"));
            assert!(msg.contains("receptive_field.shuffle_count"));
        } else {
            panic!("expected validation error");
        }
    }
}
