// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Error types for stimulus analysis

use ecephys_config::ConfigError;
use ecephys_structures::EcephysDataError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AnalysisError {
    /// A presentation lacks one or more grouping columns; never defaulted
    #[error("Presentation {presentation_id} is missing parameter column(s): {}", .columns.join(", "))]
    MissingParameterColumns {
        presentation_id: u64,
        columns: Vec<String>,
    },

    #[error("Parameter column '{column}' of stimulus condition {stimulus_condition_id} is not numeric")]
    NonNumericParameter {
        stimulus_condition_id: u64,
        column: String,
    },

    #[error("No presentations of stimulus '{0}'")]
    EmptyStimulus(String),

    #[error("Unknown unit {0}")]
    UnknownUnit(u64),

    #[error("Invalid time bins: {0}")]
    InvalidBins(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error(transparent)]
    Data(#[from] EcephysDataError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

pub type AnalysisResult<T> = Result<T, AnalysisError>;
