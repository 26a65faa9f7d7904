// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Common error type for ecephys data ingestion.
///
/// Raised while building the immutable inputs of the analysis pipeline:
/// presentation tables, frame timestamps, spike trains and running traces.
///
/// # Examples
/// ```
/// use ecephys_structures::{EcephysDataError, UnitSpikeTrain};
///
/// let err = UnitSpikeTrain::new(3, vec![0.5, 0.2]).unwrap_err();
/// assert!(matches!(err, EcephysDataError::NonMonotonicSpikeTimes { unit_id: 3, .. }));
/// ```
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EcephysDataError {
    /// A time value was NaN or infinite
    #[error("Non-finite {what}: {value}")]
    NonFiniteTime { what: &'static str, value: f64 },

    /// A presentation stops before it starts
    #[error("Presentation {id} stops ({stop_time}) before it starts ({start_time})")]
    InvertedInterval {
        id: u64,
        start_time: f64,
        stop_time: f64,
    },

    #[error("Duplicate presentation id {0}")]
    DuplicatePresentationId(u64),

    #[error("Duplicate unit id {0}")]
    DuplicateUnitId(u64),

    /// Spike times must be non-decreasing
    #[error("Spike times of unit {unit_id} decrease at index {index}")]
    NonMonotonicSpikeTimes { unit_id: u64, index: usize },

    #[error("{what} decrease at index {index}")]
    NonMonotonicTimestamps { what: &'static str, index: usize },

    #[error("Frame {frame} is out of range for {len} timestamps")]
    FrameOutOfRange { frame: usize, len: usize },

    #[error("End frame {end_frame} precedes start frame {start_frame}")]
    EndBeforeStart { start_frame: usize, end_frame: usize },

    #[error("Sample rate must be positive and finite, got {0}")]
    InvalidSampleRate(f64),

    #[error("Length mismatch: {what} has {actual} entries, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    /// Invalid parameters provided to a function
    #[error("Bad Parameters: {0}")]
    BadParameters(String),
}

pub type Result<T> = std::result::Result<T, EcephysDataError>;

/// Fails with `NonMonotonicTimestamps` / `NonFiniteTime` unless `values`
/// is finite and non-decreasing.
pub(crate) fn check_sorted_finite(what: &'static str, values: &[f64]) -> Result<()> {
    for (index, &value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(EcephysDataError::NonFiniteTime { what, value });
        }
        if index > 0 && value < values[index - 1] {
            return Err(EcephysDataError::NonMonotonicTimestamps { what, index });
        }
    }
    Ok(())
}
