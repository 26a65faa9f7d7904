// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Running-speed trace aligned to the presentation time base.

use serde::{Deserialize, Serialize};

use crate::error::{check_sorted_finite, EcephysDataError, Result};

/// Ordered `(timestamp, velocity)` samples; velocity in cm/s
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningSpeed {
    timestamps: Vec<f64>,
    velocity: Vec<f64>,
}

impl RunningSpeed {
    pub fn new(timestamps: Vec<f64>, velocity: Vec<f64>) -> Result<Self> {
        if timestamps.len() != velocity.len() {
            return Err(EcephysDataError::LengthMismatch {
                what: "velocity",
                expected: timestamps.len(),
                actual: velocity.len(),
            });
        }
        check_sorted_finite("running timestamps", &timestamps)?;
        Ok(Self { timestamps, velocity })
    }

    pub fn from_samples(samples: Vec<(f64, f64)>) -> Result<Self> {
        let (timestamps, velocity) = samples.into_iter().unzip();
        Self::new(timestamps, velocity)
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn velocity(&self) -> &[f64] {
        &self.velocity
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Mean of the finite velocity samples in `[start, stop)`
    ///
    /// `None` when the window holds no usable sample.
    pub fn mean_velocity(&self, start: f64, stop: f64) -> Option<f64> {
        let lo = self.timestamps.partition_point(|&t| t < start);
        let hi = self.timestamps.partition_point(|&t| t < stop).max(lo);
        let (sum, count) = self.velocity[lo..hi]
            .iter()
            .filter(|v| v.is_finite())
            .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
        (count > 0).then(|| sum / count as f64)
    }
}
