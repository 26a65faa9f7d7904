// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-frame stimulus display timestamps.
//!
//! Each backing store has its own named constructor instead of a shared
//! reader trait; all of them produce the same validated, monitor-delay
//! shifted vector.

use serde::{Deserialize, Serialize};

use crate::error::{check_sorted_finite, EcephysDataError, Result};

/// Where a set of timestamps came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimestampSource {
    /// Frame intervals from the behavior stimulus log
    StimulusLog,
    /// Edges of a digital vsync line on the sync device
    SyncLine,
    /// Timestamps stored by an upstream pipeline
    Precomputed,
}

/// Which transition of the sync line marks a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncEdge {
    Rising,
    Falling,
}

/// Monotonic per-frame display times in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusTimestamps {
    values: Vec<f64>,
    monitor_delay: f64,
    source: TimestampSource,
}

impl StimulusTimestamps {
    fn build(raw: Vec<f64>, monitor_delay: f64, source: TimestampSource) -> Result<Self> {
        if !monitor_delay.is_finite() {
            return Err(EcephysDataError::NonFiniteTime {
                what: "monitor delay",
                value: monitor_delay,
            });
        }
        let values: Vec<f64> = raw.into_iter().map(|t| t + monitor_delay).collect();
        check_sorted_finite("frame timestamps", &values)?;
        tracing::debug!(
            target: "ecephys_structures",
            frames = values.len(),
            ?source,
            monitor_delay,
            "aligned stimulus timestamps"
        );
        Ok(Self {
            values,
            monitor_delay,
            source,
        })
    }

    /// From frame-to-frame intervals in milliseconds
    ///
    /// The first frame is at time zero, so `n` intervals yield `n + 1`
    /// timestamps.
    pub fn from_stimulus_log(frame_intervals_ms: &[f64], monitor_delay: f64) -> Result<Self> {
        let mut raw = Vec::with_capacity(frame_intervals_ms.len() + 1);
        let mut elapsed = 0.0;
        raw.push(elapsed);
        for interval in frame_intervals_ms {
            elapsed += interval / 1000.0;
            raw.push(elapsed);
        }
        Self::build(raw, monitor_delay, TimestampSource::StimulusLog)
    }

    /// From a sampled digital vsync line
    pub fn from_sync_line(
        samples: &[bool],
        sample_rate: f64,
        edge: SyncEdge,
        monitor_delay: f64,
    ) -> Result<Self> {
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(EcephysDataError::InvalidSampleRate(sample_rate));
        }
        let raw = samples
            .windows(2)
            .enumerate()
            .filter(|(_, pair)| match edge {
                SyncEdge::Rising => !pair[0] && pair[1],
                SyncEdge::Falling => pair[0] && !pair[1],
            })
            .map(|(index, _)| (index + 1) as f64 / sample_rate)
            .collect();
        Self::build(raw, monitor_delay, TimestampSource::SyncLine)
    }

    /// Already aligned; the delay is recorded as zero
    pub fn from_precomputed(timestamps: Vec<f64>) -> Result<Self> {
        Self::build(timestamps, 0.0, TimestampSource::Precomputed)
    }

    pub fn value(&self) -> &[f64] {
        &self.values
    }

    pub fn monitor_delay(&self) -> f64 {
        self.monitor_delay
    }

    pub fn source(&self) -> TimestampSource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn frame_time(&self, frame: usize) -> Result<f64> {
        self.values
            .get(frame)
            .copied()
            .ok_or(EcephysDataError::FrameOutOfRange {
                frame,
                len: self.values.len(),
            })
    }
}
