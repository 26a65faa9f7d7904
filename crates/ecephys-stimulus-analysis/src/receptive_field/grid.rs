// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Azimuth × elevation response grids.

use ahash::AHashMap;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::conditions::ConditionTable;
use crate::error::{AnalysisError, AnalysisResult};
use crate::statistics::{ConditionwiseStatistics, ConditionwiseTable};

/// Which condition-wise quantity fills the grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GridValue {
    /// Total spike count over all trials of the condition
    #[default]
    SpikeCount,
    /// Mean firing rate over trials
    FiringRate,
}

impl GridValue {
    fn extract(self, row: &ConditionwiseStatistics) -> f64 {
        match self {
            GridValue::SpikeCount => row.spike_count as f64,
            GridValue::FiringRate => row.firing_rate_mean,
        }
    }
}

/// One unit's response map, indexed `[elevation][azimuth]`
///
/// Axis values are the sorted unique positions of the mapping stimulus, so
/// row `i` is `elevations[i]` and column `j` is `azimuths[j]`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReceptiveFieldGrid {
    pub unit_id: u64,
    pub azimuths: Vec<f64>,
    pub elevations: Vec<f64>,
    pub values: Array2<f64>,
}

impl ReceptiveFieldGrid {
    pub fn new(unit_id: u64, azimuths: Vec<f64>, elevations: Vec<f64>, values: Array2<f64>) -> AnalysisResult<Self> {
        if values.dim() != (elevations.len(), azimuths.len()) {
            return Err(AnalysisError::InvalidParameters(format!(
                "grid values are {:?} but axes are {} elevations × {} azimuths",
                values.dim(),
                elevations.len(),
                azimuths.len()
            )));
        }
        Ok(Self {
            unit_id,
            azimuths,
            elevations,
            values,
        })
    }

    /// Fill a grid from condition-wise statistics
    ///
    /// Position combinations never presented stay 0; conditions whose
    /// position is NaN are skipped.
    pub fn from_conditionwise(
        unit_id: u64,
        conditions: &ConditionTable,
        statistics: &ConditionwiseTable,
        azimuth_column: &str,
        elevation_column: &str,
        value: GridValue,
    ) -> AnalysisResult<Self> {
        let rows: AHashMap<u64, &ConditionwiseStatistics> = statistics
            .for_unit(unit_id)
            .map(|row| (row.stimulus_condition_id, row))
            .collect();
        if rows.is_empty() && !conditions.is_empty() {
            return Err(AnalysisError::UnknownUnit(unit_id));
        }

        let mut positions = Vec::with_capacity(conditions.len());
        for condition in conditions.conditions() {
            let id = condition.stimulus_condition_id;
            let azimuth = numeric(condition.value(azimuth_column), id, azimuth_column)?;
            let elevation = numeric(condition.value(elevation_column), id, elevation_column)?;
            positions.push((id, azimuth, elevation));
        }

        let azimuths = sorted_unique(positions.iter().map(|p| p.1));
        let elevations = sorted_unique(positions.iter().map(|p| p.2));
        let mut values = Array2::<f64>::zeros((elevations.len(), azimuths.len()));

        for (id, azimuth, elevation) in positions {
            let (Some(column), Some(row)) = (locate(&azimuths, azimuth), locate(&elevations, elevation)) else {
                continue;
            };
            if let Some(stats) = rows.get(&id) {
                values[[row, column]] = value.extract(stats);
            }
        }

        Self::new(unit_id, azimuths, elevations, values)
    }

    pub fn n_azimuths(&self) -> usize {
        self.azimuths.len()
    }

    pub fn n_elevations(&self) -> usize {
        self.elevations.len()
    }

    /// Azimuth at a fractional column index, linear between grid positions
    pub fn azimuth_at(&self, index: f64) -> f64 {
        interpolate(&self.azimuths, index)
    }

    /// Elevation at a fractional row index
    pub fn elevation_at(&self, index: f64) -> f64 {
        interpolate(&self.elevations, index)
    }

    /// Mean azimuth spacing in degrees; NaN for fewer than two positions
    pub fn step_azimuth(&self) -> f64 {
        mean_step(&self.azimuths)
    }

    pub fn step_elevation(&self) -> f64 {
        mean_step(&self.elevations)
    }
}

fn numeric(
    value: Option<&ecephys_structures::ParameterValue>,
    stimulus_condition_id: u64,
    column: &str,
) -> AnalysisResult<f64> {
    value
        .and_then(|v| v.as_f64())
        .ok_or_else(|| AnalysisError::NonNumericParameter {
            stimulus_condition_id,
            column: column.to_string(),
        })
}

fn sorted_unique(values: impl Iterator<Item = f64>) -> Vec<f64> {
    let mut out: Vec<f64> = values.filter(|v| !v.is_nan()).map(|v| v + 0.0).collect();
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

fn locate(sorted: &[f64], value: f64) -> Option<usize> {
    if value.is_nan() {
        return None;
    }
    let value = value + 0.0;
    sorted.binary_search_by(|probe| probe.total_cmp(&value)).ok()
}

fn interpolate(sorted: &[f64], index: f64) -> f64 {
    if sorted.is_empty() || !index.is_finite() {
        return f64::NAN;
    }
    let last = (sorted.len() - 1) as f64;
    let index = index.clamp(0.0, last);
    let lower = index.floor();
    let fraction = index - lower;
    let lower = lower as usize;
    if fraction == 0.0 {
        return sorted[lower];
    }
    sorted[lower] + fraction * (sorted[lower + 1] - sorted[lower])
}

fn mean_step(sorted: &[f64]) -> f64 {
    match sorted {
        [first, .., last] => (last - first) / (sorted.len() - 1) as f64,
        _ => f64::NAN,
    }
}
