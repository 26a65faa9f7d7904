// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Presentation-wise and condition-wise spike statistics and the PSTH tensor.

use ahash::AHashMap;
use ndarray::{s, Array2, Array3, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use ecephys_structures::{RunningSpeed, SpikeTrains, StimulusTable};

use crate::conditions::ConditionTable;
use crate::error::{AnalysisError, AnalysisResult};
use crate::spikes::{bin_edges, binned_spike_counts};
use crate::table::Table;

/// One (presentation, unit) row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresentationwiseStatistics {
    pub presentation_id: u64,
    pub unit_id: u64,
    pub stimulus_condition_id: u64,
    pub spike_count: u32,
    /// spike_count / duration; NaN for zero-length presentations
    pub firing_rate: f64,
    /// Mean running speed during the presentation, when a trace is available
    pub running_speed: Option<f64>,
}

/// One (condition, unit) row
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ConditionwiseStatistics {
    pub stimulus_condition_id: u64,
    pub unit_id: u64,
    pub trial_count: usize,
    pub spike_count: u64,
    pub spike_mean: f64,
    pub spike_std: f64,
    pub spike_sem: f64,
    pub firing_rate_mean: f64,
    pub firing_rate_sem: f64,
}

pub type PresentationwiseTable = Table<PresentationwiseStatistics>;

/// Condition-wise rows with lookup by unit and by (condition, unit)
///
/// Serializes exactly like the underlying row table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ConditionwiseTable {
    table: Table<ConditionwiseStatistics>,
    /// Row positions of every unit, in row order
    #[serde(skip)]
    by_unit: AHashMap<u64, Vec<usize>>,
    #[serde(skip)]
    by_key: AHashMap<(u64, u64), usize>,
}

impl ConditionwiseTable {
    /// Index `rows`; the first row wins when a (condition, unit) pair repeats
    pub fn new(rows: Vec<ConditionwiseStatistics>) -> Self {
        let mut by_unit: AHashMap<u64, Vec<usize>> = AHashMap::new();
        let mut by_key = AHashMap::with_capacity(rows.len());
        for (position, row) in rows.iter().enumerate() {
            by_unit.entry(row.unit_id).or_default().push(position);
            by_key.entry((row.stimulus_condition_id, row.unit_id)).or_insert(position);
        }
        Self {
            table: Table::new(rows),
            by_unit,
            by_key,
        }
    }

    pub fn get(&self, stimulus_condition_id: u64, unit_id: u64) -> Option<&ConditionwiseStatistics> {
        self.by_key
            .get(&(stimulus_condition_id, unit_id))
            .map(|&position| &self.table.rows()[position])
    }

    /// Rows of one unit in condition order
    pub fn for_unit(&self, unit_id: u64) -> impl Iterator<Item = &ConditionwiseStatistics> + '_ {
        let rows = self.table.rows();
        self.by_unit
            .get(&unit_id)
            .into_iter()
            .flatten()
            .map(move |&position| &rows[position])
    }

    pub fn rows(&self) -> &[ConditionwiseStatistics] {
        self.table.rows()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConditionwiseStatistics> {
        self.table.iter()
    }

    /// JSON array of row objects; NaN is written as `null`
    pub fn to_json(&self) -> serde_json::Result<String> {
        self.table.to_json()
    }

    pub fn into_rows(self) -> Vec<ConditionwiseStatistics> {
        self.table.into_rows()
    }
}

impl<'a> IntoIterator for &'a ConditionwiseTable {
    type Item = &'a ConditionwiseStatistics;
    type IntoIter = std::slice::Iter<'a, ConditionwiseStatistics>;

    fn into_iter(self) -> Self::IntoIter {
        self.table.iter()
    }
}

/// Mean, sample standard deviation (ddof 1) and standard error
///
/// A single observation has zero spread and zero standard error; an empty
/// sample is all NaN.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SampleSummary {
    pub mean: f64,
    pub std: f64,
    pub sem: f64,
}

pub fn summarize(values: &[f64]) -> SampleSummary {
    let n = values.len();
    if n == 0 {
        return SampleSummary {
            mean: f64::NAN,
            std: f64::NAN,
            sem: f64::NAN,
        };
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    if n == 1 {
        return SampleSummary {
            mean,
            std: 0.0,
            sem: 0.0,
        };
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
    let std = variance.sqrt();
    SampleSummary {
        mean,
        std,
        sem: std / (n as f64).sqrt(),
    }
}

fn firing_rate(count: u32, duration: f64) -> f64 {
    if duration > 0.0 {
        count as f64 / duration
    } else {
        f64::NAN
    }
}

fn check_counts_shape(table: &StimulusTable, unit_ids: &[u64], counts: &Array2<u32>) -> AnalysisResult<()> {
    if counts.dim() != (table.len(), unit_ids.len()) {
        return Err(AnalysisError::InvalidParameters(format!(
            "spike count matrix is {:?}, expected ({}, {})",
            counts.dim(),
            table.len(),
            unit_ids.len()
        )));
    }
    Ok(())
}

fn condition_of(conditions: &ConditionTable, presentation_id: u64) -> AnalysisResult<u64> {
    conditions.condition_of(presentation_id).ok_or_else(|| {
        AnalysisError::InvalidParameters(format!(
            "presentation {} has no stimulus condition",
            presentation_id
        ))
    })
}

/// Rows ordered by presentation then unit
///
/// `counts` is `[presentation][unit]` as produced by
/// [`spike_counts`](crate::spikes::spike_counts) for the same table.
pub fn presentationwise_statistics(
    table: &StimulusTable,
    conditions: &ConditionTable,
    unit_ids: &[u64],
    counts: &Array2<u32>,
    running: Option<&RunningSpeed>,
) -> AnalysisResult<PresentationwiseTable> {
    check_counts_shape(table, unit_ids, counts)?;

    let mut rows = Vec::with_capacity(table.len() * unit_ids.len());
    for (row, presentation) in table.iter().enumerate() {
        let stimulus_condition_id = condition_of(conditions, presentation.id)?;
        let running_speed =
            running.and_then(|trace| trace.mean_velocity(presentation.start_time, presentation.stop_time));
        for (column, &unit_id) in unit_ids.iter().enumerate() {
            let spike_count = counts[[row, column]];
            rows.push(PresentationwiseStatistics {
                presentation_id: presentation.id,
                unit_id,
                stimulus_condition_id,
                spike_count,
                firing_rate: firing_rate(spike_count, presentation.duration),
                running_speed,
            });
        }
    }
    Ok(Table::new(rows))
}

fn member_positions(table: &StimulusTable, conditions: &ConditionTable, condition_id: u64) -> AnalysisResult<Vec<usize>> {
    conditions
        .presentations_of(condition_id)
        .iter()
        .map(|&id| {
            table.position(id).ok_or_else(|| {
                AnalysisError::InvalidParameters(format!("presentation {} is not in the table", id))
            })
        })
        .collect()
}

/// Rows ordered by condition id then unit
pub fn conditionwise_statistics(
    table: &StimulusTable,
    conditions: &ConditionTable,
    unit_ids: &[u64],
    counts: &Array2<u32>,
) -> AnalysisResult<ConditionwiseTable> {
    check_counts_shape(table, unit_ids, counts)?;

    let mut rows = Vec::with_capacity(conditions.len() * unit_ids.len());
    for condition in conditions.conditions() {
        let positions = member_positions(table, conditions, condition.stimulus_condition_id)?;
        let durations: Vec<f64> = positions
            .iter()
            .map(|&p| table.as_slice()[p].duration)
            .collect();

        for (column, &unit_id) in unit_ids.iter().enumerate() {
            let trial_counts: Vec<u32> = positions.iter().map(|&p| counts[[p, column]]).collect();
            let spikes: Vec<f64> = trial_counts.iter().map(|&c| c as f64).collect();
            let rates: Vec<f64> = trial_counts
                .iter()
                .zip(&durations)
                .map(|(&c, &d)| firing_rate(c, d))
                .collect();

            let spike_summary = summarize(&spikes);
            let rate_summary = summarize(&rates);
            rows.push(ConditionwiseStatistics {
                stimulus_condition_id: condition.stimulus_condition_id,
                unit_id,
                trial_count: positions.len(),
                spike_count: trial_counts.iter().map(|&c| c as u64).sum(),
                spike_mean: spike_summary.mean,
                spike_std: spike_summary.std,
                spike_sem: spike_summary.sem,
                firing_rate_mean: rate_summary.mean,
                firing_rate_sem: rate_summary.sem,
            });
        }
    }
    Ok(ConditionwiseTable::new(rows))
}

/// PSTH binning, relative to presentation onset
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PsthConfig {
    pub window_start: f64,
    pub window_end: f64,
    pub bin_width: f64,
}

impl PsthConfig {
    pub fn new(window_start: f64, window_end: f64, bin_width: f64) -> Self {
        Self {
            window_start,
            window_end,
            bin_width,
        }
    }

    /// From the `[psth]` section, defaulting the window end to the trial duration
    pub fn from_config(psth: &ecephys_config::PsthConfig, stimulus: &ecephys_config::StimulusConfig) -> Self {
        Self::new(psth.window_start, psth.resolved_window_end(stimulus), psth.bin_width)
    }

    pub fn bin_edges(&self) -> AnalysisResult<Vec<f64>> {
        bin_edges(self.window_start, self.window_end, self.bin_width)
    }
}

/// Mean firing rate tensor indexed `[condition][bin][unit]`
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionwisePsth {
    pub data: Array3<f64>,
    pub condition_ids: Vec<u64>,
    pub unit_ids: Vec<u64>,
    pub bin_centers: Vec<f64>,
    pub bin_width: f64,
}

impl ConditionwisePsth {
    pub fn shape(&self) -> (usize, usize, usize) {
        self.data.dim()
    }

    pub fn condition_index(&self, condition_id: u64) -> Option<usize> {
        self.condition_ids.iter().position(|&id| id == condition_id)
    }

    pub fn unit_index(&self, unit_id: u64) -> Option<usize> {
        self.unit_ids.iter().position(|&id| id == unit_id)
    }

    /// Rate over bins for one (condition, unit)
    pub fn trace(&self, condition_id: u64, unit_id: u64) -> Option<ArrayView1<'_, f64>> {
        let c = self.condition_index(condition_id)?;
        let u = self.unit_index(unit_id)?;
        Some(self.data.slice(s![c, .., u]))
    }
}

/// Bin every presentation once, then average per condition
pub fn conditionwise_psth(
    table: &StimulusTable,
    conditions: &ConditionTable,
    trains: &SpikeTrains,
    config: &PsthConfig,
) -> AnalysisResult<ConditionwisePsth> {
    let edges = config.bin_edges()?;
    let binned = binned_spike_counts(table, trains, &edges)?;
    let n_bins = edges.len() - 1;

    let mut data = Array3::<f64>::zeros((conditions.len(), n_bins, trains.len()));
    for (index, condition) in conditions.conditions().iter().enumerate() {
        let positions = member_positions(table, conditions, condition.stimulus_condition_id)?;
        let mut slot = data.index_axis_mut(Axis(0), index);
        for &position in &positions {
            slot.zip_mut_with(&binned.index_axis(Axis(0), position), |acc, &count| {
                *acc += f64::from(count)
            });
        }
        if !positions.is_empty() {
            slot /= positions.len() as f64 * config.bin_width;
        }
    }

    Ok(ConditionwisePsth {
        data,
        condition_ids: conditions
            .conditions()
            .iter()
            .map(|c| c.stimulus_condition_id)
            .collect(),
        unit_ids: trains.unit_ids(),
        bin_centers: edges[..n_bins]
            .iter()
            .map(|edge| edge + config.bin_width / 2.0)
            .collect(),
        bin_width: config.bin_width,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::group_conditions;
    use crate::spikes::{spike_counts, SpikeWindow};
    use approx::assert_relative_eq;
    use ecephys_structures::StimulusPresentation;
    use std::collections::BTreeMap;

    fn fixture() -> (StimulusTable, ConditionTable, SpikeTrains) {
        let table = StimulusTable::new(vec![
            StimulusPresentation::new(0, 0.0, 0.5, "gabors").with_parameter("x", 1.0),
            StimulusPresentation::new(1, 1.0, 1.5, "gabors").with_parameter("x", 2.0),
            StimulusPresentation::new(2, 2.0, 2.5, "gabors").with_parameter("x", 1.0),
            StimulusPresentation::new(3, 3.0, 3.5, "gabors").with_parameter("x", 1.0),
        ])
        .unwrap();
        let conditions = group_conditions(&table, &["x"]).unwrap();
        let mut map = BTreeMap::new();
        map.insert(1, vec![0.1, 0.2, 1.05, 2.1, 3.1, 3.2, 3.3, 3.4]);
        map.insert(2, vec![]);
        (table, conditions, SpikeTrains::from_map(map).unwrap())
    }

    #[test]
    fn test_summarize_single_value_has_zero_sem() {
        let summary = summarize(&[7.0]);
        assert_eq!(summary.mean, 7.0);
        assert_eq!(summary.std, 0.0);
        assert_eq!(summary.sem, 0.0);
    }

    #[test]
    fn test_summarize_sample_statistics() {
        let summary = summarize(&[2.0, 1.0, 4.0]);
        assert_relative_eq!(summary.mean, 7.0 / 3.0);
        assert_relative_eq!(summary.std, (7.0f64 / 3.0).sqrt(), epsilon = 1e-12);
        assert_relative_eq!(summary.sem, (7.0f64 / 9.0).sqrt(), epsilon = 1e-12);
        assert!(summarize(&[]).mean.is_nan());
    }

    #[test]
    fn test_conditionwise_rows() {
        let (table, conditions, trains) = fixture();
        let counts = spike_counts(&table, &trains, SpikeWindow::Presentation);
        let stats = conditionwise_statistics(&table, &conditions, &trains.unit_ids(), &counts).unwrap();
        assert_eq!(stats.len(), 4);

        let x1 = stats.get(0, 1).unwrap();
        assert_eq!(x1.trial_count, 3);
        assert_eq!(x1.spike_count, 7);
        assert_relative_eq!(x1.spike_mean, 7.0 / 3.0);
        assert_relative_eq!(x1.firing_rate_mean, 14.0 / 3.0);

        let x2 = stats.get(1, 1).unwrap();
        assert_eq!(x2.trial_count, 1);
        assert_eq!(x2.spike_sem, 0.0);
        assert_eq!(x2.firing_rate_sem, 0.0);

        let silent = stats.get(0, 2).unwrap();
        assert_eq!(silent.spike_mean, 0.0);
        assert_eq!(silent.spike_sem, 0.0);
        assert_eq!(stats.for_unit(2).count(), 2);
    }

    #[test]
    fn test_conditionwise_lookup_by_unit() {
        let row = |condition: u64, unit: u64, mean: f64| ConditionwiseStatistics {
            stimulus_condition_id: condition,
            unit_id: unit,
            trial_count: 1,
            spike_count: mean as u64,
            spike_mean: mean,
            spike_std: 0.0,
            spike_sem: 0.0,
            firing_rate_mean: mean,
            firing_rate_sem: 0.0,
        };
        let stats = ConditionwiseTable::new(vec![row(0, 4, 1.0), row(0, 9, 2.0), row(1, 4, 3.0), row(1, 9, 4.0)]);

        let means: Vec<f64> = stats.for_unit(9).map(|r| r.spike_mean).collect();
        assert_eq!(means, vec![2.0, 4.0]);
        assert_eq!(stats.get(1, 4).unwrap().spike_mean, 3.0);
        assert!(stats.get(2, 4).is_none());
        assert_eq!(stats.for_unit(5).count(), 0);

        let json: Vec<serde_json::Value> = serde_json::from_str(&stats.to_json().unwrap()).unwrap();
        assert_eq!(json.len(), 4);
        assert_eq!(json[3]["unit_id"], 9);
    }

    #[test]
    fn test_presentationwise_rows() {
        let (table, conditions, trains) = fixture();
        let counts = spike_counts(&table, &trains, SpikeWindow::Presentation);
        let speed = RunningSpeed::new(vec![0.0, 0.25, 3.0], vec![2.0, 4.0, 10.0]).unwrap();
        let rows =
            presentationwise_statistics(&table, &conditions, &trains.unit_ids(), &counts, Some(&speed)).unwrap();
        assert_eq!(rows.len(), 8);
        let first = rows.rows()[0];
        assert_eq!((first.presentation_id, first.unit_id, first.stimulus_condition_id), (0, 1, 0));
        assert_eq!(first.spike_count, 2);
        assert_eq!(first.firing_rate, 4.0);
        assert_eq!(first.running_speed, Some(3.0));
        assert_eq!(rows.rows()[2].running_speed, None);
        assert_eq!(rows.rows()[6].running_speed, Some(10.0));
    }

    #[test]
    fn test_count_shape_checked() {
        let (table, conditions, _) = fixture();
        let counts = Array2::<u32>::zeros((2, 2));
        assert!(conditionwise_statistics(&table, &conditions, &[1, 2], &counts).is_err());
    }

    #[test]
    fn test_psth_shape_and_rates() {
        let (table, conditions, trains) = fixture();
        let config = PsthConfig::new(0.0, 0.5, 0.25);
        let psth = conditionwise_psth(&table, &conditions, &trains, &config).unwrap();
        // edges [0, 0.25] -> one bin
        assert_eq!(psth.shape(), (2, 1, 2));
        assert_eq!(psth.bin_centers, vec![0.125]);
        // condition x=1: trial counts in [0, 0.25) are 2, 1, 2
        assert_relative_eq!(psth.data[[0, 0, 0]], (5.0 / 3.0) / 0.25, epsilon = 1e-12);
        assert_relative_eq!(psth.data[[1, 0, 0]], 1.0 / 0.25);
        assert_eq!(psth.data[[0, 0, 1]], 0.0);
        assert_eq!(psth.trace(1, 1).unwrap().len(), 1);
    }

    #[test]
    fn test_psth_default_resolution() {
        let (table, conditions, trains) = fixture();
        let config = PsthConfig::new(0.0, 0.25, 0.001);
        let psth = conditionwise_psth(&table, &conditions, &trains, &config).unwrap();
        assert_eq!(psth.shape(), (2, 249, 2));
    }
}
