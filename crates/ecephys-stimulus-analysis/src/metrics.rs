// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Per-unit response metrics.
//!
//! All functions are total: degenerate input (empty samples, zero mean,
//! constant traces) yields NaN instead of an error so one silent unit never
//! aborts the metrics of the others.

use ndarray::{ArrayView1, ArrayView2, Axis};
use serde::Serialize;
use statrs::distribution::{ContinuousCDF, Normal};

use ecephys_structures::{StimulusTable, UnitSpikeTrain};

use crate::statistics::{ConditionwisePsth, ConditionwiseTable};

/// Population variance over mean of spike counts
pub fn fano_factor(counts: &[f64]) -> f64 {
    if counts.is_empty() {
        return f64::NAN;
    }
    let n = counts.len() as f64;
    let mean = counts.iter().sum::<f64>() / n;
    if mean == 0.0 {
        return f64::NAN;
    }
    let variance = counts.iter().map(|c| (c - mean).powi(2)).sum::<f64>() / n;
    variance / mean
}

/// Selectivity across conditions, 0 for a flat tuning and 1 for a unit
/// responding to a single condition
///
/// `(1 − (Σr)² / (n·Σr²)) / (1 − 1/n)`
pub fn lifetime_sparseness(responses: &[f64]) -> f64 {
    let n = responses.len() as f64;
    if responses.len() < 2 {
        return f64::NAN;
    }
    let sum: f64 = responses.iter().sum();
    let sum_sq: f64 = responses.iter().map(|r| r * r).sum();
    if sum_sq == 0.0 {
        return f64::NAN;
    }
    (1.0 - sum * sum / (n * sum_sq)) / (1.0 - 1.0 / n)
}

/// Pearson correlation; `None` when either side has no variance
pub fn pearson(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> Option<f64> {
    let n = a.len().min(b.len());
    if n < 2 {
        return None;
    }
    let mean_a = a.iter().take(n).sum::<f64>() / n as f64;
    let mean_b = b.iter().take(n).sum::<f64>() / n as f64;
    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        cov += dx * dy;
        var_a += dx * dx;
        var_b += dy * dy;
    }
    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    Some(cov / (var_a * var_b).sqrt())
}

/// Mean pairwise correlation between trials
///
/// `trials` is `[trial][bin]`. Pairs involving a constant trial are skipped;
/// NaN when no pair is usable.
pub fn reliability(trials: ArrayView2<'_, f64>) -> f64 {
    let rows: Vec<ArrayView1<'_, f64>> = trials.axis_iter(Axis(0)).collect();
    let mut total = 0.0;
    let mut pairs = 0usize;
    for i in 0..rows.len() {
        for j in (i + 1)..rows.len() {
            if let Some(r) = pearson(rows[i], rows[j]) {
                total += r;
                pairs += 1;
            }
        }
    }
    if pairs == 0 {
        f64::NAN
    } else {
        total / pairs as f64
    }
}

/// Spikes inside all presentations divided by their summed duration
pub fn overall_firing_rate(table: &StimulusTable, train: &UnitSpikeTrain) -> f64 {
    let (spikes, duration) = table.iter().fold((0usize, 0.0), |(spikes, duration), p| {
        (spikes + train.count_in(p.start_time, p.stop_time), duration + p.duration)
    });
    if duration > 0.0 {
        spikes as f64 / duration
    } else {
        f64::NAN
    }
}

/// Condition with the largest mean spike count (lowest id on ties)
pub fn preferred_condition(statistics: &ConditionwiseTable, unit_id: u64) -> Option<u64> {
    statistics
        .for_unit(unit_id)
        .filter(|row| !row.spike_mean.is_nan())
        .fold(None, |best: Option<(u64, f64)>, row| match best {
            Some((_, mean)) if mean >= row.spike_mean => best,
            _ => Some((row.stimulus_condition_id, row.spike_mean)),
        })
        .map(|(id, _)| id)
}

/// Center of the PSTH bin with the highest rate (first on ties)
///
/// NaN when the condition or unit is unknown or the trace is all zero.
pub fn time_to_peak(psth: &ConditionwisePsth, condition_id: u64, unit_id: u64) -> f64 {
    let Some(trace) = psth.trace(condition_id, unit_id) else {
        return f64::NAN;
    };
    let mut best: Option<(usize, f64)> = None;
    for (bin, &rate) in trace.iter().enumerate() {
        if best.map_or(true, |(_, peak)| rate > peak) {
            best = Some((bin, rate));
        }
    }
    match best {
        Some((bin, peak)) if peak > 0.0 => psth.bin_centers[bin],
        _ => f64::NAN,
    }
}

/// Running versus stationary comparison of per-trial responses
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunningModulation {
    pub p_value: f64,
    pub index: f64,
}

impl RunningModulation {
    pub fn missing() -> Self {
        Self {
            p_value: f64::NAN,
            index: f64::NAN,
        }
    }
}

/// Split trials at `speed_threshold` and compare their responses
///
/// Trials without a speed are ignored. Needs more than one running trial
/// and more than one stationary trial beyond that. The index is
/// `(run − stat) / stat` when running raises the mean, `−(stat − run) / run`
/// when it lowers it, and 0 when they match.
pub fn running_modulation(responses: &[f64], speeds: &[Option<f64>], speed_threshold: f64) -> RunningModulation {
    let mut running = Vec::new();
    let mut stationary = Vec::new();
    for (&response, speed) in responses.iter().zip(speeds) {
        match speed {
            Some(speed) if *speed >= speed_threshold => running.push(response),
            Some(_) => stationary.push(response),
            None => {}
        }
    }

    let n = running.len() + stationary.len();
    if !(running.len() > 1 && running.len() + 1 < n) {
        return RunningModulation::missing();
    }

    let run_mean = running.iter().sum::<f64>() / running.len() as f64;
    let stat_mean = stationary.iter().sum::<f64>() / stationary.len() as f64;
    let index = if run_mean > stat_mean {
        (run_mean - stat_mean) / stat_mean
    } else if stat_mean > run_mean {
        -(stat_mean - run_mean) / run_mean
    } else {
        0.0
    };

    RunningModulation {
        p_value: mann_whitney_u(&running, &stationary),
        index,
    }
}

/// Average ranks (1-based) with ties sharing their mean rank, plus the tie
/// correction term `Σ(t³ − t)`
fn ranks(values: &[f64]) -> (Vec<f64>, f64) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));

    let mut ranks = vec![0.0; values.len()];
    let mut tie_term = 0.0;
    let mut start = 0;
    while start < order.len() {
        let mut end = start + 1;
        while end < order.len() && values[order[end]] == values[order[start]] {
            end += 1;
        }
        let rank = (start + end + 1) as f64 / 2.0;
        for &index in &order[start..end] {
            ranks[index] = rank;
        }
        let t = (end - start) as f64;
        tie_term += t * t * t - t;
        start = end;
    }
    (ranks, tie_term)
}

/// Two-sided Mann–Whitney U p-value
///
/// Normal approximation with tie correction and continuity correction.
/// 1.0 when every value is tied, NaN when either sample is empty.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> f64 {
    if a.is_empty() || b.is_empty() {
        return f64::NAN;
    }
    let n1 = a.len() as f64;
    let n2 = b.len() as f64;
    let n = n1 + n2;

    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let (ranks, tie_term) = ranks(&combined);
    let rank_sum_a: f64 = ranks[..a.len()].iter().sum();
    let u = rank_sum_a - n1 * (n1 + 1.0) / 2.0;

    let mean = n1 * n2 / 2.0;
    let variance = n1 * n2 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if !(variance > 0.0) {
        return 1.0;
    }
    let z = ((u - mean).abs() - 0.5).max(0.0) / variance.sqrt();

    match Normal::new(0.0, 1.0) {
        Ok(standard) => (2.0 * standard.cdf(-z)).min(1.0),
        Err(_) => f64::NAN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conditions::group_conditions;
    use crate::spikes::{spike_counts, SpikeWindow};
    use crate::statistics::{conditionwise_psth, conditionwise_statistics, PsthConfig};
    use approx::assert_relative_eq;
    use ecephys_structures::{SpikeTrains, StimulusPresentation};
    use ndarray::array;
    use std::collections::BTreeMap;

    #[test]
    fn test_fano_factor() {
        assert_relative_eq!(fano_factor(&[1.0, 2.0, 3.0]), (2.0 / 3.0) / 2.0);
        assert!(fano_factor(&[0.0, 0.0]).is_nan());
        assert!(fano_factor(&[]).is_nan());
    }

    #[test]
    fn test_lifetime_sparseness_bounds() {
        assert_relative_eq!(lifetime_sparseness(&[3.0, 3.0, 3.0, 3.0]), 0.0, epsilon = 1e-12);
        assert_relative_eq!(lifetime_sparseness(&[0.0, 0.0, 9.0, 0.0]), 1.0, epsilon = 1e-12);
        assert!(lifetime_sparseness(&[5.0]).is_nan());
        assert!(lifetime_sparseness(&[0.0, 0.0]).is_nan());
    }

    #[test]
    fn test_reliability() {
        let identical = array![[0.0, 1.0, 3.0], [0.0, 1.0, 3.0], [0.0, 2.0, 6.0]];
        assert_relative_eq!(reliability(identical.view()), 1.0, epsilon = 1e-12);

        let anti = array![[0.0, 1.0], [1.0, 0.0]];
        assert_relative_eq!(reliability(anti.view()), -1.0, epsilon = 1e-12);

        let flat = array![[1.0, 1.0], [0.0, 2.0]];
        assert!(reliability(flat.view()).is_nan());
    }

    #[test]
    fn test_ranks_with_ties() {
        let (r, tie_term) = ranks(&[3.0, 1.0, 3.0, 2.0]);
        assert_eq!(r, vec![3.5, 1.0, 3.5, 2.0]);
        assert_eq!(tie_term, 6.0);
    }

    #[test]
    fn test_mann_whitney_separated_samples() {
        let low: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let high: Vec<f64> = (20..32).map(|v| v as f64).collect();
        assert!(mann_whitney_u(&high, &low) < 0.001);
        assert_relative_eq!(mann_whitney_u(&high, &low), mann_whitney_u(&low, &high));
        assert_eq!(mann_whitney_u(&[2.0, 2.0], &[2.0, 2.0]), 1.0);
        assert!(mann_whitney_u(&[], &[1.0]).is_nan());
    }

    #[test]
    fn test_running_modulation_index() {
        let responses = [4.0, 4.0, 4.0, 2.0, 2.0, 2.0];
        let speeds = [Some(5.0), Some(6.0), Some(9.0), Some(0.0), Some(0.2), None];
        let modulation = running_modulation(&responses, &speeds, 1.0);
        assert_relative_eq!(modulation.index, 1.0);
        assert!(modulation.p_value > 0.0 && modulation.p_value < 1.0);

        let suppressed = running_modulation(&[1.0, 1.0, 4.0, 4.0], &[Some(2.0), Some(2.0), Some(0.0), Some(0.0)], 1.0);
        assert_relative_eq!(suppressed.index, -3.0);
    }

    #[test]
    fn test_running_modulation_needs_both_states() {
        let responses = [1.0, 2.0, 3.0, 4.0];
        let one_running = [Some(3.0), Some(0.0), Some(0.0), Some(0.0)];
        let m = running_modulation(&responses, &one_running, 1.0);
        assert!(m.index.is_nan() && m.p_value.is_nan());

        let one_stationary = [Some(3.0), Some(3.0), Some(3.0), Some(0.0)];
        assert!(running_modulation(&responses, &one_stationary, 1.0).index.is_nan());
    }

    #[test]
    fn test_preferred_condition_and_time_to_peak() {
        let table = StimulusTable::new(vec![
            StimulusPresentation::new(0, 0.0, 0.1, "gabors").with_parameter("x", 0.0),
            StimulusPresentation::new(1, 1.0, 1.1, "gabors").with_parameter("x", 1.0),
            StimulusPresentation::new(2, 2.0, 2.1, "gabors").with_parameter("x", 2.0),
        ])
        .unwrap();
        let conditions = group_conditions(&table, &["x"]).unwrap();
        let mut map = BTreeMap::new();
        map.insert(0, vec![0.05, 1.072, 1.074, 1.091, 2.01]);
        let trains = SpikeTrains::from_map(map).unwrap();
        let counts = spike_counts(&table, &trains, SpikeWindow::Presentation);
        let stats = conditionwise_statistics(&table, &conditions, &[0], &counts).unwrap();

        assert_eq!(preferred_condition(&stats, 0), Some(1));
        assert_eq!(preferred_condition(&stats, 5), None);

        let psth = conditionwise_psth(&table, &conditions, &trains, &PsthConfig::new(0.0, 0.1, 0.01)).unwrap();
        assert_relative_eq!(time_to_peak(&psth, 1, 0), 0.075, epsilon = 1e-12);
        assert_relative_eq!(overall_firing_rate(&table, trains.get(0).unwrap()), 5.0 / 0.3, epsilon = 1e-9);
    }
}
