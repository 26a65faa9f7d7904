// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Spike aggregation per (presentation, unit).
//!
//! Every lookup is a pair of binary searches into the unit's sorted spike
//! train, so cost scales with presentations × units × log(spikes).

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use ecephys_structures::{SpikeTrains, StimulusPresentation, StimulusTable};

use crate::error::{AnalysisError, AnalysisResult};

/// Which part of a presentation to collect spikes from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SpikeWindow {
    /// `[start_time, stop_time)`
    Presentation,
    /// `[start_time + offset, start_time + offset + duration)`
    FromOnset { offset: f64, duration: f64 },
}

impl SpikeWindow {
    /// Absolute bounds for one presentation
    pub fn bounds(&self, presentation: &StimulusPresentation) -> (f64, f64) {
        match *self {
            SpikeWindow::Presentation => (presentation.start_time, presentation.stop_time),
            SpikeWindow::FromOnset { offset, duration } => {
                let start = presentation.start_time + offset;
                (start, start + duration)
            }
        }
    }
}

/// One spike relative to the onset of the presentation it fell in
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PresentationwiseSpikeTime {
    pub presentation_id: u64,
    pub unit_id: u64,
    pub time_since_stimulus_presentation_onset: f64,
}

/// All spikes inside each presentation's window
///
/// Rows are ordered by presentation (start-time order), then unit id, then
/// spike time.
pub fn presentationwise_spike_times(
    table: &StimulusTable,
    trains: &SpikeTrains,
    window: SpikeWindow,
) -> Vec<PresentationwiseSpikeTime> {
    let mut rows = Vec::new();
    for presentation in table {
        let (start, stop) = window.bounds(presentation);
        for train in trains.iter() {
            rows.extend(train.window(start, stop).iter().map(|&t| PresentationwiseSpikeTime {
                presentation_id: presentation.id,
                unit_id: train.unit_id(),
                time_since_stimulus_presentation_onset: t - presentation.start_time,
            }));
        }
    }
    rows
}

/// Spike counts indexed `[presentation][unit]`
///
/// Presentation rows follow table order; unit columns follow
/// `trains.unit_ids()`.
pub fn spike_counts(table: &StimulusTable, trains: &SpikeTrains, window: SpikeWindow) -> Array2<u32> {
    let mut counts = Array2::<u32>::zeros((table.len(), trains.len()));
    for (row, presentation) in table.iter().enumerate() {
        let (start, stop) = window.bounds(presentation);
        for (column, train) in trains.iter().enumerate() {
            counts[[row, column]] = train.count_in(start, stop) as u32;
        }
    }
    counts
}

/// Edges `start + k·width` for every `k < ceil((end - start) / width)`
///
/// Half-open range semantics: `end` itself is only included when the
/// division leaves a remainder, so a 0.25 s window at 1 ms gives 250 edges
/// and 249 bins.
pub fn bin_edges(start: f64, end: f64, width: f64) -> AnalysisResult<Vec<f64>> {
    if !(width > 0.0 && width.is_finite()) {
        return Err(AnalysisError::InvalidBins(format!("bin width {} is not positive", width)));
    }
    if !(start.is_finite() && end.is_finite()) {
        return Err(AnalysisError::InvalidBins(format!("window [{}, {}) is not finite", start, end)));
    }
    let count = ((end - start) / width).ceil();
    if count < 2.0 {
        return Err(AnalysisError::InvalidBins(format!(
            "window [{}, {}) holds no complete bin of width {}",
            start, end, width
        )));
    }
    Ok((0..count as usize).map(|k| start + k as f64 * width).collect())
}

/// Spike counts indexed `[presentation][bin][unit]`
///
/// `edges` are relative to each presentation's onset; bin `b` covers
/// `[edges[b], edges[b + 1])`.
pub fn binned_spike_counts(
    table: &StimulusTable,
    trains: &SpikeTrains,
    edges: &[f64],
) -> AnalysisResult<Array3<u32>> {
    if edges.len() < 2 {
        return Err(AnalysisError::InvalidBins(format!(
            "{} edge(s) define no bin",
            edges.len()
        )));
    }
    if edges.windows(2).any(|pair| !(pair[1] > pair[0])) {
        return Err(AnalysisError::InvalidBins("edges must increase strictly".to_string()));
    }

    let n_bins = edges.len() - 1;
    let mut counts = Array3::<u32>::zeros((table.len(), n_bins, trains.len()));
    let mut bounds = vec![0usize; edges.len()];

    for (row, presentation) in table.iter().enumerate() {
        for (column, train) in trains.iter().enumerate() {
            for (bound, edge) in bounds.iter_mut().zip(edges) {
                *bound = train.lower_bound(presentation.start_time + edge);
            }
            for bin in 0..n_bins {
                counts[[row, bin, column]] = (bounds[bin + 1] - bounds[bin]) as u32;
            }
        }
    }
    Ok(counts)
}
