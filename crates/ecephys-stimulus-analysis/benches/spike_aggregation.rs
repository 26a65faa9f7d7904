// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Spike Aggregation Microbenchmarks
//!
//! Purpose:
//! - Track the cost of per-presentation counting and PSTH binning on
//!   session-sized inputs (hundreds of presentations, tens of units).
//!
//! Notes:
//! - Inputs are deterministic; no I/O.

use std::collections::BTreeMap;
use std::time::Duration;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ecephys_stimulus_analysis::{
    binned_spike_counts, conditionwise_psth, group_conditions, spike_counts, PsthConfig, SpikeWindow,
};
use ecephys_structures::{SpikeTrains, StimulusPresentation, StimulusTable};

/// Gabor-style session: a 9×9 position grid repeated `repeats` times
fn create_session(repeats: usize, unit_count: u64, rate_hz: f64) -> (StimulusTable, SpikeTrains) {
    let positions = [-40.0, -30.0, -20.0, -10.0, 0.0, 10.0, 20.0, 30.0, 40.0];
    let mut presentations = Vec::new();
    let mut id = 0u64;
    for _ in 0..repeats {
        for &x in &positions {
            for &y in &positions {
                let start = id as f64 * 0.25;
                presentations.push(
                    StimulusPresentation::new(id, start, start + 0.25, "gabors")
                        .with_parameter("x_position", x)
                        .with_parameter("y_position", y),
                );
                id += 1;
            }
        }
    }
    let session_end = id as f64 * 0.25;

    // Evenly spaced spikes with a per-unit phase so trains differ
    let mut map = BTreeMap::new();
    for unit in 0..unit_count {
        let interval = 1.0 / rate_hz;
        let phase = interval * unit as f64 / unit_count as f64;
        let count = (session_end / interval) as usize;
        map.insert(unit, (0..count).map(|k| phase + k as f64 * interval).collect());
    }

    let table = match StimulusTable::new(presentations) {
        Ok(table) => table,
        Err(e) => panic!("benchmark table is invalid: {e}"),
    };
    let trains = match SpikeTrains::from_map(map) {
        Ok(trains) => trains,
        Err(e) => panic!("benchmark spike trains are invalid: {e}"),
    };
    (table, trains)
}

fn bench_spike_counts(c: &mut Criterion) {
    let mut group = c.benchmark_group("spike_counts");

    for &units in &[8u64, 64] {
        let (table, trains) = create_session(10, units, 20.0);
        group.throughput(Throughput::Elements(table.len() as u64 * units));
        group.bench_with_input(BenchmarkId::new("presentation_window", units), &units, |b, _| {
            b.iter(|| black_box(spike_counts(&table, &trains, SpikeWindow::Presentation)));
        });
    }

    group.finish();
}

fn bench_psth(c: &mut Criterion) {
    let mut group = c.benchmark_group("psth");

    let (table, trains) = create_session(10, 32, 20.0);
    let conditions = match group_conditions(&table, &["x_position", "y_position"]) {
        Ok(conditions) => conditions,
        Err(e) => panic!("benchmark conditions are invalid: {e}"),
    };
    let config = PsthConfig::new(0.0, 0.25, 0.001);
    let edges = match config.bin_edges() {
        Ok(edges) => edges,
        Err(e) => panic!("benchmark bins are invalid: {e}"),
    };

    group.bench_function(BenchmarkId::new("binned_counts", "810x249x32"), |b| {
        b.iter(|| black_box(binned_spike_counts(&table, &trains, &edges)));
    });
    group.bench_function(BenchmarkId::new("conditionwise_psth", "81x249x32"), |b| {
        b.iter(|| black_box(conditionwise_psth(&table, &conditions, &trains, &config)));
    });

    group.finish();
}

fn criterion_config() -> Criterion {
    Criterion::default()
        .warm_up_time(Duration::from_millis(500))
        .measurement_time(Duration::from_secs(1))
        .sample_size(20)
}

criterion_group! {
    name = spike_aggregation;
    config = criterion_config();
    targets = bench_spike_counts, bench_psth
}
criterion_main!(spike_aggregation);
