/*!
# ecephys stimulus analysis

Stimulus-locked spike analysis for one mapping session:
- Condition grouping (unique parameter combinations)
- Spike aggregation per presentation and unit
- Condition-wise statistics and PSTH
- Receptive-field grids, smoothing, thresholding and Gaussian fits
- Per-unit response metrics and shuffle significance

## Architecture

```text
StimulusTable + SpikeTrains
        ↓
conditions  →  spikes  →  statistics  →  receptive_field
                                  ↓
                        metrics + significance
                                  ↓
                      mapping::ReceptiveFieldMapping
```

## Parallelism

With the `parallel` feature (default), per-unit metrics are distributed over
the rayon pool. Rows are collected in unit order, so the output matches the
sequential path exactly.

Copyright 2025 Neuraville Inc.
Licensed under the Apache License, Version 2.0
*/

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod conditions;
pub mod error;
pub mod mapping;
pub mod metrics;
pub mod receptive_field;
pub mod significance;
pub mod spikes;
pub mod statistics;
pub mod table;

pub use conditions::{group_conditions, ConditionTable, StimulusCondition};
pub use error::{AnalysisError, AnalysisResult};
pub use mapping::{MetricsTable, ReceptiveFieldMapping, ReceptiveFieldMappingParams, ReceptiveFieldMetrics};
pub use metrics::{
    fano_factor, lifetime_sparseness, mann_whitney_u, overall_firing_rate, preferred_condition, reliability,
    running_modulation, time_to_peak, RunningModulation,
};
pub use receptive_field::{
    rf_on_screen, rf_stats, rf_stats_with, AreaMode, GridValue, ReceptiveFieldGrid, RfStats, RfStatsOptions,
};
pub use significance::{chi_square_permutation, chi_square_statistic};
pub use spikes::{
    bin_edges, binned_spike_counts, presentationwise_spike_times, spike_counts, PresentationwiseSpikeTime,
    SpikeWindow,
};
pub use statistics::{
    conditionwise_psth, conditionwise_statistics, presentationwise_statistics, summarize, ConditionwisePsth,
    ConditionwiseStatistics, ConditionwiseTable, PresentationwiseStatistics, PresentationwiseTable, PsthConfig,
    SampleSummary,
};
pub use table::Table;
