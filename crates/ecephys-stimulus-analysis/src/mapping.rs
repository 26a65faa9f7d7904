// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Receptive-field mapping analysis.
//!
//! [`ReceptiveFieldMapping`] owns the inputs of one mapping session (the
//! stimulus table restricted to the mapping stimulus, spike trains and an
//! optional running trace) and derives every table lazily. Each derived
//! table is computed once and cached for the lifetime of the analysis.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mapping = ReceptiveFieldMapping::new(table, trains, Some(running), params)?;
//! let metrics = mapping.metrics()?;
//! for row in metrics {
//!     println!("{} {} {}", row.unit_id, row.azimuth_rf, row.elevation_rf);
//! }
//! ```

use std::sync::OnceLock;

use ndarray::{Array2, Array3, Axis};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info, warn};

use ecephys_config::EcephysConfig;
use ecephys_structures::{RunningSpeed, SpikeTrains, StimulusTable};

use crate::conditions::{group_conditions, ConditionTable};
use crate::error::{AnalysisError, AnalysisResult};
use crate::metrics::{
    fano_factor, lifetime_sparseness, overall_firing_rate, preferred_condition, reliability,
    running_modulation, time_to_peak, RunningModulation,
};
use crate::receptive_field::{
    rf_on_screen, rf_stats_with, AreaMode, FitOptions, GridValue, ReceptiveFieldGrid, RfStats,
    RfStatsOptions,
};
use crate::significance::chi_square_permutation;
use crate::spikes::{
    binned_spike_counts, presentationwise_spike_times, spike_counts, PresentationwiseSpikeTime,
    SpikeWindow,
};
use crate::statistics::{
    conditionwise_psth, conditionwise_statistics, presentationwise_statistics, ConditionwisePsth,
    ConditionwiseTable, PresentationwiseTable, PsthConfig,
};
use crate::table::Table;

const LOG_TARGET: &str = "ecephys_stimulus_analysis";

/// Analysis parameters, usually taken from [`EcephysConfig`]
#[derive(Debug, Clone, PartialEq)]
pub struct ReceptiveFieldMappingParams {
    pub stimulus_name: String,
    pub azimuth_column: String,
    pub elevation_column: String,
    /// Seconds; informational, the presentation stop times bound each trial
    pub trial_duration: f64,
    pub psth: PsthConfig,
    /// Fraction of the peak-to-mean range kept by the receptive-field mask
    pub mask_threshold: f64,
    /// Units with fewer spikes during mapping get no receptive field
    pub minimum_spike_count: f64,
    pub area_mode: AreaMode,
    pub grid_value: GridValue,
    pub shuffle_count: usize,
    pub shuffle_seed: u64,
    pub max_fit_iterations: usize,
    /// cm/s
    pub speed_threshold: f64,
    pub parallel: bool,
    /// 0 uses the global rayon pool
    pub max_threads: usize,
}

impl Default for ReceptiveFieldMappingParams {
    fn default() -> Self {
        Self::from_config(&EcephysConfig::default())
    }
}

impl ReceptiveFieldMappingParams {
    pub fn from_config(config: &EcephysConfig) -> Self {
        Self {
            stimulus_name: config.stimulus.stimulus_name.clone(),
            azimuth_column: config.stimulus.azimuth_column.clone(),
            elevation_column: config.stimulus.elevation_column.clone(),
            trial_duration: config.stimulus.trial_duration,
            psth: PsthConfig::from_config(&config.psth, &config.stimulus),
            mask_threshold: config.receptive_field.mask_threshold,
            minimum_spike_count: config.receptive_field.minimum_spike_count,
            area_mode: config.receptive_field.area_mode.into(),
            grid_value: GridValue::SpikeCount,
            shuffle_count: config.receptive_field.shuffle_count,
            shuffle_seed: config.receptive_field.shuffle_seed,
            max_fit_iterations: config.receptive_field.max_fit_iterations,
            speed_threshold: config.running.speed_threshold,
            parallel: config.system.parallel,
            max_threads: config.system.max_threads,
        }
    }

    fn rf_options(&self) -> RfStatsOptions {
        RfStatsOptions {
            area_mode: self.area_mode,
            fit: FitOptions {
                max_iterations: self.max_fit_iterations,
                ..FitOptions::default()
            },
        }
    }
}

/// One row of the metrics table
///
/// Receptive-field columns are in degrees; `width_rf` spans elevation and
/// `height_rf` azimuth, as in [`RfStats`]. `p_value_rf` is the label-shuffle
/// p-value of the position tuning; `run_pval_rf`/`run_mod_rf` compare
/// running and stationary trials of the preferred position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReceptiveFieldMetrics {
    pub unit_id: u64,
    pub azimuth_rf: f64,
    pub elevation_rf: f64,
    pub width_rf: f64,
    pub height_rf: f64,
    pub area_rf: f64,
    pub p_value_rf: f64,
    pub on_screen_rf: bool,
    pub firing_rate_rf: f64,
    pub fano_rf: f64,
    pub time_to_peak_rf: f64,
    pub reliability_rf: f64,
    pub lifetime_sparseness_rf: f64,
    pub run_pval_rf: f64,
    pub run_mod_rf: f64,
}

pub type MetricsTable = Table<ReceptiveFieldMetrics>;

/// Borrowed inputs shared by every per-unit metric computation
struct MetricsContext<'a> {
    counts: &'a Array2<u32>,
    binned: Array3<u32>,
    conditionwise: &'a ConditionwiseTable,
    psth: &'a ConditionwisePsth,
    grids: &'a [ReceptiveFieldGrid],
    /// Condition index of every presentation, in table order
    categories: Vec<usize>,
    /// Mean running speed of every presentation; `None` without a trace
    speeds: Option<Vec<Option<f64>>>,
}

pub struct ReceptiveFieldMapping {
    stim_table: StimulusTable,
    spike_trains: SpikeTrains,
    running_speed: Option<RunningSpeed>,
    params: ReceptiveFieldMappingParams,
    conditions: ConditionTable,
    unit_ids: Vec<u64>,
    azimuths: Vec<f64>,
    elevations: Vec<f64>,

    spike_counts: OnceLock<Array2<u32>>,
    presentationwise_spike_times: OnceLock<Vec<PresentationwiseSpikeTime>>,
    presentationwise_statistics: OnceLock<PresentationwiseTable>,
    conditionwise_statistics: OnceLock<ConditionwiseTable>,
    conditionwise_psth: OnceLock<ConditionwisePsth>,
    receptive_fields: OnceLock<Vec<ReceptiveFieldGrid>>,
    metrics: OnceLock<MetricsTable>,
}

/// Fill `cell` from a fallible initialiser
///
/// Two racing callers may both run `init`; only the first result is kept.
fn cached<T>(cell: &OnceLock<T>, init: impl FnOnce() -> AnalysisResult<T>) -> AnalysisResult<&T> {
    if let Some(value) = cell.get() {
        return Ok(value);
    }
    let value = init()?;
    Ok(cell.get_or_init(|| value))
}

impl ReceptiveFieldMapping {
    /// Restrict `table` to the mapping stimulus and group it by position
    ///
    /// # Errors
    /// * `EmptyStimulus` when no presentation carries `params.stimulus_name`
    /// * `MissingParameterColumns` when a mapping presentation lacks a
    ///   position column
    /// * `NonNumericParameter` when a position is not a number
    /// * `InvalidBins` / `InvalidParameters` for unusable analysis parameters
    pub fn new(
        table: &StimulusTable,
        spike_trains: SpikeTrains,
        running_speed: Option<RunningSpeed>,
        params: ReceptiveFieldMappingParams,
    ) -> AnalysisResult<Self> {
        if !(0.0..=1.0).contains(&params.mask_threshold) {
            return Err(AnalysisError::InvalidParameters(format!(
                "mask threshold {} is outside [0, 1]",
                params.mask_threshold
            )));
        }
        params.psth.bin_edges()?;

        let stim_table = table.filter_by_stimulus_name(&params.stimulus_name);
        if stim_table.is_empty() {
            return Err(AnalysisError::EmptyStimulus(params.stimulus_name.clone()));
        }

        let conditions = group_conditions(
            &stim_table,
            &[params.azimuth_column.as_str(), params.elevation_column.as_str()],
        )?;
        for condition in conditions.conditions() {
            for column in conditions.columns() {
                if condition.value(column).and_then(|v| v.as_f64()).is_none() {
                    return Err(AnalysisError::NonNumericParameter {
                        stimulus_condition_id: condition.stimulus_condition_id,
                        column: column.clone(),
                    });
                }
            }
        }

        let azimuths = stim_table.unique_values(&params.azimuth_column);
        let elevations = stim_table.unique_values(&params.elevation_column);
        let unit_ids = spike_trains.unit_ids();

        info!(
            target: LOG_TARGET,
            stimulus = %params.stimulus_name,
            presentations = stim_table.len(),
            conditions = conditions.len(),
            units = unit_ids.len(),
            azimuths = azimuths.len(),
            elevations = elevations.len(),
            "receptive field mapping prepared"
        );

        Ok(Self {
            stim_table,
            spike_trains,
            running_speed,
            params,
            conditions,
            unit_ids,
            azimuths,
            elevations,
            spike_counts: OnceLock::new(),
            presentationwise_spike_times: OnceLock::new(),
            presentationwise_statistics: OnceLock::new(),
            conditionwise_statistics: OnceLock::new(),
            conditionwise_psth: OnceLock::new(),
            receptive_fields: OnceLock::new(),
            metrics: OnceLock::new(),
        })
    }

    pub fn params(&self) -> &ReceptiveFieldMappingParams {
        &self.params
    }

    /// Mapping presentations only, in start-time order
    pub fn stim_table(&self) -> &StimulusTable {
        &self.stim_table
    }

    pub fn spike_trains(&self) -> &SpikeTrains {
        &self.spike_trains
    }

    pub fn unit_ids(&self) -> &[u64] {
        &self.unit_ids
    }

    /// Sorted distinct azimuths of the mapping stimulus
    pub fn azimuths(&self) -> &[f64] {
        &self.azimuths
    }

    /// Sorted distinct elevations of the mapping stimulus
    pub fn elevations(&self) -> &[f64] {
        &self.elevations
    }

    pub fn number_azimuths(&self) -> usize {
        self.azimuths.len()
    }

    pub fn number_elevations(&self) -> usize {
        self.elevations.len()
    }

    pub fn stimulus_conditions(&self) -> &ConditionTable {
        &self.conditions
    }

    fn spike_counts(&self) -> &Array2<u32> {
        self.spike_counts
            .get_or_init(|| spike_counts(&self.stim_table, &self.spike_trains, SpikeWindow::Presentation))
    }

    pub fn presentationwise_spike_times(&self) -> &[PresentationwiseSpikeTime] {
        self.presentationwise_spike_times.get_or_init(|| {
            presentationwise_spike_times(&self.stim_table, &self.spike_trains, SpikeWindow::Presentation)
        })
    }

    pub fn presentationwise_statistics(&self) -> AnalysisResult<&PresentationwiseTable> {
        cached(&self.presentationwise_statistics, || {
            presentationwise_statistics(
                &self.stim_table,
                &self.conditions,
                &self.unit_ids,
                self.spike_counts(),
                self.running_speed.as_ref(),
            )
        })
    }

    pub fn conditionwise_statistics(&self) -> AnalysisResult<&ConditionwiseTable> {
        cached(&self.conditionwise_statistics, || {
            conditionwise_statistics(&self.stim_table, &self.conditions, &self.unit_ids, self.spike_counts())
        })
    }

    /// Mean firing rate indexed `[condition][bin][unit]`
    pub fn conditionwise_psth(&self) -> AnalysisResult<&ConditionwisePsth> {
        cached(&self.conditionwise_psth, || {
            conditionwise_psth(&self.stim_table, &self.conditions, &self.spike_trains, &self.params.psth)
        })
    }

    /// Response grids of every unit, in unit-id order
    pub fn receptive_fields(&self) -> AnalysisResult<&[ReceptiveFieldGrid]> {
        let grids = cached(&self.receptive_fields, || {
            let statistics = self.conditionwise_statistics()?;
            self.unit_ids
                .iter()
                .map(|&unit_id| {
                    ReceptiveFieldGrid::from_conditionwise(
                        unit_id,
                        &self.conditions,
                        statistics,
                        &self.params.azimuth_column,
                        &self.params.elevation_column,
                        self.params.grid_value,
                    )
                })
                .collect()
        })?;
        Ok(grids.as_slice())
    }

    /// Response grid of one unit
    ///
    /// # Errors
    /// `UnknownUnit` when `unit_id` has no spike train.
    pub fn receptive_field(&self, unit_id: u64) -> AnalysisResult<&ReceptiveFieldGrid> {
        let column = self
            .unit_ids
            .iter()
            .position(|&id| id == unit_id)
            .ok_or(AnalysisError::UnknownUnit(unit_id))?;
        Ok(&self.receptive_fields()?[column])
    }

    /// One metrics row per unit, in unit-id order
    pub fn metrics(&self) -> AnalysisResult<&MetricsTable> {
        cached(&self.metrics, || {
            let context = self.metrics_context()?;
            if context.speeds.is_none() {
                warn!(target: LOG_TARGET, "no running speed trace; running modulation columns are NaN");
            }
            let rows = self.compute_rows(&context);
            info!(target: LOG_TARGET, units = rows.len(), "receptive field metrics computed");
            Ok(Table::new(rows))
        })
    }

    fn metrics_context(&self) -> AnalysisResult<MetricsContext<'_>> {
        let edges = self.params.psth.bin_edges()?;
        let categories = self
            .stim_table
            .iter()
            .map(|presentation| {
                self.conditions
                    .condition_of(presentation.id)
                    .map(|id| id as usize)
                    .ok_or_else(|| {
                        AnalysisError::InvalidParameters(format!(
                            "presentation {} has no stimulus condition",
                            presentation.id
                        ))
                    })
            })
            .collect::<AnalysisResult<Vec<usize>>>()?;
        let speeds = self.running_speed.as_ref().map(|trace| {
            self.stim_table
                .iter()
                .map(|p| trace.mean_velocity(p.start_time, p.stop_time))
                .collect()
        });

        Ok(MetricsContext {
            counts: self.spike_counts(),
            binned: binned_spike_counts(&self.stim_table, &self.spike_trains, &edges)?,
            conditionwise: self.conditionwise_statistics()?,
            psth: self.conditionwise_psth()?,
            grids: self.receptive_fields()?,
            categories,
            speeds,
        })
    }

    #[cfg(feature = "parallel")]
    fn compute_rows(&self, context: &MetricsContext<'_>) -> Vec<ReceptiveFieldMetrics> {
        use rayon::prelude::*;

        if !self.params.parallel {
            return self.compute_rows_sequential(context);
        }

        let run = || -> Vec<ReceptiveFieldMetrics> {
            (0..self.unit_ids.len())
                .into_par_iter()
                .map(|column| self.unit_metrics(column, context))
                .collect()
        };

        if self.params.max_threads > 0 {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.params.max_threads)
                .build()
            {
                Ok(pool) => return pool.install(run),
                Err(e) => warn!(
                    target: LOG_TARGET,
                    error = %e,
                    "could not build metrics thread pool; using the global pool"
                ),
            }
        }
        run()
    }

    #[cfg(not(feature = "parallel"))]
    fn compute_rows(&self, context: &MetricsContext<'_>) -> Vec<ReceptiveFieldMetrics> {
        self.compute_rows_sequential(context)
    }

    fn compute_rows_sequential(&self, context: &MetricsContext<'_>) -> Vec<ReceptiveFieldMetrics> {
        (0..self.unit_ids.len())
            .map(|column| self.unit_metrics(column, context))
            .collect()
    }

    /// Table positions of the presentations of one condition
    fn trial_positions(&self, condition_id: u64) -> Vec<usize> {
        self.conditions
            .presentations_of(condition_id)
            .iter()
            .filter_map(|&id| self.stim_table.position(id))
            .collect()
    }

    fn unit_metrics(&self, column: usize, context: &MetricsContext<'_>) -> ReceptiveFieldMetrics {
        let unit_id = self.unit_ids[column];
        let grid = &context.grids[column];

        let total_spikes: u64 = context.conditionwise.for_unit(unit_id).map(|row| row.spike_count).sum();
        let enough_spikes = total_spikes as f64 >= self.params.minimum_spike_count;

        let (stats, p_value) = if enough_spikes {
            let stats = rf_stats_with(&grid.values, self.params.mask_threshold, &self.params.rf_options());
            if !stats.found {
                debug!(target: LOG_TARGET, unit_id, "no receptive field found");
            }
            let responses: Vec<f64> = context.counts.column(column).iter().map(|&c| f64::from(c)).collect();
            let mut rng = StdRng::seed_from_u64(self.params.shuffle_seed.wrapping_add(unit_id));
            let p_value = chi_square_permutation(&responses, &context.categories, self.params.shuffle_count, &mut rng);
            (stats, p_value)
        } else {
            debug!(
                target: LOG_TARGET,
                unit_id,
                total_spikes,
                minimum = self.params.minimum_spike_count,
                "too few spikes for receptive field estimation"
            );
            (RfStats::missing(), f64::NAN)
        };

        let step_azimuth = grid.step_azimuth();
        let step_elevation = grid.step_elevation();

        let means: Vec<f64> = context.conditionwise.for_unit(unit_id).map(|row| row.spike_mean).collect();
        let preferred = preferred_condition(context.conditionwise, unit_id);

        let (fano, trial_reliability, peak_time, running) = match preferred {
            Some(condition_id) => {
                let positions = self.trial_positions(condition_id);
                let counts: Vec<f64> = positions
                    .iter()
                    .map(|&p| f64::from(context.counts[[p, column]]))
                    .collect();

                let n_bins = context.binned.len_of(Axis(1));
                let trials = Array2::from_shape_fn((positions.len(), n_bins), |(trial, bin)| {
                    f64::from(context.binned[[positions[trial], bin, column]])
                });

                let running = match &context.speeds {
                    Some(speeds) => {
                        let trial_speeds: Vec<Option<f64>> = positions.iter().map(|&p| speeds[p]).collect();
                        running_modulation(&counts, &trial_speeds, self.params.speed_threshold)
                    }
                    None => RunningModulation::missing(),
                };

                (
                    fano_factor(&counts),
                    reliability(trials.view()),
                    time_to_peak(context.psth, condition_id, unit_id),
                    running,
                )
            }
            None => (f64::NAN, f64::NAN, f64::NAN, RunningModulation::missing()),
        };

        let firing_rate = self
            .spike_trains
            .get(unit_id)
            .map_or(f64::NAN, |train| overall_firing_rate(&self.stim_table, train));

        ReceptiveFieldMetrics {
            unit_id,
            azimuth_rf: grid.azimuth_at(stats.azimuth),
            elevation_rf: grid.elevation_at(stats.elevation),
            width_rf: stats.width * step_elevation,
            height_rf: stats.height * step_azimuth,
            area_rf: stats.area * step_azimuth * step_elevation,
            p_value_rf: p_value,
            on_screen_rf: rf_on_screen(grid, stats.azimuth, stats.elevation),
            firing_rate_rf: firing_rate,
            fano_rf: fano,
            time_to_peak_rf: peak_time,
            reliability_rf: trial_reliability,
            lifetime_sparseness_rf: lifetime_sparseness(&means),
            run_pval_rf: running.p_value,
            run_mod_rf: running.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecephys_structures::StimulusPresentation;
    use std::collections::BTreeMap;

    fn small_session() -> (StimulusTable, SpikeTrains) {
        let mut presentations = vec![StimulusPresentation::new(0, 0.0, 1.0, "spontaneous")];
        let mut id = 1;
        for repeat in 0..2 {
            for &x in &[-10.0, 0.0, 10.0] {
                for &y in &[-10.0, 0.0, 10.0] {
                    let start = 1.0 + (id - 1) as f64 * 0.25;
                    presentations.push(
                        StimulusPresentation::new(id, start, start + 0.25, "gabors")
                            .with_block(repeat)
                            .with_parameter("x_position", x)
                            .with_parameter("y_position", y),
                    );
                    id += 1;
                }
            }
        }
        let table = StimulusTable::new(presentations).unwrap();

        // unit 1 fires at x=0, y=0 in both repeats
        let centre: Vec<f64> = table
            .iter()
            .filter(|p| {
                p.parameter("x_position").and_then(|v| v.as_f64()) == Some(0.0)
                    && p.parameter("y_position").and_then(|v| v.as_f64()) == Some(0.0)
            })
            .flat_map(|p| (0..8).map(move |k| p.start_time + 0.01 + k as f64 * 0.02))
            .collect();
        let mut map = BTreeMap::new();
        map.insert(1, centre);
        map.insert(2, vec![]);
        (table, SpikeTrains::from_map(map).unwrap())
    }

    fn params() -> ReceptiveFieldMappingParams {
        ReceptiveFieldMappingParams {
            shuffle_count: 50,
            parallel: false,
            ..ReceptiveFieldMappingParams::default()
        }
    }

    #[test]
    fn test_filters_to_mapping_stimulus() {
        let (table, trains) = small_session();
        let mapping = ReceptiveFieldMapping::new(&table, trains, None, params()).unwrap();
        assert_eq!(mapping.stim_table().len(), 18);
        assert_eq!(mapping.stimulus_conditions().len(), 9);
        assert_eq!(mapping.azimuths(), &[-10.0, 0.0, 10.0]);
        assert_eq!(mapping.number_elevations(), 3);
        assert_eq!(mapping.unit_ids(), &[1, 2]);
    }

    #[test]
    fn test_unknown_stimulus_is_rejected() {
        let (table, trains) = small_session();
        let params = ReceptiveFieldMappingParams {
            stimulus_name: "flashes".to_string(),
            ..params()
        };
        let result = ReceptiveFieldMapping::new(&table, trains, None, params);
        assert!(matches!(result, Err(AnalysisError::EmptyStimulus(name)) if name == "flashes"));
    }

    #[test]
    fn test_missing_position_column_is_rejected() {
        let (table, trains) = small_session();
        let params = ReceptiveFieldMappingParams {
            elevation_column: "phase".to_string(),
            ..params()
        };
        let result = ReceptiveFieldMapping::new(&table, trains, None, params);
        assert!(matches!(result, Err(AnalysisError::MissingParameterColumns { .. })));
    }

    #[test]
    fn test_unknown_unit_grid() {
        let (table, trains) = small_session();
        let mapping = ReceptiveFieldMapping::new(&table, trains, None, params()).unwrap();
        assert!(matches!(mapping.receptive_field(99), Err(AnalysisError::UnknownUnit(99))));
        assert_eq!(mapping.receptive_field(1).unwrap().values[[1, 1]], 16.0);
    }

    #[test]
    fn test_metrics_for_centred_unit() {
        let (table, trains) = small_session();
        let mapping = ReceptiveFieldMapping::new(&table, trains, None, params()).unwrap();
        let metrics = mapping.metrics().unwrap();
        assert_eq!(metrics.len(), 2);

        let centred = &metrics.rows()[0];
        assert_eq!(centred.unit_id, 1);
        assert_eq!(centred.azimuth_rf, 0.0);
        assert_eq!(centred.elevation_rf, 0.0);
        assert!(centred.on_screen_rf);
        assert_eq!(centred.lifetime_sparseness_rf, 1.0);
        assert_eq!(centred.fano_rf, 0.0);
        assert!(centred.run_mod_rf.is_nan());

        let silent = &metrics.rows()[1];
        assert!(silent.azimuth_rf.is_nan());
        assert!(silent.p_value_rf.is_nan());
        assert!(!silent.on_screen_rf);
        assert_eq!(silent.firing_rate_rf, 0.0);
    }

    #[test]
    fn test_tables_are_cached() {
        let (table, trains) = small_session();
        let mapping = ReceptiveFieldMapping::new(&table, trains, None, params()).unwrap();
        let first = mapping.conditionwise_statistics().unwrap() as *const ConditionwiseTable;
        let second = mapping.conditionwise_statistics().unwrap() as *const ConditionwiseTable;
        assert_eq!(first, second);
        assert_eq!(mapping.presentationwise_statistics().unwrap().len(), 36);
    }
}
