// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stimulus presentations and the immutable table holding them.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EcephysDataError, Result};
use crate::parameter::ParameterValue;

/// Stimulus name used for blank intervals between stimulus blocks
pub const SPONTANEOUS_STIMULUS_NAME: &str = "spontaneous";

/// One trial: a discrete display interval with its stimulus parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StimulusPresentation {
    pub id: u64,
    pub start_time: f64,
    pub stop_time: f64,
    pub duration: f64,
    pub stimulus_name: String,
    pub stimulus_block: Option<i64>,
    pub parameters: BTreeMap<String, ParameterValue>,
}

impl StimulusPresentation {
    pub fn new(id: u64, start_time: f64, stop_time: f64, stimulus_name: impl Into<String>) -> Self {
        Self {
            id,
            start_time,
            stop_time,
            duration: stop_time - start_time,
            stimulus_name: stimulus_name.into(),
            stimulus_block: None,
            parameters: BTreeMap::new(),
        }
    }

    pub fn with_block(mut self, block: i64) -> Self {
        self.stimulus_block = Some(block);
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<ParameterValue>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterValue> {
        self.parameters.get(name)
    }

    fn validate(&self) -> Result<()> {
        for (what, value) in [("start_time", self.start_time), ("stop_time", self.stop_time)] {
            if !value.is_finite() {
                return Err(EcephysDataError::NonFiniteTime { what, value });
            }
        }
        if self.stop_time < self.start_time {
            return Err(EcephysDataError::InvertedInterval {
                id: self.id,
                start_time: self.start_time,
                stop_time: self.stop_time,
            });
        }
        Ok(())
    }
}

/// Validated, start-time ordered set of presentations
///
/// Construction is the only way to obtain one, so every table in the
/// pipeline has finite times, non-inverted intervals and unique ids.
#[derive(Debug, Clone, Default)]
pub struct StimulusTable {
    presentations: Vec<StimulusPresentation>,
    index: AHashMap<u64, usize>,
}

impl StimulusTable {
    /// Validate and sort by `(start_time, id)`
    pub fn new(mut presentations: Vec<StimulusPresentation>) -> Result<Self> {
        for presentation in &presentations {
            presentation.validate()?;
        }
        presentations.sort_by(|a, b| a.start_time.total_cmp(&b.start_time).then(a.id.cmp(&b.id)));

        let mut index = AHashMap::with_capacity(presentations.len());
        for (position, presentation) in presentations.iter().enumerate() {
            if index.insert(presentation.id, position).is_some() {
                return Err(EcephysDataError::DuplicatePresentationId(presentation.id));
            }
        }

        Ok(Self { presentations, index })
    }

    pub fn len(&self) -> usize {
        self.presentations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presentations.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, StimulusPresentation> {
        self.presentations.iter()
    }

    pub fn as_slice(&self) -> &[StimulusPresentation] {
        &self.presentations
    }

    pub fn get(&self, id: u64) -> Option<&StimulusPresentation> {
        self.index.get(&id).map(|&position| &self.presentations[position])
    }

    /// Row position of a presentation id in start-time order
    pub fn position(&self, id: u64) -> Option<usize> {
        self.index.get(&id).copied()
    }

    pub fn ids(&self) -> Vec<u64> {
        self.presentations.iter().map(|p| p.id).collect()
    }

    pub fn start_times(&self) -> Vec<f64> {
        self.presentations.iter().map(|p| p.start_time).collect()
    }

    pub fn stop_times(&self) -> Vec<f64> {
        self.presentations.iter().map(|p| p.stop_time).collect()
    }

    /// Presentations of one stimulus, ids preserved
    pub fn filter_by_stimulus_name(&self, name: &str) -> StimulusTable {
        let presentations: Vec<StimulusPresentation> = self
            .presentations
            .iter()
            .filter(|p| p.stimulus_name == name)
            .cloned()
            .collect();
        let index = presentations
            .iter()
            .enumerate()
            .map(|(position, p)| (p.id, position))
            .collect();
        StimulusTable { presentations, index }
    }

    /// Distinct stimulus names in first-seen order
    pub fn stimulus_names(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        let mut names = Vec::new();
        for presentation in &self.presentations {
            if seen.insert(presentation.stimulus_name.as_str()) {
                names.push(presentation.stimulus_name.as_str());
            }
        }
        names
    }

    /// Union of parameter names across all presentations, sorted
    pub fn parameter_columns(&self) -> Vec<String> {
        let columns: BTreeSet<&String> = self
            .presentations
            .iter()
            .flat_map(|p| p.parameters.keys())
            .collect();
        columns.into_iter().cloned().collect()
    }

    /// Sorted distinct numeric values of `column`, NaN and text excluded
    pub fn unique_values(&self, column: &str) -> Vec<f64> {
        let mut values: Vec<f64> = self
            .presentations
            .iter()
            .filter_map(|p| p.parameter(column).and_then(ParameterValue::as_f64))
            .filter(|v| !v.is_nan())
            // fold -0.0 into 0.0
            .map(|v| v + 0.0)
            .collect();
        values.sort_by(f64::total_cmp);
        values.dedup();
        values
    }

    /// Export as a JSON array of presentation rows
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.presentations)
    }
}

impl<'a> IntoIterator for &'a StimulusTable {
    type Item = &'a StimulusPresentation;
    type IntoIter = std::slice::Iter<'a, StimulusPresentation>;

    fn into_iter(self) -> Self::IntoIter {
        self.presentations.iter()
    }
}
