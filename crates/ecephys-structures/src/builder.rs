// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stimulus table construction from raw presentation records.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::error::{EcephysDataError, Result};
use crate::parameter::ParameterValue;
use crate::presentation::{StimulusPresentation, StimulusTable, SPONTANEOUS_STIMULUS_NAME};
use crate::timestamps::StimulusTimestamps;

/// A presentation as logged by the stimulus software, in display frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresentationRecord {
    pub start_frame: usize,
    pub end_frame: usize,
    pub stimulus_name: String,
    pub stimulus_block: Option<i64>,
    pub parameters: BTreeMap<String, ParameterValue>,
}

/// A presentation whose bounds are already in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimedPresentationRecord {
    pub start_time: f64,
    pub stop_time: f64,
    pub stimulus_name: String,
    pub stimulus_block: Option<i64>,
    pub parameters: BTreeMap<String, ParameterValue>,
}

/// Builds a [`StimulusTable`] with ids assigned in start-time order
///
/// # Example
/// ```
/// use ecephys_structures::{PresentationRecord, StimulusTableBuilder, StimulusTimestamps};
/// use std::collections::BTreeMap;
///
/// let timestamps = StimulusTimestamps::from_stimulus_log(&[250.0; 8], 0.0).unwrap();
/// let record = PresentationRecord {
///     start_frame: 2,
///     end_frame: 3,
///     stimulus_name: "gabors".into(),
///     stimulus_block: Some(1),
///     parameters: BTreeMap::new(),
/// };
/// let table = StimulusTableBuilder::from_frame_records(vec![record], &timestamps)
///     .unwrap()
///     .build()
///     .unwrap();
/// assert_eq!(table.get(0).unwrap().start_time, 0.5);
/// ```
#[derive(Debug, Clone, Default)]
pub struct StimulusTableBuilder {
    records: Vec<TimedPresentationRecord>,
    spontaneous_min_gap: Option<f64>,
}

impl StimulusTableBuilder {
    /// Map frame bounds to seconds through the aligned timestamps
    pub fn from_frame_records(
        records: Vec<PresentationRecord>,
        timestamps: &StimulusTimestamps,
    ) -> Result<Self> {
        let timed = records
            .into_iter()
            .map(|record| {
                if record.end_frame < record.start_frame {
                    return Err(EcephysDataError::EndBeforeStart {
                        start_frame: record.start_frame,
                        end_frame: record.end_frame,
                    });
                }
                Ok(TimedPresentationRecord {
                    start_time: timestamps.frame_time(record.start_frame)?,
                    stop_time: timestamps.frame_time(record.end_frame)?,
                    stimulus_name: record.stimulus_name,
                    stimulus_block: record.stimulus_block,
                    parameters: record.parameters,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self::from_time_records(timed))
    }

    pub fn from_time_records(records: Vec<TimedPresentationRecord>) -> Self {
        Self {
            records,
            spontaneous_min_gap: None,
        }
    }

    /// Fill gaps longer than `min_gap` seconds with spontaneous presentations
    ///
    /// Spontaneous rows carry NaN for every parameter column of the table.
    pub fn with_spontaneous_gaps(mut self, min_gap: f64) -> Self {
        self.spontaneous_min_gap = Some(min_gap);
        self
    }

    pub fn build(self) -> Result<StimulusTable> {
        let mut records = self.records;
        // stable, so equal start times keep their logged order
        records.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));

        if let Some(min_gap) = self.spontaneous_min_gap {
            records = insert_spontaneous(records, min_gap);
        }

        let presentations = records
            .into_iter()
            .enumerate()
            .map(|(id, record)| {
                let mut presentation = StimulusPresentation::new(
                    id as u64,
                    record.start_time,
                    record.stop_time,
                    record.stimulus_name,
                );
                presentation.stimulus_block = record.stimulus_block;
                presentation.parameters = record.parameters;
                presentation
            })
            .collect();

        StimulusTable::new(presentations)
    }
}

fn insert_spontaneous(records: Vec<TimedPresentationRecord>, min_gap: f64) -> Vec<TimedPresentationRecord> {
    let columns: BTreeSet<String> = records
        .iter()
        .flat_map(|r| r.parameters.keys().cloned())
        .collect();
    let blank_parameters: BTreeMap<String, ParameterValue> = columns
        .into_iter()
        .map(|column| (column, ParameterValue::Float(f64::NAN)))
        .collect();

    let mut out = Vec::with_capacity(records.len());
    let mut covered_until: Option<f64> = None;
    let mut inserted = 0usize;

    for record in records {
        if let Some(previous_stop) = covered_until {
            if record.start_time - previous_stop > min_gap {
                out.push(TimedPresentationRecord {
                    start_time: previous_stop,
                    stop_time: record.start_time,
                    stimulus_name: SPONTANEOUS_STIMULUS_NAME.to_string(),
                    stimulus_block: None,
                    parameters: blank_parameters.clone(),
                });
                inserted += 1;
            }
        }
        covered_until = Some(covered_until.map_or(record.stop_time, |t: f64| t.max(record.stop_time)));
        out.push(record);
    }

    if inserted > 0 {
        tracing::debug!(target: "ecephys_structures", inserted, "inserted spontaneous presentations");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timed(start: f64, stop: f64, x: f64) -> TimedPresentationRecord {
        let mut parameters = BTreeMap::new();
        parameters.insert("x_position".to_string(), ParameterValue::Float(x));
        TimedPresentationRecord {
            start_time: start,
            stop_time: stop,
            stimulus_name: "gabors".into(),
            stimulus_block: Some(1),
            parameters,
        }
    }

    #[test]
    fn test_ids_follow_start_time() {
        let table = StimulusTableBuilder::from_time_records(vec![
            timed(1.0, 1.25, 10.0),
            timed(0.0, 0.25, 20.0),
        ])
        .build()
        .unwrap();
        assert_eq!(table.get(0).unwrap().start_time, 0.0);
        assert_eq!(
            table.get(1).unwrap().parameter("x_position"),
            Some(&ParameterValue::Float(10.0))
        );
    }

    #[test]
    fn test_frame_records_use_timestamps() {
        let timestamps = StimulusTimestamps::from_precomputed(vec![0.0, 0.1, 0.2, 0.3]).unwrap();
        let record = PresentationRecord {
            start_frame: 1,
            end_frame: 3,
            stimulus_name: "gabors".into(),
            stimulus_block: None,
            parameters: BTreeMap::new(),
        };
        let table = StimulusTableBuilder::from_frame_records(vec![record], &timestamps)
            .unwrap()
            .build()
            .unwrap();
        let p = table.get(0).unwrap();
        assert_eq!((p.start_time, p.stop_time), (0.1, 0.3));
    }

    #[test]
    fn test_frame_out_of_range() {
        let timestamps = StimulusTimestamps::from_precomputed(vec![0.0, 0.1]).unwrap();
        let record = PresentationRecord {
            start_frame: 0,
            end_frame: 5,
            stimulus_name: "gabors".into(),
            stimulus_block: None,
            parameters: BTreeMap::new(),
        };
        assert_eq!(
            StimulusTableBuilder::from_frame_records(vec![record], &timestamps).unwrap_err(),
            EcephysDataError::FrameOutOfRange { frame: 5, len: 2 }
        );
    }

    #[test]
    fn test_end_before_start() {
        let timestamps = StimulusTimestamps::from_precomputed(vec![0.0, 0.1, 0.2]).unwrap();
        let record = PresentationRecord {
            start_frame: 2,
            end_frame: 1,
            stimulus_name: "gabors".into(),
            stimulus_block: None,
            parameters: BTreeMap::new(),
        };
        assert!(matches!(
            StimulusTableBuilder::from_frame_records(vec![record], &timestamps),
            Err(EcephysDataError::EndBeforeStart { start_frame: 2, end_frame: 1 })
        ));
    }

    #[test]
    fn test_spontaneous_gaps_filled() {
        let table = StimulusTableBuilder::from_time_records(vec![
            timed(0.0, 0.25, 10.0),
            timed(0.25, 0.5, 20.0),
            timed(10.0, 10.25, 30.0),
        ])
        .with_spontaneous_gaps(1.0)
        .build()
        .unwrap();

        assert_eq!(table.len(), 4);
        let blank = table.get(2).unwrap();
        assert_eq!(blank.stimulus_name, SPONTANEOUS_STIMULUS_NAME);
        assert_eq!((blank.start_time, blank.stop_time), (0.5, 10.0));
        assert!(blank.parameter("x_position").unwrap().is_nan());
        assert_eq!(table.get(3).unwrap().start_time, 10.0);
    }
}
