// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Sorted spike trains and windowed lookup.
//!
//! Window queries rely on the non-decreasing invariant established at
//! construction and cost two binary searches regardless of train length.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{EcephysDataError, Result};

/// Spike times of one unit, in seconds, non-decreasing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitSpikeTrain {
    unit_id: u64,
    times: Vec<f64>,
}

impl UnitSpikeTrain {
    pub fn new(unit_id: u64, times: Vec<f64>) -> Result<Self> {
        for (index, &t) in times.iter().enumerate() {
            if !t.is_finite() {
                return Err(EcephysDataError::NonFiniteTime {
                    what: "spike time",
                    value: t,
                });
            }
            if index > 0 && t < times[index - 1] {
                return Err(EcephysDataError::NonMonotonicSpikeTimes { unit_id, index });
            }
        }
        Ok(Self { unit_id, times })
    }

    pub fn unit_id(&self) -> u64 {
        self.unit_id
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Index of the first spike at or after `t`
    #[inline]
    pub fn lower_bound(&self, t: f64) -> usize {
        self.times.partition_point(|&spike| spike < t)
    }

    /// Spikes with `start <= t < stop`
    pub fn window(&self, start: f64, stop: f64) -> &[f64] {
        let lo = self.lower_bound(start);
        let hi = self.lower_bound(stop).max(lo);
        &self.times[lo..hi]
    }

    pub fn count_in(&self, start: f64, stop: f64) -> usize {
        self.window(start, stop).len()
    }
}

/// All units of a recording, keyed and iterated by unit id
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpikeTrains {
    trains: BTreeMap<u64, UnitSpikeTrain>,
}

impl SpikeTrains {
    pub fn new(trains: Vec<UnitSpikeTrain>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for train in trains {
            let unit_id = train.unit_id;
            if map.insert(unit_id, train).is_some() {
                return Err(EcephysDataError::DuplicateUnitId(unit_id));
            }
        }
        Ok(Self { trains: map })
    }

    pub fn from_map(map: BTreeMap<u64, Vec<f64>>) -> Result<Self> {
        let trains = map
            .into_iter()
            .map(|(unit_id, times)| UnitSpikeTrain::new(unit_id, times).map(|train| (unit_id, train)))
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(Self { trains })
    }

    pub fn unit_ids(&self) -> Vec<u64> {
        self.trains.keys().copied().collect()
    }

    pub fn get(&self, unit_id: u64) -> Option<&UnitSpikeTrain> {
        self.trains.get(&unit_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &UnitSpikeTrain> {
        self.trains.values()
    }

    pub fn len(&self) -> usize {
        self.trains.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trains.is_empty()
    }

    pub fn total_spikes(&self) -> usize {
        self.trains.values().map(UnitSpikeTrain::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_window_is_half_open() {
        let train = UnitSpikeTrain::new(1, vec![0.1, 0.2, 0.2, 0.3, 0.5]).unwrap();
        assert_eq!(train.window(0.2, 0.5), &[0.2, 0.2, 0.3]);
        assert_eq!(train.count_in(0.0, 0.1), 0);
        assert_eq!(train.count_in(0.5, 0.6), 1);
    }

    #[test]
    fn test_empty_and_inverted_windows() {
        let train = UnitSpikeTrain::new(1, vec![0.1, 0.2]).unwrap();
        assert!(train.window(0.3, 0.1).is_empty());
        let silent = UnitSpikeTrain::new(2, vec![]).unwrap();
        assert!(silent.window(0.0, 100.0).is_empty());
    }

    #[test]
    fn test_rejects_decreasing_times() {
        assert_eq!(
            UnitSpikeTrain::new(7, vec![0.1, 0.3, 0.2]),
            Err(EcephysDataError::NonMonotonicSpikeTimes { unit_id: 7, index: 2 })
        );
    }

    #[test]
    fn test_spike_trains_ordered_by_unit() {
        let mut map = BTreeMap::new();
        map.insert(30, vec![1.0]);
        map.insert(10, vec![0.5, 0.6]);
        let trains = SpikeTrains::from_map(map).unwrap();
        assert_eq!(trains.unit_ids(), vec![10, 30]);
        assert_eq!(trains.total_spikes(), 3);
        assert_eq!(trains.get(10).unwrap().len(), 2);
    }

    #[test]
    fn test_duplicate_unit_rejected() {
        let a = UnitSpikeTrain::new(1, vec![]).unwrap();
        let b = UnitSpikeTrain::new(1, vec![0.4]).unwrap();
        assert_eq!(SpikeTrains::new(vec![a, b]), Err(EcephysDataError::DuplicateUnitId(1)));
    }
}
