// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Condition grouping.
//!
//! A stimulus condition is a distinct combination of values over a fixed set
//! of parameter columns. Ids are assigned in first-seen order while walking
//! the table in start-time order, starting at 0, so grouping the same table
//! twice always yields the same ids. Values are compared through
//! [`ParameterKey`]: exact float equality, NaN equal to NaN, `-0.0 == 0.0`.

use ahash::AHashMap;
use serde::Serialize;
use std::collections::BTreeMap;

use ecephys_structures::{ParameterKey, ParameterValue, StimulusTable};

use crate::error::{AnalysisError, AnalysisResult};

/// One distinct parameter combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StimulusCondition {
    pub stimulus_condition_id: u64,
    pub parameters: BTreeMap<String, ParameterValue>,
    /// Number of presentations showing this condition
    pub presentation_count: usize,
}

impl StimulusCondition {
    pub fn value(&self, column: &str) -> Option<&ParameterValue> {
        self.parameters.get(column)
    }
}

/// Result of [`group_conditions`]
#[derive(Debug, Clone, Default)]
pub struct ConditionTable {
    columns: Vec<String>,
    conditions: Vec<StimulusCondition>,
    lookup: AHashMap<Vec<ParameterKey>, u64>,
    by_presentation: AHashMap<u64, u64>,
    members: Vec<Vec<u64>>,
}

impl ConditionTable {
    /// Grouping columns, in the order given
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Conditions ordered by id
    pub fn conditions(&self) -> &[StimulusCondition] {
        &self.conditions
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn condition(&self, condition_id: u64) -> Option<&StimulusCondition> {
        self.conditions.get(condition_id as usize)
    }

    pub fn condition_of(&self, presentation_id: u64) -> Option<u64> {
        self.by_presentation.get(&presentation_id).copied()
    }

    /// Presentation ids of a condition in start-time order
    pub fn presentations_of(&self, condition_id: u64) -> &[u64] {
        self.members
            .get(condition_id as usize)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Condition id for values given in column order
    pub fn find(&self, values: &[ParameterValue]) -> Option<u64> {
        let key: Vec<ParameterKey> = values.iter().map(ParameterKey::from).collect();
        self.lookup.get(&key).copied()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&self.conditions)
    }
}

/// Assign every presentation of `table` a condition over `columns`
///
/// # Errors
/// `MissingParameterColumns` for the first presentation lacking any of the
/// columns, listing every column it lacks.
pub fn group_conditions<S: AsRef<str>>(
    table: &StimulusTable,
    columns: &[S],
) -> AnalysisResult<ConditionTable> {
    let columns: Vec<String> = columns.iter().map(|c| c.as_ref().to_string()).collect();
    let mut grouped = ConditionTable {
        columns,
        ..ConditionTable::default()
    };

    for presentation in table {
        let mut values = Vec::with_capacity(grouped.columns.len());
        let mut missing = Vec::new();
        for column in &grouped.columns {
            match presentation.parameter(column) {
                Some(value) => values.push(value),
                None => missing.push(column.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(AnalysisError::MissingParameterColumns {
                presentation_id: presentation.id,
                columns: missing,
            });
        }

        let key: Vec<ParameterKey> = values.iter().map(|v| v.key()).collect();
        let next_id = grouped.conditions.len() as u64;
        let condition_id = *grouped.lookup.entry(key).or_insert(next_id);

        if condition_id == next_id {
            grouped.conditions.push(StimulusCondition {
                stimulus_condition_id: condition_id,
                parameters: grouped
                    .columns
                    .iter()
                    .cloned()
                    .zip(values.into_iter().cloned())
                    .collect(),
                presentation_count: 0,
            });
            grouped.members.push(Vec::new());
        }

        grouped.conditions[condition_id as usize].presentation_count += 1;
        grouped.members[condition_id as usize].push(presentation.id);
        grouped.by_presentation.insert(presentation.id, condition_id);
    }

    tracing::debug!(
        target: "ecephys_stimulus_analysis",
        presentations = table.len(),
        conditions = grouped.conditions.len(),
        "grouped stimulus conditions"
    );
    Ok(grouped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ecephys_structures::StimulusPresentation;

    fn table() -> StimulusTable {
        StimulusTable::new(vec![
            StimulusPresentation::new(0, 0.0, 1.0, "gabors")
                .with_parameter("x", 10.0)
                .with_parameter("y", 0.0),
            StimulusPresentation::new(1, 1.0, 2.0, "gabors")
                .with_parameter("x", -10.0)
                .with_parameter("y", 0.0),
            StimulusPresentation::new(2, 2.0, 3.0, "gabors")
                .with_parameter("x", 10.0)
                .with_parameter("y", -0.0),
            StimulusPresentation::new(3, 3.0, 4.0, "spontaneous")
                .with_parameter("x", f64::NAN)
                .with_parameter("y", f64::NAN),
            StimulusPresentation::new(4, 4.0, 5.0, "spontaneous")
                .with_parameter("x", f64::NAN)
                .with_parameter("y", f64::NAN),
        ])
        .unwrap()
    }

    #[test]
    fn test_first_seen_ids() {
        let grouped = group_conditions(&table(), &["x", "y"]).unwrap();
        assert_eq!(grouped.len(), 3);
        assert_eq!(grouped.condition_of(0), Some(0));
        assert_eq!(grouped.condition_of(1), Some(1));
        assert_eq!(grouped.condition_of(2), Some(0));
        assert_eq!(grouped.presentations_of(0), &[0, 2]);
        assert_eq!(grouped.condition(0).unwrap().presentation_count, 2);
    }

    #[test]
    fn test_nan_groups_together() {
        let grouped = group_conditions(&table(), &["x", "y"]).unwrap();
        assert_eq!(grouped.condition_of(3), Some(2));
        assert_eq!(grouped.condition_of(4), Some(2));
        assert_eq!(
            grouped.find(&[ParameterValue::Float(f64::NAN), ParameterValue::Float(f64::NAN)]),
            Some(2)
        );
    }

    #[test]
    fn test_idempotent() {
        let t = table();
        let a = group_conditions(&t, &["x", "y"]).unwrap();
        let b = group_conditions(&t, &["x", "y"]).unwrap();
        assert_eq!(a.conditions().len(), b.conditions().len());
        for id in t.ids() {
            assert_eq!(a.condition_of(id), b.condition_of(id));
        }
    }

    #[test]
    fn test_missing_columns_reported() {
        let t = StimulusTable::new(vec![
            StimulusPresentation::new(0, 0.0, 1.0, "gabors").with_parameter("x", 1.0),
            StimulusPresentation::new(1, 1.0, 2.0, "gabors"),
        ])
        .unwrap();
        match group_conditions(&t, &["x", "y", "orientation"]) {
            Err(AnalysisError::MissingParameterColumns {
                presentation_id,
                columns,
            }) => {
                assert_eq!(presentation_id, 0);
                assert_eq!(columns, vec!["y".to_string(), "orientation".to_string()]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_no_columns_single_condition() {
        let grouped = group_conditions::<&str>(&table(), &[]).unwrap();
        assert_eq!(grouped.len(), 1);
        assert_eq!(grouped.presentations_of(0).len(), 5);
    }
}
