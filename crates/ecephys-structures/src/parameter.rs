// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! Stimulus parameter values and their grouping key.
//!
//! Parameter columns are loosely typed (positions are floats, orientations may
//! be integers, some stimuli carry text labels) and non-applicable rows hold
//! NaN. [`ParameterKey`] makes the grouping rules explicit: floats compare by
//! exact value, every NaN equals every other NaN, and `-0.0` equals `0.0`.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// A single stimulus parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParameterValue {
    /// Numeric view; `None` for text
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParameterValue::Float(v) => Some(*v),
            ParameterValue::Int(v) => Some(*v as f64),
            ParameterValue::Text(_) => None,
        }
    }

    pub fn is_nan(&self) -> bool {
        matches!(self, ParameterValue::Float(v) if v.is_nan())
    }

    /// Hashable form used for condition grouping
    pub fn key(&self) -> ParameterKey {
        ParameterKey::from(self)
    }
}

impl From<f64> for ParameterValue {
    fn from(value: f64) -> Self {
        ParameterValue::Float(value)
    }
}

impl From<i64> for ParameterValue {
    fn from(value: i64) -> Self {
        ParameterValue::Int(value)
    }
}

impl From<&str> for ParameterValue {
    fn from(value: &str) -> Self {
        ParameterValue::Text(value.to_string())
    }
}

impl From<String> for ParameterValue {
    fn from(value: String) -> Self {
        ParameterValue::Text(value)
    }
}

impl Display for ParameterValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ParameterValue::Int(v) => write!(f, "{}", v),
            ParameterValue::Float(v) => write!(f, "{}", v),
            ParameterValue::Text(v) => write!(f, "{}", v),
        }
    }
}

const CANONICAL_NAN_BITS: u64 = 0x7ff8_0000_0000_0000;

/// Equality/hash key for a [`ParameterValue`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ParameterKey {
    Int(i64),
    /// Canonical bit pattern: one NaN, no negative zero
    Float(u64),
    Text(String),
}

impl ParameterKey {
    fn float_bits(value: f64) -> u64 {
        if value.is_nan() {
            CANONICAL_NAN_BITS
        } else if value == 0.0 {
            0
        } else {
            value.to_bits()
        }
    }
}

impl From<&ParameterValue> for ParameterKey {
    fn from(value: &ParameterValue) -> Self {
        match value {
            ParameterValue::Int(v) => ParameterKey::Int(*v),
            ParameterValue::Float(v) => ParameterKey::Float(Self::float_bits(*v)),
            ParameterValue::Text(v) => ParameterKey::Text(v.clone()),
        }
    }
}
