// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ecephys-structures
//!
//! Immutable inputs of the stimulus-locked spike analysis pipeline.
//!
//! ## Modules
//! - **parameter**: loosely typed stimulus parameters and their grouping key
//! - **presentation**: trials and the validated [`StimulusTable`]
//! - **builder**: [`StimulusTableBuilder`] from frame- or time-based records
//! - **timestamps**: [`StimulusTimestamps`] from a stimulus log, sync line or stored values
//! - **spikes**: [`UnitSpikeTrain`] with binary-search windows, [`SpikeTrains`]
//! - **running**: [`RunningSpeed`] trace
//!
//! Everything here is validated once at construction and read-only
//! afterwards; derived tables live in `ecephys-stimulus-analysis`.

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod builder;
pub mod error;
pub mod parameter;
pub mod presentation;
pub mod running;
pub mod spikes;
pub mod timestamps;

pub use builder::{PresentationRecord, StimulusTableBuilder, TimedPresentationRecord};
pub use error::{EcephysDataError, Result};
pub use parameter::{ParameterKey, ParameterValue};
pub use presentation::{StimulusPresentation, StimulusTable, SPONTANEOUS_STIMULUS_NAME};
pub use running::RunningSpeed;
pub use spikes::{SpikeTrains, UnitSpikeTrain};
pub use timestamps::{StimulusTimestamps, SyncEdge, TimestampSource};
