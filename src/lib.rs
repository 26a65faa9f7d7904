//! # ecephys - stimulus-locked spike analysis
//!
//! Receptive-field mapping and condition-wise spike statistics for
//! extracellular electrophysiology sessions. Inputs arrive as in-memory
//! values (a stimulus table, sorted spike trains and an optional running
//! trace); every derived table is exported as serializable rows.
//!
//! ## Quick Start
//!
//! ```toml
//! [dependencies]
//! ecephys = "0.3"  # Default: parallel per-unit metrics
//! ```
//!
//! ## Feature Flags
//!
//! - **`parallel`** (default): Per-unit metrics on the rayon pool
//! - **`file-logging`**: Per-run rolling log files
//!
//! ## Usage
//!
//! ```rust,no_run
//! use ecephys::prelude::*;
//!
//! let config = load_config(None, None)?;
//! validate_config(&config)?;
//! let _guard = init_logging(&parse_debug_flags(), &ecephys::logging_config(&config))?;
//!
//! # let table = StimulusTable::new(vec![])?;
//! # let trains = SpikeTrains::new(vec![])?;
//! let mapping = ReceptiveFieldMapping::new(
//!     &table,
//!     trains,
//!     None,
//!     ReceptiveFieldMappingParams::from_config(&config),
//! )?;
//! for row in mapping.metrics()? {
//!     println!("unit {}: azimuth {:.1}°", row.unit_id, row.azimuth_rf);
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  Foundation: ecephys-config, ecephys-observability      │
//! │  (TOML + overrides, tracing setup)                      │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Data: ecephys-structures                               │
//! │  (Presentations, spike trains, timestamps, running)     │
//! └─────────────────────────────────────────────────────────┘
//!                         ↓
//! ┌─────────────────────────────────────────────────────────┐
//! │  Algorithms: ecephys-stimulus-analysis                  │
//! │  (Conditions, PSTH, receptive fields, metrics)          │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## License
//!
//! Apache-2.0

pub use ecephys_config as config;
pub use ecephys_observability as observability;
pub use ecephys_stimulus_analysis as analysis;
pub use ecephys_structures as structures;

/// Logging settings for [`observability::init_logging`] from the
/// `[system]` and `[logging]` configuration sections
pub fn logging_config(config: &config::EcephysConfig) -> observability::LoggingConfig {
    observability::LoggingConfig {
        level: config.system.log_level.clone(),
        format: match config.logging.format {
            config::LogFormat::Text => observability::LogFormat::Text,
            config::LogFormat::Json => observability::LogFormat::Json,
        },
        log_dir: config.logging.log_dir.clone(),
        retention_days: config.logging.retention_days,
        retention_runs: config.logging.retention_runs,
    }
}

/// Prelude - commonly used types and functions
pub mod prelude {
    pub use crate::config::{load_config, validate_config, EcephysConfig};
    pub use crate::observability::{init_logging, parse_debug_flags, CrateDebugFlags};

    pub use crate::structures::{
        ParameterValue, RunningSpeed, SpikeTrains, StimulusPresentation, StimulusTable, StimulusTableBuilder,
        StimulusTimestamps, UnitSpikeTrain,
    };

    pub use crate::analysis::{
        group_conditions, rf_stats, AnalysisError, ConditionTable, ConditionwisePsth, ReceptiveFieldGrid,
        ReceptiveFieldMapping, ReceptiveFieldMappingParams, ReceptiveFieldMetrics, RfStats,
    };
}
