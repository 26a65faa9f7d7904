// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! # ecephys-observability
//!
//! Logging setup shared by every ecephys crate, with per-crate debug flag
//! support.
//!
//! ## Features
//! - `file-logging`: Per-run log folders with rolling JSON files (desktop only)

/// Crate version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod cli;
pub mod config;
pub mod init;

// Re-export commonly used items
pub use cli::*;
pub use config::*;
pub use init::*;

/// Known ecephys crate names for debug flags
pub const KNOWN_CRATES: &[&str] = &[
    "ecephys",
    "ecephys-config",
    "ecephys-structures",
    "ecephys-stimulus-analysis",
];

/// Tracing targets use the module path, so crate names need underscores
pub(crate) fn target_name(crate_name: &str) -> String {
    crate_name.replace('-', "_")
}
