// Copyright 2025 Neuraville Inc.
// SPDX-License-Identifier: Apache-2.0

//! CLI argument parsing for per-crate debug flags
//!
//! Supports flags like `--debug-ecephys-structures` or
//! `--debug-ecephys-stimulus-analysis` to raise one crate to debug level.

use std::collections::HashMap;
use std::env;

use crate::{target_name, KNOWN_CRATES};

/// Parse debug flags from command-line arguments
///
/// # Example
/// ```rust
/// use ecephys_observability::CrateDebugFlags;
///
/// let flags = CrateDebugFlags::from_args(std::env::args());
/// if flags.is_enabled("ecephys-stimulus-analysis") {
///     // Per-unit fit diagnostics will be emitted
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct CrateDebugFlags {
    pub enabled_crates: HashMap<String, bool>,
}

impl CrateDebugFlags {
    /// Looks for arguments matching `--debug-{crate-name}`, plus `--debug-all`.
    pub fn from_args<I>(args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut flags = CrateDebugFlags::default();

        for arg in args {
            if arg == "--debug-all" {
                flags.enable_all();
                continue;
            }

            if let Some(crate_name) = arg.strip_prefix("--debug-") {
                flags.enabled_crates.insert(crate_name.to_string(), true);
            }
        }

        flags
    }

    fn enable_all(&mut self) {
        for crate_name in KNOWN_CRATES {
            self.enabled_crates.insert(crate_name.to_string(), true);
        }
    }

    /// Check if debug is enabled for a specific crate
    pub fn is_enabled(&self, crate_name: &str) -> bool {
        self.enabled_crates.contains_key(crate_name)
    }

    /// Get all enabled crates
    pub fn enabled_crates(&self) -> Vec<&String> {
        self.enabled_crates.keys().collect()
    }

    /// Check if debug is enabled for any crate
    pub fn any_enabled(&self) -> bool {
        !self.enabled_crates.is_empty()
    }

    /// `DEBUG` for enabled crates, `INFO` otherwise
    pub fn log_level(&self, crate_name: &str) -> tracing::Level {
        if self.is_enabled(crate_name) {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }

    /// Build an `EnvFilter` directive string
    ///
    /// Format: `ecephys_structures=debug,info`, or just `default_level` if
    /// nothing is enabled.
    pub fn to_filter_string_with_default(&self, default_level: &str) -> String {
        if self.enabled_crates.is_empty() {
            return default_level.to_string();
        }

        let mut names: Vec<&String> = self.enabled_crates.keys().collect();
        names.sort();

        let mut filters: Vec<String> = names
            .into_iter()
            .map(|crate_name| format!("{}=debug", target_name(crate_name)))
            .collect();
        filters.push(default_level.to_string());
        filters.join(",")
    }

    /// Same as [`to_filter_string_with_default`](Self::to_filter_string_with_default) with `info`
    pub fn to_filter_string(&self) -> String {
        self.to_filter_string_with_default("info")
    }
}

/// Parse debug flags from the process arguments and `ECEPHYS_DEBUG`
///
/// Environment variable format: comma-separated crate names, e.g.
/// `ecephys-structures,ecephys-stimulus-analysis`, or `all`.
pub fn parse_debug_flags() -> CrateDebugFlags {
    let mut flags = CrateDebugFlags::from_args(env::args());
    if let Ok(env_var) = env::var("ECEPHYS_DEBUG") {
        merge_env_value(&mut flags, &env_var);
    }
    flags
}

fn merge_env_value(flags: &mut CrateDebugFlags, env_var: &str) {
    if env_var.trim() == "all" {
        flags.enable_all();
        return;
    }
    for crate_name in env_var.split(',') {
        let crate_name = crate_name.trim();
        if !crate_name.is_empty() {
            flags.enabled_crates.insert(crate_name.to_string(), true);
        }
    }
}

/// Generate help text for debug flags
pub fn debug_flags_help() -> String {
    format!(
        r#"Debug Flags:
  --debug-all                    Enable debug logging for all crates
  --debug-{{crate-name}}          Enable debug logging for specific crate

Available crates:
  {}

Environment Variable:
  ECEPHYS_DEBUG={{crate-name}}[,{{crate-name}}]  Enable debug for crates (comma-separated)
  ECEPHYS_DEBUG=all                               Enable debug for all crates
"#,
        KNOWN_CRATES.join(", ")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_crate_flag() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-ecephys-structures".to_string()]);
        assert!(flags.is_enabled("ecephys-structures"));
        assert!(!flags.is_enabled("ecephys-config"));
    }

    #[test]
    fn test_unrelated_args_ignored() {
        let flags = CrateDebugFlags::from_args(vec![
            "ecephys".to_string(),
            "--config".to_string(),
            "session.toml".to_string(),
        ]);
        assert!(!flags.any_enabled());
        assert_eq!(flags.to_filter_string(), "info");
    }

    #[test]
    fn test_debug_all() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-all".to_string()]);
        for crate_name in KNOWN_CRATES {
            assert!(flags.is_enabled(crate_name), "{} should be enabled", crate_name);
        }
    }

    #[test]
    fn test_filter_string_uses_target_names() {
        let flags =
            CrateDebugFlags::from_args(vec!["--debug-ecephys-stimulus-analysis".to_string()]);
        assert_eq!(flags.to_filter_string(), "ecephys_stimulus_analysis=debug,info");
        assert_eq!(
            flags.to_filter_string_with_default("warn"),
            "ecephys_stimulus_analysis=debug,warn"
        );
    }

    #[test]
    fn test_env_value_merge() {
        let mut flags = CrateDebugFlags::default();
        merge_env_value(&mut flags, "ecephys-config, ecephys-structures,");
        assert!(flags.is_enabled("ecephys-config"));
        assert!(flags.is_enabled("ecephys-structures"));
        assert_eq!(flags.enabled_crates().len(), 2);

        let mut all = CrateDebugFlags::default();
        merge_env_value(&mut all, "all");
        assert_eq!(all.enabled_crates().len(), KNOWN_CRATES.len());
    }

    #[test]
    fn test_log_level() {
        let flags = CrateDebugFlags::from_args(vec!["--debug-ecephys-config".to_string()]);
        assert_eq!(flags.log_level("ecephys-config"), tracing::Level::DEBUG);
        assert_eq!(flags.log_level("ecephys-structures"), tracing::Level::INFO);
    }
}
