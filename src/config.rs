//! Process configuration read from the environment.

use std::path::PathBuf;

use tracing::warn;

pub const DATA_DIR_VAR: &str = "DELIVERY_LEDGER_DATA_DIR";
pub const LOG_DIR_VAR: &str = "DELIVERY_LEDGER_LOG_DIR";
pub const STORAGE_FEE_INTERVAL_VAR: &str = "DELIVERY_LEDGER_STORAGE_FEE_INTERVAL_SECS";
pub const MAX_LOG_FILES_VAR: &str = "DELIVERY_LEDGER_MAX_LOG_FILES";

const DEFAULT_DATA_DIR: &str = "./data";
const DEFAULT_STORAGE_FEE_INTERVAL_SECS: u64 = 3600;
const DEFAULT_MAX_LOG_FILES: usize = 7;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub log_dir: PathBuf,
    pub storage_fee_interval_secs: u64,
    pub max_log_files: usize,
    /// Raw `RUST_LOG` value, if set.
    pub log_filter: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let data_dir = PathBuf::from(DEFAULT_DATA_DIR);
        Self {
            log_dir: data_dir.join("logs"),
            data_dir,
            storage_fee_interval_secs: DEFAULT_STORAGE_FEE_INTERVAL_SECS,
            max_log_files: DEFAULT_MAX_LOG_FILES,
            log_filter: None,
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Blank values count as unset; malformed
    /// numbers fall back to their default with a warning.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let data_dir = get(DATA_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR));
        let log_dir = get(LOG_DIR_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("logs"));

        let storage_fee_interval_secs = parse_or(
            STORAGE_FEE_INTERVAL_VAR,
            get(STORAGE_FEE_INTERVAL_VAR),
            DEFAULT_STORAGE_FEE_INTERVAL_SECS,
        )
        .max(1);
        let max_log_files = parse_or(
            MAX_LOG_FILES_VAR,
            get(MAX_LOG_FILES_VAR),
            DEFAULT_MAX_LOG_FILES,
        );

        Self {
            data_dir,
            log_dir,
            storage_fee_interval_secs,
            max_log_files,
            log_filter: get("RUST_LOG"),
        }
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    key: &str,
    raw: Option<String>,
    default: T,
) -> T {
    match raw {
        None => default,
        Some(value) => value.parse().unwrap_or_else(|_| {
            warn!("Ignoring malformed {key}={value:?}, using {default}");
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.log_dir, PathBuf::from("./data/logs"));
        assert_eq!(config.storage_fee_interval_secs, 3600);
    }

    #[test]
    fn test_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            (DATA_DIR_VAR, "/var/lib/ledger"),
            (STORAGE_FEE_INTERVAL_VAR, "60"),
            ("RUST_LOG", "warn"),
        ]));
        assert_eq!(config.data_dir, PathBuf::from("/var/lib/ledger"));
        assert_eq!(config.log_dir, PathBuf::from("/var/lib/ledger/logs"));
        assert_eq!(config.storage_fee_interval_secs, 60);
        assert_eq!(config.log_filter.as_deref(), Some("warn"));
    }

    #[test]
    fn test_malformed_numbers_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            (STORAGE_FEE_INTERVAL_VAR, "hourly"),
            (MAX_LOG_FILES_VAR, "-3"),
            (LOG_DIR_VAR, "  "),
        ]));
        assert_eq!(config.storage_fee_interval_secs, 3600);
        assert_eq!(config.max_log_files, 7);
        assert_eq!(config.log_dir, PathBuf::from("./data/logs"));
    }

    #[test]
    fn test_zero_interval_is_clamped() {
        let config = EngineConfig::from_lookup(lookup(&[(STORAGE_FEE_INTERVAL_VAR, "0")]));
        assert_eq!(config.storage_fee_interval_secs, 1);
    }
}
