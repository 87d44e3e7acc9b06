//! Configuration management
//!
//! Settings live in settings.json inside the data directory:
//! ```json
//! {
//!   "ledger": { "lockTimeoutMs": 2000, "historyPageSize": 100 },
//!   "auth": { "claimsTtlMinutes": 10 }
//! }
//! ```
//! Unknown keys are ignored; the file may carry settings for other tools.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::warn;

pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 2000;
pub const DEFAULT_HISTORY_PAGE_SIZE: usize = 100;
pub const DEFAULT_CLAIMS_TTL_MINUTES: i64 = 10;

/// Environment variable overriding `ledger.lockTimeoutMs`
pub const LOCK_TIMEOUT_ENV: &str = "WALLET_LOCK_TIMEOUT_MS";
/// Environment variable overriding `ledger.historyPageSize`
pub const HISTORY_PAGE_SIZE_ENV: &str = "WALLET_HISTORY_PAGE_SIZE";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    ledger: LedgerSettings,
    #[serde(default)]
    auth: AuthSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LedgerSettings {
    #[serde(default)]
    lock_timeout_ms: Option<u64>,
    #[serde(default)]
    history_page_size: Option<usize>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthSettings {
    #[serde(default)]
    claims_ttl_minutes: Option<i64>,
}

/// Wallet ledger configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Longest total wait for row locks before an operation gives up
    pub lock_timeout: Duration,
    /// Entries fetched per history page
    pub history_page_size: usize,
    /// Lifetime of issued claims
    pub claims_ttl: chrono::Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS),
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            claims_ttl: chrono::Duration::minutes(DEFAULT_CLAIMS_TTL_MINUTES),
        }
    }
}

impl Config {
    /// Load config from the data directory, then apply environment overrides
    pub fn load(data_dir: &Path) -> Result<Self> {
        let raw = read_settings(data_dir)?;
        let mut config = Self::from_settings(&raw);
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn from_settings(raw: &SettingsFile) -> Self {
        let defaults = Self::default();
        Self {
            lock_timeout: raw
                .ledger
                .lock_timeout_ms
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(defaults.lock_timeout),
            history_page_size: raw
                .ledger
                .history_page_size
                .filter(|n| *n > 0)
                .unwrap_or(defaults.history_page_size),
            claims_ttl: raw
                .auth
                .claims_ttl_minutes
                .filter(|m| *m > 0)
                .map(chrono::Duration::minutes)
                .unwrap_or(defaults.claims_ttl),
        }
    }

    /// Apply overrides from a variable lookup; unparsable values are ignored
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(LOCK_TIMEOUT_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => self.lock_timeout = Duration::from_millis(ms),
                _ => warn!(var = LOCK_TIMEOUT_ENV, value = %raw, "ignoring invalid override"),
            }
        }
        if let Some(raw) = lookup(HISTORY_PAGE_SIZE_ENV) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.history_page_size = n,
                _ => warn!(var = HISTORY_PAGE_SIZE_ENV, value = %raw, "ignoring invalid override"),
            }
        }
    }
}

fn read_settings(data_dir: &Path) -> Result<SettingsFile> {
    let settings_path = data_dir.join("settings.json");
    if !settings_path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&settings_path)
        .with_context(|| format!("failed to read {}", settings_path.display()))?;
    match serde_json::from_str(&content) {
        Ok(settings) => Ok(settings),
        Err(e) => {
            warn!(path = %settings_path.display(), error = %e, "settings.json is malformed, using defaults");
            Ok(SettingsFile::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_without_settings_file() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.history_page_size, DEFAULT_HISTORY_PAGE_SIZE);
        assert_eq!(config.claims_ttl, chrono::Duration::minutes(10));
    }

    #[test]
    fn test_reads_settings_and_ignores_invalid_values() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"ledger": {"lockTimeoutMs": 750, "historyPageSize": 0}, "auth": {"claimsTtlMinutes": 30}}"#,
        )
        .unwrap();

        let raw = read_settings(dir.path()).unwrap();
        let config = Config::from_settings(&raw);
        assert_eq!(config.lock_timeout, Duration::from_millis(750));
        assert_eq!(config.history_page_size, DEFAULT_HISTORY_PAGE_SIZE);
        assert_eq!(config.claims_ttl, chrono::Duration::minutes(30));
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply_overrides(|key| match key {
            LOCK_TIMEOUT_ENV => Some("125".to_string()),
            HISTORY_PAGE_SIZE_ENV => Some("lots".to_string()),
            _ => None,
        });
        assert_eq!(config.lock_timeout, Duration::from_millis(125));
        assert_eq!(config.history_page_size, DEFAULT_HISTORY_PAGE_SIZE);
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("settings.json"),
            r#"{"theme": "dark", "ledger": {"lockTimeoutMs": 900, "note": "keep"}}"#,
        )
        .unwrap();

        let config = Config::from_settings(&read_settings(dir.path()).unwrap());
        assert_eq!(config.lock_timeout, Duration::from_millis(900));
        assert_eq!(config.history_page_size, DEFAULT_HISTORY_PAGE_SIZE);
    }

    #[test]
    fn test_malformed_settings_fall_back_to_defaults() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("settings.json"), "{ not json").unwrap();

        let config = Config::load(dir.path()).unwrap();
        assert_eq!(config.lock_timeout, Duration::from_millis(DEFAULT_LOCK_TIMEOUT_MS));
    }
}
