// =============================================================================
// Runtime Configuration: sync settings with atomic save
// =============================================================================
//
// Every tunable of the sync service lives here. Persistence uses an atomic
// tmp + rename pattern to prevent corruption on crash. All fields carry
// `#[serde(default)]` so that adding new fields never breaks loading an older
// config file.
//
// Environment overrides (applied after loading, `.env` honoured):
//   KLINE_SYNC_DATABASE_URL   replaces `database_url`
//   KLINE_SYNC_SYMBOLS        comma-separated list replacing `symbols`
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::SyncError;
use crate::sync::{RetryPolicy, SyncSettings};

pub const DEFAULT_CONFIG_PATH: &str = "kline_sync.json";

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_database_url() -> String {
    "sqlite://kline_sync.db".to_string()
}

fn default_max_history_bars() -> usize {
    70_000
}

fn default_incremental_overlap_days() -> i64 {
    10
}

fn default_history_pace_ms() -> u64 {
    2_000
}

fn default_retry_max_attempts() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    1_000
}

fn default_schedule_hour() -> u32 {
    7
}

fn default_schedule_minute() -> u32 {
    20
}

fn default_http_timeout_secs() -> u64 {
    10
}

// =============================================================================
// RuntimeConfig
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// sqlx SQLite URL, or `memory` for a throwaway in-process store.
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Instruments to sync. Empty means "discover the whole universe".
    #[serde(default)]
    pub symbols: Vec<String>,

    /// `datalen` requested on a full sync.
    #[serde(default = "default_max_history_bars")]
    pub max_history_bars: usize,

    /// Calendar days re-fetched behind the cursor on an incremental sync.
    #[serde(default = "default_incremental_overlap_days")]
    pub incremental_overlap_days: i64,

    /// Minimum wall time per synced instrument.
    #[serde(default = "default_history_pace_ms")]
    pub history_pace_ms: u64,

    /// Retries after the first failed fetch / persist.
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Local time of the daily pass.
    #[serde(default = "default_schedule_hour")]
    pub schedule_hour: u32,
    #[serde(default = "default_schedule_minute")]
    pub schedule_minute: u32,

    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            symbols: Vec::new(),
            max_history_bars: default_max_history_bars(),
            incremental_overlap_days: default_incremental_overlap_days(),
            history_pace_ms: default_history_pace_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            schedule_hour: default_schedule_hour(),
            schedule_minute: default_schedule_minute(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            database_url = %config.database_url,
            symbols = config.symbols.len(),
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Load `path`, or write the defaults there first when it does not exist.
    pub fn load_or_init(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if path.exists() {
            return Self::load(path);
        }
        let config = Self::default();
        config.save(path)?;
        Ok(config)
    }

    /// Apply `KLINE_SYNC_*` overrides from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_overrides(
            std::env::var("KLINE_SYNC_DATABASE_URL").ok(),
            std::env::var("KLINE_SYNC_SYMBOLS").ok(),
        );
    }

    fn apply_overrides(&mut self, database_url: Option<String>, symbols: Option<String>) {
        if let Some(url) = database_url.filter(|u| !u.trim().is_empty()) {
            self.database_url = url.trim().to_string();
        }
        if let Some(syms) = symbols {
            self.symbols = syms
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
    }

    /// Reject settings the sync loop cannot run with.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.max_history_bars == 0 {
            return Err(SyncError::Config("max_history_bars must be > 0".into()));
        }
        if self.retry_base_delay_ms == 0 {
            return Err(SyncError::Config("retry_base_delay_ms must be > 0".into()));
        }
        if self.incremental_overlap_days < 0 {
            return Err(SyncError::Config("incremental_overlap_days must be >= 0".into()));
        }
        if self.schedule_hour > 23 || self.schedule_minute > 59 {
            return Err(SyncError::Config(format!(
                "invalid schedule time {:02}:{:02}",
                self.schedule_hour, self.schedule_minute
            )));
        }
        if self.database_url.trim().is_empty() {
            return Err(SyncError::Config("database_url is required".into()));
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            max_history_bars: self.max_history_bars,
            overlap_days: self.incremental_overlap_days,
            pace: Duration::from_millis(self.history_pace_ms),
            retry: RetryPolicy {
                max_retries: self.retry_max_attempts,
                base_delay: Duration::from_millis(self.retry_base_delay_ms),
            },
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = RuntimeConfig::default();
        assert_eq!(cfg.database_url, "sqlite://kline_sync.db");
        assert!(cfg.symbols.is_empty());
        assert_eq!(cfg.max_history_bars, 70_000);
        assert_eq!(cfg.incremental_overlap_days, 10);
        assert_eq!(cfg.history_pace_ms, 2_000);
        assert_eq!(cfg.retry_max_attempts, 3);
        assert_eq!((cfg.schedule_hour, cfg.schedule_minute), (7, 20));
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: RuntimeConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "symbols": ["sz000001"], "history_pace_ms": 500 }"#;
        let cfg: RuntimeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.symbols, vec!["sz000001"]);
        assert_eq!(cfg.history_pace_ms, 500);
        assert_eq!(cfg.retry_base_delay_ms, 1_000);
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = std::env::temp_dir().join(format!("kline-sync-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kline_sync.json");

        let mut cfg = RuntimeConfig::default();
        cfg.symbols = vec!["sh600000".into()];
        cfg.save(&path).unwrap();
        assert_eq!(RuntimeConfig::load(&path).unwrap(), cfg);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn missing_file_is_written_with_defaults() {
        let dir = std::env::temp_dir().join(format!("kline-sync-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("kline_sync.json");

        let cfg = RuntimeConfig::load_or_init(&path).unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
        assert!(path.exists());

        std::fs::write(&path, r#"{ "history_pace_ms": 750 }"#).unwrap();
        assert_eq!(RuntimeConfig::load_or_init(&path).unwrap().history_pace_ms, 750);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn env_overrides() {
        let mut cfg = RuntimeConfig::default();
        cfg.apply_overrides(
            Some("sqlite::memory:".into()),
            Some(" SZ000001, sh600000 ,,".into()),
        );
        assert_eq!(cfg.database_url, "sqlite::memory:");
        assert_eq!(cfg.symbols, vec!["sz000001", "sh600000"]);

        cfg.apply_overrides(Some("  ".into()), None);
        assert_eq!(cfg.database_url, "sqlite::memory:");
    }

    #[test]
    fn zero_delays_are_config_errors() {
        let cfg = RuntimeConfig {
            retry_base_delay_ms: 0,
            ..RuntimeConfig::default()
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.is_fatal());

        let cfg = RuntimeConfig {
            max_history_bars: 0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(cfg.validate(), Err(SyncError::Config(_))));
    }

    #[test]
    fn settings_carry_through() {
        let cfg = RuntimeConfig::default();
        let s = cfg.sync_settings();
        assert_eq!(s.pace, Duration::from_secs(2));
        assert_eq!(s.retry.max_retries, 3);
        assert_eq!(s.retry.backoff(2), Duration::from_secs(2));
    }
}
