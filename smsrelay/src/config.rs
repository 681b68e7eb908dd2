//! Top-level configuration for the composition root, and the file-resolution
//! policy that finds it.
//!
//! The whole module graph composes from one TOML document: every
//! sub-config below is a plain `#[serde(default)]`-able struct owned by
//! the crate it configures, so a deployment only needs to override the
//! fields it cares about.

use serde::Deserialize;
use smsrelay_control::ControlConfig;
use smsrelay_dispatch::{DispatcherConfig, MaintenanceConfig, RetryConfig, SchedulerConfig};
use smsrelay_health::HealthConfig;
use smsrelay_store::StoreConfig;
use smsrelay_telemetry::TelemetryConfig;

/// The composition root's full configuration, loaded once at startup.
///
/// There is no separate `queue` section: `high_watermark_queue` lives on
/// [`ControlConfig`] since admission control is a control-surface concern
/// (see `DESIGN.md`).
#[derive(Debug, Clone, Deserialize)]
pub struct SmsrelayConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub dispatcher: DispatcherConfig,
    #[serde(default)]
    pub maintenance: MaintenanceConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
    #[serde(default)]
    pub health: HealthConfig,
    #[serde(default)]
    pub control: ControlConfig,
}

impl Default for SmsrelayConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            store: StoreConfig::default(),
            scheduler: SchedulerConfig::default(),
            retry: RetryConfig::default(),
            dispatcher: DispatcherConfig::default(),
            maintenance: MaintenanceConfig::default(),
            telemetry: TelemetryConfig::default(),
            health: HealthConfig::default(),
            control: ControlConfig::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Locates the configuration file: an explicit environment variable
/// override, then a cwd-relative file, then a system-wide one, in that
/// order.
///
/// # Errors
/// Returns an error if `SMSRELAY_CONFIG` is set but doesn't exist, or if
/// none of the default paths exist either.
pub fn find_config_file() -> anyhow::Result<std::path::PathBuf> {
    if let Ok(env_path) = std::env::var("SMSRELAY_CONFIG") {
        let path = std::path::PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        anyhow::bail!(
            "SMSRELAY_CONFIG points to non-existent file: {}",
            path.display()
        );
    }

    let default_paths = [
        std::path::PathBuf::from("./smsrelay.toml"),
        std::path::PathBuf::from("/etc/smsrelay/smsrelay.toml"),
    ];
    for path in &default_paths {
        if path.exists() {
            return Ok(path.clone());
        }
    }

    let paths_tried = default_paths
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");
    anyhow::bail!(
        "No configuration file found. Tried:\n  - SMSRELAY_CONFIG environment variable\n{paths_tried}"
    )
}

/// Loads and parses `path` as TOML into a [`SmsrelayConfig`].
///
/// # Errors
/// Returns an error if the file cannot be read or fails to parse.
pub fn load_config(path: &std::path::Path) -> anyhow::Result<SmsrelayConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        anyhow::anyhow!("failed to read config from {}: {}", path.display(), e)
    })?;
    toml::from_str(&content)
        .map_err(|e| anyhow::anyhow!("failed to parse config at {}: {}", path.display(), e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_every_default() {
        let config: SmsrelayConfig = toml::from_str("").unwrap();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.store.capacity, None);
        assert_eq!(config.dispatcher.send_timeout_ms, 30_000);
        assert_eq!(config.control.high_watermark_queue, 10_000);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config: SmsrelayConfig = toml::from_str(
            r#"
            log_level = "debug"

            [dispatcher]
            worker_count = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.dispatcher.worker_count, 2);
        assert_eq!(config.dispatcher.send_timeout_ms, 30_000);
    }

    #[test]
    fn load_config_parses_a_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("smsrelay.toml");
        std::fs::write(&path, "log_level = \"warn\"\n").unwrap();

        let config = load_config(&path).unwrap();
        assert_eq!(config.log_level, "warn");
    }

    #[test]
    fn find_config_file_prefers_cwd_relative_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("smsrelay.toml"), "").unwrap();
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir.path()).unwrap();

        let found = find_config_file();

        std::env::set_current_dir(original).unwrap();
        assert_eq!(found.unwrap(), std::path::PathBuf::from("./smsrelay.toml"));
    }
}
