//! Daemon configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use soundstreamer_pipewire::ToolPaths;
use soundstreamer_pipewire::monitor::MIN_INTERVAL;

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon settings
    #[serde(default)]
    pub daemon: DaemonConfig,
    /// Graph monitor settings
    #[serde(default)]
    pub monitor: MonitorConfig,
    /// PipeWire tool locations
    #[serde(default)]
    pub tools: ToolsConfig,
}

/// Daemon-specific settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Log level, used when `RUST_LOG` is not set
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,
    /// Remove the links created during the session on shutdown
    #[serde(default = "default_true")]
    pub cleanup_on_exit: bool,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self { log_level: default_log_level(), log_format: LogFormat::default(), cleanup_on_exit: true }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// How the daemon learns about graph changes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorMode {
    /// Re-run `pw-dump` every `interval_ms`
    #[default]
    Poll,
    /// Listen to the PipeWire registry (needs the `native` feature)
    Native,
}

/// Graph monitor settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    #[serde(default)]
    pub mode: MonitorMode,
    /// Polling interval in milliseconds
    #[serde(default = "default_interval_ms")]
    pub interval_ms: u64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self { mode: MonitorMode::default(), interval_ms: default_interval_ms() }
    }
}

impl MonitorConfig {
    /// Polling interval, never shorter than the monitor's minimum.
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms).max(MIN_INTERVAL)
    }
}

fn default_interval_ms() -> u64 {
    1000
}

/// PipeWire tool locations. Bare names are looked up in `PATH`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolsConfig {
    #[serde(default = "default_pw_dump")]
    pub pw_dump: PathBuf,
    #[serde(default = "default_pw_link")]
    pub pw_link: PathBuf,
    #[serde(default = "default_pw_cli")]
    pub pw_cli: PathBuf,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { pw_dump: default_pw_dump(), pw_link: default_pw_link(), pw_cli: default_pw_cli() }
    }
}

impl ToolsConfig {
    #[must_use]
    pub fn paths(&self) -> ToolPaths {
        ToolPaths {
            pw_dump: self.pw_dump.clone(),
            pw_link: self.pw_link.clone(),
            pw_cli: self.pw_cli.clone(),
        }
    }
}

fn default_pw_dump() -> PathBuf {
    PathBuf::from("pw-dump")
}

fn default_pw_link() -> PathBuf {
    PathBuf::from("pw-link")
}

fn default_pw_cli() -> PathBuf {
    PathBuf::from("pw-cli")
}

/// Where the configuration was loaded from.
///
/// Loading happens before logging is set up, so the caller reports this.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    File(PathBuf),
    /// No file at this path
    Defaults(PathBuf),
}

/// Load configuration from the default location, or defaults if absent.
pub fn load_config() -> Result<(Config, ConfigSource)> {
    load_config_from(&config_path()?)
}

/// Load configuration from a file, or defaults if it does not exist.
pub fn load_config_from(config_path: &Path) -> Result<(Config, ConfigSource)> {
    if config_path.exists() {
        let content = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {config_path:?}"))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {config_path:?}"))?;
        Ok((config, ConfigSource::File(config_path.to_path_buf())))
    } else {
        Ok((Config::default(), ConfigSource::Defaults(config_path.to_path_buf())))
    }
}

/// Get the configuration file path.
fn config_path() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("com", "soundstreamer", "SoundStreamer")
        .context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();

        let path = dir.path().join("config.toml");

        let (config, source) = load_config_from(&path).unwrap();

        assert_eq!(source, ConfigSource::Defaults(path));
        assert_eq!(config, Config::default());
        assert!(config.daemon.cleanup_on_exit);
        assert_eq!(config.monitor.mode, MonitorMode::Poll);
        assert_eq!(config.monitor.interval(), Duration::from_secs(1));
        assert_eq!(config.tools.paths().pw_link, PathBuf::from("pw-link"));
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[daemon]
cleanup_on_exit = false
log_format = "json"

[monitor]
mode = "native"

[tools]
pw_dump = "/opt/pipewire/bin/pw-dump"
"#,
        )
        .unwrap();

        let (config, source) = load_config_from(&path).unwrap();

        assert_eq!(source, ConfigSource::File(path));
        assert!(!config.daemon.cleanup_on_exit);
        assert_eq!(config.daemon.log_level, "info");
        assert_eq!(config.daemon.log_format, LogFormat::Json);
        assert_eq!(config.monitor.mode, MonitorMode::Native);
        assert_eq!(config.monitor.interval_ms, 1000);
        assert_eq!(config.tools.pw_dump, PathBuf::from("/opt/pipewire/bin/pw-dump"));
        assert_eq!(config.tools.pw_cli, PathBuf::from("pw-cli"));
    }

    #[test]
    fn test_interval_is_clamped() {
        let monitor = MonitorConfig { mode: MonitorMode::Poll, interval_ms: 10 };
        assert_eq!(monitor.interval(), Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[monitor]\nmode = \"inotify\"\n").unwrap();

        let err = load_config_from(&path).unwrap_err();

        assert!(err.to_string().starts_with("Failed to parse config file"));
    }
}
