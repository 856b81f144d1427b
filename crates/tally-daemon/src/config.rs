//! Configuration loading for tallyd.

use crate::watcher::{MIN_SETTLE_DELAY, RECEIPT_EXTENSIONS};
use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory watched for receipt arrivals when nothing is configured.
pub const DEFAULT_WATCH_DIR: &str = "inbox";

/// Directory records are written to when nothing is configured.
pub const DEFAULT_OUTPUT_DIR: &str = "records";

#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    pub watch: Option<WatchConfig>,
    pub output: Option<OutputConfig>,
    pub llm: Option<LlmConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct WatchConfig {
    pub dir: Option<PathBuf>,
    pub settle_ms: Option<u64>,
    pub extensions: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct OutputConfig {
    pub dir: Option<PathBuf>,
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default, Clone)]
pub struct LlmConfig {
    pub model: Option<String>,
}

impl Config {
    pub fn watch_dir(&self) -> PathBuf {
        self.watch
            .as_ref()
            .and_then(|watch| watch.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_WATCH_DIR))
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output
            .as_ref()
            .and_then(|output| output.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR))
    }

    /// Settle delay before a just-arrived file is read; never below the
    /// watcher's floor.
    pub fn settle_delay(&self) -> Duration {
        self.watch
            .as_ref()
            .and_then(|watch| watch.settle_ms)
            .map(Duration::from_millis)
            .unwrap_or(MIN_SETTLE_DELAY)
            .max(MIN_SETTLE_DELAY)
    }

    /// Accepted receipt extensions, lowercased.
    pub fn extensions(&self) -> Vec<String> {
        self.watch
            .as_ref()
            .and_then(|watch| watch.extensions.clone())
            .unwrap_or_else(|| {
                RECEIPT_EXTENSIONS
                    .iter()
                    .map(|ext| (*ext).to_string())
                    .collect()
            })
    }

    pub fn log_file(&self) -> Option<PathBuf> {
        self.output.as_ref().and_then(|output| output.log_file.clone())
    }

    pub fn llm_model(&self) -> Option<&str> {
        self.llm.as_ref().and_then(|llm| llm.model.as_deref())
    }
}

pub fn default_config_path() -> Result<PathBuf> {
    let dirs =
        ProjectDirs::from("", "", "tally").context("Could not determine config directory")?;
    Ok(dirs.config_dir().join("config.toml"))
}

pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    let config: Config =
        toml::from_str(&contents).context("Failed to parse config file as TOML")?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = Config::default();
        assert_eq!(config.watch_dir(), PathBuf::from("inbox"));
        assert_eq!(config.output_dir(), PathBuf::from("records"));
        assert_eq!(config.settle_delay(), MIN_SETTLE_DELAY);
        assert_eq!(config.extensions(), vec!["jpg", "jpeg", "png"]);
        assert!(config.log_file().is_none());
        assert!(config.llm_model().is_none());
    }

    #[test]
    fn test_settle_delay_is_floored() {
        let config = Config {
            watch: Some(WatchConfig {
                settle_ms: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.settle_delay(), MIN_SETTLE_DELAY);

        let config = Config {
            watch: Some(WatchConfig {
                settle_ms: Some(2_000),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert_eq!(config.settle_delay(), Duration::from_secs(2));
    }

    #[test]
    fn test_parse_full_config() {
        let config: Config = toml::from_str(
            r#"
            [watch]
            dir = "/data/receipts"
            settle_ms = 750
            extensions = ["jpg", "pdf"]

            [output]
            dir = "/data/records"
            log_file = "/var/log/tallyd.log"

            [llm]
            model = "gemini-2.0-pro"
            "#,
        )
        .unwrap();

        assert_eq!(config.watch_dir(), PathBuf::from("/data/receipts"));
        assert_eq!(config.settle_delay(), Duration::from_millis(750));
        assert_eq!(config.extensions(), vec!["jpg", "pdf"]);
        assert_eq!(config.output_dir(), PathBuf::from("/data/records"));
        assert_eq!(config.log_file(), Some(PathBuf::from("/var/log/tallyd.log")));
        assert_eq!(config.llm_model(), Some("gemini-2.0-pro"));
    }

    #[test]
    fn test_load_config_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("nope.toml")).unwrap();
        assert_eq!(config.watch_dir(), PathBuf::from("inbox"));
    }

    #[test]
    fn test_load_config_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "not toml [").unwrap();
        assert!(load_config(&path).is_err());
    }
}
