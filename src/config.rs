use crate::state::MetricKind;
use chrono::format::{Item, StrftimeItems};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub thresholds: ThresholdsConfig,
    #[serde(default)]
    pub collect: CollectConfig,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub feishu: FeishuConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ThresholdsConfig {
    #[serde(default = "default_cpu_threshold")]
    pub cpu: f64,
    #[serde(default = "default_memory_threshold")]
    pub memory: f64,
    #[serde(default = "default_disk_threshold")]
    pub disk: f64,
    /// Metrics evaluated against their threshold.
    #[serde(default = "default_checks")]
    pub checks: Vec<MetricKind>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CollectConfig {
    #[serde(default = "default_command_timeout_secs")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_disk_mount")]
    pub disk_mount: String,
    /// Fall back to in-process counters when every shell probe fails.
    #[serde(default = "default_native_fallback")]
    pub native_fallback: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReportConfig {
    #[serde(default = "default_report_title")]
    pub title: String,
    /// chrono strftime pattern for the header timestamp.
    #[serde(default = "default_time_format")]
    pub time_format: String,
    #[serde(default = "default_report_footer")]
    pub footer: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FeishuConfig {
    #[serde(default = "default_feishu_enabled")]
    pub enabled: bool,
    #[serde(default = "default_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub receive_id: String,
    #[serde(default = "default_receive_id_type")]
    pub receive_id_type: String,
    #[serde(default = "default_credentials_path")]
    pub credentials_path: String,
    #[serde(default = "default_app_id_env")]
    pub app_id_env: String,
    #[serde(default = "default_app_secret_env")]
    pub app_secret_env: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Without alerts the report is only delivered during the first
    /// `hourly_window_minutes` of each hour.
    #[serde(default = "default_hourly_window_minutes")]
    pub hourly_window_minutes: u32,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            cpu: default_cpu_threshold(),
            memory: default_memory_threshold(),
            disk: default_disk_threshold(),
            checks: default_checks(),
        }
    }
}

impl Default for CollectConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout_secs(),
            disk_mount: default_disk_mount(),
            native_fallback: default_native_fallback(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            title: default_report_title(),
            time_format: default_time_format(),
            footer: default_report_footer(),
        }
    }
}

impl Default for FeishuConfig {
    fn default() -> Self {
        Self {
            enabled: default_feishu_enabled(),
            api_base: default_api_base(),
            receive_id: String::new(),
            receive_id_type: default_receive_id_type(),
            credentials_path: default_credentials_path(),
            app_id_env: default_app_id_env(),
            app_secret_env: default_app_secret_env(),
            request_timeout_secs: default_request_timeout_secs(),
            hourly_window_minutes: default_hourly_window_minutes(),
        }
    }
}

impl ThresholdsConfig {
    pub fn threshold(&self, kind: MetricKind) -> f64 {
        match kind {
            MetricKind::Cpu => self.cpu,
            MetricKind::Memory => self.memory,
            MetricKind::Disk => self.disk,
        }
    }

    pub fn is_checked(&self, kind: MetricKind) -> bool {
        self.checks.contains(&kind)
    }
}

impl CollectConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }
}

impl FeishuConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: String,
        source: serde_yaml::Error,
    },
    #[error("invalid config: {0}")]
    Validation(String),
}

impl Config {
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let path_display = path_ref.display().to_string();
        let text = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_display.clone(),
            source,
        })?;

        // YAML is a superset of JSON, so config.json files parse here as well.
        let cfg: Config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_display,
            source,
        })?;

        cfg.validate()?;
        Ok(cfg)
    }

    /// Loads the file when it exists; a missing file means built-in defaults.
    pub fn load_or_default(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        if !path_ref.exists() {
            info!(path = %path_ref.display(), "config file not found, using defaults");
            return Ok(Config::default());
        }
        Self::load_from_file(path_ref)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_thresholds(&self.thresholds)?;
        validate_collect(&self.collect)?;
        validate_report(&self.report)?;
        validate_feishu(&self.feishu)?;
        Ok(())
    }

    pub fn example_yaml() -> &'static str {
        include_str!("../config.yaml.example")
    }
}

fn validate_thresholds(cfg: &ThresholdsConfig) -> Result<(), ConfigError> {
    for kind in MetricKind::ALL {
        let value = cfg.threshold(kind);
        if !(0.0..=100.0).contains(&value) {
            return Err(ConfigError::Validation(format!(
                "thresholds.{kind} must be within 0..100, got {value}"
            )));
        }
    }
    let mut seen = HashSet::new();
    for kind in &cfg.checks {
        if !seen.insert(*kind) {
            return Err(ConfigError::Validation(format!(
                "thresholds.checks lists '{kind}' more than once"
            )));
        }
    }
    Ok(())
}

fn validate_collect(cfg: &CollectConfig) -> Result<(), ConfigError> {
    if cfg.command_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "collect.command_timeout_secs must be >= 1".to_string(),
        ));
    }
    if cfg.disk_mount.trim().is_empty() {
        return Err(ConfigError::Validation(
            "collect.disk_mount must not be empty".to_string(),
        ));
    }
    Ok(())
}

fn validate_report(cfg: &ReportConfig) -> Result<(), ConfigError> {
    if cfg.time_format.trim().is_empty() {
        return Err(ConfigError::Validation(
            "report.time_format must not be empty".to_string(),
        ));
    }
    if StrftimeItems::new(&cfg.time_format).any(|item| matches!(item, Item::Error)) {
        return Err(ConfigError::Validation(format!(
            "report.time_format '{}' is not a valid strftime pattern",
            cfg.time_format
        )));
    }
    Ok(())
}

fn validate_feishu(cfg: &FeishuConfig) -> Result<(), ConfigError> {
    const RECEIVE_ID_TYPES: [&str; 5] = ["open_id", "user_id", "union_id", "email", "chat_id"];

    if !RECEIVE_ID_TYPES.contains(&cfg.receive_id_type.as_str()) {
        return Err(ConfigError::Validation(format!(
            "feishu.receive_id_type must be one of {}, got '{}'",
            RECEIVE_ID_TYPES.join(", "),
            cfg.receive_id_type
        )));
    }
    if cfg.enabled && cfg.receive_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "feishu.receive_id is required when feishu.enabled is true".to_string(),
        ));
    }
    if cfg.api_base.trim().is_empty() {
        return Err(ConfigError::Validation(
            "feishu.api_base must not be empty".to_string(),
        ));
    }
    if cfg.request_timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "feishu.request_timeout_secs must be >= 1".to_string(),
        ));
    }
    if cfg.hourly_window_minutes > 59 {
        return Err(ConfigError::Validation(
            "feishu.hourly_window_minutes must be within 0..59".to_string(),
        ));
    }
    Ok(())
}

const fn default_cpu_threshold() -> f64 {
    80.0
}

const fn default_memory_threshold() -> f64 {
    80.0
}

const fn default_disk_threshold() -> f64 {
    90.0
}

fn default_checks() -> Vec<MetricKind> {
    MetricKind::ALL.to_vec()
}

const fn default_command_timeout_secs() -> u64 {
    5
}

fn default_disk_mount() -> String {
    "/".to_string()
}

const fn default_native_fallback() -> bool {
    true
}

fn default_report_title() -> String {
    "服务器监控".to_string()
}

fn default_time_format() -> String {
    "%m/%d %H:%M".to_string()
}

fn default_report_footer() -> String {
    "🤖 hostmon 自动巡检".to_string()
}

const fn default_feishu_enabled() -> bool {
    false
}

fn default_api_base() -> String {
    "https://open.feishu.cn".to_string()
}

fn default_receive_id_type() -> String {
    "open_id".to_string()
}

fn default_credentials_path() -> String {
    "./feishu_credentials.yaml".to_string()
}

fn default_app_id_env() -> String {
    "FEISHU_APP_ID".to_string()
}

fn default_app_secret_env() -> String {
    "FEISHU_APP_SECRET".to_string()
}

const fn default_request_timeout_secs() -> u64 {
    10
}

const fn default_hourly_window_minutes() -> u32 {
    5
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(contents: &str, suffix: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(suffix)
            .tempfile()
            .expect("create temp file");
        file.write_all(contents.as_bytes()).expect("write temp file");
        file
    }

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        cfg.validate().expect("defaults must validate");
        assert_eq!(cfg.thresholds.cpu, 80.0);
        assert_eq!(cfg.thresholds.memory, 80.0);
        assert_eq!(cfg.thresholds.disk, 90.0);
        assert_eq!(cfg.thresholds.checks, MetricKind::ALL.to_vec());
        assert_eq!(cfg.collect.command_timeout_secs, 5);
        assert_eq!(cfg.feishu.hourly_window_minutes, 5);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");
        let cfg = Config::load_or_default(dir.path().join("absent.json"))
            .expect("missing file is not an error");
        assert_eq!(cfg.thresholds.disk, 90.0);
        assert!(!cfg.feishu.enabled);
    }

    #[test]
    fn partial_json_is_merged_over_defaults() {
        let file = write_temp(r#"{"thresholds": {"memory": 90}}"#, ".json");
        let cfg = Config::load_or_default(file.path()).expect("load json");
        assert_eq!(cfg.thresholds.memory, 90.0);
        assert_eq!(cfg.thresholds.cpu, 80.0);
        assert_eq!(cfg.thresholds.disk, 90.0);
        assert_eq!(cfg.report.time_format, "%m/%d %H:%M");
    }

    #[test]
    fn yaml_with_feishu_section_loads() {
        let file = write_temp(
            "feishu:\n  enabled: true\n  receive_id: ou_123\n  receive_id_type: chat_id\n",
            ".yaml",
        );
        let cfg = Config::load_from_file(file.path()).expect("load yaml");
        assert!(cfg.feishu.enabled);
        assert_eq!(cfg.feishu.receive_id, "ou_123");
        assert_eq!(cfg.feishu.receive_id_type, "chat_id");
        assert_eq!(cfg.feishu.api_base, "https://open.feishu.cn");
    }

    #[test]
    fn enabled_feishu_requires_receive_id() {
        let mut cfg = Config::default();
        cfg.feishu.enabled = true;
        let err = cfg.validate().expect_err("receive_id is required");
        assert!(err.to_string().contains("receive_id"));
    }

    #[test]
    fn out_of_range_threshold_is_rejected() {
        let mut cfg = Config::default();
        cfg.thresholds.disk = 120.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn duplicate_checks_are_rejected() {
        let mut cfg = Config::default();
        cfg.thresholds.checks = vec![MetricKind::Cpu, MetricKind::Cpu];
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn broken_time_format_is_rejected() {
        let mut cfg = Config::default();
        cfg.report.time_format = "%Y-%Q".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn unknown_receive_id_type_is_rejected() {
        let mut cfg = Config::default();
        cfg.feishu.receive_id_type = "phone".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn malformed_file_reports_parse_error() {
        let file = write_temp("thresholds: [1, 2", ".yaml");
        let err = Config::load_or_default(file.path()).expect_err("malformed file");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn example_config_parses_and_validates() {
        let cfg: Config = serde_yaml::from_str(Config::example_yaml()).expect("parse example");
        cfg.validate().expect("example must validate");
    }
}
