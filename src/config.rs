//! Application configuration, loaded from YAML and adjusted from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use cdp_adapter::CdpConfig;
use clap::ValueEnum;
use event_correlator::{MatchRule, RetryPolicy};
use serde::{Deserialize, Serialize};
use tracing::info;

/// How each thread is saved.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExportMode {
    /// Capture the thread payload from network traffic and render it locally.
    #[default]
    Capture,
    /// Let the site produce an export file and wait for the browser download.
    Download,
}

impl ExportMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ExportMode::Capture => "capture",
            ExportMode::Download => "download",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub output_dir: PathBuf,
    pub done_file: PathBuf,
    /// Label of the signed-in account; only shows up in logs.
    pub account: Option<String>,
    /// Delay between threads.
    pub pace_ms: u64,
    pub mode: ExportMode,
    pub browser: CdpConfig,
    pub capture: CaptureConfig,
    pub download: DownloadConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("./conversations"),
            done_file: PathBuf::from("done.json"),
            account: None,
            pace_ms: 2_000,
            mode: ExportMode::default(),
            browser: CdpConfig::default(),
            capture: CaptureConfig::default(),
            download: DownloadConfig::default(),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    #[serde(rename = "match")]
    pub rule: MatchRule,
    /// Give up on a thread when no payload arrives in time. Unset waits forever.
    pub wait_timeout_secs: Option<u64>,
}

impl CaptureConfig {
    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout_secs.map(Duration::from_secs)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Where the browser saves exports. Defaults to the output directory.
    pub download_dir: Option<PathBuf>,
    /// Script evaluated in the thread page to start the export download.
    pub trigger_script: Option<String>,
    pub retry: RetrySettings,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub cooldown_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            cooldown_secs: 60,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_attempts, Duration::from_secs(self.cooldown_secs))
    }
}

impl Config {
    pub fn pace(&self) -> Duration {
        Duration::from_millis(self.pace_ms)
    }

    pub fn download_dir(&self) -> PathBuf {
        self.download
            .download_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.clone())
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from `lookup`; blank values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(dir) = get("THREADKEEPER_OUTPUT_DIR") {
            self.output_dir = PathBuf::from(dir);
        }
        if let Some(file) = get("THREADKEEPER_DONE_FILE").or_else(|| get("DONE_FILE")) {
            self.done_file = PathBuf::from(file);
        }
        if let Some(account) = get("THREADKEEPER_ACCOUNT") {
            self.account = Some(account);
        }
        if let Some(flag) = get("THREADKEEPER_HEADLESS") {
            self.browser.headless = matches!(
                flag.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            );
        }
        if let Some(chrome) = get("THREADKEEPER_CHROME") {
            self.browser.executable = PathBuf::from(chrome);
        }
        if let Some(ws) = get("THREADKEEPER_WS_URL") {
            info!(target: "archiver", "attaching to an existing browser at {ws}");
            self.browser.websocket_url = Some(ws);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_match_the_documented_values() {
        let config = Config::default();
        assert_eq!(config.pace(), Duration::from_secs(2));
        assert_eq!(config.mode, ExportMode::Capture);
        assert_eq!(config.download.retry.max_attempts, 3);
        assert_eq!(config.download.retry.cooldown_secs, 60);
        assert_eq!(config.capture.rule, MatchRule::default());
        assert!(config.capture.wait_timeout().is_none());
        assert_eq!(config.download_dir(), config.output_dir);
    }

    #[test]
    fn yaml_sections_merge_with_defaults() {
        let yaml = r#"
output_dir: /srv/threads
mode: download
capture:
  match:
    query_marker: "limit=50"
  wait_timeout_secs: 45
download:
  trigger_script: "exportThread()"
  retry:
    cooldown_secs: 5
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("/srv/threads"));
        assert_eq!(config.mode, ExportMode::Download);
        assert_eq!(config.capture.rule.query_marker, "limit=50");
        assert_eq!(config.capture.rule.path_marker, "/rest/thread/");
        assert_eq!(config.capture.wait_timeout(), Some(Duration::from_secs(45)));
        assert_eq!(
            config.download.trigger_script.as_deref(),
            Some("exportThread()")
        );
        assert_eq!(config.download.retry.max_attempts, 3);
        assert_eq!(config.download.retry.cooldown_secs, 5);
        assert_eq!(config.done_file, PathBuf::from("done.json"));
    }

    #[test]
    fn environment_overrides_win() {
        let vars: HashMap<&str, &str> = [
            ("THREADKEEPER_OUTPUT_DIR", "/tmp/out"),
            ("DONE_FILE", "/tmp/legacy-done.json"),
            ("THREADKEEPER_ACCOUNT", "someone@example.com"),
            ("THREADKEEPER_HEADLESS", "true"),
            ("THREADKEEPER_WS_URL", "ws://127.0.0.1:9222/devtools/browser/x"),
            ("THREADKEEPER_CHROME", " "),
        ]
        .into_iter()
        .collect();
        let mut config = Config::default();
        let chrome_before = config.browser.executable.clone();
        config.apply_overrides_from(|key| vars.get(key).map(|value| value.to_string()));

        assert_eq!(config.output_dir, PathBuf::from("/tmp/out"));
        assert_eq!(config.done_file, PathBuf::from("/tmp/legacy-done.json"));
        assert_eq!(config.account.as_deref(), Some("someone@example.com"));
        assert!(config.browser.headless);
        assert_eq!(
            config.browser.websocket_url.as_deref(),
            Some("ws://127.0.0.1:9222/devtools/browser/x")
        );
        assert_eq!(config.browser.executable, chrome_before);
    }

    #[test]
    fn new_done_file_variable_beats_legacy_one() {
        let mut config = Config::default();
        config.apply_overrides_from(|key| match key {
            "THREADKEEPER_DONE_FILE" => Some("new.json".into()),
            "DONE_FILE" => Some("old.json".into()),
            _ => None,
        });
        assert_eq!(config.done_file, PathBuf::from("new.json"));
    }
}
