use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use control_core::{
    transport::{DEFAULT_COMMAND_PATH, DEFAULT_STATE_PATH},
    ConfirmationPolicy, HttpTransportConfig,
};
use serde::Deserialize;
use url::Url;

pub const DEFAULT_CONFIG_FILE: &str = "supervisor.toml";

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub controller_url: String,
    pub state_path: String,
    pub command_path: String,
    pub poll_period_ms: u64,
    pub confirm_attempts: usize,
    pub confirm_delay_ms: u64,
    pub request_timeout_ms: u64,
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            controller_url: "http://127.0.0.1:5000".into(),
            state_path: DEFAULT_STATE_PATH.into(),
            command_path: DEFAULT_COMMAND_PATH.into(),
            poll_period_ms: 1000,
            confirm_attempts: 6,
            confirm_delay_ms: 100,
            request_timeout_ms: 2000,
            log_filter: "info".into(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    controller_url: Option<String>,
    state_path: Option<String>,
    command_path: Option<String>,
    poll_period_ms: Option<u64>,
    confirm_attempts: Option<usize>,
    confirm_delay_ms: Option<u64>,
    request_timeout_ms: Option<u64>,
    log_filter: Option<String>,
}

/// Defaults, then the TOML file if present, then environment overrides.
pub fn load_settings(config_path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut settings = Settings::default();

    let path = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    match fs::read_to_string(path) {
        Ok(raw) => apply_file(&mut settings, &raw)
            .with_context(|| format!("invalid settings file '{}'", path.display()))?,
        // An explicitly named file has to exist.
        Err(error) if config_path.is_some() => {
            return Err(error).with_context(|| format!("failed to read '{}'", path.display()));
        }
        Err(_) => {}
    }

    apply_env(&mut settings, |key| std::env::var(key).ok());
    Ok(settings)
}

fn apply_file(settings: &mut Settings, raw: &str) -> anyhow::Result<()> {
    let file: FileSettings = toml::from_str(raw)?;
    if let Some(v) = file.controller_url {
        settings.controller_url = v;
    }
    if let Some(v) = file.state_path {
        settings.state_path = v;
    }
    if let Some(v) = file.command_path {
        settings.command_path = v;
    }
    if let Some(v) = file.poll_period_ms {
        settings.poll_period_ms = v;
    }
    if let Some(v) = file.confirm_attempts {
        settings.confirm_attempts = v;
    }
    if let Some(v) = file.confirm_delay_ms {
        settings.confirm_delay_ms = v;
    }
    if let Some(v) = file.request_timeout_ms {
        settings.request_timeout_ms = v;
    }
    if let Some(v) = file.log_filter {
        settings.log_filter = v;
    }
    Ok(())
}

fn apply_env(settings: &mut Settings, var: impl Fn(&str) -> Option<String>) {
    let first = |keys: &[&str]| keys.iter().find_map(|key| var(key));

    if let Some(v) = first(&["APP__CONTROLLER_URL", "SUPERVISOR_CONTROLLER_URL"]) {
        settings.controller_url = v;
    }
    if let Some(v) = first(&["APP__STATE_PATH", "SUPERVISOR_STATE_PATH"]) {
        settings.state_path = v;
    }
    if let Some(v) = first(&["APP__COMMAND_PATH", "SUPERVISOR_COMMAND_PATH"]) {
        settings.command_path = v;
    }
    if let Some(v) = first(&["APP__POLL_PERIOD_MS", "SUPERVISOR_POLL_PERIOD_MS"]) {
        if let Ok(parsed) = v.parse() {
            settings.poll_period_ms = parsed;
        }
    }
    if let Some(v) = first(&["APP__CONFIRM_ATTEMPTS", "SUPERVISOR_CONFIRM_ATTEMPTS"]) {
        if let Ok(parsed) = v.parse() {
            settings.confirm_attempts = parsed;
        }
    }
    if let Some(v) = first(&["APP__CONFIRM_DELAY_MS", "SUPERVISOR_CONFIRM_DELAY_MS"]) {
        if let Ok(parsed) = v.parse() {
            settings.confirm_delay_ms = parsed;
        }
    }
    if let Some(v) = first(&["APP__REQUEST_TIMEOUT_MS", "SUPERVISOR_REQUEST_TIMEOUT_MS"]) {
        if let Ok(parsed) = v.parse() {
            settings.request_timeout_ms = parsed;
        }
    }
    if let Some(v) = first(&["APP__LOG_FILTER", "SUPERVISOR_LOG_FILTER"]) {
        settings.log_filter = v;
    }
}

impl Settings {
    pub fn transport_config(&self) -> anyhow::Result<HttpTransportConfig> {
        let base_url = Url::parse(&self.controller_url)
            .with_context(|| format!("invalid controller url '{}'", self.controller_url))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            anyhow::bail!("controller url must be http or https, got '{}'", base_url);
        }

        let mut config = HttpTransportConfig::new(base_url);
        config.state_path = self.state_path.clone();
        config.command_path = self.command_path.clone();
        config.request_timeout =
            (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms));
        Ok(config)
    }

    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            attempts: self.confirm_attempts,
            delay: Duration::from_millis(self.confirm_delay_ms),
        }
    }

    pub fn poll_period(&self) -> Duration {
        Duration::from_millis(self.poll_period_ms)
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
