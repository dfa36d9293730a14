//! Environment configuration

use crate::runtime::RuntimeConfig;
use crate::voice::VoiceTimings;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_URL: &str = "ws://localhost:8000/ws/voice";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var} must be a whole number, got `{value}`")]
    NotANumber { var: &'static str, value: String },
    #[error("{var} must not be empty")]
    Empty { var: &'static str },
}

/// Process configuration, read once at startup
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Planning service endpoint
    pub url: String,
    pub planning_timeout: Option<Duration>,
    pub timings: VoiceTimings,
    pub log_json: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            planning_timeout: None,
            timings: VoiceTimings::default(),
            log_json: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; `from_env` uses the process environment
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = VoiceTimings::default();

        let url = match lookup("TRIPDESK_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::Empty {
                    var: "TRIPDESK_URL",
                })
            }
            Some(url) => url.trim().to_string(),
            None => DEFAULT_URL.to_string(),
        };

        let planning_timeout =
            number(&lookup, "TRIPDESK_PLANNING_TIMEOUT_SECS")?.map(Duration::from_secs);
        let millis = |var: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            Ok(number(&lookup, var)?.map_or(default, Duration::from_millis))
        };

        let timings = VoiceTimings {
            restart_guard: millis("TRIPDESK_RESTART_GUARD_MS", defaults.restart_guard)?,
            speak_delay: millis("TRIPDESK_SPEAK_DELAY_MS", defaults.speak_delay)?,
            cooldown: millis("TRIPDESK_COOLDOWN_MS", defaults.cooldown)?,
            resume_delay: millis("TRIPDESK_RESUME_DELAY_MS", defaults.resume_delay)?,
        };

        let log_json = lookup("TRIPDESK_LOG_JSON").is_some_and(|v| !matches!(v.trim(), "" | "0" | "false"));

        Ok(Self {
            url,
            planning_timeout,
            timings,
            log_json,
        })
    }

    pub fn runtime(&self) -> RuntimeConfig {
        RuntimeConfig {
            timings: self.timings,
            planning_timeout: self.planning_timeout,
        }
    }
}

fn number(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<u64>, ConfigError> {
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.parse()
        .map(Some)
        .map_err(|_| ConfigError::NotANumber {
            var,
            value: raw.to_string(),
        })
}
