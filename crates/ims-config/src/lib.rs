// SPDX-License-Identifier: Apache-2.0
//! Environment-driven configuration for the IMS gateway, following
//! the `ConfigStore`/`ConfigService` split in `echo-app-core::config` —
//! here specialized to environment variables, since the original's own
//! configuration (`pdaltagent/config.py`) is entirely `os.environ`-driven.

mod error;

use std::env;
use std::time::Duration;

use serde_json::Value;

pub use error::ConfigError;

const DEFAULT_BASE_URL: &str = "https://events.pagerduty.com";
const DEFAULT_POLLING_INTERVAL_SECONDS: u64 = 10;
const DEFAULT_KEEP_ACTIVITY_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Recognized environment options.
#[derive(Debug, Clone)]
pub struct Config {
    /// `POLLING_INTERVAL_SECONDS`; default 10, enforced `>= 1`.
    pub polling_interval: Duration,
    /// `KEEP_ACTIVITY_SECONDS`; default 30 days.
    pub keep_activity: Duration,
    /// `API_TOKEN`; absence disables polling.
    pub api_token: Option<String>,
    /// `WEBHOOK_DEST_URL`; absence disables polling.
    pub webhook_dest_url: Option<String>,
    /// `GET_ALL_LOG_ENTRIES`; if truthy, request non-overview log entries.
    pub get_all_log_entries: bool,
    /// `WEBHOOK_SERVICES_LIST`; JSON array of service ids.
    pub webhook_services_list: Option<Vec<String>>,
    /// `WEBHOOK_CONFIG_JSON`; embedded under `message.webhook.config`.
    pub webhook_config_json: Option<Value>,
    /// `LOG_EVENTS`; verbose logging of each dispatch.
    pub log_events: bool,
    /// `DEBUG`; debug-level logging and enrichment debug traces.
    pub debug: bool,
    /// Default outbound base URL for event dispatch, configurable for
    /// test/staging use the same way `base_url` is a parameter of
    /// `send_event`.
    pub base_url: String,
}

impl Config {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            polling_interval: Duration::from_secs(parse_u64(
                "POLLING_INTERVAL_SECONDS",
                DEFAULT_POLLING_INTERVAL_SECONDS,
            )?.max(1)),
            keep_activity: Duration::from_secs(parse_u64(
                "KEEP_ACTIVITY_SECONDS",
                DEFAULT_KEEP_ACTIVITY_SECONDS,
            )?),
            api_token: env::var("API_TOKEN").ok(),
            webhook_dest_url: env::var("WEBHOOK_DEST_URL").ok(),
            get_all_log_entries: is_truthy("GET_ALL_LOG_ENTRIES"),
            webhook_services_list: parse_json_list("WEBHOOK_SERVICES_LIST")?,
            webhook_config_json: parse_json_value("WEBHOOK_CONFIG_JSON")?,
            log_events: is_truthy("LOG_EVENTS"),
            debug: is_truthy("DEBUG"),
            base_url: env::var("BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.to_string()),
        })
    }

    /// Polling is only enabled once both an API token and a destination
    /// URL are configured.
    pub fn polling_enabled(&self) -> bool {
        self.api_token.is_some() && self.webhook_dest_url.is_some()
    }

    /// `is_overview` query parameter value for `GET /log_entries`:
    /// `false` when `GET_ALL_LOG_ENTRIES` is set, `true` otherwise.
    pub fn is_overview(&self) -> bool {
        !self.get_all_log_entries
    }
}

fn is_truthy(var: &str) -> bool {
    match env::var(var) {
        Ok(value) => !value.is_empty() && !value.eq_ignore_ascii_case("false"),
        Err(_) => false,
    }
}

fn parse_u64(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(var) {
        Ok(value) => value.parse().map_err(|_| ConfigError::InvalidNumber { var, value }),
        Err(_) => Ok(default),
    }
}

fn parse_json_list(var: &'static str) -> Result<Option<Vec<String>>, ConfigError> {
    match env::var(var) {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::InvalidJson { var, source }),
        Err(_) => Ok(None),
    }
}

fn parse_json_value(var: &'static str) -> Result<Option<Value>, ConfigError> {
    match env::var(var) {
        Ok(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ConfigError::InvalidJson { var, source }),
        Err(_) => Ok(None),
    }
}
