// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Configuration for the access gate.
//!
//! Defaults carry the application's abuse ceilings. Every field can be
//! overridden from a JSON file and then from environment variables.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the access gate service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server bind address (default: 0.0.0.0:8080)
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Session resolution configuration
    #[serde(default)]
    pub session: SessionConfig,

    /// Client address configuration
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Named rate-limit policies
    #[serde(default = "default_policies")]
    pub policies: Vec<PolicyConfig>,

    /// Stale entry sweep configuration
    #[serde(default)]
    pub cleanup: CleanupConfig,

    /// Metrics configuration
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Session resolution configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session cookie name (default: session)
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,

    /// Identity provider base URL (default: http://127.0.0.1:8081)
    #[serde(default = "default_identity_url")]
    pub identity_provider_url: String,

    /// Upper bound on identity provider latency in milliseconds (default: 2000)
    #[serde(default = "default_identity_timeout_ms")]
    pub identity_timeout_ms: u64,
}

/// How the client IP is determined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Trust the proxy header (default: false)
    #[serde(default)]
    pub trust_proxy: bool,

    /// Header carrying the client address (default: x-forwarded-for)
    #[serde(default = "default_proxy_header")]
    pub header: String,
}

/// How a policy derives its counter key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KeyStrategyConfig {
    /// Client IP only
    ClientIp,
    /// Client IP combined with an endpoint category
    ClientIpAndCategory { category: String },
}

/// One named rate-limit policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub name: String,
    pub window_ms: u64,
    pub max_requests: u32,
    #[serde(default = "default_key_strategy")]
    pub key: KeyStrategyConfig,
}

/// Largest accepted `idle_windows`.
pub const MAX_IDLE_WINDOWS: u32 = 1_000;

/// Periodic eviction of stale counters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupConfig {
    /// Run the sweep (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Seconds between sweeps (default: 60)
    #[serde(default = "default_sweep_interval_secs")]
    pub interval_secs: u64,

    /// Window lengths an entry must sit idle before eviction (default: 3)
    #[serde(default = "default_idle_windows")]
    pub idle_windows: u32,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable Prometheus metrics endpoint (default: true)
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics endpoint path (default: /metrics)
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

// Default value functions
fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_identity_url() -> String {
    "http://127.0.0.1:8081".to_string()
}

fn default_identity_timeout_ms() -> u64 {
    2000
}

fn default_proxy_header() -> String {
    "x-forwarded-for".to_string()
}

fn default_key_strategy() -> KeyStrategyConfig {
    KeyStrategyConfig::ClientIp
}

fn default_sweep_interval_secs() -> u64 {
    60
}

fn default_idle_windows() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

fn default_metrics_path() -> String {
    "/metrics".to_string()
}

const MINUTE_MS: u64 = 60_000;
const HOUR_MS: u64 = 60 * MINUTE_MS;

fn category_policy(name: &str, window_ms: u64, max_requests: u32) -> PolicyConfig {
    PolicyConfig {
        name: name.to_string(),
        window_ms,
        max_requests,
        key: KeyStrategyConfig::ClientIpAndCategory {
            category: name.to_string(),
        },
    }
}

fn default_policies() -> Vec<PolicyConfig> {
    vec![
        PolicyConfig {
            name: "api".to_string(),
            window_ms: 15 * MINUTE_MS,
            max_requests: 100,
            key: KeyStrategyConfig::ClientIp,
        },
        category_policy("login", MINUTE_MS, 5),
        category_policy("donation", MINUTE_MS, 10),
        category_policy("password-reset", HOUR_MS, 3),
        category_policy("prayer-request", HOUR_MS, 5),
        category_policy("subscribe", HOUR_MS, 5),
    ]
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            session: SessionConfig::default(),
            proxy: ProxyConfig::default(),
            policies: default_policies(),
            cleanup: CleanupConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_cookie_name(),
            identity_provider_url: default_identity_url(),
            identity_timeout_ms: default_identity_timeout_ms(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            trust_proxy: false,
            header: default_proxy_header(),
        }
    }
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            interval_secs: default_sweep_interval_secs(),
            idle_windows: default_idle_windows(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            path: default_metrics_path(),
        }
    }
}

impl SessionConfig {
    /// Get the identity provider timeout
    pub fn identity_timeout(&self) -> Duration {
        Duration::from_millis(self.identity_timeout_ms)
    }
}

impl ProxyConfig {
    /// Header to read the client IP from, if trusted.
    pub fn trusted_header(&self) -> Option<&str> {
        self.trust_proxy.then_some(self.header.as_str())
    }
}

impl CleanupConfig {
    /// Get the sweep interval
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Config {
    /// Parse a JSON configuration document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(raw).map_err(|e| ConfigError::InvalidValue {
            key: "config",
            value: e.to_string(),
        })
    }

    /// Apply environment overrides from the process environment.
    pub fn apply_env(self) -> Result<Self, ConfigError> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup.
    pub fn apply_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("BIND_ADDR") {
            self.bind_addr = v;
        }
        if let Some(v) = lookup("SESSION_COOKIE") {
            self.session.cookie_name = v;
        }
        if let Some(v) = lookup("IDENTITY_PROVIDER_URL") {
            self.session.identity_provider_url = v;
        }
        if let Some(v) = lookup("IDENTITY_TIMEOUT_MS") {
            self.session.identity_timeout_ms = parse_value("IDENTITY_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = lookup("TRUST_PROXY") {
            self.proxy.trust_proxy = parse_value("TRUST_PROXY", &v)?;
        }
        if let Some(v) = lookup("PROXY_HEADER") {
            self.proxy.header = v;
        }
        if let Some(v) = lookup("SWEEP_INTERVAL_SECS") {
            self.cleanup.interval_secs = parse_value("SWEEP_INTERVAL_SECS", &v)?;
        }
        if let Some(v) = lookup("SWEEP_IDLE_WINDOWS") {
            self.cleanup.idle_windows = parse_value("SWEEP_IDLE_WINDOWS", &v)?;
        }
        if let Some(v) = lookup("METRICS_ENABLED") {
            self.metrics.enabled = parse_value("METRICS_ENABLED", &v)?;
        }
        Ok(self)
    }

    /// Reject values that would misbehave at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session.identity_timeout_ms == 0 {
            return Err(ConfigError::InvalidValue {
                key: "IDENTITY_TIMEOUT_MS",
                value: "0".to_string(),
            });
        }
        if self.cleanup.enabled && self.cleanup.interval_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "SWEEP_INTERVAL_SECS",
                value: "0".to_string(),
            });
        }
        if !(1..=MAX_IDLE_WINDOWS).contains(&self.cleanup.idle_windows) {
            return Err(ConfigError::InvalidValue {
                key: "SWEEP_IDLE_WINDOWS",
                value: self.cleanup.idle_windows.to_string(),
            });
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &'static str, raw: &str) -> Result<T, ConfigError> {
    raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
    })
}
