// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window rate limiter.
//!
//! Each named policy keeps its own counters. A request's counter key is
//! derived by the policy's [`KeyStrategy`], so a flood against the login
//! endpoint cannot exhaust the donation budget of the same client.

use crate::clock::{Clock, SystemClock};
use crate::config::{KeyStrategyConfig, PolicyConfig};
use crate::error::{ConfigError, StoreError};
use crate::request::RequestContext;
use crate::store::{CounterKey, CounterStore, InMemoryCounterStore};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Key used when neither a proxy header nor a peer address is available.
const UNKNOWN_CLIENT: &str = "unknown";

/// Longest accepted policy window: one leap year.
pub const MAX_WINDOW_MS: u64 = 366 * 24 * 60 * 60 * 1000;

/// Custom key derivation.
pub type KeyFn = Arc<dyn Fn(&RequestContext, Option<&str>) -> String + Send + Sync>;

/// How a policy turns a request into a counter key.
#[derive(Clone)]
pub enum KeyStrategy {
    /// Client IP
    ClientIp,
    /// Client IP plus an endpoint category
    ClientIpAndCategory(String),
    /// Caller-supplied function of the request and the trusted proxy header
    Custom(KeyFn),
}

impl KeyStrategy {
    fn derive(&self, request: &RequestContext, trusted_header: Option<&str>) -> String {
        let ip = || {
            request
                .client_ip(trusted_header)
                .map(|ip| ip.to_string())
                .unwrap_or_else(|| UNKNOWN_CLIENT.to_string())
        };
        match self {
            Self::ClientIp => ip(),
            Self::ClientIpAndCategory(category) => format!("{}|{}", ip(), category),
            Self::Custom(f) => f(request, trusted_header),
        }
    }
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ClientIp => write!(f, "ClientIp"),
            Self::ClientIpAndCategory(c) => write!(f, "ClientIpAndCategory({c})"),
            Self::Custom(_) => write!(f, "Custom(..)"),
        }
    }
}

impl From<&KeyStrategyConfig> for KeyStrategy {
    fn from(config: &KeyStrategyConfig) -> Self {
        match config {
            KeyStrategyConfig::ClientIp => Self::ClientIp,
            KeyStrategyConfig::ClientIpAndCategory { category } => {
                Self::ClientIpAndCategory(category.clone())
            }
        }
    }
}

/// Immutable rate-limit configuration.
#[derive(Debug, Clone)]
pub struct RateLimitPolicy {
    name: String,
    window_ms: u64,
    max_requests: u32,
    key_strategy: KeyStrategy,
}

impl RateLimitPolicy {
    /// Build a policy. A zero ceiling, or a window of zero or above
    /// [`MAX_WINDOW_MS`], is a configuration error.
    pub fn new(
        name: impl Into<String>,
        window_ms: u64,
        max_requests: u32,
        key_strategy: KeyStrategy,
    ) -> Result<Self, ConfigError> {
        let name = name.into();
        if window_ms == 0 {
            return Err(ConfigError::NonPositiveWindow { policy: name });
        }
        if window_ms > MAX_WINDOW_MS {
            return Err(ConfigError::WindowTooLong {
                policy: name,
                max_ms: MAX_WINDOW_MS,
            });
        }
        if max_requests == 0 {
            return Err(ConfigError::NonPositiveMaxRequests { policy: name });
        }
        Ok(Self {
            name,
            window_ms,
            max_requests,
            key_strategy,
        })
    }

    pub fn from_config(config: &PolicyConfig) -> Result<Self, ConfigError> {
        Self::new(
            config.name.clone(),
            config.window_ms,
            config.max_requests,
            KeyStrategy::from(&config.key),
        )
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn max_requests(&self) -> u32 {
        self.max_requests
    }

    pub fn window(&self) -> Duration {
        Duration::milliseconds(self.window_ms as i64)
    }

    /// Counter key for `request` under this policy.
    pub fn key_for(&self, request: &RequestContext, trusted_header: Option<&str>) -> String {
        self.key_strategy.derive(request, trusted_header)
    }
}

/// Named policies, validated at startup.
#[derive(Debug, Clone, Default)]
pub struct PolicySet {
    policies: HashMap<String, Arc<RateLimitPolicy>>,
}

impl PolicySet {
    pub fn from_config(configs: &[PolicyConfig]) -> Result<Self, ConfigError> {
        let mut policies = HashMap::new();
        for config in configs {
            let policy = RateLimitPolicy::from_config(config)?;
            if policies
                .insert(policy.name.clone(), Arc::new(policy))
                .is_some()
            {
                return Err(ConfigError::DuplicatePolicy(config.name.clone()));
            }
        }
        Ok(Self { policies })
    }

    pub fn get(&self, name: &str) -> Option<Arc<RateLimitPolicy>> {
        self.policies.get(name).cloned()
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.policies.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Outcome of one rate-limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    pub allowed: bool,
    /// Policy ceiling
    pub limit: u32,
    /// Requests left in the current window
    pub remaining: u32,
    /// When the current window lapses
    pub reset_at: DateTime<Utc>,
    /// Whole seconds until a retry can succeed; set only when denied
    pub retry_after_secs: Option<u64>,
}

impl RateLimitResult {
    fn from_entry(count: u32, reset_at: DateTime<Utc>, now: DateTime<Utc>, limit: u32) -> Self {
        if count > limit {
            Self {
                allowed: false,
                limit,
                remaining: 0,
                reset_at,
                retry_after_secs: Some(ceil_secs(reset_at - now)),
            }
        } else {
            Self {
                allowed: true,
                limit,
                remaining: limit - count,
                reset_at,
                retry_after_secs: None,
            }
        }
    }
}

fn ceil_secs(d: Duration) -> u64 {
    let ms = d.num_milliseconds().max(0) as u64;
    ms.div_ceil(1000)
}

/// Thread-safe fixed-window rate limiter.
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
    clock: Arc<dyn Clock>,
    trusted_header: Option<String>,
}

impl RateLimiter {
    /// Create a new rate limiter over the given store and clock.
    pub fn new(store: Arc<dyn CounterStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            trusted_header: None,
        }
    }

    /// In-memory store with the wall clock.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(InMemoryCounterStore::new()), Arc::new(SystemClock))
    }

    /// Read the client IP from `header` when present.
    pub fn with_trusted_header(mut self, header: Option<&str>) -> Self {
        self.trusted_header = header.map(str::to_ascii_lowercase);
        self
    }

    /// Check and count a request under `policy`.
    pub async fn check(
        &self,
        request: &RequestContext,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitResult, StoreError> {
        let client = policy.key_for(request, self.trusted_header.as_deref());
        self.check_key(&client, policy).await
    }

    /// Check and count a request for an already-derived client key.
    pub async fn check_key(
        &self,
        client: &str,
        policy: &RateLimitPolicy,
    ) -> Result<RateLimitResult, StoreError> {
        let key = CounterKey::new(policy.name(), client);
        let now = self.clock.now();
        let entry = self.store.hit(&key, policy.window(), now).await?;
        let result =
            RateLimitResult::from_entry(entry.count, entry.window_reset_at, now, policy.max_requests);

        if result.allowed {
            debug!(
                policy = policy.name(),
                client,
                remaining = result.remaining,
                "Rate limit check passed"
            );
        } else {
            info!(
                policy = policy.name(),
                client,
                count = entry.count,
                retry_after_secs = ?result.retry_after_secs,
                "Rate limit exceeded"
            );
        }
        Ok(result)
    }

    /// Evict counters idle for `idle_windows` window lengths. Call periodically.
    pub async fn cleanup(&self, idle_windows: u32) -> usize {
        match self.store.sweep(self.clock.now(), idle_windows).await {
            Ok(removed) => removed,
            Err(e) => {
                error!(error = %e, "Rate limit sweep failed");
                0
            }
        }
    }

    /// Live counter entries.
    pub async fn entry_count(&self) -> usize {
        self.store.entry_count().await
    }
}
