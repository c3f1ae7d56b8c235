// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Error types for the access gate.
//!
//! [`AccessError`] is the caller-facing taxonomy. Every variant maps onto
//! exactly one [`AccessDecision`](crate::gate::AccessDecision); internal
//! faults never cross the boundary as raw errors.

use crate::permissions::Permission;
use thiserror::Error;

/// Why a request was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AccessError {
    #[error("Rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimitExceeded { retry_after_secs: u64 },

    #[error("Invalid or expired session")]
    InvalidOrExpiredSession,

    #[error("Missing permission: {permission}")]
    InsufficientPermission { permission: Permission },

    #[error("Identity provider failure: {0}")]
    UpstreamIdentityFailure(String),
}

impl AccessError {
    /// Whether the caller can recover without a role change.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::InsufficientPermission { .. })
    }
}

/// Startup-time configuration errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Policy {policy}: window must be positive")]
    NonPositiveWindow { policy: String },

    #[error("Policy {policy}: window exceeds {max_ms}ms")]
    WindowTooLong { policy: String, max_ms: u64 },

    #[error("Policy {policy}: max_requests must be positive")]
    NonPositiveMaxRequests { policy: String },

    #[error("Duplicate policy name: {0}")]
    DuplicatePolicy(String),

    #[error("Role {0} has an empty permission set")]
    EmptyRole(String),

    #[error("Permission {0} is not granted to any role")]
    UnusedPermission(String),

    #[error("Invalid configuration value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Counter store backend failures.
#[derive(Debug, Error, Clone)]
pub enum StoreError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[error("Window end out of range for {0}")]
    WindowOverflow(String),
}

/// Identity provider transport or protocol failures.
#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("Identity provider request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Identity provider returned status {0}")]
    Status(u16),

    #[error("Identity provider timed out after {0}ms")]
    Timeout(u64),

    #[error("Identity provider error: {0}")]
    Other(String),
}
