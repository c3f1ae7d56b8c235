// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Access gate: one decision per request.
//!
//! Evaluation order is fixed:
//!
//! 1. Rate limit (in-memory, runs before any identity work)
//! 2. Session resolution (the only stage that suspends)
//! 3. Permission check
//!
//! The first stage to refuse ends evaluation. Internal faults at any stage
//! deny the request; they never grant it.

use crate::error::AccessError;
use crate::limiter::{RateLimitPolicy, RateLimitResult, RateLimiter};
use crate::metrics::GateMetrics;
use crate::permissions::{Permission, PermissionMatrix};
use crate::request::RequestContext;
use crate::session::{Principal, SessionOutcome, SessionResolver};
use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Why a request has no usable identity. Logged, never shown to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnauthenticatedReason {
    NoCredential,
    InvalidSession,
    InactiveAccount,
    DisallowedRole,
    UpstreamFailure,
    InternalFault,
}

impl fmt::Display for UnauthenticatedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoCredential => write!(f, "no credential"),
            Self::InvalidSession => write!(f, "invalid or expired session"),
            Self::InactiveAccount => write!(f, "inactive account"),
            Self::DisallowedRole => write!(f, "role may not hold sessions"),
            Self::UpstreamFailure => write!(f, "identity provider unavailable"),
            Self::InternalFault => write!(f, "internal fault"),
        }
    }
}

/// Outcome of [`AccessGate::evaluate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// Proceed to business logic as `principal`
    Allowed {
        principal: Principal,
        /// Counter state when a policy applied
        rate_limit: Option<RateLimitResult>,
    },
    /// Too many requests for this key
    RateLimited {
        retry_after_secs: u64,
        limit: u32,
        remaining: u32,
        reset_at: DateTime<Utc>,
    },
    /// No valid session
    Unauthenticated { reason: UnauthenticatedReason },
    /// Valid session without the required permission
    Forbidden { missing_permission: Permission },
}

impl AccessDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn principal(&self) -> Option<&Principal> {
        match self {
            Self::Allowed { principal, .. } => Some(principal),
            _ => None,
        }
    }

    /// Short label for logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allowed { .. } => "allowed",
            Self::RateLimited { .. } => "rate_limited",
            Self::Unauthenticated { .. } => "unauthenticated",
            Self::Forbidden { .. } => "forbidden",
        }
    }

    /// Error taxonomy entry for a refusal.
    pub fn error(&self) -> Option<AccessError> {
        match self {
            Self::Allowed { .. } => None,
            Self::RateLimited {
                retry_after_secs, ..
            } => Some(AccessError::RateLimitExceeded {
                retry_after_secs: *retry_after_secs,
            }),
            Self::Unauthenticated {
                reason: UnauthenticatedReason::UpstreamFailure,
            } => Some(AccessError::UpstreamIdentityFailure(
                UnauthenticatedReason::UpstreamFailure.to_string(),
            )),
            Self::Unauthenticated { .. } => Some(AccessError::InvalidOrExpiredSession),
            Self::Forbidden { missing_permission } => Some(AccessError::InsufficientPermission {
                permission: *missing_permission,
            }),
        }
    }

    fn rate_limited(result: &RateLimitResult) -> Self {
        Self::RateLimited {
            retry_after_secs: result.retry_after_secs.unwrap_or(1).max(1),
            limit: result.limit,
            remaining: result.remaining,
            reset_at: result.reset_at,
        }
    }
}

/// Composes the rate limiter, session resolver and permission matrix.
pub struct AccessGate {
    limiter: Arc<RateLimiter>,
    resolver: SessionResolver,
    matrix: Arc<PermissionMatrix>,
    metrics: Option<GateMetrics>,
}

impl AccessGate {
    pub fn new(
        limiter: Arc<RateLimiter>,
        resolver: SessionResolver,
        matrix: Arc<PermissionMatrix>,
    ) -> Self {
        Self {
            limiter,
            resolver,
            matrix,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: GateMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn matrix(&self) -> &PermissionMatrix {
        &self.matrix
    }

    pub fn metrics(&self) -> Option<&GateMetrics> {
        self.metrics.as_ref()
    }

    /// Decide whether `request` may proceed.
    ///
    /// With no `policy` the rate-limit stage is skipped. With no
    /// `required_permission` any valid principal is allowed.
    pub async fn evaluate(
        &self,
        request: &RequestContext,
        required_permission: Option<Permission>,
        policy: Option<&RateLimitPolicy>,
    ) -> AccessDecision {
        let decision = self.decide(request, required_permission, policy).await;

        match &decision {
            AccessDecision::Allowed { principal, .. } => debug!(
                id = %principal.id,
                role = %principal.role,
                path = request.path(),
                "Access allowed"
            ),
            AccessDecision::RateLimited {
                retry_after_secs, ..
            } => info!(path = request.path(), retry_after_secs, "Access rate limited"),
            AccessDecision::Unauthenticated { reason } => {
                info!(path = request.path(), reason = %reason, "Access unauthenticated")
            }
            AccessDecision::Forbidden { missing_permission } => info!(
                path = request.path(),
                permission = %missing_permission,
                "Access forbidden"
            ),
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_decision(decision.label());
        }
        decision
    }

    async fn decide(
        &self,
        request: &RequestContext,
        required_permission: Option<Permission>,
        policy: Option<&RateLimitPolicy>,
    ) -> AccessDecision {
        let mut rate_limit = None;
        if let Some(policy) = policy {
            match self.limiter.check(request, policy).await {
                Ok(result) if !result.allowed => return AccessDecision::rate_limited(&result),
                Ok(result) => rate_limit = Some(result),
                Err(e) => {
                    error!(policy = policy.name(), error = %e, "Rate limit store failure, denying");
                    return AccessDecision::Unauthenticated {
                        reason: UnauthenticatedReason::InternalFault,
                    };
                }
            }
        }

        let principal = match self.resolver.inspect(request).await {
            SessionOutcome::Resolved(principal) => principal,
            SessionOutcome::NoCredential => {
                return AccessDecision::Unauthenticated {
                    reason: UnauthenticatedReason::NoCredential,
                }
            }
            SessionOutcome::Invalid => {
                return AccessDecision::Unauthenticated {
                    reason: UnauthenticatedReason::InvalidSession,
                }
            }
            SessionOutcome::Inactive { .. } => {
                return AccessDecision::Unauthenticated {
                    reason: UnauthenticatedReason::InactiveAccount,
                }
            }
            SessionOutcome::DisallowedRole {
                id,
                role,
                credential,
            } => {
                warn!(id = %id, role = %role, "Revoking session for disallowed role");
                if self.resolver.revoke(&credential).await {
                    if let Some(metrics) = &self.metrics {
                        metrics.record_revocation();
                    }
                }
                return AccessDecision::Unauthenticated {
                    reason: UnauthenticatedReason::DisallowedRole,
                };
            }
            SessionOutcome::UpstreamFailure(_) => {
                return AccessDecision::Unauthenticated {
                    reason: UnauthenticatedReason::UpstreamFailure,
                }
            }
        };

        if !principal.active || !principal.role.may_hold_session() {
            error!(id = %principal.id, "Resolver returned an unusable principal, denying");
            return AccessDecision::Unauthenticated {
                reason: UnauthenticatedReason::InternalFault,
            };
        }

        if let Some(permission) = required_permission {
            if !self.matrix.allows(principal.role, permission) {
                return AccessDecision::Forbidden {
                    missing_permission: permission,
                };
            }
        }

        AccessDecision::Allowed {
            principal,
            rate_limit,
        }
    }
}
