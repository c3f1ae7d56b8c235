// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Access Gate
//!
//! Request-mediation core for the content and donation API. Every
//! privileged call passes through [`AccessGate::evaluate`], which applies:
//!
//! - Per-client fixed-window rate limiting, with independent named policies
//!   (login, donation, password reset, prayer request, subscribe, api)
//! - Session resolution against an external identity provider, with a
//!   bounded timeout and revoke-on-detect for roles without session access
//! - Role-based permission checks over a static, explicit matrix
//!
//! The result is an explicit [`AccessDecision`]; refusals map to 429, 401
//! and 403 at the HTTP boundary.

pub mod clock;
pub mod config;
pub mod error;
pub mod gate;
pub mod handlers;
pub mod limiter;
pub mod metrics;
pub mod permissions;
pub mod request;
pub mod session;
pub mod store;
pub mod testing;

pub use config::Config;
pub use error::{AccessError, ConfigError};
pub use gate::{AccessDecision, AccessGate, UnauthenticatedReason};
pub use limiter::{PolicySet, RateLimitPolicy, RateLimitResult, RateLimiter};
pub use permissions::{Permission, PermissionMatrix, Role};
pub use request::RequestContext;
pub use session::{IdentityProvider, Principal, SessionResolver};
