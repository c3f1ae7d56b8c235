// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP boundary for the access gate.
//!
//! The service runs as a forward-auth endpoint: the reverse proxy sends
//! the original request's headers to `/check` with the required permission
//! and rate-limit policy as query parameters, and forwards the request
//! upstream only on a 200.

use crate::config::Config;
use crate::gate::{AccessDecision, AccessGate};
use crate::limiter::{PolicySet, RateLimitResult};
use crate::permissions::Permission;
use crate::request::RequestContext;
use axum::{
    extract::{ConnectInfo, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, warn};

/// Header a forward-auth proxy uses for the original request URI.
const FORWARDED_URI: &str = "x-forwarded-uri";

/// Shared application state.
pub struct AppState {
    pub gate: AccessGate,
    pub policies: PolicySet,
    pub config: Config,
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
}

/// What the caller wants checked.
#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    #[serde(default)]
    pub permission: Option<String>,
    #[serde(default)]
    pub policy: Option<String>,
}

/// Body of an allowed check.
#[derive(Debug, Serialize)]
pub struct CheckResponse {
    pub allowed: bool,
    pub id: String,
    pub role: &'static str,
}

/// Build the service router.
pub fn router(state: Arc<AppState>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/check", get(check).post(check));

    if state.config.metrics.enabled && state.gate.metrics().is_some() {
        app = app.route(&state.config.metrics.path, get(metrics));
    }

    app.with_state(state)
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        service: "access-gate",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// Prometheus exposition endpoint.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    let Some(metrics) = state.gate.metrics() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    metrics.set_rate_limit_entries(state.gate.limiter().entry_count().await);
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        metrics.render(),
    )
        .into_response()
}

/// Evaluate the forwarded request.
pub async fn check(
    State(state): State<Arc<AppState>>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    Query(query): Query<CheckQuery>,
    uri: Uri,
    headers: HeaderMap,
) -> Response {
    let permission = match query.permission.as_deref().map(str::parse::<Permission>) {
        None => None,
        Some(Ok(p)) => Some(p),
        Some(Err(e)) => {
            warn!(error = %e, "Check requested with unknown permission");
            return bad_request(e.to_string(), "UNKNOWN_PERMISSION");
        }
    };

    let policy = match query.policy.as_deref() {
        None => None,
        Some(name) => match state.policies.get(name) {
            Some(p) => Some(p),
            None => {
                warn!(policy = name, "Check requested with unknown policy");
                return bad_request(format!("Unknown policy: {name}"), "UNKNOWN_POLICY");
            }
        },
    };

    let path = headers
        .get(FORWARDED_URI)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uri.path().to_string());
    let request = RequestContext::new(headers, connect_info.map(|ConnectInfo(addr)| addr), path);

    debug!(
        path = request.path(),
        permission = ?permission,
        policy = ?policy.as_ref().map(|p| p.name()),
        "Processing access check"
    );

    state
        .gate
        .evaluate(&request, permission, policy.as_deref())
        .await
        .into_response()
}

fn bad_request(error: String, code: &'static str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(ErrorResponse {
            error,
            code,
            retry_after_secs: None,
        }),
    )
        .into_response()
}

fn set_header(headers: &mut HeaderMap, name: &'static str, value: impl ToString) {
    if let Ok(value) = HeaderValue::from_str(&value.to_string()) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

fn rate_limit_headers(headers: &mut HeaderMap, limit: u32, remaining: u32, reset_epoch: i64) {
    set_header(headers, "x-ratelimit-limit", limit);
    set_header(headers, "x-ratelimit-remaining", remaining);
    set_header(headers, "x-ratelimit-reset", reset_epoch);
}

fn attach_snapshot(headers: &mut HeaderMap, result: &RateLimitResult) {
    rate_limit_headers(
        headers,
        result.limit,
        result.remaining,
        result.reset_at.timestamp(),
    );
}

impl IntoResponse for AccessDecision {
    fn into_response(self) -> Response {
        let error = self.error().map(|e| e.to_string()).unwrap_or_default();
        match self {
            AccessDecision::Allowed {
                principal,
                rate_limit,
            } => {
                let mut headers = HeaderMap::new();
                set_header(&mut headers, "x-principal-id", &principal.id);
                set_header(&mut headers, "x-principal-role", principal.role);
                if let Some(result) = &rate_limit {
                    attach_snapshot(&mut headers, result);
                }
                (
                    StatusCode::OK,
                    headers,
                    Json(CheckResponse {
                        allowed: true,
                        id: principal.id,
                        role: principal.role.as_str(),
                    }),
                )
                    .into_response()
            }
            AccessDecision::RateLimited {
                retry_after_secs,
                limit,
                remaining,
                reset_at,
            } => {
                let mut headers = HeaderMap::new();
                headers.insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
                rate_limit_headers(&mut headers, limit, remaining, reset_at.timestamp());
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    headers,
                    Json(ErrorResponse {
                        error,
                        code: "RATE_LIMITED",
                        retry_after_secs: Some(retry_after_secs),
                    }),
                )
                    .into_response()
            }
            AccessDecision::Unauthenticated { .. } => (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    // Reason stays in the logs.
                    error: "Authentication required".to_string(),
                    code: "UNAUTHENTICATED",
                    retry_after_secs: None,
                }),
            )
                .into_response(),
            AccessDecision::Forbidden { .. } => (
                StatusCode::FORBIDDEN,
                Json(ErrorResponse {
                    error,
                    code: "FORBIDDEN",
                    retry_after_secs: None,
                }),
            )
                .into_response(),
        }
    }
}
