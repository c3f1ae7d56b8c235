// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP tests for the forward-auth endpoint.

use access_gate::{
    clock::ManualClock,
    config::Config,
    handlers::{router, AppState},
    limiter::PolicySet,
    metrics::GateMetrics,
    store::InMemoryCounterStore,
    testing::MockIdentityProvider,
    AccessGate, PermissionMatrix, RateLimiter, Role, SessionResolver,
};
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

async fn app() -> Router {
    let provider = Arc::new(MockIdentityProvider::new());
    provider.insert("admin-token", "a-1", Role::Admin, true).await;
    provider.insert("dev-token", "d-1", Role::Developer, true).await;

    let config = Config::default();
    let limiter = RateLimiter::new(
        Arc::new(InMemoryCounterStore::new()),
        Arc::new(ManualClock::at_epoch()),
    )
    .with_trusted_header(Some("x-forwarded-for"));
    let gate = AccessGate::new(
        Arc::new(limiter),
        SessionResolver::new(provider, "session", Duration::from_secs(1)),
        Arc::new(PermissionMatrix::standard()),
    )
    .with_metrics(GateMetrics::new().unwrap());

    router(Arc::new(AppState {
        gate,
        policies: PolicySet::from_config(&config.policies).unwrap(),
        config,
    }))
}

fn check(query: &str, ip: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .uri(format!("/check{query}"))
        .header("x-forwarded-for", ip)
        .header("x-forwarded-uri", "/api/settings");
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

async fn json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_health() {
    let response = app()
        .await
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "access-gate");
}

#[tokio::test]
async fn test_allowed_check_identifies_principal() {
    let response = app()
        .await
        .oneshot(check(
            "?permission=admin:settings&policy=api",
            "1.2.3.4",
            Some("admin-token"),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let h = response.headers();
    assert_eq!(h.get("x-principal-id").unwrap(), "a-1");
    assert_eq!(h.get("x-principal-role").unwrap(), "admin");
    assert_eq!(h.get("x-ratelimit-limit").unwrap(), "100");
    assert_eq!(h.get("x-ratelimit-remaining").unwrap(), "99");

    let body = json(response).await;
    assert_eq!(body["allowed"], true);
    assert_eq!(body["role"], "admin");
}

#[tokio::test]
async fn test_missing_session_is_401() {
    let response = app()
        .await
        .oneshot(check("?policy=api", "1.2.3.4", None))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["code"], "UNAUTHENTICATED");
}

#[tokio::test]
async fn test_missing_permission_is_403() {
    let response = app()
        .await
        .oneshot(check("?permission=admin:settings", "1.2.3.4", Some("dev-token")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(json(response).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_login_flood_is_429_with_headers() {
    let app = app().await;

    for _ in 0..5 {
        let response = app
            .clone()
            .oneshot(check("?policy=login", "1.2.3.4", Some("admin-token")))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = app
        .clone()
        .oneshot(check("?policy=login", "1.2.3.4", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    let h = response.headers();
    assert_eq!(h.get("retry-after").unwrap(), "60");
    assert_eq!(h.get("x-ratelimit-limit").unwrap(), "5");
    assert_eq!(h.get("x-ratelimit-remaining").unwrap(), "0");
    assert_eq!(h.get("x-ratelimit-reset").unwrap(), "60");

    let body = json(response).await;
    assert_eq!(body["code"], "RATE_LIMITED");
    assert_eq!(body["retry_after_secs"], 60);

    // Another client is unaffected.
    let response = app
        .oneshot(check("?policy=login", "5.6.7.8", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_permission_and_policy_are_400() {
    let app = app().await;

    let response = app
        .clone()
        .oneshot(check("?permission=admin:everything", "1.2.3.4", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["code"], "UNKNOWN_PERMISSION");

    let response = app
        .oneshot(check("?policy=nope", "1.2.3.4", Some("admin-token")))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["code"], "UNKNOWN_POLICY");
}

#[tokio::test]
async fn test_metrics_count_decisions() {
    let app = app().await;

    app.clone()
        .oneshot(check("", "1.2.3.4", None))
        .await
        .unwrap();

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(text.contains("access_gate_decisions_total{decision=\"unauthenticated\"} 1"));
    assert!(text.contains("access_gate_rate_limit_entries"));
}
