// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Access Gate Service
//!
//! Forward-auth service placed in front of the content and donation API.
//! The reverse proxy calls `/check?permission=<tag>&policy=<name>` with the
//! original request headers and forwards the request only on a 200.
//!
//! ## Configuration
//!
//! Defaults are built in. `ACCESS_GATE_CONFIG` names an optional JSON file,
//! and these environment variables override both:
//!
//! - `BIND_ADDR`: Server bind address (default: 0.0.0.0:8080)
//! - `SESSION_COOKIE`: Session cookie name (default: session)
//! - `IDENTITY_PROVIDER_URL`: Identity provider base URL
//! - `IDENTITY_TIMEOUT_MS`: Identity provider timeout (default: 2000)
//! - `TRUST_PROXY` / `PROXY_HEADER`: Read the client IP from a proxy header
//! - `SWEEP_INTERVAL_SECS` / `SWEEP_IDLE_WINDOWS`: Stale counter eviction
//! - `METRICS_ENABLED`: Expose `/metrics` (default: true)

use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use access_gate::{
    clock::SystemClock,
    config::Config,
    gate::AccessGate,
    handlers::{router, AppState},
    limiter::{PolicySet, RateLimiter},
    metrics::GateMetrics,
    permissions::PermissionMatrix,
    session::{HttpIdentityProvider, SessionResolver},
    store::InMemoryCounterStore,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer().json())
        .with(
            EnvFilter::builder()
                .with_default_directive(Level::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let config = load_config()?;
    config.validate()?;

    // Startup validation: bad policies or matrix abort the process
    let policies = PolicySet::from_config(&config.policies)?;
    let matrix = PermissionMatrix::standard();
    matrix.validate()?;

    info!(
        bind_addr = %config.bind_addr,
        policies = ?policies.names(),
        identity_provider = %config.session.identity_provider_url,
        identity_timeout_ms = config.session.identity_timeout_ms,
        trust_proxy = config.proxy.trust_proxy,
        "Starting access gate"
    );

    let limiter = Arc::new(
        RateLimiter::new(Arc::new(InMemoryCounterStore::new()), Arc::new(SystemClock))
            .with_trusted_header(config.proxy.trusted_header()),
    );
    let resolver = SessionResolver::new(
        Arc::new(HttpIdentityProvider::new(
            config.session.identity_provider_url.clone(),
        )),
        config.session.cookie_name.clone(),
        config.session.identity_timeout(),
    );

    let mut gate = AccessGate::new(limiter.clone(), resolver, Arc::new(matrix));
    if config.metrics.enabled {
        gate = gate.with_metrics(GateMetrics::new()?);
    }

    // Spawn cleanup task
    if config.cleanup.enabled {
        let cleanup_limiter = limiter.clone();
        let cleanup = config.cleanup.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(cleanup.interval());
            loop {
                interval.tick().await;
                let removed = cleanup_limiter.cleanup(cleanup.idle_windows).await;
                if removed > 0 {
                    info!(removed, "Evicted stale rate limit entries");
                }
            }
        });
    }

    let addr: SocketAddr = config.bind_addr.parse()?;
    let state = Arc::new(AppState {
        gate,
        policies,
        config,
    });

    let app = router(state).layer(TraceLayer::new_for_http());

    let listener = TcpListener::bind(addr).await?;
    info!(addr = %addr, "Server listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

/// Load configuration from an optional JSON file, then the environment.
fn load_config() -> anyhow::Result<Config> {
    let base = match std::env::var("ACCESS_GATE_CONFIG") {
        Ok(path) => Config::from_json(&std::fs::read_to_string(&path)?)?,
        Err(_) => Config::default(),
    };
    Ok(base.apply_env()?)
}
