// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Prometheus metrics for gate decisions.

use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

/// Decision counters and counter-store size.
#[derive(Clone)]
pub struct GateMetrics {
    registry: Registry,
    decisions: IntCounterVec,
    revocations: IntCounter,
    rate_limit_entries: IntGauge,
}

impl GateMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let decisions = IntCounterVec::new(
            Opts::new("access_gate_decisions_total", "Access decisions by outcome"),
            &["decision"],
        )?;
        let revocations = IntCounter::new(
            "access_gate_revocations_total",
            "Sessions revoked on detection of a disallowed role",
        )?;
        let rate_limit_entries = IntGauge::new(
            "access_gate_rate_limit_entries",
            "Live rate limit counter entries",
        )?;

        registry.register(Box::new(decisions.clone()))?;
        registry.register(Box::new(revocations.clone()))?;
        registry.register(Box::new(rate_limit_entries.clone()))?;

        Ok(Self {
            registry,
            decisions,
            revocations,
            rate_limit_entries,
        })
    }

    pub fn record_decision(&self, label: &str) {
        self.decisions.with_label_values(&[label]).inc();
    }

    pub fn record_revocation(&self) {
        self.revocations.inc();
    }

    pub fn set_rate_limit_entries(&self, count: usize) {
        self.rate_limit_entries.set(count as i64);
    }

    pub fn decision_count(&self, label: &str) -> u64 {
        self.decisions.with_label_values(&[label]).get()
    }

    /// Text exposition format.
    pub fn render(&self) -> String {
        let mut buf = Vec::new();
        if TextEncoder::new()
            .encode(&self.registry.gather(), &mut buf)
            .is_err()
        {
            return String::new();
        }
        String::from_utf8(buf).unwrap_or_default()
    }
}
