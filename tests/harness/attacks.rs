// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Attack simulation patterns for security testing.

/// Attack pattern configuration.
#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// Total number of requests to send
    pub total_requests: usize,
    /// Number of unique IPs to simulate
    pub unique_ips: usize,
    /// Whether requests carry a valid session token
    pub valid_session: bool,
    /// Number of distinct forged tokens when the session is not valid
    pub forged_tokens: usize,
    /// Requests fired concurrently per batch
    pub concurrency: usize,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            total_requests: 100,
            unique_ips: 1,
            valid_session: true,
            forged_tokens: 1,
            concurrency: 1,
        }
    }
}

/// Predefined attack patterns.
impl AttackConfig {
    /// Single IP flood, fired concurrently.
    pub fn single_ip_flood() -> Self {
        Self {
            total_requests: 200,
            unique_ips: 1,
            concurrency: 50,
            ..Default::default()
        }
    }

    /// Distributed attack - many IPs, low volume each.
    pub fn distributed_attack() -> Self {
        Self {
            total_requests: 500,
            unique_ips: 100,
            concurrency: 25,
            ..Default::default()
        }
    }

    /// Credential stuffing - one IP cycling forged session tokens.
    pub fn credential_stuffing() -> Self {
        Self {
            total_requests: 50,
            unique_ips: 1,
            valid_session: false,
            forged_tokens: 50,
            concurrency: 10,
        }
    }

    /// Requests each IP sends on average.
    pub fn per_ip(&self) -> usize {
        self.total_requests.div_ceil(self.unique_ips.max(1))
    }
}
