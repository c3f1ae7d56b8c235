// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test data generators for attack simulation.

use access_gate::RequestContext;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

/// Generate a pool of IP addresses for testing.
pub fn generate_ips(count: usize) -> Vec<IpAddr> {
    (0..count)
        .map(|i| {
            // Use 10.x.x.x private range
            let a = ((i >> 16) & 0xFF) as u8;
            let b = ((i >> 8) & 0xFF) as u8;
            let c = (i & 0xFF) as u8;
            IpAddr::V4(Ipv4Addr::new(10, a, b, c))
        })
        .collect()
}

/// Generate session tokens the identity provider has never issued.
pub fn generate_forged_tokens(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("forged-{i:04}")).collect()
}

/// Request from `ip`, optionally carrying a bearer token.
pub fn request_from(ip: IpAddr, token: Option<&str>) -> RequestContext {
    let req = RequestContext::default()
        .with_peer(SocketAddr::new(ip, 40_000))
        .with_path("/api/admin/settings");
    match token {
        Some(t) => req.with_header("authorization", &format!("Bearer {t}")),
        None => req,
    }
}

/// Proxy header values an attacker might use to spoof the client address.
pub fn generate_spoofed_forwarded_for() -> Vec<&'static str> {
    vec![
        "1.1.1.1",
        "2.2.2.2, 10.0.0.1",
        "garbage",
        "",
        "::1",
        "127.0.0.1",
    ]
}
