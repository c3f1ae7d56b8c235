// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Read-only view of an inbound request.
//!
//! The gate only needs headers, cookies, the connection's peer address and
//! the request path. Handlers build a [`RequestContext`] from axum parts and
//! pass it by reference; nothing in the core mutates it.

use axum::http::{header, HeaderMap, HeaderName, HeaderValue};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

/// Headers, peer address and path of one request.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    headers: HeaderMap,
    peer: Option<SocketAddr>,
    path: String,
}

impl RequestContext {
    pub fn new(headers: HeaderMap, peer: Option<SocketAddr>, path: impl Into<String>) -> Self {
        Self {
            headers,
            peer,
            path: path.into(),
        }
    }

    /// Add a header. Invalid names or values are ignored.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.append(name, value);
        }
        self
    }

    pub fn with_peer(mut self, peer: SocketAddr) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn peer_ip(&self) -> Option<IpAddr> {
        self.peer.map(|addr| addr.ip())
    }

    /// First value of a header, if it is valid UTF-8.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Value of a named cookie across all `Cookie` headers.
    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|raw| raw.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value.trim_matches('"'))
            .filter(|value| !value.is_empty())
    }

    /// Token from `Authorization: Bearer <token>`.
    pub fn bearer_token(&self) -> Option<&str> {
        let value = self.header(header::AUTHORIZATION.as_str())?;
        let (scheme, token) = value.split_once(' ')?;
        let token = token.trim();
        (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
    }

    /// Client IP used for rate-limit keys.
    ///
    /// With `trusted_header` set, the first parseable hop of that header wins;
    /// otherwise (or when the header is absent or garbage) the peer address is
    /// used.
    pub fn client_ip(&self, trusted_header: Option<&str>) -> Option<IpAddr> {
        if let Some(name) = trusted_header {
            if let Some(raw) = self.header(name) {
                let first = raw.split(',').next().unwrap_or(raw).trim();
                match first.parse::<IpAddr>() {
                    Ok(ip) => return Some(ip),
                    Err(_) => debug!(header = name, value = %raw, "Unparseable proxy header"),
                }
            }
        }
        self.peer_ip()
    }
}
