// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Test doubles for the gate's collaborators.
//!
//! [`MockIdentityProvider`] keeps sessions in memory and can be made slow
//! or failing, so resolver and gate behaviour can be exercised without a
//! running identity service.

use crate::error::{IdentityError, StoreError};
use crate::permissions::Role;
use crate::session::{Credential, IdentityProvider, VerifiedIdentity};
use crate::store::{CounterKey, CounterStore, RateLimitEntry};
use async_trait::async_trait;
use chrono::{DateTime, Duration as WindowDuration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;

/// In-memory identity provider.
#[derive(Debug, Default)]
pub struct MockIdentityProvider {
    sessions: RwLock<HashMap<String, VerifiedIdentity>>,
    revoked: RwLock<Vec<String>>,
    delay: Option<Duration>,
    failing: bool,
    verify_calls: AtomicUsize,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Fail every call with a transport-style error.
    pub fn failing(mut self) -> Self {
        self.failing = true;
        self
    }

    pub async fn insert(&self, token: &str, id: &str, role: Role, active: bool) {
        self.sessions.write().await.insert(
            token.to_string(),
            VerifiedIdentity {
                id: id.to_string(),
                role,
                active,
            },
        );
    }

    /// Tokens revoked so far, in order.
    pub async fn revoked(&self) -> Vec<String> {
        self.revoked.read().await.clone()
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    async fn simulate(&self) -> Result<(), IdentityError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing {
            return Err(IdentityError::Other("identity provider unreachable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn verify_session(
        &self,
        credential: &Credential,
    ) -> Result<Option<VerifiedIdentity>, IdentityError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        self.simulate().await?;
        Ok(self.sessions.read().await.get(&credential.token).cloned())
    }

    async fn revoke_session(&self, credential: &Credential) -> Result<(), IdentityError> {
        self.simulate().await?;
        self.sessions.write().await.remove(&credential.token);
        self.revoked.write().await.push(credential.token.clone());
        Ok(())
    }
}

/// Counter store whose backend is always down.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableCounterStore;

#[async_trait]
impl CounterStore for UnavailableCounterStore {
    async fn hit(
        &self,
        _key: &CounterKey,
        _window: WindowDuration,
        _now: DateTime<Utc>,
    ) -> Result<RateLimitEntry, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn sweep(&self, _now: DateTime<Utc>, _idle_windows: u32) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn entry_count(&self) -> usize {
        0
    }
}
