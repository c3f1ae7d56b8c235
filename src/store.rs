// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Fixed-window counter storage.
//!
//! The store owns the only mutable shared state of the gate. Each
//! [`CounterStore::hit`] performs the window-reset decision and the
//! increment as one step; callers never observe them separately.

use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Counter identity: policy name plus client key.
///
/// Policies never share entries, even for the same client.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CounterKey {
    pub policy: String,
    pub client: String,
}

impl CounterKey {
    pub fn new(policy: impl Into<String>, client: impl Into<String>) -> Self {
        Self {
            policy: policy.into(),
            client: client.into(),
        }
    }
}

/// Counter state for one key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitEntry {
    /// Requests seen in the current window, including the current one
    pub count: u32,
    /// When the current window lapses
    pub window_reset_at: DateTime<Utc>,
    /// Last time the entry was touched
    pub last_seen: DateTime<Utc>,
    /// Window length the entry was created with
    pub window: Duration,
}

impl RateLimitEntry {
    /// `None` when the window end is not representable.
    fn fresh(now: DateTime<Utc>, window: Duration) -> Option<Self> {
        now.checked_add_signed(window).map(|window_reset_at| Self {
            count: 1,
            window_reset_at,
            last_seen: now,
            window,
        })
    }

    /// Whether the sweep may drop this entry.
    ///
    /// An idle span that overflows is never reached, so the entry is kept.
    pub fn is_stale(&self, now: DateTime<Utc>, idle_windows: u32) -> bool {
        let Some(idle) = i32::try_from(idle_windows)
            .ok()
            .and_then(|n| self.window.checked_mul(n))
        else {
            return false;
        };
        now >= self.window_reset_at && now.signed_duration_since(self.last_seen) >= idle
    }
}

/// Backing store for rate-limit counters.
///
/// Implementations must make `hit` linearizable per key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Record one request for `key` and return the entry after the update.
    ///
    /// A missing entry, or one whose window has lapsed at `now`, is replaced
    /// by a fresh window with `count = 1`.
    async fn hit(
        &self,
        key: &CounterKey,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitEntry, StoreError>;

    /// Drop stale entries. Returns the number removed.
    async fn sweep(&self, now: DateTime<Utc>, idle_windows: u32) -> Result<usize, StoreError>;

    /// Number of live entries.
    async fn entry_count(&self) -> usize;
}

/// Single-process store: a map behind one async write lock.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCounterStore {
    entries: Arc<RwLock<HashMap<CounterKey, RateLimitEntry>>>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current entry for `key`, without touching it.
    pub async fn get(&self, key: &CounterKey) -> Option<RateLimitEntry> {
        self.entries.read().await.get(key).copied()
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(
        &self,
        key: &CounterKey,
        window: Duration,
        now: DateTime<Utc>,
    ) -> Result<RateLimitEntry, StoreError> {
        let mut entries = self.entries.write().await;

        if let Some(entry) = entries.get_mut(key) {
            if now < entry.window_reset_at {
                entry.count = entry.count.saturating_add(1);
                entry.last_seen = now;
                return Ok(*entry);
            }
        }

        let entry = RateLimitEntry::fresh(now, window).ok_or_else(|| {
            StoreError::WindowOverflow(format!("{}/{}", key.policy, key.client))
        })?;
        entries.insert(key.clone(), entry);
        Ok(entry)
    }

    async fn sweep(&self, now: DateTime<Utc>, idle_windows: u32) -> Result<usize, StoreError> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_stale(now, idle_windows));
        let removed = before - entries.len();
        debug!(removed, remaining = entries.len(), "Swept rate limit entries");
        Ok(removed)
    }

    async fn entry_count(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(ms: i64) -> DateTime<Utc> {
        DateTime::<Utc>::UNIX_EPOCH + Duration::milliseconds(ms)
    }

    #[tokio::test]
    async fn test_hit_counts_within_window() {
        let store = InMemoryCounterStore::new();
        let key = CounterKey::new("login", "1.2.3.4");
        let window = Duration::seconds(60);

        let first = store.hit(&key, window, t(0)).await.unwrap();
        assert_eq!(first.count, 1);
        assert_eq!(first.window_reset_at, t(60_000));

        let second = store.hit(&key, window, t(30_000)).await.unwrap();
        assert_eq!(second.count, 2);
        assert_eq!(second.window_reset_at, t(60_000));
    }

    #[tokio::test]
    async fn test_hit_resets_at_window_boundary() {
        let store = InMemoryCounterStore::new();
        let key = CounterKey::new("login", "1.2.3.4");
        let window = Duration::seconds(60);

        for _ in 0..4 {
            store.hit(&key, window, t(0)).await.unwrap();
        }
        let reset = store.hit(&key, window, t(60_000)).await.unwrap();
        assert_eq!(reset.count, 1);
        assert_eq!(reset.window_reset_at, t(120_000));
    }

    #[tokio::test]
    async fn test_policies_do_not_share_entries() {
        let store = InMemoryCounterStore::new();
        let window = Duration::seconds(60);
        let login = CounterKey::new("login", "1.2.3.4");
        let donation = CounterKey::new("donation", "1.2.3.4");

        store.hit(&login, window, t(0)).await.unwrap();
        store.hit(&login, window, t(0)).await.unwrap();
        let d = store.hit(&donation, window, t(0)).await.unwrap();

        assert_eq!(d.count, 1);
        assert_eq!(store.get(&login).await.map(|e| e.count), Some(2));
        assert_eq!(store.entry_count().await, 2);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_idle_entries() {
        let store = InMemoryCounterStore::new();
        let window = Duration::seconds(10);
        let idle = CounterKey::new("api", "10.0.0.1");
        let busy = CounterKey::new("api", "10.0.0.2");

        store.hit(&idle, window, t(0)).await.unwrap();
        store.hit(&busy, window, t(0)).await.unwrap();
        store.hit(&busy, window, t(25_000)).await.unwrap();

        // idle: last seen 0, 30s ago = 3 windows; busy: window still open
        let removed = store.sweep(t(30_000), 3).await.unwrap();
        assert_eq!(removed, 1);
        assert!(store.get(&idle).await.is_none());
        assert!(store.get(&busy).await.is_some());
    }

    #[tokio::test]
    async fn test_sweep_keeps_lapsed_but_recent_entries() {
        let store = InMemoryCounterStore::new();
        let window = Duration::seconds(10);
        let key = CounterKey::new("api", "10.0.0.1");

        store.hit(&key, window, t(0)).await.unwrap();
        assert_eq!(store.sweep(t(15_000), 3).await.unwrap(), 0);
        assert_eq!(store.entry_count().await, 1);
    }

    #[tokio::test]
    async fn test_unrepresentable_window_is_an_error() {
        let store = InMemoryCounterStore::new();
        let key = CounterKey::new("login", "1.2.3.4");
        let window = Duration::milliseconds(10_000_000_000_000_000);

        let err = store.hit(&key, window, t(0)).await.unwrap_err();
        assert!(matches!(err, StoreError::WindowOverflow(_)));
        assert_eq!(store.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_with_huge_idle_span_keeps_entries() {
        let store = InMemoryCounterStore::new();
        let key = CounterKey::new("api", "10.0.0.1");

        store.hit(&key, Duration::seconds(10), t(0)).await.unwrap();
        assert_eq!(store.sweep(t(1_000_000), u32::MAX).await.unwrap(), 0);
        assert_eq!(store.entry_count().await, 1);
    }
}
