//! Fixed-window admission control keyed by client identifier.
//!
//! The controller owns the policy (limit, window, retry computation); the
//! [`RateLimitStore`] owns the counters. The in-process store is the default;
//! a shared cache can implement the same trait for multi-instance deployments,
//! at which point the counters become globally consistent. With the in-process
//! store each instance counts on its own.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Bucket shared by every client we cannot identify.
pub const UNKNOWN_CLIENT: &str = "unknown";

/// Counter state for one client key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitEntry {
    pub count: u32,
    /// Epoch milliseconds at which the window rolls over.
    pub window_reset_at: u64,
}

impl RateLimitEntry {
    pub fn is_expired(&self, now_ms: u64) -> bool {
        now_ms > self.window_reset_at
    }
}

/// Storage seam for admission counters.
///
/// `hit` is the read-modify-write used on the request path and must be atomic
/// per key: two concurrent hits for the same key may never both observe the
/// pre-increment count.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    async fn get(&self, key: &str) -> Option<RateLimitEntry>;
    async fn set(&self, key: &str, entry: RateLimitEntry);
    /// Count one request: start a new window when none is live, otherwise increment.
    async fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimitEntry;
    /// Drop entries whose window already elapsed; returns how many were removed.
    async fn sweep(&self, now_ms: u64) -> usize;
}

#[derive(Default)]
pub struct MemoryRateLimitStore {
    entries: Mutex<HashMap<String, RateLimitEntry>>,
}

impl MemoryRateLimitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl RateLimitStore for MemoryRateLimitStore {
    async fn get(&self, key: &str) -> Option<RateLimitEntry> {
        let map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        map.get(key).copied()
    }

    async fn set(&self, key: &str, entry: RateLimitEntry) {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        map.insert(key.to_string(), entry);
    }

    async fn hit(&self, key: &str, now_ms: u64, window_ms: u64) -> RateLimitEntry {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        match map.get_mut(key) {
            Some(entry) if !entry.is_expired(now_ms) => {
                entry.count = entry.count.saturating_add(1);
                *entry
            }
            _ => {
                let fresh = RateLimitEntry {
                    count: 1,
                    window_reset_at: now_ms.saturating_add(window_ms),
                };
                map.insert(key.to_string(), fresh);
                fresh
            }
        }
    }

    async fn sweep(&self, now_ms: u64) -> usize {
        let mut map = self.entries.lock().unwrap_or_else(|p| p.into_inner());
        let before = map.len();
        map.retain(|_, entry| !entry.is_expired(now_ms));
        before - map.len()
    }
}

/// Outcome of one admission check. Denial is a normal result, not an error.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    Allowed { remaining: u32 },
    Denied { retry_after_secs: u64 },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allowed { .. })
    }

    pub fn retry_after_secs(&self) -> Option<u64> {
        match self {
            Admission::Denied { retry_after_secs } => Some(*retry_after_secs),
            Admission::Allowed { .. } => None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AdmissionPolicy {
    pub limit: u32,
    pub window: Duration,
}

impl Default for AdmissionPolicy {
    fn default() -> Self {
        Self {
            limit: 20,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Clone)]
pub struct AdmissionController {
    store: Arc<dyn RateLimitStore>,
    policy: AdmissionPolicy,
}

impl AdmissionController {
    pub fn new(store: Arc<dyn RateLimitStore>, policy: AdmissionPolicy) -> Self {
        Self { store, policy }
    }

    pub fn in_memory(policy: AdmissionPolicy) -> Self {
        Self::new(Arc::new(MemoryRateLimitStore::new()), policy)
    }

    pub fn policy(&self) -> AdmissionPolicy {
        self.policy
    }

    pub async fn admit(&self, client_key: &str) -> Admission {
        self.admit_at(client_key, now_ms()).await
    }

    pub async fn admit_at(&self, client_key: &str, now_ms: u64) -> Admission {
        let key = if client_key.trim().is_empty() {
            UNKNOWN_CLIENT
        } else {
            client_key
        };
        let window_ms = self.policy.window.as_millis().min(u64::MAX as u128) as u64;
        let entry = self.store.hit(key, now_ms, window_ms).await;
        if entry.count > self.policy.limit {
            let wait_ms = entry.window_reset_at.saturating_sub(now_ms);
            let retry_after_secs = wait_ms.div_ceil(1000).max(1);
            warn!(
                target: "ava::admission",
                client = %key,
                count = entry.count,
                limit = self.policy.limit,
                retry_after_secs,
                "request denied"
            );
            Admission::Denied { retry_after_secs }
        } else {
            Admission::Allowed {
                remaining: self.policy.limit - entry.count,
            }
        }
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(now_ms()).await
    }

    pub async fn sweep_at(&self, now_ms: u64) -> usize {
        let removed = self.store.sweep(now_ms).await;
        if removed > 0 {
            debug!(target: "ava::admission", removed, "swept expired rate-limit entries");
        }
        removed
    }
}

pub(crate) fn now_ms() -> u64 {
    chrono::Utc::now()
        .timestamp_millis()
        .try_into()
        .unwrap_or_default()
}
