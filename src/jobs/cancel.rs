// ABOUTME: Explicit cooperative cancellation: per-upload tokens and a process-wide registry
// ABOUTME: Workers poll or await tokens at every suspension point
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 PowerPulse Analytics

//! # Cooperative Cancellation
//!
//! Each upload runs under its own [`CancellationToken`], threaded through
//! the job scheduler. Tokens are registered in a process-wide
//! [`CancellationRegistry`] so the cancel endpoint and process shutdown
//! can reach in-flight uploads by id.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Notify, RwLock};

/// A cloneable cancellation flag with async notification
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancellationToken {
    /// Create an uncancelled token
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal cancellation and wake every waiter
    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    /// Non-blocking check, used between suspension points
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolve once the token is cancelled
    pub async fn cancelled(&self) {
        while !self.is_cancelled() {
            let notified = self.inner.notify.notified();
            // Re-check after arming the waiter so a cancel between the
            // check and the await cannot be missed
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }
}

/// Process-wide registry mapping upload ids to their cancellation tokens
#[derive(Debug, Clone, Default)]
pub struct CancellationRegistry {
    inner: Arc<RwLock<HashMap<String, CancellationToken>>>,
}

impl CancellationRegistry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and register a token for an upload
    pub async fn register(&self, upload_id: &str) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner
            .write()
            .await
            .insert(upload_id.to_owned(), token.clone());
        token
    }

    /// Cancel one upload; returns false when the id is unknown
    pub async fn cancel(&self, upload_id: &str) -> bool {
        let registry = self.inner.read().await;
        registry.get(upload_id).map_or(false, |token| {
            token.cancel();
            true
        })
    }

    /// Drop an upload's token once its pipeline has terminated
    pub async fn remove(&self, upload_id: &str) {
        self.inner.write().await.remove(upload_id);
    }

    /// Cancel every registered upload (process shutdown)
    pub async fn cancel_all(&self) {
        let registry = self.inner.read().await;
        for token in registry.values() {
            token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn token_starts_uncancelled() {
        let token = CancellationToken::new();
        assert!(!token.is_cancelled());
    }

    #[tokio::test]
    async fn cancel_is_visible_to_clones() {
        let token = CancellationToken::new();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[tokio::test]
    async fn cancelled_future_resolves() {
        let token = CancellationToken::new();
        let waiter = token.clone();
        let handle = tokio::spawn(async move {
            waiter.cancelled().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
    }

    #[tokio::test]
    async fn cancelled_future_resolves_when_already_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        tokio::time::timeout(Duration::from_millis(100), token.cancelled())
            .await
            .expect("already-cancelled token resolves immediately");
    }

    #[tokio::test]
    async fn registry_cancels_by_upload_id() {
        let registry = CancellationRegistry::new();
        let token = registry.register("u1").await;
        assert!(!token.is_cancelled());
        assert!(registry.cancel("u1").await);
        assert!(token.is_cancelled());
        assert!(!registry.cancel("unknown").await);
    }

    #[tokio::test]
    async fn cancel_all_reaches_every_upload() {
        let registry = CancellationRegistry::new();
        let t1 = registry.register("u1").await;
        let t2 = registry.register("u2").await;
        registry.cancel_all().await;
        assert!(t1.is_cancelled());
        assert!(t2.is_cancelled());
    }
}
