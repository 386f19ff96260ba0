//! Named-key debouncing for sampling triggers.
//!
//! Timer ticks and page-lifecycle callbacks both funnel into the same
//! debounced entry point; rapid repeated triggers under one key collapse to
//! a single deferred invocation, with each new trigger cancelling and
//! restarting the pending one.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::task::JoinHandle;

#[derive(Default)]
pub struct Debouncer {
    pending: Arc<DashMap<String, (u64, JoinHandle<()>)>>,
    next_id: AtomicU64,
}

impl Debouncer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `work` to run after `delay`, cancelling any invocation
    /// already pending under the same key.
    pub fn trigger<F>(&self, key: &str, delay: Duration, work: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.cancel(key);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let pending = Arc::clone(&self.pending);
        let owned_key = key.to_string();
        let handle = tokio::spawn({
            let owned_key = owned_key.clone();
            async move {
                tokio::time::sleep(delay).await;
                work.await;
                // Drop our own entry unless a newer trigger replaced it.
                pending.remove_if(&owned_key, |_, (entry_id, _)| *entry_id == id);
            }
        });
        if let Some((_, stale)) = self.pending.insert(owned_key, (id, handle)) {
            stale.abort();
        }
    }

    /// Cancel a pending invocation, if any.
    pub fn cancel(&self, key: &str) {
        if let Some((_, (_, handle))) = self.pending.remove(key) {
            handle.abort();
        }
    }

    /// Cancel everything (page closed).
    pub fn cancel_all(&self) {
        let keys: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            self.cancel(&key);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}

impl Drop for Debouncer {
    fn drop(&mut self) {
        self.cancel_all();
    }
}
