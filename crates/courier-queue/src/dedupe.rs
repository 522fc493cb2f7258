//! Single-flight control keyed by dedupe key.

use crate::metrics::QueueMetrics;
use async_trait::async_trait;
use courier_core::{Adapter, ApiResult, CancelToken, Request, Response, SharedAdapter, WeakCancelToken};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// Dedupe layer: at most one call in flight per dedupe key.
///
/// The table maps each key to the cancellation token of the call currently
/// holding it. A call is identified by its request's token, so every attempt
/// of a retried call maps to the same entry and a new call with the same key
/// supersedes the old one wherever it sits: queued, in flight, or waiting
/// out a retry delay. Entries hold weak handles and are pruned once the
/// owning call's token is gone.
///
/// A collision fires the token carried by the request. Callers that reuse
/// one token across calls should hand each call its own child token (see
/// [`CancelToken::child`]) so a collision only aborts that call, and release
/// the key with [`release`](Self::release) once the call is over for good.
#[derive(Clone)]
pub struct DedupeAdapter {
    inner: SharedAdapter,
    entries: Arc<Mutex<HashMap<String, WeakCancelToken>>>,
}

impl DedupeAdapter {
    pub fn new(inner: SharedAdapter) -> Self {
        Self {
            inner,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Cancels the call currently holding `key`.
    ///
    /// Returns true if a live call was cancelled.
    pub fn cancel(&self, key: &str) -> bool {
        let holder = self.entries.lock().remove(key).and_then(|entry| entry.upgrade());

        match holder {
            Some(token) => {
                debug!(dedupe_key = key, "Cancelling request by key");
                token.fire();
                true
            }
            None => false,
        }
    }

    /// Cancels every tracked call. Returns how many live calls were cancelled.
    pub fn cancel_all(&self) -> usize {
        let holders: Vec<CancelToken> = self
            .entries
            .lock()
            .drain()
            .filter_map(|(_, entry)| entry.upgrade())
            .collect();

        if !holders.is_empty() {
            debug!(count = holders.len(), "Cancelling all keyed requests");
        }
        for token in &holders {
            token.fire();
        }
        holders.len()
    }

    /// Returns true if a live call currently holds `key`.
    #[must_use]
    pub fn is_active(&self, key: &str) -> bool {
        self.entries
            .lock()
            .get(key)
            .and_then(WeakCancelToken::upgrade)
            .is_some_and(|token| !token.is_fired())
    }

    /// Number of keys held by live calls.
    #[must_use]
    pub fn active_keys(&self) -> usize {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.upgrade().is_some());
        entries.len()
    }

    /// Records `token` as the holder of `key`, returning the previous live
    /// holder when it belongs to a different call.
    fn claim(&self, key: &str, token: &CancelToken) -> Option<CancelToken> {
        let mut entries = self.entries.lock();
        entries.retain(|_, entry| entry.upgrade().is_some());

        let previous = entries.insert(key.to_string(), token.downgrade())?;
        if previous.points_to(token) {
            return None;
        }
        previous.upgrade()
    }

    /// Drops the entry for `key` if `token` still holds it. Returns true if
    /// an entry was removed.
    ///
    /// Failed attempts keep their key so a retry waiting in backoff can still
    /// be superseded. Whoever owns the whole call releases the key once the
    /// call is over.
    pub fn release(&self, key: &str, token: &CancelToken) -> bool {
        let mut entries = self.entries.lock();
        if entries.get(key).is_some_and(|entry| entry.points_to(token)) {
            entries.remove(key);
            trace!(dedupe_key = key, "Released dedupe key");
            return true;
        }
        false
    }
}

#[async_trait]
impl Adapter for DedupeAdapter {
    async fn send(&self, request: Request) -> ApiResult<Response> {
        let Some(key) = request.dedupe_key().map(str::to_string) else {
            return self.inner.send(request).await;
        };
        let token = request.signal().clone();

        if let Some(previous) = self.claim(&key, &token) {
            debug!(dedupe_key = %key, "Superseding in-flight request");
            QueueMetrics::superseded();
            previous.fire();
        }

        let result = self.inner.send(request).await;

        // A failure may still be retried under the same token, so the key is
        // only released once the call is over for good.
        match &result {
            Ok(_) => {
                self.release(&key, &token);
            }
            Err(e) if e.is_cancelled() => {
                self.release(&key, &token);
            }
            Err(_) => {}
        }

        result
    }
}
