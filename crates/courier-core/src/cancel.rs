//! Cooperative cancellation tokens.
//!
//! A [`CancelToken`] carries a fired flag plus a set of listeners. Firing is
//! idempotent: listeners run exactly once, on the first call to
//! [`CancelToken::fire`]. Listeners attached after the token fired run
//! immediately on the attaching thread.

use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;

type Listener = Box<dyn FnOnce() + Send>;

/// Opaque handle for a listener attached to a [`CancelToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

struct Inner {
    fired: AtomicBool,
    next_listener: AtomicU64,
    listeners: Mutex<BTreeMap<u64, Listener>>,
    signal: watch::Sender<bool>,
}

/// Cooperative abort signal shared across pipeline layers for one logical request.
#[derive(Clone)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

impl CancelToken {
    /// Creates a token that has not fired.
    #[must_use]
    pub fn new() -> Self {
        let (signal, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                fired: AtomicBool::new(false),
                next_listener: AtomicU64::new(0),
                listeners: Mutex::new(BTreeMap::new()),
                signal,
            }),
        }
    }

    /// Returns true once the token has fired.
    #[must_use]
    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::Acquire)
    }

    /// Fires the token and runs every attached listener.
    ///
    /// Subsequent calls are no-ops.
    pub fn fire(&self) {
        if self.inner.fired.swap(true, Ordering::AcqRel) {
            return;
        }

        self.inner.signal.send_replace(true);

        // Listeners run outside the lock so they may attach to or fire other tokens.
        let listeners = std::mem::take(&mut *self.inner.listeners.lock());
        for listener in listeners.into_values() {
            listener();
        }
    }

    /// Attaches a listener that runs when the token fires.
    ///
    /// If the token already fired, the listener runs before this returns.
    pub fn attach<F>(&self, listener: F) -> ListenerId
    where
        F: FnOnce() + Send + 'static,
    {
        let id = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);

        let mut listeners = self.inner.listeners.lock();
        if self.is_fired() {
            drop(listeners);
            listener();
        } else {
            listeners.insert(id, Box::new(listener));
        }

        ListenerId(id)
    }

    /// Detaches a listener. Returns false if it already ran or was never attached.
    pub fn detach(&self, id: ListenerId) -> bool {
        self.inner.listeners.lock().remove(&id.0).is_some()
    }

    /// Number of listeners still waiting for this token to fire.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.inner.listeners.lock().len()
    }

    /// Forwards this token's firing to `other`.
    ///
    /// Only a weak reference to `other` is kept, so linking never extends its lifetime.
    pub fn link(&self, other: &CancelToken) -> ListenerId {
        let target = other.downgrade();
        self.attach(move || {
            if let Some(target) = target.upgrade() {
                target.fire();
            }
        })
    }

    /// Creates a new token that fires whenever this one does.
    ///
    /// Firing the child leaves the parent untouched.
    #[must_use]
    pub fn child(&self) -> (CancelToken, ListenerId) {
        let child = CancelToken::new();
        let id = self.link(&child);
        (child, id)
    }

    /// Resolves once the token has fired.
    pub async fn cancelled(&self) {
        let mut rx = self.inner.signal.subscribe();
        // The sender lives in `self`, so `wait_for` only ends by observing `true`.
        let _ = rx.wait_for(|fired| *fired).await;
    }

    /// Returns true if both handles refer to the same token.
    #[must_use]
    pub fn ptr_eq(&self, other: &CancelToken) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Creates a weak handle that does not keep the token alive.
    #[must_use]
    pub fn downgrade(&self) -> WeakCancelToken {
        WeakCancelToken {
            inner: Arc::downgrade(&self.inner),
        }
    }
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelToken")
            .field("fired", &self.is_fired())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Weak handle to a [`CancelToken`].
#[derive(Clone)]
pub struct WeakCancelToken {
    inner: Weak<Inner>,
}

impl WeakCancelToken {
    /// Returns the token if any strong handle is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<CancelToken> {
        self.inner.upgrade().map(|inner| CancelToken { inner })
    }

    /// Returns true if this handle points at `token`.
    #[must_use]
    pub fn points_to(&self, token: &CancelToken) -> bool {
        std::ptr::eq(self.inner.as_ptr(), Arc::as_ptr(&token.inner))
    }
}

impl fmt::Debug for WeakCancelToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakCancelToken")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}
