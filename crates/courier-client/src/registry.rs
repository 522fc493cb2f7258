//! Process-scoped client registry.
//!
//! Holds zero or one active client. [`get`] lazily creates a default client
//! the first time it is asked for one. A task can run against a different
//! client with [`with_override`] without touching the shared slot.

use crate::client::Client;
use crate::options::ClientOptions;
use parking_lot::RwLock;
use std::future::Future;
use std::sync::OnceLock;
use tracing::debug;

tokio::task_local! {
    static OVERRIDE: Client;
}

fn slot() -> &'static RwLock<Option<Client>> {
    static SLOT: OnceLock<RwLock<Option<Client>>> = OnceLock::new();
    SLOT.get_or_init(|| RwLock::new(None))
}

/// Replaces the active client. Returns the previous one.
pub fn set(client: Client) -> Option<Client> {
    debug!("Replacing registry client");
    slot().write().replace(client)
}

/// Removes the active client. The next [`get`] creates a fresh default.
pub fn clear() -> Option<Client> {
    slot().write().take()
}

/// Returns the client in effect for the current task.
///
/// A task-scoped override wins over the shared slot. An empty slot is
/// filled with a default client.
#[must_use]
pub fn get() -> Client {
    if let Ok(client) = OVERRIDE.try_with(Client::clone) {
        return client;
    }

    if let Some(client) = slot().read().as_ref() {
        return client.clone();
    }

    let mut guard = slot().write();
    guard.get_or_insert_with(|| {
        debug!("Creating default registry client");
        Client::new(ClientOptions::default())
    })
    .clone()
}

/// Runs `future` with `client` as the result of [`get`] inside it.
pub async fn with_override<F>(client: Client, future: F) -> F::Output
where
    F: Future,
{
    OVERRIDE.scope(client, future).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_override_is_scoped_to_the_future() {
        let outside = get();
        let injected = Client::new(ClientOptions::new().with_base_url("https://test.invalid"));

        let seen = with_override(injected.clone(), async { get() }).await;

        assert!(seen.ptr_eq(&injected));
        assert!(get().ptr_eq(&outside));
        assert!(!get().ptr_eq(&injected));
    }

    #[tokio::test]
    async fn test_nested_overrides() {
        let outer = Client::new(ClientOptions::new());
        let inner = Client::new(ClientOptions::new());

        let (seen_inner, seen_outer) = with_override(outer.clone(), async {
            let seen_inner = with_override(inner.clone(), async { get() }).await;
            (seen_inner, get())
        })
        .await;

        assert!(seen_inner.ptr_eq(&inner));
        assert!(seen_outer.ptr_eq(&outer));
    }

    #[tokio::test]
    async fn test_get_is_stable_without_override() {
        let first = get();
        let second = get();
        assert!(first.ptr_eq(&second));
    }
}
