//! Lazily created clients.

use crate::client::Client;
use crate::options::ClientOptions;
use crate::registry;
use parking_lot::Mutex;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// Child of the registry client at first use.
    Registry,
    /// Root client with its own pipeline.
    Fresh,
}

/// A client created on first use.
///
/// Module-level clients can be declared up front and only materialize once a
/// request needs them, after the application has configured the registry.
#[derive(Debug)]
pub struct LazyClient {
    options: ClientOptions,
    origin: Origin,
    client: Mutex<Option<Client>>,
}

impl LazyClient {
    /// Creates a lazy child of the registry client.
    ///
    /// The child inherits the registry client's options, hooks and pipeline
    /// as they are when [`get`](Self::get) is first called.
    #[must_use]
    pub fn new(options: ClientOptions) -> Self {
        Self::with_origin(options, Origin::Registry)
    }

    /// Creates a lazy root client with its own pipeline.
    #[must_use]
    pub fn fresh(options: ClientOptions) -> Self {
        Self::with_origin(options, Origin::Fresh)
    }

    fn with_origin(options: ClientOptions, origin: Origin) -> Self {
        Self {
            options,
            origin,
            client: Mutex::new(None),
        }
    }

    /// Returns the client, creating it on first call.
    pub fn get(&self) -> Client {
        let mut slot = self.client.lock();
        slot.get_or_insert_with(|| {
            debug!(origin = ?self.origin, "Materializing lazy client");
            match self.origin {
                Origin::Registry => registry::get().create(self.options.clone()),
                Origin::Fresh => Client::new(self.options.clone()),
            }
        })
        .clone()
    }

    /// Replaces the client. Returns the previous one if it was created.
    pub fn set(&self, client: Client) -> Option<Client> {
        self.client.lock().replace(client)
    }

    /// Returns true once the client exists.
    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.client.lock().is_some()
    }
}
