//! Durable key-value storage abstraction.
//!
//! The engine persists small blobs (drafts, identity material) into a
//! browser-local style key-value store. The trait is synchronous and
//! best-effort: implementations should fail fast, and callers swallow
//! errors rather than surface them. Writes are fire-and-forget.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use crate::error::StoreError;

/// Well-known storage keys.
pub mod keys {
    /// Stored username, used to seed authentication.
    pub const USERNAME: &str = "palaver_username";

    /// Stored public-key material.
    pub const PUBLIC_KEY: &str = "palaver_public_key";

    /// Key for a room's persisted draft.
    pub fn draft(room_id: &str) -> String {
        format!("draft_{room_id}")
    }
}

/// Durable key-value store.
///
/// Must be `Clone + Send + Sync`: clones share the same underlying storage,
/// so the engine and the surrounding application can hold handles to one
/// store. Synchronous by design - the backing store is assumed local and
/// cheap, and engine logic must not suspend.
pub trait KvStore: Clone + Send + Sync + 'static {
    /// Read a value. `Ok(None)` if the key is absent.
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Write a value, overwriting any existing one.
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Delete a key. Deleting an absent key is not an error.
    fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// In-memory store for tests and ephemeral sessions.
#[derive(Debug, Clone, Default)]
pub struct MemoryKv {
    inner: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryKv {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, StoreError> {
        self.inner.lock().map_err(|_| StoreError::Io("store lock poisoned".into()))
    }
}

impl KvStore for MemoryKv {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.lock()?.insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.remove(key);
        Ok(())
    }
}
