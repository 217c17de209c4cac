//! Persistence contract: a key-value store with plain get/set semantics.
//!
//! The core never assumes multi-key transactions; each save writes one whole
//! key. Retry policy belongs to the implementation, not to callers.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::{Error, Result};

pub mod keys {
    pub const ORDERS: &str = "nadhub:orders";
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;
    fn set(&self, key: &str, value: Vec<u8>) -> Result<()>;
}

/// Process-local store, the default backing for a single-node deployment and
/// for tests.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let inner = self
            .inner
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        Ok(inner.get(key).cloned())
    }

    fn set(&self, key: &str, value: Vec<u8>) -> Result<()> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|e| Error::Storage(e.to_string()))?;
        inner.insert(key.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_round_trip() {
        let store = MemoryStore::new();
        assert_eq!(store.get("missing").unwrap(), None);
        store.set("k", b"v1".to_vec()).unwrap();
        store.set("k", b"v2".to_vec()).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some(&b"v2"[..]));
    }
}
