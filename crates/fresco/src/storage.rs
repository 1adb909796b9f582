//! Durable key/value storage behind an injectable backend.
//!
//! The cart persists through this interface so the same store logic runs
//! against web `localStorage`, a directory of files, or plain memory.

use std::cell::RefCell;
use std::collections::BTreeMap;

/// Error returned by mutating storage operations.
///
/// Reads never fail: an unreachable or corrupt store reads as absent.
#[derive(Debug, Clone)]
pub enum StorageError {
    /// The backing store cannot be reached (no window, unwritable directory).
    Unavailable,
    /// The backing store refused the write (quota exhausted).
    Full,
    /// Any other backend failure, stringified.
    Io(String),
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::Unavailable => write!(f, "storage unavailable"),
            StorageError::Full => write!(f, "storage quota exhausted"),
            StorageError::Io(message) => write!(f, "storage failure: {message}"),
        }
    }
}

/// Key/value storage the cart persists through.
///
/// Mirrors the web storage contract (`getItem`/`setItem`/`removeItem`):
/// `load` returns `None` for absent keys, `save` replaces the whole value,
/// `remove` is a no-op for absent keys.
pub trait StorageBackend {
    fn load(&self, key: &str) -> Option<String>;
    fn save(&self, key: &str, value: &str) -> Result<(), StorageError>;
    fn remove(&self, key: &str) -> Result<(), StorageError>;
}

/// In-memory backend for tests and headless embedding.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RefCell<BTreeMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }
}

impl StorageBackend for MemoryStorage {
    fn load(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn save(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.entries
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_round_trip() {
        let storage = MemoryStorage::new();
        assert_eq!(storage.load("cart"), None);

        storage.save("cart", "{}").unwrap();
        assert_eq!(storage.load("cart").as_deref(), Some("{}"));

        storage.save("cart", r#"{"1":{}}"#).unwrap();
        assert_eq!(storage.load("cart").as_deref(), Some(r#"{"1":{}}"#));

        storage.remove("cart").unwrap();
        assert_eq!(storage.load("cart"), None);
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let storage = MemoryStorage::new();
        storage.remove("never-stored").unwrap();
        assert!(storage.is_empty());
    }
}
