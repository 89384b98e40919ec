//! Session handle used by the flow.
//!
//! The flow only needs a key/value store scoped to one browser session and a
//! lock scoped to that same session. How sessions are looked up and expired is
//! left to the HTTP layer.

use std::{
    any::Any,
    collections::HashMap,
    fmt,
    sync::{Arc, PoisonError, RwLock},
};
use tokio::sync::Mutex;

pub type Attribute = Arc<dyn Any + Send + Sync>;

pub trait SessionHandle: Send + Sync {
    fn id(&self) -> &str;

    fn attribute(&self, key: &str) -> Option<Attribute>;

    fn set_attribute(&self, key: &str, value: Attribute);

    fn remove_attribute(&self, key: &str) -> Option<Attribute>;

    /// Lock shared by every request of this session only.
    fn lock(&self) -> &Mutex<()>;
}

/// Typed read of a session attribute. A value of another type reads as `None`.
pub fn load<T: Any + Send + Sync>(session: &dyn SessionHandle, key: &str) -> Option<Arc<T>> {
    session
        .attribute(key)
        .and_then(|value| value.downcast::<T>().ok())
}

pub fn store<T: Any + Send + Sync>(session: &dyn SessionHandle, key: &str, value: Arc<T>) {
    session.set_attribute(key, value);
}

#[derive(Default)]
pub struct MemorySession {
    id: String,
    attributes: RwLock<HashMap<String, Attribute>>,
    lock: Mutex<()>,
}

impl MemorySession {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl SessionHandle for MemorySession {
    fn id(&self) -> &str {
        &self.id
    }

    fn attribute(&self, key: &str) -> Option<Attribute> {
        self.attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn set_attribute(&self, key: &str, value: Attribute) {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    fn remove_attribute(&self, key: &str) -> Option<Attribute> {
        self.attributes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key)
    }

    fn lock(&self) -> &Mutex<()> {
        &self.lock
    }
}

impl fmt::Debug for MemorySession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = self
            .attributes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        f.debug_struct("MemorySession")
            .field("id", &self.id)
            .field("attributes", &keys)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_load_and_store() {
        let session = MemorySession::new("s1");
        assert!(session.is_empty());

        store(&session, "answer", Arc::new(42_u32));
        assert_eq!(load::<u32>(&session, "answer").as_deref(), Some(&42));
        // wrong type reads as missing
        assert!(load::<String>(&session, "answer").is_none());

        assert!(session.remove_attribute("answer").is_some());
        assert!(load::<u32>(&session, "answer").is_none());
    }

    #[test]
    fn debug_lists_keys_only() {
        let session = MemorySession::new("s2");
        store(&session, "secret", Arc::new("value".to_string()));
        let debug = format!("{session:?}");
        assert!(debug.contains("secret"));
        assert!(!debug.contains("value\""));
    }
}
