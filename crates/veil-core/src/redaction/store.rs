//! Token to email lookup table

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::RedactionError;

/// Mapping from redaction token to the original email address.
///
/// Cloning a store yields a handle to the same table, which is how a
/// process-wide store is shared between sessions. Every access goes through
/// one mutex.
#[derive(Debug, Clone, Default)]
pub struct RedactionStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl RedactionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `token -> email`.
    ///
    /// Re-inserting the same pair is a no-op. A token that already maps to a
    /// different address is rejected and the table is left unchanged.
    pub fn put(&self, token: &str, email: &str) -> Result<(), RedactionError> {
        let mut entries = self.entries.lock();
        check_slot(&entries, token, email)?;
        entries.insert(token.to_string(), email.to_string());
        Ok(())
    }

    pub fn get(&self, token: &str) -> Option<String> {
        self.entries.lock().get(token).cloned()
    }

    /// Remove every entry. Only call this between turns.
    pub fn reset(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Copy of all entries, longest token first, then by token
    pub fn snapshot(&self) -> Vec<(String, String)> {
        let mut pairs: Vec<_> = self
            .entries
            .lock()
            .iter()
            .map(|(token, email)| (token.clone(), email.clone()))
            .collect();
        pairs.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));
        pairs
    }

    /// Whether two handles share one table
    pub fn shares_with(&self, other: &RedactionStore) -> bool {
        Arc::ptr_eq(&self.entries, &other.entries)
    }

    /// Run `f` against the table while holding the lock
    pub(crate) fn with_entries<R>(&self, f: impl FnOnce(&mut HashMap<String, String>) -> R) -> R {
        let mut entries = self.entries.lock();
        f(&mut entries)
    }
}

/// Ok if `token` is free or already bound to `email`
pub(crate) fn check_slot(
    entries: &HashMap<String, String>,
    token: &str,
    email: &str,
) -> Result<(), RedactionError> {
    match entries.get(token) {
        Some(existing) if existing != email => Err(RedactionError::TokenCollision {
            token: token.to_string(),
            existing: existing.clone(),
        }),
        _ => Ok(()),
    }
}
