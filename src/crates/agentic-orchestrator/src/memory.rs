//! Per-request shared value store.
//!
//! Scoped to exactly one `ExecutionRequest`; dropped with it. Writes only
//! come from `PlanExecutor` after a successful step, and steps are strictly
//! serial, so a plain `RwLock` (no writer overlap) is sufficient — this
//! mirrors the write-exclusion discipline this codebase uses for in-process
//! shared state elsewhere rather than reaching for a sharded concurrent map.

use crate::domain::{is_valid_identifier, MemoryEntry};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug, Default)]
pub struct SharedMemory {
    entries: RwLock<HashMap<String, MemoryEntry>>,
}

impl SharedMemory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writes replace. Invalid identifiers are dropped; the caller is
    /// expected to surface a warning attr on the progress event —
    /// this method only reports whether the write took effect.
    pub fn write(&self, entry: MemoryEntry) -> bool {
        if !is_valid_identifier(&entry.identifier) {
            return false;
        }
        let mut guard = self.entries.write().expect("SharedMemory lock poisoned");
        guard.insert(entry.identifier.clone(), entry);
        true
    }

    /// Reads never fail: an absent key is `None`, not an error.
    pub fn get(&self, identifier: &str) -> Option<MemoryEntry> {
        self.entries.read().expect("SharedMemory lock poisoned").get(identifier).cloned()
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.entries.read().expect("SharedMemory lock poisoned").contains_key(identifier)
    }

    /// Snapshot of every entry, for `SummaryComposer` and test assertions.
    pub fn snapshot(&self) -> HashMap<String, MemoryEntry> {
        self.entries.read().expect("SharedMemory lock poisoned").clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("SharedMemory lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
