//! Per-open-handle context storage.
//!
//! The driver gives each handle a single `u64` slot. The bridge stores the
//! filesystem's context here under an auto-generated ID and writes that ID
//! into the slot on create.
//!
//! # Handle Lifecycle
//!
//! 1. **Insert** on successful create; the ID goes into `FileInfo::context`
//! 2. **Get** on every later callback; the `Arc` is cloned out so no shard
//!    lock is held while the filesystem runs
//! 3. **Remove** on close

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Concurrent map from handle IDs to shared contexts.
///
/// ```
/// use dokan_host::HandleTable;
///
/// let table: HandleTable<String> = HandleTable::new();
/// let id = table.insert("file1".to_string());
/// assert_eq!(table.get(id).as_deref().map(String::as_str), Some("file1"));
/// assert!(table.remove(id).is_some());
/// assert!(table.get(id).is_none());
/// ```
#[derive(Debug)]
pub struct HandleTable<C> {
    handles: DashMap<u64, Arc<C>>,
    /// Starts at 1; 0 means "no context" in the driver slot.
    next_id: AtomicU64,
}

impl<C> HandleTable<C> {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            handles: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    /// Stores a context and returns its non-zero ID.
    pub fn insert(&self, context: C) -> u64 {
        self.insert_shared(Arc::new(context))
    }

    /// Stores an already shared context.
    pub fn insert_shared(&self, context: Arc<C>) -> u64 {
        loop {
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            if id == 0 {
                continue;
            }
            if let Entry::Vacant(entry) = self.handles.entry(id) {
                entry.insert(context);
                return id;
            }
        }
    }

    /// Clones out the context for `id`.
    pub fn get(&self, id: u64) -> Option<Arc<C>> {
        if id == 0 {
            return None;
        }
        self.handles.get(&id).map(|entry| Arc::clone(entry.value()))
    }

    /// Removes and returns the context for `id`.
    pub fn remove(&self, id: u64) -> Option<Arc<C>> {
        self.handles.remove(&id).map(|(_, v)| v)
    }

    /// Whether `id` is live.
    pub fn contains(&self, id: u64) -> bool {
        self.handles.contains_key(&id)
    }

    /// Number of live contexts.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Whether no contexts are live.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Drops every context, returning how many there were.
    pub fn clear(&self) -> usize {
        let count = self.handles.len();
        self.handles.clear();
        count
    }
}

impl<C> Default for HandleTable<C> {
    fn default() -> Self {
        Self::new()
    }
}
