//! Guest-address → function cache with at-most-once generation.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};

use crate::runtime::function::Function;

enum EntryState {
    /// A thread is generating the function.
    Pending,
    /// Published and callable.
    Ready(Arc<Function>),
    /// Generation failed; permanent.
    Failed,
}

/// Outcome of [`EntryTable::get_or_create`].
pub enum EntryLookup {
    /// The caller owns generation and must call
    /// [`EntryTable::publish`] exactly once.
    New,
    /// Cached function.
    Ready(Arc<Function>),
    /// Known-bad address.
    Failed,
}

/// The per-runtime function cache.
///
/// Publication happens entirely under the table lock, so a thread that
/// observes `Ready` also observes the fully written function body.
pub struct EntryTable {
    entries: Mutex<HashMap<u32, EntryState>>,
    cond: Condvar,
}

impl EntryTable {
    pub(crate) fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            cond: Condvar::new(),
        }
    }

    /// Claims or waits on the entry for `address`.
    pub fn get_or_create(&self, address: u32) -> EntryLookup {
        let mut entries = self.entries.lock().unwrap();
        loop {
            match entries.get(&address) {
                None => {
                    entries.insert(address, EntryState::Pending);
                    return EntryLookup::New;
                }
                Some(EntryState::Pending) => {
                    entries = self.cond.wait(entries).unwrap();
                }
                Some(EntryState::Ready(f)) => return EntryLookup::Ready(f.clone()),
                Some(EntryState::Failed) => return EntryLookup::Failed,
            }
        }
    }

    /// Publishes the generation result for an address claimed with
    /// [`EntryLookup::New`] and wakes the waiters.
    pub fn publish(&self, address: u32, function: Option<Arc<Function>>) {
        let mut entries = self.entries.lock().unwrap();
        let state = match function {
            Some(f) => EntryState::Ready(f),
            None => EntryState::Failed,
        };
        entries.insert(address, state);
        drop(entries);
        self.cond.notify_all();
    }

    /// All ready functions at an address.
    pub fn find_with_address(&self, address: u32) -> Vec<Arc<Function>> {
        let entries = self.entries.lock().unwrap();
        match entries.get(&address) {
            Some(EntryState::Ready(f)) => vec![f.clone()],
            _ => Vec::new(),
        }
    }
}
