use crate::prelude::*;
use crate::validator::ValidationState;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub type SharedState = Arc<Mutex<ValidationState>>;

/// Registry of per-device validation state.
///
/// Entries follow the managed device set: created when a device is added,
/// dropped when it is removed. Each entry has its own lock so devices can be
/// processed in parallel; the registry lock is only held to look an entry up.
#[derive(Clone, Debug, Default)]
pub struct StateCache {
    states: Arc<Mutex<HashMap<String, SharedState>>>,
}

impl StateCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn states(&self) -> MutexGuard<'_, HashMap<String, SharedState>> {
        self.states.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a device. An existing entry is kept as is.
    pub fn add(&self, id: &str) -> SharedState {
        self.get_or_add(id)
    }

    pub fn get(&self, id: &str) -> Option<SharedState> {
        self.states().get(id).cloned()
    }

    pub fn get_or_add(&self, id: &str) -> SharedState {
        let mut states = self.states();
        states
            .entry(id.to_string())
            .or_insert_with(|| {
                debug!("state_cache: adding {}", id);
                Arc::new(Mutex::new(ValidationState::new()))
            })
            .clone()
    }

    pub fn remove(&self, id: &str) -> bool {
        let removed = self.states().remove(id).is_some();
        if removed {
            debug!("state_cache: removed {}", id);
        }
        removed
    }

    /// Drop every entry `keep` rejects.
    pub fn retain<F>(&self, mut keep: F)
    where
        F: FnMut(&str) -> bool,
    {
        self.states().retain(|id, _| {
            let kept = keep(id);
            if !kept {
                debug!("state_cache: removed {}", id);
            }
            kept
        });
    }

    pub fn contains(&self, id: &str) -> bool {
        self.states().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.states().len()
    }

    pub fn is_empty(&self) -> bool {
        self.states().is_empty()
    }

    /// Run `f` with the device's state locked, registering it if needed.
    pub fn with<F, R>(&self, id: &str, f: F) -> R
    where
        F: FnOnce(&mut ValidationState) -> R,
    {
        let state = self.get_or_add(id);
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}
