//! Per-(project, component type) writer locks
//!
//! Template mutation and recalculation for one key are single-writer. A second
//! writer does not queue behind the first: it gets `ConcurrencyConflict` and
//! is expected to refetch and retry. Different keys never contend.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::{Error, Result};

/// Serialization key for template writes
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TemplateKey {
    pub project_id: Uuid,
    pub component_type: String,
}

impl TemplateKey {
    pub fn new(project_id: Uuid, component_type: &str) -> Self {
        Self {
            project_id,
            component_type: component_type.to_string(),
        }
    }
}

impl fmt::Display for TemplateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.project_id, self.component_type)
    }
}

/// Held for the duration of a write; releases on drop
pub struct TemplateGuard {
    key: TemplateKey,
    _guard: OwnedMutexGuard<()>,
}

impl fmt::Debug for TemplateGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TemplateGuard").field("key", &self.key).finish()
    }
}

/// Registry of keyed locks
#[derive(Default)]
pub struct KeyedLocks {
    inner: Mutex<HashMap<TemplateKey, Arc<tokio::sync::Mutex<()>>>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the writer lock for `key` without waiting
    pub fn try_acquire(&self, key: &TemplateKey) -> Result<TemplateGuard> {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
            // Entries only referenced by the map belong to released keys
            map.retain(|k, l| k == key || Arc::strong_count(l) > 1);
            map.entry(key.clone()).or_default().clone()
        };

        match lock.try_lock_owned() {
            Ok(guard) => Ok(TemplateGuard {
                key: key.clone(),
                _guard: guard,
            }),
            Err(_) => Err(Error::ConcurrencyConflict(format!(
                "another template change or recalculation is in progress for {}",
                key
            ))),
        }
    }

    /// Take the locks for several keys, all or nothing
    ///
    /// Keys are acquired in sorted order.
    pub fn try_acquire_all(&self, keys: &[TemplateKey]) -> Result<Vec<TemplateGuard>> {
        let mut sorted: Vec<&TemplateKey> = keys.iter().collect();
        sorted.sort();
        sorted.dedup();

        let mut guards = Vec::with_capacity(sorted.len());
        for key in sorted {
            guards.push(self.try_acquire(key)?);
        }
        Ok(guards)
    }

    /// Keys with a live lock entry
    pub fn held_count(&self) -> usize {
        let map = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        map.values().filter(|l| Arc::strong_count(l) > 1).count()
    }
}
