//! Derived state shared by the writer and reader of one dataset.
//!
//! Holds the dataset session list, the offset index and fully loaded columns.
//! Everything here is recomputed from the row store on demand; a write drops
//! all of it rather than patching it.

use crate::calendar::SessionList;
use crate::domain::BarField;
use crate::error::StoreResult;
use crate::store::index::OffsetIndex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

#[derive(Debug, Default)]
pub struct DatasetCache {
    sessions: RwLock<Option<Arc<SessionList>>>,
    index: RwLock<Option<Arc<OffsetIndex>>>,
    columns: RwLock<HashMap<BarField, Arc<Vec<f64>>>>,
    generation: AtomicU64,
}

impl DatasetCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached session list, computing it with `load` when absent.
    pub fn sessions_or_load(
        &self,
        load: impl FnOnce() -> StoreResult<SessionList>,
    ) -> StoreResult<Arc<SessionList>> {
        if let Some(sessions) = read(&self.sessions).as_ref() {
            return Ok(Arc::clone(sessions));
        }
        let sessions = Arc::new(load()?);
        debug!(sessions = sessions.len(), "session span cached");
        *write(&self.sessions) = Some(Arc::clone(&sessions));
        Ok(sessions)
    }

    /// Cached offset index, computing it with `load` when absent.
    pub fn index_or_load(
        &self,
        load: impl FnOnce() -> StoreResult<OffsetIndex>,
    ) -> StoreResult<Arc<OffsetIndex>> {
        if let Some(index) = read(&self.index).as_ref() {
            return Ok(Arc::clone(index));
        }
        let index = Arc::new(load()?);
        debug!(assets = index.len(), rows = index.total_rows(), "offset index cached");
        *write(&self.index) = Some(Arc::clone(&index));
        Ok(index)
    }

    /// Cached full column, computing it with `load` when absent.
    pub fn column_or_load(
        &self,
        field: BarField,
        load: impl FnOnce() -> StoreResult<Vec<f64>>,
    ) -> StoreResult<Arc<Vec<f64>>> {
        if let Some(column) = read(&self.columns).get(&field) {
            return Ok(Arc::clone(column));
        }
        let column = Arc::new(load()?);
        write(&self.columns).insert(field, Arc::clone(&column));
        Ok(column)
    }

    /// Cached column without loading.
    pub fn cached_column(&self, field: BarField) -> Option<Arc<Vec<f64>>> {
        read(&self.columns).get(&field).cloned()
    }

    /// Drop every derived structure. Called after each successful write.
    pub fn invalidate(&self) {
        *write(&self.sessions) = None;
        *write(&self.index) = None;
        write(&self.columns).clear();
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(generation, "dataset cache invalidated");
    }

    /// Number of invalidations so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub fn is_warm(&self) -> bool {
        read(&self.sessions).is_some() || read(&self.index).is_some()
    }
}

// A panic while holding the lock leaves only derived data behind, which is
// still safe to read or overwrite.
fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}
