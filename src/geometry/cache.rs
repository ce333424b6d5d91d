//! Process-wide memoization of geometry tables.
//!
//! Each instrument key owns a `OnceCell` behind the map mutex. The mutex is held
//! only long enough to fetch or insert the cell, so loads of different
//! instruments proceed in parallel while concurrent callers for the same key
//! block on the cell until the first load finishes. A failed load leaves the
//! cell empty and the next caller retries.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use log::debug;
use once_cell::sync::{Lazy, OnceCell};

use super::builtin::builtin_table;
use super::table::GeometryTable;
use crate::error::GeometryError;

/// Provider of per-instrument geometry tables.
pub trait GeometrySource: Send + Sync {
    fn load(&self, instrument: &str) -> Result<GeometryTable, GeometryError>;
}

/// Tables compiled into the crate.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinGeometry;

impl GeometrySource for BuiltinGeometry {
    fn load(&self, instrument: &str) -> Result<GeometryTable, GeometryError> {
        builtin_table(instrument)
            .ok_or_else(|| GeometryError::UnknownInstrument(instrument.to_string()))
    }
}

/// Directory of `<instrument>.json` files, one table per instrument.
///
/// File names are lowercase (`nircam.json`, `miri.json`, ...).
#[derive(Debug, Clone)]
pub struct JsonGeometryDir {
    pub dir: PathBuf,
}

impl JsonGeometryDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl GeometrySource for JsonGeometryDir {
    fn load(&self, instrument: &str) -> Result<GeometryTable, GeometryError> {
        let path = self.dir.join(format!("{}.json", instrument.to_ascii_lowercase()));
        if !path.exists() {
            return Err(GeometryError::UnknownInstrument(instrument.to_string()));
        }
        GeometryTable::load_from_file(path)
    }
}

type Slot = Arc<OnceCell<Arc<GeometryTable>>>;

/// Memoizing front for a [`GeometrySource`].
pub struct GeometryCache {
    source: Box<dyn GeometrySource>,
    slots: Mutex<HashMap<String, Slot>>,
    loads: AtomicUsize,
}

static GLOBAL: Lazy<Arc<GeometryCache>> = Lazy::new(|| Arc::new(GeometryCache::builtin()));

impl GeometryCache {
    pub fn new(source: Box<dyn GeometrySource>) -> Self {
        Self {
            source,
            slots: Mutex::new(HashMap::new()),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn builtin() -> Self {
        Self::new(Box::new(BuiltinGeometry))
    }

    pub fn from_json_dir(dir: impl Into<PathBuf>) -> Self {
        Self::new(Box::new(JsonGeometryDir::new(dir)))
    }

    /// Shared cache over the built-in tables.
    pub fn global() -> Arc<GeometryCache> {
        Arc::clone(&GLOBAL)
    }

    /// Fetch the table for `instrument`, loading it at most once.
    pub fn get(&self, instrument: &str) -> Result<Arc<GeometryTable>, GeometryError> {
        let key = instrument.to_ascii_lowercase();
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        let table = slot.get_or_try_init(|| {
            debug!("Loading geometry table for {key}");
            self.loads.fetch_add(1, Ordering::SeqCst);
            self.source.load(instrument).map(Arc::new)
        })?;
        Ok(Arc::clone(table))
    }

    /// Number of source loads performed so far.
    pub fn load_count(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl std::fmt::Debug for GeometryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys: Vec<String> = self
            .slots
            .lock()
            .map(|s| s.keys().cloned().collect())
            .unwrap_or_default();
        f.debug_struct("GeometryCache")
            .field("instruments", &keys)
            .field("loads", &self.load_count())
            .finish()
    }
}
