//! The bulk-array sidecar store.
//!
//! Arrays crossing the configured threshold are lifted out of the source
//! text during representation and recorded here. Keys are dense, zero-based
//! and assigned in first-encounter order; registering the same array twice
//! (by allocation identity) returns the existing key, which both preserves
//! sharing and keeps repeated renders idempotent.
//!
//! A render works on a staged copy of the store and commits it only on
//! success, so a failed render leaves the archive exactly as it was.

use std::collections::HashMap;
use std::path::Path;

use crate::array::NdArray;
use crate::backend::SidecarBackend;
use crate::error::{ArchiveError, Result};

/// Map from sidecar key to loaded array, as consumed by the restore
/// evaluator.
pub type ArrayMap = HashMap<String, NdArray>;

/// Records large arrays with their canonical metadata and dense keys.
#[derive(Debug, Clone, Default)]
pub struct ArrayStore {
    entries: Vec<NdArray>,
    index: HashMap<usize, usize>,
}

impl ArrayStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of recorded arrays.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records `array` and returns its key. A previously recorded array
    /// (same allocation) keeps its key.
    pub fn put(&mut self, array: &NdArray) -> String {
        let addr = array.addr();
        let slot = match self.index.get(&addr) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.entries.push(array.clone());
                self.index.insert(addr, slot);
                slot
            }
        };
        Self::key(slot)
    }

    /// The key assigned to slot `i`.
    pub fn key(i: usize) -> String {
        format!("array_{i}")
    }

    /// All `(key, array)` entries in key order.
    pub fn entries(&self) -> Vec<(String, NdArray)> {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, a)| (Self::key(i), a.clone()))
            .collect()
    }

    /// Writes every entry under `dir` with `backend`.
    pub fn save(&self, dir: &Path, backend: &dyn SidecarBackend) -> Result<()> {
        backend.save(dir, &self.entries())
    }
}

/// Loads a sidecar directory into a key map.
pub fn load(dir: &Path, backend: &dyn SidecarBackend) -> Result<ArrayMap> {
    let mut map = ArrayMap::new();
    for (key, array) in backend.load(dir)? {
        if map.insert(key.clone(), array).is_some() {
            return Err(ArchiveError::CorruptArchive(format!(
                "duplicate sidecar key {key:?}"
            )));
        }
    }
    Ok(map)
}
