//! In-memory engine used by tests and single-node tooling.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use crate::{EngineError, KeyValue, Range, RangeIter, RawEngine};

/// Simple ordered in-memory engine with per-column-family BTree maps.
///
/// Iterators snapshot their range at creation, so concurrent writers never
/// invalidate a scan in progress.
pub struct MemEngine {
    inner: RwLock<HashMap<String, BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemEngine {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(HashMap::new()),
        }
    }

    /// Concrete-iterator variant of `range_iter`, exposing the close handle
    /// used by cancellation tests.
    pub fn mem_iter(&self, cf: &str, upper_bound: Vec<u8>) -> MemIter {
        let entries = match self.inner.read() {
            Ok(guard) => guard
                .get(cf)
                .map(|tree| {
                    tree.iter()
                        .filter(|(k, _)| upper_bound.is_empty() || k.as_slice() < upper_bound.as_slice())
                        .map(|(k, v)| (k.clone(), v.clone()))
                        .collect()
                })
                .unwrap_or_default(),
            Err(_) => Vec::new(),
        };
        MemIter {
            entries,
            pos: usize::MAX,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of live keys in a column family.
    pub fn len(&self, cf: &str) -> usize {
        self.inner
            .read()
            .ok()
            .and_then(|guard| guard.get(cf).map(|tree| tree.len()))
            .unwrap_or(0)
    }

    pub fn is_empty(&self, cf: &str) -> bool {
        self.len(cf) == 0
    }
}

impl Default for MemEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl RawEngine for MemEngine {
    fn put(&self, cf: &str, kv: KeyValue) -> Result<(), EngineError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| EngineError::Storage("mem engine lock poisoned".to_string()))?;
        guard.entry(cf.to_string()).or_default().insert(kv.key, kv.value);
        Ok(())
    }

    fn delete_range(&self, cf: &str, range: Range) -> Result<(), EngineError> {
        let mut guard = self
            .inner
            .write()
            .map_err(|_| EngineError::Storage("mem engine lock poisoned".to_string()))?;
        if let Some(tree) = guard.get_mut(cf) {
            let doomed: Vec<Vec<u8>> = tree
                .range(range.start.clone()..range.end.clone())
                .map(|(k, _)| k.clone())
                .collect();
            for key in doomed {
                tree.remove(&key);
            }
        }
        Ok(())
    }

    fn range_iter(
        &self,
        cf: &str,
        upper_bound: Vec<u8>,
    ) -> Result<Box<dyn RangeIter>, EngineError> {
        Ok(Box::new(self.mem_iter(cf, upper_bound)))
    }
}

/// Handle that terminates a `MemIter` from outside, e.g. on caller timeout.
#[derive(Clone)]
pub struct CloseHandle(Arc<AtomicBool>);

impl CloseHandle {
    /// Terminate the cursor; its next fetch returns `EngineError::Closed`.
    pub fn close(&self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

/// Snapshot cursor over a `MemEngine` column family.
pub struct MemIter {
    entries: Vec<(Vec<u8>, Vec<u8>)>,
    // usize::MAX marks "unpositioned"; seek() must run before key()/value().
    pos: usize,
    closed: Arc<AtomicBool>,
}

impl MemIter {
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle(self.closed.clone())
    }

    fn check_open(&self) -> Result<(), EngineError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(EngineError::Closed);
        }
        Ok(())
    }
}

impl RangeIter for MemIter {
    fn seek(&mut self, key: &[u8]) -> Result<(), EngineError> {
        self.check_open()?;
        self.pos = self
            .entries
            .partition_point(|(k, _)| k.as_slice() < key);
        Ok(())
    }

    fn valid(&self) -> bool {
        // A closed cursor still reports its position; termination surfaces
        // as an error on the next fetch, not as silent exhaustion.
        self.pos < self.entries.len()
    }

    fn key(&self) -> &[u8] {
        &self.entries[self.pos].0
    }

    fn value(&self) -> &[u8] {
        &self.entries[self.pos].1
    }

    fn next(&mut self) -> Result<(), EngineError> {
        self.check_open()?;
        if self.pos < self.entries.len() {
            self.pos += 1;
        }
        Ok(())
    }
}
