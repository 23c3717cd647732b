//! Fjall-backed on-disk engine.

use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::{Arc, RwLock};

use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use tracing::warn;

use crate::{EngineError, KeyValue, Range, RangeIter, RawEngine};

/// Page size used when pulling rows out of a partition range scan.
const SCAN_PAGE_SIZE: usize = 1024;

/// On-disk engine mapping each column family to one fjall partition.
pub struct FjallEngine {
    keyspace: Arc<Keyspace>,
    partitions: RwLock<HashMap<String, PartitionHandle>>,
}

impl FjallEngine {
    /// Open (or create) a keyspace rooted at `path`.
    pub fn open(path: &Path) -> Result<Self, EngineError> {
        let keyspace = fjall::Config::new(path).open()?;
        Ok(Self {
            keyspace: Arc::new(keyspace),
            partitions: RwLock::new(HashMap::new()),
        })
    }

    fn partition(&self, cf: &str) -> Result<PartitionHandle, EngineError> {
        if let Ok(guard) = self.partitions.read() {
            if let Some(handle) = guard.get(cf) {
                return Ok(handle.clone());
            }
        }
        let handle = self
            .keyspace
            .open_partition(cf, PartitionCreateOptions::default())?;
        if let Ok(mut guard) = self.partitions.write() {
            guard.entry(cf.to_string()).or_insert_with(|| handle.clone());
        }
        Ok(handle)
    }
}

impl RawEngine for FjallEngine {
    fn put(&self, cf: &str, kv: KeyValue) -> Result<(), EngineError> {
        let partition = self.partition(cf)?;
        partition.insert(kv.key, kv.value)?;
        Ok(())
    }

    fn delete_range(&self, cf: &str, range: Range) -> Result<(), EngineError> {
        let partition = self.partition(cf)?;
        let mut doomed = Vec::new();
        for item in partition.range(range.start.clone()..range.end.clone()) {
            let (key, _) = item?;
            doomed.push(key.to_vec());
        }
        for key in doomed {
            if let Err(err) = partition.remove(key) {
                warn!(error = ?err, "fjall delete_range remove failed");
                return Err(err.into());
            }
        }
        Ok(())
    }

    fn range_iter(
        &self,
        cf: &str,
        upper_bound: Vec<u8>,
    ) -> Result<Box<dyn RangeIter>, EngineError> {
        let partition = self.partition(cf)?;
        Ok(Box::new(FjallIter {
            partition,
            upper_bound,
            page: VecDeque::new(),
            last_key: Vec::new(),
            exhausted: true,
        }))
    }
}

/// Paged cursor over one fjall partition.
///
/// Rather than holding a live partition iterator across calls, the cursor
/// pulls one page at a time and resumes from the last observed key, the
/// same shape the snapshot scans in the node use.
struct FjallIter {
    partition: PartitionHandle,
    upper_bound: Vec<u8>,
    page: VecDeque<(Vec<u8>, Vec<u8>)>,
    last_key: Vec<u8>,
    exhausted: bool,
}

impl FjallIter {
    /// Pull the next page starting strictly after `last_key`.
    fn fill_page(&mut self, lower: Vec<u8>, inclusive: bool) -> Result<(), EngineError> {
        self.page.clear();
        let iter: Box<dyn Iterator<Item = fjall::Result<fjall::KvPair>>> =
            if self.upper_bound.is_empty() {
                Box::new(self.partition.range(lower.clone()..))
            } else {
                Box::new(self.partition.range(lower.clone()..self.upper_bound.clone()))
            };
        for item in iter {
            let (key, value) = item?;
            let key = key.to_vec();
            if !inclusive && key == lower {
                continue;
            }
            self.page.push_back((key, value.to_vec()));
            if self.page.len() >= SCAN_PAGE_SIZE {
                break;
            }
        }
        self.exhausted = self.page.is_empty();
        if let Some((key, _)) = self.page.back() {
            self.last_key = key.clone();
        }
        Ok(())
    }

    fn advance(&mut self) -> Result<(), EngineError> {
        self.page.pop_front();
        if self.page.is_empty() && !self.exhausted {
            let lower = self.last_key.clone();
            self.fill_page(lower, false)?;
        }
        Ok(())
    }
}

impl RangeIter for FjallIter {
    fn seek(&mut self, key: &[u8]) -> Result<(), EngineError> {
        self.exhausted = false;
        self.fill_page(key.to_vec(), true)
    }

    fn valid(&self) -> bool {
        !self.page.is_empty()
    }

    fn key(&self) -> &[u8] {
        &self.page[0].0
    }

    fn value(&self) -> &[u8] {
        &self.page[0].1
    }

    fn next(&mut self) -> Result<(), EngineError> {
        self.advance()
    }
}
