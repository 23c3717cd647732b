//! Ordered key/value engine contracts for the StrataStore node.
//!
//! This crate defines the `RawEngine` abstraction the pushdown coprocessor
//! scans against, two engine implementations (`MemEngine` in-memory and
//! `FjallEngine` on-disk), and the cursor trait (`RangeIter`) whose
//! byte-lexicographic ordering the row codec is designed against.

use thiserror::Error;

mod disk;
mod mem;

pub use disk::FjallEngine;
pub use mem::{CloseHandle, MemEngine, MemIter};

/// One encoded row as stored by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyValue {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl KeyValue {
    pub fn new(key: Vec<u8>, value: Vec<u8>) -> Self {
        Self { key, value }
    }

    /// Total encoded size, used for byte budgeting.
    pub fn encoded_len(&self) -> usize {
        self.key.len() + self.value.len()
    }
}

/// Half-open key range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Range {
    pub start: Vec<u8>,
    pub end: Vec<u8>,
}

/// Errors surfaced by engine implementations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The cursor was terminated externally; the next fetch observes this.
    #[error("cursor closed")]
    Closed,
    /// Any storage-level failure from the backing engine.
    #[error("storage engine: {0}")]
    Storage(String),
}

impl From<fjall::Error> for EngineError {
    fn from(err: fjall::Error) -> Self {
        EngineError::Storage(err.to_string())
    }
}

/// Forward cursor over an ordered key range.
///
/// The cursor is bounded by an upper-bound key fixed at creation. `seek`
/// positions it at the first key `>=` the given key; `key`/`value` are only
/// meaningful while `valid()` returns true. `seek` and `next` return an
/// error when the cursor has been terminated externally, which callers
/// surface as a cancellation.
pub trait RangeIter {
    fn seek(&mut self, key: &[u8]) -> Result<(), EngineError>;
    fn valid(&self) -> bool;
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn next(&mut self) -> Result<(), EngineError>;
}

/// Storage engine API used by the coprocessor and its callers.
///
/// Implementations order keys byte-lexicographically. Writes exist for data
/// setup (tests and callers); the coprocessor itself only reads through
/// `range_iter` and never closes a cursor it did not create.
pub trait RawEngine: Send + Sync {
    /// Persist one key/value pair in the given column family.
    fn put(&self, cf: &str, kv: KeyValue) -> Result<(), EngineError>;

    /// Remove every key in `[range.start, range.end)` from the column family.
    fn delete_range(&self, cf: &str, range: Range) -> Result<(), EngineError>;

    /// Open a cursor over the column family, bounded above by `upper_bound`
    /// (exclusive). The cursor is unpositioned until the first `seek`.
    fn range_iter(&self, cf: &str, upper_bound: Vec<u8>)
        -> Result<Box<dyn RangeIter>, EngineError>;
}
