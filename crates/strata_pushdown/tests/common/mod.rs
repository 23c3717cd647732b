//! Shared fixtures for coprocessor integration tests.
//!
//! Each scenario builds its own fixture: a schema, an engine seeded with
//! encoded rows, and helpers to run a program to completion. Nothing is
//! shared across scenarios.

#![allow(dead_code)]

use anyhow::Result;
use strata_codec::{
    ColumnDesc, ColumnType, Datum, RecordDecoder, RecordEncoder, TableSchema,
};
use strata_engine::{KeyValue, MemEngine, RangeIter, RawEngine};
use strata_pushdown::{Coprocessor, Program};

pub const CF: &str = "default";

pub fn column(column_type: ColumnType, is_key: bool, index: i32) -> ColumnDesc {
    ColumnDesc {
        column_type,
        is_key,
        is_nullable: true,
        index,
    }
}

/// The six-type table layout used across scenarios: bool/double/string key
/// columns, int/float/long value columns.
pub fn six_type_schema(common_id: i64) -> TableSchema {
    TableSchema::new(
        common_id,
        1,
        vec![
            column(ColumnType::Bool, true, 0),
            column(ColumnType::Integer, false, 1),
            column(ColumnType::Float, false, 2),
            column(ColumnType::Long, false, 3),
            column(ColumnType::Double, true, 4),
            column(ColumnType::String, true, 5),
        ],
    )
}

/// A program with no selection, grouping, or aggregation.
pub fn passthrough_program(original: TableSchema, result: TableSchema) -> Program {
    Program {
        schema_version: original.schema_version,
        original_schema: original,
        selection_columns: Vec::new(),
        result_schema: result,
        group_by_columns: Vec::new(),
        aggregation_operators: Vec::new(),
        filter_expression: Vec::new(),
    }
}

/// One table worth of rows loaded into an in-memory engine.
pub struct TableFixture {
    pub schema: TableSchema,
    pub encoder: RecordEncoder,
    pub engine: MemEngine,
}

impl TableFixture {
    pub fn new(schema: TableSchema) -> Result<Self> {
        let encoder = RecordEncoder::new(schema.clone())?;
        Ok(Self {
            schema,
            encoder,
            engine: MemEngine::new(),
        })
    }

    pub fn load_rows(&self, rows: &[Vec<Datum>]) -> Result<()> {
        for row in rows {
            self.engine.put(CF, self.encoder.encode(row)?)?;
        }
        Ok(())
    }

    /// Cursor over the whole table, positioned at its first row.
    pub fn seeked_iter(&self) -> Result<strata_engine::MemIter> {
        let mut iter = self
            .engine
            .mem_iter(CF, self.encoder.encode_max_key());
        iter.seek(&self.encoder.encode_min_key())?;
        Ok(iter)
    }
}

/// Drive `execute` until it reports no more rows.
///
/// Returns the emitted pairs and the number of calls made, so tests can
/// assert on chunking shapes.
pub fn run_to_completion(
    copr: &mut Coprocessor,
    iter: &mut dyn RangeIter,
    key_only: bool,
    max_fetch_cnt: u64,
    max_bytes_rpc: i64,
) -> Result<(Vec<KeyValue>, usize)> {
    let mut all = Vec::new();
    let mut calls = 0usize;
    loop {
        let mut page = Vec::new();
        let has_more = copr.execute(iter, key_only, max_fetch_cnt, max_bytes_rpc, &mut page)?;
        calls += 1;
        all.extend(page);
        if !has_more {
            return Ok((all, calls));
        }
        assert!(calls < 10_000, "execute loop did not terminate");
    }
}

/// Decode emitted pairs under the result schema, sorted by key bytes so
/// unordered aggregate output is comparable.
pub fn decode_sorted(result_schema: &TableSchema, kvs: &[KeyValue]) -> Result<Vec<Vec<Datum>>> {
    let decoder = RecordDecoder::new(result_schema.clone())?;
    let mut kvs: Vec<&KeyValue> = kvs.iter().collect();
    kvs.sort_by(|a, b| a.key.cmp(&b.key));
    let mut rows = Vec::with_capacity(kvs.len());
    for kv in kvs {
        rows.push(decoder.decode(kv)?);
    }
    Ok(rows)
}

/// Decode emitted pairs in emission order.
pub fn decode_in_order(result_schema: &TableSchema, kvs: &[KeyValue]) -> Result<Vec<Vec<Datum>>> {
    let decoder = RecordDecoder::new(result_schema.clone())?;
    kvs.iter().map(|kv| Ok(decoder.decode(kv)?)).collect()
}
