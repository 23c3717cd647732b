//! Wire shape of the compiled query fragment.
//!
//! The RPC framing that ships a program to the storage node is out of
//! scope; these types only fix the fields and derive serde so the caller
//! can frame them however it likes.

use serde::{Deserialize, Serialize};
use strata_codec::TableSchema;

/// Aggregate operator kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AggKind {
    Sum,
    Count,
    CountWithNull,
    Max,
    Min,
    Sum0,
}

/// One aggregate: an operator applied to a column.
///
/// `index_of_column` is a logical column index. `-1` means "whole row"
/// (meaningful for the COUNT kinds); an out-of-range index is accepted and
/// feeds the aggregate NULL on every row, which is how rollups count rows
/// against columns that do not exist on older schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggOperator {
    pub oper: AggKind,
    pub index_of_column: i32,
}

/// The compiled query fragment pushed down to the storage node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub schema_version: u32,
    pub original_schema: TableSchema,
    /// Logical indices projecting a subset of the original columns;
    /// duplicates and reorderings preserved. Empty means "all columns".
    #[serde(default)]
    pub selection_columns: Vec<u32>,
    /// Schema of the emitted rows.
    pub result_schema: TableSchema,
    /// Logical indices of the group-by key, over the original columns.
    #[serde(default)]
    pub group_by_columns: Vec<u32>,
    #[serde(default)]
    pub aggregation_operators: Vec<AggOperator>,
    /// Filter expression slot; evaluation is not supported yet and a
    /// non-empty value is rejected when the program is opened.
    #[serde(default)]
    pub filter_expression: Vec<u8>,
}
