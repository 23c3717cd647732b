//! Schema model: column descriptors and per-table schemas.

use serde::{Deserialize, Serialize};

use crate::CodecError;

/// The six scalar kinds a column may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    Integer,
    Long,
    Float,
    Double,
    String,
}

impl ColumnType {
    /// Stable one-byte tag used in group-key hashing.
    pub(crate) fn tag(self) -> u8 {
        match self {
            ColumnType::Bool => 0,
            ColumnType::Integer => 1,
            ColumnType::Long => 2,
            ColumnType::Float => 3,
            ColumnType::Double => 4,
            ColumnType::String => 5,
        }
    }
}

/// One column descriptor.
///
/// `index` is the column's logical position, the position by which the query
/// layer names it. It is not necessarily the column's position in the schema
/// list (the slot); schemas whose logical order differs from their slot
/// order are legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub column_type: ColumnType,
    pub is_key: bool,
    pub is_nullable: bool,
    pub index: i32,
}

/// Ordered list of column descriptors plus the table identity the codec
/// stamps into every encoded pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    /// Table/region identifier; all rows of the table share this key prefix.
    pub common_id: i64,
    pub schema_version: u32,
    pub columns: Vec<ColumnDesc>,
}

impl TableSchema {
    pub fn new(common_id: i64, schema_version: u32, columns: Vec<ColumnDesc>) -> Self {
        Self {
            common_id,
            schema_version,
            columns,
        }
    }

    /// Checks that logical indices form a permutation of `0..columns.len()`.
    pub fn validate(&self) -> Result<(), CodecError> {
        let len = self.columns.len();
        let mut seen = vec![false; len];
        for column in &self.columns {
            let index = column.index;
            if index < 0 || index as usize >= len {
                return Err(CodecError::BadSchema(format!(
                    "column index {index} out of range for {len} columns"
                )));
            }
            if seen[index as usize] {
                return Err(CodecError::BadSchema(format!(
                    "duplicate column index {index}"
                )));
            }
            seen[index as usize] = true;
        }
        Ok(())
    }

    /// Slot positions of key columns, in slot order.
    pub fn key_slots(&self) -> impl Iterator<Item = (usize, &ColumnDesc)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_key)
    }

    /// Slot positions of non-key columns, in slot order.
    pub fn value_slots(&self) -> impl Iterator<Item = (usize, &ColumnDesc)> {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !c.is_key)
    }

    pub fn value_slot_count(&self) -> usize {
        self.columns.iter().filter(|c| !c.is_key).count()
    }

    /// Column descriptor for a logical index, if in range.
    pub fn column_by_logical(&self, index: usize) -> Option<&ColumnDesc> {
        self.columns.iter().find(|c| c.index as usize == index)
    }
}
