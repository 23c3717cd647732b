//! Record encoder/decoder: one row to/from one key/value pair.
//!
//! Key layout: `0x72 || be64(common_id)`, then the key form of every key
//! column in slot order. Value layout: `be32(schema_version)`, a NULL
//! bitmap over the value slots, then the value form of every non-NULL
//! value slot in slot order.
//!
//! Rows are addressed by logical index: `row[c.index]` holds the datum for
//! column `c`, wherever `c` sits in the schema list.

use strata_engine::KeyValue;

use crate::key_codec::{decode_key_datum, encode_key_datum};
use crate::value_codec::{decode_value, encode_value};
use crate::{CodecError, Datum, TableSchema};

/// Leading byte of every table key.
pub const TABLE_PREFIX_MAGIC: u8 = 0x72;
/// Magic byte plus the big-endian table identifier.
pub const TABLE_PREFIX_LEN: usize = 9;

fn table_prefix(common_id: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(TABLE_PREFIX_LEN);
    out.push(TABLE_PREFIX_MAGIC);
    out.extend_from_slice(&common_id.to_be_bytes());
    out
}

/// Smallest key lexicographically above every key carrying `prefix`.
fn prefix_end(prefix: &[u8]) -> Vec<u8> {
    let mut out = prefix.to_vec();
    for idx in (0..out.len()).rev() {
        if out[idx] != 0xFF {
            out[idx] = out[idx].saturating_add(1);
            out.truncate(idx + 1);
            return out;
        }
    }
    // All-0xFF prefix: no upper bound exists; empty means unbounded.
    Vec::new()
}

/// Encodes rows of one schema into key/value pairs.
pub struct RecordEncoder {
    schema: TableSchema,
    prefix: Vec<u8>,
}

impl RecordEncoder {
    pub fn new(schema: TableSchema) -> Result<Self, CodecError> {
        schema.validate()?;
        let prefix = table_prefix(schema.common_id);
        Ok(Self { schema, prefix })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Lower bound of the table's key range.
    pub fn encode_min_key(&self) -> Vec<u8> {
        self.prefix.clone()
    }

    /// Exclusive upper bound of the table's key range.
    pub fn encode_max_key(&self) -> Vec<u8> {
        prefix_end(&self.prefix)
    }

    /// Encode only the key half of a row.
    pub fn encode_key(&self, row: &[Datum]) -> Result<Vec<u8>, CodecError> {
        self.check_arity(row)?;
        let mut key = self.prefix.clone();
        for (_, column) in self.schema.key_slots() {
            let datum = &row[column.index as usize];
            encode_key_datum(&mut key, column, datum)?;
        }
        Ok(key)
    }

    /// Encode a full row into its key/value pair.
    pub fn encode(&self, row: &[Datum]) -> Result<KeyValue, CodecError> {
        let key = self.encode_key(row)?;

        let value_slot_count = self.schema.value_slot_count();
        let mut value = Vec::with_capacity(4 + value_slot_count.div_ceil(8));
        value.extend_from_slice(&self.schema.schema_version.to_be_bytes());

        let bitmap_len = value_slot_count.div_ceil(8);
        let bitmap_start = value.len();
        value.extend(std::iter::repeat(0u8).take(bitmap_len));

        for (pos, (_, column)) in self.schema.value_slots().enumerate() {
            let datum = &row[column.index as usize];
            match datum {
                None => {
                    if !column.is_nullable {
                        return Err(CodecError::TypeMismatch(format!(
                            "NULL in non-nullable value column index {}",
                            column.index
                        )));
                    }
                    value[bitmap_start + pos / 8] |= 1u8 << (pos % 8);
                }
                Some(v) => encode_value(&mut value, column, v)?,
            }
        }

        Ok(KeyValue::new(key, value))
    }

    fn check_arity(&self, row: &[Datum]) -> Result<(), CodecError> {
        if row.len() != self.schema.columns.len() {
            return Err(CodecError::BadArity(format!(
                "row has {} datums, schema has {} columns",
                row.len(),
                self.schema.columns.len()
            )));
        }
        Ok(())
    }
}

/// Decodes key/value pairs of one schema back into rows.
pub struct RecordDecoder {
    schema: TableSchema,
    prefix: Vec<u8>,
}

impl RecordDecoder {
    pub fn new(schema: TableSchema) -> Result<Self, CodecError> {
        schema.validate()?;
        let prefix = table_prefix(schema.common_id);
        Ok(Self { schema, prefix })
    }

    pub fn schema(&self) -> &TableSchema {
        &self.schema
    }

    /// Decode a full key/value pair into a logical-index row.
    pub fn decode(&self, kv: &KeyValue) -> Result<Vec<Datum>, CodecError> {
        let mut row = self.decode_key(&kv.key)?;
        self.decode_value_into(&kv.value, &mut row)?;
        Ok(row)
    }

    /// Decode only the key half; value-slot positions stay NULL.
    pub fn decode_key(&self, key: &[u8]) -> Result<Vec<Datum>, CodecError> {
        if key.len() < TABLE_PREFIX_LEN || !key.starts_with(&self.prefix) {
            return Err(CodecError::Corrupt(format!(
                "key does not carry prefix of table {}: {}",
                self.schema.common_id,
                hex::encode(key)
            )));
        }

        let mut row: Vec<Datum> = vec![None; self.schema.columns.len()];
        let mut offset = TABLE_PREFIX_LEN;
        for (_, column) in self.schema.key_slots() {
            let datum = decode_key_datum(key, &mut offset, column)?;
            row[column.index as usize] = datum;
        }
        if offset != key.len() {
            return Err(CodecError::Corrupt(format!(
                "{} trailing bytes after key columns",
                key.len() - offset
            )));
        }
        Ok(row)
    }

    fn decode_value_into(&self, value: &[u8], row: &mut [Datum]) -> Result<(), CodecError> {
        if value.len() < 4 {
            return Err(CodecError::Corrupt("value half truncated".to_string()));
        }
        let mut version_bytes = [0u8; 4];
        version_bytes.copy_from_slice(&value[..4]);
        let disk_version = u32::from_be_bytes(version_bytes);
        if disk_version != self.schema.schema_version {
            return Err(CodecError::VersionSkew {
                disk: disk_version,
                expected: self.schema.schema_version,
            });
        }

        let bitmap_len = self.schema.value_slot_count().div_ceil(8);
        if value.len() < 4 + bitmap_len {
            return Err(CodecError::Corrupt("NULL bitmap truncated".to_string()));
        }
        let bitmap = &value[4..4 + bitmap_len];
        let mut offset = 4 + bitmap_len;

        for (pos, (_, column)) in self.schema.value_slots().enumerate() {
            let is_null = bitmap[pos / 8] & (1u8 << (pos % 8)) != 0;
            if is_null {
                if !column.is_nullable {
                    return Err(CodecError::Corrupt(format!(
                        "NULL stored in non-nullable value column index {}",
                        column.index
                    )));
                }
                row[column.index as usize] = None;
            } else {
                row[column.index as usize] = Some(decode_value(value, &mut offset, column)?);
            }
        }
        if offset != value.len() {
            return Err(CodecError::Corrupt(format!(
                "{} trailing bytes after value columns",
                value.len() - offset
            )));
        }
        Ok(())
    }
}
