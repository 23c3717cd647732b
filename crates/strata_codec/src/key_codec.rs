//! Order-preserving key forms for the six scalar kinds.
//!
//! Invariant: for two values of one kind, `a < b` iff `encode(a)` is
//! lexicographically below `encode(b)`, and the encodings are equal iff the
//! values are. NULL sorts before every non-NULL value of the same kind.
//!
//! Every key form is self-delimiting: numerics are a tag byte plus a fixed
//! width (zero padding under a NULL tag keeps the width fixed), strings are
//! terminator-tagged 9-byte groups.

use crate::{CodecError, ColumnDesc, ColumnType, Datum, Value};

/// Tag preceding a NULL key field.
const KEY_NULL: u8 = 0x00;
/// Tag preceding a present key field.
const KEY_PRESENT: u8 = 0x01;

/// Bool is one self-contained byte: NULL, false, true.
const BOOL_NULL: u8 = 0x00;
const BOOL_FALSE: u8 = 0x01;
const BOOL_TRUE: u8 = 0x02;

const SIGN_FLIP_32: u32 = 1 << 31;
const SIGN_FLIP_64: u64 = 1 << 63;

/// String groups carry 8 data bytes plus one terminator.
const STRING_GROUP_DATA: usize = 8;
/// Terminator of a non-final group.
const GROUP_CONTINUES: u8 = 0xFF;
/// Terminator base of the final group; `base + used_bytes` with used in 0..=8.
const GROUP_END_BASE: u8 = 0xEF;

pub(crate) fn encode_i32_ordered(value: i32) -> [u8; 4] {
    ((value as u32) ^ SIGN_FLIP_32).to_be_bytes()
}

pub(crate) fn decode_i32_ordered(bytes: [u8; 4]) -> i32 {
    (u32::from_be_bytes(bytes) ^ SIGN_FLIP_32) as i32
}

pub(crate) fn encode_i64_ordered(value: i64) -> [u8; 8] {
    ((value as u64) ^ SIGN_FLIP_64).to_be_bytes()
}

pub(crate) fn decode_i64_ordered(bytes: [u8; 8]) -> i64 {
    (u64::from_be_bytes(bytes) ^ SIGN_FLIP_64) as i64
}

/// Map an f32 bit pattern so the total order becomes lexicographic.
///
/// Canonicalizes -0.0 to +0.0 and NaN to the positive quiet NaN, so equal
/// values share one encoding and NaN sorts above every finite value.
pub(crate) fn encode_f32_ordered(value: f32) -> [u8; 4] {
    let value = if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f32::NAN
    } else {
        value
    };
    let bits = value.to_bits();
    let mapped = if bits & SIGN_FLIP_32 != 0 {
        !bits
    } else {
        bits ^ SIGN_FLIP_32
    };
    mapped.to_be_bytes()
}

pub(crate) fn decode_f32_ordered(bytes: [u8; 4]) -> f32 {
    let mapped = u32::from_be_bytes(bytes);
    let bits = if mapped & SIGN_FLIP_32 != 0 {
        mapped ^ SIGN_FLIP_32
    } else {
        !mapped
    };
    f32::from_bits(bits)
}

pub(crate) fn encode_f64_ordered(value: f64) -> [u8; 8] {
    let value = if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f64::NAN
    } else {
        value
    };
    let bits = value.to_bits();
    let mapped = if bits & SIGN_FLIP_64 != 0 {
        !bits
    } else {
        bits ^ SIGN_FLIP_64
    };
    mapped.to_be_bytes()
}

pub(crate) fn decode_f64_ordered(bytes: [u8; 8]) -> f64 {
    let mapped = u64::from_be_bytes(bytes);
    let bits = if mapped & SIGN_FLIP_64 != 0 {
        mapped ^ SIGN_FLIP_64
    } else {
        !mapped
    };
    f64::from_bits(bits)
}

fn encode_string_groups(out: &mut Vec<u8>, data: &[u8]) {
    let mut pos = 0;
    loop {
        let remaining = data.len() - pos;
        if remaining > STRING_GROUP_DATA {
            out.extend_from_slice(&data[pos..pos + STRING_GROUP_DATA]);
            out.push(GROUP_CONTINUES);
            pos += STRING_GROUP_DATA;
        } else {
            out.extend_from_slice(&data[pos..]);
            out.extend(std::iter::repeat(0u8).take(STRING_GROUP_DATA - remaining));
            out.push(GROUP_END_BASE + remaining as u8);
            return;
        }
    }
}

fn decode_string_groups(data: &[u8], offset: &mut usize) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    loop {
        if data.len() < *offset + STRING_GROUP_DATA + 1 {
            return Err(CodecError::Corrupt(
                "string key group truncated".to_string(),
            ));
        }
        let group = &data[*offset..*offset + STRING_GROUP_DATA];
        let terminator = data[*offset + STRING_GROUP_DATA];
        *offset += STRING_GROUP_DATA + 1;

        if terminator == GROUP_CONTINUES {
            out.extend_from_slice(group);
            continue;
        }
        if !(GROUP_END_BASE..=GROUP_END_BASE + STRING_GROUP_DATA as u8).contains(&terminator) {
            return Err(CodecError::Corrupt(format!(
                "invalid string group terminator {terminator:#04x}"
            )));
        }
        let used = (terminator - GROUP_END_BASE) as usize;
        if group[used..].iter().any(|b| *b != 0) {
            return Err(CodecError::Corrupt(
                "nonzero padding in final string group".to_string(),
            ));
        }
        out.extend_from_slice(&group[..used]);
        return Ok(out);
    }
}

/// Append the key form of one datum.
pub(crate) fn encode_key_datum(
    out: &mut Vec<u8>,
    column: &ColumnDesc,
    datum: &Datum,
) -> Result<(), CodecError> {
    if let Some(value) = datum {
        if !value.matches(column.column_type) {
            return Err(CodecError::TypeMismatch(format!(
                "key column index {} expects {:?}, got {:?}",
                column.index,
                column.column_type,
                value.column_type()
            )));
        }
    } else if !column.is_nullable {
        return Err(CodecError::TypeMismatch(format!(
            "NULL in non-nullable key column index {}",
            column.index
        )));
    }

    match (column.column_type, datum) {
        (ColumnType::Bool, None) => out.push(BOOL_NULL),
        (ColumnType::Bool, Some(Value::Bool(v))) => {
            out.push(if *v { BOOL_TRUE } else { BOOL_FALSE });
        }
        (ColumnType::Integer, None) => {
            out.push(KEY_NULL);
            out.extend_from_slice(&[0u8; 4]);
        }
        (ColumnType::Integer, Some(Value::Integer(v))) => {
            out.push(KEY_PRESENT);
            out.extend_from_slice(&encode_i32_ordered(*v));
        }
        (ColumnType::Long, None) => {
            out.push(KEY_NULL);
            out.extend_from_slice(&[0u8; 8]);
        }
        (ColumnType::Long, Some(Value::Long(v))) => {
            out.push(KEY_PRESENT);
            out.extend_from_slice(&encode_i64_ordered(*v));
        }
        (ColumnType::Float, None) => {
            out.push(KEY_NULL);
            out.extend_from_slice(&[0u8; 4]);
        }
        (ColumnType::Float, Some(Value::Float(v))) => {
            out.push(KEY_PRESENT);
            out.extend_from_slice(&encode_f32_ordered(*v));
        }
        (ColumnType::Double, None) => {
            out.push(KEY_NULL);
            out.extend_from_slice(&[0u8; 8]);
        }
        (ColumnType::Double, Some(Value::Double(v))) => {
            out.push(KEY_PRESENT);
            out.extend_from_slice(&encode_f64_ordered(*v));
        }
        (ColumnType::String, None) => out.push(KEY_NULL),
        (ColumnType::String, Some(Value::String(v))) => {
            out.push(KEY_PRESENT);
            encode_string_groups(out, v);
        }
        // matches() above already rejected kind mismatches.
        _ => unreachable!("datum kind checked against column type"),
    }
    Ok(())
}

fn read_fixed<const N: usize>(
    data: &[u8],
    offset: &mut usize,
) -> Result<[u8; N], CodecError> {
    if data.len() < *offset + N {
        return Err(CodecError::Corrupt("key field truncated".to_string()));
    }
    let mut buf = [0u8; N];
    buf.copy_from_slice(&data[*offset..*offset + N]);
    *offset += N;
    Ok(buf)
}

fn read_null_padding<const N: usize>(data: &[u8], offset: &mut usize) -> Result<(), CodecError> {
    let pad: [u8; N] = read_fixed(data, offset)?;
    if pad.iter().any(|b| *b != 0) {
        return Err(CodecError::Corrupt(
            "nonzero padding under NULL key tag".to_string(),
        ));
    }
    Ok(())
}

/// Consume the key form of one datum.
pub(crate) fn decode_key_datum(
    data: &[u8],
    offset: &mut usize,
    column: &ColumnDesc,
) -> Result<Datum, CodecError> {
    if data.len() <= *offset {
        return Err(CodecError::Corrupt("key field truncated".to_string()));
    }
    let tag = data[*offset];
    *offset += 1;

    let datum = match column.column_type {
        ColumnType::Bool => match tag {
            BOOL_NULL => None,
            BOOL_FALSE => Some(Value::Bool(false)),
            BOOL_TRUE => Some(Value::Bool(true)),
            other => {
                return Err(CodecError::Corrupt(format!(
                    "invalid bool key byte {other:#04x}"
                )));
            }
        },
        ColumnType::Integer => match tag {
            KEY_NULL => {
                read_null_padding::<4>(data, offset)?;
                None
            }
            KEY_PRESENT => Some(Value::Integer(decode_i32_ordered(read_fixed(data, offset)?))),
            other => {
                return Err(CodecError::Corrupt(format!(
                    "invalid key presence tag {other:#04x}"
                )));
            }
        },
        ColumnType::Long => match tag {
            KEY_NULL => {
                read_null_padding::<8>(data, offset)?;
                None
            }
            KEY_PRESENT => Some(Value::Long(decode_i64_ordered(read_fixed(data, offset)?))),
            other => {
                return Err(CodecError::Corrupt(format!(
                    "invalid key presence tag {other:#04x}"
                )));
            }
        },
        ColumnType::Float => match tag {
            KEY_NULL => {
                read_null_padding::<4>(data, offset)?;
                None
            }
            KEY_PRESENT => Some(Value::Float(decode_f32_ordered(read_fixed(data, offset)?))),
            other => {
                return Err(CodecError::Corrupt(format!(
                    "invalid key presence tag {other:#04x}"
                )));
            }
        },
        ColumnType::Double => match tag {
            KEY_NULL => {
                read_null_padding::<8>(data, offset)?;
                None
            }
            KEY_PRESENT => Some(Value::Double(decode_f64_ordered(read_fixed(data, offset)?))),
            other => {
                return Err(CodecError::Corrupt(format!(
                    "invalid key presence tag {other:#04x}"
                )));
            }
        },
        ColumnType::String => match tag {
            KEY_NULL => None,
            KEY_PRESENT => Some(Value::String(decode_string_groups(data, offset)?)),
            other => {
                return Err(CodecError::Corrupt(format!(
                    "invalid key presence tag {other:#04x}"
                )));
            }
        },
    };

    if datum.is_none() && !column.is_nullable {
        return Err(CodecError::Corrupt(format!(
            "NULL stored in non-nullable key column index {}",
            column.index
        )));
    }
    Ok(datum)
}
