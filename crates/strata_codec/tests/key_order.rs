//! Randomized checks that encoded keys order exactly like the rows they
//! encode, and that every encoded row decodes back to itself.

use std::cmp::Ordering;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strata_codec::{
    ColumnDesc, ColumnType, Datum, RecordDecoder, RecordEncoder, TableSchema, Value,
};

const PAIRS: usize = 10_000;

fn column(column_type: ColumnType, is_key: bool, index: i32) -> ColumnDesc {
    ColumnDesc {
        column_type,
        is_key,
        is_nullable: true,
        index,
    }
}

/// All six types, all of them key columns, so every kind participates in
/// the ordering check.
fn all_key_schema() -> TableSchema {
    TableSchema::new(
        7,
        1,
        vec![
            column(ColumnType::Bool, true, 0),
            column(ColumnType::Integer, true, 1),
            column(ColumnType::Long, true, 2),
            column(ColumnType::Float, true, 3),
            column(ColumnType::Double, true, 4),
            column(ColumnType::String, true, 5),
        ],
    )
}

/// Mixed key/value schema with logical indices reversed relative to slots.
fn disordered_schema() -> TableSchema {
    TableSchema::new(
        7,
        1,
        vec![
            column(ColumnType::String, true, 5),
            column(ColumnType::Double, false, 4),
            column(ColumnType::Long, true, 3),
            column(ColumnType::Float, false, 2),
            column(ColumnType::Integer, true, 1),
            column(ColumnType::Bool, false, 0),
        ],
    )
}

fn random_datum(rng: &mut StdRng, column_type: ColumnType) -> Datum {
    if rng.gen_ratio(1, 8) {
        return None;
    }
    Some(match column_type {
        ColumnType::Bool => Value::Bool(rng.gen()),
        ColumnType::Integer => Value::Integer(match rng.gen_range(0..10) {
            0 => i32::MIN,
            1 => i32::MAX,
            2 => 0,
            _ => rng.gen(),
        }),
        ColumnType::Long => Value::Long(match rng.gen_range(0..10) {
            0 => i64::MIN,
            1 => i64::MAX,
            2 => 0,
            _ => rng.gen(),
        }),
        ColumnType::Float => Value::Float(match rng.gen_range(0..12) {
            0 => f32::NEG_INFINITY,
            1 => f32::INFINITY,
            2 => 0.0,
            3 => -0.0,
            _ => rng.gen_range(-1.0e9_f32..1.0e9),
        }),
        ColumnType::Double => Value::Double(match rng.gen_range(0..12) {
            0 => f64::NEG_INFINITY,
            1 => f64::INFINITY,
            2 => 0.0,
            3 => -0.0,
            _ => rng.gen_range(-1.0e12_f64..1.0e12),
        }),
        ColumnType::String => {
            // Lengths straddle the 8-byte group boundary on purpose.
            let len = rng.gen_range(0..20);
            let mut bytes = vec![0u8; len];
            rng.fill(bytes.as_mut_slice());
            Value::String(bytes)
        }
    })
}

fn random_row(rng: &mut StdRng, schema: &TableSchema) -> Vec<Datum> {
    let mut row = vec![None; schema.columns.len()];
    for col in &schema.columns {
        row[col.index as usize] = random_datum(rng, col.column_type);
    }
    row
}

/// Row ordering on key columns in slot order, NULL below every value.
fn compare_rows(schema: &TableSchema, a: &[Datum], b: &[Datum]) -> Ordering {
    for (_, col) in schema.key_slots() {
        let da = &a[col.index as usize];
        let db = &b[col.index as usize];
        let ord = match (da, db) {
            (None, None) => Ordering::Equal,
            (None, Some(_)) => Ordering::Less,
            (Some(_), None) => Ordering::Greater,
            (Some(x), Some(y)) => x
                .cmp_same_type(y)
                .expect("generated values share a kind and are never NaN"),
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

#[test]
fn key_bytes_order_like_rows() {
    let schema = all_key_schema();
    let encoder = RecordEncoder::new(schema.clone()).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5742_1001);

    for _ in 0..PAIRS {
        let a = random_row(&mut rng, &schema);
        let b = random_row(&mut rng, &schema);
        let ka = encoder.encode_key(&a).unwrap();
        let kb = encoder.encode_key(&b).unwrap();
        let expected = compare_rows(&schema, &a, &b);
        assert_eq!(
            ka.cmp(&kb),
            expected,
            "rows {a:?} / {b:?} encoded to misordered keys"
        );
    }
}

#[test]
fn key_bytes_order_like_rows_with_disordered_indices() {
    let schema = disordered_schema();
    let encoder = RecordEncoder::new(schema.clone()).unwrap();
    let mut rng = StdRng::seed_from_u64(0x5742_1002);

    for _ in 0..PAIRS / 10 {
        let a = random_row(&mut rng, &schema);
        let b = random_row(&mut rng, &schema);
        let ka = encoder.encode_key(&a).unwrap();
        let kb = encoder.encode_key(&b).unwrap();
        assert_eq!(ka.cmp(&kb), compare_rows(&schema, &a, &b));
    }
}

#[test]
fn random_rows_round_trip() {
    for schema in [all_key_schema(), disordered_schema()] {
        let encoder = RecordEncoder::new(schema.clone()).unwrap();
        let decoder = RecordDecoder::new(schema.clone()).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5742_1003);

        for _ in 0..1_000 {
            let row = random_row(&mut rng, &schema);
            let kv = encoder.encode(&row).unwrap();
            // Float equality treats -0.0 and +0.0 as equal, which matches the
            // key form's canonicalization.
            assert_eq!(decoder.decode(&kv).unwrap(), row);
        }
    }
}
