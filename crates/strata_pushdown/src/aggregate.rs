//! Hash aggregation over decoded rows.
//!
//! One table keyed by the encoded group-key bytes; per group, a parallel
//! vector of accumulators. Integer SUM/SUM0 run over checked 64-bit
//! accumulators; floating accumulators follow IEEE rules. MIN/MAX ignore
//! NULL and NaN inputs.

use ahash::AHashMap;
use strata_codec::{encode_hashable_datum, ColumnType, Datum, Value};

use crate::plan::{AggInput, AggSpec, ExecPlan};
use crate::program::AggKind;
use crate::{Error, Result};

/// What one aggregate sees for one row.
enum AggValue<'a> {
    Present(&'a Value),
    /// Whole-row input: never NULL.
    Row,
    Null,
}

#[derive(Debug, Clone)]
enum Accumulator {
    /// Missing-column input on anything but COUNTWITHNULL: NULL forever.
    Null,
    Count(i64),
    CountWithNull(i64),
    SumInt(Option<i64>),
    SumFloat(Option<f64>),
    Sum0Int(i64),
    Sum0Float(f64),
    Max(Option<Value>),
    Min(Option<Value>),
}

fn new_accumulator(spec: &AggSpec) -> Accumulator {
    match (spec.kind, spec.input) {
        (AggKind::CountWithNull, _) => Accumulator::CountWithNull(0),
        (_, AggInput::Missing) => Accumulator::Null,
        (AggKind::Count, _) => Accumulator::Count(0),
        (AggKind::Sum, AggInput::Column { column_type, .. }) => match column_type {
            ColumnType::Integer | ColumnType::Long => Accumulator::SumInt(None),
            _ => Accumulator::SumFloat(None),
        },
        (AggKind::Sum0, AggInput::Column { column_type, .. }) => match column_type {
            ColumnType::Integer | ColumnType::Long => Accumulator::Sum0Int(0),
            _ => Accumulator::Sum0Float(0.0),
        },
        (AggKind::Max, _) => Accumulator::Max(None),
        (AggKind::Min, _) => Accumulator::Min(None),
        // resolve_aggregate turned -1 on SUM kinds into Missing.
        (AggKind::Sum | AggKind::Sum0, AggInput::WholeRow) => Accumulator::Null,
    }
}

fn as_i64(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(v) => Ok(i64::from(*v)),
        Value::Long(v) => Ok(*v),
        other => Err(Error::TypeMismatch(format!(
            "integer aggregate fed {:?}",
            other.column_type()
        ))),
    }
}

fn as_f64(value: &Value) -> Result<f64> {
    match value {
        Value::Float(v) => Ok(f64::from(*v)),
        Value::Double(v) => Ok(*v),
        other => Err(Error::TypeMismatch(format!(
            "floating aggregate fed {:?}",
            other.column_type()
        ))),
    }
}

impl Accumulator {
    fn update(&mut self, input: AggValue<'_>) -> Result<()> {
        match self {
            Accumulator::Null => {}
            Accumulator::Count(n) => {
                if !matches!(input, AggValue::Null) {
                    *n += 1;
                }
            }
            Accumulator::CountWithNull(n) => *n += 1,
            Accumulator::SumInt(acc) => {
                if let AggValue::Present(value) = input {
                    let v = as_i64(value)?;
                    let next = acc.unwrap_or(0).checked_add(v).ok_or_else(|| {
                        Error::ArithmeticOverflow("64-bit SUM overflow".to_string())
                    })?;
                    *acc = Some(next);
                }
            }
            Accumulator::SumFloat(acc) => {
                if let AggValue::Present(value) = input {
                    let v = as_f64(value)?;
                    *acc = Some(acc.unwrap_or(0.0) + v);
                }
            }
            Accumulator::Sum0Int(acc) => {
                if let AggValue::Present(value) = input {
                    let v = as_i64(value)?;
                    *acc = acc.checked_add(v).ok_or_else(|| {
                        Error::ArithmeticOverflow("64-bit SUM0 overflow".to_string())
                    })?;
                }
            }
            Accumulator::Sum0Float(acc) => {
                if let AggValue::Present(value) = input {
                    *acc += as_f64(value)?;
                }
            }
            Accumulator::Max(acc) => {
                if let AggValue::Present(value) = input {
                    if value.is_nan() {
                        return Ok(());
                    }
                    let replace = match acc {
                        None => true,
                        Some(current) => {
                            value.cmp_same_type(current).ok_or_else(|| {
                                Error::TypeMismatch("MAX inputs of mixed kind".to_string())
                            })? == std::cmp::Ordering::Greater
                        }
                    };
                    if replace {
                        *acc = Some(value.clone());
                    }
                }
            }
            Accumulator::Min(acc) => {
                if let AggValue::Present(value) = input {
                    if value.is_nan() {
                        return Ok(());
                    }
                    let replace = match acc {
                        None => true,
                        Some(current) => {
                            value.cmp_same_type(current).ok_or_else(|| {
                                Error::TypeMismatch("MIN inputs of mixed kind".to_string())
                            })? == std::cmp::Ordering::Less
                        }
                    };
                    if replace {
                        *acc = Some(value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    fn finish(self) -> Datum {
        match self {
            Accumulator::Null => None,
            Accumulator::Count(n) | Accumulator::CountWithNull(n) => Some(Value::Long(n)),
            Accumulator::SumInt(acc) => acc.map(Value::Long),
            Accumulator::SumFloat(acc) => acc.map(Value::Double),
            Accumulator::Sum0Int(n) => Some(Value::Long(n)),
            Accumulator::Sum0Float(f) => Some(Value::Double(f)),
            Accumulator::Max(acc) | Accumulator::Min(acc) => acc,
        }
    }
}

struct GroupEntry {
    key: Vec<Datum>,
    accumulators: Vec<Accumulator>,
}

/// Bounded-only-by-cardinality hash aggregation table.
pub(crate) struct Aggregator {
    group_by: Vec<usize>,
    group_types: Vec<ColumnType>,
    specs: Vec<AggSpec>,
    groups: AHashMap<Vec<u8>, GroupEntry>,
}

impl Aggregator {
    pub fn new(plan: &ExecPlan) -> Self {
        Self {
            group_by: plan.group_by.clone(),
            group_types: plan.group_types.clone(),
            specs: plan.aggs.clone(),
            groups: AHashMap::new(),
        }
    }

    /// Fold one decoded row into its group.
    pub fn accumulate(&mut self, row: &[Datum]) -> Result<()> {
        let mut key_bytes = Vec::new();
        for (&logical, column_type) in self.group_by.iter().zip(self.group_types.iter()) {
            encode_hashable_datum(&mut key_bytes, *column_type, &row[logical]);
        }

        let entry = self.groups.entry(key_bytes).or_insert_with(|| GroupEntry {
            key: self.group_by.iter().map(|&i| row[i].clone()).collect(),
            accumulators: self.specs.iter().map(new_accumulator).collect(),
        });

        for (spec, accumulator) in self.specs.iter().zip(entry.accumulators.iter_mut()) {
            let input = match spec.input {
                AggInput::Column { logical, .. } => match &row[logical] {
                    Some(value) => AggValue::Present(value),
                    None => AggValue::Null,
                },
                AggInput::WholeRow => AggValue::Row,
                AggInput::Missing => AggValue::Null,
            };
            accumulator.update(input)?;
        }
        Ok(())
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Drain the table into result tuples `group_key ++ aggregate_outputs`.
    ///
    /// Order is the table's iteration order, materialized once so it is
    /// stable while the drain is paged out across calls.
    pub fn take_rows(&mut self) -> Vec<Vec<Datum>> {
        let groups = std::mem::take(&mut self.groups);
        groups
            .into_iter()
            .map(|(_, entry)| {
                let mut row = entry.key;
                row.extend(entry.accumulators.into_iter().map(Accumulator::finish));
                row
            })
            .collect()
    }
}
