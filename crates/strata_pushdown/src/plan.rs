//! Program validation and the immutable execution plan.

use strata_codec::{ColumnType, TableSchema};

use crate::program::{AggKind, AggOperator, Program};
use crate::{Error, Result};

/// Where one aggregate reads its input from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AggInput {
    /// An existing original column, addressed logically.
    Column {
        logical: usize,
        column_type: ColumnType,
        is_key: bool,
    },
    /// `index_of_column == -1` on a COUNT kind: the row itself.
    WholeRow,
    /// Out-of-range column (or `-1` on a non-COUNT kind): NULL every row.
    Missing,
}

/// One validated aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AggSpec {
    pub kind: AggKind,
    pub input: AggInput,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ExecMode {
    Passthrough,
    Aggregate,
}

/// Immutable plan produced at `open` and shared by every `execute` call.
#[derive(Debug, Clone)]
pub(crate) struct ExecPlan {
    pub mode: ExecMode,
    pub decode_schema: TableSchema,
    /// Logical indices of the projected tuple (identity when the program
    /// has no selection list).
    pub projection: Vec<usize>,
    /// Logical indices of the group key.
    pub group_by: Vec<usize>,
    pub group_types: Vec<ColumnType>,
    pub aggs: Vec<AggSpec>,
    pub encode_schema: TableSchema,
    /// Whether the projected tuple reads any non-key column.
    pub projection_needs_value_half: bool,
    /// Whether grouping or any existing-column aggregate reads a non-key
    /// column.
    pub aggregation_needs_value_half: bool,
}

impl ExecPlan {
    pub fn build(program: &Program) -> Result<Self> {
        let original = &program.original_schema;
        let result = &program.result_schema;
        original.validate()?;
        result.validate()?;

        if original.common_id != result.common_id {
            return Err(Error::BadSchema(format!(
                "common_id disagrees: original={}, result={}",
                original.common_id, result.common_id
            )));
        }
        if program.schema_version != original.schema_version
            || program.schema_version != result.schema_version
        {
            return Err(Error::BadSchema(format!(
                "schema_version disagrees: program={}, original={}, result={}",
                program.schema_version, original.schema_version, result.schema_version
            )));
        }
        if !program.filter_expression.is_empty() {
            return Err(Error::BadSchema(
                "filter expressions are not supported".to_string(),
            ));
        }

        let width = original.columns.len();
        let projection: Vec<usize> = if program.selection_columns.is_empty() {
            (0..width).collect()
        } else {
            let mut out = Vec::with_capacity(program.selection_columns.len());
            for &logical in &program.selection_columns {
                let logical = logical as usize;
                if logical >= width {
                    return Err(Error::BadSchema(format!(
                        "selection column {logical} out of range for {width} columns"
                    )));
                }
                out.push(logical);
            }
            out
        };

        let mut group_by = Vec::with_capacity(program.group_by_columns.len());
        let mut group_types = Vec::with_capacity(program.group_by_columns.len());
        for &logical in &program.group_by_columns {
            let logical = logical as usize;
            let column = original.column_by_logical(logical).ok_or_else(|| {
                Error::BadSchema(format!(
                    "group-by column {logical} out of range for {width} columns"
                ))
            })?;
            group_by.push(logical);
            group_types.push(column.column_type);
        }

        let aggs: Vec<AggSpec> = program
            .aggregation_operators
            .iter()
            .map(|op| resolve_aggregate(original, op))
            .collect::<Result<_>>()?;

        let mode = if group_by.is_empty() && aggs.is_empty() {
            ExecMode::Passthrough
        } else {
            ExecMode::Aggregate
        };

        match mode {
            ExecMode::Passthrough => {
                check_passthrough_result_types(original, result, &projection)?;
            }
            ExecMode::Aggregate => {
                check_aggregate_result_types(result, &group_by, &group_types, &aggs)?;
            }
        }

        let projection_needs_value_half = projection.iter().any(|&logical| {
            original
                .column_by_logical(logical)
                .is_some_and(|c| !c.is_key)
        });
        let aggregation_needs_value_half = group_by.iter().any(|&logical| {
            original
                .column_by_logical(logical)
                .is_some_and(|c| !c.is_key)
        }) || aggs.iter().any(|spec| {
            matches!(spec.input, AggInput::Column { is_key: false, .. })
        });

        Ok(ExecPlan {
            mode,
            decode_schema: original.clone(),
            projection,
            group_by,
            group_types,
            aggs,
            encode_schema: result.clone(),
            projection_needs_value_half,
            aggregation_needs_value_half,
        })
    }
}

fn resolve_aggregate(original: &TableSchema, op: &AggOperator) -> Result<AggSpec> {
    let is_count = matches!(op.oper, AggKind::Count | AggKind::CountWithNull);
    let input = if op.index_of_column == -1 {
        if is_count {
            AggInput::WholeRow
        } else {
            AggInput::Missing
        }
    } else if op.index_of_column < 0 {
        return Err(Error::BadSchema(format!(
            "aggregate column index {} is invalid",
            op.index_of_column
        )));
    } else {
        match original.column_by_logical(op.index_of_column as usize) {
            Some(column) => {
                if matches!(op.oper, AggKind::Sum | AggKind::Sum0)
                    && !matches!(
                        column.column_type,
                        ColumnType::Integer
                            | ColumnType::Long
                            | ColumnType::Float
                            | ColumnType::Double
                    )
                {
                    return Err(Error::BadSchema(format!(
                        "{:?} over non-numeric column {}",
                        op.oper, op.index_of_column
                    )));
                }
                AggInput::Column {
                    logical: op.index_of_column as usize,
                    column_type: column.column_type,
                    is_key: column.is_key,
                }
            }
            // Out-of-range indices are legal; they feed NULL at runtime.
            None => AggInput::Missing,
        }
    };
    Ok(AggSpec {
        kind: op.oper,
        input,
    })
}

fn check_passthrough_result_types(
    original: &TableSchema,
    result: &TableSchema,
    projection: &[usize],
) -> Result<()> {
    if result.columns.len() != projection.len() {
        return Err(Error::BadSchema(format!(
            "result schema has {} columns, projection has {}",
            result.columns.len(),
            projection.len()
        )));
    }
    for (pos, &logical) in projection.iter().enumerate() {
        let input_type = original
            .column_by_logical(logical)
            .map(|c| c.column_type)
            .ok_or_else(|| {
                Error::BadSchema(format!("projection column {logical} out of range"))
            })?;
        let output = result.column_by_logical(pos).ok_or_else(|| {
            Error::BadSchema(format!("result schema lacks column index {pos}"))
        })?;
        if output.column_type != input_type {
            return Err(Error::BadSchema(format!(
                "result column {pos} is {:?}, projected column {logical} is {input_type:?}",
                output.column_type
            )));
        }
    }
    Ok(())
}

fn check_aggregate_result_types(
    result: &TableSchema,
    group_by: &[usize],
    group_types: &[ColumnType],
    aggs: &[AggSpec],
) -> Result<()> {
    let arity = group_by.len() + aggs.len();
    if result.columns.len() != arity {
        return Err(Error::BadSchema(format!(
            "result schema has {} columns, aggregation emits {arity}",
            result.columns.len()
        )));
    }

    for (pos, group_type) in group_types.iter().enumerate() {
        let output = result.column_by_logical(pos).ok_or_else(|| {
            Error::BadSchema(format!("result schema lacks column index {pos}"))
        })?;
        if output.column_type != *group_type {
            return Err(Error::BadSchema(format!(
                "result column {pos} is {:?}, group key is {group_type:?}",
                output.column_type
            )));
        }
    }

    for (offset, spec) in aggs.iter().enumerate() {
        let pos = group_by.len() + offset;
        let output = result.column_by_logical(pos).ok_or_else(|| {
            Error::BadSchema(format!("result schema lacks column index {pos}"))
        })?;
        let expected = aggregate_output_type(spec);
        if let Some(expected) = expected {
            if output.column_type != expected {
                return Err(Error::BadSchema(format!(
                    "result column {pos} is {:?}, {:?} emits {expected:?}",
                    output.column_type, spec.kind
                )));
            }
        }
    }
    Ok(())
}

/// Output type one aggregate emits, or `None` when the input column is
/// missing and the declared type is taken as-is.
fn aggregate_output_type(spec: &AggSpec) -> Option<ColumnType> {
    match spec.kind {
        AggKind::Count | AggKind::CountWithNull => Some(ColumnType::Long),
        AggKind::Sum | AggKind::Sum0 => match spec.input {
            AggInput::Column { column_type, .. } => match column_type {
                ColumnType::Integer | ColumnType::Long => Some(ColumnType::Long),
                ColumnType::Float | ColumnType::Double => Some(ColumnType::Double),
                // resolve_aggregate already rejected non-numeric SUM inputs.
                _ => None,
            },
            AggInput::WholeRow | AggInput::Missing => None,
        },
        AggKind::Max | AggKind::Min => match spec.input {
            AggInput::Column { column_type, .. } => Some(column_type),
            AggInput::WholeRow | AggInput::Missing => None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_codec::ColumnDesc;

    fn column(column_type: ColumnType, is_key: bool, index: i32) -> ColumnDesc {
        ColumnDesc {
            column_type,
            is_key,
            is_nullable: true,
            index,
        }
    }

    fn original() -> TableSchema {
        TableSchema::new(
            1,
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

    fn result_of(types: &[ColumnType]) -> TableSchema {
        TableSchema::new(
            1,
            1,
            types
                .iter()
                .enumerate()
                .map(|(idx, ty)| column(*ty, idx == 0, idx as i32))
                .collect(),
        )
    }

    fn base_program(result: TableSchema) -> Program {
        Program {
            schema_version: 1,
            original_schema: original(),
            selection_columns: Vec::new(),
            result_schema: result,
            group_by_columns: Vec::new(),
            aggregation_operators: Vec::new(),
            filter_expression: Vec::new(),
        }
    }

    #[test]
    fn passthrough_identity_plan() {
        let result = result_of(&[
            ColumnType::Bool,
            ColumnType::Integer,
            ColumnType::Float,
            ColumnType::Long,
            ColumnType::Double,
            ColumnType::String,
        ]);
        let plan = ExecPlan::build(&base_program(result)).unwrap();
        assert_eq!(plan.mode, ExecMode::Passthrough);
        assert_eq!(plan.projection, vec![0, 1, 2, 3, 4, 5]);
        assert!(plan.projection_needs_value_half);
    }

    #[test]
    fn selection_preserves_order_and_duplicates() {
        let mut program = base_program(result_of(&[
            ColumnType::String,
            ColumnType::Bool,
            ColumnType::Bool,
        ]));
        program.selection_columns = vec![5, 0, 0];
        let plan = ExecPlan::build(&program).unwrap();
        assert_eq!(plan.projection, vec![5, 0, 0]);
        assert!(!plan.projection_needs_value_half);
    }

    #[test]
    fn mismatched_common_id_is_rejected() {
        let mut result = result_of(&[ColumnType::Bool]);
        result.common_id = 2;
        let mut program = base_program(result);
        program.selection_columns = vec![0];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));
    }

    #[test]
    fn mismatched_schema_version_is_rejected() {
        let mut result = result_of(&[ColumnType::Bool]);
        result.schema_version = 9;
        let mut program = base_program(result);
        program.selection_columns = vec![0];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));
    }

    #[test]
    fn selection_out_of_range_is_rejected() {
        let mut program = base_program(result_of(&[ColumnType::Bool]));
        program.selection_columns = vec![6];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));
    }

    #[test]
    fn result_type_mismatch_is_rejected() {
        let mut program = base_program(result_of(&[ColumnType::Long]));
        program.selection_columns = vec![0];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));
    }

    #[test]
    fn aggregate_plan_resolves_inputs() {
        let mut program = base_program(result_of(&[
            ColumnType::Bool,
            ColumnType::Long,
            ColumnType::Long,
            ColumnType::Long,
        ]));
        program.group_by_columns = vec![0];
        program.aggregation_operators = vec![
            AggOperator {
                oper: AggKind::Sum,
                index_of_column: 1,
            },
            AggOperator {
                oper: AggKind::CountWithNull,
                index_of_column: 88,
            },
            AggOperator {
                oper: AggKind::Count,
                index_of_column: -1,
            },
        ];
        let plan = ExecPlan::build(&program).unwrap();
        assert_eq!(plan.mode, ExecMode::Aggregate);
        assert_eq!(
            plan.aggs[0].input,
            AggInput::Column {
                logical: 1,
                column_type: ColumnType::Integer,
                is_key: false,
            }
        );
        assert_eq!(plan.aggs[1].input, AggInput::Missing);
        assert_eq!(plan.aggs[2].input, AggInput::WholeRow);
        assert!(plan.aggregation_needs_value_half);
    }

    #[test]
    fn sum_over_string_is_rejected() {
        let mut program = base_program(result_of(&[ColumnType::Long]));
        program.aggregation_operators = vec![AggOperator {
            oper: AggKind::Sum,
            index_of_column: 5,
        }];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));
    }

    #[test]
    fn sum_output_widening_is_enforced() {
        // SUM over an Integer column must be declared Long, not Integer.
        let mut program = base_program(result_of(&[ColumnType::Integer]));
        program.aggregation_operators = vec![AggOperator {
            oper: AggKind::Sum,
            index_of_column: 1,
        }];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));

        // Float widens to Double.
        let mut program = base_program(result_of(&[ColumnType::Double]));
        program.aggregation_operators = vec![AggOperator {
            oper: AggKind::Sum,
            index_of_column: 2,
        }];
        assert!(ExecPlan::build(&program).is_ok());
    }

    #[test]
    fn aggregate_arity_mismatch_is_rejected() {
        let mut program = base_program(result_of(&[ColumnType::Bool]));
        program.group_by_columns = vec![0];
        program.aggregation_operators = vec![AggOperator {
            oper: AggKind::Count,
            index_of_column: 1,
        }];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));
    }

    #[test]
    fn filter_expression_is_rejected() {
        let mut program = base_program(result_of(&[
            ColumnType::Bool,
            ColumnType::Integer,
            ColumnType::Float,
            ColumnType::Long,
            ColumnType::Double,
            ColumnType::String,
        ]));
        program.filter_expression = vec![1, 2, 3];
        assert!(matches!(
            ExecPlan::build(&program),
            Err(Error::BadSchema(_))
        ));
    }

    #[test]
    fn key_only_aggregation_over_key_columns() {
        // Group by a key column, aggregate a key column: no value half needed.
        let mut program = base_program(result_of(&[ColumnType::Bool, ColumnType::Double]));
        program.group_by_columns = vec![0];
        program.aggregation_operators = vec![AggOperator {
            oper: AggKind::Max,
            index_of_column: 4,
        }];
        let plan = ExecPlan::build(&program).unwrap();
        assert!(!plan.aggregation_needs_value_half);
    }
}
