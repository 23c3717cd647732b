//! The coprocessor instance: lifecycle, scan loop, budgeted emission.

use std::collections::VecDeque;

use strata_codec::{Datum, RecordDecoder, RecordEncoder};
use strata_engine::{KeyValue, RangeIter};
use tracing::{debug, warn};

use crate::aggregate::Aggregator;
use crate::plan::{ExecMode, ExecPlan};
use crate::program::Program;
use crate::{Error, Result};

/// Lifecycle states. Faults latch until `close`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CoprState {
    Unconfigured,
    Ready,
    Draining,
    Exhausted,
    Faulted,
}

struct ExecContext {
    plan: ExecPlan,
    decoder: RecordDecoder,
    encoder: RecordEncoder,
    aggregator: Option<Aggregator>,
    /// Aggregate rows drained from the table but not yet emitted.
    residue: VecDeque<Vec<Datum>>,
}

/// One pushdown coprocessor instance.
///
/// Created empty, configured by exactly one [`open`](Self::open), driven by
/// zero or more [`execute`](Self::execute) calls, released by
/// [`close`](Self::close). Single-consumer between `open` and `close`; the
/// caller serializes `execute` calls.
pub struct Coprocessor {
    state: CoprState,
    ctx: Option<ExecContext>,
}

impl Coprocessor {
    pub fn new() -> Self {
        Self {
            state: CoprState::Unconfigured,
            ctx: None,
        }
    }

    /// Configure the instance with a compiled program.
    ///
    /// Validation failures leave the instance unconfigured.
    pub fn open(&mut self, program: Program) -> Result<()> {
        if self.state != CoprState::Unconfigured {
            return Err(Error::BadRequest(format!(
                "open on a {:?} instance",
                self.state
            )));
        }

        let plan = ExecPlan::build(&program)?;
        let decoder = RecordDecoder::new(plan.decode_schema.clone())?;
        let encoder = RecordEncoder::new(plan.encode_schema.clone())?;
        let aggregator = match plan.mode {
            ExecMode::Passthrough => None,
            ExecMode::Aggregate => Some(Aggregator::new(&plan)),
        };

        debug!(
            common_id = plan.decode_schema.common_id,
            mode = ?plan.mode,
            columns = plan.decode_schema.columns.len(),
            projected = plan.projection.len(),
            groups = plan.group_by.len(),
            aggregates = plan.aggs.len(),
            "coprocessor program accepted"
        );

        self.ctx = Some(ExecContext {
            plan,
            decoder,
            encoder,
            aggregator,
            residue: VecDeque::new(),
        });
        self.state = CoprState::Ready;
        Ok(())
    }

    /// Release the program and any aggregate state; the instance can be
    /// reopened afterwards.
    pub fn close(&mut self) {
        self.ctx = None;
        self.state = CoprState::Unconfigured;
    }

    /// Drive the positioned cursor and append result pairs to `out_kvs`.
    ///
    /// Returns `has_more`: whether another call can produce further rows.
    /// `max_fetch_cnt == 0` and `max_bytes_rpc <= 0` disable the respective
    /// budget. On error the instance faults and `out_kvs` must not be
    /// consumed.
    pub fn execute(
        &mut self,
        iter: &mut dyn RangeIter,
        key_only: bool,
        max_fetch_cnt: u64,
        max_bytes_rpc: i64,
        out_kvs: &mut Vec<KeyValue>,
    ) -> Result<bool> {
        match self.state {
            CoprState::Unconfigured => {
                return Err(Error::BadRequest("execute before open".to_string()));
            }
            CoprState::Faulted => {
                return Err(Error::BadRequest("execute on a faulted instance".to_string()));
            }
            CoprState::Exhausted => return Ok(false),
            CoprState::Ready | CoprState::Draining => {}
        }

        match self.execute_inner(iter, key_only, max_fetch_cnt, max_bytes_rpc, out_kvs) {
            Ok(has_more) => {
                debug!(
                    rows = out_kvs.len(),
                    has_more,
                    state = ?self.state,
                    "coprocessor page complete"
                );
                Ok(has_more)
            }
            Err(err) => {
                warn!(error = %err, "coprocessor faulted");
                self.state = CoprState::Faulted;
                Err(err)
            }
        }
    }

    fn execute_inner(
        &mut self,
        iter: &mut dyn RangeIter,
        key_only: bool,
        max_fetch_cnt: u64,
        max_bytes_rpc: i64,
        out_kvs: &mut Vec<KeyValue>,
    ) -> Result<bool> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| Error::Internal("configured instance lost its context".to_string()))?;

        if key_only {
            match ctx.plan.mode {
                ExecMode::Passthrough if ctx.plan.projection_needs_value_half => {
                    return Err(Error::BadRequest(
                        "key_only scan but the projection reads value columns".to_string(),
                    ));
                }
                ExecMode::Aggregate if ctx.plan.aggregation_needs_value_half => {
                    return Err(Error::BadRequest(
                        "key_only scan but the aggregation reads value columns".to_string(),
                    ));
                }
                _ => {}
            }
        }

        match ctx.plan.mode {
            ExecMode::Passthrough => {
                let (has_more, state) =
                    passthrough_page(ctx, iter, key_only, max_fetch_cnt, max_bytes_rpc, out_kvs)?;
                self.state = state;
                Ok(has_more)
            }
            ExecMode::Aggregate => {
                if self.state == CoprState::Ready {
                    scan_into_aggregator(ctx, iter, key_only)?;
                    let rows = ctx
                        .aggregator
                        .as_mut()
                        .ok_or_else(|| {
                            Error::Internal("aggregate plan without aggregator".to_string())
                        })?
                        .take_rows();
                    ctx.residue = rows.into();
                }
                let has_more = drain_residue(ctx, max_fetch_cnt, max_bytes_rpc, out_kvs)?;
                self.state = if has_more {
                    CoprState::Draining
                } else {
                    CoprState::Exhausted
                };
                Ok(has_more)
            }
        }
    }
}

impl Default for Coprocessor {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the emitted page already fills either budget.
fn budget_hit(rows: usize, max_fetch_cnt: u64, bytes: usize, max_bytes_rpc: i64) -> bool {
    if max_fetch_cnt > 0 && rows as u64 >= max_fetch_cnt {
        return true;
    }
    if max_bytes_rpc > 0 && bytes as i64 >= max_bytes_rpc {
        return true;
    }
    false
}

/// Emit one passthrough page. Budgets are checked before the cursor, so a
/// page cut short by a budget reports `has_more` without peeking at the
/// scan's end.
fn passthrough_page(
    ctx: &mut ExecContext,
    iter: &mut dyn RangeIter,
    key_only: bool,
    max_fetch_cnt: u64,
    max_bytes_rpc: i64,
    out_kvs: &mut Vec<KeyValue>,
) -> Result<(bool, CoprState)> {
    let mut page_bytes = 0usize;
    loop {
        if budget_hit(out_kvs.len(), max_fetch_cnt, page_bytes, max_bytes_rpc) {
            return Ok((true, CoprState::Ready));
        }
        if !iter.valid() {
            return Ok((false, CoprState::Exhausted));
        }

        let row = if key_only {
            ctx.decoder.decode_key(iter.key())?
        } else {
            let kv = KeyValue::new(iter.key().to_vec(), iter.value().to_vec());
            ctx.decoder.decode(&kv)?
        };
        let tuple: Vec<Datum> = ctx
            .plan
            .projection
            .iter()
            .map(|&logical| row[logical].clone())
            .collect();
        let encoded = ctx.encoder.encode(&tuple)?;
        page_bytes += encoded.encoded_len();
        out_kvs.push(encoded);

        iter.next()?;
    }
}

/// Consume the cursor to its end, folding every row into the aggregator.
fn scan_into_aggregator(
    ctx: &mut ExecContext,
    iter: &mut dyn RangeIter,
    key_only: bool,
) -> Result<()> {
    let aggregator = ctx
        .aggregator
        .as_mut()
        .ok_or_else(|| Error::Internal("aggregate plan without aggregator".to_string()))?;
    let mut scanned = 0u64;
    while iter.valid() {
        let row = if key_only {
            ctx.decoder.decode_key(iter.key())?
        } else {
            let kv = KeyValue::new(iter.key().to_vec(), iter.value().to_vec());
            ctx.decoder.decode(&kv)?
        };
        aggregator.accumulate(&row)?;
        scanned += 1;
        iter.next()?;
    }
    debug!(
        rows = scanned,
        groups = aggregator.group_count(),
        "aggregate scan complete"
    );
    Ok(())
}

/// Emit drained aggregate rows under the page budgets.
fn drain_residue(
    ctx: &mut ExecContext,
    max_fetch_cnt: u64,
    max_bytes_rpc: i64,
    out_kvs: &mut Vec<KeyValue>,
) -> Result<bool> {
    let mut page_bytes = 0usize;
    loop {
        if budget_hit(out_kvs.len(), max_fetch_cnt, page_bytes, max_bytes_rpc) {
            return Ok(!ctx.residue.is_empty());
        }
        let Some(tuple) = ctx.residue.pop_front() else {
            return Ok(false);
        };
        let encoded = ctx.encoder.encode(&tuple)?;
        page_bytes += encoded.encoded_len();
        out_kvs.push(encoded);
    }
}
