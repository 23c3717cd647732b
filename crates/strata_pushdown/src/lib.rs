//! Storage-side pushdown coprocessor.
//!
//! A query layer compiles a fragment (projection, group-by, aggregates)
//! into a [`Program`] and pushes it down to the storage node. The
//! [`Coprocessor`] consumes an ordered scan cursor, decodes and projects
//! rows, optionally aggregates them, and re-encodes the result as
//! key/value pairs chunked under caller-supplied row and byte budgets.

mod aggregate;
mod error;
mod executor;
mod plan;
mod program;

pub use error::{Error, Result};
pub use executor::Coprocessor;
pub use program::{AggKind, AggOperator, Program};
