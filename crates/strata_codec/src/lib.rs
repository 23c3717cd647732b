//! Order-preserving row codec for StrataStore table rows.
//!
//! A table row is a tuple of six scalar kinds (bool, i32, i64, f32, f64,
//! byte string), each independently nullable. The codec splits a row into a
//! key half and a value half: key bytes preserve the lexicographic ordering
//! of the underlying values, so the storage engine's byte-ordered scan is a
//! sorted scan on the key columns; value bytes are compact, with a NULL
//! bitmap so absent columns occupy no space.

mod error;
mod key_codec;
mod record;
mod schema;
mod value;
mod value_codec;

pub use error::CodecError;
pub use record::{RecordDecoder, RecordEncoder, TABLE_PREFIX_LEN, TABLE_PREFIX_MAGIC};
pub use schema::{ColumnDesc, ColumnType, TableSchema};
pub use value::{Datum, Value};
pub use value_codec::encode_hashable_datum;
