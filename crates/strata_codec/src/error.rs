use thiserror::Error;

/// Errors produced while encoding or decoding rows.
#[derive(Debug, Error)]
pub enum CodecError {
    /// Schema is internally inconsistent (indices out of range, duplicates).
    #[error("bad schema: {0}")]
    BadSchema(String),
    /// Row arity does not match the schema's column count.
    #[error("bad arity: {0}")]
    BadArity(String),
    /// Datum kind or nullability violates the column descriptor.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Byte stream does not obey the codec.
    #[error("corrupt encoding: {0}")]
    Corrupt(String),
    /// On-disk schema version differs from the expected one.
    #[error("schema version skew: disk={disk}, expected={expected}")]
    VersionSkew { disk: u32, expected: u32 },
}
