use strata_codec::CodecError;
use strata_engine::EngineError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Coprocessor error taxonomy.
///
/// `Open`-time errors leave the instance unconfigured; `Execute`-time
/// errors fault it until `close` + `open`.
#[derive(Debug, Error)]
pub enum Error {
    /// The program is internally inconsistent.
    #[error("bad schema: {0}")]
    BadSchema(String),
    /// Row arity violates the schema.
    #[error("bad arity: {0}")]
    BadArity(String),
    /// Datum kind or nullability violates the schema.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),
    /// Stored bytes do not obey the codec.
    #[error("corrupt encoding: {0}")]
    Corrupt(String),
    /// On-disk schema version differs from the program's.
    #[error("schema version skew: disk={disk}, expected={expected}")]
    VersionSkew { disk: u32, expected: u32 },
    /// 64-bit integer aggregate overflow.
    #[error("arithmetic overflow: {0}")]
    ArithmeticOverflow(String),
    /// Runtime misuse of a configured instance.
    #[error("bad request: {0}")]
    BadRequest(String),
    /// The cursor was terminated externally.
    #[error("cancelled: {0}")]
    Cancelled(String),
    /// Any other fault.
    #[error("internal: {0}")]
    Internal(String),
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        match err {
            CodecError::BadSchema(msg) => Error::BadSchema(msg),
            CodecError::BadArity(msg) => Error::BadArity(msg),
            CodecError::TypeMismatch(msg) => Error::TypeMismatch(msg),
            CodecError::Corrupt(msg) => Error::Corrupt(msg),
            CodecError::VersionSkew { disk, expected } => Error::VersionSkew { disk, expected },
        }
    }
}

impl From<EngineError> for Error {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Closed => Error::Cancelled("cursor closed".to_string()),
            EngineError::Storage(msg) => Error::Internal(msg),
        }
    }
}
