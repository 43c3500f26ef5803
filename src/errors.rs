//! Crate-wide error type. Follows the same shape as a hand-rolled kernel
//! error enum: no `thiserror`, a manual `Display`, and a `Result` alias used
//! everywhere instead of threading a generic error type through every
//! signature.

use std::fmt;

pub type BistraResult<T> = Result<T, BistraError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BistraError {
    /// A binary operator's operands did not have equal `ExprType`.
    TypeMismatch { op: &'static str, lhs: String, rhs: String },
    /// A load/store's index count did not match the argument's extent count.
    ArityMismatch { expected: usize, got: usize, context: &'static str },
    /// A load/store's last index did not have the same lane width as the
    /// loaded/stored value.
    WidthMismatch { context: &'static str, value_width: u32, index_width: u32 },
    /// A name did not match `[A-Za-z_][A-Za-z0-9_]*`.
    MalformedName(String),
    /// An `IndexExpr` referenced a `Loop` that is not a proper ancestor.
    LoopIndexOutOfScope(String),
    /// A `Loop`'s `end`/`stride` violated `end % stride == 0` or was <= 0.
    BadLoopBounds { end: u64, stride: u64 },
    /// A pragma or transform named a loop that does not exist in the program.
    UnknownLoop(String),
    /// A transform precondition failed; carries a human-readable reason.
    PreconditionFailed(&'static str),
    /// Bytecode stream did not start with the expected magic bytes.
    BadMagic([u8; 4]),
    /// Bytecode stream ended before a value could be fully decoded.
    UnexpectedEof,
    /// A table index in the bytecode stream pointed past the end of its table.
    BadTableIndex { table: &'static str, index: u32, len: usize },
    /// An unrecognized tag byte was found in the bytecode body.
    BadTag(u8),
    /// Wraps a lower-level I/O failure (file not found, etc).
    Io(String),
}

impl fmt::Display for BistraError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BistraError::TypeMismatch { op, lhs, rhs } => {
                write!(f, "type mismatch in `{}`: lhs has type {}, rhs has type {}", op, lhs, rhs)
            }
            BistraError::ArityMismatch { expected, got, context } => {
                write!(f, "{}: expected {} indices, got {}", context, expected, got)
            }
            BistraError::WidthMismatch { context, value_width, index_width } => {
                write!(f, "{}: value has width {}, last index has width {}", context, value_width, index_width)
            }
            BistraError::MalformedName(name) => {
                write!(f, "name {:?} does not match [A-Za-z_][A-Za-z0-9_]*", name)
            }
            BistraError::LoopIndexOutOfScope(name) => {
                write!(f, "IndexExpr references loop `{}`, which is not a proper ancestor", name)
            }
            BistraError::BadLoopBounds { end, stride } => {
                write!(f, "loop bounds end={} stride={} violate end %% stride == 0", end, stride)
            }
            BistraError::UnknownLoop(name) => write!(f, "no loop named `{}` in program", name),
            BistraError::PreconditionFailed(reason) => write!(f, "transform precondition failed: {}", reason),
            BistraError::BadMagic(got) => write!(f, "bad bytecode magic: {:?}", got),
            BistraError::UnexpectedEof => write!(f, "unexpected end of bytecode stream"),
            BistraError::BadTableIndex { table, index, len } => {
                write!(f, "{} table index {} out of range (len {})", table, index, len)
            }
            BistraError::BadTag(tag) => write!(f, "unrecognized node tag {}", tag),
            BistraError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for BistraError {}

impl From<std::io::Error> for BistraError {
    fn from(e: std::io::Error) -> Self {
        BistraError::Io(e.to_string())
    }
}

/// A verification violation found by `verify()`. Kept separate from
/// `BistraError` because these indicate a
/// bug in whichever transform just ran, not a user-facing error: a pass is
/// expected to leave the IR verified before handing off, so callers that
/// see this should treat it as an assertion failure, not a recoverable
/// condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyError(pub BistraError);

impl fmt::Display for VerifyError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "internal error: IR failed verification: {}", self.0)
    }
}

impl std::error::Error for VerifyError {}
