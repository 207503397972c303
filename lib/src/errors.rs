use std::fmt::{Display, Formatter};
use std::io;

use thiserror::Error;

/// Error returned while parsing a pattern.
///
/// `offset` is the byte offset within the pattern of the first offending
/// character. Parsing stops at the first error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub struct SyntaxError {
    /// Byte offset within the pattern.
    pub offset: usize,
    /// Description of the problem.
    pub message: String,
}

impl SyntaxError {
    pub(crate) fn new<M: Into<String>>(offset: usize, message: M) -> Self {
        Self { offset, message: message.into() }
    }
}

impl Display for SyntaxError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "syntax error at offset {}: {}", self.offset, self.message)
    }
}

/// Error returned while compiling a canonicalized tree into a program.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// The program references more distinct character classes than the
    /// VM supports.
    #[error("too many distinct character classes: {count} (limit {limit})")]
    StateOverflow { count: usize, limit: usize },

    /// The program has more instructions than the VM supports.
    #[error("program too large: {size} instructions (limit {limit})")]
    TooLarge { size: usize, limit: usize },

    /// The tree still contains class nodes that were not canonicalized.
    #[error("`{kind}` node must be canonicalized before compiling")]
    NotCanonical { kind: &'static str },
}

/// Non-fatal errors found while executing a program.
///
/// These never abort a scan. The threads that needed the offending input
/// are dropped and the error is reported as a diagnostic.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeError {
    /// The input at `offset` is not valid UTF-8, or a multi-byte character
    /// is cut by the end of the input.
    #[error("invalid character boundary at offset {offset}")]
    InvalidBoundary { offset: usize },
}

/// Errors returned by the scanner.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    /// The cursor was created for a different program.
    #[error("cursor belongs to program {found:#018x}, not {expected:#018x}")]
    ProgramMismatch { expected: u64, found: u64 },

    /// Sector scanning requires a stride of at least one byte.
    #[error("invalid sector: stride must be greater than zero")]
    InvalidSector,

    /// The VM state stored in the cursor can't be executed by the program.
    #[error("cursor state doesn't fit program {program:#018x}")]
    CorruptedCursor { program: u64 },
}

/// Error returned by [`crate::ScanCursor::serialize_into`] and
/// [`crate::ScanCursor::deserialize_from`].
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("not a serialized scan cursor")]
    InvalidFormat,

    #[error("invalid serialized scan cursor")]
    InvalidEncoding(#[from] bincode::Error),

    #[error(transparent)]
    IoError(#[from] io::Error),
}

/// Errors returned while building a [`crate::Regex`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error(transparent)]
    SyntaxError(#[from] SyntaxError),

    #[error(transparent)]
    CompileError(#[from] CompileError),

    #[error(transparent)]
    ScanError(#[from] ScanError),
}
