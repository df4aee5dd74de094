use thiserror::Error;

/// Errors produced while writing or reading minnow files.
#[derive(Debug, Error)]
pub enum MinnowError {
    /// The underlying stream failed to create, write, read, or seek.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A block's shape or element type does not match its group's layout.
    #[error("encoding error: {0}")]
    Encoding(String),

    /// The writer was driven in an order its state machine does not allow.
    #[error("usage error: {0}")]
    Usage(#[from] UsageError),

    /// A group reported byte counts that differ from what it actually emitted.
    #[error("group contract violated: {0}")]
    Contract(String),

    /// The bytes on disk are not a finished minnow file.
    #[error("invalid minnow file: {0}")]
    Format(String),

    #[error("{kind} index {index} out of range (total {count})")]
    OutOfRange {
        kind: &'static str,
        index: u64,
        count: u64,
    },
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum UsageError {
    #[error("data block written before any group was opened")]
    NoGroupOpen,

    #[error("writer is unusable after an earlier I/O failure")]
    Poisoned,
}

pub type Result<T> = std::result::Result<T, MinnowError>;
