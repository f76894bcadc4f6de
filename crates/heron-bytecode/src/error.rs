//! Cache codec errors

use std::fmt;

use thiserror::Error;

/// Errors that can occur while reading or writing a cache file
#[derive(Debug, Error)]
pub enum CacheError {
    /// The stream does not start with the cache magic number
    #[error("not a cache file: magic number mismatch")]
    NotACacheFile,

    /// The stream is a cache file, but written for another format version
    #[error("cache version mismatch: expected {expected}, found {found}")]
    VersionMismatch {
        /// Version the caller asked for
        expected: u16,
        /// Version recorded in the file
        found: u16,
    },

    /// The stream is structurally broken
    #[error("corrupt cache at offset {offset}: {reason}")]
    Corrupt {
        /// Byte offset where decoding stopped
        offset: usize,
        /// What was wrong at that offset
        reason: Corruption,
    },

    /// IO error on the underlying sink or source
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CacheError {
    /// Create a corruption error at the given offset
    pub fn corrupt(offset: usize, reason: Corruption) -> Self {
        Self::Corrupt { offset, reason }
    }

    /// Whether the caller can treat this as a cache miss and recompile
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Io(_))
    }
}

/// Structural defects found while decoding a cache stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Corruption {
    /// A fixed-width field ran past the end of the stream
    UnexpectedEnd {
        /// Bytes the field needed
        needed: usize,
        /// Bytes left in the stream
        remaining: usize,
    },
    /// A length or count prefix promises more data than the stream holds
    LengthOverflow {
        /// Minimum number of bytes the prefix implies
        declared: u64,
        /// Bytes left in the stream
        remaining: usize,
    },
    /// Opcode byte with no registered instruction
    UnknownOpcode(u8),
    /// Constant tag byte with no registered constant kind
    UnknownConstantTag(u8),
    /// Boolean field holding something other than 0 or 1
    InvalidBool(u8),
    /// Binding kind byte outside the known kinds
    InvalidBindingKind(u8),
    /// Text field that is not valid UTF-8
    InvalidUtf8,
    /// Function constants nested deeper than the reader accepts
    NestingTooDeep,
    /// Bytes left over after the program ended
    TrailingBytes(usize),
}

impl fmt::Display for Corruption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEnd { needed, remaining } => write!(
                f,
                "unexpected end of stream ({needed} bytes needed, {remaining} left)"
            ),
            Self::LengthOverflow {
                declared,
                remaining,
            } => write!(
                f,
                "declared size {declared} exceeds the {remaining} remaining bytes"
            ),
            Self::UnknownOpcode(byte) => write!(f, "unknown opcode 0x{byte:02X}"),
            Self::UnknownConstantTag(byte) => write!(f, "unknown constant tag 0x{byte:02X}"),
            Self::InvalidBool(byte) => write!(f, "invalid boolean byte {byte}"),
            Self::InvalidBindingKind(byte) => write!(f, "invalid binding kind {byte}"),
            Self::InvalidUtf8 => f.write_str("text field is not valid UTF-8"),
            Self::NestingTooDeep => f.write_str("function constants nested too deeply"),
            Self::TrailingBytes(count) => write!(f, "{count} trailing bytes after program"),
        }
    }
}

/// Result type for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;
