//! Binary cache format for compiled programs
//!
//! Layout (big-endian throughout):
//!
//! ```text
//! magic u32 | version u16 | function_name | source name | source text
//! | last_scanned_offset u32 | line_offsets | code | constants | source map
//! ```
//!
//! Nested function bodies, stored as function constants, repeat
//! `function_name | code | constants | source map` and share the top-level
//! source.

mod framing;
mod reader;
mod writer;

pub use reader::{read_header, read_program, read_program_from};
pub use writer::{write_program, write_program_to};

/// Constant tags on the wire
pub(crate) mod tag {
    pub const UNDEFINED: u8 = 0;
    pub const NULL: u8 = 1;
    pub const BOOL: u8 = 2;
    pub const INT: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const STRING: u8 = 5;
    pub const REGEXP: u8 = 6;
    pub const FUNCTION: u8 = 7;
}

/// Size of magic plus version
pub const HEADER_LEN: usize = 6;

/// Fixed prefix of every cache file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheHeader {
    /// Always [`CACHE_MAGIC`](crate::CACHE_MAGIC) once read successfully
    pub magic: u32,
    /// Format version the file was written with
    pub version: u16,
}
