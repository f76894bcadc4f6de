//! # Heron Bytecode
//!
//! Compiled-program representation and persistent cache format for the Heron
//! script engine.
//!
//! ## Layout
//!
//! - [`instruction`]: the closed instruction set and its opcode registry
//! - [`program`]: programs, source maps and the builder used by the compiler
//! - [`codec`]: big-endian framing plus the program writer/reader pair
//! - [`store`]: a directory of cache files keyed by source content
//!
//! A cache file is only ever accepted whole: the reader either returns a fully
//! reconstructed [`Program`] or a [`CacheError`] explaining why it refused.

#![warn(clippy::all)]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod codec;
pub mod constant;
pub mod error;
pub mod instruction;
pub mod operand;
pub mod program;
pub mod source;
pub mod store;

pub use codec::{
    CacheHeader, read_header, read_program, read_program_from, write_program, write_program_to,
};
pub use constant::{Constant, ConstantPool};
pub use error::{CacheError, Corruption, Result};
pub use instruction::{BindingKind, Instruction, Opcode, OperandShape, Operands};
pub use operand::{ConstantIndex, JumpOffset, LocalIndex, StackOffset};
pub use program::{Program, ProgramBuilder, ReferenceError, SourceMapEntry};
pub use source::{Position, SourceFile};
pub use store::{CacheStore, StoreError};

/// Magic number opening every cache file of this format family
pub const CACHE_MAGIC: u32 = 0xFFEE_DD00;

/// Format version used when the embedder has no build identity of its own
pub const DEFAULT_FORMAT_VERSION: u16 = 1;

/// Deepest chain of nested function constants the reader accepts
pub const MAX_NESTING_DEPTH: usize = 256;
