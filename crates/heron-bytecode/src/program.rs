//! Compiled program representation

use std::fmt::{self, Write as _};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constant::{Constant, ConstantPool};
use crate::instruction::Instruction;
use crate::source::{Position, SourceFile};

/// Maps an instruction index to a byte offset in the source text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceMapEntry {
    /// Instruction index
    pub pc: u32,
    /// Byte offset into the source text
    pub pos: u32,
}

/// A compiled script or function body
///
/// Nested function bodies live in the constant pool as
/// [`Constant::Function`] and share the source file of the program that
/// declares them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Function name (empty for the top-level script)
    pub function_name: String,

    /// Source the program was compiled from
    pub source: Arc<SourceFile>,

    /// Instructions; the index is the program counter
    pub code: Vec<Instruction>,

    /// Constants referenced by index from `code`
    pub constants: ConstantPool,

    /// Source positions of selected instructions, ordered by `pc`
    pub source_map: Vec<SourceMapEntry>,
}

/// A broken cross-reference inside a program
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReferenceError {
    /// Jump target outside `[0, len(code)]`
    #[error("{function}: instruction {pc} jumps outside the code ({target})")]
    JumpOutOfRange {
        /// Function holding the instruction
        function: String,
        /// Index of the jumping instruction
        pc: usize,
        /// Computed target
        target: i64,
    },
    /// Constant index outside the pool
    #[error("{function}: instruction {pc} refers to missing constant {index}")]
    ConstantOutOfRange {
        /// Function holding the instruction
        function: String,
        /// Index of the instruction
        pc: usize,
        /// Referenced slot
        index: u32,
    },
    /// `NewFunc` pointing at a constant that is not a function body
    #[error("{function}: instruction {pc} expects a function at constant {index}")]
    NotAFunction {
        /// Function holding the instruction
        function: String,
        /// Index of the instruction
        pc: usize,
        /// Referenced slot
        index: u32,
    },
}

impl Program {
    /// Create a new program builder
    pub fn builder(source: Arc<SourceFile>) -> ProgramBuilder {
        ProgramBuilder::new(source)
    }

    /// Get the function name or `<script>` for the top level
    pub fn display_name(&self) -> &str {
        if self.function_name.is_empty() {
            "<script>"
        } else {
            &self.function_name
        }
    }

    /// Source position recorded for the instruction at `pc`, or for the
    /// closest preceding mapped instruction
    pub fn position_of(&self, pc: u32) -> Option<Position> {
        let idx = match self.source_map.binary_search_by_key(&pc, |entry| entry.pc) {
            Ok(idx) => idx,
            Err(0) => return None,
            Err(idx) => idx - 1,
        };
        Some(self.source.position(self.source_map[idx].pos))
    }

    /// Function bodies declared directly by this program
    pub fn nested_functions(&self) -> impl Iterator<Item = &Arc<Program>> {
        self.constants.iter().filter_map(Constant::as_function)
    }

    /// Check jump targets and constant references, recursively.
    ///
    /// The compiler guarantees these; the cache reader does not re-check
    /// them. This is for tooling that wants to inspect an untrusted program.
    pub fn check_references(&self) -> Result<(), ReferenceError> {
        let len = self.code.len() as i64;
        for (pc, ins) in self.code.iter().enumerate() {
            for offset in ins.jump_offsets() {
                let target = pc as i64 + i64::from(offset.offset());
                if !(0..=len).contains(&target) {
                    return Err(ReferenceError::JumpOutOfRange {
                        function: self.display_name().to_string(),
                        pc,
                        target,
                    });
                }
            }

            let Some(idx) = ins.constant_ref() else {
                continue;
            };
            let constant =
                self.constants
                    .get(idx.index())
                    .ok_or_else(|| ReferenceError::ConstantOutOfRange {
                        function: self.display_name().to_string(),
                        pc,
                        index: idx.index(),
                    })?;
            if matches!(ins, Instruction::NewFunc { .. }) && constant.as_function().is_none() {
                return Err(ReferenceError::NotAFunction {
                    function: self.display_name().to_string(),
                    pc,
                    index: idx.index(),
                });
            }
        }

        for nested in self.nested_functions() {
            nested.check_references()?;
        }
        Ok(())
    }

    /// Human-readable listing of this program and its nested functions
    pub fn disassemble(&self) -> String {
        let mut out = String::new();
        self.disassemble_into(&mut out, 0);
        out
    }

    fn disassemble_into(&self, out: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = writeln!(
            out,
            "{indent}function {} ({} instructions, {} constants)",
            self.display_name(),
            self.code.len(),
            self.constants.len()
        );

        let mut map = self.source_map.iter().peekable();
        for (pc, ins) in self.code.iter().enumerate() {
            let mut line = format!("{indent}  {pc:>5}: {ins}");
            while let Some(entry) = map.next_if(|entry| entry.pc as usize <= pc) {
                if entry.pc as usize == pc {
                    let position = self.source.position(entry.pos);
                    let _ = write!(line, "  ; {}:{}", position.line, position.column);
                }
            }
            let _ = writeln!(out, "{line}");
        }

        for (idx, constant) in self.constants.iter().enumerate() {
            match constant {
                Constant::Function(nested) => {
                    let _ = writeln!(out, "{indent}  const #{idx}:");
                    nested.disassemble_into(out, depth + 2);
                }
                other => {
                    let _ = writeln!(out, "{indent}  const #{idx}: {}", ConstantDisplay(other));
                }
            }
        }
    }
}

struct ConstantDisplay<'a>(&'a Constant);

impl fmt::Display for ConstantDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Constant::Undefined => f.write_str("undefined"),
            Constant::Null => f.write_str("null"),
            Constant::Bool(b) => write!(f, "{b}"),
            Constant::Int(n) => write!(f, "{n}"),
            Constant::Float(n) => write!(f, "{n:?}"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::RegExp { pattern, flags } => write!(f, "/{pattern}/{flags}"),
            Constant::Function(program) => write!(f, "<function {}>", program.display_name()),
        }
    }
}

/// Builder for creating programs
#[derive(Debug)]
pub struct ProgramBuilder {
    function_name: String,
    source: Arc<SourceFile>,
    code: Vec<Instruction>,
    constants: ConstantPool,
    source_map: Vec<SourceMapEntry>,
}

impl ProgramBuilder {
    /// Create a new program builder
    pub fn new(source: Arc<SourceFile>) -> Self {
        Self {
            function_name: String::new(),
            source,
            code: Vec::new(),
            constants: ConstantPool::new(),
            source_map: Vec::new(),
        }
    }

    /// Set function name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.function_name = name.into();
        self
    }

    /// Append an instruction
    pub fn instruction(mut self, instruction: Instruction) -> Self {
        self.code.push(instruction);
        self
    }

    /// Append an instruction and record its source offset
    pub fn instruction_at(mut self, instruction: Instruction, pos: u32) -> Self {
        self.source_map.push(SourceMapEntry {
            pc: self.code.len() as u32,
            pos,
        });
        self.code.push(instruction);
        self
    }

    /// Append a constant without deduplication
    pub fn constant(mut self, constant: Constant) -> Self {
        self.constants.push(constant);
        self
    }

    /// Get mutable reference to constant pool
    pub fn constants_mut(&mut self) -> &mut ConstantPool {
        &mut self.constants
    }

    /// Start a nested function body sharing this builder's source
    pub fn nested(&self, name: impl Into<String>) -> ProgramBuilder {
        ProgramBuilder::new(Arc::clone(&self.source)).name(name)
    }

    /// Build the program
    pub fn build(self) -> Program {
        Program {
            function_name: self.function_name,
            source: self.source,
            code: self.code,
            constants: self.constants,
            source_map: self.source_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operand::{ConstantIndex, JumpOffset};

    fn source() -> Arc<SourceFile> {
        Arc::new(SourceFile::new("test.js", "x = 1;\nf(x);"))
    }

    #[test]
    fn test_position_of() {
        let program = Program::builder(source())
            .instruction_at(Instruction::LoadVal { idx: ConstantIndex(0) }, 4)
            .instruction(Instruction::Pop)
            .instruction_at(Instruction::GetVar1 { name: "f".into() }, 7)
            .constant(Constant::Int(1))
            .build();

        assert_eq!(program.position_of(0), Some(Position { line: 1, column: 5 }));
        assert_eq!(program.position_of(1), Some(Position { line: 1, column: 5 }));
        assert_eq!(program.position_of(2), Some(Position { line: 2, column: 1 }));

        let unmapped = Program::builder(source()).instruction(Instruction::Ret).build();
        assert_eq!(unmapped.position_of(0), None);
    }

    #[test]
    fn test_check_references() {
        let good = Program::builder(source())
            .instruction(Instruction::Jeq1 { offset: JumpOffset(2) })
            .instruction(Instruction::LoadVal { idx: ConstantIndex(0) })
            .constant(Constant::Int(1))
            .build();
        assert_eq!(good.check_references(), Ok(()));

        let bad_jump = Program::builder(source())
            .instruction(Instruction::Jump { offset: JumpOffset(-1) })
            .build();
        assert!(matches!(
            bad_jump.check_references(),
            Err(ReferenceError::JumpOutOfRange { pc: 0, target: -1, .. })
        ));

        let bad_constant = Program::builder(source())
            .instruction(Instruction::LoadVal { idx: ConstantIndex(3) })
            .build();
        assert!(matches!(
            bad_constant.check_references(),
            Err(ReferenceError::ConstantOutOfRange { index: 3, .. })
        ));
    }

    #[test]
    fn test_check_references_nested() {
        let outer = Program::builder(source());
        let inner = outer
            .nested("f")
            .instruction(Instruction::Jump { offset: JumpOffset(9) })
            .build();
        let program = outer
            .constant(Constant::function(inner))
            .instruction(Instruction::NewFunc {
                function: ConstantIndex(0),
                name: "f".into(),
                length: 0,
                strict: false,
            })
            .build();

        let err = program.check_references().unwrap_err();
        assert!(err.to_string().starts_with("f: instruction 0"));
    }

    #[test]
    fn test_new_func_requires_function_constant() {
        let program = Program::builder(source())
            .constant(Constant::string("nope"))
            .instruction(Instruction::NewFunc {
                function: ConstantIndex(0),
                name: "g".into(),
                length: 1,
                strict: true,
            })
            .build();
        assert!(matches!(
            program.check_references(),
            Err(ReferenceError::NotAFunction { index: 0, .. })
        ));
    }

    #[test]
    fn test_disassemble() {
        let program = Program::builder(source())
            .name("main")
            .instruction_at(Instruction::LoadVal { idx: ConstantIndex(0) }, 4)
            .instruction(Instruction::Ret)
            .constant(Constant::Int(1))
            .build();

        let listing = program.disassemble();
        assert!(listing.contains("function main (2 instructions, 1 constants)"));
        assert!(listing.contains("0: LoadVal #0  ; 1:5"));
        assert!(listing.contains("1: Ret"));
        assert!(listing.contains("const #0: 1"));
    }
}
