use std::io::Read;
use std::sync::Arc;

use super::framing::CacheReader;
use super::{CacheHeader, HEADER_LEN, tag};
use crate::constant::{Constant, ConstantPool};
use crate::error::{CacheError, Corruption, Result};
use crate::instruction::{BindingKind, Instruction, Opcode, OperandShape, Operands};
use crate::operand::{ConstantIndex, JumpOffset, LocalIndex, StackOffset};
use crate::program::{Program, SourceMapEntry};
use crate::source::SourceFile;
use crate::{CACHE_MAGIC, MAX_NESTING_DEPTH};

/// Upper bound on up-front reservations for declared counts. Nested
/// function constants recurse before their enclosing count is backed by
/// data, so a declared count alone never sizes an allocation.
const PREALLOC_LIMIT: usize = 1024;

/// Peek at the magic and version without decoding the body
pub fn read_header(bytes: &[u8]) -> Result<CacheHeader> {
    let magic = CACHE_MAGIC.to_be_bytes();
    if bytes.len() < magic.len() {
        // A cut-off cache still starts with the magic
        return if magic.starts_with(bytes) {
            Err(CacheError::corrupt(
                0,
                Corruption::UnexpectedEnd {
                    needed: HEADER_LEN,
                    remaining: bytes.len(),
                },
            ))
        } else {
            Err(CacheError::NotACacheFile)
        };
    }

    let mut r = CacheReader::at(bytes, 0);
    if r.read_u32()? != CACHE_MAGIC {
        return Err(CacheError::NotACacheFile);
    }
    let version = r.read_u16()?;
    Ok(CacheHeader {
        magic: CACHE_MAGIC,
        version,
    })
}

/// Decode a program written with `expected_version`
///
/// All or nothing: either the whole buffer decodes into a program or an
/// error describes the first problem found.
pub fn read_program(bytes: &[u8], expected_version: u16) -> Result<Program> {
    let header = read_header(bytes)?;
    if header.version != expected_version {
        return Err(CacheError::VersionMismatch {
            expected: expected_version,
            found: header.version,
        });
    }

    let mut r = CacheReader::at(bytes, HEADER_LEN);
    let function_name = r.read_str()?.to_owned();
    let name = r.read_str()?;
    let text = r.read_str()?;
    let last_scanned_offset = r.read_u32()?;
    let line_offsets = r.read_int_array()?;
    let source = Arc::new(SourceFile::from_parts(
        name,
        text,
        last_scanned_offset,
        line_offsets,
    ));

    let program = read_body(&mut r, function_name, &source, 0)?;
    r.finish()?;
    Ok(program)
}

/// Drain `reader` and decode its contents
pub fn read_program_from<R: Read>(mut reader: R, expected_version: u16) -> Result<Program> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;
    read_program(&bytes, expected_version)
}

fn read_body(
    r: &mut CacheReader<'_>,
    function_name: String,
    source: &Arc<SourceFile>,
    depth: usize,
) -> Result<Program> {
    // Every instruction is at least its opcode byte
    let count = r.read_count(1)?;
    let mut code = Vec::with_capacity(count.min(PREALLOC_LIMIT));
    for _ in 0..count {
        code.push(read_instruction(r)?);
    }

    let count = r.read_count(1)?;
    let mut constants = ConstantPool::with_capacity(count.min(PREALLOC_LIMIT));
    for _ in 0..count {
        constants.push(read_constant(r, source, depth)?);
    }

    let count = r.read_count(8)?;
    let mut source_map = Vec::with_capacity(count.min(PREALLOC_LIMIT));
    for _ in 0..count {
        source_map.push(SourceMapEntry {
            pc: r.read_u32()?,
            pos: r.read_u32()?,
        });
    }

    Ok(Program {
        function_name,
        source: Arc::clone(source),
        code,
        constants,
        source_map,
    })
}

fn read_instruction(r: &mut CacheReader<'_>) -> Result<Instruction> {
    let at = r.offset();
    let byte = r.read_u8()?;
    let opcode = Opcode::from_byte(byte)
        .ok_or_else(|| CacheError::corrupt(at, Corruption::UnknownOpcode(byte)))?;
    let operands = read_operands(r, opcode.operand_shape())?;
    // Shapes come from the opcode itself, so this only fails if the
    // registry disagrees with `Instruction::from_parts`
    Instruction::from_parts(opcode, operands)
        .ok_or_else(|| CacheError::corrupt(at, Corruption::UnknownOpcode(byte)))
}

fn read_operands<'a>(r: &mut CacheReader<'a>, shape: OperandShape) -> Result<Operands<'a>> {
    let operands = match shape {
        OperandShape::None => Operands::None,
        OperandShape::Constant => Operands::Constant(ConstantIndex(r.read_u32()?)),
        OperandShape::Count => Operands::Count(r.read_u32()?),
        OperandShape::Stack => Operands::Stack(StackOffset(r.read_i32()?)),
        OperandShape::Local => Operands::Local(LocalIndex(r.read_u32()?)),
        OperandShape::Jump => Operands::Jump(JumpOffset(r.read_i32()?)),
        OperandShape::Name => Operands::Name(r.read_str()?),
        OperandShape::VarRef => Operands::VarRef {
            name: r.read_str()?,
            slot: r.read_u32()?,
        },
        OperandShape::GetVar => Operands::GetVar {
            name: r.read_str()?,
            slot: r.read_u32()?,
            is_ref: r.read_bool()?,
            is_callee: r.read_bool()?,
        },
        OperandShape::ResolveVar => {
            let name = r.read_str()?;
            let slot = r.read_u32()?;
            let at = r.offset();
            let byte = r.read_u8()?;
            let kind = BindingKind::from_byte(byte)
                .ok_or_else(|| CacheError::corrupt(at, Corruption::InvalidBindingKind(byte)))?;
            Operands::ResolveVar {
                name,
                slot,
                kind,
                strict: r.read_bool()?,
            }
        }
        OperandShape::Frame => Operands::Frame {
            stack_size: r.read_u32()?,
            args: r.read_u32()?,
        },
        OperandShape::Function => Operands::Function {
            function: ConstantIndex(r.read_u32()?),
            name: r.read_str()?,
            length: r.read_u32()?,
            strict: r.read_bool()?,
        },
        OperandShape::Regexp => Operands::Regexp {
            pattern: r.read_str()?,
            flags: r.read_str()?,
        },
        OperandShape::Try => Operands::Try {
            catch_offset: JumpOffset(r.read_i32()?),
            finally_offset: JumpOffset(r.read_i32()?),
            dynamic: r.read_bool()?,
        },
    };
    Ok(operands)
}

fn read_constant(
    r: &mut CacheReader<'_>,
    source: &Arc<SourceFile>,
    depth: usize,
) -> Result<Constant> {
    let at = r.offset();
    let constant = match r.read_u8()? {
        tag::UNDEFINED => Constant::Undefined,
        tag::NULL => Constant::Null,
        tag::BOOL => Constant::Bool(r.read_bool()?),
        tag::INT => Constant::Int(r.read_u64()? as i64),
        tag::FLOAT => Constant::Float(f64::from_bits(r.read_u64()?)),
        tag::STRING => Constant::string(r.read_str()?),
        tag::REGEXP => {
            let pattern = r.read_str()?;
            let flags = r.read_str()?;
            Constant::regexp(pattern, flags)
        }
        tag::FUNCTION => {
            if depth + 1 > MAX_NESTING_DEPTH {
                return Err(CacheError::corrupt(at, Corruption::NestingTooDeep));
            }
            let function_name = r.read_str()?.to_owned();
            Constant::function(read_body(r, function_name, source, depth + 1)?)
        }
        other => return Err(CacheError::corrupt(at, Corruption::UnknownConstantTag(other))),
    };
    Ok(constant)
}
