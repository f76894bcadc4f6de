use std::io::Write;

use super::framing::CacheWriter;
use super::tag;
use crate::constant::Constant;
use crate::error::Result;
use crate::instruction::Operands;
use crate::program::Program;
use crate::CACHE_MAGIC;

/// Serialize a program, its constants and source map
///
/// # Panics
///
/// If a string, array or table is longer than `u32::MAX`, which the
/// format cannot represent.
pub fn write_program(program: &Program, version: u16) -> Vec<u8> {
    let mut w = CacheWriter::new();
    w.write_u32(CACHE_MAGIC);
    w.write_u16(version);

    w.write_str(&program.function_name);
    let source = &program.source;
    w.write_str(source.name());
    w.write_str(source.text());
    w.write_u32(source.last_scanned_offset());
    w.write_int_array(source.line_offsets());

    write_body(&mut w, program);
    w.into_vec()
}

/// Serialize a program into `sink`
///
/// Only sink I/O can fail.
pub fn write_program_to<W: Write>(program: &Program, version: u16, sink: &mut W) -> Result<()> {
    sink.write_all(&write_program(program, version))?;
    sink.flush()?;
    Ok(())
}

fn write_body(w: &mut CacheWriter, program: &Program) {
    w.write_len(program.code.len(), "instruction stream");
    for ins in &program.code {
        w.write_u8(ins.opcode().to_byte());
        write_operands(w, ins.operands());
    }

    w.write_len(program.constants.len(), "constant pool");
    for constant in program.constants.iter() {
        write_constant(w, constant);
    }

    w.write_len(program.source_map.len(), "source map");
    for entry in &program.source_map {
        w.write_u32(entry.pc);
        w.write_u32(entry.pos);
    }
}

fn write_operands(w: &mut CacheWriter, operands: Operands<'_>) {
    match operands {
        Operands::None => {}
        Operands::Constant(idx) => w.write_u32(idx.index()),
        Operands::Count(n) => w.write_u32(n),
        Operands::Stack(slot) => w.write_i32(slot.offset()),
        Operands::Local(idx) => w.write_u32(idx.index()),
        Operands::Jump(offset) => w.write_i32(offset.offset()),
        Operands::Name(name) => w.write_str(name),
        Operands::VarRef { name, slot } => {
            w.write_str(name);
            w.write_u32(slot);
        }
        Operands::GetVar {
            name,
            slot,
            is_ref,
            is_callee,
        } => {
            w.write_str(name);
            w.write_u32(slot);
            w.write_bool(is_ref);
            w.write_bool(is_callee);
        }
        Operands::ResolveVar {
            name,
            slot,
            kind,
            strict,
        } => {
            w.write_str(name);
            w.write_u32(slot);
            w.write_u8(kind.to_byte());
            w.write_bool(strict);
        }
        Operands::Frame { stack_size, args } => {
            w.write_u32(stack_size);
            w.write_u32(args);
        }
        Operands::Function {
            function,
            name,
            length,
            strict,
        } => {
            w.write_u32(function.index());
            w.write_str(name);
            w.write_u32(length);
            w.write_bool(strict);
        }
        Operands::Regexp { pattern, flags } => {
            w.write_str(pattern);
            w.write_str(flags);
        }
        Operands::Try {
            catch_offset,
            finally_offset,
            dynamic,
        } => {
            w.write_i32(catch_offset.offset());
            w.write_i32(finally_offset.offset());
            w.write_bool(dynamic);
        }
    }
}

fn write_constant(w: &mut CacheWriter, constant: &Constant) {
    match constant {
        Constant::Undefined => w.write_u8(tag::UNDEFINED),
        Constant::Null => w.write_u8(tag::NULL),
        Constant::Bool(b) => {
            w.write_u8(tag::BOOL);
            w.write_bool(*b);
        }
        Constant::Int(n) => {
            w.write_u8(tag::INT);
            w.write_u64(*n as u64);
        }
        Constant::Float(n) => {
            w.write_u8(tag::FLOAT);
            w.write_u64(n.to_bits());
        }
        Constant::String(s) => {
            w.write_u8(tag::STRING);
            w.write_str(s);
        }
        Constant::RegExp { pattern, flags } => {
            w.write_u8(tag::REGEXP);
            w.write_str(pattern);
            w.write_str(flags);
        }
        Constant::Function(nested) => {
            w.write_u8(tag::FUNCTION);
            w.write_str(&nested.function_name);
            write_body(w, nested);
        }
    }
}
