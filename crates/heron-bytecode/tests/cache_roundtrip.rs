//! Round trips of compiled programs through the binary cache format.

use std::sync::Arc;

use heron_bytecode::{
    BindingKind, CacheError, Constant, ConstantIndex, Instruction, JumpOffset, LocalIndex,
    Opcode, OperandShape, Operands, Program, SourceFile, StackOffset, read_header,
    read_program, write_program,
};
use pretty_assertions::assert_eq;

/// `1+1` as the compiler emits it: both operands loaded from the pool
fn one_plus_one() -> Program {
    Program::builder(Arc::new(SourceFile::new("test.js", "1+1")))
        .name("main")
        .constant(Constant::Int(1))
        .constant(Constant::Int(1))
        .instruction(Instruction::LoadVal {
            idx: ConstantIndex(0),
        })
        .instruction(Instruction::LoadVal {
            idx: ConstantIndex(1),
        })
        .instruction(Instruction::Add)
        .instruction(Instruction::Ret)
        .build()
}

/// Operand payload of `shape` with values derived from `seed`
fn sample_operands(shape: OperandShape, seed: u32, name: &str) -> Operands<'_> {
    let offset = JumpOffset(-(seed as i32) - 1);
    match shape {
        OperandShape::None => Operands::None,
        OperandShape::Constant => Operands::Constant(ConstantIndex(seed)),
        OperandShape::Count => Operands::Count(u32::MAX - seed),
        OperandShape::Stack => Operands::Stack(StackOffset(-(seed as i32))),
        OperandShape::Local => Operands::Local(LocalIndex(seed)),
        OperandShape::Jump => Operands::Jump(offset),
        OperandShape::Name => Operands::Name(name),
        OperandShape::VarRef => Operands::VarRef {
            name,
            slot: (seed << 16) | 1,
        },
        OperandShape::GetVar => Operands::GetVar {
            name,
            slot: seed,
            is_ref: seed % 2 == 0,
            is_callee: seed % 3 == 0,
        },
        OperandShape::ResolveVar => Operands::ResolveVar {
            name,
            slot: seed,
            kind: BindingKind::Let,
            strict: seed % 2 == 1,
        },
        OperandShape::Frame => Operands::Frame {
            stack_size: seed + 8,
            args: seed % 4,
        },
        OperandShape::Function => Operands::Function {
            function: ConstantIndex(seed),
            name,
            length: seed % 5,
            strict: true,
        },
        OperandShape::Regexp => Operands::Regexp {
            pattern: name,
            flags: "gimsuy",
        },
        OperandShape::Try => Operands::Try {
            catch_offset: JumpOffset(seed as i32),
            finally_offset: offset,
            dynamic: seed % 2 == 0,
        },
    }
}

/// One instruction of every operand layout, including edge values
fn every_shape() -> Vec<Instruction> {
    vec![
        Instruction::LoadVal {
            idx: ConstantIndex(0),
        },
        Instruction::DupN { n: u32::MAX },
        Instruction::LoadStack {
            slot: StackOffset(-2),
        },
        Instruction::SetLocalP {
            idx: LocalIndex(7),
        },
        Instruction::Jneq1 {
            offset: JumpOffset(i32::MIN),
        },
        Instruction::GetProp { name: "".into() },
        Instruction::SetVarStrict {
            name: "ünïcödé".into(),
            slot: 0x0002_0001,
        },
        Instruction::GetVar {
            name: "x".into(),
            slot: 3,
            is_ref: true,
            is_callee: false,
        },
        Instruction::ResolveVar {
            name: "y".into(),
            slot: 4,
            kind: BindingKind::Let,
            strict: true,
        },
        Instruction::EnterFuncStashless {
            stack_size: 12,
            args: 3,
        },
        Instruction::NewFunc {
            function: ConstantIndex(1),
            name: "inner".into(),
            length: 2,
            strict: false,
        },
        Instruction::NewRegexp {
            pattern: "^a+$".into(),
            flags: "gi".into(),
        },
        Instruction::Try {
            catch_offset: JumpOffset(3),
            finally_offset: JumpOffset(-1),
            dynamic: true,
        },
        Instruction::Ret,
    ]
}

#[test]
fn test_one_plus_one_round_trip() {
    let program = one_plus_one();
    let bytes = write_program(&program, 1);

    assert_eq!(&bytes[..4], &[0xFF, 0xEE, 0xDD, 0x00]);
    assert_eq!(&bytes[4..6], &[0x00, 0x01]);

    let decoded = read_program(&bytes, 1).unwrap();
    assert_eq!(decoded.function_name, "main");
    assert_eq!(decoded.source.name(), "test.js");
    assert_eq!(decoded.source.text(), "1+1");
    assert_eq!(
        decoded.code,
        vec![
            Instruction::LoadVal {
                idx: ConstantIndex(0)
            },
            Instruction::LoadVal {
                idx: ConstantIndex(1)
            },
            Instruction::Add,
            Instruction::Ret,
        ]
    );
    assert_eq!(decoded.constants.len(), 2);
    assert_eq!(decoded.constants.get(0), Some(&Constant::Int(1)));
    assert_eq!(decoded.constants.get(1), Some(&Constant::Int(1)));
    assert_eq!(decoded, program);
}

#[test]
fn test_version_gate() {
    let bytes = write_program(&one_plus_one(), 1);
    let err = read_program(&bytes, 2).unwrap_err();
    assert!(matches!(
        err,
        CacheError::VersionMismatch {
            expected: 2,
            found: 1
        }
    ));
    assert!(err.is_recoverable());
}

#[test]
fn test_magic_gate() {
    let mut bytes = write_program(&one_plus_one(), 1);
    bytes[0] = 0x00;
    assert!(matches!(
        read_program(&bytes, 1),
        Err(CacheError::NotACacheFile)
    ));
}

#[test]
fn test_empty_program() {
    let program = Program::builder(Arc::new(SourceFile::new("", ""))).build();
    let decoded = read_program(&write_program(&program, 9), 9).unwrap();
    assert_eq!(decoded, program);
    assert!(decoded.code.is_empty());
}

#[test]
fn test_every_operand_shape() {
    let source = Arc::new(SourceFile::new("shapes.js", "function inner(a, b) {}\n/^a+$/gi"));
    let root = Program::builder(Arc::clone(&source));
    let inner = root.nested("inner").instruction(Instruction::Ret).build();

    let mut builder = root
        .name("shapes")
        .constant(Constant::Int(-5))
        .constant(Constant::function(inner));
    for ins in every_shape() {
        builder = builder.instruction(ins);
    }
    let program = builder.build();

    let shapes: Vec<OperandShape> = program
        .code
        .iter()
        .map(|ins| ins.opcode().operand_shape())
        .collect();
    for shape in [
        OperandShape::None,
        OperandShape::Constant,
        OperandShape::Count,
        OperandShape::Stack,
        OperandShape::Local,
        OperandShape::Jump,
        OperandShape::Name,
        OperandShape::VarRef,
        OperandShape::GetVar,
        OperandShape::ResolveVar,
        OperandShape::Frame,
        OperandShape::Function,
        OperandShape::Regexp,
        OperandShape::Try,
    ] {
        assert!(shapes.contains(&shape), "missing {shape:?}");
    }

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(decoded, program);
}

#[test]
fn test_every_nullary_opcode() {
    let mut builder = Program::builder(Arc::new(SourceFile::new("ops.js", "")));
    for &op in Opcode::ALL {
        if op.operand_shape() == OperandShape::None {
            let ins = Instruction::from_parts(op, Operands::None).unwrap();
            builder = builder.instruction(ins);
        }
    }
    let program = builder.build();

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(decoded.code, program.code);
}

#[test]
fn test_every_opcode_with_operands() {
    let mut builder = Program::builder(Arc::new(SourceFile::new("ops.js", "")));
    let mut expected = Vec::new();
    for (seed, &op) in Opcode::ALL.iter().enumerate() {
        let shape = op.operand_shape();
        if shape == OperandShape::None {
            continue;
        }
        let operands = sample_operands(shape, seed as u32, op.name());
        let ins = Instruction::from_parts(op, operands)
            .unwrap_or_else(|| panic!("{op:?} rejects {shape:?} operands"));
        assert_eq!(ins.opcode(), op);
        assert_eq!(ins.operands(), operands);
        expected.push(ins.clone());
        builder = builder.instruction(ins);
    }
    let program = builder.build();
    assert!(!expected.is_empty());

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(decoded.code, expected);
}

#[test]
fn test_constants_keep_order_and_duplicates() {
    let program = Program::builder(Arc::new(SourceFile::new("c.js", "")))
        .constant(Constant::Undefined)
        .constant(Constant::Null)
        .constant(Constant::Bool(true))
        .constant(Constant::Bool(false))
        .constant(Constant::Int(i64::MIN))
        .constant(Constant::Float(-0.0))
        .constant(Constant::Float(f64::INFINITY))
        .constant(Constant::string("dup"))
        .constant(Constant::string("dup"))
        .constant(Constant::regexp("a|b", ""))
        .build();

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(decoded.constants.len(), 10);
    assert_eq!(decoded, program);
    // -0.0 == 0.0, so check the sign survived explicitly
    match decoded.constants.get(5) {
        Some(Constant::Float(n)) => assert!(n.is_sign_negative()),
        other => panic!("expected float, got {other:?}"),
    }
}

#[test]
fn test_nan_constant_bits() {
    let nan = f64::from_bits(0x7FF8_0000_0000_0001);
    let program = Program::builder(Arc::new(SourceFile::new("n.js", "")))
        .constant(Constant::Float(nan))
        .build();

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    match decoded.constants.get(0) {
        Some(Constant::Float(n)) => assert_eq!(n.to_bits(), nan.to_bits()),
        other => panic!("expected float, got {other:?}"),
    }
}

#[test]
fn test_nested_functions_share_source() {
    let source = Arc::new(SourceFile::new(
        "nested.js",
        "function f() {\n  return function g() {};\n}",
    ));
    let root = Program::builder(Arc::clone(&source));
    let g = root
        .nested("g")
        .instruction_at(Instruction::Ret, 24)
        .build();
    let f = root
        .nested("f")
        .constant(Constant::function(g))
        .instruction(Instruction::NewFunc {
            function: ConstantIndex(0),
            name: "g".into(),
            length: 0,
            strict: false,
        })
        .instruction_at(Instruction::Ret, 17)
        .build();
    let program = root
        .constant(Constant::function(f))
        .instruction(Instruction::NewFunc {
            function: ConstantIndex(0),
            name: "f".into(),
            length: 0,
            strict: false,
        })
        .instruction(Instruction::Ret)
        .build();

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(decoded, program);
    decoded.check_references().unwrap();

    let f = decoded.nested_functions().next().unwrap();
    let g = f.nested_functions().next().unwrap();
    assert!(Arc::ptr_eq(&decoded.source, &f.source));
    assert!(Arc::ptr_eq(&decoded.source, &g.source));
    assert_eq!(g.position_of(0).map(|p| p.line), Some(2));
}

#[test]
fn test_source_fields_persisted_verbatim() {
    // A partially scanned source must come back exactly as stored
    let source = SourceFile::from_parts("lazy.js", "a\nb\nc\n", 2, vec![0, 2]);
    let program = Program::builder(Arc::new(source.clone()))
        .instruction(Instruction::Halt)
        .build();

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(*decoded.source, source);
    assert_eq!(decoded.source.last_scanned_offset(), 2);
}

#[test]
fn test_source_map_round_trip() {
    let program = Program::builder(Arc::new(SourceFile::new("m.js", "a;\nb;\nc;")))
        .instruction_at(Instruction::GetVar1 { name: "a".into() }, 0)
        .instruction(Instruction::Pop)
        .instruction_at(Instruction::GetVar1 { name: "c".into() }, 6)
        .build();

    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(decoded.source_map, program.source_map);
    assert_eq!(decoded.position_of(2).map(|p| p.line), Some(3));
}

#[test]
fn test_header_peek() {
    let bytes = write_program(&one_plus_one(), 0xBEEF);
    assert_eq!(read_header(&bytes).unwrap().version, 0xBEEF);
}

#[test]
fn test_json_matches_decoded() {
    let program = one_plus_one();
    let decoded = read_program(&write_program(&program, 1), 1).unwrap();
    assert_eq!(
        serde_json::to_value(&decoded).unwrap(),
        serde_json::to_value(&program).unwrap()
    );
}
