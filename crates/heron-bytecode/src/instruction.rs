//! Instructions and the opcode registry
//!
//! [`Opcode`] is the wire contract of the cache format: every variant has an
//! explicit, permanent byte value. In-memory declaration order carries no
//! meaning. Changing a value, or reusing a retired one for a different
//! instruction, invalidates every cache written so far and needs a new format
//! version.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::operand::{ConstantIndex, JumpOffset, LocalIndex, StackOffset};

/// Operand layout that follows an opcode byte in the instruction stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperandShape {
    /// Opcode alone
    None,
    /// Constant pool index
    Constant,
    /// Unsigned count (arguments, slots, elements)
    Count,
    /// Signed stack slot
    Stack,
    /// Local variable index
    Local,
    /// Signed jump offset
    Jump,
    /// Embedded identifier
    Name,
    /// Identifier plus scope slot
    VarRef,
    /// Identifier, scope slot, reference and callee flags
    GetVar,
    /// Identifier, scope slot, binding kind and strictness
    ResolveVar,
    /// Frame layout: stack size and argument count
    Frame,
    /// Function literal referring to a compiled sub-program
    Function,
    /// Regular expression literal
    Regexp,
    /// Catch and finally offsets of a try block
    Try,
}

macro_rules! opcodes {
    ($(
        $(#[$doc:meta])*
        $name:ident = $byte:literal => $shape:ident,
    )*) => {
        /// Bytecode opcodes
        ///
        /// Stack-based instruction set; operands, where present, are encoded
        /// right after the opcode byte according to [`Opcode::operand_shape`].
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[repr(u8)]
        pub enum Opcode {
            $(
                $(#[$doc])*
                $name = $byte,
            )*
        }

        impl Opcode {
            /// Every registered opcode, in wire order
            pub const ALL: &'static [Opcode] = &[$(Self::$name,)*];

            /// Convert from raw byte
            pub fn from_byte(byte: u8) -> Option<Self> {
                match byte {
                    $($byte => Some(Self::$name),)*
                    _ => None,
                }
            }

            /// Get the name of this opcode
            pub const fn name(self) -> &'static str {
                match self {
                    $(Self::$name => stringify!($name),)*
                }
            }

            /// Operand layout that follows this opcode on the wire
            pub const fn operand_shape(self) -> OperandShape {
                match self {
                    $(Self::$name => OperandShape::$shape,)*
                }
            }
        }
    };
}

opcodes! {
    // ==================== Constants / stack ====================
    /// Push constant: push constants\[idx\]
    LoadVal = 0x00 => Constant,
    /// Push constant, binding it late if the slot is still empty
    LoadVal1 = 0x01 => Constant,
    /// Push undefined
    LoadUndef = 0x02 => None,
    /// Push null
    LoadNil = 0x03 => None,
    /// Push the global object
    LoadGlobalObject = 0x04 => None,
    /// Push the currently executing function
    LoadCallee = 0x05 => None,
    /// Box a primitive `this` value
    BoxThis = 0x06 => None,
    /// Discard top of stack
    Pop = 0x07 => None,
    /// Duplicate top of stack
    Dup = 0x08 => None,
    /// Duplicate the value `n` slots below the top
    DupN = 0x09 => Count,
    /// Replace the value `n` slots below the top with the top
    RdupN = 0x0A => Count,
    /// Swap the two topmost values
    Swap = 0x0B => None,
    /// No operation
    Noop = 0x0C => None,
    /// Stop execution
    Halt = 0x0D => None,

    // ==================== Stack slots / locals ====================
    /// Push stack slot (negative slots are arguments)
    LoadStack = 0x10 => Stack,
    /// Store top of stack into slot
    StoreStack = 0x11 => Stack,
    /// Store top of stack into slot and pop
    StoreStackP = 0x12 => Stack,
    /// Push local variable
    GetLocal = 0x13 => Local,
    /// Store top of stack into local
    SetLocal = 0x14 => Local,
    /// Store top of stack into local and pop
    SetLocalP = 0x15 => Local,

    // ==================== Arithmetic ====================
    /// lhs + rhs
    Add = 0x20 => None,
    /// lhs - rhs
    Sub = 0x21 => None,
    /// lhs * rhs
    Mul = 0x22 => None,
    /// lhs / rhs
    Div = 0x23 => None,
    /// lhs % rhs
    Mod = 0x24 => None,
    /// -src
    Neg = 0x25 => None,
    /// +src
    Plus = 0x26 => None,
    /// src + 1
    Inc = 0x27 => None,
    /// src - 1
    Dec = 0x28 => None,
    /// ToNumber conversion
    ToNumber = 0x29 => None,

    // ==================== Bitwise / logical ====================
    /// lhs & rhs
    And = 0x30 => None,
    /// lhs | rhs
    Or = 0x31 => None,
    /// lhs ^ rhs
    Xor = 0x32 => None,
    /// ~src
    BitNot = 0x33 => None,
    /// lhs << rhs
    Sal = 0x34 => None,
    /// lhs >> rhs
    Sar = 0x35 => None,
    /// lhs >>> rhs
    Shr = 0x36 => None,
    /// !src
    Not = 0x37 => None,

    // ==================== Comparison / type ====================
    /// lhs == rhs
    Eq = 0x40 => None,
    /// lhs != rhs
    Neq = 0x41 => None,
    /// lhs === rhs
    StrictEq = 0x42 => None,
    /// lhs !== rhs
    StrictNeq = 0x43 => None,
    /// lhs < rhs
    Lt = 0x44 => None,
    /// lhs <= rhs
    Lte = 0x45 => None,
    /// lhs > rhs
    Gt = 0x46 => None,
    /// lhs >= rhs
    Gte = 0x47 => None,
    /// lhs in rhs
    In = 0x48 => None,
    /// lhs instanceof rhs
    InstanceOf = 0x49 => None,
    /// typeof src
    TypeOf = 0x4A => None,

    // ==================== Properties / elements ====================
    /// obj.name
    GetProp = 0x50 => Name,
    /// obj.name, keeping obj as the call receiver
    GetPropCallee = 0x51 => Name,
    /// obj.name = val
    SetProp = 0x52 => Name,
    /// Define own data property in an object literal
    SetProp1 = 0x53 => Name,
    /// obj.name = val in strict code
    SetPropStrict = 0x54 => Name,
    /// Define getter in an object literal
    SetPropGetter = 0x55 => Name,
    /// Define setter in an object literal
    SetPropSetter = 0x56 => Name,
    /// delete obj.name
    DeleteProp = 0x57 => Name,
    /// delete obj.name in strict code
    DeletePropStrict = 0x58 => Name,
    /// obj\[key\]
    GetElem = 0x59 => None,
    /// obj\[key\], keeping obj as the call receiver
    GetElemCallee = 0x5A => None,
    /// obj\[key\] = val
    SetElem = 0x5B => None,
    /// obj\[key\] = val in strict code
    SetElemStrict = 0x5C => None,
    /// delete obj\[key\]
    DeleteElem = 0x5D => None,
    /// delete obj\[key\] in strict code
    DeleteElemStrict = 0x5E => None,
    /// Set the prototype in an object literal (`__proto__: value`)
    SetProto = 0x5F => None,

    // ==================== Variables ====================
    /// Create a binding in the current variable environment
    BindName = 0x60 => Name,
    /// Resolve a reference through a known scope slot
    ResolveVar = 0x61 => ResolveVar,
    /// Resolve a reference by name
    ResolveVar1 = 0x62 => Name,
    /// Resolve a reference by name in strict code
    ResolveVar1Strict = 0x63 => Name,
    /// Read a variable through a known scope slot
    GetVar = 0x64 => GetVar,
    /// Read a variable by name
    GetVar1 = 0x65 => Name,
    /// Read a variable by name, pushing the implicit receiver too
    GetVar1Callee = 0x66 => Name,
    /// Write a variable through a known scope slot
    SetVar = 0x67 => VarRef,
    /// Write a variable through a known scope slot in strict code
    SetVarStrict = 0x68 => VarRef,
    /// Write a variable by name in strict code
    SetVar1Strict = 0x69 => Name,
    /// Dereference the reference on top of the stack
    GetValue = 0x6A => None,
    /// Store through the reference on the stack
    PutValue = 0x6B => None,
    /// Write a global property
    SetGlobal = 0x6C => Name,
    /// Write a global property in strict code
    SetGlobalStrict = 0x6D => Name,
    /// delete name
    DeleteVar = 0x6E => Name,
    /// delete a global property
    DeleteGlobal = 0x6F => Name,

    // ==================== Scopes ====================
    /// Push a fresh variable stash
    NewStash = 0x70 => None,
    /// Enter a `with` block
    EnterWith = 0x71 => None,
    /// Leave a `with` block
    LeaveWith = 0x72 => None,
    /// Bind the caught exception to a name
    EnterCatch = 0x73 => Name,

    // ==================== Control transfer ====================
    /// Unconditional jump
    Jump = 0x80 => Jump,
    /// Pop, jump if truthy
    Jeq = 0x81 => Jump,
    /// Jump if truthy, pop otherwise
    Jeq1 = 0x82 => Jump,
    /// Pop, jump if falsy
    Jne = 0x83 => Jump,
    /// Jump if falsy, pop otherwise
    Jneq1 = 0x84 => Jump,

    // ==================== Functions ====================
    /// Call with `n` arguments
    Call = 0x90 => Count,
    /// Direct eval with `n` arguments
    CallEval = 0x91 => Count,
    /// Direct eval with `n` arguments in strict code
    CallEvalStrict = 0x92 => Count,
    /// Construct with `n` arguments
    New = 0x93 => Count,
    /// Function prologue allocating a stash of `n` slots
    EnterFunc = 0x94 => Count,
    /// Function prologue for functions without a stash
    EnterFuncStashless = 0x95 => Frame,
    /// Return
    Ret = 0x96 => None,
    /// Return from a stashless function
    RetStashless = 0x97 => None,
    /// Return from a finally block
    RetFinally = 0x98 => None,
    /// Create the arguments object with `n` formal parameters
    CreateArgs = 0x99 => Count,
    /// Create the strict arguments object with `n` formal parameters
    CreateArgsStrict = 0x9A => Count,
    /// Create a closure over a compiled sub-program
    NewFunc = 0x9B => Function,

    // ==================== Exceptions ====================
    /// Enter a try block
    Try = 0xA0 => Try,
    /// Throw top of stack
    Throw = 0xA1 => None,

    // ==================== Enumeration ====================
    /// Start a for-in enumeration
    Enumerate = 0xB0 => None,
    /// Advance enumeration, jump when exhausted
    EnumNext = 0xB1 => Jump,
    /// Push the current enumeration key
    EnumGet = 0xB2 => None,
    /// Drop the innermost enumeration
    EnumPop = 0xB3 => None,

    // ==================== Construction ====================
    /// Push an empty object
    NewObject = 0xC0 => None,
    /// Collect `n` values into a new array
    NewArray = 0xC1 => Count,
    /// Create a regular expression object
    NewRegexp = 0xC2 => Regexp,
}

impl Opcode {
    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declaration kind of a resolved binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum BindingKind {
    /// `var` or function-scoped binding
    Var = 0,
    /// `let` binding
    Let = 1,
    /// `const` binding
    Const = 2,
}

impl BindingKind {
    /// Convert from raw byte
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Var),
            1 => Some(Self::Let),
            2 => Some(Self::Const),
            _ => None,
        }
    }

    /// Convert to raw byte
    #[inline]
    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Operand payload of an instruction, borrowed from it or from a cache buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Operands<'a> {
    None,
    Constant(ConstantIndex),
    Count(u32),
    Stack(StackOffset),
    Local(LocalIndex),
    Jump(JumpOffset),
    Name(&'a str),
    VarRef {
        name: &'a str,
        slot: u32,
    },
    GetVar {
        name: &'a str,
        slot: u32,
        is_ref: bool,
        is_callee: bool,
    },
    ResolveVar {
        name: &'a str,
        slot: u32,
        kind: BindingKind,
        strict: bool,
    },
    Frame {
        stack_size: u32,
        args: u32,
    },
    Function {
        function: ConstantIndex,
        name: &'a str,
        length: u32,
        strict: bool,
    },
    Regexp {
        pattern: &'a str,
        flags: &'a str,
    },
    Try {
        catch_offset: JumpOffset,
        finally_offset: JumpOffset,
        dynamic: bool,
    },
}

impl Operands<'_> {
    /// Layout of this payload
    pub fn shape(&self) -> OperandShape {
        match self {
            Self::None => OperandShape::None,
            Self::Constant(_) => OperandShape::Constant,
            Self::Count(_) => OperandShape::Count,
            Self::Stack(_) => OperandShape::Stack,
            Self::Local(_) => OperandShape::Local,
            Self::Jump(_) => OperandShape::Jump,
            Self::Name(_) => OperandShape::Name,
            Self::VarRef { .. } => OperandShape::VarRef,
            Self::GetVar { .. } => OperandShape::GetVar,
            Self::ResolveVar { .. } => OperandShape::ResolveVar,
            Self::Frame { .. } => OperandShape::Frame,
            Self::Function { .. } => OperandShape::Function,
            Self::Regexp { .. } => OperandShape::Regexp,
            Self::Try { .. } => OperandShape::Try,
        }
    }
}

impl fmt::Display for Operands<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => Ok(()),
            Self::Constant(idx) => write!(f, "{idx}"),
            Self::Count(n) => write!(f, "{n}"),
            Self::Stack(slot) => write!(f, "{slot}"),
            Self::Local(idx) => write!(f, "{idx}"),
            Self::Jump(offset) => write!(f, "{offset}"),
            Self::Name(name) => write!(f, "{name:?}"),
            Self::VarRef { name, slot } => write!(f, "{name:?} @{slot}"),
            Self::GetVar {
                name,
                slot,
                is_ref,
                is_callee,
            } => {
                write!(f, "{name:?} @{slot}")?;
                if *is_ref {
                    f.write_str(" ref")?;
                }
                if *is_callee {
                    f.write_str(" callee")?;
                }
                Ok(())
            }
            Self::ResolveVar {
                name,
                slot,
                kind,
                strict,
            } => {
                write!(f, "{name:?} @{slot} {kind:?}")?;
                if *strict {
                    f.write_str(" strict")?;
                }
                Ok(())
            }
            Self::Frame { stack_size, args } => write!(f, "stack={stack_size} args={args}"),
            Self::Function {
                function,
                name,
                length,
                strict,
            } => {
                write!(f, "{function} {name:?} length={length}")?;
                if *strict {
                    f.write_str(" strict")?;
                }
                Ok(())
            }
            Self::Regexp { pattern, flags } => write!(f, "/{pattern}/{flags}"),
            Self::Try {
                catch_offset,
                finally_offset,
                dynamic,
            } => {
                write!(f, "catch={catch_offset} finally={finally_offset}")?;
                if *dynamic {
                    f.write_str(" dynamic")?;
                }
                Ok(())
            }
        }
    }
}

/// A decoded instruction with its operands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[allow(missing_docs)]
pub enum Instruction {
    // Constants / stack
    LoadVal { idx: ConstantIndex },
    LoadVal1 { idx: ConstantIndex },
    LoadUndef,
    LoadNil,
    LoadGlobalObject,
    LoadCallee,
    BoxThis,
    Pop,
    Dup,
    DupN { n: u32 },
    RdupN { n: u32 },
    Swap,
    Noop,
    Halt,

    // Stack slots / locals
    LoadStack { slot: StackOffset },
    StoreStack { slot: StackOffset },
    StoreStackP { slot: StackOffset },
    GetLocal { idx: LocalIndex },
    SetLocal { idx: LocalIndex },
    SetLocalP { idx: LocalIndex },

    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Neg,
    Plus,
    Inc,
    Dec,
    ToNumber,

    // Bitwise / logical
    And,
    Or,
    Xor,
    BitNot,
    Sal,
    Sar,
    Shr,
    Not,

    // Comparison / type
    Eq,
    Neq,
    StrictEq,
    StrictNeq,
    Lt,
    Lte,
    Gt,
    Gte,
    In,
    InstanceOf,
    TypeOf,

    // Properties / elements
    GetProp { name: Box<str> },
    GetPropCallee { name: Box<str> },
    SetProp { name: Box<str> },
    SetProp1 { name: Box<str> },
    SetPropStrict { name: Box<str> },
    SetPropGetter { name: Box<str> },
    SetPropSetter { name: Box<str> },
    DeleteProp { name: Box<str> },
    DeletePropStrict { name: Box<str> },
    GetElem,
    GetElemCallee,
    SetElem,
    SetElemStrict,
    DeleteElem,
    DeleteElemStrict,
    SetProto,

    // Variables
    BindName { name: Box<str> },
    /// `slot` packs the scope depth and index assigned by the compiler
    ResolveVar {
        name: Box<str>,
        slot: u32,
        kind: BindingKind,
        strict: bool,
    },
    ResolveVar1 { name: Box<str> },
    ResolveVar1Strict { name: Box<str> },
    GetVar {
        name: Box<str>,
        slot: u32,
        is_ref: bool,
        is_callee: bool,
    },
    GetVar1 { name: Box<str> },
    GetVar1Callee { name: Box<str> },
    SetVar { name: Box<str>, slot: u32 },
    SetVarStrict { name: Box<str>, slot: u32 },
    SetVar1Strict { name: Box<str> },
    GetValue,
    PutValue,
    SetGlobal { name: Box<str> },
    SetGlobalStrict { name: Box<str> },
    DeleteVar { name: Box<str> },
    DeleteGlobal { name: Box<str> },

    // Scopes
    NewStash,
    EnterWith,
    LeaveWith,
    EnterCatch { name: Box<str> },

    // Control transfer
    Jump { offset: JumpOffset },
    Jeq { offset: JumpOffset },
    Jeq1 { offset: JumpOffset },
    Jne { offset: JumpOffset },
    Jneq1 { offset: JumpOffset },

    // Functions
    Call { argc: u32 },
    CallEval { argc: u32 },
    CallEvalStrict { argc: u32 },
    New { argc: u32 },
    EnterFunc { stash_size: u32 },
    EnterFuncStashless { stack_size: u32, args: u32 },
    Ret,
    RetStashless,
    RetFinally,
    CreateArgs { formals: u32 },
    CreateArgsStrict { formals: u32 },
    /// `function` must point at a [`Constant::Function`](crate::Constant::Function)
    NewFunc {
        function: ConstantIndex,
        name: Box<str>,
        length: u32,
        strict: bool,
    },

    // Exceptions
    Try {
        catch_offset: JumpOffset,
        finally_offset: JumpOffset,
        dynamic: bool,
    },
    Throw,

    // Enumeration
    Enumerate,
    EnumNext { offset: JumpOffset },
    EnumGet,
    EnumPop,

    // Construction
    NewObject,
    NewArray { len: u32 },
    NewRegexp { pattern: Box<str>, flags: Box<str> },
}

impl Instruction {
    /// Wire opcode of this instruction
    pub fn opcode(&self) -> Opcode {
        match self {
            Self::LoadVal { .. } => Opcode::LoadVal,
            Self::LoadVal1 { .. } => Opcode::LoadVal1,
            Self::LoadUndef => Opcode::LoadUndef,
            Self::LoadNil => Opcode::LoadNil,
            Self::LoadGlobalObject => Opcode::LoadGlobalObject,
            Self::LoadCallee => Opcode::LoadCallee,
            Self::BoxThis => Opcode::BoxThis,
            Self::Pop => Opcode::Pop,
            Self::Dup => Opcode::Dup,
            Self::DupN { .. } => Opcode::DupN,
            Self::RdupN { .. } => Opcode::RdupN,
            Self::Swap => Opcode::Swap,
            Self::Noop => Opcode::Noop,
            Self::Halt => Opcode::Halt,

            Self::LoadStack { .. } => Opcode::LoadStack,
            Self::StoreStack { .. } => Opcode::StoreStack,
            Self::StoreStackP { .. } => Opcode::StoreStackP,
            Self::GetLocal { .. } => Opcode::GetLocal,
            Self::SetLocal { .. } => Opcode::SetLocal,
            Self::SetLocalP { .. } => Opcode::SetLocalP,

            Self::Add => Opcode::Add,
            Self::Sub => Opcode::Sub,
            Self::Mul => Opcode::Mul,
            Self::Div => Opcode::Div,
            Self::Mod => Opcode::Mod,
            Self::Neg => Opcode::Neg,
            Self::Plus => Opcode::Plus,
            Self::Inc => Opcode::Inc,
            Self::Dec => Opcode::Dec,
            Self::ToNumber => Opcode::ToNumber,

            Self::And => Opcode::And,
            Self::Or => Opcode::Or,
            Self::Xor => Opcode::Xor,
            Self::BitNot => Opcode::BitNot,
            Self::Sal => Opcode::Sal,
            Self::Sar => Opcode::Sar,
            Self::Shr => Opcode::Shr,
            Self::Not => Opcode::Not,

            Self::Eq => Opcode::Eq,
            Self::Neq => Opcode::Neq,
            Self::StrictEq => Opcode::StrictEq,
            Self::StrictNeq => Opcode::StrictNeq,
            Self::Lt => Opcode::Lt,
            Self::Lte => Opcode::Lte,
            Self::Gt => Opcode::Gt,
            Self::Gte => Opcode::Gte,
            Self::In => Opcode::In,
            Self::InstanceOf => Opcode::InstanceOf,
            Self::TypeOf => Opcode::TypeOf,

            Self::GetProp { .. } => Opcode::GetProp,
            Self::GetPropCallee { .. } => Opcode::GetPropCallee,
            Self::SetProp { .. } => Opcode::SetProp,
            Self::SetProp1 { .. } => Opcode::SetProp1,
            Self::SetPropStrict { .. } => Opcode::SetPropStrict,
            Self::SetPropGetter { .. } => Opcode::SetPropGetter,
            Self::SetPropSetter { .. } => Opcode::SetPropSetter,
            Self::DeleteProp { .. } => Opcode::DeleteProp,
            Self::DeletePropStrict { .. } => Opcode::DeletePropStrict,
            Self::GetElem => Opcode::GetElem,
            Self::GetElemCallee => Opcode::GetElemCallee,
            Self::SetElem => Opcode::SetElem,
            Self::SetElemStrict => Opcode::SetElemStrict,
            Self::DeleteElem => Opcode::DeleteElem,
            Self::DeleteElemStrict => Opcode::DeleteElemStrict,
            Self::SetProto => Opcode::SetProto,

            Self::BindName { .. } => Opcode::BindName,
            Self::ResolveVar { .. } => Opcode::ResolveVar,
            Self::ResolveVar1 { .. } => Opcode::ResolveVar1,
            Self::ResolveVar1Strict { .. } => Opcode::ResolveVar1Strict,
            Self::GetVar { .. } => Opcode::GetVar,
            Self::GetVar1 { .. } => Opcode::GetVar1,
            Self::GetVar1Callee { .. } => Opcode::GetVar1Callee,
            Self::SetVar { .. } => Opcode::SetVar,
            Self::SetVarStrict { .. } => Opcode::SetVarStrict,
            Self::SetVar1Strict { .. } => Opcode::SetVar1Strict,
            Self::GetValue => Opcode::GetValue,
            Self::PutValue => Opcode::PutValue,
            Self::SetGlobal { .. } => Opcode::SetGlobal,
            Self::SetGlobalStrict { .. } => Opcode::SetGlobalStrict,
            Self::DeleteVar { .. } => Opcode::DeleteVar,
            Self::DeleteGlobal { .. } => Opcode::DeleteGlobal,

            Self::NewStash => Opcode::NewStash,
            Self::EnterWith => Opcode::EnterWith,
            Self::LeaveWith => Opcode::LeaveWith,
            Self::EnterCatch { .. } => Opcode::EnterCatch,

            Self::Jump { .. } => Opcode::Jump,
            Self::Jeq { .. } => Opcode::Jeq,
            Self::Jeq1 { .. } => Opcode::Jeq1,
            Self::Jne { .. } => Opcode::Jne,
            Self::Jneq1 { .. } => Opcode::Jneq1,

            Self::Call { .. } => Opcode::Call,
            Self::CallEval { .. } => Opcode::CallEval,
            Self::CallEvalStrict { .. } => Opcode::CallEvalStrict,
            Self::New { .. } => Opcode::New,
            Self::EnterFunc { .. } => Opcode::EnterFunc,
            Self::EnterFuncStashless { .. } => Opcode::EnterFuncStashless,
            Self::Ret => Opcode::Ret,
            Self::RetStashless => Opcode::RetStashless,
            Self::RetFinally => Opcode::RetFinally,
            Self::CreateArgs { .. } => Opcode::CreateArgs,
            Self::CreateArgsStrict { .. } => Opcode::CreateArgsStrict,
            Self::NewFunc { .. } => Opcode::NewFunc,

            Self::Try { .. } => Opcode::Try,
            Self::Throw => Opcode::Throw,

            Self::Enumerate => Opcode::Enumerate,
            Self::EnumNext { .. } => Opcode::EnumNext,
            Self::EnumGet => Opcode::EnumGet,
            Self::EnumPop => Opcode::EnumPop,

            Self::NewObject => Opcode::NewObject,
            Self::NewArray { .. } => Opcode::NewArray,
            Self::NewRegexp { .. } => Opcode::NewRegexp,
        }
    }

    /// Operand payload, borrowing any embedded strings
    pub fn operands(&self) -> Operands<'_> {
        match self {
            Self::LoadVal { idx } | Self::LoadVal1 { idx } => Operands::Constant(*idx),

            Self::DupN { n } | Self::RdupN { n } => Operands::Count(*n),
            Self::Call { argc }
            | Self::CallEval { argc }
            | Self::CallEvalStrict { argc }
            | Self::New { argc } => Operands::Count(*argc),
            Self::EnterFunc { stash_size } => Operands::Count(*stash_size),
            Self::CreateArgs { formals } | Self::CreateArgsStrict { formals } => {
                Operands::Count(*formals)
            }
            Self::NewArray { len } => Operands::Count(*len),

            Self::LoadStack { slot } | Self::StoreStack { slot } | Self::StoreStackP { slot } => {
                Operands::Stack(*slot)
            }
            Self::GetLocal { idx } | Self::SetLocal { idx } | Self::SetLocalP { idx } => {
                Operands::Local(*idx)
            }

            Self::Jump { offset }
            | Self::Jeq { offset }
            | Self::Jeq1 { offset }
            | Self::Jne { offset }
            | Self::Jneq1 { offset }
            | Self::EnumNext { offset } => Operands::Jump(*offset),

            Self::GetProp { name }
            | Self::GetPropCallee { name }
            | Self::SetProp { name }
            | Self::SetProp1 { name }
            | Self::SetPropStrict { name }
            | Self::SetPropGetter { name }
            | Self::SetPropSetter { name }
            | Self::DeleteProp { name }
            | Self::DeletePropStrict { name }
            | Self::BindName { name }
            | Self::ResolveVar1 { name }
            | Self::ResolveVar1Strict { name }
            | Self::GetVar1 { name }
            | Self::GetVar1Callee { name }
            | Self::SetVar1Strict { name }
            | Self::SetGlobal { name }
            | Self::SetGlobalStrict { name }
            | Self::DeleteVar { name }
            | Self::DeleteGlobal { name }
            | Self::EnterCatch { name } => Operands::Name(name),

            Self::SetVar { name, slot } | Self::SetVarStrict { name, slot } => Operands::VarRef {
                name,
                slot: *slot,
            },
            Self::GetVar {
                name,
                slot,
                is_ref,
                is_callee,
            } => Operands::GetVar {
                name,
                slot: *slot,
                is_ref: *is_ref,
                is_callee: *is_callee,
            },
            Self::ResolveVar {
                name,
                slot,
                kind,
                strict,
            } => Operands::ResolveVar {
                name,
                slot: *slot,
                kind: *kind,
                strict: *strict,
            },
            Self::EnterFuncStashless { stack_size, args } => Operands::Frame {
                stack_size: *stack_size,
                args: *args,
            },
            Self::NewFunc {
                function,
                name,
                length,
                strict,
            } => Operands::Function {
                function: *function,
                name,
                length: *length,
                strict: *strict,
            },
            Self::NewRegexp { pattern, flags } => Operands::Regexp { pattern, flags },
            Self::Try {
                catch_offset,
                finally_offset,
                dynamic,
            } => Operands::Try {
                catch_offset: *catch_offset,
                finally_offset: *finally_offset,
                dynamic: *dynamic,
            },

            _ => Operands::None,
        }
    }

    /// Rebuild an instruction from its opcode and decoded operands.
    ///
    /// Returns `None` when the operands do not have the shape the opcode
    /// calls for.
    pub fn from_parts(opcode: Opcode, operands: Operands<'_>) -> Option<Self> {
        if let Operands::None = operands {
            return Self::nullary(opcode);
        }

        let instruction = match (opcode, operands) {
            (Opcode::LoadVal, Operands::Constant(idx)) => Self::LoadVal { idx },
            (Opcode::LoadVal1, Operands::Constant(idx)) => Self::LoadVal1 { idx },

            (Opcode::DupN, Operands::Count(n)) => Self::DupN { n },
            (Opcode::RdupN, Operands::Count(n)) => Self::RdupN { n },
            (Opcode::Call, Operands::Count(argc)) => Self::Call { argc },
            (Opcode::CallEval, Operands::Count(argc)) => Self::CallEval { argc },
            (Opcode::CallEvalStrict, Operands::Count(argc)) => Self::CallEvalStrict { argc },
            (Opcode::New, Operands::Count(argc)) => Self::New { argc },
            (Opcode::EnterFunc, Operands::Count(stash_size)) => Self::EnterFunc { stash_size },
            (Opcode::CreateArgs, Operands::Count(formals)) => Self::CreateArgs { formals },
            (Opcode::CreateArgsStrict, Operands::Count(formals)) => {
                Self::CreateArgsStrict { formals }
            }
            (Opcode::NewArray, Operands::Count(len)) => Self::NewArray { len },

            (Opcode::LoadStack, Operands::Stack(slot)) => Self::LoadStack { slot },
            (Opcode::StoreStack, Operands::Stack(slot)) => Self::StoreStack { slot },
            (Opcode::StoreStackP, Operands::Stack(slot)) => Self::StoreStackP { slot },
            (Opcode::GetLocal, Operands::Local(idx)) => Self::GetLocal { idx },
            (Opcode::SetLocal, Operands::Local(idx)) => Self::SetLocal { idx },
            (Opcode::SetLocalP, Operands::Local(idx)) => Self::SetLocalP { idx },

            (Opcode::Jump, Operands::Jump(offset)) => Self::Jump { offset },
            (Opcode::Jeq, Operands::Jump(offset)) => Self::Jeq { offset },
            (Opcode::Jeq1, Operands::Jump(offset)) => Self::Jeq1 { offset },
            (Opcode::Jne, Operands::Jump(offset)) => Self::Jne { offset },
            (Opcode::Jneq1, Operands::Jump(offset)) => Self::Jneq1 { offset },
            (Opcode::EnumNext, Operands::Jump(offset)) => Self::EnumNext { offset },

            (opcode, Operands::Name(name)) => Self::named(opcode, name.into())?,

            (Opcode::SetVar, Operands::VarRef { name, slot }) => Self::SetVar {
                name: name.into(),
                slot,
            },
            (Opcode::SetVarStrict, Operands::VarRef { name, slot }) => Self::SetVarStrict {
                name: name.into(),
                slot,
            },
            (
                Opcode::GetVar,
                Operands::GetVar {
                    name,
                    slot,
                    is_ref,
                    is_callee,
                },
            ) => Self::GetVar {
                name: name.into(),
                slot,
                is_ref,
                is_callee,
            },
            (
                Opcode::ResolveVar,
                Operands::ResolveVar {
                    name,
                    slot,
                    kind,
                    strict,
                },
            ) => Self::ResolveVar {
                name: name.into(),
                slot,
                kind,
                strict,
            },
            (Opcode::EnterFuncStashless, Operands::Frame { stack_size, args }) => {
                Self::EnterFuncStashless { stack_size, args }
            }
            (
                Opcode::NewFunc,
                Operands::Function {
                    function,
                    name,
                    length,
                    strict,
                },
            ) => Self::NewFunc {
                function,
                name: name.into(),
                length,
                strict,
            },
            (Opcode::NewRegexp, Operands::Regexp { pattern, flags }) => Self::NewRegexp {
                pattern: pattern.into(),
                flags: flags.into(),
            },
            (
                Opcode::Try,
                Operands::Try {
                    catch_offset,
                    finally_offset,
                    dynamic,
                },
            ) => Self::Try {
                catch_offset,
                finally_offset,
                dynamic,
            },

            _ => return None,
        };
        Some(instruction)
    }

    fn named(opcode: Opcode, name: Box<str>) -> Option<Self> {
        let instruction = match opcode {
            Opcode::GetProp => Self::GetProp { name },
            Opcode::GetPropCallee => Self::GetPropCallee { name },
            Opcode::SetProp => Self::SetProp { name },
            Opcode::SetProp1 => Self::SetProp1 { name },
            Opcode::SetPropStrict => Self::SetPropStrict { name },
            Opcode::SetPropGetter => Self::SetPropGetter { name },
            Opcode::SetPropSetter => Self::SetPropSetter { name },
            Opcode::DeleteProp => Self::DeleteProp { name },
            Opcode::DeletePropStrict => Self::DeletePropStrict { name },
            Opcode::BindName => Self::BindName { name },
            Opcode::ResolveVar1 => Self::ResolveVar1 { name },
            Opcode::ResolveVar1Strict => Self::ResolveVar1Strict { name },
            Opcode::GetVar1 => Self::GetVar1 { name },
            Opcode::GetVar1Callee => Self::GetVar1Callee { name },
            Opcode::SetVar1Strict => Self::SetVar1Strict { name },
            Opcode::SetGlobal => Self::SetGlobal { name },
            Opcode::SetGlobalStrict => Self::SetGlobalStrict { name },
            Opcode::DeleteVar => Self::DeleteVar { name },
            Opcode::DeleteGlobal => Self::DeleteGlobal { name },
            Opcode::EnterCatch => Self::EnterCatch { name },
            _ => return None,
        };
        Some(instruction)
    }

    fn nullary(opcode: Opcode) -> Option<Self> {
        let instruction = match opcode {
            Opcode::LoadUndef => Self::LoadUndef,
            Opcode::LoadNil => Self::LoadNil,
            Opcode::LoadGlobalObject => Self::LoadGlobalObject,
            Opcode::LoadCallee => Self::LoadCallee,
            Opcode::BoxThis => Self::BoxThis,
            Opcode::Pop => Self::Pop,
            Opcode::Dup => Self::Dup,
            Opcode::Swap => Self::Swap,
            Opcode::Noop => Self::Noop,
            Opcode::Halt => Self::Halt,

            Opcode::Add => Self::Add,
            Opcode::Sub => Self::Sub,
            Opcode::Mul => Self::Mul,
            Opcode::Div => Self::Div,
            Opcode::Mod => Self::Mod,
            Opcode::Neg => Self::Neg,
            Opcode::Plus => Self::Plus,
            Opcode::Inc => Self::Inc,
            Opcode::Dec => Self::Dec,
            Opcode::ToNumber => Self::ToNumber,

            Opcode::And => Self::And,
            Opcode::Or => Self::Or,
            Opcode::Xor => Self::Xor,
            Opcode::BitNot => Self::BitNot,
            Opcode::Sal => Self::Sal,
            Opcode::Sar => Self::Sar,
            Opcode::Shr => Self::Shr,
            Opcode::Not => Self::Not,

            Opcode::Eq => Self::Eq,
            Opcode::Neq => Self::Neq,
            Opcode::StrictEq => Self::StrictEq,
            Opcode::StrictNeq => Self::StrictNeq,
            Opcode::Lt => Self::Lt,
            Opcode::Lte => Self::Lte,
            Opcode::Gt => Self::Gt,
            Opcode::Gte => Self::Gte,
            Opcode::In => Self::In,
            Opcode::InstanceOf => Self::InstanceOf,
            Opcode::TypeOf => Self::TypeOf,

            Opcode::GetElem => Self::GetElem,
            Opcode::GetElemCallee => Self::GetElemCallee,
            Opcode::SetElem => Self::SetElem,
            Opcode::SetElemStrict => Self::SetElemStrict,
            Opcode::DeleteElem => Self::DeleteElem,
            Opcode::DeleteElemStrict => Self::DeleteElemStrict,
            Opcode::SetProto => Self::SetProto,

            Opcode::GetValue => Self::GetValue,
            Opcode::PutValue => Self::PutValue,

            Opcode::NewStash => Self::NewStash,
            Opcode::EnterWith => Self::EnterWith,
            Opcode::LeaveWith => Self::LeaveWith,

            Opcode::Ret => Self::Ret,
            Opcode::RetStashless => Self::RetStashless,
            Opcode::RetFinally => Self::RetFinally,

            Opcode::Throw => Self::Throw,

            Opcode::Enumerate => Self::Enumerate,
            Opcode::EnumGet => Self::EnumGet,
            Opcode::EnumPop => Self::EnumPop,

            Opcode::NewObject => Self::NewObject,
            _ => return None,
        };
        Some(instruction)
    }

    /// Jump offsets carried by this instruction
    pub fn jump_offsets(&self) -> impl Iterator<Item = JumpOffset> {
        let (first, second) = match self.operands() {
            Operands::Jump(offset) => (Some(offset), None),
            Operands::Try {
                catch_offset,
                finally_offset,
                ..
            } => (Some(catch_offset), Some(finally_offset)),
            _ => (None, None),
        };
        first.into_iter().chain(second)
    }

    /// Constant pool slot referenced by this instruction
    pub fn constant_ref(&self) -> Option<ConstantIndex> {
        match self.operands() {
            Operands::Constant(idx) => Some(idx),
            Operands::Function { function, .. } => Some(function),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let operands = self.operands();
        if let Operands::None = operands {
            f.write_str(self.opcode().name())
        } else {
            write!(f, "{} {}", self.opcode().name(), operands)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_opcode_roundtrip() {
        for &op in Opcode::ALL {
            let byte = op.to_byte();
            let decoded = Opcode::from_byte(byte);
            assert_eq!(decoded, Some(op));
        }
    }

    #[test]
    fn test_registry_is_one_to_one() {
        let bytes: HashSet<u8> = Opcode::ALL.iter().map(|op| op.to_byte()).collect();
        assert_eq!(bytes.len(), Opcode::ALL.len());

        let resolved = (0..=u8::MAX)
            .filter(|&b| Opcode::from_byte(b).is_some())
            .count();
        assert_eq!(resolved, Opcode::ALL.len());
    }

    #[test]
    fn test_invalid_opcode() {
        assert_eq!(Opcode::from_byte(0xFF), None);
        assert_eq!(Opcode::from_byte(0x0E), None);
    }

    #[test]
    fn test_opcode_name() {
        assert_eq!(Opcode::Add.name(), "Add");
        assert_eq!(Opcode::LoadUndef.name(), "LoadUndef");
        assert_eq!(Opcode::Jump.name(), "Jump");
        assert_eq!(Opcode::Ret.name(), "Ret");
    }

    #[test]
    fn test_shape_matches_operands() {
        let samples = [
            Instruction::LoadVal {
                idx: ConstantIndex(3),
            },
            Instruction::Add,
            Instruction::GetProp {
                name: "length".into(),
            },
            Instruction::GetVar {
                name: "x".into(),
                slot: 0x0100_0002,
                is_ref: false,
                is_callee: true,
            },
            Instruction::EnterFuncStashless {
                stack_size: 4,
                args: 2,
            },
            Instruction::Try {
                catch_offset: JumpOffset(5),
                finally_offset: JumpOffset(0),
                dynamic: false,
            },
            Instruction::EnumNext {
                offset: JumpOffset(-3),
            },
        ];

        for ins in samples {
            let operands = ins.operands();
            assert_eq!(operands.shape(), ins.opcode().operand_shape(), "{ins}");
            assert_eq!(Instruction::from_parts(ins.opcode(), operands), Some(ins.clone()));
        }
    }

    #[test]
    fn test_from_parts_rejects_wrong_shape() {
        assert_eq!(Instruction::from_parts(Opcode::Jump, Operands::None), None);
        assert_eq!(
            Instruction::from_parts(Opcode::Add, Operands::Count(1)),
            None
        );
        assert_eq!(
            Instruction::from_parts(Opcode::GetElem, Operands::Name("x")),
            None
        );
    }

    #[test]
    fn test_nullary_opcodes_round_trip() {
        for &op in Opcode::ALL {
            if op.operand_shape() == OperandShape::None {
                let ins = Instruction::from_parts(op, Operands::None)
                    .unwrap_or_else(|| panic!("{op} has no operand-free variant"));
                assert_eq!(ins.opcode(), op);
            }
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Instruction::Add.to_string(), "Add");
        assert_eq!(
            Instruction::Jne {
                offset: JumpOffset(4)
            }
            .to_string(),
            "Jne +4"
        );
        assert_eq!(
            Instruction::NewRegexp {
                pattern: "a+".into(),
                flags: "g".into()
            }
            .to_string(),
            "NewRegexp /a+/g"
        );
    }
}
