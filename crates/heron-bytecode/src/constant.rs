//! Constant pool for compiled programs

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::program::Program;

/// A constant value in the constant pool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Constant {
    /// `undefined`
    Undefined,
    /// `null`
    Null,
    /// Boolean literal
    Bool(bool),
    /// Integer that fits in 64 bits
    Int(i64),
    /// 64-bit floating point number
    Float(f64),
    /// String value
    String(Box<str>),
    /// Regular expression literal
    RegExp {
        /// The regex pattern
        pattern: Box<str>,
        /// The regex flags (e.g., "gi")
        flags: Box<str>,
    },
    /// Compiled function body, instantiated by `NewFunc`
    Function(Arc<Program>),
}

impl Constant {
    /// Create a string constant
    #[inline]
    pub fn string(s: impl Into<Box<str>>) -> Self {
        Self::String(s.into())
    }

    /// Create a RegExp constant
    #[inline]
    pub fn regexp(pattern: impl Into<Box<str>>, flags: impl Into<Box<str>>) -> Self {
        Self::RegExp {
            pattern: pattern.into(),
            flags: flags.into(),
        }
    }

    /// Create a function constant
    #[inline]
    pub fn function(program: Program) -> Self {
        Self::Function(Arc::new(program))
    }

    /// Check if this is a number
    #[inline]
    pub fn is_number(&self) -> bool {
        matches!(self, Self::Int(_) | Self::Float(_))
    }

    /// Get as number if this is a numeric constant
    #[inline]
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Self::Int(n) => Some(*n as f64),
            Self::Float(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as string if this is a string constant
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get the compiled body if this is a function constant
    #[inline]
    pub fn as_function(&self) -> Option<&Arc<Program>> {
        match self {
            Self::Function(program) => Some(program),
            _ => None,
        }
    }
}

/// Ordered constant table of a program
///
/// Order and duplicates are part of the program: instructions address
/// constants by index, so the codec keeps the table exactly as built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConstantPool {
    constants: Vec<Constant>,
}

impl ConstantPool {
    /// Create a new empty constant pool
    pub fn new() -> Self {
        Self {
            constants: Vec::new(),
        }
    }

    /// Create constant pool with pre-allocated capacity
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            constants: Vec::with_capacity(capacity),
        }
    }

    /// Add a constant to the pool, returns its index
    ///
    /// Reuses an identical scalar constant if one is already present.
    /// Function bodies are always appended.
    pub fn add(&mut self, constant: Constant) -> u32 {
        if !matches!(constant, Constant::Function(_))
            && let Some(idx) = self.constants.iter().position(|c| same_scalar(c, &constant))
        {
            return idx as u32;
        }
        self.push(constant)
    }

    /// Append a constant without deduplication, returns its index
    pub fn push(&mut self, constant: Constant) -> u32 {
        let idx = self.constants.len() as u32;
        self.constants.push(constant);
        idx
    }

    /// Get a constant by index
    #[inline]
    pub fn get(&self, index: u32) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Replace a constant slot, e.g. when a literal is bound late.
    ///
    /// Returns the previous value, or `None` if the index is out of range.
    pub fn set(&mut self, index: u32, constant: Constant) -> Option<Constant> {
        self.constants
            .get_mut(index as usize)
            .map(|slot| std::mem::replace(slot, constant))
    }

    /// Number of constants in the pool
    #[inline]
    pub fn len(&self) -> usize {
        self.constants.len()
    }

    /// Check if the pool is empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }

    /// Iterate over constants
    #[inline]
    pub fn iter(&self) -> impl Iterator<Item = &Constant> {
        self.constants.iter()
    }
}

impl From<Vec<Constant>> for ConstantPool {
    fn from(constants: Vec<Constant>) -> Self {
        Self { constants }
    }
}

impl FromIterator<Constant> for ConstantPool {
    fn from_iter<I: IntoIterator<Item = Constant>>(iter: I) -> Self {
        Self {
            constants: iter.into_iter().collect(),
        }
    }
}

/// Identity used for deduplication: floats compare by bits so `-0.0` and
/// NaN payloads keep their own slots
fn same_scalar(a: &Constant, b: &Constant) -> bool {
    match (a, b) {
        (Constant::Float(x), Constant::Float(y)) => x.to_bits() == y.to_bits(),
        _ => a == b,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constant_pool_dedup() {
        let mut pool = ConstantPool::new();

        let idx1 = pool.add(Constant::string("hello"));
        let idx2 = pool.add(Constant::string("world"));
        let idx3 = pool.add(Constant::string("hello")); // duplicate

        assert_eq!(idx1, 0);
        assert_eq!(idx2, 1);
        assert_eq!(idx3, 0);
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_float_dedup_by_bits() {
        let mut pool = ConstantPool::new();
        assert_eq!(pool.add(Constant::Float(0.0)), 0);
        assert_eq!(pool.add(Constant::Float(-0.0)), 1);
        assert_eq!(pool.add(Constant::Float(f64::NAN)), 2);
        assert_eq!(pool.add(Constant::Float(f64::NAN)), 2);
        assert_eq!(pool.add(Constant::Float(0.0)), 0);
    }

    #[test]
    fn test_push_keeps_duplicates() {
        let pool: ConstantPool = [Constant::Int(1), Constant::Int(1)].into_iter().collect();
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(1), Some(&Constant::Int(1)));
        assert_eq!(pool.get(2), None);
    }

    #[test]
    fn test_late_binding() {
        let mut pool = ConstantPool::new();
        let idx = pool.push(Constant::Undefined);

        let previous = pool.set(idx, Constant::Float(2.5));
        assert_eq!(previous, Some(Constant::Undefined));
        assert_eq!(pool.get(idx).and_then(Constant::as_number), Some(2.5));
        assert_eq!(pool.set(9, Constant::Null), None);
    }
}
