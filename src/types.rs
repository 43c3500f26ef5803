//! Scalar/vector/tensor type system shared by every IR node.
//!
//! `ElemKind` enumerates the element kinds a register or buffer can carry;
//! `ExprType` pairs one with a vector width; `TensorType` is the type of an
//! external buffer (`Argument`), an ordered list of named extents.

use std::fmt;

/// The five element kinds the IR knows about. `Index` is the loop-counter
/// kind (unsigned, machine pointer width); `Ptr` is an opaque pointer type
/// used only by back-ends. Neither ever appears as the element of a vector
/// with width > 1 that participates in floating point or i8/i32 arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElemKind {
    F32,
    I8,
    I32,
    Index,
    Ptr,
}

impl ElemKind {
    /// The textual name used by the bytecode format's debug dumps and by
    /// `Program::dump()`.
    pub fn name(self) -> &'static str {
        match self {
            ElemKind::F32 => "f32",
            ElemKind::I8 => "i8",
            ElemKind::I32 => "i32",
            ElemKind::Index => "index",
            ElemKind::Ptr => "ptr",
        }
    }

    /// `true` for the kinds that may participate in ordinary arithmetic.
    /// `Index` participates only in address/index arithmetic, and `Ptr`
    /// never participates in binary arithmetic at all.
    pub fn is_scalar_arith(self) -> bool {
        matches!(self, ElemKind::F32 | ElemKind::I8 | ElemKind::I32)
    }

    pub fn is_float(self) -> bool {
        matches!(self, ElemKind::F32)
    }
}

impl fmt::Display for ElemKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The type of a scalar or vector expression: an element kind plus a width.
/// `width == 1` means scalar; any larger width means a vector register of
/// that many lanes. `index`-kind values are never vectors wider than 1
/// before vectorization widens the *load/store* expressions around them,
/// never the index itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprType {
    pub elem: ElemKind,
    pub width: u32,
}

impl ExprType {
    pub fn new(elem: ElemKind, width: u32) -> Self {
        assert!(width >= 1, "vector width must be >= 1, got {}", width);
        ExprType { elem, width }
    }

    pub fn scalar(elem: ElemKind) -> Self {
        ExprType::new(elem, 1)
    }

    pub fn is_scalar(self) -> bool {
        self.width == 1
    }

    pub fn with_width(self, width: u32) -> Self {
        ExprType::new(self.elem, width)
    }
}

impl fmt::Display for ExprType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.width == 1 {
            write!(f, "{}", self.elem)
        } else {
            write!(f, "{}<{}>", self.elem, self.width)
        }
    }
}

/// The type of an external buffer: an element kind plus an ordered list of
/// named extents. Extents must have unique names within the type and
/// strictly positive sizes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub elem: ElemKind,
    pub extents: Vec<(String, u32)>,
}

impl TensorType {
    pub fn new(elem: ElemKind, extents: Vec<(String, u32)>) -> Self {
        assert!(extents.iter().all(|(_, size)| *size > 0), "extents must be > 0");
        TensorType { elem, extents }
    }

    pub fn num_dims(&self) -> usize {
        self.extents.len()
    }

    /// Total element count, the product of every extent's size.
    pub fn size(&self) -> u64 {
        self.extents.iter().fold(1u64, |acc, (_, size)| acc * (*size as u64))
    }

    pub fn dim_size(&self, idx: usize) -> Option<u32> {
        self.extents.get(idx).map(|(_, size)| *size)
    }
}

/// A process-level external buffer passed into a `Program`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Argument {
    pub name: String,
    pub ty: TensorType,
}

impl Argument {
    pub fn new(name: impl Into<String>, ty: TensorType) -> Self {
        Argument { name: name.into(), ty }
    }
}

/// A scalar/vector register-like variable scoped to the enclosing `Program`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LocalVar {
    pub name: String,
    pub ty: ExprType,
}

impl LocalVar {
    pub fn new(name: impl Into<String>, ty: ExprType) -> Self {
        LocalVar { name: name.into(), ty }
    }
}

/// `[A-Za-z_][A-Za-z0-9_]*`, checked without pulling in a regex dependency
/// since the grammar is this simple.
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => (),
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_validation() {
        assert!(is_valid_name("i"));
        assert!(is_valid_name("_tmp0"));
        assert!(is_valid_name("A_1"));
        assert!(!is_valid_name(""));
        assert!(!is_valid_name("0i"));
        assert!(!is_valid_name("i-j"));
    }

    #[test]
    fn tensor_size() {
        let t = TensorType::new(ElemKind::F32, vec![("N".into(), 4), ("M".into(), 8)]);
        assert_eq!(t.size(), 32);
        assert_eq!(t.num_dims(), 2);
    }
}
