//! The typed loop-nest IR: two disjoint tagged-variant sorts, `StmtKind` and
//! `ExprKind`, held in per-`Program` arenas and addressed by stable index
//! (`StmtId`/`ExprId`) rather than by raw pointer.
//!
//! This replaces a "downcast chain" over a polymorphic base class: every
//! node is instead a variant of a closed enum, and traversal
//! (`crate::visit`) is an exhaustive match. Instead of parent back-pointers
//! chasing raw node pointers, a child's owning slot is recovered by
//! recomputing it from the parent's current field values
//! (`Program::sync_stmt_children` / `sync_expr_children`) rather than
//! maintaining a literal `(parent-index, slot-index)` back-pointer on every
//! node, since in a tagged enum the "slot" is just whichever field the
//! child currently occupies.

pub mod builder;
pub mod program;

pub use program::Program;

/// Index into a `Program`'s statement arena. Never reused across clones:
/// `CloneCtx` (see `crate::clone`) always produces fresh ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(pub u32);

/// Index into a `Program`'s expression arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(pub u32);

/// Index into `Program::args`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArgId(pub u32);

/// Index into `Program::locals`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalId(pub u32);

/// Where a node is currently owned from. `Root` means "the program's own
/// body scope", the one container that isn't itself addressed by a
/// `StmtId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeRef {
    Stmt(StmtId),
    Expr(ExprId),
    Root,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Max => "max",
            BinOp::Min => "min",
            BinOp::Pow => "pow",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Exp,
    Log,
    Sqrt,
    Abs,
}

impl UnOp {
    pub fn name(self) -> &'static str {
        match self {
            UnOp::Exp => "exp",
            UnOp::Log => "log",
            UnOp::Sqrt => "sqrt",
            UnOp::Abs => "abs",
        }
    }
}

/// An expression node's payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    Constant(i64),
    ConstantFP(f64),
    /// Only ever legal as a direct `Call` parameter; `verify()` rejects it
    /// anywhere else.
    ConstantString(String),
    /// The value of the counter of the referenced `Loop`.
    Index(StmtId),
    Load { src: ArgId, indices: Vec<ExprId> },
    LoadLocal(LocalId),
    Binary { op: BinOp, lhs: ExprId, rhs: ExprId },
    Unary { op: UnOp, val: ExprId },
    Broadcast { val: ExprId, width: u32 },
    /// Row-major address of the element at `indices`, for use by back-ends.
    Gep { dest: ArgId, indices: Vec<ExprId> },
}

#[derive(Debug, Clone)]
pub struct ExprNode {
    pub kind: ExprKind,
    pub ty: crate::types::ExprType,
    pub parent: Option<NodeRef>,
}

/// A statement node's payload. `body` fields are the "Scope" of §3: an
/// ordered, mutable list of owned child statements.
#[derive(Debug, Clone)]
pub enum StmtKind {
    Loop { index_name: String, end: u64, stride: u64, body: Vec<StmtId> },
    IfRange { index: ExprId, lo: i64, hi: i64, body: Vec<StmtId> },
    Store { dest: ArgId, indices: Vec<ExprId>, value: ExprId, accumulate: bool },
    StoreLocal { dest: LocalId, value: ExprId, accumulate: bool },
    Call { name: String, params: Vec<ExprId> },
}

impl StmtKind {
    pub fn body(&self) -> Option<&[StmtId]> {
        match self {
            StmtKind::Loop { body, .. } | StmtKind::IfRange { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn body_mut(&mut self) -> Option<&mut Vec<StmtId>> {
        match self {
            StmtKind::Loop { body, .. } | StmtKind::IfRange { body, .. } => Some(body),
            _ => None,
        }
    }

    pub fn is_loop(&self) -> bool {
        matches!(self, StmtKind::Loop { .. })
    }
}

#[derive(Debug, Clone)]
pub struct StmtNode {
    pub kind: StmtKind,
    pub parent: Option<NodeRef>,
}
