//! Free constructor functions for IR nodes, in the same spirit as nanoda's
//! `mk_var`/`mk_app`/`mk_sort` family in `expr.rs`: each one validates its
//! arguments, computes whatever the node needs eagerly (here, the node's
//! `ExprType`, there, the `ExprCache` digest), and hands back an id from the
//! owning `Program`'s arena. Nothing here mutates anything but the program
//! passed in.

use crate::errors::{BistraError, BistraResult};
use crate::ir::{ArgId, ExprId, ExprKind, LocalId, Program, StmtId, StmtKind, UnOp, BinOp};
use crate::types::{is_valid_name, ElemKind, ExprType};

pub fn mk_constant(p: &mut Program, val: i64) -> ExprId {
    p.push_expr(ExprKind::Constant(val))
}

pub fn mk_constant_fp(p: &mut Program, val: f64) -> ExprId {
    p.push_expr(ExprKind::ConstantFP(val))
}

pub fn mk_constant_string(p: &mut Program, val: impl Into<String>) -> ExprId {
    p.push_expr(ExprKind::ConstantString(val.into()))
}

/// An integer constant tagged with an explicit arithmetic `ElemKind` (i8 or
/// i32), rather than the `index` kind `mk_constant` infers by default.
pub fn mk_typed_constant(p: &mut Program, val: i64, elem: ElemKind) -> BistraResult<ExprId> {
    if !elem.is_scalar_arith() {
        return Err(BistraError::PreconditionFailed("mk_typed_constant requires an arithmetic ElemKind"));
    }
    let id = p.push_expr(ExprKind::Constant(val));
    p.expr_mut(id).ty = ExprType::scalar(elem);
    Ok(id)
}

/// References the counter of `loop_id`, which must be a `Loop` statement
/// already present in `p`'s arena (an ancestor-scope check is `verify()`'s
/// job, not the builder's).
pub fn mk_index(p: &mut Program, loop_id: StmtId) -> BistraResult<ExprId> {
    if !p.stmt(loop_id).kind.is_loop() {
        return Err(BistraError::UnknownLoop(format!("stmt {} is not a Loop", loop_id.0)));
    }
    Ok(p.push_expr(ExprKind::Index(loop_id)))
}

pub fn mk_load(p: &mut Program, src: ArgId, indices: Vec<ExprId>) -> BistraResult<ExprId> {
    let extents = p.arg(src).ty.num_dims();
    if indices.len() != extents {
        return Err(BistraError::ArityMismatch { expected: extents, got: indices.len(), context: "Load" });
    }
    Ok(p.push_expr(ExprKind::Load { src, indices }))
}

pub fn mk_load_local(p: &mut Program, local: LocalId) -> ExprId {
    p.push_expr(ExprKind::LoadLocal(local))
}

pub fn mk_binary(p: &mut Program, op: BinOp, lhs: ExprId, rhs: ExprId) -> BistraResult<ExprId> {
    let lty = p.expr(lhs).ty;
    let rty = p.expr(rhs).ty;
    if lty != rty {
        return Err(BistraError::TypeMismatch { op: op.symbol(), lhs: lty.to_string(), rhs: rty.to_string() });
    }
    Ok(p.push_expr(ExprKind::Binary { op, lhs, rhs }))
}

pub fn mk_unary(p: &mut Program, op: UnOp, val: ExprId) -> ExprId {
    p.push_expr(ExprKind::Unary { op, val })
}

pub fn mk_broadcast(p: &mut Program, val: ExprId, width: u32) -> BistraResult<ExprId> {
    if width < 1 {
        return Err(BistraError::PreconditionFailed("broadcast width must be >= 1"));
    }
    Ok(p.push_expr(ExprKind::Broadcast { val, width }))
}

pub fn mk_gep(p: &mut Program, dest: ArgId, indices: Vec<ExprId>) -> BistraResult<ExprId> {
    let extents = p.arg(dest).ty.num_dims();
    if indices.len() != extents {
        return Err(BistraError::ArityMismatch { expected: extents, got: indices.len(), context: "Gep" });
    }
    Ok(p.push_expr(ExprKind::Gep { dest, indices }))
}

/// A `Loop` with an empty body. `end % stride == 0` and both strictly
/// positive.
pub fn mk_loop(p: &mut Program, index_name: impl Into<String>, end: u64, stride: u64) -> BistraResult<StmtId> {
    let index_name = index_name.into();
    if !is_valid_name(&index_name) {
        return Err(BistraError::MalformedName(index_name));
    }
    if stride == 0 || end == 0 || end % stride != 0 {
        return Err(BistraError::BadLoopBounds { end, stride });
    }
    Ok(p.push_stmt(StmtKind::Loop { index_name, end, stride, body: Vec::new() }))
}

pub fn mk_if_range(p: &mut Program, index: ExprId, lo: i64, hi: i64) -> BistraResult<StmtId> {
    if lo > hi {
        return Err(BistraError::PreconditionFailed("IfRange requires lo <= hi"));
    }
    Ok(p.push_stmt(StmtKind::IfRange { index, lo, hi, body: Vec::new() }))
}

pub fn mk_store(p: &mut Program, dest: ArgId, indices: Vec<ExprId>, value: ExprId, accumulate: bool) -> BistraResult<StmtId> {
    let extents = p.arg(dest).ty.num_dims();
    if indices.len() != extents {
        return Err(BistraError::ArityMismatch { expected: extents, got: indices.len(), context: "Store" });
    }
    Ok(p.push_stmt(StmtKind::Store { dest, indices, value, accumulate }))
}

pub fn mk_store_local(p: &mut Program, dest: LocalId, value: ExprId, accumulate: bool) -> StmtId {
    p.push_stmt(StmtKind::StoreLocal { dest, value, accumulate })
}

pub fn mk_call(p: &mut Program, name: impl Into<String>, params: Vec<ExprId>) -> StmtId {
    p.push_stmt(StmtKind::Call { name: name.into(), params })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Argument, TensorType};

    fn test_program() -> Program {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 16)]));
        Program::new("kernel", vec![arg], Vec::new())
    }

    #[test]
    fn load_arity_checked() {
        let mut p = test_program();
        let a = ArgId(0);
        let idx = mk_constant(&mut p, 0);
        assert!(mk_load(&mut p, a, vec![idx]).is_ok());
        let idx2 = mk_constant(&mut p, 1);
        assert!(mk_load(&mut p, a, vec![idx, idx2]).is_err());
    }

    #[test]
    fn binary_requires_matching_types() {
        let mut p = test_program();
        let c = mk_constant(&mut p, 3);
        let f = mk_constant_fp(&mut p, 3.0);
        assert!(mk_binary(&mut p, BinOp::Add, c, c).is_ok());
        assert!(mk_binary(&mut p, BinOp::Add, c, f).is_err());
    }

    #[test]
    fn loop_bounds_validated() {
        let mut p = test_program();
        assert!(mk_loop(&mut p, "i", 16, 4).is_ok());
        assert!(mk_loop(&mut p, "i", 16, 3).is_err());
        assert!(mk_loop(&mut p, "0i", 16, 4).is_err());
    }
}
