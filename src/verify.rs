//! Well-formedness checks over a built/transformed `Program`. Every
//! transform is expected to leave the IR passing `verify()` before handing
//! off to the next pass; a failure here is an internal-compiler-bug class
//! condition (`VerifyError`), never a user-facing one.

use crate::errors::{BistraError, VerifyError};
use crate::ir::{ExprKind, NodeRef, Program, StmtId, StmtKind};
use crate::types::is_valid_name;
use hashbrown::HashSet;

pub fn verify(p: &Program) -> Result<(), VerifyError> {
    check_names(p).map_err(VerifyError)?;
    check_loop_bounds(p).map_err(VerifyError)?;
    check_arity(p).map_err(VerifyError)?;
    check_types(p).map_err(VerifyError)?;
    check_index_scoping(p).map_err(VerifyError)?;
    check_constant_string_placement(p).map_err(VerifyError)?;
    check_parent_consistency(p).map_err(VerifyError)?;
    Ok(())
}

fn check_names(p: &Program) -> Result<(), BistraError> {
    if !is_valid_name(&p.name) {
        return Err(BistraError::MalformedName(p.name.clone()));
    }
    for a in &p.args {
        if !is_valid_name(&a.name) {
            return Err(BistraError::MalformedName(a.name.clone()));
        }
    }
    for l in &p.locals {
        if !is_valid_name(&l.name) {
            return Err(BistraError::MalformedName(l.name.clone()));
        }
    }
    for id in p.stmt_ids() {
        if let StmtKind::Loop { index_name, .. } = &p.stmt(id).kind {
            if !is_valid_name(index_name) {
                return Err(BistraError::MalformedName(index_name.clone()));
            }
        }
    }
    Ok(())
}

fn check_loop_bounds(p: &Program) -> Result<(), BistraError> {
    for id in p.stmt_ids() {
        if let StmtKind::Loop { end, stride, .. } = &p.stmt(id).kind {
            if *stride == 0 || *end == 0 || *end % *stride != 0 {
                return Err(BistraError::BadLoopBounds { end: *end, stride: *stride });
            }
        }
    }
    Ok(())
}

fn check_arity(p: &Program) -> Result<(), BistraError> {
    for id in p.stmt_ids() {
        if let StmtKind::Store { dest, indices, .. } = &p.stmt(id).kind {
            let expected = p.arg(*dest).ty.num_dims();
            if indices.len() != expected {
                return Err(BistraError::ArityMismatch { expected, got: indices.len(), context: "Store" });
            }
        }
    }
    for idx in 0..p.num_exprs() {
        let id = crate::ir::ExprId(idx as u32);
        match &p.expr(id).kind {
            ExprKind::Load { src, indices } => {
                let expected = p.arg(*src).ty.num_dims();
                if indices.len() != expected {
                    return Err(BistraError::ArityMismatch { expected, got: indices.len(), context: "Load" });
                }
            }
            ExprKind::Gep { dest, indices } => {
                let expected = p.arg(*dest).ty.num_dims();
                if indices.len() != expected {
                    return Err(BistraError::ArityMismatch { expected, got: indices.len(), context: "Gep" });
                }
            }
            _ => {}
        }
    }
    Ok(())
}

/// (a) every `Binary`'s operands carry equal `ExprType`s, and (b) every
/// `Load`/`Store`'s last index has the same lane width as the loaded/stored
/// value. `mk_binary` enforces (a) at construction time, but a transform
/// that rewrites an operand's width in place (e.g. `vectorize` widening one
/// side of an expression tree) can desync the two without going back
/// through the builder; this walk catches that after the fact. Likewise
/// (b) catches a transform that widens a `Load`/`Store`'s value without
/// widening its last subscript to match, which `Program::infer_type` would
/// otherwise silently revert on the next `resync_type`.
fn check_types(p: &Program) -> Result<(), BistraError> {
    for idx in 0..p.num_exprs() {
        let id = crate::ir::ExprId(idx as u32);
        match &p.expr(id).kind {
            ExprKind::Binary { op, lhs, rhs } => {
                let lty = p.expr(*lhs).ty;
                let rty = p.expr(*rhs).ty;
                if lty != rty {
                    return Err(BistraError::TypeMismatch { op: op.symbol(), lhs: lty.to_string(), rhs: rty.to_string() });
                }
            }
            ExprKind::Load { indices, .. } => {
                if let Some(&last) = indices.last() {
                    let value_width = p.expr(id).ty.width;
                    let index_width = p.expr(last).ty.width;
                    if index_width != value_width {
                        return Err(BistraError::WidthMismatch { context: "Load", value_width, index_width });
                    }
                }
            }
            _ => {}
        }
    }
    for id in p.stmt_ids() {
        if let StmtKind::Store { indices, value, .. } = &p.stmt(id).kind {
            if let Some(&last) = indices.last() {
                let value_width = p.expr(*value).ty.width;
                let index_width = p.expr(last).ty.width;
                if index_width != value_width {
                    return Err(BistraError::WidthMismatch { context: "Store", value_width, index_width });
                }
            }
        }
    }
    Ok(())
}

/// Every `IndexExpr(loop)` must reference a `Loop` that is a proper
/// ancestor of the expression in the statement tree, never a sibling,
/// descendant, or a loop that has already closed.
fn check_index_scoping(p: &Program) -> Result<(), BistraError> {
    fn walk(p: &Program, scope: Option<StmtId>, ancestors: &[StmtId]) -> Result<(), BistraError> {
        for &id in p.scope_body(scope) {
            match &p.stmt(id).kind {
                StmtKind::Loop { .. } => {
                    let mut next = ancestors.to_vec();
                    next.push(id);
                    walk(p, Some(id), &next)?;
                }
                StmtKind::IfRange { index, body: _, .. } => {
                    check_expr_index_scoping(p, *index, ancestors)?;
                    walk(p, Some(id), ancestors)?;
                }
                StmtKind::Store { indices, value, .. } => {
                    for &e in indices {
                        check_expr_index_scoping(p, e, ancestors)?;
                    }
                    check_expr_index_scoping(p, *value, ancestors)?;
                }
                StmtKind::StoreLocal { value, .. } => {
                    check_expr_index_scoping(p, *value, ancestors)?;
                }
                StmtKind::Call { params, .. } => {
                    for &e in params {
                        check_expr_index_scoping(p, e, ancestors)?;
                    }
                }
            }
        }
        Ok(())
    }
    walk(p, None, &[])
}

fn check_expr_index_scoping(p: &Program, id: crate::ir::ExprId, ancestors: &[StmtId]) -> Result<(), BistraError> {
    match &p.expr(id).kind {
        ExprKind::Index(loop_id) => {
            if !ancestors.contains(loop_id) {
                let name = p.loop_name(*loop_id).unwrap_or("?").to_string();
                return Err(BistraError::LoopIndexOutOfScope(name));
            }
            Ok(())
        }
        ExprKind::Load { indices, .. } | ExprKind::Gep { indices, .. } => {
            for &e in indices {
                check_expr_index_scoping(p, e, ancestors)?;
            }
            Ok(())
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            check_expr_index_scoping(p, *lhs, ancestors)?;
            check_expr_index_scoping(p, *rhs, ancestors)
        }
        ExprKind::Unary { val, .. } | ExprKind::Broadcast { val, .. } => check_expr_index_scoping(p, *val, ancestors),
        ExprKind::Constant(_) | ExprKind::ConstantFP(_) | ExprKind::ConstantString(_) | ExprKind::LoadLocal(_) => Ok(()),
    }
}

/// `ConstantString` is legal only as a direct `Call` parameter.
fn check_constant_string_placement(p: &Program) -> Result<(), BistraError> {
    let mut allowed: HashSet<crate::ir::ExprId> = HashSet::new();
    for id in p.stmt_ids() {
        if let StmtKind::Call { params, .. } = &p.stmt(id).kind {
            for &e in params {
                allowed.insert(e);
            }
        }
    }
    for idx in 0..p.num_exprs() {
        let id = crate::ir::ExprId(idx as u32);
        if matches!(p.expr(id).kind, ExprKind::ConstantString(_)) && !allowed.contains(&id) {
            return Err(BistraError::PreconditionFailed("ConstantString used outside of a Call parameter"));
        }
    }
    Ok(())
}

/// H1: every reachable child's recorded `parent` matches the node it is
/// actually reachable from. Catches the class of bug where a transform
/// moves a subtree without calling `sync_stmt_children`/`sync_expr_children`.
fn check_parent_consistency(p: &Program) -> Result<(), BistraError> {
    fn check_stmt_children(p: &Program, owner: NodeRef, id: StmtId) -> Result<(), BistraError> {
        if p.stmt(id).parent != Some(owner) {
            return Err(BistraError::PreconditionFailed("stmt parent pointer inconsistent with actual owner"));
        }
        Ok(())
    }
    fn check_expr_children(p: &Program, owner: NodeRef, id: crate::ir::ExprId) -> Result<(), BistraError> {
        if p.expr(id).parent != Some(owner) {
            return Err(BistraError::PreconditionFailed("expr parent pointer inconsistent with actual owner"));
        }
        Ok(())
    }
    for &s in &p.body {
        check_stmt_children(p, NodeRef::Root, s)?;
    }
    for id in p.stmt_ids() {
        let owner = NodeRef::Stmt(id);
        match &p.stmt(id).kind {
            StmtKind::Loop { body, .. } => {
                for &s in body {
                    check_stmt_children(p, owner, s)?;
                }
            }
            StmtKind::IfRange { index, body, .. } => {
                check_expr_children(p, owner, *index)?;
                for &s in body {
                    check_stmt_children(p, owner, s)?;
                }
            }
            StmtKind::Store { indices, value, .. } => {
                for &e in indices {
                    check_expr_children(p, owner, e)?;
                }
                check_expr_children(p, owner, *value)?;
            }
            StmtKind::StoreLocal { value, .. } => {
                check_expr_children(p, owner, *value)?;
            }
            StmtKind::Call { params, .. } => {
                for &e in params {
                    check_expr_children(p, owner, e)?;
                }
            }
        }
    }
    for idx in 0..p.num_exprs() {
        let id = crate::ir::ExprId(idx as u32);
        let owner = NodeRef::Expr(id);
        match &p.expr(id).kind {
            ExprKind::Load { indices, .. } | ExprKind::Gep { indices, .. } => {
                for &e in indices {
                    check_expr_children(p, owner, e)?;
                }
            }
            ExprKind::Binary { lhs, rhs, .. } => {
                check_expr_children(p, owner, *lhs)?;
                check_expr_children(p, owner, *rhs)?;
            }
            ExprKind::Unary { val, .. } | ExprKind::Broadcast { val, .. } => {
                check_expr_children(p, owner, *val)?;
            }
            ExprKind::Constant(_) | ExprKind::ConstantFP(_) | ExprKind::ConstantString(_) | ExprKind::Index(_) | ExprKind::LoadLocal(_) => {}
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    fn valid_program() -> Program {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 4)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 4, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);
        p
    }

    #[test]
    fn valid_program_passes() {
        assert!(verify(&valid_program()).is_ok());
    }

    #[test]
    fn out_of_scope_index_rejected() {
        let mut p = valid_program();
        let l2 = mk_loop(&mut p, "j", 4, 1).unwrap();
        let stray_idx = p.push_expr(ExprKind::Index(l2));
        let val = mk_constant_fp(&mut p, 2.0);
        let st = mk_store(&mut p, ArgId(0), vec![stray_idx], val, false).unwrap();
        // attach st under the root-level loop l (not under l2) so l2's index is out of scope
        let l = p.body[0];
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l2);
        assert!(verify(&p).is_err());
    }

    #[test]
    fn mismatched_binary_operand_widths_rejected() {
        let mut p = valid_program();
        let one = mk_constant(&mut p, 1);
        let two = mk_constant(&mut p, 2);
        let add = mk_binary(&mut p, crate::ir::BinOp::Add, one, two).unwrap();
        // desync rhs's width behind mk_binary's back, as a buggy widening
        // transform would.
        let rty = p.expr(two).ty;
        p.expr_mut(two).ty = rty.with_width(4);
        let _ = add;
        assert!(matches!(verify(&p), Err(VerifyError(BistraError::TypeMismatch { .. }))));
    }

    #[test]
    fn load_last_index_width_must_match_value_width() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 4)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 4, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let load = mk_load(&mut p, ArgId(0), vec![idx]).unwrap();
        // widen the loaded value's width without widening its subscript, as
        // an incomplete vectorization would.
        let lty = p.expr(load).ty;
        p.expr_mut(load).ty = lty.with_width(4);
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![mk_index(&mut p, l).unwrap()], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);
        assert!(matches!(verify(&p), Err(VerifyError(BistraError::WidthMismatch { .. }))));
    }
}
