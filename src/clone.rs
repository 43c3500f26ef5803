//! Structural deep-clone of a `Program` (or a subtree within one) into a
//! fresh arena. Every transform that needs an independent copy to mutate
//! speculatively (the autotuning driver's variant search, chief among them)
//! goes through here rather than sharing nodes, since the IR's arena ids are
//! only unique within a single `Program`.

use crate::ir::{ExprId, ExprKind, Program, StmtId, StmtKind};
use hashbrown::HashMap;

/// Tracks the old-id -> new-id mapping as a subtree is copied, so that
/// `IndexExpr(loop)` references rewrite to point at the loop's clone rather
/// than the original.
#[derive(Default)]
pub struct CloneCtx {
    stmts: HashMap<StmtId, StmtId>,
    exprs: HashMap<ExprId, ExprId>,
}

impl CloneCtx {
    pub fn new() -> Self {
        CloneCtx::default()
    }

    pub fn mapped_stmt(&self, old: StmtId) -> Option<StmtId> {
        self.stmts.get(&old).copied()
    }

    pub fn mapped_expr(&self, old: ExprId) -> Option<ExprId> {
        self.exprs.get(&old).copied()
    }
}

/// Deep-clone an entire program: args and locals are copied verbatim (their
/// ids are positional and stay stable), the statement/expression arenas are
/// rebuilt node-by-node in traversal order.
pub fn clone_program(src: &Program) -> Program {
    let mut dst = Program::new(src.name.clone(), src.args.clone(), src.locals.clone());
    let mut ctx = CloneCtx::new();
    let new_body: Vec<StmtId> = src.body.iter().map(|&s| clone_stmt(src, &mut dst, &mut ctx, s)).collect();
    dst.body = new_body;
    dst.sync_root_children();
    dst
}

pub fn clone_stmt(src: &Program, dst: &mut Program, ctx: &mut CloneCtx, id: StmtId) -> StmtId {
    if let Some(new) = ctx.mapped_stmt(id) {
        return new;
    }
    let new_id = match &src.stmt(id).kind {
        StmtKind::Loop { index_name, end, stride, body } => {
            // Reserve an id before recursing so nested `IndexExpr(this loop)`
            // references can resolve even while the body is still copying.
            let placeholder = dst.push_stmt(StmtKind::Loop { index_name: index_name.clone(), end: *end, stride: *stride, body: Vec::new() });
            ctx.stmts.insert(id, placeholder);
            let new_body: Vec<StmtId> = body.iter().map(|&s| clone_stmt(src, dst, ctx, s)).collect();
            if let StmtKind::Loop { body, .. } = &mut dst.stmt_mut(placeholder).kind {
                *body = new_body;
            }
            dst.sync_stmt_children(placeholder);
            placeholder
        }
        StmtKind::IfRange { index, lo, hi, body } => {
            let new_index = clone_expr(src, dst, ctx, *index);
            let new_body: Vec<StmtId> = body.iter().map(|&s| clone_stmt(src, dst, ctx, s)).collect();
            dst.push_stmt(StmtKind::IfRange { index: new_index, lo: *lo, hi: *hi, body: new_body })
        }
        StmtKind::Store { dest, indices, value, accumulate } => {
            let new_indices: Vec<ExprId> = indices.iter().map(|&e| clone_expr(src, dst, ctx, e)).collect();
            let new_value = clone_expr(src, dst, ctx, *value);
            dst.push_stmt(StmtKind::Store { dest: *dest, indices: new_indices, value: new_value, accumulate: *accumulate })
        }
        StmtKind::StoreLocal { dest, value, accumulate } => {
            let new_value = clone_expr(src, dst, ctx, *value);
            dst.push_stmt(StmtKind::StoreLocal { dest: *dest, value: new_value, accumulate: *accumulate })
        }
        StmtKind::Call { name, params } => {
            let new_params: Vec<ExprId> = params.iter().map(|&e| clone_expr(src, dst, ctx, e)).collect();
            dst.push_stmt(StmtKind::Call { name: name.clone(), params: new_params })
        }
    };
    ctx.stmts.insert(id, new_id);
    new_id
}

pub fn clone_expr(src: &Program, dst: &mut Program, ctx: &mut CloneCtx, id: ExprId) -> ExprId {
    if let Some(new) = ctx.mapped_expr(id) {
        return new;
    }
    let new_id = match &src.expr(id).kind {
        ExprKind::Constant(v) => dst.push_expr(ExprKind::Constant(*v)),
        ExprKind::ConstantFP(v) => dst.push_expr(ExprKind::ConstantFP(*v)),
        ExprKind::ConstantString(v) => dst.push_expr(ExprKind::ConstantString(v.clone())),
        ExprKind::Index(loop_id) => {
            // The referenced loop may not have been cloned yet if this
            // expression is reached before its owning loop (shouldn't
            // happen in a well-formed program, but `clone_stmt` reserves
            // the loop's id before recursing into its body specifically
            // to make this lookup always succeed for in-scope references).
            let new_loop = ctx.mapped_stmt(*loop_id).unwrap_or(*loop_id);
            dst.push_expr(ExprKind::Index(new_loop))
        }
        ExprKind::Load { src: arg, indices } => {
            let new_indices: Vec<ExprId> = indices.iter().map(|&e| clone_expr(src, dst, ctx, e)).collect();
            dst.push_expr(ExprKind::Load { src: *arg, indices: new_indices })
        }
        ExprKind::LoadLocal(l) => dst.push_expr(ExprKind::LoadLocal(*l)),
        ExprKind::Binary { op, lhs, rhs } => {
            let new_lhs = clone_expr(src, dst, ctx, *lhs);
            let new_rhs = clone_expr(src, dst, ctx, *rhs);
            dst.push_expr(ExprKind::Binary { op: *op, lhs: new_lhs, rhs: new_rhs })
        }
        ExprKind::Unary { op, val } => {
            let new_val = clone_expr(src, dst, ctx, *val);
            dst.push_expr(ExprKind::Unary { op: *op, val: new_val })
        }
        ExprKind::Broadcast { val, width } => {
            let new_val = clone_expr(src, dst, ctx, *val);
            dst.push_expr(ExprKind::Broadcast { val: new_val, width: *width })
        }
        ExprKind::Gep { dest, indices } => {
            let new_indices: Vec<ExprId> = indices.iter().map(|&e| clone_expr(src, dst, ctx, e)).collect();
            dst.push_expr(ExprKind::Gep { dest: *dest, indices: new_indices })
        }
    };
    ctx.exprs.insert(id, new_id);
    new_id
}

/// Clone a statement subtree into the *same* program's arena — used by
/// `peel`/`unroll`/`widen`, which need extra independent copies of a loop
/// body within the program they're already transforming. Any `IndexExpr`
/// naming a loop inside the cloned subtree is retargeted to that loop's
/// clone; `IndexExpr`s naming a loop outside the subtree (an enclosing
/// loop) are left pointing at the original, since there is no clone of it.
pub fn clone_stmt_within(p: &mut Program, id: StmtId) -> StmtId {
    let mut ctx = CloneCtx::new();
    clone_stmt_within_rec(p, &mut ctx, id)
}

/// Same idea as `clone_stmt_within`, for a single expression subtree —
/// used when a transform needs an independent copy of a subscript list
/// rather than a whole statement (`promoteLICM`'s post-loop store).
pub fn clone_expr_within(p: &mut Program, id: ExprId) -> ExprId {
    let mut ctx = CloneCtx::new();
    clone_expr_within_rec(p, &mut ctx, id)
}

fn clone_stmt_within_rec(p: &mut Program, ctx: &mut CloneCtx, id: StmtId) -> StmtId {
    if let Some(new) = ctx.mapped_stmt(id) {
        return new;
    }
    let kind = p.stmt(id).kind.clone();
    let new_id = match kind {
        StmtKind::Loop { index_name, end, stride, body } => {
            let placeholder = p.push_stmt(StmtKind::Loop { index_name, end, stride, body: Vec::new() });
            ctx.stmts.insert(id, placeholder);
            let new_body: Vec<StmtId> = body.iter().map(|&s| clone_stmt_within_rec(p, ctx, s)).collect();
            if let StmtKind::Loop { body, .. } = &mut p.stmt_mut(placeholder).kind {
                *body = new_body;
            }
            p.sync_stmt_children(placeholder);
            placeholder
        }
        StmtKind::IfRange { index, lo, hi, body } => {
            let new_index = clone_expr_within_rec(p, ctx, index);
            let new_body: Vec<StmtId> = body.iter().map(|&s| clone_stmt_within_rec(p, ctx, s)).collect();
            p.push_stmt(StmtKind::IfRange { index: new_index, lo, hi, body: new_body })
        }
        StmtKind::Store { dest, indices, value, accumulate } => {
            let new_indices: Vec<ExprId> = indices.iter().map(|&e| clone_expr_within_rec(p, ctx, e)).collect();
            let new_value = clone_expr_within_rec(p, ctx, value);
            p.push_stmt(StmtKind::Store { dest, indices: new_indices, value: new_value, accumulate })
        }
        StmtKind::StoreLocal { dest, value, accumulate } => {
            let new_value = clone_expr_within_rec(p, ctx, value);
            p.push_stmt(StmtKind::StoreLocal { dest, value: new_value, accumulate })
        }
        StmtKind::Call { name, params } => {
            let new_params: Vec<ExprId> = params.iter().map(|&e| clone_expr_within_rec(p, ctx, e)).collect();
            p.push_stmt(StmtKind::Call { name, params: new_params })
        }
    };
    ctx.stmts.insert(id, new_id);
    new_id
}

fn clone_expr_within_rec(p: &mut Program, ctx: &mut CloneCtx, id: ExprId) -> ExprId {
    if let Some(new) = ctx.mapped_expr(id) {
        return new;
    }
    let kind = p.expr(id).kind.clone();
    let new_id = match kind {
        ExprKind::Constant(v) => p.push_expr(ExprKind::Constant(v)),
        ExprKind::ConstantFP(v) => p.push_expr(ExprKind::ConstantFP(v)),
        ExprKind::ConstantString(v) => p.push_expr(ExprKind::ConstantString(v)),
        ExprKind::Index(loop_id) => {
            let target = ctx.mapped_stmt(loop_id).unwrap_or(loop_id);
            p.push_expr(ExprKind::Index(target))
        }
        ExprKind::Load { src, indices } => {
            let new_indices: Vec<ExprId> = indices.iter().map(|&e| clone_expr_within_rec(p, ctx, e)).collect();
            p.push_expr(ExprKind::Load { src, indices: new_indices })
        }
        ExprKind::LoadLocal(l) => p.push_expr(ExprKind::LoadLocal(l)),
        ExprKind::Binary { op, lhs, rhs } => {
            let new_lhs = clone_expr_within_rec(p, ctx, lhs);
            let new_rhs = clone_expr_within_rec(p, ctx, rhs);
            p.push_expr(ExprKind::Binary { op, lhs: new_lhs, rhs: new_rhs })
        }
        ExprKind::Unary { op, val } => {
            let new_val = clone_expr_within_rec(p, ctx, val);
            p.push_expr(ExprKind::Unary { op, val: new_val })
        }
        ExprKind::Broadcast { val, width } => {
            let new_val = clone_expr_within_rec(p, ctx, val);
            p.push_expr(ExprKind::Broadcast { val: new_val, width })
        }
        ExprKind::Gep { dest, indices } => {
            let new_indices: Vec<ExprId> = indices.iter().map(|&e| clone_expr_within_rec(p, ctx, e)).collect();
            p.push_expr(ExprKind::Gep { dest, indices: new_indices })
        }
    };
    ctx.exprs.insert(id, new_id);
    new_id
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::{ArgId, BinOp};
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn clone_preserves_shape_and_index_targets() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 4)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 4, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let one = mk_constant(&mut p, 1);
        let sum = mk_binary(&mut p, BinOp::Add, idx, one).unwrap();
        // The indices slot and the value's `sum` operand are two distinct
        // owned slots, so each needs its own `IndexExpr` node.
        let st = mk_store(&mut p, ArgId(0), vec![mk_index(&mut p, l).unwrap()], sum, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let cloned = clone_program(&p);
        assert_eq!(cloned.num_stmts(), p.num_stmts());
        assert_eq!(cloned.num_exprs(), p.num_exprs());
        assert_eq!(cloned.body.len(), 1);
        let new_loop = cloned.body[0];
        let body = cloned.stmt(new_loop).kind.body().unwrap();
        assert_eq!(body.len(), 1);
        if let crate::ir::StmtKind::Store { indices, .. } = &cloned.stmt(body[0]).kind {
            if let crate::ir::ExprKind::Index(referenced) = &cloned.expr(indices[0]).kind {
                assert_eq!(*referenced, new_loop);
            } else {
                panic!("expected Index expr");
            }
        } else {
            panic!("expected Store stmt");
        }
    }
}
