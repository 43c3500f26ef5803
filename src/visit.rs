//! Depth-first traversal over a `Program`'s statement/expression tree, with
//! `enter`/`leave` hooks per node. Traversal order is fixed: a scope's body
//! in list order; a `Binary`'s `lhs` before its `rhs`; a `Load`/`Store`'s
//! indices in position order, with `Store`'s value visited last.

use crate::ir::{ExprId, ExprKind, Program, StmtId, StmtKind};

/// Implement only the hooks you need; every method has a no-op default, the
/// same shape as a `NodeVisitor` over the old downcast hierarchy but without
/// needing a base-class dispatch vtable.
pub trait Visitor {
    fn enter_stmt(&mut self, _p: &Program, _id: StmtId) {}
    fn leave_stmt(&mut self, _p: &Program, _id: StmtId) {}
    fn enter_expr(&mut self, _p: &Program, _id: ExprId) {}
    fn leave_expr(&mut self, _p: &Program, _id: ExprId) {}
}

pub fn walk_program<V: Visitor>(p: &Program, v: &mut V) {
    for &s in &p.body {
        walk_stmt(p, v, s);
    }
}

pub fn walk_stmt<V: Visitor>(p: &Program, v: &mut V, id: StmtId) {
    v.enter_stmt(p, id);
    match &p.stmt(id).kind {
        StmtKind::Loop { body, .. } => {
            for &s in body {
                walk_stmt(p, v, s);
            }
        }
        StmtKind::IfRange { index, body, .. } => {
            walk_expr(p, v, *index);
            for &s in body {
                walk_stmt(p, v, s);
            }
        }
        StmtKind::Store { indices, value, .. } => {
            for &i in indices {
                walk_expr(p, v, i);
            }
            walk_expr(p, v, *value);
        }
        StmtKind::StoreLocal { value, .. } => {
            walk_expr(p, v, *value);
        }
        StmtKind::Call { params, .. } => {
            for &param in params {
                walk_expr(p, v, param);
            }
        }
    }
    v.leave_stmt(p, id);
}

pub fn walk_expr<V: Visitor>(p: &Program, v: &mut V, id: ExprId) {
    v.enter_expr(p, id);
    match &p.expr(id).kind {
        ExprKind::Constant(_) | ExprKind::ConstantFP(_) | ExprKind::ConstantString(_) | ExprKind::Index(_) | ExprKind::LoadLocal(_) => {}
        ExprKind::Load { indices, .. } => {
            for &i in indices {
                walk_expr(p, v, i);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            walk_expr(p, v, *lhs);
            walk_expr(p, v, *rhs);
        }
        ExprKind::Unary { val, .. } => walk_expr(p, v, *val),
        ExprKind::Broadcast { val, .. } => walk_expr(p, v, *val),
        ExprKind::Gep { indices, .. } => {
            for &i in indices {
                walk_expr(p, v, i);
            }
        }
    }
    v.leave_expr(p, id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::{ArgId, BinOp};
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn visits_loop_body_in_order() {
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

        struct Counter {
            stmts: usize,
            exprs: usize,
        }
        impl Visitor for Counter {
            fn enter_stmt(&mut self, _p: &Program, _id: StmtId) {
                self.stmts += 1;
            }
            fn enter_expr(&mut self, _p: &Program, _id: ExprId) {
                self.exprs += 1;
            }
        }
        let mut c = Counter { stmts: 0, exprs: 0 };
        walk_program(&p, &mut c);
        assert_eq!(c.stmts, 2);
        assert_eq!(c.exprs, 4);
    }
}
