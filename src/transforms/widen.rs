//! `widen(L, W)`. Precondition: `L.end % (L.stride * W) == 0`. Duplicates
//! the loop body `W` times; the k-th copy's `IndexExpr(L)` references
//! become `IndexExpr(L) + k * L.stride`; `L.stride *= W`. Equivalent to
//! unrolling the innermost factor of a tiled loop without materializing an
//! inner loop.

use crate::errors::{BistraError, BistraResult};
use crate::ir::{BinOp, ExprKind, Program, StmtId, StmtKind};

pub fn widen(p: &mut Program, loop_id: StmtId, w: u64) -> BistraResult<()> {
    let (end, stride) = match &p.stmt(loop_id).kind {
        StmtKind::Loop { end, stride, .. } => (*end, *stride),
        _ => return Err(BistraError::PreconditionFailed("widen target is not a Loop")),
    };
    if w == 0 || end % (stride * w) != 0 {
        return Err(BistraError::PreconditionFailed("widen requires L.end % (L.stride * W) == 0"));
    }

    let original_body = if let StmtKind::Loop { body, .. } = &p.stmt(loop_id).kind { body.clone() } else { unreachable!() };
    let mut new_body = original_body.clone();
    for k in 1..w {
        for &stmt in &original_body {
            let copy = crate::clone::clone_stmt_within(p, stmt);
            for idx_ref in index_refs_within_stmt(p, loop_id, copy) {
                // Fresh `base`/`offset` nodes per occurrence: sharing one
                // across occurrences would leave every earlier occurrence's
                // recorded child stale once a later sync reassigns the
                // shared node's `parent` (H1/H2 single ownership).
                let base = p.push_expr(ExprKind::Index(loop_id));
                let offset = p.push_expr(ExprKind::Constant((k * stride) as i64));
                p.expr_mut(idx_ref).kind = ExprKind::Binary { op: BinOp::Add, lhs: base, rhs: offset };
                p.resync_type(idx_ref);
                p.sync_expr_children(idx_ref);
            }
            new_body.push(copy);
        }
    }

    if let StmtKind::Loop { stride: s, body, .. } = &mut p.stmt_mut(loop_id).kind {
        *s *= w;
        *body = new_body;
    }
    p.sync_stmt_children(loop_id);
    Ok(())
}

/// `IndexExpr(loop_id)` references reachable from `root` specifically,
/// rather than from the whole program — `widen` only ever wants the
/// references inside the single statement it just cloned.
fn index_refs_within_stmt(p: &Program, loop_id: StmtId, root: StmtId) -> Vec<crate::ir::ExprId> {
    use crate::visit::{walk_stmt, Visitor};
    struct Collector {
        loop_id: StmtId,
        found: Vec<crate::ir::ExprId>,
    }
    impl Visitor for Collector {
        fn enter_expr(&mut self, p: &Program, id: crate::ir::ExprId) {
            if let ExprKind::Index(l) = &p.expr(id).kind {
                if *l == self.loop_id {
                    self.found.push(id);
                }
            }
        }
    }
    let mut c = Collector { loop_id, found: Vec::new() };
    walk_stmt(p, &mut c, root);
    c.found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn widen_triples_body_and_scales_stride() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 117)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "index", 117, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 33.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        widen(&mut p, l, 3).unwrap();
        if let StmtKind::Loop { stride, body, .. } = &p.stmt(l).kind {
            assert_eq!(*stride, 3);
            assert_eq!(body.len(), 3);
        } else {
            panic!("expected Loop");
        }
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn widen_handles_multiple_references_to_the_widened_counter() {
        let a = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 12)]));
        let b = Argument::new("B", TensorType::new(ElemKind::F32, vec![("N".into(), 12)]));
        let mut p = Program::new("k", vec![a, b], Vec::new());
        let l = mk_loop(&mut p, "i", 12, 1).unwrap();
        let idx_a = mk_index(&mut p, l).unwrap();
        let idx_b = mk_index(&mut p, l).unwrap();
        let load_b = mk_load(&mut p, ArgId(1), vec![idx_b]).unwrap();
        let st = mk_store(&mut p, ArgId(0), vec![idx_a], load_b, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        widen(&mut p, l, 3).unwrap();
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn widen_rejects_non_dividing_factor() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let l = mk_loop(&mut p, "i", 10, 1).unwrap();
        assert!(widen(&mut p, l, 3).is_err());
    }
}
