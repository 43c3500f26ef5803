//! `tile(loop, block_size)`. Ported directly from `Transforms.cpp`: requires
//! `loop.end % block_size == 0`; introduces a new inner loop named
//! `"{name}_tile_{block_size}"` with the original body moved into it,
//! `end = block_size`, `stride = 1`; shrinks the outer loop's `end` to
//! `end / block_size` and resets its `stride` to 1; and rewrites every
//! reference to the outer loop's counter reachable from the new inner loop
//! to `IndexExpr(outer) * block_size + IndexExpr(inner)`.

use crate::errors::{BistraError, BistraResult};
use crate::ir::{BinOp, ExprKind, Program, StmtId, StmtKind};

pub fn tile(p: &mut Program, loop_id: StmtId, block_size: u64) -> BistraResult<StmtId> {
    let (name, end, body) = match &p.stmt(loop_id).kind {
        StmtKind::Loop { index_name, end, body, .. } => (index_name.clone(), *end, body.clone()),
        _ => return Err(BistraError::PreconditionFailed("tile target is not a Loop")),
    };
    if block_size == 0 || end % block_size != 0 {
        return Err(BistraError::PreconditionFailed("tile requires loop.end % block_size == 0"));
    }

    let inner_name = format!("{}_tile_{}", name, block_size);
    let inner = p.push_stmt(StmtKind::Loop { index_name: inner_name, end: block_size, stride: 1, body });
    p.sync_stmt_children(inner);

    if let StmtKind::Loop { end: outer_end, stride: outer_stride, body: outer_body, .. } = &mut p.stmt_mut(loop_id).kind {
        *outer_end = end / block_size;
        *outer_stride = 1;
        *outer_body = vec![inner];
    }
    p.sync_stmt_children(loop_id);

    // Every `IndexExpr(loop_id)` that is now reachable from `inner` (i.e.
    // every one that used to be in the body we just moved) must be
    // rewritten; references to `loop_id` from outside the moved subtree
    // (there are none, since the body we moved was the loop's entire body)
    // are unaffected.
    let refs = crate::analyses::collect::index_refs_to(p, loop_id);
    for old_ref in refs {
        // old_ref currently reads `IndexExpr(loop_id)`; replace it in place
        // with `old_ref * block_size + IndexExpr(inner)`, taking care to
        // build the new subexpressions before overwriting old_ref's slot.
        // Each occurrence gets its own fresh constant node: sharing one
        // across occurrences would leave every earlier occurrence's
        // recorded child stale once a later `push_expr`/sync reassigns the
        // shared node's `parent` (H1/H2 single ownership).
        let block_const = p.push_expr(ExprKind::Constant(block_size as i64));
        let outer_copy = p.push_expr(ExprKind::Index(loop_id));
        let scaled = p.push_expr(ExprKind::Binary { op: BinOp::Mul, lhs: outer_copy, rhs: block_const });
        let inner_idx = p.push_expr(ExprKind::Index(inner));
        p.expr_mut(old_ref).kind = ExprKind::Binary { op: BinOp::Add, lhs: scaled, rhs: inner_idx };
        p.resync_type(old_ref);
        p.sync_expr_children(old_ref);
        p.sync_expr_children(scaled);
    }

    Ok(inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn tile_splits_loop_and_rewrites_index() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 16)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 16, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let inner = tile(&mut p, l, 4).unwrap();
        if let StmtKind::Loop { end, body, .. } = &p.stmt(l).kind {
            assert_eq!(*end, 4);
            assert_eq!(body, &vec![inner]);
        } else {
            panic!("expected outer loop");
        }
        if let StmtKind::Loop { end, .. } = &p.stmt(inner).kind {
            assert_eq!(*end, 4);
        } else {
            panic!("expected inner loop");
        }
        if let StmtKind::Store { indices, .. } = &p.stmt(st).kind {
            if let ExprKind::Binary { op: BinOp::Add, lhs, rhs } = &p.expr(indices[0]).kind {
                assert!(matches!(p.expr(*lhs).kind, ExprKind::Binary { op: BinOp::Mul, .. }));
                assert!(matches!(p.expr(*rhs).kind, ExprKind::Index(_)));
            } else {
                panic!("expected rewritten index expression");
            }
        } else {
            panic!("expected Store");
        }
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn tile_handles_multiple_references_to_the_tiled_counter() {
        // `for i in 0..125 { A[i] = 1.5 * B[i] }` (spec.md Scenario 2):
        // both A's and B's subscript reference the same outer counter, so
        // `tile` must rewrite two distinct `IndexExpr(l)` occurrences
        // without sharing any of the new constant/arithmetic nodes between
        // them.
        let a = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 125)]));
        let b = Argument::new("B", TensorType::new(ElemKind::F32, vec![("N".into(), 125)]));
        let mut p = Program::new("k", vec![a, b], Vec::new());
        let l = mk_loop(&mut p, "i", 125, 1).unwrap();
        let idx_a = mk_index(&mut p, l).unwrap();
        let idx_b = mk_index(&mut p, l).unwrap();
        let load_b = mk_load(&mut p, ArgId(1), vec![idx_b]).unwrap();
        let half = mk_constant_fp(&mut p, 1.5);
        let scaled = crate::ir::builder::mk_binary(&mut p, BinOp::Mul, half, load_b).unwrap();
        let st = mk_store(&mut p, ArgId(0), vec![idx_a], scaled, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        tile(&mut p, l, 5).unwrap();
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn tile_rejects_non_dividing_block_size() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let l = mk_loop(&mut p, "i", 16, 1).unwrap();
        assert!(tile(&mut p, l, 5).is_err());
    }
}
