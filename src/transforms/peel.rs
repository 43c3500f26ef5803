//! `peel(L, k)`. Splits a loop into a `[0, k)` prefix and a `[k, L.end)`
//! suffix, two sibling loops in `L`'s old position. The suffix is built
//! from a fresh clone of the body with its counter's references rewritten
//! to `IndexExpr(suffix) + k`. Exposes an aligned vectorizable
//! prefix/suffix around an otherwise-unaligned trip count.

use crate::errors::{BistraError, BistraResult};
use crate::ir::{BinOp, ExprKind, NodeRef, Program, StmtId, StmtKind};

pub fn peel(p: &mut Program, loop_id: StmtId, k: u64) -> BistraResult<StmtId> {
    let (name, end, stride) = match &p.stmt(loop_id).kind {
        StmtKind::Loop { index_name, end, stride, .. } => (index_name.clone(), *end, *stride),
        _ => return Err(BistraError::PreconditionFailed("peel target is not a Loop")),
    };
    if k == 0 || k > end {
        return Err(BistraError::PreconditionFailed("peel requires 0 < k <= L.end"));
    }

    let scope = match p.stmt(loop_id).parent {
        Some(NodeRef::Stmt(s)) => Some(s),
        Some(NodeRef::Root) | None => None,
        Some(NodeRef::Expr(_)) => return Err(BistraError::PreconditionFailed("loop cannot be owned by an expression")),
    };

    let suffix = crate::clone::clone_stmt_within(p, loop_id);
    for idx_ref in crate::analyses::collect::index_refs_to(p, suffix) {
        // Fresh `inner`/`k_const` nodes per occurrence: sharing one across
        // occurrences would leave every earlier occurrence's recorded child
        // stale once a later sync reassigns the shared node's `parent`
        // (H1/H2 single ownership).
        let inner = p.push_expr(ExprKind::Index(suffix));
        let k_const = p.push_expr(ExprKind::Constant(k as i64));
        p.expr_mut(idx_ref).kind = ExprKind::Binary { op: BinOp::Add, lhs: inner, rhs: k_const };
        p.resync_type(idx_ref);
        p.sync_expr_children(idx_ref);
    }
    if let StmtKind::Loop { index_name, end: suffix_end, .. } = &mut p.stmt_mut(suffix).kind {
        *index_name = format!("{}_peel_suffix", name);
        *suffix_end = end - k;
    }

    if let StmtKind::Loop { end: prefix_end, .. } = &mut p.stmt_mut(loop_id).kind {
        *prefix_end = k;
    }
    let _ = stride;

    // `loop_id` (now the prefix, covering `[0,k)`) keeps its original
    // position; the new suffix loop is inserted immediately after it.
    let following = {
        let body = p.scope_body(scope);
        body.iter().position(|&x| x == loop_id).and_then(|pos| body.get(pos + 1).copied())
    };
    match following {
        Some(next) => p.insert_before(scope, next, suffix),
        None => p.append_stmt(scope, suffix),
    }

    Ok(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn peel_splits_prefix_and_suffix() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 10)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 10, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let suffix = peel(&mut p, l, 4).unwrap();
        if let StmtKind::Loop { end, .. } = &p.stmt(l).kind {
            assert_eq!(*end, 4);
        }
        if let StmtKind::Loop { end, .. } = &p.stmt(suffix).kind {
            assert_eq!(*end, 6);
        }
        assert_eq!(p.body, vec![l, suffix]);
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn peel_handles_multiple_references_to_the_peeled_counter() {
        let a = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 10)]));
        let b = Argument::new("B", TensorType::new(ElemKind::F32, vec![("N".into(), 10)]));
        let mut p = Program::new("k", vec![a, b], Vec::new());
        let l = mk_loop(&mut p, "i", 10, 1).unwrap();
        let idx_a = mk_index(&mut p, l).unwrap();
        let idx_b = mk_index(&mut p, l).unwrap();
        let load_b = mk_load(&mut p, ArgId(1), vec![idx_b]).unwrap();
        let st = mk_store(&mut p, ArgId(0), vec![idx_a], load_b, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        peel(&mut p, l, 4).unwrap();
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn peel_rejects_out_of_range_k() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let l = mk_loop(&mut p, "i", 10, 1).unwrap();
        assert!(peel(&mut p, l, 0).is_err());
        assert!(peel(&mut p, l, 11).is_err());
    }
}
