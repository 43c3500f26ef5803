//! `split(scope)`. Splits a scope of `N` pairwise-independent statements
//! into `N` sibling single-statement loops (of the same index range as the
//! scope's own shape is not itself a loop here — `split` operates on a
//! loop's body, producing one clone of the loop per statement). Legality:
//! every pair of statements must be mutually independent under `depends`.

use crate::analyses::dependence::Dependence;
use crate::errors::{BistraError, BistraResult};
use crate::ir::{NodeRef, Program, StmtId, StmtKind};

/// Checks whether `a` and `b` (two statements in the same body) touch any
/// common argument in a way that could alias, conservatively treating any
/// shared argument between a store and a load/store as a potential
/// dependence unless `check_dependence` can rule it out for every
/// enclosing loop on the path between them.
fn independent(p: &Program, enclosing: &[StmtId], a: StmtId, b: StmtId) -> bool {
    let writes_a = crate::analyses::collect::all_stores(p).into_iter().filter(|w| is_within(p, a, w.stmt)).collect::<Vec<_>>();
    let reads_b = crate::analyses::collect::all_loads(p).into_iter().filter(|r| is_within(p, b, r.expr)).collect::<Vec<_>>();
    let writes_b = crate::analyses::collect::all_stores(p).into_iter().filter(|w| is_within(p, b, w.stmt)).collect::<Vec<_>>();
    let reads_a = crate::analyses::collect::all_loads(p).into_iter().filter(|r| is_within(p, a, r.expr)).collect::<Vec<_>>();

    for &loop_id in enclosing {
        if !pairwise_ok(p, loop_id, &writes_a, &reads_b) {
            return false;
        }
        if !pairwise_ok(p, loop_id, &writes_b, &reads_a) {
            return false;
        }
        if !pairwise_store_ok(p, loop_id, &writes_a, &writes_b) {
            return false;
        }
    }
    true
}

fn pairwise_ok(p: &Program, loop_id: StmtId, writes: &[crate::analyses::collect::StoreRef], reads: &[crate::analyses::collect::LoadRef]) -> bool {
    for w in writes {
        for r in reads {
            if w.arg != r.arg {
                continue;
            }
            let (w_indices, w_value) = match &p.stmt(w.stmt).kind {
                StmtKind::Store { indices, value, .. } => (indices.clone(), *value),
                _ => continue,
            };
            let r_indices = match &p.expr(r.expr).kind {
                crate::ir::ExprKind::Load { indices, .. } => indices.clone(),
                _ => continue,
            };
            let _ = w_value;
            let dep = crate::analyses::dependence::check_dependence(p, loop_id, w.arg, &w_indices, loop_id, r.arg, &r_indices);
            if dep != Dependence::NoDep {
                return false;
            }
        }
    }
    true
}

fn pairwise_store_ok(p: &Program, loop_id: StmtId, a: &[crate::analyses::collect::StoreRef], b: &[crate::analyses::collect::StoreRef]) -> bool {
    for wa in a {
        for wb in b {
            if wa.arg != wb.arg {
                continue;
            }
            let ia = match &p.stmt(wa.stmt).kind {
                StmtKind::Store { indices, .. } => indices.clone(),
                _ => continue,
            };
            let ib = match &p.stmt(wb.stmt).kind {
                StmtKind::Store { indices, .. } => indices.clone(),
                _ => continue,
            };
            let dep = crate::analyses::dependence::check_dependence(p, loop_id, wa.arg, &ia, loop_id, wb.arg, &ib);
            if dep != Dependence::NoDep {
                return false;
            }
        }
    }
    true
}

/// Cheap reachability check: does statement subtree rooted at `root`
/// contain `target` (as a statement) or own the expression `expr_in`?
fn is_within(p: &Program, root: StmtId, target: StmtId) -> bool {
    if root == target {
        return true;
    }
    if let Some(body) = p.stmt(root).kind.body() {
        body.iter().any(|&c| is_within(p, c, target))
    } else {
        false
    }
}

/// Splits `scope`'s (a `Loop`'s) body into one sibling copy of the loop per
/// statement, each containing exactly one of the original statements.
/// Fails if any pair of statements is not provably independent.
pub fn split(p: &mut Program, loop_id: StmtId) -> BistraResult<Vec<StmtId>> {
    let body = match &p.stmt(loop_id).kind {
        StmtKind::Loop { body, .. } => body.clone(),
        _ => return Err(BistraError::PreconditionFailed("split target is not a Loop")),
    };
    if body.len() < 2 {
        return Err(BistraError::PreconditionFailed("split requires at least two statements in the loop body"));
    }

    for i in 0..body.len() {
        for j in (i + 1)..body.len() {
            if !independent(p, &[loop_id], body[i], body[j]) {
                return Err(BistraError::PreconditionFailed("split requires pairwise-independent statements"));
            }
        }
    }

    let scope = match p.stmt(loop_id).parent {
        Some(NodeRef::Stmt(s)) => Some(s),
        Some(NodeRef::Root) | None => None,
        Some(NodeRef::Expr(_)) => return Err(BistraError::PreconditionFailed("loop cannot be owned by an expression")),
    };

    // Each sibling loop is a clone of the whole loop (so its index name,
    // end, and stride match) retaining only the one statement at its
    // position; `clone_stmt_within` preserves body order so position `i`
    // in the clone always corresponds to `body[i]` in the original.
    let mut new_loops = Vec::with_capacity(body.len());
    for i in 0..body.len() {
        let clone = crate::clone::clone_stmt_within(p, loop_id);
        if let StmtKind::Loop { body: cloned_body, .. } = &mut p.stmt_mut(clone).kind {
            let keep = cloned_body[i];
            *cloned_body = vec![keep];
        }
        p.sync_stmt_children(clone);
        new_loops.push(clone);
    }

    p.splice_replace(scope, loop_id, new_loops.clone());
    Ok(new_loops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn split_disjoint_stores_into_sibling_loops() {
        let a = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 4)]));
        let b = Argument::new("B", TensorType::new(ElemKind::F32, vec![("N".into(), 4)]));
        let mut p = Program::new("k", vec![a, b], Vec::new());
        let l = mk_loop(&mut p, "i", 4, 1).unwrap();
        let one = mk_constant_fp(&mut p, 1.0);
        let two = mk_constant_fp(&mut p, 2.0);
        let st_a = mk_store(&mut p, ArgId(0), vec![mk_index(&mut p, l).unwrap()], one, false).unwrap();
        let st_b = mk_store(&mut p, ArgId(1), vec![mk_index(&mut p, l).unwrap()], two, false).unwrap();
        p.append_stmt(Some(l), st_a);
        p.append_stmt(Some(l), st_b);
        p.append_stmt(None, l);

        let loops = split(&mut p, l).unwrap();
        assert_eq!(loops.len(), 2);
        assert!(crate::verify::verify(&p).is_ok());
    }
}
