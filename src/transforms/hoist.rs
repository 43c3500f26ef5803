//! `hoist(L, levels)`. Interchanges `L` with each of its `levels` innermost
//! enclosing loops, one level at a time, outward. Legal only if every
//! store/load pair in the body that the interchange would reorder proves
//! `Equals` under the dependence test against the outer loop being swapped
//! past — i.e. the access is purely co-indexed and reordering the two
//! loops cannot change which element is read relative to which is written.

use crate::analyses::collect::{all_loads, all_stores};
use crate::analyses::dependence::{check_dependence, Dependence};
use crate::errors::{BistraError, BistraResult};
use crate::ir::{NodeRef, Program, StmtId, StmtKind};

/// Swap `inner` (currently the sole or first child of `outer`) up one
/// level, so `inner` takes `outer`'s old position and `outer` becomes
/// `inner`'s child. Only legal when `inner` is the only statement in
/// `outer`'s body (interchange of a perfect loop nest).
fn swap_one_level(p: &mut Program, outer: StmtId, inner: StmtId) -> BistraResult<()> {
    let outer_parent_scope = match p.stmt(outer).parent {
        Some(NodeRef::Stmt(s)) => Some(s),
        Some(NodeRef::Root) | None => None,
        Some(NodeRef::Expr(_)) => return Err(BistraError::PreconditionFailed("loop cannot be owned by an expression")),
    };
    let outer_body_other: Vec<StmtId> = match &p.stmt(outer).kind {
        StmtKind::Loop { body, .. } => body.iter().copied().filter(|&s| s != inner).collect(),
        _ => return Err(BistraError::PreconditionFailed("hoist target is not a Loop")),
    };
    if !outer_body_other.is_empty() {
        return Err(BistraError::PreconditionFailed("hoist requires a perfectly nested loop (single child)"));
    }
    let inner_body = match &p.stmt(inner).kind {
        StmtKind::Loop { body, .. } => body.clone(),
        _ => return Err(BistraError::PreconditionFailed("hoist target's child is not a Loop")),
    };

    // outer(inner(inner_body)) -> inner(outer(inner_body))
    if let StmtKind::Loop { body, .. } = &mut p.stmt_mut(outer).kind {
        *body = inner_body;
    }
    p.sync_stmt_children(outer);
    if let StmtKind::Loop { body, .. } = &mut p.stmt_mut(inner).kind {
        *body = vec![outer];
    }
    p.sync_stmt_children(inner);

    match outer_parent_scope {
        Some(s) => {
            // outer's old slot in its parent now holds `inner`.
            let body = p.stmt_mut(s).kind.body_mut().unwrap();
            let pos = body.iter().position(|&x| x == outer).unwrap();
            body[pos] = inner;
            p.sync_stmt_children(s);
        }
        None => {
            let pos = p.body.iter().position(|&x| x == outer).unwrap();
            p.body[pos] = inner;
            p.sync_root_children();
        }
    }
    Ok(())
}

/// `true` if every read/write pair that `swap_one_level(outer, inner)` would
/// reorder is provably `Equals` (co-indexed) with respect to both loops.
fn interchange_legal(p: &Program, outer: StmtId, inner: StmtId) -> bool {
    let stores = all_stores(p);
    let loads = all_loads(p);
    for w in &stores {
        for r in &loads {
            if w.arg != r.arg {
                continue;
            }
            let (w_indices, r_indices) = match (&p.stmt(w.stmt).kind, &p.expr(r.expr).kind) {
                (StmtKind::Store { indices: wi, .. }, crate::ir::ExprKind::Load { indices: ri, .. }) => (wi.clone(), ri.clone()),
                _ => continue,
            };
            let dep = check_dependence(p, outer, w.arg, &w_indices, inner, r.arg, &r_indices);
            if dep == Dependence::SomeDep {
                return false;
            }
        }
    }
    true
}

/// Hoist `loop_id` past `levels` enclosing loops (1 = swap with its
/// immediate parent, 2 = swap past two, and so on).
pub fn hoist(p: &mut Program, loop_id: StmtId, levels: u32) -> BistraResult<()> {
    let mut current = loop_id;
    for _ in 0..levels {
        let parent_loop = match p.stmt(current).parent {
            Some(NodeRef::Stmt(s)) if p.stmt(s).kind.is_loop() => s,
            _ => return Err(BistraError::PreconditionFailed("hoist requires an enclosing Loop at every level")),
        };
        if !interchange_legal(p, parent_loop, current) {
            return Err(BistraError::PreconditionFailed("hoist would reorder a dependent access pair"));
        }
        swap_one_level(p, parent_loop, current)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn hoist_swaps_perfectly_nested_independent_loops() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 4), ("M".into(), 4)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let i = mk_loop(&mut p, "i", 4, 1).unwrap();
        let j = mk_loop(&mut p, "j", 4, 1).unwrap();
        let idx_i = mk_index(&mut p, i).unwrap();
        let idx_j = mk_index(&mut p, j).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx_i, idx_j], val, false).unwrap();
        p.append_stmt(Some(j), st);
        p.append_stmt(Some(i), j);
        p.append_stmt(None, i);

        hoist(&mut p, j, 1).unwrap();
        assert_eq!(p.body, vec![j]);
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn hoist_rejects_dependent_reordering() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 4), ("M".into(), 4)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let i = mk_loop(&mut p, "i", 4, 1).unwrap();
        let j = mk_loop(&mut p, "j", 4, 1).unwrap();
        let idx_i = mk_index(&mut p, i).unwrap();
        let idx_j = mk_index(&mut p, j).unwrap();
        let one = mk_constant(&mut p, 1);
        let shifted_i = mk_binary(&mut p, crate::ir::BinOp::Add, idx_i, one).unwrap();
        let load = mk_load(&mut p, ArgId(0), vec![shifted_i, idx_j]).unwrap();
        let st = mk_store(&mut p, ArgId(0), vec![mk_index(&mut p, i).unwrap(), mk_index(&mut p, j).unwrap()], load, false).unwrap();
        p.append_stmt(Some(j), st);
        p.append_stmt(Some(i), j);
        p.append_stmt(None, i);

        assert!(hoist(&mut p, j, 1).is_err());
    }
}
