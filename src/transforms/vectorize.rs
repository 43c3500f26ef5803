//! `vectorize(L, VF) → bool`. Precondition: `L.stride == 1`, `L.end % VF ==
//! 0`, and every load/store indexed by `L` mentions `L`'s counter only in
//! its last (stride-1, innermost) subscript position. On success: set
//! `L.stride = VF`; every matching load/store's value type widens to `VF`
//! lanes, with scalar operands combined into the now-vector expression tree
//! lifted via `Broadcast`.
//!
//! Unlike `tile`/`peel`/`unroll`, a failed precondition here is not an
//! error: the driver tries several candidate `VF`s per loop and treats a
//! `false` result as "this factor doesn't apply", not a bug.

use crate::errors::BistraResult;
use crate::ir::{ExprId, ExprKind, Program, StmtId, StmtKind};
use hashbrown::HashSet;

pub fn vectorize(p: &mut Program, loop_id: StmtId, vf: u32) -> BistraResult<bool> {
    let (stride, end) = match &p.stmt(loop_id).kind {
        StmtKind::Loop { stride, end, .. } => (*stride, *end),
        _ => return Ok(false),
    };
    if stride != 1 || vf == 0 || end % vf as u64 != 0 {
        return Ok(false);
    }
    if !stride_one_innermost(p, loop_id) {
        return Ok(false);
    }

    let matched_loads = matching_loads(p, loop_id);
    let matched_stores = matching_stores(p, loop_id);

    for &load_id in &matched_loads {
        let elem = p.expr(load_id).ty.elem;
        p.expr_mut(load_id).ty = crate::types::ExprType::new(elem, vf);
        if let ExprKind::Load { indices, .. } = &p.expr(load_id).kind {
            if let Some(&last) = indices.last() {
                widen_index_width(p, last, vf);
            }
        }
    }

    let mut widened: HashSet<ExprId> = matched_loads.into_iter().collect();
    for &store_stmt in &matched_stores {
        if let StmtKind::Store { indices, .. } = &p.stmt(store_stmt).kind {
            if let Some(&last) = indices.last() {
                widen_index_width(p, last, vf);
            }
        }
        if let StmtKind::Store { value, .. } = &p.stmt(store_stmt).kind {
            let value = *value;
            widen_expr_tree(p, value, vf, &mut widened);
        }
    }

    if let StmtKind::Loop { stride: s, .. } = &mut p.stmt_mut(loop_id).kind {
        *s = vf as u64;
    }
    Ok(true)
}

/// `true` iff every `Load`/`Store`/`Gep` subscript list that mentions
/// `loop_id` anywhere mentions it only in the last position.
fn stride_one_innermost(p: &Program, loop_id: StmtId) -> bool {
    fn indices_ok(p: &Program, loop_id: StmtId, indices: &[ExprId]) -> bool {
        if indices.is_empty() {
            return true;
        }
        let last = indices.len() - 1;
        indices.iter().enumerate().all(|(i, &e)| i == last || !mentions(p, e, loop_id))
    }
    for idx in 0..p.num_exprs() {
        let id = ExprId(idx as u32);
        match &p.expr(id).kind {
            ExprKind::Load { indices, .. } | ExprKind::Gep { indices, .. } => {
                if !indices_ok(p, loop_id, indices) {
                    return false;
                }
            }
            _ => {}
        }
    }
    for sid in p.stmt_ids() {
        if let StmtKind::Store { indices, .. } = &p.stmt(sid).kind {
            if !indices_ok(p, loop_id, indices) {
                return false;
            }
        }
    }
    true
}

fn mentions(p: &Program, id: ExprId, loop_id: StmtId) -> bool {
    match &p.expr(id).kind {
        ExprKind::Index(l) => *l == loop_id,
        ExprKind::Load { indices, .. } | ExprKind::Gep { indices, .. } => indices.iter().any(|&i| mentions(p, i, loop_id)),
        ExprKind::Binary { lhs, rhs, .. } => mentions(p, *lhs, loop_id) || mentions(p, *rhs, loop_id),
        ExprKind::Unary { val, .. } | ExprKind::Broadcast { val, .. } => mentions(p, *val, loop_id),
        _ => false,
    }
}

fn matching_loads(p: &Program, loop_id: StmtId) -> Vec<ExprId> {
    let mut out = Vec::new();
    for idx in 0..p.num_exprs() {
        let id = ExprId(idx as u32);
        if let ExprKind::Load { indices, .. } = &p.expr(id).kind {
            if indices.last().map(|&e| mentions(p, e, loop_id)).unwrap_or(false) {
                out.push(id);
            }
        }
    }
    out
}

fn matching_stores(p: &Program, loop_id: StmtId) -> Vec<StmtId> {
    let mut out = Vec::new();
    for sid in p.stmt_ids() {
        if let StmtKind::Store { indices, .. } = &p.stmt(sid).kind {
            if indices.last().map(|&e| mentions(p, e, loop_id)).unwrap_or(false) {
                out.push(sid);
            }
        }
    }
    out
}

/// Recompute `id`'s width bottom-up given that some leaf in its subtree
/// (recorded in `widened`) now has width `vf`. Any sibling operand still at
/// width 1 is wrapped in a `Broadcast` so the two sides of a `Binary`/`Unary`
/// match again.
fn widen_expr_tree(p: &mut Program, id: ExprId, vf: u32, widened: &mut HashSet<ExprId>) -> u32 {
    if widened.contains(&id) {
        return p.expr(id).ty.width;
    }
    let kind = p.expr(id).kind.clone();
    let width = match kind {
        ExprKind::Binary { lhs, rhs, .. } => {
            let wl = widen_expr_tree(p, lhs, vf, widened);
            let wr = widen_expr_tree(p, rhs, vf, widened);
            let target = wl.max(wr);
            if wl < target {
                broadcast_operand(p, id, true, target);
            }
            if wr < target {
                broadcast_operand(p, id, false, target);
            }
            target
        }
        ExprKind::Unary { val, .. } => widen_expr_tree(p, val, vf, widened),
        ExprKind::Broadcast { width, .. } => width,
        ExprKind::Load { .. } | ExprKind::LoadLocal(_) | ExprKind::Constant(_) | ExprKind::ConstantFP(_) | ExprKind::ConstantString(_) | ExprKind::Index(_) | ExprKind::Gep { .. } => p.expr(id).ty.width,
    };
    p.resync_type(id);
    if width > 1 {
        widened.insert(id);
    }
    width
}

/// Widens the last subscript of a matched load/store to `vf` lanes.
/// `Program::infer_type` derives a `Load`'s width from its last index's
/// width, so leaving this at scalar width would have `resync_type` quietly
/// undo the vectorization on the next pass over the load.
fn widen_index_width(p: &mut Program, id: ExprId, vf: u32) {
    let widened = p.expr(id).ty.with_width(vf);
    p.expr_mut(id).ty = widened;
}

fn broadcast_operand(p: &mut Program, parent: ExprId, is_lhs: bool, width: u32) {
    let operand = match &p.expr(parent).kind {
        ExprKind::Binary { lhs, rhs, .. } => {
            if is_lhs {
                *lhs
            } else {
                *rhs
            }
        }
        _ => return,
    };
    let bc = p.push_expr(ExprKind::Broadcast { val: operand, width });
    if let ExprKind::Binary { lhs, rhs, .. } = &mut p.expr_mut(parent).kind {
        if is_lhs {
            *lhs = bc;
        } else {
            *rhs = bc;
        }
    }
    p.sync_expr_children(parent);
    p.resync_type(parent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn vectorize_memcpy() {
        let src = Argument::new("SRC", TensorType::new(ElemKind::F32, vec![("N".into(), 1024)]));
        let dst = Argument::new("DEST", TensorType::new(ElemKind::F32, vec![("N".into(), 1024)]));
        let mut p = Program::new("k", vec![dst, src], Vec::new());
        let l = mk_loop(&mut p, "i", 1024, 1).unwrap();
        let load = mk_load(&mut p, ArgId(1), vec![mk_index(&mut p, l).unwrap()]).unwrap();
        let st = mk_store(&mut p, ArgId(0), vec![mk_index(&mut p, l).unwrap()], load, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let ok = vectorize(&mut p, l, 4).unwrap();
        assert!(ok);
        if let StmtKind::Loop { stride, .. } = &p.stmt(l).kind {
            assert_eq!(*stride, 4);
        }
        assert_eq!(p.expr(load).ty.width, 4);
        if let ExprKind::Load { indices, .. } = &p.expr(load).kind {
            assert_eq!(p.expr(*indices.last().unwrap()).ty.width, 4, "last subscript must widen alongside the load itself");
        }
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn vectorize_fails_on_non_dividing_vf() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 10)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 10, 1).unwrap();
        assert!(!vectorize(&mut p, l, 4).unwrap());
    }
}
