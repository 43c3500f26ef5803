//! `promoteLICM(program)`. For each innermost loop, every `+=` store whose
//! destination indices do not mention the loop's own counter is loop
//! invariant with respect to that loop: the canonical `C[i,j] += A[i,k] *
//! B[k,j]` pattern becomes a local accumulator initialized from `C[i,j]`
//! before the loop, accumulated into on every iteration, and stored back to
//! `C[i,j]` after the loop exits.

use crate::ir::builder::mk_load_local;
use crate::ir::{ExprId, ExprKind, LocalId, NodeRef, Program, StmtId, StmtKind};
use crate::types::LocalVar;

fn innermost_loops(p: &Program) -> Vec<StmtId> {
    crate::analyses::collect::all_loops(p)
        .into_iter()
        .filter(|&id| {
            if let StmtKind::Loop { body, .. } = &p.stmt(id).kind {
                !body.iter().any(|&c| p.stmt(c).kind.is_loop())
            } else {
                false
            }
        })
        .collect()
}

fn mentions_loop(p: &Program, id: ExprId, loop_id: StmtId) -> bool {
    match &p.expr(id).kind {
        ExprKind::Index(l) => *l == loop_id,
        ExprKind::Load { indices, .. } | ExprKind::Gep { indices, .. } => indices.iter().any(|&i| mentions_loop(p, i, loop_id)),
        ExprKind::Binary { lhs, rhs, .. } => mentions_loop(p, *lhs, loop_id) || mentions_loop(p, *rhs, loop_id),
        ExprKind::Unary { val, .. } | ExprKind::Broadcast { val, .. } => mentions_loop(p, *val, loop_id),
        _ => false,
    }
}

/// Promotes every eligible accumulating store inside `loop_id`. Returns the
/// number of stores promoted.
fn promote_in_loop(p: &mut Program, loop_id: StmtId) -> usize {
    let body = if let StmtKind::Loop { body, .. } = &p.stmt(loop_id).kind { body.clone() } else { return 0 };
    let scope = match p.stmt(loop_id).parent {
        Some(NodeRef::Stmt(s)) => Some(s),
        _ => None,
    };

    let mut promoted = 0;
    for &stmt in &body {
        let (dest, indices, value) = match &p.stmt(stmt).kind {
            StmtKind::Store { dest, indices, value, accumulate: true } => (*dest, indices.clone(), *value),
            _ => continue,
        };
        if indices.iter().any(|&i| mentions_loop(p, i, loop_id)) {
            continue;
        }

        let elem = p.arg(dest).ty.elem;
        let width = p.expr(value).ty.width;
        let local_name = format!("{}_licm_{}", p.arg(dest).name.clone(), promoted);
        let local_id = LocalId(p.locals.len() as u32);
        p.locals.push(LocalVar::new(local_name, crate::types::ExprType::new(elem, width)));

        let preheader_indices: Vec<ExprId> = indices.iter().map(|&e| crate::clone::clone_expr_within(p, e)).collect();
        let init_load = p.push_expr(ExprKind::Load { src: dest, indices: preheader_indices });
        let init_store = p.push_stmt(StmtKind::StoreLocal { dest: local_id, value: init_load, accumulate: false });
        insert_before_loop(p, scope, loop_id, init_store);

        p.stmt_mut(stmt).kind = StmtKind::StoreLocal { dest: local_id, value, accumulate: true };
        p.sync_stmt_children(stmt);

        let final_value = mk_load_local(p, local_id);
        let postexit_indices: Vec<ExprId> = indices.iter().map(|&e| crate::clone::clone_expr_within(p, e)).collect();
        let final_store = p.push_stmt(StmtKind::Store { dest, indices: postexit_indices, value: final_value, accumulate: false });
        insert_after_loop(p, scope, loop_id, final_store);

        promoted += 1;
    }
    promoted
}

fn insert_before_loop(p: &mut Program, scope: Option<StmtId>, loop_id: StmtId, stmt: StmtId) {
    p.insert_before(scope, loop_id, stmt);
}

fn insert_after_loop(p: &mut Program, scope: Option<StmtId>, loop_id: StmtId, stmt: StmtId) {
    let following = {
        let body = p.scope_body(scope);
        body.iter().position(|&x| x == loop_id).and_then(|pos| body.get(pos + 1).copied())
    };
    match following {
        Some(next) => p.insert_before(scope, next, stmt),
        None => p.append_stmt(scope, stmt),
    }
}

pub fn promote_licm(p: &mut Program) -> usize {
    let mut total = 0;
    for loop_id in innermost_loops(p) {
        total += promote_in_loop(p, loop_id);
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn promotes_gemm_inner_accumulator() {
        let c = Argument::new("C", TensorType::new(ElemKind::F32, vec![("M".into(), 4), ("N".into(), 4)]));
        let a = Argument::new("A", TensorType::new(ElemKind::F32, vec![("M".into(), 4), ("K".into(), 4)]));
        let b = Argument::new("B", TensorType::new(ElemKind::F32, vec![("K".into(), 4), ("N".into(), 4)]));
        let mut p = Program::new("gemm", vec![c, a, b], Vec::new());
        let i = mk_loop(&mut p, "i", 4, 1).unwrap();
        let j = mk_loop(&mut p, "j", 4, 1).unwrap();
        let k = mk_loop(&mut p, "k", 4, 1).unwrap();
        // Every subscript site gets its own fresh `IndexExpr`: the IR is a
        // single-owner tree (spec.md §3, H1/H2), so the same `ExprId` can
        // never be reused across two distinct load/store sites.
        let load_a = mk_load(&mut p, ArgId(1), vec![mk_index(&mut p, i).unwrap(), mk_index(&mut p, k).unwrap()]).unwrap();
        let load_b = mk_load(&mut p, ArgId(2), vec![mk_index(&mut p, k).unwrap(), mk_index(&mut p, j).unwrap()]).unwrap();
        let prod = mk_binary(&mut p, crate::ir::BinOp::Mul, load_a, load_b).unwrap();
        let st = mk_store(&mut p, ArgId(0), vec![mk_index(&mut p, i).unwrap(), mk_index(&mut p, j).unwrap()], prod, true).unwrap();
        p.append_stmt(Some(k), st);
        p.append_stmt(Some(j), k);
        p.append_stmt(Some(i), j);
        p.append_stmt(None, i);

        let promoted = promote_licm(&mut p);
        assert_eq!(promoted, 1);
        assert_eq!(p.locals.len(), 1);
        if let StmtKind::Loop { body, .. } = &p.stmt(k).kind {
            assert_eq!(body.len(), 1);
            assert!(matches!(p.stmt(body[0]).kind, StmtKind::StoreLocal { .. }));
        }
        if let StmtKind::Loop { body, .. } = &p.stmt(j).kind {
            assert_eq!(body.len(), 3);
            assert!(matches!(p.stmt(body[0]).kind, StmtKind::StoreLocal { .. }));
            assert_eq!(body[1], k);
            assert!(matches!(p.stmt(body[2]).kind, StmtKind::Store { .. }));
        }
        assert!(crate::verify::verify(&p).is_ok());
    }
}
