//! `distribute(L)`. Splits a loop whose body holds several statements into
//! consecutive sibling loops, one per maximal dependence-closed run of
//! statements — the statements stay in their original order, but any two
//! that are dependence-free with respect to every statement between them
//! end up in separate loops, each scanning the original range.

use crate::analyses::collect::{all_loads, all_stores};
use crate::analyses::dependence::{check_dependence, Dependence};
use crate::errors::{BistraError, BistraResult};
use crate::ir::{NodeRef, Program, StmtId, StmtKind};

fn touches_same_argument(p: &Program, loop_id: StmtId, a: StmtId, b: StmtId) -> bool {
    let stores = all_stores(p);
    let loads = all_loads(p);
    let writes_a: Vec<_> = stores.iter().filter(|w| w.stmt == a).collect();
    let writes_b: Vec<_> = stores.iter().filter(|w| w.stmt == b).collect();
    let reads_a: Vec<_> = loads.iter().filter(|r| is_read_of_stmt(p, a, r.expr)).collect();
    let reads_b: Vec<_> = loads.iter().filter(|r| is_read_of_stmt(p, b, r.expr)).collect();

    let check = |wi: &[crate::ir::ExprId], warg, ri: &[crate::ir::ExprId], rarg| -> bool {
        if warg != rarg {
            return false;
        }
        check_dependence(p, loop_id, warg, wi, loop_id, rarg, ri) != Dependence::NoDep
    };

    for w in &writes_a {
        for r in &reads_b {
            if let (StmtKind::Store { indices: wi, .. }, crate::ir::ExprKind::Load { indices: ri, .. }) = (&p.stmt(w.stmt).kind, &p.expr(r.expr).kind) {
                if check(wi, w.arg, ri, r.arg) {
                    return true;
                }
            }
        }
    }
    for w in &writes_b {
        for r in &reads_a {
            if let (StmtKind::Store { indices: wi, .. }, crate::ir::ExprKind::Load { indices: ri, .. }) = (&p.stmt(w.stmt).kind, &p.expr(r.expr).kind) {
                if check(wi, w.arg, ri, r.arg) {
                    return true;
                }
            }
        }
    }
    for wa in &writes_a {
        for wb in &writes_b {
            if let (StmtKind::Store { indices: ia, .. }, StmtKind::Store { indices: ib, .. }) = (&p.stmt(wa.stmt).kind, &p.stmt(wb.stmt).kind) {
                if check(ia, wa.arg, ib, wb.arg) {
                    return true;
                }
            }
        }
    }
    false
}

fn is_read_of_stmt(p: &Program, stmt: StmtId, expr: crate::ir::ExprId) -> bool {
    match &p.stmt(stmt).kind {
        StmtKind::Store { indices, value, .. } => indices.contains(&expr) || *value == expr || contains_expr(p, *value, expr),
        StmtKind::StoreLocal { value, .. } => *value == expr || contains_expr(p, *value, expr),
        StmtKind::Call { params, .. } => params.contains(&expr),
        _ => false,
    }
}

fn contains_expr(p: &Program, root: crate::ir::ExprId, target: crate::ir::ExprId) -> bool {
    if root == target {
        return true;
    }
    match &p.expr(root).kind {
        crate::ir::ExprKind::Load { indices, .. } | crate::ir::ExprKind::Gep { indices, .. } => indices.iter().any(|&e| contains_expr(p, e, target)),
        crate::ir::ExprKind::Binary { lhs, rhs, .. } => contains_expr(p, *lhs, target) || contains_expr(p, *rhs, target),
        crate::ir::ExprKind::Unary { val, .. } | crate::ir::ExprKind::Broadcast { val, .. } => contains_expr(p, *val, target),
        _ => false,
    }
}

pub fn distribute(p: &mut Program, loop_id: StmtId) -> BistraResult<Vec<StmtId>> {
    let body = match &p.stmt(loop_id).kind {
        StmtKind::Loop { body, .. } => body.clone(),
        _ => return Err(BistraError::PreconditionFailed("distribute target is not a Loop")),
    };
    if body.len() < 2 {
        return Err(BistraError::PreconditionFailed("distribute requires at least two statements"));
    }

    let mut groups: Vec<Vec<StmtId>> = vec![vec![body[0]]];
    for &stmt in &body[1..] {
        let joins_current = groups.last().unwrap().iter().any(|&s| touches_same_argument(p, loop_id, s, stmt));
        if joins_current {
            groups.last_mut().unwrap().push(stmt);
        } else {
            groups.push(vec![stmt]);
        }
    }

    let scope = match p.stmt(loop_id).parent {
        Some(NodeRef::Stmt(s)) => Some(s),
        Some(NodeRef::Root) | None => None,
        Some(NodeRef::Expr(_)) => return Err(BistraError::PreconditionFailed("loop cannot be owned by an expression")),
    };

    let mut new_loops = Vec::with_capacity(groups.len());
    for group in &groups {
        let clone = crate::clone::clone_stmt_within(p, loop_id);
        if let StmtKind::Loop { body: cloned_body, .. } = &mut p.stmt_mut(clone).kind {
            let keep: Vec<StmtId> = group.iter().map(|&original_pos| cloned_body[index_of(&body, original_pos)]).collect();
            *cloned_body = keep;
        }
        p.sync_stmt_children(clone);
        new_loops.push(clone);
    }

    p.splice_replace(scope, loop_id, new_loops.clone());
    Ok(new_loops)
}

fn index_of(body: &[StmtId], target: StmtId) -> usize {
    body.iter().position(|&s| s == target).unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn distribute_groups_independent_statements_separately() {
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

        let loops = distribute(&mut p, l).unwrap();
        assert_eq!(loops.len(), 2);
        assert!(crate::verify::verify(&p).is_ok());
    }
}
