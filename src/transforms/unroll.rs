//! `unroll(L, max_trip)`. Precondition: `L.stride == 1` and
//! `L.end <= max_trip`. Replaces the loop with `L.end` independent copies
//! of its body, spliced into `L`'s old position, with `IndexExpr(L)`
//! replaced by the literal iteration number in each copy.

use crate::errors::{BistraError, BistraResult};
use crate::ir::{ExprKind, NodeRef, Program, StmtId, StmtKind};

pub fn unroll(p: &mut Program, loop_id: StmtId, max_trip: u64) -> BistraResult<Vec<StmtId>> {
    let (end, stride) = match &p.stmt(loop_id).kind {
        StmtKind::Loop { end, stride, .. } => (*end, *stride),
        _ => return Err(BistraError::PreconditionFailed("unroll target is not a Loop")),
    };
    if stride != 1 {
        return Err(BistraError::PreconditionFailed("unroll requires L.stride == 1"));
    }
    if end > max_trip {
        return Err(BistraError::PreconditionFailed("unroll requires L.end <= max_trip"));
    }

    let scope = match p.stmt(loop_id).parent {
        Some(NodeRef::Stmt(s)) => Some(s),
        Some(NodeRef::Root) | None => None,
        Some(NodeRef::Expr(_)) => return Err(BistraError::PreconditionFailed("loop cannot be owned by an expression")),
    };

    let mut copies = Vec::with_capacity(end as usize);
    for k in 0..end {
        let clone_of_loop = crate::clone::clone_stmt_within(p, loop_id);
        let body = if let StmtKind::Loop { body, .. } = &p.stmt(clone_of_loop).kind { body.clone() } else { unreachable!() };
        for idx_ref in crate::analyses::collect::index_refs_to(p, clone_of_loop) {
            p.expr_mut(idx_ref).kind = ExprKind::Constant(k as i64);
            p.resync_type(idx_ref);
        }
        copies.extend(body);
    }

    p.splice_replace(scope, loop_id, copies.clone());
    Ok(copies)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn unroll_replaces_loop_with_copies() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 3)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 3, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let copies = unroll(&mut p, l, 8).unwrap();
        assert_eq!(copies.len(), 3);
        assert_eq!(p.body, copies);
        for (k, &st) in copies.iter().enumerate() {
            if let StmtKind::Store { indices, .. } = &p.stmt(st).kind {
                assert_eq!(p.expr(indices[0]).kind, ExprKind::Constant(k as i64));
            } else {
                panic!("expected Store");
            }
        }
        assert!(crate::verify::verify(&p).is_ok());
    }

    #[test]
    fn unroll_rejects_excessive_trip_count() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let l = mk_loop(&mut p, "i", 10, 1).unwrap();
        assert!(unroll(&mut p, l, 4).is_err());
    }
}
