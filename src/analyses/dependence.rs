//! Weak-SIV dependence testing between two accesses to the same argument,
//! with respect to two candidate loops `l1`, `l2` (one per access; pass the
//! same loop for both when only a single enclosing loop is in play). Ported
//! from `checkWeakSIVDependenceForIndex`: different arguments never alias;
//! per subscript position, a direct reference to `l1` on one side paired
//! with a direct reference to `l2` on the other is an allowed co-indexed
//! access and the position is skipped; failing that, a statically disjoint
//! range rules the position out; failing that, either side mentioning its
//! loop anywhere in the subscript makes the whole pair dependent. A pair
//! that clears every subscript position this way aliases the same address
//! on every iteration.

use crate::analyses::range::{known_range, relation, RangeRelation};
use crate::ir::{ArgId, ExprId, ExprKind, Program, StmtId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dependence {
    /// The read and write can never alias.
    NoDep,
    /// The read and write may alias; conservative default.
    SomeDep,
    /// The read and write always access the exact same address.
    Equals,
}

/// `true` if `index` is a direct `IndexExpr` for `loop_id` (not nested
/// inside a further expression).
fn is_ref_of_loop(p: &Program, index: ExprId, loop_id: StmtId) -> bool {
    matches!(&p.expr(index).kind, ExprKind::Index(l) if *l == loop_id)
}

/// `true` if `index` (an expression, generally a subscript) mentions
/// `loop_id`'s counter anywhere in its tree.
fn mentions_loop(p: &Program, index: ExprId, loop_id: StmtId) -> bool {
    match &p.expr(index).kind {
        ExprKind::Index(l) => *l == loop_id,
        ExprKind::Load { indices, .. } | ExprKind::Gep { indices, .. } => indices.iter().any(|&i| mentions_loop(p, i, loop_id)),
        ExprKind::Binary { lhs, rhs, .. } => mentions_loop(p, *lhs, loop_id) || mentions_loop(p, *rhs, loop_id),
        ExprKind::Unary { val, .. } | ExprKind::Broadcast { val, .. } => mentions_loop(p, *val, loop_id),
        _ => false,
    }
}

/// Weak-SIV test between two accesses to `arg1`/`arg2`, with subscripts
/// `indices1` against candidate loop `l1` and `indices2` against candidate
/// loop `l2`. Order matters: a store/load pair is tested as `(store's loop,
/// store's arg, store's indices, load's loop, load's arg, load's indices)`.
pub fn check_dependence(p: &Program, l1: StmtId, arg1: ArgId, indices1: &[ExprId], l2: StmtId, arg2: ArgId, indices2: &[ExprId]) -> Dependence {
    if arg1 != arg2 {
        return Dependence::NoDep;
    }
    debug_assert_eq!(indices1.len(), indices2.len(), "subscript arity must match for the same argument");
    for (&i1, &i2) in indices1.iter().zip(indices2.iter()) {
        if is_ref_of_loop(p, i1, l1) && is_ref_of_loop(p, i2, l2) {
            continue;
        }
        if let (Some(r1), Some(r2)) = (known_range(p, i1), known_range(p, i2)) {
            if relation(r1, r2) == RangeRelation::Disjoint {
                continue;
            }
        }
        if mentions_loop(p, i1, l1) || mentions_loop(p, i2, l2) {
            return Dependence::SomeDep;
        }
    }
    Dependence::Equals
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::{ArgId, BinOp};
    use crate::types::{Argument, ElemKind, TensorType};

    fn setup() -> (Program, StmtId, ArgId) {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 16)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 16, 1).unwrap();
        (p, l, ArgId(0))
    }

    #[test]
    fn different_argument_never_aliases() {
        let (mut p, l, a) = setup();
        let b_arg = Argument::new("B", TensorType::new(ElemKind::F32, vec![("N".into(), 16)]));
        p.args.push(b_arg);
        let idx = mk_index(&mut p, l).unwrap();
        let dep = check_dependence(&p, l, a, &[idx], l, ArgId(1), &[idx]);
        assert_eq!(dep, Dependence::NoDep);
    }

    #[test]
    fn same_loop_co_indexed_access_is_equals() {
        // A[i] vs A[i] within the same loop `l` is the textbook accumulator
        // pattern (`A[i] = A[i] + ...`); both sides are a direct reference
        // to the loop under test, so the original's `continue` path applies
        // and the pair is the same address on every iteration.
        let (mut p, l, a) = setup();
        let idx = mk_index(&mut p, l).unwrap();
        let dep = check_dependence(&p, l, a, &[idx], l, a, &[idx]);
        assert_eq!(dep, Dependence::Equals);
    }

    #[test]
    fn one_side_varying_by_its_loop_against_a_fixed_index_is_some_dep() {
        // A[i] (against candidate loop `l1`) vs A[3]: `i` is not matched by
        // a co-indexed reference to `l2` on the other side and the ranges
        // overlap, so `i` varying over the loop could reach index 3.
        let (mut p, l1, a) = setup();
        let l2 = mk_loop(&mut p, "j", 16, 1).unwrap();
        let idx_i = mk_index(&mut p, l1).unwrap();
        let three = mk_constant(&mut p, 3);
        let dep = check_dependence(&p, l1, a, &[idx_i], l2, a, &[three]);
        assert_eq!(dep, Dependence::SomeDep);
    }

    #[test]
    fn disjoint_constant_offsets_are_not_equals() {
        let (mut p, l, a) = setup();
        let idx = mk_index(&mut p, l).unwrap();
        let four = mk_constant(&mut p, 4);
        let shifted = mk_binary(&mut p, BinOp::Add, idx, four).unwrap();
        let dep = check_dependence(&p, l, a, &[idx], l, a, &[shifted]);
        assert_ne!(dep, Dependence::Equals);
    }

    #[test]
    fn identical_constant_subscript_not_mentioning_loop_is_equals() {
        let (mut p, l, a) = setup();
        let c = mk_constant(&mut p, 3);
        let dep = check_dependence(&p, l, a, &[c], l, a, &[c]);
        assert_eq!(dep, Dependence::Equals);
    }
}
