//! Roofline cost estimation: a static walk of the tree producing a
//! `(mem_ops, arith_ops)` pair, and a hot-scope frequency multiplier derived
//! from enclosing loop trip counts. Grounded in `ComputeEstimator`'s
//! `NodeVisitor`: a `Load`/`Store` costs its vector width in memory ops, a
//! `LoadLocal`/`StoreLocal` is free (register-resident), a `Binary` costs
//! its width in arith ops unless it's `index`-typed address arithmetic, and
//! a `Broadcast` costs one arith op regardless of width.

use crate::ir::{ExprId, ExprKind, Program, StmtId, StmtKind};
use crate::types::ElemKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Cost {
    pub mem_ops: u64,
    pub arith_ops: u64,
}

impl Cost {
    fn add(self, other: Cost) -> Cost {
        Cost { mem_ops: self.mem_ops + other.mem_ops, arith_ops: self.arith_ops + other.arith_ops }
    }

    fn scaled(self, factor: u64) -> Cost {
        Cost { mem_ops: self.mem_ops * factor, arith_ops: self.arith_ops * factor }
    }

    /// A crude single-number total used to rank variants in the driver when
    /// a tie-break is needed; the pair itself is what gets reported.
    pub fn total(self) -> u64 {
        self.mem_ops + self.arith_ops
    }

    pub fn format(self) -> String {
        format!("mem={} arith={}", self.mem_ops, self.arith_ops)
    }
}

pub fn estimate_expr(p: &Program, id: ExprId) -> Cost {
    match &p.expr(id).kind {
        ExprKind::Constant(_) | ExprKind::ConstantFP(_) | ExprKind::ConstantString(_) | ExprKind::Index(_) => Cost::default(),
        ExprKind::Load { src: _, indices } => {
            let width = p.expr(id).ty.width as u64;
            indices.iter().fold(Cost { mem_ops: width, arith_ops: 0 }, |acc, &i| acc.add(estimate_expr(p, i)))
        }
        ExprKind::LoadLocal(_) => Cost::default(),
        ExprKind::Binary { lhs, rhs, .. } => {
            let own = if p.expr(id).ty.elem == ElemKind::Index {
                Cost::default()
            } else {
                Cost { mem_ops: 0, arith_ops: p.expr(id).ty.width as u64 }
            };
            own.add(estimate_expr(p, *lhs)).add(estimate_expr(p, *rhs))
        }
        ExprKind::Unary { val, .. } => {
            let own = Cost { mem_ops: 0, arith_ops: p.expr(id).ty.width as u64 };
            own.add(estimate_expr(p, *val))
        }
        ExprKind::Broadcast { val, .. } => Cost { mem_ops: 0, arith_ops: 1 }.add(estimate_expr(p, *val)),
        ExprKind::Gep { indices, .. } => indices.iter().fold(Cost::default(), |acc, &i| acc.add(estimate_expr(p, i))),
    }
}

pub fn estimate_stmt(p: &Program, id: StmtId) -> Cost {
    match &p.stmt(id).kind {
        StmtKind::Loop { end, stride, body, .. } => {
            let trips = end / (*stride).max(1);
            let body_cost = body.iter().fold(Cost::default(), |acc, &s| acc.add(estimate_stmt(p, s)));
            body_cost.scaled(trips)
        }
        StmtKind::IfRange { index, body, .. } => {
            let idx_cost = estimate_expr(p, *index);
            let body_cost = body.iter().fold(Cost::default(), |acc, &s| acc.add(estimate_stmt(p, s)));
            idx_cost.add(body_cost)
        }
        StmtKind::Store { indices, value, accumulate, .. } => {
            let width = p.expr(*value).ty.width as u64;
            let idx_cost = indices.iter().fold(Cost::default(), |acc, &i| acc.add(estimate_expr(p, i)));
            // A plain store adds (W,0); an accumulating store reads the old
            // value, adds, and writes it back: (2W, W).
            let own = if *accumulate { Cost { mem_ops: width * 2, arith_ops: width } } else { Cost { mem_ops: width, arith_ops: 0 } };
            idx_cost.add(estimate_expr(p, *value)).add(own)
        }
        StmtKind::StoreLocal { value, .. } => estimate_expr(p, *value),
        StmtKind::Call { params, .. } => params.iter().fold(Cost::default(), |acc, &e| acc.add(estimate_expr(p, e))),
    }
}

pub fn estimate_program(p: &Program) -> Cost {
    p.body.iter().fold(Cost::default(), |acc, &s| acc.add(estimate_stmt(p, s)))
}

/// The iteration-count multiplier a statement executes under, the product
/// of every enclosing loop's trip count. Used by the hot-scope search to
/// rank candidate loop nests by how much of the total runtime they cover.
pub fn hot_scope_frequency(p: &Program, target: StmtId) -> Option<u64> {
    fn walk(p: &Program, scope: Option<StmtId>, multiplier: u64, target: StmtId) -> Option<u64> {
        for &id in p.scope_body(scope) {
            if id == target {
                return Some(multiplier);
            }
            if let StmtKind::Loop { end, stride, .. } = &p.stmt(id).kind {
                let trips = end / (*stride).max(1);
                if let Some(found) = walk(p, Some(id), multiplier * trips, target) {
                    return Some(found);
                }
            } else if p.stmt(id).kind.body().is_some() {
                if let Some(found) = walk(p, Some(id), multiplier, target) {
                    return Some(found);
                }
            }
        }
        None
    }
    walk(p, None, 1, target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn store_cost_scaled_by_trip_count() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 8)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 8, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let cost = estimate_program(&p);
        assert_eq!(cost.mem_ops, 8);
    }

    #[test]
    fn hot_scope_frequency_is_product_of_enclosing_trips() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let outer = mk_loop(&mut p, "i", 4, 1).unwrap();
        let inner = mk_loop(&mut p, "j", 8, 1).unwrap();
        p.append_stmt(Some(outer), inner);
        p.append_stmt(None, outer);
        assert_eq!(hot_scope_frequency(&p, inner), Some(4));
    }
}
