//! Small tree-walking collectors used by transforms to find every `Loop`,
//! every `Load`/`Store` touching a given argument, or every `IndexExpr`
//! referencing a given loop, without each transform re-deriving its own
//! traversal.

use crate::ir::{ArgId, ExprId, ExprKind, Program, StmtId, StmtKind};
use crate::visit::{walk_program, Visitor};

pub fn all_loops(p: &Program) -> Vec<StmtId> {
    struct Collector(Vec<StmtId>);
    impl Visitor for Collector {
        fn enter_stmt(&mut self, p: &Program, id: StmtId) {
            if p.stmt(id).kind.is_loop() {
                self.0.push(id);
            }
        }
    }
    let mut c = Collector(Vec::new());
    walk_program(p, &mut c);
    c.0
}

/// Every expression id that is an `IndexExpr` referencing `loop_id`,
/// wherever it appears in the tree (it may be nested inside arithmetic).
pub fn index_refs_to(p: &Program, loop_id: StmtId) -> Vec<ExprId> {
    struct Collector {
        loop_id: StmtId,
        found: Vec<ExprId>,
    }
    impl Visitor for Collector {
        fn enter_expr(&mut self, p: &Program, id: ExprId) {
            if let ExprKind::Index(l) = &p.expr(id).kind {
                if *l == self.loop_id {
                    self.found.push(id);
                }
            }
        }
    }
    let mut c = Collector { loop_id, found: Vec::new() };
    walk_program(p, &mut c);
    c.found
}

#[derive(Debug, Clone, Copy)]
pub struct LoadRef {
    pub expr: ExprId,
    pub arg: ArgId,
}

#[derive(Debug, Clone, Copy)]
pub struct StoreRef {
    pub stmt: StmtId,
    pub arg: ArgId,
}

pub fn all_loads(p: &Program) -> Vec<LoadRef> {
    struct Collector(Vec<LoadRef>);
    impl Visitor for Collector {
        fn enter_expr(&mut self, p: &Program, id: ExprId) {
            if let ExprKind::Load { src, .. } = &p.expr(id).kind {
                self.0.push(LoadRef { expr: id, arg: *src });
            }
        }
    }
    let mut c = Collector(Vec::new());
    walk_program(p, &mut c);
    c.0
}

pub fn all_stores(p: &Program) -> Vec<StoreRef> {
    struct Collector(Vec<StoreRef>);
    impl Visitor for Collector {
        fn enter_stmt(&mut self, p: &Program, id: StmtId) {
            if let StmtKind::Store { dest, .. } = &p.stmt(id).kind {
                self.0.push(StoreRef { stmt: id, arg: *dest });
            }
        }
    }
    let mut c = Collector(Vec::new());
    walk_program(p, &mut c);
    c.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;

    #[test]
    fn finds_nested_loops() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let outer = mk_loop(&mut p, "i", 4, 1).unwrap();
        let inner = mk_loop(&mut p, "j", 4, 1).unwrap();
        p.append_stmt(Some(outer), inner);
        p.append_stmt(None, outer);
        let loops = all_loops(&p);
        assert_eq!(loops.len(), 2);
    }

    #[test]
    fn finds_index_refs() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let l = mk_loop(&mut p, "i", 4, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let one = mk_constant(&mut p, 1);
        let sum = mk_binary(&mut p, crate::ir::BinOp::Add, idx, one).unwrap();
        let call = mk_call(&mut p, "sink", vec![sum]);
        p.append_stmt(Some(l), call);
        p.append_stmt(None, l);
        assert_eq!(index_refs_to(&p, l), vec![idx]);
    }
}
