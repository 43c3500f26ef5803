use crate::ir::{ArgId, ExprId, ExprKind, ExprNode, LocalId, NodeRef, StmtId, StmtKind, StmtNode};
use crate::types::{Argument, LocalVar};
use std::fmt;

/// The root scope and compilation unit: a named argument list, a set of
/// scalar/vector locals, and a body of owned top-level statements, backed
/// by the program's own statement and expression arenas.
#[derive(Debug, Clone)]
pub struct Program {
    pub name: String,
    pub args: Vec<Argument>,
    pub locals: Vec<LocalVar>,
    pub body: Vec<StmtId>,
    stmts: Vec<StmtNode>,
    exprs: Vec<ExprNode>,
}

impl Program {
    pub fn new(name: impl Into<String>, args: Vec<Argument>, locals: Vec<LocalVar>) -> Self {
        Program { name: name.into(), args, locals, body: Vec::new(), stmts: Vec::new(), exprs: Vec::new() }
    }

    // -- arena access -----------------------------------------------------

    pub fn stmt(&self, id: StmtId) -> &StmtNode {
        &self.stmts[id.0 as usize]
    }

    pub fn stmt_mut(&mut self, id: StmtId) -> &mut StmtNode {
        &mut self.stmts[id.0 as usize]
    }

    pub fn expr(&self, id: ExprId) -> &ExprNode {
        &self.exprs[id.0 as usize]
    }

    pub fn expr_mut(&mut self, id: ExprId) -> &mut ExprNode {
        &mut self.exprs[id.0 as usize]
    }

    pub fn num_stmts(&self) -> usize {
        self.stmts.len()
    }

    pub fn num_exprs(&self) -> usize {
        self.exprs.len()
    }

    pub fn stmt_ids(&self) -> impl Iterator<Item = StmtId> {
        (0..self.stmts.len() as u32).map(StmtId)
    }

    pub fn arg(&self, id: ArgId) -> &Argument {
        &self.args[id.0 as usize]
    }

    pub fn local(&self, id: LocalId) -> &LocalVar {
        &self.locals[id.0 as usize]
    }

    pub fn find_arg(&self, name: &str) -> Option<ArgId> {
        self.args.iter().position(|a| a.name == name).map(|i| ArgId(i as u32))
    }

    pub fn find_local(&self, name: &str) -> Option<LocalId> {
        self.locals.iter().position(|l| l.name == name).map(|i| LocalId(i as u32))
    }

    /// Find a `Loop` statement anywhere in the tree by its index name. Used
    /// by `applyPragma` to resolve a pragma's `loop-name` field.
    pub fn find_loop(&self, name: &str) -> Option<StmtId> {
        self.stmt_ids().find(|id| match &self.stmt(*id).kind {
            StmtKind::Loop { index_name, .. } => index_name == name,
            _ => false,
        })
    }

    pub fn loop_name(&self, id: StmtId) -> Option<&str> {
        match &self.stmt(id).kind {
            StmtKind::Loop { index_name, .. } => Some(index_name.as_str()),
            _ => None,
        }
    }

    // -- construction -------------------------------------------------

    /// Push a new, unparented statement node and return its id.
    pub fn push_stmt(&mut self, kind: StmtKind) -> StmtId {
        let id = StmtId(self.stmts.len() as u32);
        self.stmts.push(StmtNode { kind, parent: None });
        self.sync_stmt_children(id);
        id
    }

    /// Push a new, unparented expression node, inferring its `ExprType`
    /// from the kind (and, for operators, from its operands' already-known
    /// types — callers are responsible for ensuring those match where the
    /// spec requires it; `verify()` double-checks).
    pub fn push_expr(&mut self, kind: ExprKind) -> ExprId {
        let ty = self.infer_type(&kind);
        let id = ExprId(self.exprs.len() as u32);
        self.exprs.push(ExprNode { kind, ty, parent: None });
        self.sync_expr_children(id);
        id
    }

    fn infer_type(&self, kind: &ExprKind) -> crate::types::ExprType {
        use crate::types::{ElemKind, ExprType};
        match kind {
            // Integer constants default to `index` kind: their overwhelming
            // use in this IR is as trip counts, offsets, and subscripts.
            // Builders that need an i8/i32-typed literal go through
            // `mk_typed_constant` and patch the type explicitly.
            ExprKind::Constant(_) => ExprType::scalar(ElemKind::Index),
            ExprKind::ConstantFP(_) => ExprType::scalar(ElemKind::F32),
            ExprKind::ConstantString(_) => ExprType::scalar(ElemKind::Ptr),
            ExprKind::Index(_) => ExprType::scalar(ElemKind::Index),
            ExprKind::Load { src, indices } => {
                let elem = self.arg(*src).ty.elem;
                let width = indices.last().map(|i| self.expr(*i).ty.width).unwrap_or(1);
                ExprType::new(elem, width)
            }
            ExprKind::LoadLocal(local) => self.local(*local).ty,
            ExprKind::Binary { lhs, .. } => self.expr(*lhs).ty,
            ExprKind::Unary { val, .. } => self.expr(*val).ty,
            ExprKind::Broadcast { val, width } => self.expr(*val).ty.with_width(*width),
            ExprKind::Gep { .. } => ExprType::scalar(ElemKind::Ptr),
        }
    }

    /// Recompute the `parent` field of every statement directly owned by
    /// `id`'s current field values. Idempotent; call again after mutating a
    /// node's children so each child's recorded owner matches the slot it
    /// is actually reachable from (invariant H1).
    pub fn sync_stmt_children(&mut self, id: StmtId) {
        let children: Vec<StmtId> = match &self.stmt(id).kind {
            StmtKind::Loop { body, .. } | StmtKind::IfRange { body, .. } => body.clone(),
            _ => Vec::new(),
        };
        for c in children {
            self.stmt_mut(c).parent = Some(NodeRef::Stmt(id));
        }
        let child_exprs: Vec<ExprId> = self.direct_child_exprs_of_stmt(id);
        for c in child_exprs {
            self.expr_mut(c).parent = Some(NodeRef::Stmt(id));
        }
    }

    /// Same as `sync_stmt_children`, for the program's own root body.
    pub fn sync_root_children(&mut self) {
        let body = self.body.clone();
        for c in body {
            self.stmt_mut(c).parent = Some(NodeRef::Root);
        }
    }

    pub fn sync_expr_children(&mut self, id: ExprId) {
        let children: Vec<ExprId> = self.direct_child_exprs_of_expr(id);
        for c in children {
            self.expr_mut(c).parent = Some(NodeRef::Expr(id));
        }
    }

    fn direct_child_exprs_of_stmt(&self, id: StmtId) -> Vec<ExprId> {
        match &self.stmt(id).kind {
            StmtKind::Loop { .. } => Vec::new(),
            StmtKind::IfRange { index, .. } => vec![*index],
            StmtKind::Store { indices, value, .. } => {
                let mut v = indices.clone();
                v.push(*value);
                v
            }
            StmtKind::StoreLocal { value, .. } => vec![*value],
            StmtKind::Call { params, .. } => params.clone(),
        }
    }

    fn direct_child_exprs_of_expr(&self, id: ExprId) -> Vec<ExprId> {
        match &self.expr(id).kind {
            ExprKind::Constant(_) | ExprKind::ConstantFP(_) | ExprKind::ConstantString(_) | ExprKind::Index(_) => Vec::new(),
            ExprKind::Load { indices, .. } => indices.clone(),
            ExprKind::LoadLocal(_) => Vec::new(),
            ExprKind::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            ExprKind::Unary { val, .. } => vec![*val],
            ExprKind::Broadcast { val, .. } => vec![*val],
            ExprKind::Gep { indices, .. } => indices.clone(),
        }
    }

    /// Recompute the cached `ExprType` of `id` from its (already-correct)
    /// operand types. Transforms that rewrite operand widths in place (e.g.
    /// `vectorize`) call this bottom-up after the rewrite.
    pub fn resync_type(&mut self, id: ExprId) {
        let ty = self.infer_type(&self.expr(id).kind.clone());
        self.expr_mut(id).ty = ty;
    }

    // -- scope editing ------------------------------------------------

    /// Append `stmt` to the end of `scope`'s body (or the program's root
    /// body if `scope` is `None`).
    pub fn append_stmt(&mut self, scope: Option<StmtId>, stmt: StmtId) {
        match scope {
            Some(s) => {
                self.stmt_mut(s).kind.body_mut().expect("append target is not a scope").push(stmt);
                self.sync_stmt_children(s);
            }
            None => {
                self.body.push(stmt);
                self.sync_root_children();
            }
        }
    }

    /// Insert `stmt` immediately before `before` within `scope`'s body.
    pub fn insert_before(&mut self, scope: Option<StmtId>, before: StmtId, stmt: StmtId) {
        match scope {
            Some(s) => {
                let body = self.stmt_mut(s).kind.body_mut().expect("insert target is not a scope");
                let pos = body.iter().position(|&x| x == before).expect("`before` not found in scope");
                body.insert(pos, stmt);
                self.sync_stmt_children(s);
            }
            None => {
                let pos = self.body.iter().position(|&x| x == before).expect("`before` not found in root body");
                self.body.insert(pos, stmt);
                self.sync_root_children();
            }
        }
    }

    /// Remove `stmt` from `scope`'s body. Cascade-destruction is implicit:
    /// once unreachable from the root, a subtree is simply garbage in the
    /// arena (never collected, same tradeoff any arena-based IR makes).
    pub fn remove_stmt(&mut self, scope: Option<StmtId>, stmt: StmtId) {
        match scope {
            Some(s) => {
                self.stmt_mut(s).kind.body_mut().expect("remove target is not a scope").retain(|&x| x != stmt);
            }
            None => {
                self.body.retain(|&x| x != stmt);
            }
        }
    }

    pub fn scope_body(&self, scope: Option<StmtId>) -> &[StmtId] {
        match scope {
            Some(s) => self.stmt(s).kind.body().expect("not a scope"),
            None => &self.body,
        }
    }

    /// Splice `contents` into `scope` in place of `at`, preserving order,
    /// and drop `at` itself. Used by `simplify`'s trip-count-1 loop
    /// elimination and `tile`'s body-move.
    pub fn splice_replace(&mut self, scope: Option<StmtId>, at: StmtId, contents: Vec<StmtId>) {
        let body_vec: &mut Vec<StmtId> = match scope {
            Some(s) => self.stmt_mut(s).kind.body_mut().expect("splice target is not a scope"),
            None => &mut self.body,
        };
        let pos = body_vec.iter().position(|&x| x == at).expect("`at` not found in scope");
        body_vec.splice(pos..=pos, contents);
        match scope {
            Some(s) => self.sync_stmt_children(s),
            None => self.sync_root_children(),
        }
    }

    // -- debug printing -------------------------------------------------

    /// Indented loop-nest text, e.g. for `--time` output or an interactive
    /// debugger. Not the wire format (`crate::bytecode`) — just a human
    /// readable rendering of the current tree.
    pub fn dump(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("func {}(", self.name));
        for (i, a) in self.args.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            out.push_str(&format!("{}: {:?}", a.name, a.ty.elem));
        }
        out.push_str(") {\n");
        for l in &self.locals {
            out.push_str(&format!("  var {}: {:?}x{}\n", l.name, l.ty.elem, l.ty.width));
        }
        for &s in &self.body {
            self.fmt_stmt(&mut out, s, 1);
        }
        out.push_str("}\n");
        out
    }

    fn fmt_stmt(&self, out: &mut String, id: StmtId, depth: usize) {
        let pad = "  ".repeat(depth);
        match &self.stmt(id).kind {
            StmtKind::Loop { index_name, end, stride, body } => {
                out.push_str(&format!("{}for {} in 0..{} step {} {{\n", pad, index_name, end, stride));
                for &c in body {
                    self.fmt_stmt(out, c, depth + 1);
                }
                out.push_str(&format!("{}}}\n", pad));
            }
            StmtKind::IfRange { index, lo, hi, body } => {
                out.push_str(&format!("{}if {} <= {} < {} {{\n", pad, lo, self.fmt_expr(*index), hi));
                for &c in body {
                    self.fmt_stmt(out, c, depth + 1);
                }
                out.push_str(&format!("{}}}\n", pad));
            }
            StmtKind::Store { dest, indices, value, accumulate } => {
                let idx = indices.iter().map(|i| self.fmt_expr(*i)).collect::<Vec<_>>().join(", ");
                let op = if *accumulate { "+=" } else { "=" };
                out.push_str(&format!("{}{}[{}] {} {}\n", pad, self.arg(*dest).name, idx, op, self.fmt_expr(*value)));
            }
            StmtKind::StoreLocal { dest, value, accumulate } => {
                let op = if *accumulate { "+=" } else { "=" };
                out.push_str(&format!("{}{} {} {}\n", pad, self.local(*dest).name, op, self.fmt_expr(*value)));
            }
            StmtKind::Call { name, params } => {
                let args = params.iter().map(|p| self.fmt_expr(*p)).collect::<Vec<_>>().join(", ");
                out.push_str(&format!("{}{}({})\n", pad, name, args));
            }
        }
    }

    fn fmt_expr(&self, id: ExprId) -> String {
        match &self.expr(id).kind {
            ExprKind::Constant(v) => v.to_string(),
            ExprKind::ConstantFP(v) => v.to_string(),
            ExprKind::ConstantString(s) => format!("{:?}", s),
            ExprKind::Index(l) => self.loop_name(*l).unwrap_or("?").to_string(),
            ExprKind::Load { src, indices } => {
                let idx = indices.iter().map(|i| self.fmt_expr(*i)).collect::<Vec<_>>().join(", ");
                format!("{}[{}]", self.arg(*src).name, idx)
            }
            ExprKind::LoadLocal(l) => self.local(*l).name.clone(),
            ExprKind::Binary { op, lhs, rhs } => format!("({} {} {})", self.fmt_expr(*lhs), op.symbol(), self.fmt_expr(*rhs)),
            ExprKind::Unary { op, val } => format!("{}({})", op.name(), self.fmt_expr(*val)),
            ExprKind::Broadcast { val, width } => format!("broadcast({}, {})", self.fmt_expr(*val), width),
            ExprKind::Gep { dest, indices } => {
                let idx = indices.iter().map(|i| self.fmt_expr(*i)).collect::<Vec<_>>().join(", ");
                format!("&{}[{}]", self.arg(*dest).name, idx)
            }
        }
    }
}

impl fmt::Display for Program {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.dump())
    }
}

#[cfg(test)]
mod dump_tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn dump_renders_loop_and_store() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 4)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 4, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.5);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let text = p.dump();
        assert!(text.contains("func k(A: F32)"));
        assert!(text.contains("for i in 0..4 step 1"));
        assert!(text.contains("A[i] = 1.5"));
        assert_eq!(format!("{}", p), text);
    }
}
