//! Big-endian bytecode serializer/deserializer, round-tripping a `Program`
//! through a byte stream. Grounded in the original `Bytecode.h`/`.cpp`:
//! `IdTable<ElemTy>` is the same linear interning table (here backed by an
//! `indexmap::IndexSet` rather than a linear-scan `Vec`, since `indexmap` is
//! already in the dependency table and gives the same "insert if absent,
//! look up by position" behavior for free), `StreamWriter`/`StreamReader`
//! are the same big-endian cursor pair, and the header format (magic, then
//! string/`ExprType`/`TensorType` tables) matches `BytecodeHeader::serialize`
//! byte for byte. The body — `Program`/`Stmt`/`Expr` — is not in the
//! surviving original source, so its pre-order tree encoding (`u8 tag, u32
//! type-id?, children...`) follows the wire format directly.

use crate::errors::{BistraError, BistraResult};
use crate::ir::{ArgId, BinOp, ExprId, ExprKind, LocalId, Program, StmtId, StmtKind, UnOp};
use crate::types::{Argument, ElemKind, ExprType, LocalVar, TensorType};
use hashbrown::HashMap;
use indexmap::IndexSet;

pub const MAGIC: [u8; 4] = [0x03, 0x07, 0x01, 0x02];

/// Interns values of type `T`, handing out stable `u32` ids in insertion
/// order. Mirrors `bistra::IdTable<ElemTy>`.
#[derive(Debug, Default)]
pub struct IdTable<T: std::hash::Hash + Eq> {
    table: IndexSet<T>,
}

impl<T: std::hash::Hash + Eq + Clone> IdTable<T> {
    pub fn new() -> Self {
        IdTable { table: IndexSet::new() }
    }

    /// Returns the id for `elem`, inserting it at the end of the table if
    /// this is the first time it's been seen.
    pub fn get_id_for(&mut self, elem: T) -> u32 {
        self.table.insert_full(elem).0 as u32
    }

    pub fn get_by_id(&self, id: u32) -> Option<&T> {
        self.table.get_index(id as usize)
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.table.iter()
    }
}

/// A big-endian output cursor over an in-memory byte buffer.
struct StreamWriter {
    buf: Vec<u8>,
}

impl StreamWriter {
    fn new() -> Self {
        StreamWriter { buf: Vec::new() }
    }

    fn write_u8(&mut self, b: u8) {
        self.buf.push(b);
    }

    fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_u64(&mut self, v: u64) {
        self.buf.extend_from_slice(&v.to_be_bytes());
    }

    fn write_i64(&mut self, v: i64) {
        self.write_u64(v as u64);
    }

    fn write_f64(&mut self, v: f64) {
        self.write_u64(v.to_bits());
    }

    fn write_bool(&mut self, v: bool) {
        self.write_u8(if v { 1 } else { 0 });
    }

    /// Length-prefixed (`u8`) string; the table-building passes guarantee
    /// every interned string is short, so this is an assertion, not a
    /// recoverable error.
    fn write_str(&mut self, s: &str) {
        assert!(s.len() < 256, "string too long to serialize: {:?}", s);
        self.write_u8(s.len() as u8);
        self.buf.extend_from_slice(s.as_bytes());
    }
}

/// A big-endian input cursor over a borrowed byte slice.
struct StreamReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> StreamReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        StreamReader { buf, pos: 0 }
    }

    fn read_u8(&mut self) -> BistraResult<u8> {
        let b = *self.buf.get(self.pos).ok_or(BistraError::UnexpectedEof)?;
        self.pos += 1;
        Ok(b)
    }

    fn read_u32(&mut self) -> BistraResult<u32> {
        let end = self.pos + 4;
        let bytes = self.buf.get(self.pos..end).ok_or(BistraError::UnexpectedEof)?;
        self.pos = end;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    fn read_u64(&mut self) -> BistraResult<u64> {
        let end = self.pos + 8;
        let bytes = self.buf.get(self.pos..end).ok_or(BistraError::UnexpectedEof)?;
        self.pos = end;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(bytes);
        Ok(u64::from_be_bytes(arr))
    }

    fn read_i64(&mut self) -> BistraResult<i64> {
        Ok(self.read_u64()? as i64)
    }

    fn read_f64(&mut self) -> BistraResult<f64> {
        Ok(f64::from_bits(self.read_u64()?))
    }

    fn read_bool(&mut self) -> BistraResult<bool> {
        Ok(self.read_u8()? != 0)
    }

    fn read_str(&mut self) -> BistraResult<String> {
        let len = self.read_u8()? as usize;
        let end = self.pos + len;
        let bytes = self.buf.get(self.pos..end).ok_or(BistraError::UnexpectedEof)?;
        self.pos = end;
        String::from_utf8(bytes.to_vec()).map_err(|_| BistraError::UnexpectedEof)
    }

    #[allow(dead_code)]
    fn has_more(&self) -> bool {
        self.pos != self.buf.len()
    }
}

fn elem_kind_to_u8(k: ElemKind) -> u8 {
    match k {
        ElemKind::F32 => 0,
        ElemKind::I8 => 1,
        ElemKind::I32 => 2,
        ElemKind::Index => 3,
        ElemKind::Ptr => 4,
    }
}

fn elem_kind_from_u8(b: u8) -> BistraResult<ElemKind> {
    match b {
        0 => Ok(ElemKind::F32),
        1 => Ok(ElemKind::I8),
        2 => Ok(ElemKind::I32),
        3 => Ok(ElemKind::Index),
        4 => Ok(ElemKind::Ptr),
        _ => Err(BistraError::BadTag(b)),
    }
}

fn binop_to_u8(op: BinOp) -> u8 {
    match op {
        BinOp::Add => 0,
        BinOp::Sub => 1,
        BinOp::Mul => 2,
        BinOp::Div => 3,
        BinOp::Max => 4,
        BinOp::Min => 5,
        BinOp::Pow => 6,
    }
}

fn binop_from_u8(b: u8) -> BistraResult<BinOp> {
    match b {
        0 => Ok(BinOp::Add),
        1 => Ok(BinOp::Sub),
        2 => Ok(BinOp::Mul),
        3 => Ok(BinOp::Div),
        4 => Ok(BinOp::Max),
        5 => Ok(BinOp::Min),
        6 => Ok(BinOp::Pow),
        _ => Err(BistraError::BadTag(b)),
    }
}

fn unop_to_u8(op: UnOp) -> u8 {
    match op {
        UnOp::Exp => 0,
        UnOp::Log => 1,
        UnOp::Sqrt => 2,
        UnOp::Abs => 3,
    }
}

fn unop_from_u8(b: u8) -> BistraResult<UnOp> {
    match b {
        0 => Ok(UnOp::Exp),
        1 => Ok(UnOp::Log),
        2 => Ok(UnOp::Sqrt),
        3 => Ok(UnOp::Abs),
        _ => Err(BistraError::BadTag(b)),
    }
}

/// The three interned tables that make up the bytecode header, built once
/// up front so every string/type reference in the body is a small integer.
#[derive(Default)]
struct Header {
    strings: IdTable<String>,
    expr_tys: IdTable<ExprType>,
    tensor_tys: IdTable<TensorType>,
}

impl Header {
    fn write(&mut self, sw: &mut StreamWriter) {
        sw.write_u32(u32::from_be_bytes(MAGIC));

        // Tensor-type dim names must be in the string table too, same as
        // the original's pre-pass before locking the table.
        let dim_names: Vec<String> = self.tensor_tys.iter().flat_map(|t| t.extents.iter().map(|(n, _)| n.clone())).collect();
        for name in dim_names {
            self.strings.get_id_for(name);
        }

        sw.write_u32(self.strings.len() as u32);
        for s in self.strings.iter().cloned().collect::<Vec<_>>() {
            sw.write_str(&s);
        }

        sw.write_u32(self.expr_tys.len() as u32);
        for ty in self.expr_tys.iter().cloned().collect::<Vec<_>>() {
            sw.write_u8(elem_kind_to_u8(ty.elem));
            sw.write_u8(ty.width as u8);
        }

        sw.write_u32(self.tensor_tys.len() as u32);
        for tt in self.tensor_tys.iter().cloned().collect::<Vec<_>>() {
            sw.write_u8(elem_kind_to_u8(tt.elem));
            sw.write_u8(tt.extents.len() as u8);
            for (name, size) in &tt.extents {
                sw.write_u32(*size);
                sw.write_u32(self.strings.get_id_for(name.clone()));
            }
        }
    }

    fn read(sr: &mut StreamReader) -> BistraResult<Header> {
        let magic = sr.read_u32()?.to_be_bytes();
        if magic != MAGIC {
            return Err(BistraError::BadMagic(magic));
        }

        let mut strings = IdTable::new();
        let n_strings = sr.read_u32()?;
        for _ in 0..n_strings {
            strings.get_id_for(sr.read_str()?);
        }

        let mut expr_tys = IdTable::new();
        let n_expr_tys = sr.read_u32()?;
        for _ in 0..n_expr_tys {
            let elem = elem_kind_from_u8(sr.read_u8()?)?;
            let width = sr.read_u8()? as u32;
            expr_tys.get_id_for(ExprType::new(elem, width));
        }

        let mut tensor_tys = IdTable::new();
        let n_tensor_tys = sr.read_u32()?;
        for _ in 0..n_tensor_tys {
            let elem = elem_kind_from_u8(sr.read_u8()?)?;
            let num_dims = sr.read_u8()?;
            let mut extents = Vec::with_capacity(num_dims as usize);
            for _ in 0..num_dims {
                let size = sr.read_u32()?;
                let name_id = sr.read_u32()?;
                let name = strings
                    .get_by_id(name_id)
                    .cloned()
                    .ok_or(BistraError::BadTableIndex { table: "string", index: name_id, len: strings.len() })?;
                extents.push((name, size));
            }
            tensor_tys.get_id_for(TensorType::new(elem, extents));
        }

        Ok(Header { strings, expr_tys, tensor_tys })
    }
}

/// Maps a `Loop`'s `StmtId` to the small integer it was assigned the first
/// time it was serialized, so sibling `IndexExpr`s can reference it by that
/// integer rather than by a pointer-shaped id tied to one arena. Mirrors
/// `BytecodeContext::stmtTable_`.
#[derive(Default)]
struct LoopIds {
    by_old: HashMap<StmtId, u32>,
    by_new: Vec<StmtId>,
}

pub fn serialize(p: &Program) -> Vec<u8> {
    let mut header = Header::default();
    for arg in &p.args {
        header.strings.get_id_for(arg.name.clone());
        header.tensor_tys.get_id_for(arg.ty.clone());
    }
    for local in &p.locals {
        header.strings.get_id_for(local.name.clone());
        header.expr_tys.get_id_for(local.ty);
    }
    header.strings.get_id_for(p.name.clone());
    collect_expr_types(p, &mut header);

    let mut sw = StreamWriter::new();
    header.write(&mut sw);

    sw.write_u32(header.strings.get_id_for(p.name.clone()));

    sw.write_u32(p.args.len() as u32);
    for arg in &p.args {
        sw.write_u32(header.strings.get_id_for(arg.name.clone()));
        sw.write_u32(header.tensor_tys.get_id_for(arg.ty.clone()));
    }

    sw.write_u32(p.locals.len() as u32);
    for local in &p.locals {
        sw.write_u32(header.strings.get_id_for(local.name.clone()));
        sw.write_u32(header.expr_tys.get_id_for(local.ty));
    }

    let mut loop_ids = LoopIds::default();
    sw.write_u32(p.body.len() as u32);
    for &s in &p.body {
        write_stmt(p, &mut header, &mut loop_ids, &mut sw, s);
    }

    sw.buf
}

/// Walks the whole tree once up front so every `ExprType` a node carries is
/// already in the header table before the body is emitted (the header must
/// be fully written before the body, so its tables can't grow afterward).
fn collect_expr_types(p: &Program, header: &mut Header) {
    for &id in &p.body {
        collect_stmt_types(p, header, id);
    }
}

fn collect_stmt_types(p: &Program, header: &mut Header, id: StmtId) {
    match &p.stmt(id).kind {
        StmtKind::Loop { body, .. } => {
            for &c in body {
                collect_stmt_types(p, header, c);
            }
        }
        StmtKind::IfRange { index, body, .. } => {
            collect_expr_types_rec(p, header, *index);
            for &c in body {
                collect_stmt_types(p, header, c);
            }
        }
        StmtKind::Store { indices, value, .. } => {
            for &i in indices {
                collect_expr_types_rec(p, header, i);
            }
            collect_expr_types_rec(p, header, *value);
        }
        StmtKind::StoreLocal { value, .. } => collect_expr_types_rec(p, header, *value),
        StmtKind::Call { params, .. } => {
            for &e in params {
                collect_expr_types_rec(p, header, e);
            }
        }
    }
}

fn collect_expr_types_rec(p: &Program, header: &mut Header, id: ExprId) {
    header.expr_tys.get_id_for(p.expr(id).ty);
    match &p.expr(id).kind {
        ExprKind::Constant(_) | ExprKind::ConstantFP(_) | ExprKind::Index(_) | ExprKind::LoadLocal(_) => {}
        ExprKind::ConstantString(s) => {
            header.strings.get_id_for(s.clone());
        }
        ExprKind::Load { indices, .. } => {
            for &i in indices {
                collect_expr_types_rec(p, header, i);
            }
        }
        ExprKind::Binary { lhs, rhs, .. } => {
            collect_expr_types_rec(p, header, *lhs);
            collect_expr_types_rec(p, header, *rhs);
        }
        ExprKind::Unary { val, .. } => collect_expr_types_rec(p, header, *val),
        ExprKind::Broadcast { val, .. } => collect_expr_types_rec(p, header, *val),
        ExprKind::Gep { indices, .. } => {
            for &i in indices {
                collect_expr_types_rec(p, header, i);
            }
        }
    }
}

fn write_stmt(p: &Program, header: &mut Header, loop_ids: &mut LoopIds, sw: &mut StreamWriter, id: StmtId) {
    match &p.stmt(id).kind {
        StmtKind::Loop { index_name, end, stride, body } => {
            sw.write_u8(0);
            let loop_id = loop_ids.by_new.len() as u32;
            loop_ids.by_old.insert(id, loop_id);
            loop_ids.by_new.push(id);
            sw.write_u32(header.strings.get_id_for(index_name.clone()));
            sw.write_u32(*end as u32);
            sw.write_u32(*stride as u32);
            sw.write_u32(body.len() as u32);
            for &c in body {
                write_stmt(p, header, loop_ids, sw, c);
            }
        }
        StmtKind::IfRange { index, lo, hi, body } => {
            sw.write_u8(1);
            write_expr(p, header, loop_ids, sw, *index);
            sw.write_i64(*lo);
            sw.write_i64(*hi);
            sw.write_u32(body.len() as u32);
            for &c in body {
                write_stmt(p, header, loop_ids, sw, c);
            }
        }
        StmtKind::Store { dest, indices, value, accumulate } => {
            sw.write_u8(2);
            sw.write_u32(dest.0);
            sw.write_u32(indices.len() as u32);
            for &i in indices {
                write_expr(p, header, loop_ids, sw, i);
            }
            write_expr(p, header, loop_ids, sw, *value);
            sw.write_bool(*accumulate);
        }
        StmtKind::StoreLocal { dest, value, accumulate } => {
            sw.write_u8(3);
            sw.write_u32(dest.0);
            write_expr(p, header, loop_ids, sw, *value);
            sw.write_bool(*accumulate);
        }
        StmtKind::Call { name, params } => {
            sw.write_u8(4);
            sw.write_u32(header.strings.get_id_for(name.clone()));
            sw.write_u32(params.len() as u32);
            for &e in params {
                write_expr(p, header, loop_ids, sw, e);
            }
        }
    }
}

fn write_expr(p: &Program, header: &mut Header, loop_ids: &mut LoopIds, sw: &mut StreamWriter, id: ExprId) {
    let node = p.expr(id);
    let type_id = header.expr_tys.get_id_for(node.ty);
    match &node.kind {
        ExprKind::Constant(v) => {
            sw.write_u8(0);
            sw.write_u32(type_id);
            sw.write_i64(*v);
        }
        ExprKind::ConstantFP(v) => {
            sw.write_u8(1);
            sw.write_u32(type_id);
            sw.write_f64(*v);
        }
        ExprKind::ConstantString(s) => {
            sw.write_u8(2);
            sw.write_u32(type_id);
            sw.write_u32(header.strings.get_id_for(s.clone()));
        }
        ExprKind::Index(loop_stmt) => {
            sw.write_u8(3);
            sw.write_u32(type_id);
            let loop_id = *loop_ids.by_old.get(loop_stmt).expect("IndexExpr target serialized before reference");
            sw.write_u32(loop_id);
        }
        ExprKind::Load { src, indices } => {
            sw.write_u8(4);
            sw.write_u32(type_id);
            sw.write_u32(src.0);
            sw.write_u32(indices.len() as u32);
            for &i in indices {
                write_expr(p, header, loop_ids, sw, i);
            }
        }
        ExprKind::LoadLocal(l) => {
            sw.write_u8(5);
            sw.write_u32(type_id);
            sw.write_u32(l.0);
        }
        ExprKind::Binary { op, lhs, rhs } => {
            sw.write_u8(6);
            sw.write_u32(type_id);
            sw.write_u8(binop_to_u8(*op));
            write_expr(p, header, loop_ids, sw, *lhs);
            write_expr(p, header, loop_ids, sw, *rhs);
        }
        ExprKind::Unary { op, val } => {
            sw.write_u8(7);
            sw.write_u32(type_id);
            sw.write_u8(unop_to_u8(*op));
            write_expr(p, header, loop_ids, sw, *val);
        }
        ExprKind::Broadcast { val, width } => {
            sw.write_u8(8);
            sw.write_u32(type_id);
            sw.write_u32(*width);
            write_expr(p, header, loop_ids, sw, *val);
        }
        ExprKind::Gep { dest, indices } => {
            sw.write_u8(9);
            sw.write_u32(type_id);
            sw.write_u32(dest.0);
            sw.write_u32(indices.len() as u32);
            for &i in indices {
                write_expr(p, header, loop_ids, sw, i);
            }
        }
    }
}

/// Mirrors `LoopIds` on the read side: position in the deserialized-loop
/// sequence maps back to the fresh `StmtId` assigned by the destination
/// program's arena.
#[derive(Default)]
struct LoopIdsRead {
    by_new: Vec<StmtId>,
}

pub fn deserialize(bytes: &[u8]) -> BistraResult<Program> {
    let mut sr = StreamReader::new(bytes);
    let header = Header::read(&mut sr)?;

    let name_id = sr.read_u32()?;
    let name = lookup_string(&header, name_id)?;

    let n_args = sr.read_u32()?;
    let mut args = Vec::with_capacity(n_args as usize);
    for _ in 0..n_args {
        let name_id = sr.read_u32()?;
        let ty_id = sr.read_u32()?;
        let arg_name = lookup_string(&header, name_id)?;
        let ty = header
            .tensor_tys
            .get_by_id(ty_id)
            .cloned()
            .ok_or(BistraError::BadTableIndex { table: "tensor_type", index: ty_id, len: header.tensor_tys.len() })?;
        args.push(Argument::new(arg_name, ty));
    }

    let n_locals = sr.read_u32()?;
    let mut locals = Vec::with_capacity(n_locals as usize);
    for _ in 0..n_locals {
        let name_id = sr.read_u32()?;
        let ty_id = sr.read_u32()?;
        let local_name = lookup_string(&header, name_id)?;
        let ty = *header
            .expr_tys
            .get_by_id(ty_id)
            .ok_or(BistraError::BadTableIndex { table: "expr_type", index: ty_id, len: header.expr_tys.len() })?;
        locals.push(LocalVar::new(local_name, ty));
    }

    let mut p = Program::new(name, args, locals);
    let mut loop_ids = LoopIdsRead::default();

    let n_body = sr.read_u32()?;
    let mut body = Vec::with_capacity(n_body as usize);
    for _ in 0..n_body {
        body.push(read_stmt(&mut p, &header, &mut loop_ids, &mut sr)?);
    }
    p.body = body;
    p.sync_root_children();

    Ok(p)
}

fn lookup_string(header: &Header, id: u32) -> BistraResult<String> {
    header.strings.get_by_id(id).cloned().ok_or(BistraError::BadTableIndex { table: "string", index: id, len: header.strings.len() })
}

fn read_stmt(p: &mut Program, header: &Header, loop_ids: &mut LoopIdsRead, sr: &mut StreamReader) -> BistraResult<StmtId> {
    let tag = sr.read_u8()?;
    match tag {
        0 => {
            let name_id = sr.read_u32()?;
            let index_name = lookup_string(header, name_id)?;
            let end = sr.read_u32()? as u64;
            let stride = sr.read_u32()? as u64;
            // Reserve the id (and its position in `by_new`) before reading
            // the body, so a self-referential `IndexExpr` inside resolves.
            let placeholder = p.push_stmt(StmtKind::Loop { index_name, end, stride, body: Vec::new() });
            loop_ids.by_new.push(placeholder);
            let n_children = sr.read_u32()?;
            let mut body = Vec::with_capacity(n_children as usize);
            for _ in 0..n_children {
                body.push(read_stmt(p, header, loop_ids, sr)?);
            }
            if let StmtKind::Loop { body: b, .. } = &mut p.stmt_mut(placeholder).kind {
                *b = body;
            }
            p.sync_stmt_children(placeholder);
            Ok(placeholder)
        }
        1 => {
            let index = read_expr(p, header, loop_ids, sr)?;
            let lo = sr.read_i64()?;
            let hi = sr.read_i64()?;
            let n_children = sr.read_u32()?;
            let mut body = Vec::with_capacity(n_children as usize);
            for _ in 0..n_children {
                body.push(read_stmt(p, header, loop_ids, sr)?);
            }
            Ok(p.push_stmt(StmtKind::IfRange { index, lo, hi, body }))
        }
        2 => {
            let dest = ArgId(sr.read_u32()?);
            let n_indices = sr.read_u32()?;
            let mut indices = Vec::with_capacity(n_indices as usize);
            for _ in 0..n_indices {
                indices.push(read_expr(p, header, loop_ids, sr)?);
            }
            let value = read_expr(p, header, loop_ids, sr)?;
            let accumulate = sr.read_bool()?;
            Ok(p.push_stmt(StmtKind::Store { dest, indices, value, accumulate }))
        }
        3 => {
            let dest = LocalId(sr.read_u32()?);
            let value = read_expr(p, header, loop_ids, sr)?;
            let accumulate = sr.read_bool()?;
            Ok(p.push_stmt(StmtKind::StoreLocal { dest, value, accumulate }))
        }
        4 => {
            let name_id = sr.read_u32()?;
            let name = lookup_string(header, name_id)?;
            let n_params = sr.read_u32()?;
            let mut params = Vec::with_capacity(n_params as usize);
            for _ in 0..n_params {
                params.push(read_expr(p, header, loop_ids, sr)?);
            }
            Ok(p.push_stmt(StmtKind::Call { name, params }))
        }
        other => Err(BistraError::BadTag(other)),
    }
}

fn read_expr(p: &mut Program, header: &Header, loop_ids: &mut LoopIdsRead, sr: &mut StreamReader) -> BistraResult<ExprId> {
    let tag = sr.read_u8()?;
    let _type_id = sr.read_u32()?;
    match tag {
        0 => {
            let v = sr.read_i64()?;
            Ok(p.push_expr(ExprKind::Constant(v)))
        }
        1 => {
            let v = sr.read_f64()?;
            Ok(p.push_expr(ExprKind::ConstantFP(v)))
        }
        2 => {
            let name_id = sr.read_u32()?;
            let s = lookup_string(header, name_id)?;
            Ok(p.push_expr(ExprKind::ConstantString(s)))
        }
        3 => {
            let loop_id = sr.read_u32()?;
            let target = *loop_ids.by_new.get(loop_id as usize).ok_or(BistraError::BadTableIndex {
                table: "loop",
                index: loop_id,
                len: loop_ids.by_new.len(),
            })?;
            Ok(p.push_expr(ExprKind::Index(target)))
        }
        4 => {
            let src = ArgId(sr.read_u32()?);
            let n_indices = sr.read_u32()?;
            let mut indices = Vec::with_capacity(n_indices as usize);
            for _ in 0..n_indices {
                indices.push(read_expr(p, header, loop_ids, sr)?);
            }
            Ok(p.push_expr(ExprKind::Load { src, indices }))
        }
        5 => {
            let l = LocalId(sr.read_u32()?);
            Ok(p.push_expr(ExprKind::LoadLocal(l)))
        }
        6 => {
            let op = binop_from_u8(sr.read_u8()?)?;
            let lhs = read_expr(p, header, loop_ids, sr)?;
            let rhs = read_expr(p, header, loop_ids, sr)?;
            Ok(p.push_expr(ExprKind::Binary { op, lhs, rhs }))
        }
        7 => {
            let op = unop_from_u8(sr.read_u8()?)?;
            let val = read_expr(p, header, loop_ids, sr)?;
            Ok(p.push_expr(ExprKind::Unary { op, val }))
        }
        8 => {
            let width = sr.read_u32()?;
            let val = read_expr(p, header, loop_ids, sr)?;
            Ok(p.push_expr(ExprKind::Broadcast { val, width }))
        }
        9 => {
            let dest = ArgId(sr.read_u32()?);
            let n_indices = sr.read_u32()?;
            let mut indices = Vec::with_capacity(n_indices as usize);
            for _ in 0..n_indices {
                indices.push(read_expr(p, header, loop_ids, sr)?);
            }
            Ok(p.push_expr(ExprKind::Gep { dest, indices }))
        }
        other => Err(BistraError::BadTag(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::types::{ElemKind, TensorType};

    #[test]
    fn round_trips_simple_store_loop() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 8)]));
        let mut p = Program::new("axpy", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 8, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let bytes = serialize(&p);
        assert_eq!(&bytes[0..4], &MAGIC);
        let back = deserialize(&bytes).unwrap();

        assert_eq!(back.name, p.name);
        assert_eq!(back.args, p.args);
        assert_eq!(back.locals, p.locals);
        assert_eq!(back.num_stmts(), p.num_stmts());
        assert_eq!(back.num_exprs(), p.num_exprs());
        assert_eq!(back.body.len(), 1);
        crate::verify::verify(&back).unwrap();
    }

    #[test]
    fn rejects_bad_magic() {
        let bytes = vec![0u8, 1, 2, 3, 4, 5];
        match deserialize(&bytes) {
            Err(BistraError::BadMagic(_)) => {}
            other => panic!("expected BadMagic, got {:?}", other),
        }
    }

    #[test]
    fn id_table_dedups_by_value() {
        let mut t: IdTable<String> = IdTable::new();
        let a = t.get_id_for("x".to_string());
        let b = t.get_id_for("y".to_string());
        let c = t.get_id_for("x".to_string());
        assert_eq!(a, c);
        assert_ne!(a, b);
    }
}
