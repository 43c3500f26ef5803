//! The transform library: each function takes a `&mut Program` (and,
//! usually, a target `StmtId`), checks its precondition, and either mutates
//! the IR in place and returns the new/changed node(s), or leaves the IR
//! untouched and reports why it couldn't apply.

pub mod distribute;
pub mod hoist;
pub mod licm;
pub mod peel;
pub mod pragma;
pub mod simplify;
pub mod split;
pub mod tile;
pub mod unroll;
pub mod vectorize;
pub mod widen;
