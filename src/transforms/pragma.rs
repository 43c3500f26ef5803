//! `applyPragma({kind, param, loop-name})`. Dispatches a parsed pragma
//! command to the matching transform. Reports failure if the named loop
//! does not exist or the transform's precondition fails — pragmas never
//! partially apply.

use crate::errors::{BistraError, BistraResult};
use crate::ir::Program;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PragmaKind {
    Vectorize,
    Unroll,
    Widen,
    Tile,
    Peel,
    Hoist,
}

#[derive(Debug, Clone)]
pub struct Pragma {
    pub kind: PragmaKind,
    pub param: u64,
    pub loop_name: String,
}

/// Applies one pragma command, in the order it appears in source. Returns
/// `Ok(())` on success; an `Err` carries the reason the pragma could not be
/// honored (unknown loop name, or the underlying transform's own failure).
pub fn apply_pragma(p: &mut Program, pragma: &Pragma) -> BistraResult<()> {
    let loop_id = p.find_loop(&pragma.loop_name).ok_or_else(|| BistraError::UnknownLoop(pragma.loop_name.clone()))?;
    match pragma.kind {
        PragmaKind::Vectorize => {
            let vf: u32 = pragma.param.try_into().map_err(|_| BistraError::PreconditionFailed("vectorize factor out of range"))?;
            let ok = crate::transforms::vectorize::vectorize(p, loop_id, vf)?;
            if !ok {
                return Err(BistraError::PreconditionFailed("vectorize precondition failed"));
            }
        }
        PragmaKind::Unroll => {
            crate::transforms::unroll::unroll(p, loop_id, pragma.param)?;
        }
        PragmaKind::Widen => {
            crate::transforms::widen::widen(p, loop_id, pragma.param)?;
        }
        PragmaKind::Tile => {
            crate::transforms::tile::tile(p, loop_id, pragma.param)?;
        }
        PragmaKind::Peel => {
            crate::transforms::peel::peel(p, loop_id, pragma.param)?;
        }
        PragmaKind::Hoist => {
            let levels: u32 = pragma.param.try_into().map_err(|_| BistraError::PreconditionFailed("hoist level out of range"))?;
            crate::transforms::hoist::hoist(p, loop_id, levels)?;
        }
    }
    Ok(())
}

pub fn apply_all(p: &mut Program, pragmas: &[Pragma]) -> BistraResult<()> {
    for pragma in pragmas {
        apply_pragma(p, pragma)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;

    #[test]
    fn unknown_loop_name_rejected() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let _ = mk_loop(&mut p, "i", 16, 1).unwrap();
        let pragma = Pragma { kind: PragmaKind::Tile, param: 4, loop_name: "nope".into() };
        assert!(apply_pragma(&mut p, &pragma).is_err());
    }

    #[test]
    fn tile_pragma_dispatches() {
        let mut p = Program::new("k", Vec::new(), Vec::new());
        let _ = mk_loop(&mut p, "i", 16, 1).unwrap();
        let pragma = Pragma { kind: PragmaKind::Tile, param: 4, loop_name: "i".into() };
        assert!(apply_pragma(&mut p, &pragma).is_ok());
    }
}
