//! The canonical autotuning pass chain: `Vectorizer -> Tiler -> Tiler ->
//! Widener -> Widener -> Promoter -> Evaluator`. Each of `Vectorizer`,
//! `Tiler`, `Widener` enumerates every loop in the program crossed with a
//! fixed set of candidate parameters, forwarding one cloned variant per
//! combination that satisfies the transform's precondition, plus the
//! unmodified program itself (so "don't apply this transform here" is
//! always a reachable path through the search tree). `Promoter` is a pure
//! filter: it runs loop-invariant code motion to a fixed point and forwards
//! exactly once. `Evaluator`, the terminal pass, asks the backend to time
//! the variant and keeps the fastest one seen so far.

use crate::analyses::collect::all_loops;
use crate::backend::Backend;
use crate::bytecode;
use crate::clone::clone_program;
use crate::driver::pass::Pass;
use crate::errors::BistraResult;
use crate::ir::Program;
use crate::transforms::{licm, tile, vectorize, widen};
use hashbrown::HashSet;
use log::debug;
use std::time::Duration;

/// The candidate parameter sets the driver searches. `Default` gives the
/// canonical values named in the tuning surface.
#[derive(Debug, Clone)]
pub struct TuneConfig {
    pub vf_candidates: Vec<u32>,
    pub tile_sizes: Vec<u64>,
    pub widen_factors: Vec<u64>,
    /// How many times the evaluator's backend runs the compiled artifact,
    /// for timing stability.
    pub iterations: u32,
}

impl Default for TuneConfig {
    fn default() -> Self {
        TuneConfig {
            vf_candidates: vec![4, 8],
            tile_sizes: vec![16, 32, 56, 64, 128],
            widen_factors: vec![2, 3, 4, 5, 6],
            iterations: 32,
        }
    }
}

/// Threaded down the whole chain: the search config, the backend used to
/// time variants, and the best variant found so far.
pub struct TuneCtx {
    pub config: TuneConfig,
    pub backend: Box<dyn Backend>,
    pub best: Option<(Program, Duration)>,
    variants_tried: u64,
    seen: HashSet<u64>,
}

impl TuneCtx {
    pub fn new(config: TuneConfig, backend: Box<dyn Backend>) -> Self {
        TuneCtx { config, backend, best: None, variants_tried: 0, seen: HashSet::new() }
    }

    fn consider(&mut self, program: &Program, elapsed: Duration) {
        self.variants_tried += 1;
        let better = match &self.best {
            None => true,
            Some((_, best_elapsed)) => elapsed < *best_elapsed,
        };
        if better {
            debug!("new best variant: {:?} ({} tried so far)", elapsed, self.variants_tried);
            self.best = Some((clone_program(program), elapsed));
        }
    }

    /// `true` the first time this exact variant (by serialized bytecode
    /// content) is seen, `false` on every repeat. Several (loop, parameter)
    /// combinations often rewrite a program into the same shape — e.g. two
    /// tile sizes that both evenly divide a small loop's extent — and
    /// there's no point handing the rest of the chain (let alone the
    /// backend) the same variant twice.
    fn is_fresh(&mut self, program: &Program) -> bool {
        let hash = fxhash::hash64(&bytecode::serialize(program));
        self.seen.insert(hash)
    }
}

pub struct Vectorizer;

impl Pass for Vectorizer {
    fn run(&self, program: Program, ctx: &mut TuneCtx, cont: &mut dyn FnMut(Program, &mut TuneCtx) -> BistraResult<()>) -> BistraResult<()> {
        let loops = all_loops(&program);
        let vfs = ctx.config.vf_candidates.clone();
        for loop_id in &loops {
            for vf in &vfs {
                let mut variant = clone_program(&program);
                if vectorize::vectorize(&mut variant, *loop_id, *vf).unwrap_or(false) && ctx.is_fresh(&variant) {
                    cont(variant, ctx)?;
                }
            }
        }
        cont(program, ctx)
    }
}

pub struct Tiler;

impl Pass for Tiler {
    fn run(&self, program: Program, ctx: &mut TuneCtx, cont: &mut dyn FnMut(Program, &mut TuneCtx) -> BistraResult<()>) -> BistraResult<()> {
        let loops = all_loops(&program);
        let sizes = ctx.config.tile_sizes.clone();
        for loop_id in &loops {
            for block_size in &sizes {
                let mut variant = clone_program(&program);
                if tile::tile(&mut variant, *loop_id, *block_size).is_ok() && ctx.is_fresh(&variant) {
                    cont(variant, ctx)?;
                }
            }
        }
        cont(program, ctx)
    }
}

pub struct Widener;

impl Pass for Widener {
    fn run(&self, program: Program, ctx: &mut TuneCtx, cont: &mut dyn FnMut(Program, &mut TuneCtx) -> BistraResult<()>) -> BistraResult<()> {
        let loops = all_loops(&program);
        let factors = ctx.config.widen_factors.clone();
        for loop_id in &loops {
            for w in &factors {
                let mut variant = clone_program(&program);
                if widen::widen(&mut variant, *loop_id, *w).is_ok() && ctx.is_fresh(&variant) {
                    cont(variant, ctx)?;
                }
            }
        }
        cont(program, ctx)
    }
}

/// Promotes every eligible accumulator to the stack once, then forwards —
/// never branches the search, since LICM is always a profitable rewrite
/// when its precondition holds.
pub struct Promoter;

impl Pass for Promoter {
    fn run(&self, mut program: Program, ctx: &mut TuneCtx, cont: &mut dyn FnMut(Program, &mut TuneCtx) -> BistraResult<()>) -> BistraResult<()> {
        let n = licm::promote_licm(&mut program);
        debug!("promoter: hoisted {} accumulator(s)", n);
        cont(program, ctx)
    }
}

/// Terminal pass: compiles and times the variant, keeping it if it beats
/// the best seen so far. A backend failure (`Ok(None)`) just drops the
/// variant rather than aborting the search.
pub struct Evaluator;

impl Pass for Evaluator {
    fn run(&self, program: Program, ctx: &mut TuneCtx, _cont: &mut dyn FnMut(Program, &mut TuneCtx) -> BistraResult<()>) -> BistraResult<()> {
        let iterations = ctx.config.iterations;
        if let Some(elapsed) = ctx.backend.compile_and_time(&program, iterations)? {
            ctx.consider(&program, elapsed);
        }
        Ok(())
    }
}

/// Builds the canonical chain and runs the full search, returning the
/// fastest variant found (and how long it took), or `None` if every
/// variant's backend run failed.
pub fn tune(program: Program, config: TuneConfig, backend: Box<dyn Backend>) -> BistraResult<Option<(Program, Duration)>> {
    let chain: Vec<Box<dyn Pass>> = vec![
        Box::new(Vectorizer),
        Box::new(Tiler),
        Box::new(Tiler),
        Box::new(Widener),
        Box::new(Widener),
        Box::new(Promoter),
    ];
    let mut ctx = TuneCtx::new(config, backend);
    crate::driver::pass::run_chain(&chain, &Evaluator, program, &mut ctx)?;
    Ok(ctx.best)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::NullBackend;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn tune_finds_some_variant_with_null_backend() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 8)]));
        let mut p = Program::new("k", vec![arg], Vec::new());
        let l = mk_loop(&mut p, "i", 8, 1).unwrap();
        let idx = mk_index(&mut p, l).unwrap();
        let val = mk_constant_fp(&mut p, 1.0);
        let st = mk_store(&mut p, ArgId(0), vec![idx], val, false).unwrap();
        p.append_stmt(Some(l), st);
        p.append_stmt(None, l);

        let mut config = TuneConfig::default();
        config.tile_sizes = vec![];
        config.widen_factors = vec![];
        config.vf_candidates = vec![];
        let result = tune(p, config, Box::new(NullBackend)).unwrap();
        assert!(result.is_some());
    }
}
