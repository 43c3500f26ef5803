//! A **Pass** is a node in a linear chain. Each intermediate pass either
//! forwards its program unchanged to the next pass (a pure filter, like
//! `Promoter`) or clones the program once per candidate choice and forwards
//! each clone in turn (like `Vectorizer`/`Tiler`/`Widener`). The terminal
//! pass in the chain is always an `Evaluator`, which has no `next` — it
//! times the program and reports the result back up instead of forwarding.

use crate::driver::optimizer::TuneCtx;
use crate::errors::BistraResult;
use crate::ir::Program;

/// `cont` is the rest of the chain; a pass calls it once per variant it
/// produces. A pure filter pass calls it exactly once, with the program
/// unchanged (or changed in place, e.g. `Promoter`'s LICM pass).
pub trait Pass {
    fn run(&self, program: Program, ctx: &mut TuneCtx, cont: &mut dyn FnMut(Program, &mut TuneCtx) -> BistraResult<()>) -> BistraResult<()>;
}

/// Runs `program` through `chain[0..]` in order, terminating at `terminal`
/// once every intermediate pass has had its turn.
pub fn run_chain(chain: &[Box<dyn Pass>], terminal: &dyn Pass, program: Program, ctx: &mut TuneCtx) -> BistraResult<()> {
    run_from(chain, 0, terminal, program, ctx)
}

fn run_from(chain: &[Box<dyn Pass>], idx: usize, terminal: &dyn Pass, program: Program, ctx: &mut TuneCtx) -> BistraResult<()> {
    if idx == chain.len() {
        return terminal.run(program, ctx, &mut |_p, _ctx| Ok(()));
    }
    chain[idx].run(program, ctx, &mut |variant, ctx| run_from(chain, idx + 1, terminal, variant, ctx))
}
