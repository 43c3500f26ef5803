//! Test doubles standing in for a real code generator, so the optimizer
//! driver's terminal `Evaluator` pass (emit, then timed run for N
//! iterations) is exercisable without one. A back-end failure surfaces as a
//! missing timing result, which the driver treats as "discard this
//! variant" rather than a hard error.

use crate::analyses::cost::estimate_program;
use crate::errors::BistraResult;
use crate::ir::Program;
use std::time::Duration;

/// What the driver needs from a back-end: compile a program, then run the
/// compiled artifact for a fixed iteration count and report how long it
/// took. Returns `None` rather than erroring when the run simply couldn't
/// be timed (the back-end failure case in the error taxonomy).
pub trait Backend {
    fn compile_and_time(&self, program: &Program, iterations: u32) -> BistraResult<Option<Duration>>;
}

/// Always reports a fixed zero-cost duration. Useful for exercising driver
/// plumbing (pass chaining, best-tracking) without caring about relative
/// variant quality.
#[derive(Debug, Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn compile_and_time(&self, _program: &Program, _iterations: u32) -> BistraResult<Option<Duration>> {
        Ok(Some(Duration::from_nanos(0)))
    }
}

/// Derives a deterministic, reproducible "timing" from the static roofline
/// cost estimate rather than actually running anything — enough for the
/// autotuning driver's variant comparisons to behave the way a real
/// back-end's relative timings would (smaller cost wins), without needing
/// native codegen.
#[derive(Debug, Default)]
pub struct InterpBackend;

impl Backend for InterpBackend {
    fn compile_and_time(&self, program: &Program, iterations: u32) -> BistraResult<Option<Duration>> {
        let cost = estimate_program(program);
        let per_iter_ns = cost.mem_ops.saturating_mul(4) + cost.arith_ops.saturating_mul(1);
        let total_ns = per_iter_ns.saturating_mul(iterations as u64);
        Ok(Some(Duration::from_nanos(total_ns)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::builder::*;
    use crate::ir::ArgId;
    use crate::types::{Argument, ElemKind, TensorType};

    #[test]
    fn interp_backend_orders_cheaper_program_faster() {
        let arg = Argument::new("A", TensorType::new(ElemKind::F32, vec![("N".into(), 8)]));
        let mut cheap = Program::new("k", vec![arg.clone()], Vec::new());
        let l = mk_loop(&mut cheap, "i", 8, 1).unwrap();
        let idx = mk_index(&mut cheap, l).unwrap();
        let val = mk_constant_fp(&mut cheap, 1.0);
        let st = mk_store(&mut cheap, ArgId(0), vec![idx], val, false).unwrap();
        cheap.append_stmt(Some(l), st);
        cheap.append_stmt(None, l);

        let mut costly = Program::new("k", vec![arg], Vec::new());
        let l2 = mk_loop(&mut costly, "i", 8, 1).unwrap();
        let idx2 = mk_index(&mut costly, l2).unwrap();
        let val2 = mk_constant_fp(&mut costly, 1.0);
        let st2 = mk_store(&mut costly, ArgId(0), vec![idx2], val2, true).unwrap();
        costly.append_stmt(Some(l2), st2);
        costly.append_stmt(None, l2);

        let backend = InterpBackend;
        let t_cheap = backend.compile_and_time(&cheap, 1).unwrap().unwrap();
        let t_costly = backend.compile_and_time(&costly, 1).unwrap().unwrap();
        assert!(t_cheap <= t_costly);
    }
}
