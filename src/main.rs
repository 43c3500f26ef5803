#![forbid(unsafe_code)]

use structopt::StructOpt;

use crate::analyses::cost::estimate_program;
use crate::backend::InterpBackend;
use crate::cli::Opt;
use crate::driver::{tune, TuneConfig};

pub mod analyses;
pub mod backend;
pub mod bytecode;
pub mod cli;
pub mod clone;
pub mod driver;
pub mod emit;
pub mod errors;
pub mod ir;
pub mod transforms;
pub mod types;
pub mod verify;
pub mod visit;

fn main() {
    env_logger::init();
    let opt = Opt::from_args();

    if let Err(e) = run(&opt) {
        eprintln!("bistrac: {}", e);
        std::process::exit(1);
    }
}

fn run(opt: &Opt) -> Result<(), String> {
    let bytes = opt.read_input().map_err(|e| format!("reading {:?}: {}", opt.file, e))?;
    let mut program = bytecode::deserialize(&bytes).map_err(|e| e.to_string())?;
    verify::verify(&program).map_err(|e| e.to_string())?;

    if opt.wants_tuning() {
        let config = TuneConfig::default();
        let backend = Box::new(InterpBackend);
        match tune(program.clone(), config, backend).map_err(|e| e.to_string())? {
            Some((best, elapsed)) => {
                log::info!("autotuning selected a variant timed at {:?}", elapsed);
                program = best;
            }
            None => {
                log::info!("autotuning found no variant the backend could time; keeping input program");
            }
        }
        verify::verify(&program).map_err(|e| e.to_string())?;
    }

    if opt.time {
        let cost = estimate_program(&program);
        println!("estimated cost: {}", cost.format());
    }

    let out_bytes = bytecode::serialize(&program);
    std::fs::write(opt.output_path(), out_bytes).map_err(|e| format!("writing output: {}", e))?;

    Ok(())
}
