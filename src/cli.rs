use std::path::PathBuf;

use structopt::StructOpt;

/// `bistrac [--time|-T] [--tune|-t] [--opt|-O3] [--out|-o PATH] FILE`.
///
/// `FILE` is a bytecode-serialized program (`crate::bytecode`); this binary
/// has no DSL lexer/parser of its own, so a `.bc` file produced by an
/// external front-end is the only input it reads.
#[derive(StructOpt, Debug)]
#[structopt(raw(setting = "structopt::clap::AppSettings::ColoredHelp"))]
#[structopt(name = "bistrac", about = "Autotuning compiler middle-end for dense tensor loop nests", author = "ammkrn <ammkrn@tuta.io>", version = "0.1.0")]
pub struct Opt {
    /// Print the roofline cost estimate of the (possibly tuned) program
    /// before exiting.
    #[structopt(short = "T", long = "time")]
    pub time: bool,

    /// Run the autotuning search (the canonical pass chain) and keep the
    /// fastest variant found instead of the input program as-is.
    #[structopt(short = "t", long = "tune")]
    pub tune: bool,

    /// Shorthand for `--tune` with the canonical `TuneConfig::default()`
    /// search space, named after the familiar `-O3` compiler convention.
    #[structopt(short = "O", long = "opt")]
    pub opt: bool,

    /// Where to write the (possibly tuned) program's bytecode. Defaults to
    /// overwriting `FILE` in place.
    #[structopt(short = "o", long = "out", parse(from_os_str))]
    pub out: Option<PathBuf>,

    #[structopt(name = "FILE", parse(from_os_str))]
    pub file: PathBuf,
}

impl Opt {
    pub fn read_input(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(&self.file)
    }

    pub fn output_path(&self) -> PathBuf {
        self.out.clone().unwrap_or_else(|| self.file.clone())
    }

    /// Either flag asks for the search to run; `--opt` is just `--tune`
    /// with the driver's default knobs rather than a distinct mode.
    pub fn wants_tuning(&self) -> bool {
        self.tune || self.opt
    }
}
