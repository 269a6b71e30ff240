use std::path::PathBuf;

use topo_solver::OptimizerBackend;

#[derive(Clone, Debug, clap::Parser)]
pub struct Args {
    /// Run configuration (TOML). Defaults are used for everything missing.
    pub config: Option<PathBuf>,

    /// Overrides the output directory.
    #[clap(short, long)]
    pub output: Option<PathBuf>,

    #[clap(long)]
    pub optimizer: Option<OptimizerBackend>,

    /// Overrides the number of anneal stages.
    #[clap(long)]
    pub stages: Option<usize>,

    /// Overrides the evaluation budget per stage.
    #[clap(long)]
    pub evaluations: Option<usize>,

    /// Don't write design snapshots during the run.
    #[clap(long)]
    pub no_snapshots: bool,
}
