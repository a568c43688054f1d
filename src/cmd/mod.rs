use std::path::PathBuf;

use tokio::runtime::Runtime;

pub mod reclaim_staging;
pub mod serve;
pub mod setup;

/// Top-level CLI surface (spec.md §6's configuration collaborator plus the
/// operational entry points SPEC_FULL.md's ambient CLI layer adds).
#[derive(clap::Args, Debug)]
pub struct OriginFsArgs {
    #[clap(subcommand)]
    pub cmd: Cmd,
}

#[derive(Debug, clap::Subcommand)]
pub enum Cmd {
    /// Mounts the filesystem and runs until it is unmounted.
    Serve(serve::Args),
    /// Creates the sqlite schema and a signing key for a new store.
    Setup(setup::Args),
    /// Discards staging segments left behind by an unclean shutdown,
    /// without mounting the filesystem.
    ReclaimStaging(reclaim_staging::Args),
}

pub fn run(args: OriginFsArgs) -> anyhow::Result<()> {
    match args.cmd {
        Cmd::Serve(args) => serve::run(args),
        Cmd::Setup(args) => setup::run(args),
        Cmd::ReclaimStaging(args) => reclaim_staging::run(args),
    }
}

#[derive(clap::Args, Debug)]
pub struct ConfigArgs {
    /// Load the application configuration from the supplied directory
    /// instead of the default `./config`.
    #[clap(short, long = "config")]
    config_path: Option<PathBuf>,
}

fn async_runtime() -> std::io::Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
}
