//! Standalone operational entry point for spec.md §4.4's startup reclaim
//! sweep: lets an operator discard orphaned `.segtemp` staging left behind
//! by an unclean shutdown without bringing the mount back up first.

use tracing::info;

use crate::cmd::{async_runtime, ConfigArgs};
use crate::config;
use crate::context::AppContext;
use crate::engine;
use crate::startup;

#[derive(clap::Args, Debug)]
pub struct Args {
    #[clap(flatten)]
    config: ConfigArgs,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let settings = config::load_settings(args.config.config_path)?;
    settings.validate()?;

    let runtime = async_runtime()?;
    let (store, signer) = startup::open_store_and_signer(&settings)?;
    let ctx = AppContext::new(store, signer, settings, runtime.handle().clone());

    let reclaimed = engine::reclaim_orphaned_staging(&ctx)?;
    info!(reclaimed, "discarded orphaned staging segments");
    Ok(())
}
