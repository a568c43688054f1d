use crate::cmd::{async_runtime, ConfigArgs};
use crate::config;
use crate::context::AppContext;
use crate::startup;

#[derive(clap::Args, Debug)]
pub struct Args {
    #[clap(flatten)]
    config: ConfigArgs,
}

/// Mounts the filesystem and runs until the kernel unmounts it.
pub fn run(args: Args) -> anyhow::Result<()> {
    let settings = config::load_settings(args.config.config_path)?;
    settings.validate()?;

    let runtime = async_runtime()?;
    let (store, signer) = startup::open_store_and_signer(&settings)?;
    let ctx = AppContext::new(store, signer, settings, runtime.handle().clone());

    // Mounting blocks the calling thread until the kernel unmounts the
    // filesystem; the runtime stays alive the whole time so background
    // signing tasks (spec.md §4.2/§5) keep making progress.
    startup::run(ctx)
}
