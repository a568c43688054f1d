//! Provisions a new store: creates the sqlite schema (idempotent — see
//! `persistence::schema`) and, if none exists yet, a fresh Ed25519 signing
//! key (spec.md §6's "signing key identifier" configuration collaborator).
//! Safe to re-run against an already-provisioned store.

use std::path::Path;

use tracing::info;

use crate::cmd::ConfigArgs;
use crate::config;
use crate::persistence::Store;
use crate::signer::Ed25519Signer;

#[derive(clap::Args, Debug)]
pub struct Args {
    #[clap(flatten)]
    config: ConfigArgs,
}

pub fn run(args: Args) -> anyhow::Result<()> {
    let settings = config::load_settings(args.config.config_path)?;
    settings.validate()?;

    Store::open(&settings.store.database_path)?;
    info!(path = %settings.store.database_path, "schema ready");

    let key_path = Path::new(&settings.signing.key_path);
    if key_path.exists() {
        info!(path = %key_path.display(), "signing key already present, leaving it untouched");
    } else {
        Ed25519Signer::generate().write_seed(key_path)?;
        info!(path = %key_path.display(), "generated signing key");
    }

    Ok(())
}
