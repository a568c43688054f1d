//! Wires a loaded `Settings` into a running `AppContext` and mounts the
//! filesystem. Connecting to the backing store is a separate step from
//! building and running the thing that serves requests against it.

use std::sync::Arc;
use std::path::Path;

use tracing::info;

use crate::config::Settings;
use crate::context::AppContext;
use crate::engine;
use crate::fuse_adapter::OriginFs;
use crate::persistence::Store;
use crate::signer::{Ed25519Signer, Signer};

/// Opens the sqlite store and loads the configured signing key, the two
/// external collaborators spec.md §1 calls out (the SQL storage library and
/// the content-naming/signing library).
pub fn open_store_and_signer(settings: &Settings) -> anyhow::Result<(Store, Arc<dyn Signer>)> {
    let store = Store::open(&settings.store.database_path)?;
    let signer = Ed25519Signer::load(Path::new(&settings.signing.key_path))?;
    Ok((store, Arc::new(signer)))
}

/// Mounts `ctx`'s filesystem at its configured mount point and blocks until
/// the kernel unmounts it (spec.md §5: "the core has no internal timeouts").
/// Before mounting, runs the startup reclaim sweep spec.md §4.4 requires for
/// staging left behind by a crash: `.segtemp` records with no in-memory
/// lock protecting them are orphaned and must be discarded.
pub fn run(ctx: AppContext) -> anyhow::Result<()> {
    let reclaimed = engine::reclaim_orphaned_staging(&ctx)?;
    if reclaimed > 0 {
        info!(reclaimed, "discarded orphaned staging left by an unclean shutdown");
    }

    let mount_point = ctx.settings().fuse.mount_point.clone();
    let options = [
        fuser::MountOption::FSName("originfs".to_string()),
        fuser::MountOption::DefaultPermissions,
    ];

    info!(mount_point = %mount_point, "mounting");
    fuser::mount2(OriginFs::new(ctx), &mount_point, &options)?;
    Ok(())
}
