use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Settings;
use crate::engine::signing::SignPool;
use crate::persistence::Store;
use crate::signer::Signer;

/// Everything a dispatcher/namespace operation needs, held by the `fuser`
/// session for its lifetime (spec.md §5). Cloning is cheap: every field is
/// already `Arc`-backed or itself an `Arc`.
#[derive(Clone)]
pub struct AppContext {
    store: Arc<Store>,
    signer: Arc<dyn Signer>,
    settings: Arc<Settings>,
    path_locks: PathLocks,
    sign_pool: SignPool,
    /// Handle to the tokio runtime `cmd::serve` entered before mounting
    /// (spec.md §4.2: signing happens off the calling FUSE thread). Kept as
    /// a `Handle` rather than relying on task-local `Handle::current()`
    /// because `fuser`'s callback threads are not themselves tokio workers.
    runtime: tokio::runtime::Handle,
}

impl AppContext {
    pub fn new(
        store: Store,
        signer: Arc<dyn Signer>,
        settings: Settings,
        runtime: tokio::runtime::Handle,
    ) -> Self {
        Self {
            store: Arc::new(store),
            signer,
            settings: Arc::new(settings),
            path_locks: PathLocks::new(),
            sign_pool: SignPool::new(),
            runtime,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn signer(&self) -> &dyn Signer {
        self.signer.as_ref()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn path_locks(&self) -> &PathLocks {
        &self.path_locks
    }

    pub fn sign_pool(&self) -> &SignPool {
        &self.sign_pool
    }

    pub fn runtime(&self) -> &tokio::runtime::Handle {
        &self.runtime
    }
}

/// Per-path write serialization (spec.md §5's "Concurrency / Resource
/// Model"): writers to the same path are serialized against each other and
/// against that path's own promote/discard, while readers never block and
/// concurrent writers to different paths never contend. A coarse global
/// lock would satisfy the invariants too, but would serialize unrelated
/// files for no reason; a registry of per-path locks keeps contention
/// scoped to the path actually being written.
#[derive(Clone)]
pub struct PathLocks {
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl PathLocks {
    fn new() -> Self {
        Self { locks: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Returns the lock for `path`, creating it on first use. The registry
    /// itself is never pruned: a long-lived FUSE session sees a bounded
    /// number of distinct paths relative to its uptime, and removing an
    /// entry while another thread holds a clone of its `Arc` would be racy
    /// for no real memory benefit.
    pub fn get(&self, path: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks.entry(path.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}
