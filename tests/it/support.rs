use std::sync::Arc;
use std::time::Duration;

use originfs::config::{FuseSettings, Settings, SigningSettings, StoreSettings};
use originfs::context::AppContext;
use originfs::persistence::{file_segments, Store};
use originfs::signer::{Ed25519Signer, Signer};

/// Everything a test needs to drive the core directly: a temp sqlite
/// database, a generated signing key, and a tokio runtime for the
/// background signing pool (spec.md §4.2/§5) to run on.
pub struct Harness {
    pub ctx: AppContext,
    _runtime: tokio::runtime::Runtime,
    _tempdir: tempfile::TempDir,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_segment_size(4096)
    }

    pub fn with_segment_size(segment_size: u32) -> Self {
        let tempdir = tempfile::tempdir().expect("create tempdir");
        let database_path = tempdir.path().join("originfs.sqlite3");

        let settings = Settings {
            store: StoreSettings {
                database_path: database_path.to_str().unwrap().to_string(),
                segment_size,
            },
            fuse: FuseSettings {
                mount_point: tempdir.path().join("mnt").to_str().unwrap().to_string(),
                uid: 0,
                gid: 0,
            },
            signing: SigningSettings {
                global_prefix: "/originfs".to_string(),
                key_path: tempdir.path().join("originfs.key").to_str().unwrap().to_string(),
            },
        };

        let store = Store::open(&settings.store.database_path).expect("open store");
        let signer: Arc<dyn Signer> = Arc::new(Ed25519Signer::generate());
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("build runtime");

        let ctx = AppContext::new(store, signer, settings, runtime.handle().clone());

        Self { ctx, _runtime: runtime, _tempdir: tempdir }
    }

    /// Blocks until `(path, version)` has no unsigned segment left, or
    /// panics after a generous timeout. Lets tests assert on
    /// `signature_state` right after a release without racing the
    /// background `SignPool` (spec.md §4.2's "signing lag", B6).
    pub fn wait_for_signed(&self, path: &str, version: i64) {
        for _ in 0..500 {
            let unsigned = self
                .ctx
                .store()
                .with_conn(|conn| file_segments::has_unsigned(conn, path, version))
                .expect("query unsigned segments");
            if !unsigned {
                return;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        panic!("segments of {path}@{version} never finished signing");
    }
}
