//! Background segment signing (spec.md §4.2 / §5): a small worker pool that
//! signs every unsigned segment of a freshly-promoted version off the
//! thread that promoted it, so a write's `release` never blocks on
//! cryptography. A newer promotion of the same path cancels its
//! predecessor's in-flight signing task — `file_system::mark_ready_if_current`
//! already refuses to flip `ready_signed` for a superseded version, but
//! there is no reason to keep paying for signing work nobody will observe.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::{instrument, warn};

use crate::context::AppContext;
use crate::persistence::file_segments;

use super::sign_and_store_segment;

#[derive(Clone, Default)]
pub struct SignPool {
    inflight: Arc<Mutex<HashMap<String, JoinHandle<()>>>>,
}

impl SignPool {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Spawns a task on `ctx`'s runtime that signs every unsigned segment of
/// `(path, version)`, aborting any still-running signing task this pool
/// already holds for `path`.
#[instrument(skip(ctx), fields(path = %path, version))]
pub fn spawn_signing_for_version(ctx: &AppContext, path: String, version: i64) {
    let task_ctx = ctx.clone();
    let task_path = path.clone();
    let handle = ctx.runtime().spawn(async move {
        let segments = match task_ctx
            .store()
            .with_conn(|conn| file_segments::fetch_all_for_version(conn, &task_path, version))
        {
            Ok(segments) => segments,
            Err(err) => {
                warn!(error = ?err, path = %task_path, version, "failed to list segments for signing");
                return;
            }
        };

        for segment in segments {
            if segment.is_signed() {
                continue;
            }
            if let Err(err) = sign_and_store_segment(&task_ctx, &task_path, version, segment.segment) {
                warn!(error = ?err, path = %task_path, version, segment = segment.segment, "failed to sign segment");
            }
        }
    });

    let mut inflight = ctx.sign_pool().inflight.lock();
    if let Some(previous) = inflight.insert(path, handle) {
        previous.abort();
    }
}
