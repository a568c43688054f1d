//! The file operation dispatcher (spec.md §4.4): the per-handle state
//! machine (`IDLE` → `STAGING` → `PROMOTING` → `READY`) that turns the
//! `fuse_adapter`'s `open`/`read`/`write`/`truncate`/`release` calls into
//! the engine's staging protocol. A write session never promotes until
//! `release`; every write before that only ever touches the path's staging
//! namespace.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::instrument;

use crate::context::AppContext;
use crate::engine;
use crate::error::{CoreError, CoreResult};
use crate::models::FileType;

/// Bits `open`'s `flags` argument carries that this dispatcher cares about,
/// mirrored from `libc` rather than depending on `fuser`'s own (unstable)
/// flag re-exports.
const O_TRUNC: i32 = libc::O_TRUNC;

struct OpenFile {
    path: String,
    /// Highest byte offset any write in this session has touched, seeded
    /// from the file's size at `open` time — the size the eventual
    /// `promote_staging` call will record if anything was written.
    staged_size: u64,
    dirty: bool,
}

/// Dispatches FUSE-level file operations against a path's engine state.
/// Owns the open-file-handle table; everything else is borrowed from
/// `AppContext`.
pub struct Dispatcher {
    ctx: AppContext,
    handles: Mutex<HashMap<u64, OpenFile>>,
    next_fh: AtomicU64,
}

impl Dispatcher {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }

    pub fn context(&self) -> &AppContext {
        &self.ctx
    }

    /// Opens `path` for I/O, returning a file handle. `O_TRUNC` is honored
    /// immediately — it promotes a new, empty version before the handle is
    /// ever returned — rather than being deferred to the session's
    /// eventual `release` (spec.md §4.4).
    #[instrument(skip(self))]
    pub fn open(&self, path: &str, flags: i32) -> CoreResult<u64> {
        let record = crate::namespace::getattr(&self.ctx, path)?;
        if record.file_type == FileType::Directory {
            return Err(CoreError::Invalid(format!("{path} is a directory")));
        }

        let staged_size = if flags & O_TRUNC != 0 && record.size > 0 {
            engine::truncate_to_length(&self.ctx, &record, 0)?;
            0
        } else {
            record.size
        };

        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        self.handles.lock().insert(
            fh,
            OpenFile {
                path: path.to_string(),
                staged_size,
                dirty: false,
            },
        );
        Ok(fh)
    }

    /// Reads from the path's current, last-promoted version (spec.md §4.4
    /// / §5: reads never observe an in-flight write).
    #[instrument(skip(self))]
    pub fn read(&self, fh: u64, offset: u64, size: u32) -> CoreResult<Vec<u8>> {
        let path = self.path_for(fh)?;
        let record = crate::namespace::getattr(&self.ctx, &path)?;
        engine::read_segment_range(&self.ctx, &record, offset, size)
    }

    /// Stages `data` at `offset` for `fh`'s path, without promoting it
    /// (spec.md §4.4's `STAGING` state).
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub fn write(&self, fh: u64, offset: u64, data: &[u8]) -> CoreResult<u32> {
        let path = self.path_for(fh)?;
        let record = crate::namespace::getattr(&self.ctx, &path)?;

        let guard = self.ctx.path_locks().get(&path);
        let _guard = guard.lock();
        engine::stage_write(&self.ctx, &record, offset, data)?;

        let mut handles = self.handles.lock();
        if let Some(open_file) = handles.get_mut(&fh) {
            open_file.dirty = true;
            open_file.staged_size = open_file.staged_size.max(offset + data.len() as u64);
        }
        Ok(data.len() as u32)
    }

    /// Directly truncates `path` to `length`, independent of any open
    /// handle (spec.md §4.4's `setattr`-driven truncate): unlike a write
    /// session, this promotes immediately.
    #[instrument(skip(self))]
    pub fn truncate(&self, path: &str, length: u64) -> CoreResult<()> {
        let record = crate::namespace::getattr(&self.ctx, path)?;
        let guard = self.ctx.path_locks().get(path);
        let _guard = guard.lock();
        engine::truncate_to_length(&self.ctx, &record, length)?;
        Ok(())
    }

    /// Closes `fh`. If the session ever wrote, the path's staging namespace
    /// is promoted into a new version (spec.md §4.4's `PROMOTING` →
    /// `READY` transition); if it never wrote, there is no staging to
    /// discard, since `stage_write` never ran.
    #[instrument(skip(self))]
    pub fn release(&self, fh: u64) -> CoreResult<()> {
        let open_file = self.handles.lock().remove(&fh).ok_or(CoreError::Invalid(format!("unknown file handle {fh}")))?;

        if !open_file.dirty {
            return Ok(());
        }

        let record = crate::namespace::getattr(&self.ctx, &open_file.path)?;
        let guard = self.ctx.path_locks().get(&open_file.path);
        let _guard = guard.lock();
        engine::promote_staging(&self.ctx, &record, open_file.staged_size)?;
        Ok(())
    }

    fn path_for(&self, fh: u64) -> CoreResult<String> {
        self.handles
            .lock()
            .get(&fh)
            .map(|open_file| open_file.path.clone())
            .ok_or(CoreError::Invalid(format!("unknown file handle {fh}")))
    }
}
