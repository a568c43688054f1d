//! The namespace manager (spec.md §4.3): directory-tree operations over
//! `file_system`, layered on top of the engine's segment-level primitives.
//! Every mutating operation here runs inside a single `Store::with_txn` so
//! a crash never leaves the tree half-renamed or half-deleted.

pub mod mime;

use tracing::instrument;

use crate::context::AppContext;
use crate::engine;
use crate::error::{CoreError, CoreResult};
use crate::models::{FileRecord, FileType, SignatureState};
use crate::persistence::{file_segments, file_system, file_versions};

/// The root's own synthetic level (spec.md GLOSSARY's "Level": number of
/// path separators from the root).
const ROOT_LEVEL: i32 = 0;

fn level_of(path: &str) -> i32 {
    if path == "/" {
        return ROOT_LEVEL;
    }
    path.matches('/').count() as i32
}

fn parent_of(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "/",
    }
}

fn join(parent: &str, name: &str) -> String {
    if parent == "/" {
        format!("/{name}")
    } else {
        format!("{parent}/{name}")
    }
}

fn require_directory(record: &FileRecord) -> CoreResult<()> {
    if record.file_type != FileType::Directory {
        return Err(CoreError::Invalid(format!("{} is not a directory", record.path)));
    }
    Ok(())
}

fn fetch(ctx: &AppContext, path: &str) -> CoreResult<FileRecord> {
    ctx.store()
        .with_conn(|conn| file_system::fetch(conn, path))?
        .ok_or(CoreError::NotFound)
}

/// Creates a directory under `parent_path` (spec.md §4.3's `mkdir`).
#[instrument(skip(ctx))]
pub fn mkdir(ctx: &AppContext, parent_path: &str, name: &str, mode: u32) -> CoreResult<FileRecord> {
    let child_path = join(parent_path, name);
    if crate::persistence::rejects_staging_collision(&child_path) {
        return Err(CoreError::Invalid(format!("{child_path} ends with the reserved staging suffix")));
    }

    let parent = fetch(ctx, parent_path)?;
    require_directory(&parent)?;

    ctx.store().with_txn(|txn| {
        if file_system::fetch(txn, &child_path)?.is_some() {
            return Err(CoreError::Collision);
        }
        let record = FileRecord {
            path: child_path.clone(),
            file_type: FileType::Directory,
            mode: mode & 0o7777,
            current_version: 0,
            atime: chrono::Utc::now().timestamp(),
            size: 0,
            nlink: 2,
            mime_type: String::new(),
            signature_state: SignatureState::Ready,
            level: parent.level + 1,
        };
        file_system::insert(txn, &record)?;
        file_versions::insert(txn, &child_path, 0)?;
        Ok(record)
    })
}

/// Removes a directory and its whole subtree in one prefix match (spec.md
/// §4.3's `rmdir`): every FileRecord/VersionRecord/SegmentRecord whose path
/// is prefixed by `path + "/"`, then `path` itself. There is deliberately no
/// non-empty check — the kernel bridge is expected to issue per-entry
/// `unlink`/`rmdir` first, and spec.md §4.3 calls this out explicitly
/// ("does not recurse in code — a single prefix match does the work").
#[instrument(skip(ctx))]
pub fn rmdir(ctx: &AppContext, path: &str) -> CoreResult<()> {
    let record = fetch(ctx, path)?;
    require_directory(&record)?;
    if path == "/" {
        return Err(CoreError::Invalid("cannot rmdir the root".to_string()));
    }

    ctx.store().with_txn(|txn| {
        file_system::delete_subtree(txn, path)?;
        file_versions::delete_subtree(txn, path)?;
        file_segments::delete_subtree(txn, path)?;

        file_system::delete(txn, path)?;
        file_versions::delete(txn, path)?;
        file_segments::delete_for_path(txn, path)?;
        Ok(())
    })
}

/// Lists the direct children of a directory (spec.md §4.3's `readdir`).
/// Matches spec.md §8's boundary scenario B4 exactly: `readdir` of a path
/// that exists but isn't a directory fails `NotFound`, not `Invalid` — the
/// distinction other directory-requiring operations in this module draw
/// with `require_directory`.
#[instrument(skip(ctx))]
pub fn readdir(ctx: &AppContext, path: &str) -> CoreResult<Vec<FileRecord>> {
    let record = fetch(ctx, path)?;
    if record.file_type != FileType::Directory {
        return Err(CoreError::NotFound);
    }
    Ok(ctx.store().with_conn(|conn| file_system::list_children(conn, path, record.level))?)
}

/// Creates a new, empty file entry under `parent_path` (spec.md §4.3's
/// `mknod`). Symbolic links are rejected here: `fuse_adapter::symlink` is
/// the real entry point for them, and this crate doesn't implement it
/// (spec.md §9's resolved Open Question).
#[instrument(skip(ctx))]
pub fn mknod(ctx: &AppContext, parent_path: &str, name: &str, mode: u32) -> CoreResult<FileRecord> {
    let child_path = join(parent_path, name);
    if crate::persistence::rejects_staging_collision(&child_path) {
        return Err(CoreError::Invalid(format!("{child_path} ends with the reserved staging suffix")));
    }

    let file_type = FileType::from_mode_bits(mode);
    if file_type == FileType::SymbolicLink {
        return Err(CoreError::Unsupported);
    }

    let parent = fetch(ctx, parent_path)?;
    require_directory(&parent)?;

    let initial_version = chrono::Utc::now().timestamp();
    ctx.store().with_txn(|txn| {
        if file_system::fetch(txn, &child_path)?.is_some() {
            return Err(CoreError::Collision);
        }
        let record = FileRecord {
            path: child_path.clone(),
            file_type,
            mode: mode & 0o7777,
            current_version: initial_version,
            atime: chrono::Utc::now().timestamp(),
            size: 0,
            nlink: 1,
            mime_type: mime::guess(&child_path),
            // No segments exist yet, so the "every segment signed" condition
            // holds vacuously.
            signature_state: SignatureState::Ready,
            level: parent.level + 1,
        };
        file_system::insert(txn, &record)?;
        file_versions::insert(txn, &child_path, initial_version)?;
        Ok(record)
    })
}

/// Removes a non-directory entry and every version/segment ever recorded
/// for it (spec.md §4.3's `unlink`).
#[instrument(skip(ctx))]
pub fn unlink(ctx: &AppContext, path: &str) -> CoreResult<()> {
    let record = fetch(ctx, path)?;
    if record.file_type == FileType::Directory {
        return Err(CoreError::Invalid(format!("{path} is a directory; use rmdir")));
    }

    ctx.store().with_txn(|txn| {
        file_system::delete(txn, path)?;
        file_versions::delete(txn, path)?;
        file_segments::delete_for_path(txn, path)?;
        file_segments::delete_staging(txn, path)?;
        Ok(())
    })
}

/// Moves `from` to `to` (spec.md §4.3's `rename`, spec.md §9's resolved
/// Open Question: "rename fails if the destination exists, and the moved
/// file's current version is re-signed under its new name"). A directory
/// rename moves its whole subtree; a file rename only ever touches its own
/// rows since `file_segments` is keyed by exact path, not by prefix.
#[instrument(skip(ctx))]
pub fn rename(ctx: &AppContext, from: &str, to: &str) -> CoreResult<()> {
    if crate::persistence::rejects_staging_collision(to) {
        return Err(CoreError::Invalid(format!("{to} ends with the reserved staging suffix")));
    }

    let record = fetch(ctx, from)?;
    let new_parent = fetch(ctx, parent_of(to))?;
    require_directory(&new_parent)?;

    let new_level = new_parent.level + 1;
    let level_delta = new_level - record.level;

    ctx.store().with_txn(|txn| {
        if file_system::fetch(txn, to)?.is_some() {
            return Err(CoreError::Collision);
        }

        file_system::rename_exact(txn, from, to, new_level)?;
        file_versions::rename_exact(txn, from, to)?;
        file_segments::rename_exact(txn, from, to)?;

        if record.file_type == FileType::Directory {
            file_system::rename_subtree(txn, from, to, level_delta)?;
            file_versions::rename_subtree(txn, from, to)?;
            file_segments::rename_subtree(txn, from, to)?;
        }

        Ok(())
    })?;

    if record.file_type != FileType::Directory && record.current_version != 0 {
        ctx.store().with_txn(|txn| {
            file_segments::reset_signatures_for_version(txn, to, record.current_version)?;
            file_system::mark_not_ready(txn, to)?;
            Ok(())
        })?;
        engine::signing::spawn_signing_for_version(ctx, to.to_string(), record.current_version);
    }

    Ok(())
}

/// Changes an entry's permission bits, leaving the file type untouched
/// (spec.md §4.3's `chmod`).
#[instrument(skip(ctx))]
pub fn chmod(ctx: &AppContext, path: &str, mode: u32) -> CoreResult<()> {
    fetch(ctx, path)?;
    ctx.store().with_conn(|conn| file_system::update_mode(conn, path, mode & 0o7777))?;
    Ok(())
}

#[instrument(skip(ctx))]
pub fn getattr(ctx: &AppContext, path: &str) -> CoreResult<FileRecord> {
    fetch(ctx, path)
}

/// Updates the access time recorded for `path` (spec.md §4.3's `utimens`).
#[instrument(skip(ctx))]
pub fn utimens(ctx: &AppContext, path: &str, atime: i64) -> CoreResult<()> {
    fetch(ctx, path)?;
    ctx.store().with_conn(|conn| file_system::update_atime(conn, path, atime))?;
    Ok(())
}

/// Existence check for `path` (spec.md §4.3's `access`). This crate does
/// not enforce POSIX permission bits beyond storing and reporting them —
/// every caller that can reach the mount is trusted, the same stance the
/// `mode`/`mknod`/`chmod` handling takes throughout.
#[instrument(skip(ctx))]
pub fn access(ctx: &AppContext, path: &str) -> CoreResult<()> {
    fetch(ctx, path)?;
    Ok(())
}

/// Coarse filesystem-wide statistics for `statfs` (spec.md §4.3).
pub struct StatfsInfo {
    pub block_size: u32,
    pub files: i64,
}

#[instrument(skip(ctx))]
pub fn statfs(ctx: &AppContext) -> CoreResult<StatfsInfo> {
    let files = ctx.store().with_conn(file_system::count_all)?;
    Ok(StatfsInfo {
        block_size: ctx.settings().store.segment_size,
        files,
    })
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::config::{FuseSettings, Settings, SigningSettings, StoreSettings};
    use crate::persistence::Store;
    use crate::signer::Ed25519Signer;

    use super::*;

    fn test_ctx() -> (AppContext, tokio::runtime::Runtime) {
        let settings = Settings {
            store: StoreSettings { database_path: ":memory:".to_string(), segment_size: 4096 },
            fuse: FuseSettings { mount_point: "/tmp/originfs-test".to_string(), uid: 0, gid: 0 },
            signing: SigningSettings {
                global_prefix: "/originfs".to_string(),
                key_path: "/tmp/originfs-test.key".to_string(),
            },
        };
        let store = Store::open_in_memory().unwrap();
        let signer: Arc<dyn crate::signer::Signer> = Arc::new(Ed25519Signer::generate());
        let runtime = tokio::runtime::Builder::new_multi_thread().enable_all().build().unwrap();
        let ctx = AppContext::new(store, signer, settings, runtime.handle().clone());
        (ctx, runtime)
    }

    #[test]
    fn mkdir_then_mknod_then_getattr_round_trips() {
        let (ctx, _rt) = test_ctx();
        mkdir(&ctx, "/", "docs", 0o755).unwrap();
        let file = mknod(&ctx, "/docs", "readme.txt", 0o100644).unwrap();
        assert_eq!(file.path, "/docs/readme.txt");
        assert_eq!(file.level, 2);
        assert_eq!(file.signature_state, SignatureState::Ready);

        let fetched = getattr(&ctx, "/docs/readme.txt").unwrap();
        assert_eq!(fetched, file);
    }

    #[test]
    fn mkdir_rejects_duplicate_name() {
        let (ctx, _rt) = test_ctx();
        mkdir(&ctx, "/", "x", 0o755).unwrap();
        let err = mkdir(&ctx, "/", "x", 0o755).unwrap_err();
        assert!(matches!(err, CoreError::Collision));
    }

    #[test]
    fn mknod_under_missing_parent_fails_not_found() {
        let (ctx, _rt) = test_ctx();
        let err = mknod(&ctx, "/no-such-dir", "f", 0o100644).unwrap_err();
        assert!(matches!(err, CoreError::NotFound));
    }

    #[test]
    fn mknod_under_a_file_fails_invalid() {
        let (ctx, _rt) = test_ctx();
        mknod(&ctx, "/", "f", 0o100644).unwrap();
        let err = mknod(&ctx, "/f", "g", 0o100644).unwrap_err();
        assert!(matches!(err, CoreError::Invalid(_)));
    }

    #[test]
    fn mknod_and_mkdir_reject_staging_suffix() {
        let (ctx, _rt) = test_ctx();
        assert!(matches!(mknod(&ctx, "/", "a.segtemp", 0o100644).unwrap_err(), CoreError::Invalid(_)));
        assert!(matches!(mkdir(&ctx, "/", "a.segtemp", 0o755).unwrap_err(), CoreError::Invalid(_)));
    }

    #[test]
    fn unlink_removes_a_file_but_refuses_a_directory() {
        let (ctx, _rt) = test_ctx();
        mkdir(&ctx, "/", "x", 0o755).unwrap();
        mknod(&ctx, "/", "f", 0o100644).unwrap();

        assert!(matches!(unlink(&ctx, "/x").unwrap_err(), CoreError::Invalid(_)));
        unlink(&ctx, "/f").unwrap();
        assert!(matches!(getattr(&ctx, "/f").unwrap_err(), CoreError::NotFound));
    }

    #[test]
    fn rmdir_requires_a_directory_and_rejects_the_root() {
        let (ctx, _rt) = test_ctx();
        mknod(&ctx, "/", "f", 0o100644).unwrap();
        assert!(matches!(rmdir(&ctx, "/f").unwrap_err(), CoreError::Invalid(_)));
        assert!(matches!(rmdir(&ctx, "/").unwrap_err(), CoreError::Invalid(_)));
    }

    #[test]
    fn chmod_and_utimens_update_in_place() {
        let (ctx, _rt) = test_ctx();
        mknod(&ctx, "/", "f", 0o100644).unwrap();

        chmod(&ctx, "/f", 0o600).unwrap();
        assert_eq!(getattr(&ctx, "/f").unwrap().mode, 0o600);

        utimens(&ctx, "/f", 12345).unwrap();
        assert_eq!(getattr(&ctx, "/f").unwrap().atime, 12345);
    }

    #[test]
    fn access_fails_not_found_for_a_missing_path() {
        let (ctx, _rt) = test_ctx();
        assert!(matches!(access(&ctx, "/missing").unwrap_err(), CoreError::NotFound));
    }

    #[test]
    fn statfs_counts_the_root_plus_every_created_entry() {
        let (ctx, _rt) = test_ctx();
        mkdir(&ctx, "/", "x", 0o755).unwrap();
        mknod(&ctx, "/", "f", 0o100644).unwrap();

        let info = statfs(&ctx).unwrap();
        assert_eq!(info.files, 3);
        assert_eq!(info.block_size, 4096);
    }
}
