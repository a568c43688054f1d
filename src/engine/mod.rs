//! The segment engine (spec.md §4.2): the staging protocol that turns a
//! sequence of writes against a path into one new immutable, signed
//! version. Every function here takes the already-fetched `FileRecord` for
//! its path rather than re-fetching it, leaving the caller (the
//! dispatcher) in control of the single round-trip that validated the path
//! exists in the first place.

pub mod signing;

use tracing::instrument;

use crate::context::AppContext;
use crate::error::{CoreError, CoreResult};
use crate::models::{FileRecord, SegmentRecord, STAGING_SUFFIX, STAGING_VERSION};
use crate::naming;
use crate::persistence::{file_segments, file_system, file_versions};

fn staging_path(path: &str) -> String {
    format!("{path}{STAGING_SUFFIX}")
}

/// Next version number for a path whose current version is
/// `current_version`: monotonic wall-clock seconds, bumped to
/// `current_version + 1` on the rare tie where the clock hasn't advanced
/// since the previous promotion (spec.md §9's resolved Open Question on
/// version numbering).
fn next_version(current_version: i64) -> i64 {
    let now = chrono::Utc::now().timestamp();
    now.max(current_version + 1)
}

/// Copies `record`'s current version into its private staging namespace,
/// unless staging already holds segments for it (a later write in the same
/// open/write.../release cycle). This is `copy_current_to_staging` from
/// spec.md §4.2: a write never touches the live, already-signed version
/// directly.
#[instrument(skip(ctx, record), fields(path = %record.path))]
pub fn ensure_staging(ctx: &AppContext, record: &FileRecord) -> CoreResult<()> {
    let staging = staging_path(&record.path);
    let already_staged = ctx
        .store()
        .with_conn(|conn| file_segments::max_segment(conn, &staging, STAGING_VERSION))?;
    if already_staged.is_some() || record.size == 0 {
        return Ok(());
    }
    ctx.store().with_txn(|txn| {
        file_segments::copy_version_into_staging(
            txn,
            &record.path,
            record.current_version,
            STAGING_VERSION,
        )?;
        Ok(())
    })
}

/// Writes `data` at `offset` into `record`'s staging namespace, splitting
/// across the fixed `SEG_SIZE` boundaries and read-modify-writing any
/// segment the write only partially overlaps (spec.md §4.2's `stage_write`).
#[instrument(skip(ctx, record, data), fields(path = %record.path, offset, len = data.len()))]
pub fn stage_write(ctx: &AppContext, record: &FileRecord, offset: u64, data: &[u8]) -> CoreResult<()> {
    ensure_staging(ctx, record)?;

    let seg_size = ctx.settings().store.segment_size as u64;
    let staging = staging_path(&record.path);

    let mut pos = offset;
    let mut remaining = data;
    while !remaining.is_empty() {
        let segment_index = (pos / seg_size) as i32;
        let segment_offset = (pos % seg_size) as usize;
        let take = ((seg_size as usize) - segment_offset).min(remaining.len());

        let existing = ctx
            .store()
            .with_conn(|conn| file_segments::fetch(conn, &staging, STAGING_VERSION, segment_index))?;

        let mut content = existing.map(|s| s.content).unwrap_or_default();
        let needed_len = segment_offset + take;
        if content.len() < needed_len {
            content.resize(needed_len, 0);
        }
        content[segment_offset..segment_offset + take].copy_from_slice(&remaining[..take]);

        ctx.store().with_txn(|txn| {
            file_segments::insert_or_replace(
                txn,
                &SegmentRecord {
                    path: staging.clone(),
                    version: STAGING_VERSION,
                    segment: segment_index,
                    signature: None,
                    content,
                },
            )?;
            Ok(())
        })?;

        pos += take as u64;
        remaining = &remaining[take..];
    }
    Ok(())
}

/// Shortens `record`'s staged content to `length`, dropping segments
/// entirely past it and truncating the one segment straddling the new
/// boundary. Extension past the current size is rejected (spec.md §9's
/// resolved Open Question: "truncate never extends — `ftruncate` to grow a
/// file is unsupported; a caller that needs a larger file writes the
/// padding itself").
#[instrument(skip(ctx, record), fields(path = %record.path, length))]
pub fn truncate_to_length(ctx: &AppContext, record: &FileRecord, length: u64) -> CoreResult<i64> {
    if length > record.size {
        return Err(CoreError::Invalid(
            "truncate cannot extend a file past its current size".to_string(),
        ));
    }

    ensure_staging(ctx, record)?;
    let seg_size = ctx.settings().store.segment_size as u64;
    let staging = staging_path(&record.path);

    ctx.store().with_txn(|txn| {
        let segments = file_segments::fetch_all_for_version(txn, &staging, STAGING_VERSION)?;
        for segment in segments {
            let segment_start = segment.segment as u64 * seg_size;
            if segment_start >= length {
                file_segments::delete_segment(txn, &staging, STAGING_VERSION, segment.segment)?;
            } else if segment_start + segment.content.len() as u64 > length {
                let keep = (length - segment_start) as usize;
                let mut content = segment.content;
                content.truncate(keep);
                file_segments::update_content(txn, &staging, STAGING_VERSION, segment.segment, &content)?;
            }
        }
        Ok(())
    })?;

    promote_staging(ctx, record, length)
}

/// Discards `path`'s staging namespace without promoting it (spec.md
/// §4.2's `discard_staging`): used when a write-opened file is released
/// without ever being written to, and by the startup reclaim sweep for
/// staging left behind by a crash mid-write.
#[instrument(skip(ctx))]
pub fn discard_staging(ctx: &AppContext, path: &str) -> CoreResult<()> {
    ctx.store().with_conn(|conn| file_segments::delete_staging(conn, path))?;
    Ok(())
}

/// Rewrites `record`'s staging namespace into a freshly-minted version,
/// updates `file_system`/`file_versions`, and kicks off background signing
/// for every segment of the new version (spec.md §4.2's `promote_staging`).
/// Returns the new version number.
#[instrument(skip(ctx, record), fields(path = %record.path))]
pub fn promote_staging(ctx: &AppContext, record: &FileRecord, new_size: u64) -> CoreResult<i64> {
    let staging = staging_path(&record.path);
    let new_version = next_version(record.current_version);

    ctx.store().with_txn(|txn| {
        file_segments::promote_staging(txn, &record.path, STAGING_VERSION, new_version)?;
        file_versions::insert(txn, &record.path, new_version)?;
        file_system::update_current_version(txn, &record.path, new_version, new_size)?;
        Ok(())
    })?;

    signing::spawn_signing_for_version(ctx, record.path.clone(), new_version);

    Ok(new_version)
}

/// Reads up to `size` bytes of `record`'s current version starting at
/// `offset`, stitched back together across segment boundaries (spec.md
/// §4.2's `read_segment_range`). Never reads staging: readers only ever
/// see the last fully-promoted version (spec.md §5).
#[instrument(skip(ctx, record), fields(path = %record.path, offset, size))]
pub fn read_segment_range(ctx: &AppContext, record: &FileRecord, offset: u64, size: u32) -> CoreResult<Vec<u8>> {
    if offset >= record.size {
        return Ok(Vec::new());
    }

    let seg_size = ctx.settings().store.segment_size as u64;
    let end = (offset + size as u64).min(record.size);
    let mut out = Vec::with_capacity((end - offset) as usize);

    let mut pos = offset;
    while pos < end {
        let segment_index = (pos / seg_size) as i32;
        let segment_offset = (pos % seg_size) as usize;
        let segment = ctx.store().with_conn(|conn| {
            file_segments::fetch(conn, &record.path, record.current_version, segment_index)
        })?;
        let content = segment.map(|s| s.content).unwrap_or_default();
        let available = content.len().saturating_sub(segment_offset);
        if available == 0 {
            break;
        }
        let want = ((end - pos) as usize).min(available);
        out.extend_from_slice(&content[segment_offset..segment_offset + want]);
        pos += want as u64;
    }
    Ok(out)
}

/// Signs one segment and writes its signature back, marking the file
/// `Ready` once no unsigned segment remains for its current version
/// (spec.md §4.2's `sign_and_store_segment`; the `Ready` flip itself is
/// `file_system::mark_ready_if_current`'s tie-break, not this function's).
#[instrument(skip(ctx), fields(path, version, segment))]
pub fn sign_and_store_segment(ctx: &AppContext, path: &str, version: i64, segment: i32) -> CoreResult<()> {
    let record = ctx
        .store()
        .with_conn(|conn| file_segments::fetch(conn, path, version, segment))?
        .ok_or(CoreError::NotFound)?;

    let name = naming::segment_name(&ctx.settings().signing.global_prefix, path, version, segment);
    let signature = ctx.signer().sign(&name, &record.content)?;

    ctx.store()
        .with_conn(|conn| file_segments::update_signature(conn, path, version, segment, &signature))?;

    let still_unsigned = ctx
        .store()
        .with_conn(|conn| file_segments::has_unsigned(conn, path, version))?;
    if !still_unsigned {
        ctx.store()
            .with_conn(|conn| file_system::mark_ready_if_current(conn, path, version))?;
    }
    Ok(())
}

/// Discards every orphaned staging namespace found at startup (spec.md
/// §4.4): a process that crashed mid-write leaves `.segtemp` segments
/// behind with no in-memory lock protecting them, so the only safe thing to
/// do on the next `cmd::serve` is to treat them as never having happened.
#[instrument(skip(ctx))]
pub fn reclaim_orphaned_staging(ctx: &AppContext) -> CoreResult<usize> {
    let owners = ctx.store().with_conn(file_segments::distinct_staging_owners)?;
    let count = owners.len();
    for path in owners {
        discard_staging(ctx, &path)?;
    }
    Ok(count)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use crate::config::{FuseSettings, Settings, SigningSettings, StoreSettings};
    use crate::models::{FileType, SignatureState};
    use crate::persistence::Store;
    use crate::signer::Ed25519Signer;

    use super::*;

    fn test_ctx(segment_size: u32) -> (AppContext, tokio::runtime::Runtime) {
        let settings = Settings {
            store: StoreSettings { database_path: ":memory:".to_string(), segment_size },
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

    fn seed_file(ctx: &AppContext, path: &str) -> FileRecord {
        let now = chrono::Utc::now().timestamp();
        let record = FileRecord {
            path: path.to_string(),
            file_type: FileType::Regular,
            mode: 0o644,
            current_version: now,
            atime: now,
            size: 0,
            nlink: 1,
            mime_type: String::new(),
            signature_state: SignatureState::Ready,
            level: 1,
        };
        ctx.store()
            .with_txn(|txn| {
                file_system::insert(txn, &record)?;
                file_versions::insert(txn, path, now)?;
                Ok(())
            })
            .unwrap();
        record
    }

    #[test]
    fn stage_write_then_promote_round_trips_within_one_segment() {
        let (ctx, _rt) = test_ctx(16);
        let record = seed_file(&ctx, "/a");

        stage_write(&ctx, &record, 0, b"hello").unwrap();
        let new_version = promote_staging(&ctx, &record, 5).unwrap();
        assert!(new_version >= record.current_version);

        let promoted = FileRecord { current_version: new_version, size: 5, ..record };
        let data = read_segment_range(&ctx, &promoted, 0, 5).unwrap();
        assert_eq!(data, b"hello");
    }

    #[test]
    fn stage_write_splits_across_segment_boundary() {
        let (ctx, _rt) = test_ctx(4);
        let record = seed_file(&ctx, "/a");

        stage_write(&ctx, &record, 0, &[1, 2, 3, 4, 5, 6]).unwrap();
        let new_version = promote_staging(&ctx, &record, 6).unwrap();

        let segments = ctx
            .store()
            .with_conn(|conn| file_segments::fetch_all_for_version(conn, "/a", new_version))
            .unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].content, vec![1, 2, 3, 4]);
        assert_eq!(segments[1].content, vec![5, 6]);
    }

    #[test]
    fn truncate_rejects_extension_past_current_size() {
        let (ctx, _rt) = test_ctx(16);
        let mut record = seed_file(&ctx, "/a");
        record.size = 5;

        let err = truncate_to_length(&ctx, &record, 10).unwrap_err();
        assert!(matches!(err, CoreError::Invalid(_)));
    }

    #[test]
    fn discard_staging_without_any_staged_write_is_a_noop() {
        let (ctx, _rt) = test_ctx(16);
        seed_file(&ctx, "/a");
        discard_staging(&ctx, "/a").unwrap();
    }

    #[test]
    fn reclaim_orphaned_staging_clears_segtemp_but_not_live_segments() {
        let (ctx, _rt) = test_ctx(16);
        let record = seed_file(&ctx, "/a");
        stage_write(&ctx, &record, 0, b"hi").unwrap();

        let reclaimed = reclaim_orphaned_staging(&ctx).unwrap();
        assert_eq!(reclaimed, 1);

        let staging_segments = ctx
            .store()
            .with_conn(|conn| file_segments::fetch_all_for_version(conn, "/a.segtemp", crate::models::STAGING_VERSION))
            .unwrap();
        assert!(staging_segments.is_empty());
    }
}
