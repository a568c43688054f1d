//! Exercises spec.md §8's quantified invariants (P1–P5) and boundary
//! scenarios (B1–B6) against a real temp sqlite file, end-to-end through
//! `namespace`/`dispatcher` rather than any single module in isolation.

use originfs::dispatcher::Dispatcher;
use originfs::error::CoreError;
use originfs::namespace;

use crate::support::Harness;

const REGULAR: u32 = libc::S_IFREG | 0o644;
const DIR: u32 = libc::S_IFDIR | 0o755;

/// B1: a 6000-byte write against a 4096-byte segment size produces one full
/// segment and one 1904-byte segment, round-trips exactly, and P3 holds.
#[test]
fn partial_segment_overwrite_round_trips() {
    let h = Harness::with_segment_size(4096);
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();

    let dispatcher = Dispatcher::new(h.ctx.clone());
    let fh = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    let body = vec![b'A'; 6000];
    assert_eq!(dispatcher.write(fh, 0, &body).unwrap(), 6000);
    dispatcher.release(fh).unwrap();

    let record = namespace::getattr(&h.ctx, "/a").unwrap();
    assert_eq!(record.size, 6000);

    let read_fh = dispatcher.open("/a", libc::O_RDONLY).unwrap();
    let data = dispatcher.read(read_fh, 0, 6000).unwrap();
    dispatcher.release(read_fh).unwrap();
    assert_eq!(data, body);
}

/// B2: a follow-up write past the current end of file leaves no hole and
/// extends size exactly by the new write's length.
#[test]
fn hole_free_append_extends_size() {
    let h = Harness::with_segment_size(4096);
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();
    let dispatcher = Dispatcher::new(h.ctx.clone());

    let first = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    dispatcher.write(first, 0, &vec![b'A'; 6000]).unwrap();
    dispatcher.release(first).unwrap();

    let second = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    dispatcher.write(second, 6000, &vec![b'B'; 100]).unwrap();
    dispatcher.release(second).unwrap();

    let record = namespace::getattr(&h.ctx, "/a").unwrap();
    assert_eq!(record.size, 6100);

    let read_fh = dispatcher.open("/a", libc::O_RDONLY).unwrap();
    let data = dispatcher.read(read_fh, 0, 6100).unwrap();
    dispatcher.release(read_fh).unwrap();

    assert_eq!(&data[..6000], vec![b'A'; 6000].as_slice());
    assert_eq!(&data[6000..], vec![b'B'; 100].as_slice());
}

/// B3: truncating below the current size drops the segments past the new
/// length and leaves a read of the old range short.
#[test]
fn truncate_shrinks_file() {
    let h = Harness::with_segment_size(4096);
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();
    let dispatcher = Dispatcher::new(h.ctx.clone());

    let fh = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    dispatcher.write(fh, 0, &vec![b'A'; 6000]).unwrap();
    dispatcher.release(fh).unwrap();

    dispatcher.truncate("/a", 100).unwrap();

    let record = namespace::getattr(&h.ctx, "/a").unwrap();
    assert_eq!(record.size, 100);

    let read_fh = dispatcher.open("/a", libc::O_RDONLY).unwrap();
    let data = dispatcher.read(read_fh, 0, 200).unwrap();
    dispatcher.release(read_fh).unwrap();
    assert_eq!(data, vec![b'A'; 100]);
}

/// spec.md §9's resolved Open Question: truncate never extends a file.
#[test]
fn truncate_past_end_is_rejected() {
    let h = Harness::new();
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();
    let dispatcher = Dispatcher::new(h.ctx.clone());

    let fh = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    dispatcher.write(fh, 0, b"hi").unwrap();
    dispatcher.release(fh).unwrap();

    let err = dispatcher.truncate("/a", 1000).unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}

/// B4: readdir honors the `level` invariant and fails `NotFound` on a path
/// that exists but isn't a directory.
#[test]
fn directory_listing_via_level() {
    let h = Harness::new();
    namespace::mkdir(&h.ctx, "/", "x", DIR).unwrap();
    namespace::mkdir(&h.ctx, "/x", "y", DIR).unwrap();
    namespace::mknod(&h.ctx, "/x/y", "f", REGULAR).unwrap();

    let x_children: Vec<String> = namespace::readdir(&h.ctx, "/x")
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(x_children, vec!["/x/y".to_string()]);

    let y_children: Vec<String> = namespace::readdir(&h.ctx, "/x/y")
        .unwrap()
        .into_iter()
        .map(|r| r.path)
        .collect();
    assert_eq!(y_children, vec!["/x/y/f".to_string()]);

    let err = namespace::readdir(&h.ctx, "/x/y/f").unwrap_err();
    assert!(matches!(err, CoreError::NotFound));
}

/// B5: rmdir deletes the whole subtree (file_system, file_versions,
/// file_segments) in one prefix match, without requiring the directory to
/// be empty first.
#[test]
fn rmdir_deletes_subtree() {
    let h = Harness::new();
    namespace::mkdir(&h.ctx, "/", "x", DIR).unwrap();
    namespace::mkdir(&h.ctx, "/x", "y", DIR).unwrap();
    let f = namespace::mknod(&h.ctx, "/x/y", "f", REGULAR).unwrap();

    let dispatcher = Dispatcher::new(h.ctx.clone());
    let fh = dispatcher.open(&f.path, libc::O_WRONLY).unwrap();
    dispatcher.write(fh, 0, b"hello").unwrap();
    dispatcher.release(fh).unwrap();

    namespace::rmdir(&h.ctx, "/x").unwrap();

    assert!(matches!(namespace::getattr(&h.ctx, "/x").unwrap_err(), CoreError::NotFound));
    assert!(matches!(namespace::getattr(&h.ctx, "/x/y").unwrap_err(), CoreError::NotFound));
    assert!(matches!(namespace::getattr(&h.ctx, "/x/y/f").unwrap_err(), CoreError::NotFound));

    let remaining_versions = h
        .ctx
        .store()
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM file_versions WHERE path LIKE '/x%'",
                [],
                |row| row.get::<_, i64>(0),
            )
        })
        .unwrap();
    assert_eq!(remaining_versions, 0);

    let remaining_segments = h
        .ctx
        .store()
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM file_segments WHERE path LIKE '/x%'",
                [],
                |row| row.get::<_, i64>(0),
            )
        })
        .unwrap();
    assert_eq!(remaining_segments, 0);
}

/// B6 / P5: immediately after release a file may be `NotReady`, but once
/// the background signer finishes every segment carries a real signature
/// and the file flips to `Ready`.
#[test]
fn signing_lag_then_ready() {
    use originfs::models::SignatureState;
    use originfs::persistence::file_segments;

    let h = Harness::with_segment_size(16);
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();
    let dispatcher = Dispatcher::new(h.ctx.clone());

    let fh = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    dispatcher.write(fh, 0, &vec![b'x'; 40]).unwrap();
    dispatcher.release(fh).unwrap();

    let record = namespace::getattr(&h.ctx, "/a").unwrap();
    h.wait_for_signed(&record.path, record.current_version);

    let refreshed = namespace::getattr(&h.ctx, "/a").unwrap();
    assert_eq!(refreshed.signature_state, SignatureState::Ready);

    let segments = h
        .ctx
        .store()
        .with_conn(|conn| file_segments::fetch_all_for_version(conn, "/a", refreshed.current_version))
        .unwrap();
    assert_eq!(segments.len(), 3);
    assert!(segments.iter().all(|s| s.is_signed()));
}

/// P4: discarding an already-empty staging namespace twice is a no-op both
/// times.
#[test]
fn discard_staging_is_idempotent() {
    use originfs::engine;

    let h = Harness::new();
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();

    engine::discard_staging(&h.ctx, "/a").unwrap();
    engine::discard_staging(&h.ctx, "/a").unwrap();
}

/// spec.md §9: rename fails if the destination exists, and otherwise
/// re-signs the moved file (its signed segment names embed the path).
#[test]
fn rename_rejects_existing_destination_and_resigns() {
    use originfs::models::SignatureState;

    let h = Harness::with_segment_size(4096);
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();
    namespace::mknod(&h.ctx, "/", "b", REGULAR).unwrap();
    let dispatcher = Dispatcher::new(h.ctx.clone());

    let fh = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    dispatcher.write(fh, 0, b"hello").unwrap();
    dispatcher.release(fh).unwrap();

    let collision = namespace::rename(&h.ctx, "/a", "/b").unwrap_err();
    assert!(matches!(collision, CoreError::Collision));

    namespace::rename(&h.ctx, "/a", "/c").unwrap();
    assert!(matches!(namespace::getattr(&h.ctx, "/a").unwrap_err(), CoreError::NotFound));

    let moved = namespace::getattr(&h.ctx, "/c").unwrap();
    h.wait_for_signed(&moved.path, moved.current_version);
    let refreshed = namespace::getattr(&h.ctx, "/c").unwrap();
    assert_eq!(refreshed.signature_state, SignatureState::Ready);
}

/// spec I7: a path whose last component collides with the staging-key
/// mangling scheme must be rejected at creation, not silently accepted.
#[test]
fn mknod_rejects_staging_suffix_collision() {
    let h = Harness::new();
    let err = namespace::mknod(&h.ctx, "/", "evil.segtemp", REGULAR).unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)));
}

/// unlink removes the FileRecord and every VersionRecord/SegmentRecord for
/// that exact path (spec.md §4.3).
#[test]
fn unlink_removes_file_and_its_segments() {
    let h = Harness::new();
    namespace::mknod(&h.ctx, "/", "a", REGULAR).unwrap();
    let dispatcher = Dispatcher::new(h.ctx.clone());
    let fh = dispatcher.open("/a", libc::O_WRONLY).unwrap();
    dispatcher.write(fh, 0, b"hello").unwrap();
    dispatcher.release(fh).unwrap();

    namespace::unlink(&h.ctx, "/a").unwrap();
    assert!(matches!(namespace::getattr(&h.ctx, "/a").unwrap_err(), CoreError::NotFound));

    let remaining = h
        .ctx
        .store()
        .with_conn(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM file_segments WHERE path = '/a'",
                [],
                |row| row.get::<_, i64>(0),
            )
        })
        .unwrap();
    assert_eq!(remaining, 0);
}
