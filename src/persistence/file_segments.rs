use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{SegmentRecord, STAGING_SUFFIX};

use super::NONE_SENTINEL;

fn signature_to_sql(signature: &Option<Vec<u8>>) -> Vec<u8> {
    match signature {
        Some(bytes) => bytes.clone(),
        None => NONE_SENTINEL.to_vec(),
    }
}

fn signature_from_sql(bytes: Vec<u8>) -> Option<Vec<u8>> {
    if bytes == NONE_SENTINEL {
        None
    } else {
        Some(bytes)
    }
}

fn from_row(row: &Row) -> rusqlite::Result<SegmentRecord> {
    let signature: Vec<u8> = row.get("signature")?;
    Ok(SegmentRecord {
        path: row.get("path")?,
        version: row.get("version")?,
        segment: row.get("segment")?,
        signature: signature_from_sql(signature),
        content: row.get("content")?,
    })
}

pub fn insert_or_replace(conn: &Connection, segment: &SegmentRecord) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT OR REPLACE INTO file_segments (path, version, segment, signature, content)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            segment.path,
            segment.version,
            segment.segment,
            signature_to_sql(&segment.signature),
            segment.content,
        ],
    )?;
    Ok(())
}

pub fn fetch(
    conn: &Connection,
    path: &str,
    version: i64,
    segment: i32,
) -> rusqlite::Result<Option<SegmentRecord>> {
    conn.query_row(
        "SELECT * FROM file_segments WHERE path = ?1 AND version = ?2 AND segment = ?3",
        params![path, version, segment],
        from_row,
    )
    .optional()
}

/// All segments of `(path, version)`, in ascending segment order — the
/// order `read_segment_range`, `truncate_to_length`, and
/// `sign_and_store_segment`'s caller all depend on.
pub fn fetch_all_for_version(
    conn: &Connection,
    path: &str,
    version: i64,
) -> rusqlite::Result<Vec<SegmentRecord>> {
    let mut stmt = conn.prepare(
        "SELECT * FROM file_segments WHERE path = ?1 AND version = ?2 ORDER BY segment ASC",
    )?;
    let rows = stmt.query_map(params![path, version], from_row)?;
    rows.collect()
}

pub fn max_segment(conn: &Connection, path: &str, version: i64) -> rusqlite::Result<Option<i32>> {
    conn.query_row(
        "SELECT MAX(segment) FROM file_segments WHERE path = ?1 AND version = ?2",
        params![path, version],
        |row| row.get(0),
    )
}

pub fn update_content(
    conn: &Connection,
    path: &str,
    version: i64,
    segment: i32,
    content: &[u8],
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_segments SET content = ?1, signature = ?2 WHERE path = ?3 AND version = ?4 AND segment = ?5",
        params![content, NONE_SENTINEL, path, version, segment],
    )
}

pub fn update_signature(
    conn: &Connection,
    path: &str,
    version: i64,
    segment: i32,
    signature: &[u8],
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_segments SET signature = ?1 WHERE path = ?2 AND version = ?3 AND segment = ?4",
        params![signature, path, version, segment],
    )
}

/// True iff at least one segment of `(path, version)` is still unsigned —
/// the complement of spec I4's `signature_state = READY` condition.
pub fn has_unsigned(conn: &Connection, path: &str, version: i64) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM file_segments WHERE path = ?1 AND version = ?2 AND signature = ?3)",
        params![path, version, NONE_SENTINEL],
        |row| row.get(0),
    )
}

pub fn delete_segment(
    conn: &Connection,
    path: &str,
    version: i64,
    segment: i32,
) -> rusqlite::Result<usize> {
    conn.execute(
        "DELETE FROM file_segments WHERE path = ?1 AND version = ?2 AND segment = ?3",
        params![path, version, segment],
    )
}

pub fn delete_for_path(conn: &Connection, path: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM file_segments WHERE path = ?1", params![path])
}

pub fn delete_subtree(conn: &Connection, prefix: &str) -> rusqlite::Result<usize> {
    let like_pattern = format!("{prefix}/%");
    conn.execute(
        "DELETE FROM file_segments WHERE path LIKE ?1",
        params![like_pattern],
    )
}

/// Deletes every segment in the private `path + ".segtemp"` staging
/// namespace for `path` (spec I7 / `discard_staging`).
pub fn delete_staging(conn: &Connection, path: &str) -> rusqlite::Result<usize> {
    let staging_path = format!("{path}{STAGING_SUFFIX}");
    conn.execute(
        "DELETE FROM file_segments WHERE path = ?1",
        params![staging_path],
    )
}

/// Duplicates every segment of `(path, current_version)` into the staging
/// namespace with `signature = NONE` (`copy_current_to_staging`, spec.md
/// §4.2), preserving content so a partial overwrite doesn't lose unchanged
/// earlier segments.
pub fn copy_version_into_staging(
    conn: &Connection,
    path: &str,
    current_version: i64,
    staging_version: i64,
) -> rusqlite::Result<()> {
    let staging_path = format!("{path}{STAGING_SUFFIX}");
    conn.execute(
        r#"
        INSERT OR REPLACE INTO file_segments (path, version, segment, signature, content)
        SELECT ?1, ?2, segment, ?3, content
        FROM file_segments
        WHERE path = ?4 AND version = ?5
        "#,
        params![staging_path, staging_version, NONE_SENTINEL, path, current_version],
    )?;
    Ok(())
}

/// Rewrites every staging segment of `path` into `(path, new_version)`,
/// discarding the `.segtemp` suffix and the `STAGING_VERSION` placeholder
/// (`promote_staging`, spec.md §4.2).
pub fn promote_staging(
    conn: &Connection,
    path: &str,
    staging_version: i64,
    new_version: i64,
) -> rusqlite::Result<usize> {
    let staging_path = format!("{path}{STAGING_SUFFIX}");
    conn.execute(
        r#"
        UPDATE file_segments
        SET path = ?1, version = ?2
        WHERE path = ?3 AND version = ?4
        "#,
        params![path, new_version, staging_path, staging_version],
    )
}

/// Resets every segment of `(path, version)` back to the `NONE` sentinel —
/// used by `namespace::rename`, whose new path invalidates every existing
/// signature for the version being actively served.
pub fn reset_signatures_for_version(conn: &Connection, path: &str, version: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_segments SET signature = ?1 WHERE path = ?2 AND version = ?3",
        params![NONE_SENTINEL, path, version],
    )
}

pub fn rename_exact(conn: &Connection, from: &str, to: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_segments SET path = ?1 WHERE path = ?2",
        params![to, from],
    )
}

pub fn rename_subtree(conn: &Connection, from_prefix: &str, to_prefix: &str) -> rusqlite::Result<()> {
    let like_pattern = format!("{from_prefix}/%");
    let mut stmt = conn.prepare(
        "SELECT DISTINCT path FROM file_segments WHERE path LIKE ?1",
    )?;
    let paths: Vec<String> = stmt
        .query_map(params![like_pattern], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    for old_path in paths {
        let new_path = format!("{to_prefix}{}", &old_path[from_prefix.len()..]);
        conn.execute(
            "UPDATE file_segments SET path = ?1 WHERE path = ?2",
            params![new_path, old_path],
        )?;
    }
    Ok(())
}

/// Every distinct path carrying an orphaned staging namespace, for the
/// startup reclaim sweep (spec.md §4.4: "staging segments are orphaned and
/// must be reclaimed at startup by `discard_staging` for every `.segtemp`
/// prefix found").
pub fn distinct_staging_owners(conn: &Connection) -> rusqlite::Result<Vec<String>> {
    let suffix_pattern = format!("%{STAGING_SUFFIX}");
    let mut stmt = conn.prepare(
        "SELECT DISTINCT path FROM file_segments WHERE path LIKE ?1",
    )?;
    let owners = stmt
        .query_map(params![suffix_pattern], |row| {
            let staged: String = row.get(0)?;
            Ok(staged[..staged.len() - STAGING_SUFFIX.len()].to_string())
        })?
        .collect::<rusqlite::Result<_>>()?;
    Ok(owners)
}
