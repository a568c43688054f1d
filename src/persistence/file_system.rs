use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{FileRecord, SignatureState};

fn from_row(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        path: row.get("path")?,
        current_version: row.get("current_version")?,
        mode: row.get("mode")?,
        file_type: row.get("type")?,
        mime_type: row.get("mime_type")?,
        atime: row.get("atime")?,
        nlink: row.get("nlink")?,
        size: row.get::<_, i64>("size")? as u64,
        signature_state: row.get("ready_signed")?,
        level: row.get("level")?,
    })
}

pub fn insert(conn: &Connection, record: &FileRecord) -> rusqlite::Result<()> {
    conn.execute(
        r#"
        INSERT INTO file_system
            (path, current_version, mode, type, mime_type, atime, nlink, size, ready_signed, level)
        VALUES
            (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
        "#,
        params![
            record.path,
            record.current_version,
            record.mode,
            record.file_type,
            record.mime_type,
            record.atime,
            record.nlink,
            record.size as i64,
            record.signature_state,
            record.level,
        ],
    )?;
    Ok(())
}

pub fn fetch(conn: &Connection, path: &str) -> rusqlite::Result<Option<FileRecord>> {
    conn.query_row(
        "SELECT * FROM file_system WHERE path = ?1",
        params![path],
        from_row,
    )
    .optional()
}

/// Children of `parent_path`, implementing spec.md §4.3's readdir as a
/// bounded range scan over `level` rather than a recursive descent: every
/// row whose path is prefixed by `parent_path + "/"` (or, for the root,
/// just prefixed by `/`) and whose `level` is exactly `parent_level + 1`.
pub fn list_children(
    conn: &Connection,
    parent_path: &str,
    parent_level: i32,
) -> rusqlite::Result<Vec<FileRecord>> {
    let like_pattern = if parent_path == "/" {
        "/%".to_string()
    } else {
        format!("{parent_path}/%")
    };
    let mut stmt = conn.prepare(
        "SELECT * FROM file_system WHERE path LIKE ?1 AND level = ?2 ORDER BY path",
    )?;
    let rows = stmt.query_map(params![like_pattern, parent_level + 1], from_row)?;
    rows.collect()
}

pub fn update_mode(conn: &Connection, path: &str, mode: u32) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_system SET mode = ?1 WHERE path = ?2",
        params![mode, path],
    )
}

pub fn update_atime(conn: &Connection, path: &str, atime: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_system SET atime = ?1 WHERE path = ?2",
        params![atime, path],
    )
}

/// Moves a FileRecord's `current_version` pointer (promotion / truncate),
/// resetting `signature_state` to `NotReady` in the same statement (spec
/// I3/I4: a fresh version starts with no signed segments).
pub fn update_current_version(
    conn: &Connection,
    path: &str,
    new_version: i64,
    size: u64,
) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        UPDATE file_system
        SET current_version = ?1, size = ?2, ready_signed = ?3
        WHERE path = ?4
        "#,
        params![new_version, size as i64, SignatureState::NotReady, path],
    )
}

/// Flips `signature_state` to `Ready`, but only if `current_version` still
/// matches `version` — the tie-break spec.md §4.2 requires so a stale
/// signing result from a superseded version never marks the file ready.
pub fn mark_ready_if_current(
    conn: &Connection,
    path: &str,
    version: i64,
) -> rusqlite::Result<usize> {
    conn.execute(
        r#"
        UPDATE file_system
        SET ready_signed = ?1
        WHERE path = ?2 AND current_version = ?3
        "#,
        params![SignatureState::Ready, path, version],
    )
}

pub fn delete(conn: &Connection, path: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM file_system WHERE path = ?1", params![path])
}

/// Resets `signature_state` to `NotReady` without touching
/// `current_version`, used by `rename` — a path's segment names embed the
/// path itself, so a rename invalidates the current version's signatures
/// without minting a new version.
pub fn mark_not_ready(conn: &Connection, path: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_system SET ready_signed = ?1 WHERE path = ?2",
        params![SignatureState::NotReady, path],
    )
}

pub fn count_all(conn: &Connection) -> rusqlite::Result<i64> {
    conn.query_row("SELECT COUNT(*) FROM file_system", [], |row| row.get(0))
}

/// Deletes every record whose path is strictly under `prefix` (i.e. has
/// `prefix + "/"` as an actual path prefix), used by `rmdir`'s subtree
/// delete (spec.md §4.3: "a single prefix match does the work").
pub fn delete_subtree(conn: &Connection, prefix: &str) -> rusqlite::Result<usize> {
    let like_pattern = format!("{prefix}/%");
    conn.execute(
        "DELETE FROM file_system WHERE path LIKE ?1",
        params![like_pattern],
    )
}

pub fn rename_exact(conn: &Connection, from: &str, to: &str, new_level: i32) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_system SET path = ?1, level = ?2 WHERE path = ?3",
        params![to, new_level, from],
    )
}

/// Rewrites every path strictly under `from_prefix` to be rooted at
/// `to_prefix` instead, adjusting `level` by `level_delta` so I5 keeps
/// holding for the whole moved subtree.
pub fn rename_subtree(
    conn: &Connection,
    from_prefix: &str,
    to_prefix: &str,
    level_delta: i32,
) -> rusqlite::Result<()> {
    let like_pattern = format!("{from_prefix}/%");
    let mut stmt = conn.prepare("SELECT path FROM file_system WHERE path LIKE ?1")?;
    let paths: Vec<String> = stmt
        .query_map(params![like_pattern], |row| row.get(0))?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    for old_path in paths {
        let new_path = format!("{to_prefix}{}", &old_path[from_prefix.len()..]);
        conn.execute(
            "UPDATE file_system SET path = ?1, level = level + ?2 WHERE path = ?3",
            params![new_path, level_delta, old_path],
        )?;
    }
    Ok(())
}
