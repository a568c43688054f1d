use rusqlite::{params, Connection};

/// Inserted on mknod/mkdir and again on each successful release-with-write
/// (spec.md §3's VersionRecord lifecycle); never modified afterward.
pub fn insert(conn: &Connection, path: &str, version: i64) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO file_versions (path, version) VALUES (?1, ?2)",
        params![path, version],
    )?;
    Ok(())
}

pub fn delete(conn: &Connection, path: &str) -> rusqlite::Result<usize> {
    conn.execute("DELETE FROM file_versions WHERE path = ?1", params![path])
}

pub fn delete_subtree(conn: &Connection, prefix: &str) -> rusqlite::Result<usize> {
    let like_pattern = format!("{prefix}/%");
    conn.execute(
        "DELETE FROM file_versions WHERE path LIKE ?1",
        params![like_pattern],
    )
}

pub fn rename_exact(conn: &Connection, from: &str, to: &str) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE file_versions SET path = ?1 WHERE path = ?2",
        params![to, from],
    )
}

pub fn rename_subtree(conn: &Connection, from_prefix: &str, to_prefix: &str) -> rusqlite::Result<()> {
    let like_pattern = format!("{from_prefix}/%");
    let mut stmt = conn.prepare("SELECT path, version FROM file_versions WHERE path LIKE ?1")?;
    let rows: Vec<(String, i64)> = stmt
        .query_map(params![like_pattern], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<rusqlite::Result<_>>()?;
    drop(stmt);

    for (old_path, version) in rows {
        let new_path = format!("{to_prefix}{}", &old_path[from_prefix.len()..]);
        conn.execute(
            "UPDATE file_versions SET path = ?1 WHERE path = ?2 AND version = ?3",
            params![new_path, old_path, version],
        )?;
    }
    Ok(())
}
