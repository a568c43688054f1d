/// A single idempotent `CREATE TABLE IF NOT EXISTS` batch, run on every
/// open; at this crate's scale a dedicated migration runner would be more
/// machinery than the fixed three-relation schema warrants.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS file_system (
    path            TEXT PRIMARY KEY,
    current_version INTEGER NOT NULL,
    mode            INTEGER NOT NULL,
    type            INTEGER NOT NULL,
    mime_type       TEXT NOT NULL DEFAULT '',
    atime           INTEGER NOT NULL,
    nlink           INTEGER NOT NULL DEFAULT 0,
    size            INTEGER NOT NULL DEFAULT 0,
    ready_signed    INTEGER NOT NULL DEFAULT 0,
    level           INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS file_versions (
    path    TEXT NOT NULL,
    version INTEGER NOT NULL,
    PRIMARY KEY (path, version)
);

CREATE TABLE IF NOT EXISTS file_segments (
    path      TEXT NOT NULL,
    version   INTEGER NOT NULL,
    segment   INTEGER NOT NULL,
    signature BLOB NOT NULL,
    content   BLOB NOT NULL,
    PRIMARY KEY (path, version, segment)
);

CREATE INDEX IF NOT EXISTS file_system_level_idx ON file_system (path, level);

-- Every non-root FileRecord requires its parent to already exist (spec I5),
-- so the root itself has to be seeded once rather than created through
-- `namespace::mkdir` like everything else. `type = 1` is `FileType::Directory`,
-- `ready_signed = 1` is `SignatureState::Ready` (vacuously true: the root
-- carries zero segments), `level = 0` per spec.md GLOSSARY's "Level".
INSERT OR IGNORE INTO file_system
    (path, current_version, mode, type, mime_type, atime, nlink, size, ready_signed, level)
VALUES
    ('/', 0, 493, 1, '', 0, 2, 4096, 1, 0);
"#;
