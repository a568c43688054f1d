use super::{FileType, SignatureState};

/// One per live path (spec.md §3). `level` is the cached directory depth
/// that turns `readdir` into a bounded range scan instead of a recursive
/// descent (spec.md's GLOSSARY entry for "Level").
#[derive(Debug, Clone, PartialEq)]
pub struct FileRecord {
    pub path: String,
    pub file_type: FileType,
    pub mode: u32,
    pub current_version: i64,
    pub atime: i64,
    pub size: u64,
    pub nlink: u32,
    pub mime_type: String,
    pub signature_state: SignatureState,
    pub level: i32,
}

/// One per (path, version) that has ever existed, kept for history/audit
/// (spec.md §3). Carries no payload of its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord {
    pub path: String,
    pub version: i64,
}

/// One per (path, version, segment_index) (spec.md §3). `signature` is
/// `None` for the sentinel `NONE` value; the literal 4-byte ASCII marker
/// only ever appears at the SQL boundary (`persistence::file_segments`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentRecord {
    pub path: String,
    pub version: i64,
    pub segment: i32,
    pub signature: Option<Vec<u8>>,
    pub content: Vec<u8>,
}

impl SegmentRecord {
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}
