pub mod file_type;
pub mod records;
pub mod signature_state;

pub use file_type::FileType;
pub use records::{FileRecord, SegmentRecord, VersionRecord};
pub use signature_state::SignatureState;

/// The reserved version literal used for the staging namespace (spec I7).
///
/// Wall-clock-second versions grow monotonically from process start and are
/// already far larger than this by the time any real store would collide
/// with it; `Config::validate` still asserts the gap at startup rather than
/// leaving it as a silent assumption.
pub const STAGING_VERSION: i64 = 100_000;

/// Suffix mangled onto a path to form its private staging key (spec I7).
pub const STAGING_SUFFIX: &str = ".segtemp";
