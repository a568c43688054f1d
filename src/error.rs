use tracing::error;

/// The core's error taxonomy, mapped to a negative-errno at the `fuse`
/// boundary via `into_errno` rather than an HTTP status — there is no HTTP
/// surface in this crate.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("path not found")]
    NotFound,

    #[error("invalid operation: {0}")]
    Invalid(String),

    #[error("path already exists")]
    Collision,

    #[error("persistence error")]
    Persistence(#[from] rusqlite::Error),

    #[error("signing error: {0}")]
    Signing(String),

    #[error("operation unsupported")]
    Unsupported,
}

impl CoreError {
    /// Negative-errno-equivalent magnitude for the `fuse` adapter's
    /// `reply.error(...)` calls. Persistence errors are logged here (the
    /// core layers never swallow an error silently except for `Signing`,
    /// whose availability-over-completeness policy is enforced by its
    /// caller never constructing this variant as an operation failure).
    pub fn into_errno(self) -> libc::c_int {
        match &self {
            CoreError::NotFound => libc::ENOENT,
            CoreError::Invalid(_) => libc::EINVAL,
            CoreError::Collision => libc::EEXIST,
            CoreError::Persistence(err) => {
                error!(error = ?err, "persistence error surfaced to caller");
                libc::EIO
            }
            CoreError::Signing(msg) => {
                error!(message = %msg, "signing error surfaced to caller");
                libc::EIO
            }
            CoreError::Unsupported => libc::ENOSYS,
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
