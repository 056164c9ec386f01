//! Errors

/// Result wrapper
pub type Result<T> = std::result::Result<T, Error>;

/// Precondition faults detected while an entry or an archive is being put
/// together. They are reported before any byte is produced; faults of streamed
/// content surface later as [`std::io::Error`] items of the output stream.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("entry name is empty")]
    EmptyName,

    #[error("directory entries are not supported: {0:?}")]
    DirectoryName(String),

    #[error("archive must contain at least one entry")]
    EmptyArchive,

    #[error("entry {name:?} declares {declared} bytes but its content holds {actual}")]
    SizeMismatch {
        name: String,
        declared: u64,
        actual: u64,
    },
}
