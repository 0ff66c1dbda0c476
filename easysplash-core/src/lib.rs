//! EasySplash Core Library
//!
//! This library provides the ZIP archive reader that boot animations are
//! packaged in, the `desc.txt` animation description, and the playback
//! position arithmetic shared by the renderer and the player.

pub mod animation;
pub mod archive;
pub mod position;

#[cfg(any(test, feature = "test-util"))]
pub mod testutil;

pub use animation::{Animation, Part};
pub use archive::{Archive, ArchiveEntry, EntryId};
pub use position::Position;

/// Result type for easysplash-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for easysplash-core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive is too small ({0} bytes)")]
    ArchiveTooSmall(u64),

    #[error("Could not find the end of central directory record")]
    EndOfCentralDirectoryNotFound,

    #[error("Corrupt central directory: {0}")]
    CorruptCentralDirectory(String),

    #[error("Could not inflate entry '{name}': {reason}")]
    Inflate { name: String, reason: String },

    #[error("Entry '{name}' decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch {
        name: String,
        expected: u64,
        actual: u64,
    },

    #[error("Archive entry not found: {0}")]
    EntryNotFound(String),

    #[error("Animation has no desc.txt")]
    MissingDescription,

    #[error("Invalid animation description: {0}")]
    InvalidDescription(String),

    #[error("Invalid animation: {0}")]
    InvalidAnimation(String),
}
