//! Error taxonomy shared by every FileTrust operation.
//!
//! Each variant names the path it concerns so a host can report precisely
//! which file failed and why. `ErrorKind` is the flat, copyable view of the
//! taxonomy for callers that branch on the failure class.

use std::io;
use std::path::{Path, PathBuf};

/// Result type for FileTrust operations
pub type Result<T> = std::result::Result<T, TrustError>;

/// Failure class of a [`TrustError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    IsDirectory,
    Io,
    CorruptRecord,
    NoBaseline,
    DecryptionFailed,
    FileTooSmall,
    NoSignature,
    SignatureInvalid,
    VerificationFailed,
    InvalidArgument,
    Credential,
}

#[derive(Debug, thiserror::Error)]
pub enum TrustError {
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("operation requires a single file, found a directory: {}", .0.display())]
    IsDirectory(PathBuf),

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt record {}: {reason}", path.display())]
    CorruptRecord { path: PathBuf, reason: String },

    #[error("no baseline exists for path: {}", .0.display())]
    NoBaseline(PathBuf),

    #[error("decryption failed: {}", .0.display())]
    DecryptionFailed(PathBuf),

    #[error("file too small to be an encrypted container ({len} bytes): {}", path.display())]
    FileTooSmall { path: PathBuf, len: u64 },

    #[error("no signature found for {}", .0.display())]
    NoSignature(PathBuf),

    #[error("signature invalid for {}: {reason}", path.display())]
    SignatureInvalid { path: PathBuf, reason: String },

    #[error("post-deletion verification failed, path still resolves: {}", .0.display())]
    VerificationFailed(PathBuf),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("credential error: {0}")]
    Credential(String),
}

impl TrustError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::IsDirectory(_) => ErrorKind::IsDirectory,
            Self::Io { .. } => ErrorKind::Io,
            Self::CorruptRecord { .. } => ErrorKind::CorruptRecord,
            Self::NoBaseline(_) => ErrorKind::NoBaseline,
            Self::DecryptionFailed(_) => ErrorKind::DecryptionFailed,
            Self::FileTooSmall { .. } => ErrorKind::FileTooSmall,
            Self::NoSignature(_) => ErrorKind::NoSignature,
            Self::SignatureInvalid { .. } => ErrorKind::SignatureInvalid,
            Self::VerificationFailed(_) => ErrorKind::VerificationFailed,
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Credential(_) => ErrorKind::Credential,
        }
    }

    /// The path the failure concerns, when there is one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::NotFound(p)
            | Self::IsDirectory(p)
            | Self::NoBaseline(p)
            | Self::DecryptionFailed(p)
            | Self::NoSignature(p)
            | Self::VerificationFailed(p) => Some(p),
            Self::Io { path, .. }
            | Self::CorruptRecord { path, .. }
            | Self::FileTooSmall { path, .. }
            | Self::SignatureInvalid { path, .. } => Some(path),
            Self::InvalidArgument(_) | Self::Credential(_) => None,
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::CorruptRecord {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

/// Attach a path to `std::io` results.
pub(crate) trait IoResultExt<T> {
    fn at(self, path: &Path) -> Result<T>;
}

impl<T> IoResultExt<T> for io::Result<T> {
    fn at(self, path: &Path) -> Result<T> {
        self.map_err(|e| TrustError::io(path, e))
    }
}

/// Resolve `path` to an existing regular file, rejecting directories.
pub(crate) fn require_file(path: &Path) -> Result<std::fs::Metadata> {
    let metadata = std::fs::metadata(path).at(path)?;
    if metadata.is_dir() {
        return Err(TrustError::IsDirectory(path.to_path_buf()));
    }
    Ok(metadata)
}
