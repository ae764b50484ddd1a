use std::io;
use std::path::{Path, PathBuf};

/// Errors returned by every fallible engine operation.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Indexing already running: {0}")]
    AlreadyRunning(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Search engine is disabled")]
    Disabled,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, SearchError>;

impl SearchError {
    /// Maps an IO error raised while touching `path` to the matching error kind.
    pub fn from_io(error: io::Error, path: &Path) -> Self {
        match error.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.display().to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io(error),
        }
    }

    /// Returns true for errors that a single traversal step may recover from on retry.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::PermissionDenied(_) | Self::NotFound(_) => true,
            Self::Io(error) => matches!(
                error.kind(),
                io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_not_found_maps_to_not_found() {
        let error = io::Error::new(io::ErrorKind::NotFound, "gone");
        let mapped = SearchError::from_io(error, Path::new("/missing"));
        assert!(matches!(mapped, SearchError::NotFound(ref p) if p == "/missing"));
        assert!(mapped.is_transient());
    }

    #[test]
    fn io_permission_maps_to_permission_denied() {
        let error = io::Error::new(io::ErrorKind::PermissionDenied, "nope");
        let mapped = SearchError::from_io(error, Path::new("/locked"));
        assert!(matches!(mapped, SearchError::PermissionDenied(_)));
    }

    #[test]
    fn other_io_errors_are_kept() {
        let error = io::Error::new(io::ErrorKind::InvalidData, "bad");
        let mapped = SearchError::from_io(error, Path::new("/x"));
        assert!(matches!(mapped, SearchError::Io(_)));
        assert!(!mapped.is_transient());
    }
}
