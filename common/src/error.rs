//! Error taxonomy shared by the discovery, synchronization and backup engines.
//!
//! # Logging Convention
//! The Display implementation carries the path and the underlying cause, so errors can be
//! logged directly:
//! ```ignore
//! tracing::error!("sync failed: {}", &error);
//! ```

/// Which side of a transfer a path lives on.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("'{side}:{}' not found", path.display())]
    NotFound {
        side: Side,
        path: std::path::PathBuf,
    },
    #[error("'{side}:{}' is not a directory", path.display())]
    NotADirectory {
        side: Side,
        path: std::path::PathBuf,
    },
    #[error("permission denied on '{side}:{}'", path.display())]
    PermissionDenied {
        side: Side,
        path: std::path::PathBuf,
    },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
    /// Summary of every failure seen by one call, built after all producers finished.
    #[error("encountered {count} errors (first: {first})")]
    Aggregate { count: usize, first: String },
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Maps an I/O error onto the taxonomy, keeping `context` for anything that isn't a
    /// not-found, not-a-directory or permission problem.
    #[must_use]
    pub fn from_io(
        side: Side,
        path: &std::path::Path,
        context: &str,
        source: std::io::Error,
    ) -> Self {
        let path = path.to_path_buf();
        match source.kind() {
            std::io::ErrorKind::NotFound => Error::NotFound { side, path },
            std::io::ErrorKind::NotADirectory => Error::NotADirectory { side, path },
            std::io::ErrorKind::PermissionDenied => Error::PermissionDenied { side, path },
            _ => Error::Io {
                context: format!("{context} '{side}:{}'", path.display()),
                source,
            },
        }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_kinds_map_onto_taxonomy() {
        let path = std::path::Path::new("/srv/www");
        let err = Error::from_io(
            Side::Remote,
            path,
            "could not stat",
            std::io::Error::from(std::io::ErrorKind::NotFound),
        );
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "'remote:/srv/www' not found");
        let err = Error::from_io(
            Side::Local,
            path,
            "could not open",
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        assert!(matches!(
            err,
            Error::PermissionDenied {
                side: Side::Local,
                ..
            }
        ));
        let err = Error::from_io(
            Side::Local,
            path,
            "could not open",
            std::io::Error::other("disk on fire"),
        );
        assert_eq!(
            err.to_string(),
            "could not open 'local:/srv/www': disk on fire"
        );
    }

    #[test]
    fn aggregate_display() {
        let err = Error::Aggregate {
            count: 3,
            first: "'remote:/missing' not found".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "encountered 3 errors (first: 'remote:/missing' not found)"
        );
    }
}
