use std::os::unix::fs::PermissionsExt;

/// Boxed read handle returned by `open` on either side.
pub type BoxedRead = Box<dyn tokio::io::AsyncRead + Unpin + Send>;
/// Boxed write handle returned by `create` on either side.
pub type BoxedWrite = Box<dyn tokio::io::AsyncWrite + Unpin + Send>;
/// Depth-first stream of traversal output.
pub type RecordStream = futures::stream::BoxStream<'static, PathRecord>;

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum FileKind {
    File,
    Dir,
    Symlink,
    Other,
}

#[derive(Clone, Debug)]
pub struct Metadata {
    pub kind: FileKind,
    pub size: u64,
    /// permission bits
    pub mode: u32,
    pub mtime: Option<std::time::SystemTime>,
}

impl Metadata {
    #[must_use]
    pub fn is_dir(&self) -> bool {
        self.kind == FileKind::Dir
    }

    #[must_use]
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }
}

impl From<&std::fs::Metadata> for Metadata {
    fn from(metadata: &std::fs::Metadata) -> Self {
        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::Symlink
        } else if file_type.is_dir() {
            FileKind::Dir
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Other
        };
        Self {
            kind,
            size: metadata.len(),
            mode: metadata.permissions().mode() & 0o7777,
            mtime: metadata.modified().ok(),
        }
    }
}

/// One discovered filesystem entry, or one traversal failure in place of it.
#[derive(Debug)]
pub struct PathRecord {
    pub path: std::path::PathBuf,
    pub error: Option<common::Error>,
}

impl PathRecord {
    #[must_use]
    pub fn found(path: std::path::PathBuf) -> Self {
        Self { path, error: None }
    }

    #[must_use]
    pub fn failed(path: std::path::PathBuf, error: common::Error) -> Self {
        Self {
            path,
            error: Some(error),
        }
    }

    pub fn into_result(self) -> common::Result<std::path::PathBuf> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.path),
        }
    }
}

/// Operations the engines need from the remote end of a session.
///
/// Paths are remote paths; implementations decide how they map onto storage.
#[async_trait::async_trait]
pub trait RemoteFs: Send + Sync + std::fmt::Debug {
    /// Metadata of `path` itself, symlinks are not followed.
    async fn stat(&self, path: &std::path::Path) -> common::Result<Metadata>;
    /// Metadata of whatever `path` points at, symlinks are followed the way [`RemoteFs::open`]
    /// follows them.
    async fn stat_target(&self, path: &std::path::Path) -> common::Result<Metadata>;
    /// Every descendant of `root` (excluding `root`) in depth-first order. Per-entry failures
    /// are yielded as error records and the listing carries on.
    fn list_recursive(&self, root: &std::path::Path) -> RecordStream;
    async fn open(&self, path: &std::path::Path) -> common::Result<BoxedRead>;
    /// Creates or truncates a file.
    async fn create(&self, path: &std::path::Path) -> common::Result<BoxedWrite>;
    async fn mkdir(&self, path: &std::path::Path) -> common::Result<()>;
    async fn chmod(&self, path: &std::path::Path, mode: u32) -> common::Result<()>;
}

/// Operations the engines need from the local host.
#[async_trait::async_trait]
pub trait LocalFs: Send + Sync + std::fmt::Debug {
    /// Metadata of `path`, following symlinks.
    async fn stat(&self, path: &std::path::Path) -> common::Result<Metadata>;
    async fn resolve_symlinks(&self, path: &std::path::Path)
    -> common::Result<std::path::PathBuf>;
    /// Same contract as [`RemoteFs::list_recursive`].
    fn walk_recursive(&self, root: &std::path::Path) -> RecordStream;
    async fn open(&self, path: &std::path::Path) -> common::Result<BoxedRead>;
    async fn create(&self, path: &std::path::Path) -> common::Result<BoxedWrite>;
    async fn mkdir(&self, path: &std::path::Path, mode: u32) -> common::Result<()>;
}
