use std::os::unix::fs::PermissionsExt;

use tracing::instrument;

use crate::fs::{BoxedRead, BoxedWrite, Metadata, RecordStream, RemoteFs};

/// A remote filesystem exposed through a local directory, e.g. the mount point of a network
/// share.
///
/// Remote paths are rebased under `base`: `/srv/www` and `srv/www` both resolve to
/// `<base>/srv/www`. `..` components never climb above `base`.
#[derive(Debug, Clone)]
pub struct DirRemote {
    base: std::path::PathBuf,
}

impl DirRemote {
    #[must_use]
    pub fn new(base: impl Into<std::path::PathBuf>) -> Self {
        Self { base: base.into() }
    }

    /// Storage location of a remote path.
    #[must_use]
    pub fn resolve(&self, path: &std::path::Path) -> std::path::PathBuf {
        let mut rel = std::path::PathBuf::new();
        for component in path.components() {
            match component {
                std::path::Component::Normal(name) => rel.push(name),
                std::path::Component::ParentDir => {
                    rel.pop();
                }
                std::path::Component::RootDir
                | std::path::Component::CurDir
                | std::path::Component::Prefix(_) => {}
            }
        }
        if rel.as_os_str().is_empty() {
            return self.base.clone();
        }
        self.base.join(rel)
    }

    fn error(path: &std::path::Path, context: &str, error: std::io::Error) -> common::Error {
        common::Error::from_io(common::Side::Remote, path, context, error)
    }
}

#[async_trait::async_trait]
impl RemoteFs for DirRemote {
    async fn stat(&self, path: &std::path::Path) -> common::Result<Metadata> {
        let metadata = tokio::fs::symlink_metadata(self.resolve(path))
            .await
            .map_err(|err| Self::error(path, "could not stat", err))?;
        Ok(Metadata::from(&metadata))
    }

    async fn stat_target(&self, path: &std::path::Path) -> common::Result<Metadata> {
        let metadata = tokio::fs::metadata(self.resolve(path))
            .await
            .map_err(|err| Self::error(path, "could not stat", err))?;
        Ok(Metadata::from(&metadata))
    }

    #[instrument(skip(self))]
    fn list_recursive(&self, root: &std::path::Path) -> RecordStream {
        crate::walk::walk(common::Side::Remote, self.resolve(root), root.to_path_buf())
    }

    async fn open(&self, path: &std::path::Path) -> common::Result<BoxedRead> {
        let file = tokio::fs::File::open(self.resolve(path))
            .await
            .map_err(|err| Self::error(path, "could not open file", err))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &std::path::Path) -> common::Result<BoxedWrite> {
        let file = tokio::fs::File::create(self.resolve(path))
            .await
            .map_err(|err| Self::error(path, "could not create file", err))?;
        Ok(Box::new(file))
    }

    async fn mkdir(&self, path: &std::path::Path) -> common::Result<()> {
        tokio::fs::create_dir(self.resolve(path))
            .await
            .map_err(|err| Self::error(path, "could not create folder", err))
    }

    async fn chmod(&self, path: &std::path::Path, mode: u32) -> common::Result<()> {
        tokio::fs::set_permissions(
            self.resolve(path),
            std::fs::Permissions::from_mode(mode),
        )
        .await
        .map_err(|err| Self::error(path, "could not set permissions on", err))
    }
}
