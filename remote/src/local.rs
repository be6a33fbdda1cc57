use tracing::instrument;

use crate::fs::{BoxedRead, BoxedWrite, LocalFs, Metadata, RecordStream};

/// The host filesystem, accessed through `tokio::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsLocal;

fn error(path: &std::path::Path, context: &str, error: std::io::Error) -> common::Error {
    common::Error::from_io(common::Side::Local, path, context, error)
}

#[async_trait::async_trait]
impl LocalFs for OsLocal {
    async fn stat(&self, path: &std::path::Path) -> common::Result<Metadata> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|err| error(path, "could not stat", err))?;
        Ok(Metadata::from(&metadata))
    }

    async fn resolve_symlinks(
        &self,
        path: &std::path::Path,
    ) -> common::Result<std::path::PathBuf> {
        tokio::fs::canonicalize(path)
            .await
            .map_err(|err| error(path, "could not resolve", err))
    }

    #[instrument(skip(self))]
    fn walk_recursive(&self, root: &std::path::Path) -> RecordStream {
        crate::walk::walk(common::Side::Local, root.to_path_buf(), root.to_path_buf())
    }

    async fn open(&self, path: &std::path::Path) -> common::Result<BoxedRead> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|err| error(path, "could not open file", err))?;
        Ok(Box::new(file))
    }

    async fn create(&self, path: &std::path::Path) -> common::Result<BoxedWrite> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|err| error(path, "could not create file", err))?;
        Ok(Box::new(file))
    }

    async fn mkdir(&self, path: &std::path::Path, mode: u32) -> common::Result<()> {
        tokio::fs::DirBuilder::new()
            .mode(mode)
            .create(path)
            .await
            .map_err(|err| error(path, "could not create folder", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tracing_test::traced_test;

    #[tokio::test]
    #[traced_test]
    async fn resolve_symlinked_root() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let real = tmp_dir.path().join("real");
        std::fs::create_dir(&real)?;
        std::os::unix::fs::symlink(&real, tmp_dir.path().join("alias"))?;
        let resolved = OsLocal
            .resolve_symlinks(&tmp_dir.path().join("alias"))
            .await?;
        assert_eq!(resolved, std::fs::canonicalize(&real)?);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn mkdir_applies_mode() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let dir = tmp_dir.path().join("made");
        OsLocal.mkdir(&dir, 0o700).await?;
        let mode = std::fs::metadata(&dir)?.permissions().mode() & 0o777;
        assert_eq!(mode, 0o700);
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn stat_reports_local_side() {
        match OsLocal
            .stat(std::path::Path::new("/definitely/not/here"))
            .await
        {
            Err(common::Error::NotFound { side, .. }) => assert_eq!(side, common::Side::Local),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
