//! Single-item transfers between the local host and the remote.

use remote::{BoxedRead, BoxedWrite, FileKind, LocalFs, RemoteFs};
use tokio::io::AsyncWriteExt;
use tracing::instrument;

/// Mode given to folders created by a transfer.
pub const DIR_MODE: u32 = 0o755;
/// Mode given to remote files after upload.
pub const FILE_MODE: u32 = 0o644;

/// What a successful single-item transfer did.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Transferred {
    /// A folder (and `created` missing ancestors including itself) now exists.
    Directory { created: usize },
    File { bytes: u64 },
}

/// Result of copying one discovered item, as passed from a copier to the result streams.
#[derive(Debug)]
pub enum TransferOutcome {
    Copied(Transferred),
    Failed(common::Error),
}

impl From<common::Result<Transferred>> for TransferOutcome {
    fn from(result: common::Result<Transferred>) -> Self {
        match result {
            Ok(transferred) => TransferOutcome::Copied(transferred),
            Err(error) => TransferOutcome::Failed(error),
        }
    }
}

async fn stream_bytes(
    mut reader: BoxedRead,
    mut writer: BoxedWrite,
    context: impl Fn() -> String,
) -> common::Result<u64> {
    let bytes = tokio::io::copy(&mut reader, &mut writer)
        .await
        .map_err(|source| common::Error::Io {
            context: context(),
            source,
        })?;
    writer
        .shutdown()
        .await
        .map_err(|source| common::Error::Io {
            context: context(),
            source,
        })?;
    Ok(bytes)
}

/// Makes sure the remote folder `path` exists, creating it with [`DIR_MODE`] when missing.
///
/// Returns `true` if this call created it. Losing a creation race against another task is not
/// an error.
#[instrument(skip(remote))]
pub async fn create_dir(remote: &dyn RemoteFs, path: &std::path::Path) -> common::Result<bool> {
    match remote.stat(path).await {
        Ok(metadata) => {
            return match metadata.kind {
                FileKind::Dir | FileKind::Symlink => Ok(false),
                FileKind::File | FileKind::Other => Err(common::Error::NotADirectory {
                    side: common::Side::Remote,
                    path: path.to_path_buf(),
                }),
            };
        }
        Err(error) if error.is_not_found() => {}
        Err(error) => return Err(error),
    }
    if let Err(error) = remote.mkdir(path).await {
        return match remote.stat(path).await {
            Ok(metadata) if metadata.is_dir() => {
                tracing::debug!("folder appeared concurrently");
                Ok(false)
            }
            _ => Err(error),
        };
    }
    remote.chmod(path, DIR_MODE).await?;
    common::get_progress().directories_created.inc();
    Ok(true)
}

/// Creates every missing folder along `path`, outermost first.
#[instrument(skip(remote))]
pub async fn create_dir_hierarchy(
    remote: &dyn RemoteFs,
    path: &std::path::Path,
) -> common::Result<usize> {
    let mut current = std::path::PathBuf::new();
    let mut created = 0;
    for component in path.components() {
        current.push(component);
        if !matches!(component, std::path::Component::Normal(_)) {
            continue;
        }
        if create_dir(remote, &current).await? {
            created += 1;
        }
    }
    Ok(created)
}

/// Uploads one local item. Folders become remote folder hierarchies, files are streamed and
/// then given [`FILE_MODE`]. Missing remote parents are created on demand.
#[instrument(skip(remote, local))]
pub async fn put_file(
    remote: &dyn RemoteFs,
    local: &dyn LocalFs,
    remote_path: &std::path::Path,
    local_path: &std::path::Path,
) -> common::Result<Transferred> {
    let metadata = local.stat(local_path).await?;
    if metadata.is_dir() {
        let created = create_dir_hierarchy(remote, remote_path).await?;
        return Ok(Transferred::Directory { created });
    }
    let reader = local.open(local_path).await?;
    let writer = match remote.create(remote_path).await {
        Ok(writer) => writer,
        Err(error) if error.is_not_found() => {
            let Some(parent) = remote_path.parent() else {
                return Err(error);
            };
            tracing::debug!("creating missing parent {:?}", parent);
            create_dir_hierarchy(remote, parent).await?;
            remote.create(remote_path).await?
        }
        Err(error) => return Err(error),
    };
    let bytes = stream_bytes(reader, writer, || {
        format!(
            "could not copy data from 'local:{}' to 'remote:{}'",
            local_path.display(),
            remote_path.display()
        )
    })
    .await?;
    remote.chmod(remote_path, FILE_MODE).await?;
    let progress = common::get_progress();
    progress.files_copied.inc();
    progress.bytes_copied.add(bytes);
    Ok(Transferred::File { bytes })
}

/// Downloads one remote item. Folders become a single local folder with [`DIR_MODE`], files are
/// streamed into a new local file.
#[instrument(skip(remote, local))]
pub async fn get_file(
    remote: &dyn RemoteFs,
    local: &dyn LocalFs,
    local_path: &std::path::Path,
    remote_path: &std::path::Path,
) -> common::Result<Transferred> {
    let metadata = remote.stat(remote_path).await?;
    if metadata.is_dir() {
        local.mkdir(local_path, DIR_MODE).await?;
        common::get_progress().directories_created.inc();
        return Ok(Transferred::Directory { created: 1 });
    }
    let reader = remote.open(remote_path).await?;
    let writer = local.create(local_path).await?;
    let bytes = stream_bytes(reader, writer, || {
        format!(
            "could not copy 'remote:{}' to 'local:{}'",
            remote_path.display(),
            local_path.display()
        )
    })
    .await?;
    let progress = common::get_progress();
    progress.files_copied.inc();
    progress.bytes_copied.add(bytes);
    Ok(Transferred::File { bytes })
}
