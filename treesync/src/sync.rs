//! Uploading local folder trees into remote folders.
//!
//! Every mapping gets one walker and one copier task. All walkers feed one shared discovery
//! queue and all copiers drain it, so a copier may well upload an item found by another
//! mapping's walker; each record therefore carries the roots it has to be rebased between.
//!
//! Two coordinators own the closing of shared queues:
//! - once every walker is done, the discovery queue and the `discovered` stream are closed,
//! - once every copier is done, the `errors` and `copied` streams are closed.
//!
//! Failures never stop the run. Each one is sent on the `errors` stream and the remaining items
//! keep going; the caller decides whether to abort by cancelling the token.

use futures::StreamExt;
use remote::{LocalFs, RemoteFs};
use tracing::instrument;

use crate::gather;
use crate::mapping::FolderMapping;
use crate::transfer::{self, TransferOutcome};

/// Canonical local root of a mapping and the remote folder it is uploaded into.
#[derive(Debug)]
struct Roots {
    local: std::path::PathBuf,
    remote: std::path::PathBuf,
}

impl Roots {
    fn relative<'a>(&self, path: &'a std::path::Path) -> common::Result<&'a std::path::Path> {
        path.strip_prefix(&self.local)
            .map_err(|_| common::Error::Io {
                context: format!(
                    "'local:{}' is outside of '{}'",
                    path.display(),
                    self.local.display()
                ),
                source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
            })
    }

    fn destination(&self, path: &std::path::Path) -> common::Result<std::path::PathBuf> {
        Ok(self.remote.join(self.relative(path)?))
    }
}

#[derive(Debug)]
enum Discovery {
    Item {
        roots: std::sync::Arc<Roots>,
        path: std::path::PathBuf,
    },
    Failed(common::Error),
}

/// Result streams of one synchronization run.
///
/// All three are closed once the run is over. Streams the caller is not interested in can be
/// dropped; nothing will block on them.
#[derive(Debug)]
pub struct SyncStreams {
    /// One entry per failed item or inaccessible mapping.
    pub errors: async_channel::Receiver<common::Error>,
    /// One signal per item found by a walker.
    pub discovered: async_channel::Receiver<()>,
    /// One signal per item uploaded successfully.
    pub copied: async_channel::Receiver<()>,
}

/// Counts collected by [`SyncStreams::drain`].
#[derive(Debug, Default)]
pub struct SyncReport {
    pub discovered: usize,
    pub copied: usize,
    pub errors: Vec<common::Error>,
}

impl SyncStreams {
    /// Reads all three streams to the end.
    pub async fn drain(self) -> SyncReport {
        let SyncStreams {
            errors,
            discovered,
            copied,
        } = self;
        let (discovered, copied, errors) = tokio::join!(
            discovered.count(),
            copied.count(),
            errors.collect::<Vec<_>>()
        );
        SyncReport {
            discovered,
            copied,
            errors,
        }
    }
}

#[instrument(skip(local, tx, discovered_tx, cancel))]
async fn walk_mapping(
    local: &dyn LocalFs,
    mapping: &FolderMapping,
    tx: &async_channel::Sender<Discovery>,
    discovered_tx: &async_channel::Sender<()>,
    cancel: &tokio_util::sync::CancellationToken,
) {
    let roots = match local.resolve_symlinks(&mapping.local).await {
        Ok(local_root) => std::sync::Arc::new(Roots {
            local: local_root,
            remote: mapping.remote.clone(),
        }),
        Err(error) => {
            tracing::debug!("mapping root is inaccessible: {}", &error);
            gather::send(tx, Discovery::Failed(error), cancel).await;
            return;
        }
    };
    let mut walk = local.walk_recursive(&roots.local);
    let progress = common::get_progress();
    while let Some(record) = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        record = walk.next() => record,
    } {
        let discovery = match record.into_result() {
            Ok(path) => {
                match roots.relative(&path) {
                    Ok(relative) if !mapping.covers(relative) => continue,
                    Ok(_) => {}
                    Err(error) => {
                        gather::send(tx, Discovery::Failed(error), cancel).await;
                        continue;
                    }
                }
                Discovery::Item {
                    roots: roots.clone(),
                    path,
                }
            }
            Err(error) => Discovery::Failed(error),
        };
        let is_item = matches!(discovery, Discovery::Item { .. });
        if !gather::send(tx, discovery, cancel).await {
            break;
        }
        if is_item {
            progress.items_discovered.inc();
            // the caller may have dropped the stream, that's fine
            gather::send(discovered_tx, (), cancel).await;
        }
    }
    tracing::debug!("walk finished");
}

async fn copy_one(
    remote: &dyn RemoteFs,
    local: &dyn LocalFs,
    discovery: Discovery,
) -> TransferOutcome {
    match discovery {
        Discovery::Failed(error) => TransferOutcome::Failed(error),
        Discovery::Item { roots, path } => match roots.destination(&path) {
            Ok(destination) => transfer::put_file(remote, local, &destination, &path)
                .await
                .into(),
            Err(error) => TransferOutcome::Failed(error),
        },
    }
}

#[instrument(skip_all)]
async fn copy_items(
    remote: &dyn RemoteFs,
    local: &dyn LocalFs,
    rx: &async_channel::Receiver<Discovery>,
    errors_tx: &async_channel::Sender<common::Error>,
    copied_tx: &async_channel::Sender<()>,
    cancel: &tokio_util::sync::CancellationToken,
) {
    let progress = common::get_progress();
    while let Some(discovery) = gather::recv(rx, cancel).await {
        match copy_one(remote, local, discovery).await {
            TransferOutcome::Copied(transferred) => {
                tracing::trace!("copied: {:?}", transferred);
                gather::send(copied_tx, (), cancel).await;
            }
            TransferOutcome::Failed(error) => {
                progress.items_failed.inc();
                tracing::debug!("copy failed: {}", &error);
                gather::send(errors_tx, error, cancel).await;
            }
        }
    }
}

/// Starts uploading every mapping and returns the result streams right away.
///
/// Must be called from within a tokio runtime. When `cancel` fires, all walkers and copiers
/// stop at their next queue operation (an upload already in flight is finished first) and the
/// streams get closed.
#[instrument(skip(remote, local, cancel))]
pub fn synchronize(
    remote: &std::sync::Arc<dyn RemoteFs>,
    local: &std::sync::Arc<dyn LocalFs>,
    mappings: &[FolderMapping],
    cancel: &tokio_util::sync::CancellationToken,
) -> SyncStreams {
    let (discovery_tx, discovery_rx) = gather::queue::<Discovery>();
    let (errors_tx, errors_rx) = gather::queue();
    let (discovered_tx, discovered_rx) = gather::queue();
    let (copied_tx, copied_rx) = gather::queue();
    let mut walkers = gather::Barrier::new();
    let mut copiers = gather::Barrier::new();
    for mapping in mappings {
        {
            let done = walkers.worker();
            let local = local.clone();
            let mapping = mapping.clone();
            let tx = discovery_tx.clone();
            let discovered_tx = discovered_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _done = done;
                walk_mapping(&*local, &mapping, &tx, &discovered_tx, &cancel).await;
            });
        }
        {
            let done = copiers.worker();
            let remote = remote.clone();
            let local = local.clone();
            let rx = discovery_rx.clone();
            let errors_tx = errors_tx.clone();
            let copied_tx = copied_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                let _done = done;
                copy_items(&*remote, &*local, &rx, &errors_tx, &copied_tx, &cancel).await;
            });
        }
    }
    walkers.close_when_done(move || {
        discovery_tx.close();
        discovered_tx.close();
    });
    copiers.close_when_done(move || {
        errors_tx.close();
        copied_tx.close();
    });
    SyncStreams {
        errors: errors_rx,
        discovered: discovered_rx,
        copied: copied_rx,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn destination_is_rebased() -> anyhow::Result<()> {
        let roots = Roots {
            local: "/home/me/site".into(),
            remote: "/var/www".into(),
        };
        assert_eq!(
            roots.destination(std::path::Path::new("/home/me/site/css/a.css"))?,
            std::path::PathBuf::from("/var/www/css/a.css")
        );
        assert!(roots
            .destination(std::path::Path::new("/home/me/other/a.css"))
            .is_err());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn no_mappings_closes_everything() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let remote: std::sync::Arc<dyn RemoteFs> =
            std::sync::Arc::new(remote::DirRemote::new(tmp_dir.path()));
        let local: std::sync::Arc<dyn LocalFs> = std::sync::Arc::new(remote::OsLocal);
        let cancel = tokio_util::sync::CancellationToken::new();
        let report = synchronize(&remote, &local, &[], &cancel).drain().await;
        assert_eq!(report.discovered, 0);
        assert_eq!(report.copied, 0);
        assert!(report.errors.is_empty());
        Ok(())
    }

    #[tokio::test]
    #[traced_test]
    async fn scope_limits_upload() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let src = tmp_dir.path().join("src");
        std::fs::create_dir_all(src.join("public"))?;
        std::fs::create_dir_all(src.join("private"))?;
        std::fs::write(src.join("public").join("a.txt"), "a")?;
        std::fs::write(src.join("private").join("b.txt"), "b")?;
        std::fs::create_dir(tmp_dir.path().join("dst"))?;
        let remote: std::sync::Arc<dyn RemoteFs> =
            std::sync::Arc::new(remote::DirRemote::new(tmp_dir.path().join("dst")));
        let local: std::sync::Arc<dyn LocalFs> = std::sync::Arc::new(remote::OsLocal);
        let cancel = tokio_util::sync::CancellationToken::new();
        let mapping = FolderMapping::new(&src, "/site").with_scope("public");
        let report = synchronize(&remote, &local, &[mapping], &cancel)
            .drain()
            .await;
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.discovered, 2);
        assert_eq!(report.copied, 2);
        assert_eq!(
            std::fs::read_to_string(tmp_dir.path().join("dst/site/public/a.txt"))?,
            "a"
        );
        assert!(!tmp_dir.path().join("dst/site/private").exists());
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread")]
    #[traced_test]
    async fn mappings_share_one_capability_pair() -> anyhow::Result<()> {
        let tmp_dir = tempfile::tempdir()?;
        let mut mappings = vec![];
        for name in ["one", "two", "three"] {
            let src = tmp_dir.path().join(name);
            std::fs::create_dir_all(src.join("sub"))?;
            std::fs::write(src.join("sub").join("file.txt"), name)?;
            mappings.push(FolderMapping::new(&src, format!("/{name}")));
        }
        std::fs::create_dir(tmp_dir.path().join("dst"))?;
        let remote: std::sync::Arc<dyn RemoteFs> =
            std::sync::Arc::new(remote::DirRemote::new(tmp_dir.path().join("dst")));
        let local: std::sync::Arc<dyn LocalFs> = std::sync::Arc::new(remote::OsLocal);
        let cancel = tokio_util::sync::CancellationToken::new();
        let report = synchronize(&remote, &local, &mappings, &cancel)
            .drain()
            .await;
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.discovered, 6);
        assert_eq!(report.copied, 6);
        // the caller's handles stay usable for a second run
        let report = synchronize(&remote, &local, &mappings[..1], &cancel)
            .drain()
            .await;
        assert!(report.errors.is_empty(), "{:?}", report.errors);
        assert_eq!(report.copied, 2);
        for name in ["one", "two", "three"] {
            assert_eq!(
                std::fs::read_to_string(tmp_dir.path().join("dst").join(name).join("sub/file.txt"))?,
                name
            );
        }
        Ok(())
    }
}
