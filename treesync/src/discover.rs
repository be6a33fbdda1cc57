//! Path discovery across several remote roots.
//!
//! One traversal task per root feeds a single shared queue; a coordinator closes the queue once
//! every traversal has dropped its completion token. The caller drains the queue to the end even
//! after the first failure so that no traversal is left blocked on a send.
//!
//! The contract is all-or-nothing: a single failed entry anywhere turns the whole call into an
//! [`common::Error::Aggregate`] and the successfully discovered paths are discarded.

use futures::StreamExt;
use remote::{PathRecord, RemoteFs};
use tracing::instrument;

use crate::gather;

#[instrument(skip(remote, tx, cancel))]
async fn traverse_root(
    remote: &dyn RemoteFs,
    root: &std::path::Path,
    tx: &async_channel::Sender<PathRecord>,
    cancel: &tokio_util::sync::CancellationToken,
) {
    let failure = match remote.stat(root).await {
        Ok(metadata) if metadata.is_dir() => None,
        Ok(_) => Some(common::Error::NotADirectory {
            side: common::Side::Remote,
            path: root.to_path_buf(),
        }),
        Err(error) => Some(error),
    };
    if let Some(error) = failure {
        gather::send(tx, PathRecord::failed(root.to_path_buf(), error), cancel).await;
        return;
    }
    let mut listing = remote.list_recursive(root);
    while let Some(record) = tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        record = listing.next() => record,
    } {
        if !gather::send(tx, record, cancel).await {
            break;
        }
    }
    tracing::debug!("traversal finished");
}

/// Lists every path below each of `roots` (the roots themselves are not included).
///
/// Every path is returned once, even when roots overlap (`/www` and `/www/css`); the first
/// occurrence keeps its place.
///
/// Each failed record is handed to `on_error` as it arrives. If there was at least one, the call
/// fails with [`common::Error::Aggregate`] carrying the count and the first message. Fails with
/// [`common::Error::Cancelled`] if `cancel` fired before all roots were traversed.
#[instrument(skip(remote, cancel, on_error))]
pub async fn discover_paths<F>(
    remote: &std::sync::Arc<dyn RemoteFs>,
    roots: &[std::path::PathBuf],
    cancel: &tokio_util::sync::CancellationToken,
    mut on_error: F,
) -> common::Result<Vec<std::path::PathBuf>>
where
    F: FnMut(&common::Error),
{
    let (records_tx, records_rx) = gather::queue::<PathRecord>();
    let mut barrier = gather::Barrier::new();
    for root in roots {
        let done = barrier.worker();
        let remote = remote.clone();
        let root = root.clone();
        let tx = records_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _done = done;
            traverse_root(&*remote, &root, &tx, &cancel).await;
        });
    }
    let coordinator = barrier.close_when_done(move || {
        records_tx.close();
    });
    let mut paths = vec![];
    let mut seen = std::collections::HashSet::new();
    let mut error_count = 0;
    let mut first_error = None;
    while let Ok(record) = records_rx.recv().await {
        match record.error {
            Some(error) => {
                error_count += 1;
                on_error(&error);
                if first_error.is_none() {
                    first_error = Some(error.to_string());
                    paths.clear();
                }
            }
            None => {
                if error_count == 0 && seen.insert(record.path.clone()) {
                    paths.push(record.path);
                }
            }
        }
    }
    if let Err(error) = coordinator.await {
        tracing::error!("discovery coordinator failed: {}", &error);
    }
    if cancel.is_cancelled() {
        return Err(common::Error::Cancelled);
    }
    if let Some(first) = first_error {
        return Err(common::Error::Aggregate {
            count: error_count,
            first,
        });
    }
    common::get_progress()
        .items_discovered
        .add(paths.len() as u64);
    Ok(paths)
}
