//! Backing up remote files into a local tar.gz archive.
//!
//! A reader task fetches the remote files one by one and hands them to a writer task which
//! appends them to the archive on the blocking pool. Both report on the same `saved` and
//! `errors` streams, closed by a coordinator once both are finished.

use flate2::Compression;
use flate2::write::GzEncoder;
use remote::{FileKind, RemoteFs};
use tracing::instrument;

use crate::gather;

type ArchiveBuilder = tar::Builder<GzEncoder<std::io::BufWriter<std::fs::File>>>;

#[derive(Clone, Debug, Default)]
pub struct BackupOptions {
    /// Prefixes removed from remote paths (in order) to form archive entry names.
    pub strip_prefixes: Vec<std::path::PathBuf>,
}

/// Result streams of one backup run.
#[derive(Debug)]
pub struct BackupStreams {
    /// One signal per requested file, whether it was archived or not.
    pub saved: async_channel::Receiver<()>,
    pub errors: async_channel::Receiver<common::Error>,
    /// Resolves to the archive path once the archive is finalised.
    pub archive: tokio::task::JoinHandle<common::Result<std::path::PathBuf>>,
}

/// One requested file on its way to the archive. File contents stay on the remote until the
/// writer copies them into the archive.
struct Entry {
    source: std::path::PathBuf,
    name: std::path::PathBuf,
    metadata: remote::Metadata,
    contents: Option<tokio_util::io::SyncIoBridge<remote::BoxedRead>>,
}

/// Yields exactly `remaining` bytes: a source that grew is cut off, one that shrank is padded
/// with zeros so the entry still matches its header.
struct SizedReader<R> {
    inner: R,
    remaining: u64,
    padded: bool,
}

impl<R> SizedReader<R> {
    fn new(inner: R, size: u64) -> Self {
        Self {
            inner,
            remaining: size,
            padded: false,
        }
    }
}

impl<R: std::io::Read> std::io::Read for SizedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = usize::try_from(self.remaining).map_or(buf.len(), |left| buf.len().min(left));
        let buf = &mut buf[..max];
        let mut read = if self.padded {
            0
        } else {
            self.inner.read(buf)?
        };
        if read == 0 {
            self.padded = true;
            buf.fill(0);
            read = buf.len();
        }
        self.remaining -= read as u64;
        Ok(read)
    }
}

/// File name of an archive started at `now`, e.g. `20240305-070809.tar.gz`.
#[must_use]
pub fn archive_name(now: chrono::DateTime<chrono::Utc>) -> String {
    now.format("%Y%m%d-%H%M%S.tar.gz").to_string()
}

fn entry_name(
    path: &std::path::Path,
    strip_prefixes: &[std::path::PathBuf],
) -> common::Result<std::path::PathBuf> {
    let mut stripped = path;
    for prefix in strip_prefixes {
        if let Ok(rest) = stripped.strip_prefix(prefix) {
            stripped = rest;
        }
    }
    let name: std::path::PathBuf = stripped
        .components()
        .filter(|component| matches!(component, std::path::Component::Normal(_)))
        .collect();
    if name.as_os_str().is_empty() {
        return Err(common::Error::Io {
            context: format!("no archive entry name left for 'remote:{}'", path.display()),
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        });
    }
    Ok(name)
}

async fn read_entry(
    remote: &dyn RemoteFs,
    path: &std::path::Path,
    options: &BackupOptions,
) -> common::Result<Entry> {
    let name = entry_name(path, &options.strip_prefixes)?;
    let mut metadata = remote.stat(path).await?;
    if metadata.kind == FileKind::Symlink {
        // archived as whatever it points at
        metadata = remote.stat_target(path).await?;
    }
    let contents = if metadata.is_dir() {
        None
    } else if metadata.is_file() {
        let reader = remote.open(path).await?;
        Some(tokio_util::io::SyncIoBridge::new(reader))
    } else {
        return Err(common::Error::Io {
            context: format!("cannot archive special file 'remote:{}'", path.display()),
            source: std::io::Error::from(std::io::ErrorKind::InvalidInput),
        });
    };
    Ok(Entry {
        source: path.to_path_buf(),
        name,
        metadata,
        contents,
    })
}

/// Runs on the blocking pool: the remote reader is drained synchronously into the archive.
fn append_entry(builder: &mut ArchiveBuilder, entry: Entry) -> common::Result<()> {
    let Entry {
        source,
        name,
        metadata,
        contents,
    } = entry;
    let context = |error: std::io::Error| common::Error::Io {
        context: format!(
            "could not archive 'remote:{}' as {:?}",
            source.display(),
            name
        ),
        source: error,
    };
    let mut header = tar::Header::new_gnu();
    header.set_mode(metadata.mode);
    if let Some(since_epoch) = metadata
        .mtime
        .and_then(|mtime| mtime.duration_since(std::time::UNIX_EPOCH).ok())
    {
        header.set_mtime(since_epoch.as_secs());
    }
    let Some(reader) = contents else {
        header.set_entry_type(tar::EntryType::Directory);
        header.set_size(0);
        // sets the (possibly long) name and the checksum
        return builder
            .append_data(&mut header, &name, std::io::empty())
            .map_err(context);
    };
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(metadata.size);
    let mut data = SizedReader::new(reader, metadata.size);
    builder
        .append_data(&mut header, &name, &mut data)
        .map_err(context)?;
    if data.padded {
        return Err(context(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "file shrank while it was archived",
        )));
    }
    Ok(())
}

fn finish_archive(builder: ArchiveBuilder, path: &std::path::Path) -> common::Result<()> {
    let context = |source: std::io::Error| common::Error::Io {
        context: format!("could not finalise archive 'local:{}'", path.display()),
        source,
    };
    let encoder = builder.into_inner().map_err(context)?;
    let writer = encoder.finish().map_err(context)?;
    let file = writer
        .into_inner()
        .map_err(|error| context(error.into_error()))?;
    file.sync_all().map_err(context)
}

async fn blocking<T, F>(func: F) -> common::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(func)
        .await
        .map_err(|error| common::Error::Io {
            context: "archive writer task failed".to_string(),
            source: std::io::Error::other(error),
        })
}

#[instrument(skip_all)]
async fn read_files(
    remote: &dyn RemoteFs,
    files: &[std::path::PathBuf],
    options: &BackupOptions,
    entries_tx: &async_channel::Sender<Entry>,
    saved_tx: &async_channel::Sender<()>,
    errors_tx: &async_channel::Sender<common::Error>,
    cancel: &tokio_util::sync::CancellationToken,
) {
    for path in files {
        if cancel.is_cancelled() {
            break;
        }
        match read_entry(remote, path, options).await {
            Ok(entry) => {
                if !gather::send(entries_tx, entry, cancel).await {
                    break;
                }
            }
            Err(error) => {
                tracing::debug!("could not fetch {:?}: {}", path, &error);
                common::get_progress().items_failed.inc();
                gather::send(errors_tx, error, cancel).await;
                gather::send(saved_tx, (), cancel).await;
            }
        }
    }
}

#[instrument(skip_all, fields(archive = ?archive_path))]
async fn write_entries(
    mut builder: ArchiveBuilder,
    archive_path: std::path::PathBuf,
    entries_rx: &async_channel::Receiver<Entry>,
    saved_tx: &async_channel::Sender<()>,
    errors_tx: &async_channel::Sender<common::Error>,
    cancel: &tokio_util::sync::CancellationToken,
) -> common::Result<std::path::PathBuf> {
    let progress = common::get_progress();
    while let Some(entry) = gather::recv(entries_rx, cancel).await {
        let (returned, res) = blocking(move || {
            let res = append_entry(&mut builder, entry);
            (builder, res)
        })
        .await?;
        builder = returned;
        match res {
            Ok(()) => progress.files_archived.inc(),
            Err(error) => {
                progress.items_failed.inc();
                gather::send(errors_tx, error, cancel).await;
            }
        }
        gather::send(saved_tx, (), cancel).await;
    }
    let path = archive_path.clone();
    blocking(move || finish_archive(builder, &path)).await??;
    if cancel.is_cancelled() {
        return Err(common::Error::Cancelled);
    }
    tracing::info!("archive written");
    Ok(archive_path)
}

async fn ensure_destination(destination: &std::path::Path) -> common::Result<()> {
    match tokio::fs::metadata(destination).await {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(common::Error::NotADirectory {
            side: common::Side::Local,
            path: destination.to_path_buf(),
        }),
        Err(_) => tokio::fs::DirBuilder::new()
            .mode(crate::transfer::DIR_MODE)
            .create(destination)
            .await
            .map_err(|error| {
                common::Error::from_io(
                    common::Side::Local,
                    destination,
                    "could not create backup folder",
                    error,
                )
            }),
    }
}

/// Archives `files` from the remote into a new `<UTC timestamp>.tar.gz` inside `destination`.
///
/// Failing to prepare the archive fails the call. Failures of individual files are reported on
/// the `errors` stream and the remaining files are still archived. Must be called from within a
/// tokio runtime.
#[instrument(skip(remote, files, cancel))]
pub async fn backup_files(
    remote: &std::sync::Arc<dyn RemoteFs>,
    destination: &std::path::Path,
    files: Vec<std::path::PathBuf>,
    options: BackupOptions,
    cancel: &tokio_util::sync::CancellationToken,
) -> common::Result<BackupStreams> {
    ensure_destination(destination).await?;
    let archive_path = destination.join(archive_name(chrono::Utc::now()));
    let file = tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&archive_path)
        .await
        .map_err(|error| {
            common::Error::from_io(
                common::Side::Local,
                &archive_path,
                "could not create archive",
                error,
            )
        })?
        .into_std()
        .await;
    let builder = tar::Builder::new(GzEncoder::new(
        std::io::BufWriter::new(file),
        Compression::default(),
    ));
    let (entries_tx, entries_rx) = gather::queue::<Entry>();
    let (saved_tx, saved_rx) = gather::queue();
    let (errors_tx, errors_rx) = gather::queue();
    let mut readers = gather::Barrier::new();
    let mut producers = gather::Barrier::new();
    {
        let read_done = readers.worker();
        let done = producers.worker();
        let remote = remote.clone();
        let entries_tx = entries_tx.clone();
        let saved_tx = saved_tx.clone();
        let errors_tx = errors_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _read_done = read_done;
            let _done = done;
            read_files(
                &*remote,
                &files,
                &options,
                &entries_tx,
                &saved_tx,
                &errors_tx,
                &cancel,
            )
            .await;
        });
    }
    let archive = {
        let done = producers.worker();
        let saved_tx = saved_tx.clone();
        let errors_tx = errors_tx.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let _done = done;
            write_entries(
                builder,
                archive_path,
                &entries_rx,
                &saved_tx,
                &errors_tx,
                &cancel,
            )
            .await
        })
    };
    readers.close_when_done(move || {
        entries_tx.close();
    });
    producers.close_when_done(move || {
        saved_tx.close();
        errors_tx.close();
    });
    Ok(BackupStreams {
        saved: saved_rx,
        errors: errors_rx,
        archive,
    })
}
