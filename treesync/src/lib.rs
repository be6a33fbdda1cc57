//! Remote folder tree discovery, upload and backup - `treesync`
//!
//! This crate drives three concurrent engines against a remote filesystem reachable through the
//! [`remote::RemoteFs`] capability:
//!
//! - [`discover_paths`] lists every path below a set of remote roots, all-or-nothing
//! - [`synchronize`] uploads local folder trees into remote folders and streams back what was
//!   discovered, copied and what failed
//! - [`backup_files`] saves remote files into a local `tar.gz` archive
//!
//! # Tool
//!
//! The `treesync` binary exposes the engines against a remote mounted as a local folder:
//!
//! ```bash
//! # List everything below two remote folders
//! treesync --remote-root /mnt/site discover /var/www /var/log
//!
//! # Upload two local trees with a progress bar and a summary
//! treesync --remote-root /mnt/site --progress --summary sync \
//!     --map build/public=/var/www \
//!     --map assets=/var/www/static:img
//!
//! # Back up remote files, dropping a common prefix from archive entry names
//! treesync --remote-root /mnt/site backup --dest backups \
//!     --strip-prefix /var/www /var/www/index.html /var/www/static
//! ```
//!
//! # Concurrency
//!
//! Every engine runs one tokio task per root (discovery), per mapping (synchronization: a walker
//! and a copier) or per stage (backup), all exchanging items over shared one-slot queues. Shared
//! queues are closed by a single coordinator task once every producer is finished, see
//! [`gather`].
//!
//! # Failure Semantics
//!
//! Nothing is retried and nothing is rolled back:
//!
//! - discovery fails as a whole with [`common::Error::Aggregate`] if any entry failed
//! - synchronization and backup report one error per failed item and keep going; the caller
//!   decides when to stop by cancelling the [`tokio_util::sync::CancellationToken`] passed in
//!
//! # Mappings
//!
//! A [`FolderMapping`] pairs a local folder with a remote folder, optionally narrowed to a
//! relative scope. Each local item `L/rel` is uploaded to `R/rel`. Folders are created with mode
//! `0755` and files get mode `0644` after upload; missing remote parents are created on demand.

pub mod backup;
pub mod discover;
pub mod gather;
pub mod mapping;
pub mod sync;
pub mod transfer;

pub use backup::{BackupOptions, BackupStreams, backup_files};
pub use discover::discover_paths;
pub use mapping::{FolderMapping, load_mappings};
pub use sync::{SyncReport, SyncStreams, synchronize};
pub use transfer::{Transferred, get_file, put_file};
