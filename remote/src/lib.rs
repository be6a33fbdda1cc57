//! Filesystem capabilities consumed by the treesync engines
//!
//! The engines never touch storage directly. They talk to a [`RemoteFs`] (the far end of an
//! already-established session) and a [`LocalFs`] (the host running the engine). Both expose the
//! same small surface: stat, open/create, mkdir and a recursive listing that yields
//! [`PathRecord`]s, so a per-entry failure travels down the same stream as the paths do.
//!
//! Two implementations ship with the crate:
//!
//! - [`DirRemote`] - a remote exposed as a local directory (a mount point of a network share,
//!   or a scratch directory in tests)
//! - [`OsLocal`] - the host filesystem through `tokio::fs`

pub mod dir;
pub mod fs;
pub mod local;
pub mod walk;

pub use dir::DirRemote;
pub use fs::{
    BoxedRead, BoxedWrite, FileKind, LocalFs, Metadata, PathRecord, RecordStream, RemoteFs,
};
pub use local::OsLocal;
