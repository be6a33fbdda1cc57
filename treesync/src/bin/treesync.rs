use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::io::Write;
use tracing::instrument;

#[derive(Parser, Debug, Clone)]
#[command(
    name = "treesync",
    version,
    about = "Discover, upload and back up remote folder trees",
    long_about = "`treesync` works against a remote filesystem mounted as a local folder (--remote-root).
Remote paths are absolute and resolved below that folder.

EXAMPLES:
    # List everything below a remote folder
    treesync --remote-root /mnt/site discover /var/www

    # Upload a local folder with progress and a summary
    treesync --remote-root /mnt/site --progress --summary sync --map build=/var/www

    # Back up everything below a remote folder into backups/<timestamp>.tar.gz
    treesync --remote-root /mnt/site backup --dest backups --root /var/www --strip-prefix /var/www"
)]
struct Args {
    // Remote
    /// Folder the remote filesystem is mounted at
    #[arg(long, value_name = "PATH", help_heading = "Remote")]
    remote_root: std::path::PathBuf,

    // Progress & output
    /// Show progress
    #[arg(long, help_heading = "Progress & output")]
    progress: bool,

    /// Sets the delay between progress updates (default: 200ms)
    ///
    /// If specified, --progress flag is implied.
    ///
    /// This option accepts a human readable duration, e.g. "200ms", "10s", "5min" etc.
    #[arg(long, value_name = "DELAY", help_heading = "Progress & output")]
    progress_delay: Option<String>,

    /// Verbose level (implies "summary"): -v INFO / -vv DEBUG / -vvv TRACE (default: ERROR)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, help_heading = "Progress & output")]
    verbose: u8,

    /// Print summary at the end
    #[arg(long, help_heading = "Progress & output")]
    summary: bool,

    /// Quiet mode, don't report errors
    #[arg(short = 'q', long = "quiet", help_heading = "Progress & output")]
    quiet: bool,

    // Advanced settings
    /// Number of worker threads, 0 means number of cores
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_workers: usize,

    /// Number of blocking worker threads, 0 means Tokio runtime default (512)
    #[arg(
        long,
        default_value = "0",
        value_name = "N",
        help_heading = "Advanced settings"
    )]
    max_blocking_threads: usize,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
enum Command {
    /// Print every path below the given remote folders; fails if any entry cannot be listed
    Discover {
        /// Remote folder(s) to list
        #[arg(required = true)]
        roots: Vec<std::path::PathBuf>,
    },
    /// Upload local folders into remote folders
    Sync {
        /// Folder mapping LOCAL=REMOTE[:SCOPE] (can be specified multiple times)
        ///
        /// Every item below LOCAL is uploaded to the same relative location below REMOTE. With
        /// SCOPE only items below LOCAL/SCOPE are uploaded.
        #[arg(long = "map", value_name = "LOCAL=REMOTE[:SCOPE]", action = clap::ArgAction::Append)]
        mappings: Vec<treesync::FolderMapping>,

        /// Read folder mappings from a JSON file
        ///
        /// The file holds an array of objects with `local`, `remote` and optional `scope` keys.
        #[arg(long, value_name = "PATH")]
        mappings_file: Option<std::path::PathBuf>,

        /// Stop on first error
        #[arg(short = 'e', long = "fail-early")]
        fail_early: bool,
    },
    /// Save remote files into DEST/<UTC timestamp>.tar.gz
    Backup {
        /// Local folder the archive is written to, created if missing
        #[arg(long, value_name = "DIR")]
        dest: std::path::PathBuf,

        /// Remote path prefix removed from archive entry names (can be specified multiple times)
        #[arg(long, value_name = "PREFIX", action = clap::ArgAction::Append)]
        strip_prefix: Vec<std::path::PathBuf>,

        /// Also back up everything below this remote folder (can be specified multiple times)
        #[arg(long = "root", value_name = "PATH", action = clap::ArgAction::Append)]
        roots: Vec<std::path::PathBuf>,

        /// Remote file(s) to back up
        files: Vec<std::path::PathBuf>,
    },
    /// Download one remote file, or create the local folder for a remote folder
    Get {
        remote_path: std::path::PathBuf,
        local_path: std::path::PathBuf,
    },
}

fn cancel_on_ctrl_c(cancel: &tokio_util::sync::CancellationToken) {
    let cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::error!("interrupted, cancelling");
            cancel.cancel();
        }
    });
}

async fn discover(
    remote: &std::sync::Arc<dyn remote::RemoteFs>,
    roots: &[std::path::PathBuf],
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<()> {
    let paths = treesync::discover_paths(remote, roots, cancel, |error| {
        tracing::error!("{}", error);
    })
    .await?;
    let mut out = std::io::stdout().lock();
    for path in paths {
        writeln!(out, "{}", path.display())?;
    }
    Ok(())
}

async fn sync(
    remote: &std::sync::Arc<dyn remote::RemoteFs>,
    local: &std::sync::Arc<dyn remote::LocalFs>,
    mappings: &[treesync::FolderMapping],
    fail_early: bool,
    progress: Option<&common::ProgressSettings>,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<()> {
    if mappings.is_empty() {
        bail!("no folder mappings given, use --map or --mappings-file");
    }
    let bar = common::transfer_progress_bar(progress)?;
    let treesync::SyncStreams {
        errors,
        discovered,
        copied,
    } = treesync::synchronize(remote, local, mappings, cancel);
    let mut error_count = 0;
    loop {
        tokio::select! {
            Ok(()) = discovered.recv() => bar.inc_length(1),
            Ok(()) = copied.recv() => bar.inc(1),
            Ok(error) = errors.recv() => {
                error_count += 1;
                tracing::error!("{}", &error);
                bar.set_message(format!("{error_count} errors"));
                if fail_early {
                    cancel.cancel();
                }
            }
            else => break,
        }
    }
    bar.finish_and_clear();
    if error_count > 0 {
        return Err(anyhow!("treesync encountered {} errors", error_count));
    }
    if cancel.is_cancelled() {
        return Err(common::Error::Cancelled.into());
    }
    Ok(())
}

async fn backup(
    remote: &std::sync::Arc<dyn remote::RemoteFs>,
    destination: &std::path::Path,
    mut files: Vec<std::path::PathBuf>,
    roots: &[std::path::PathBuf],
    options: treesync::BackupOptions,
    progress: Option<&common::ProgressSettings>,
    cancel: &tokio_util::sync::CancellationToken,
) -> Result<()> {
    if !roots.is_empty() {
        let discovered = treesync::discover_paths(remote, roots, cancel, |error| {
            tracing::error!("{}", error);
        })
        .await
        .context("failed listing folders to back up")?;
        files.extend(discovered);
    }
    if files.is_empty() {
        bail!("nothing to back up, give remote files or --root");
    }
    let bar = common::transfer_progress_bar(progress)?;
    bar.set_length(files.len() as u64);
    let treesync::BackupStreams {
        saved,
        errors,
        archive,
    } = treesync::backup_files(remote, destination, files, options, cancel).await?;
    let mut error_count = 0;
    loop {
        tokio::select! {
            Ok(()) = saved.recv() => bar.inc(1),
            Ok(error) = errors.recv() => {
                error_count += 1;
                tracing::error!("{}", &error);
                bar.set_message(format!("{error_count} errors"));
            }
            else => break,
        }
    }
    bar.finish_and_clear();
    let archive = archive.await??;
    println!("{}", archive.display());
    if error_count > 0 {
        return Err(anyhow!(
            "treesync could not back up {} files into {:?}",
            error_count,
            archive
        ));
    }
    Ok(())
}

#[instrument]
async fn async_main(args: Args) -> Result<common::progress::Summary> {
    let metadata = tokio::fs::metadata(&args.remote_root)
        .await
        .with_context(|| format!("cannot access remote root {:?}", &args.remote_root))?;
    if !metadata.is_dir() {
        bail!("remote root {:?} is not a directory", &args.remote_root);
    }
    let remote: std::sync::Arc<dyn remote::RemoteFs> =
        std::sync::Arc::new(remote::DirRemote::new(&args.remote_root));
    let local: std::sync::Arc<dyn remote::LocalFs> = std::sync::Arc::new(remote::OsLocal);
    let cancel = tokio_util::sync::CancellationToken::new();
    cancel_on_ctrl_c(&cancel);
    let progress = if args.progress || args.progress_delay.is_some() {
        Some(common::ProgressSettings {
            progress_delay: args.progress_delay.clone(),
        })
    } else {
        None
    };
    match args.command {
        Command::Discover { roots } => discover(&remote, &roots, &cancel).await?,
        Command::Sync {
            mut mappings,
            mappings_file,
            fail_early,
        } => {
            if let Some(path) = mappings_file {
                mappings.extend(treesync::load_mappings(&path)?);
            }
            sync(
                &remote,
                &local,
                &mappings,
                fail_early,
                progress.as_ref(),
                &cancel,
            )
            .await?;
        }
        Command::Backup {
            dest,
            strip_prefix,
            roots,
            files,
        } => {
            let options = treesync::BackupOptions {
                strip_prefixes: strip_prefix,
            };
            backup(
                &remote,
                &dest,
                files,
                &roots,
                options,
                progress.as_ref(),
                &cancel,
            )
            .await?;
        }
        Command::Get {
            remote_path,
            local_path,
        } => {
            treesync::get_file(&*remote, &*local, &local_path, &remote_path)
                .await
                .with_context(|| {
                    format!("failed downloading {:?} to {:?}", remote_path, local_path)
                })?;
        }
    }
    Ok(common::get_progress().summary())
}

fn main() -> Result<()> {
    let args = Args::parse();
    let func = {
        let args = args.clone();
        || async_main(args)
    };
    let output = common::OutputConfig {
        quiet: args.quiet,
        verbose: args.verbose,
        print_summary: args.summary,
    };
    let runtime = common::RuntimeConfig {
        max_workers: args.max_workers,
        max_blocking_threads: args.max_blocking_threads,
    };
    let res = common::run(output, runtime, func);
    if res.is_none() {
        std::process::exit(1);
    }
    Ok(())
}
