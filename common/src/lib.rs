//! Shared plumbing for the treesync tools
//!
//! This crate holds what every treesync engine and binary needs regardless of which side of a
//! transfer it works on:
//!
//! - [`Error`] - the error taxonomy (`NotFound`, `NotADirectory`, `PermissionDenied`, I/O
//!   failures and the aggregate error reported by path discovery)
//! - [`progress`] - process-wide counters and the end-of-run [`progress::Summary`]
//! - [`run`] - builds the tokio runtime, installs the tracing subscriber and drives the async
//!   entry point of a binary
//!
//! # Logging
//!
//! Logs are written to stdout through `tracing-subscriber`; progress bars are drawn on stderr so
//! logs can be piped while progress stays visible. Verbosity is controlled by
//! [`OutputConfig::verbose`] and can be overridden with `RUST_LOG`.

pub mod config;
pub mod error;
pub mod progress;

pub use config::{OutputConfig, ProgressSettings, RuntimeConfig};
pub use error::{Error, Result, Side};

static PROGRESS: std::sync::LazyLock<progress::Progress> =
    std::sync::LazyLock::new(progress::Progress::new);

#[must_use]
pub fn get_progress() -> &'static progress::Progress {
    &PROGRESS
}

/// Progress bar tracking discovered (length) against completed (position) items.
///
/// Drawn on stderr; hidden when `settings` is `None`.
pub fn transfer_progress_bar(
    settings: Option<&ProgressSettings>,
) -> anyhow::Result<indicatif::ProgressBar> {
    let Some(settings) = settings else {
        return Ok(indicatif::ProgressBar::hidden());
    };
    let delay = settings.delay().map_err(|err| anyhow::anyhow!(err))?;
    let bar = indicatif::ProgressBar::with_draw_target(
        Some(0),
        indicatif::ProgressDrawTarget::stderr_with_hz(hz_for(delay)),
    );
    bar.set_style(
        indicatif::ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} items ({msg})",
        )?
        .progress_chars("=> "),
    );
    bar.enable_steady_tick(delay);
    Ok(bar)
}

fn hz_for(delay: std::time::Duration) -> u8 {
    let millis = delay.as_millis().max(1);
    (1000 / millis).clamp(1, 20) as u8
}

fn init_tracing(output: &OutputConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(output.level_filter()));
    let result = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stdout)
        .with_target(output.verbose > 1)
        .try_init();
    if let Err(error) = result {
        eprintln!("failed to install tracing subscriber: {error}");
    }
}

fn build_runtime(runtime: &RuntimeConfig) -> std::io::Result<tokio::runtime::Runtime> {
    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if runtime.max_workers > 0 {
        builder.worker_threads(runtime.max_workers);
    }
    if runtime.max_blocking_threads > 0 {
        builder.max_blocking_threads(runtime.max_blocking_threads);
    }
    builder.build()
}

/// Runs the async entry point of a binary.
///
/// Returns `None` if the operation failed; the error has already been reported.
pub fn run<Fut, Summary>(
    output: OutputConfig,
    runtime: RuntimeConfig,
    func: impl FnOnce() -> Fut,
) -> Option<Summary>
where
    Summary: std::fmt::Display,
    Fut: std::future::Future<Output = anyhow::Result<Summary>>,
{
    init_tracing(&output);
    let runtime = match build_runtime(&runtime) {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start tokio runtime: {error}");
            return None;
        }
    };
    let res = runtime.block_on(func());
    match res {
        Ok(summary) => {
            if output.print_summary || output.verbose > 0 {
                println!("{summary}");
            }
            Some(summary)
        }
        Err(error) => {
            if !output.quiet {
                tracing::error!("{:#}", &error);
                if output.print_summary || output.verbose > 0 {
                    println!("{}", get_progress().summary());
                }
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hz_is_clamped() {
        assert_eq!(hz_for(std::time::Duration::from_millis(200)), 5);
        assert_eq!(hz_for(std::time::Duration::from_secs(10)), 1);
        assert_eq!(hz_for(std::time::Duration::from_millis(1)), 20);
    }

    #[test]
    fn hidden_bar_without_settings() -> anyhow::Result<()> {
        let bar = transfer_progress_bar(None)?;
        assert!(bar.is_hidden());
        Ok(())
    }
}
