//! Configuration types for runtime and execution settings

/// Runtime configuration for tokio and thread pools
#[derive(Debug, Clone, Copy, Default)]
pub struct RuntimeConfig {
    /// Number of worker threads (0 = number of CPU cores)
    pub max_workers: usize,
    /// Number of blocking threads (0 = tokio default of 512)
    pub max_blocking_threads: usize,
}

/// Output and logging configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct OutputConfig {
    /// Suppress error output
    pub quiet: bool,
    /// Verbosity level: 0=ERROR, 1=INFO, 2=DEBUG, 3=TRACE
    pub verbose: u8,
    /// Print summary statistics at the end
    pub print_summary: bool,
}

impl OutputConfig {
    /// Filter directive matching the verbosity flags.
    #[must_use]
    pub fn level_filter(&self) -> &'static str {
        if self.quiet {
            return "off";
        }
        match self.verbose {
            0 => "error",
            1 => "info",
            2 => "debug",
            _ => "trace",
        }
    }
}

/// Progress display configuration
#[derive(Debug, Clone, Default)]
pub struct ProgressSettings {
    /// Delay between progress updates, human readable (e.g. "200ms", "10s")
    pub progress_delay: Option<String>,
}

impl ProgressSettings {
    pub const DEFAULT_DELAY: std::time::Duration = std::time::Duration::from_millis(200);

    /// Parse the configured delay, falling back to the default when unset.
    pub fn delay(&self) -> Result<std::time::Duration, String> {
        match &self.progress_delay {
            Some(delay) => humantime::parse_duration(delay)
                .map_err(|err| format!("invalid progress delay {delay:?}: {err}")),
            None => Ok(Self::DEFAULT_DELAY),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_levels() {
        let mut output = OutputConfig::default();
        assert_eq!(output.level_filter(), "error");
        output.verbose = 2;
        assert_eq!(output.level_filter(), "debug");
        output.verbose = 7;
        assert_eq!(output.level_filter(), "trace");
        output.quiet = true;
        assert_eq!(output.level_filter(), "off");
    }

    #[test]
    fn progress_delay_parsing() {
        let settings = ProgressSettings::default();
        assert_eq!(settings.delay(), Ok(ProgressSettings::DEFAULT_DELAY));
        let settings = ProgressSettings {
            progress_delay: Some("10s".to_string()),
        };
        assert_eq!(settings.delay(), Ok(std::time::Duration::from_secs(10)));
        let settings = ProgressSettings {
            progress_delay: Some("soon".to_string()),
        };
        assert!(settings.delay().is_err());
    }
}
