use tracing::{event, instrument, Level};

#[derive(Debug)]
pub struct TlsCounter {
    // mutex is used primarily from one thread, so it's not a bottleneck
    count: thread_local::ThreadLocal<std::sync::Mutex<u64>>,
}

impl TlsCounter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            count: thread_local::ThreadLocal::new(),
        }
    }

    pub fn add(&self, value: u64) {
        let mutex = self.count.get_or(|| std::sync::Mutex::new(0));
        let mut guard = mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard += value;
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn get(&self) -> u64 {
        self.count.iter().fold(0, |x, y| {
            x + *y.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
        })
    }
}

impl Default for TlsCounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Counters shared by every engine running in the process.
#[derive(Debug)]
pub struct Progress {
    pub items_discovered: TlsCounter,
    pub files_copied: TlsCounter,
    pub directories_created: TlsCounter,
    pub bytes_copied: TlsCounter,
    pub items_failed: TlsCounter,
    pub files_archived: TlsCounter,
    start_time: std::time::Instant,
}

impl Progress {
    #[must_use]
    pub fn new() -> Self {
        Self {
            items_discovered: Default::default(),
            files_copied: Default::default(),
            directories_created: Default::default(),
            bytes_copied: Default::default(),
            items_failed: Default::default(),
            files_archived: Default::default(),
            start_time: std::time::Instant::now(),
        }
    }

    pub fn get_duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    #[instrument(skip(self))]
    pub fn summary(&self) -> Summary {
        let summary = Summary {
            items_discovered: self.items_discovered.get(),
            files_copied: self.files_copied.get(),
            directories_created: self.directories_created.get(),
            bytes_copied: self.bytes_copied.get(),
            items_failed: self.items_failed.get(),
            files_archived: self.files_archived.get(),
            duration: self.get_duration(),
        };
        let transferred = summary.files_copied + summary.directories_created;
        if transferred > summary.items_discovered {
            event!(
                Level::DEBUG,
                "Progress inversion - discovered: {}, transferred {}",
                summary.items_discovered,
                transferred
            );
        }
        summary
    }
}

impl Default for Progress {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Copy, Clone, Debug, Default)]
pub struct Summary {
    pub items_discovered: u64,
    pub files_copied: u64,
    pub directories_created: u64,
    pub bytes_copied: u64,
    pub items_failed: u64,
    pub files_archived: u64,
    pub duration: std::time::Duration,
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let secs = self.duration.as_secs_f64();
        let rate = if secs > 0.0 {
            self.bytes_copied as f64 / secs
        } else {
            0.0
        };
        write!(
            f,
            "items discovered: {}\n\
            files copied: {}\n\
            directories created: {}\n\
            bytes copied: {} ({}/s)\n\
            files archived: {}\n\
            items failed: {}\n\
            walltime: {:.2?}",
            self.items_discovered,
            self.files_copied,
            self.directories_created,
            bytesize::ByteSize(self.bytes_copied),
            bytesize::ByteSize(rate as u64),
            self.files_archived,
            self.items_failed,
            self.duration,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_counting() {
        let tls_counter = TlsCounter::new();
        for _ in 0..10 {
            tls_counter.inc();
        }
        assert_eq!(tls_counter.get(), 10);
    }

    #[test]
    fn threaded_counting() {
        let tls_counter = TlsCounter::new();
        std::thread::scope(|scope| {
            for _ in 0..10 {
                scope.spawn(|| {
                    for _ in 0..100 {
                        tls_counter.inc();
                    }
                });
            }
        });
        assert_eq!(tls_counter.get(), 1000);
    }

    #[test]
    fn summary_reports_counters() {
        let progress = Progress::new();
        progress.items_discovered.add(3);
        progress.files_copied.add(2);
        progress.directories_created.inc();
        progress.bytes_copied.add(2048);
        let summary = progress.summary();
        assert_eq!(summary.items_discovered, 3);
        assert_eq!(summary.files_copied, 2);
        let text = summary.to_string();
        assert!(text.contains("files copied: 2"));
        assert!(text.contains("directories created: 1"));
    }
}
