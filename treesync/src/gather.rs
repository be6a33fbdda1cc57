//! Scatter/gather plumbing shared by every engine.
//!
//! Producers and consumers are plain tokio tasks talking over `async_channel` queues. A shared
//! queue is never closed by the tasks that use it: each task holds a [`DoneGuard`] and one
//! coordinator task spawned by [`Barrier::close_when_done`] counts the guards as they drop. Only
//! once every registered worker is finished does the coordinator run its closer, which is the
//! single place where the shared queues get closed.

/// Capacity of every work and result queue. `async_channel` has no zero-capacity rendezvous, one
/// slot is the closest to it and still makes slow consumers push back on producers.
pub const QUEUE_CAPACITY: usize = 1;

#[must_use]
pub fn queue<T>() -> (async_channel::Sender<T>, async_channel::Receiver<T>) {
    async_channel::bounded(QUEUE_CAPACITY)
}

/// Completion token of one worker; dropping it reports the worker as finished.
#[derive(Debug)]
pub struct DoneGuard {
    done_tx: async_channel::Sender<()>,
}

impl Drop for DoneGuard {
    fn drop(&mut self) {
        // unbounded and kept open by the coordinator, so this cannot fail before it is counted
        let _ = self.done_tx.try_send(());
    }
}

/// Counts completion tokens against the number of registered workers.
#[derive(Debug)]
pub struct Barrier {
    done_tx: async_channel::Sender<()>,
    done_rx: async_channel::Receiver<()>,
    expected: usize,
}

impl Default for Barrier {
    fn default() -> Self {
        Self::new()
    }
}

impl Barrier {
    #[must_use]
    pub fn new() -> Self {
        let (done_tx, done_rx) = async_channel::unbounded();
        Self {
            done_tx,
            done_rx,
            expected: 0,
        }
    }

    /// Registers one more worker and hands out its completion token.
    pub fn worker(&mut self) -> DoneGuard {
        self.expected += 1;
        DoneGuard {
            done_tx: self.done_tx.clone(),
        }
    }

    #[must_use]
    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Spawns the coordinator: it waits for one token per registered worker, then calls
    /// `on_done` exactly once. Resolves to the number of tokens observed.
    pub fn close_when_done<F>(self, on_done: F) -> tokio::task::JoinHandle<usize>
    where
        F: FnOnce() + Send + 'static,
    {
        let Barrier {
            done_tx,
            done_rx,
            expected,
        } = self;
        drop(done_tx);
        tokio::spawn(async move {
            let mut finished = 0;
            while finished < expected {
                if done_rx.recv().await.is_err() {
                    tracing::error!(
                        "completion channel closed after {} of {} workers",
                        finished,
                        expected
                    );
                    break;
                }
                finished += 1;
            }
            tracing::debug!("all {} workers finished", finished);
            on_done();
            finished
        })
    }
}

/// Sends `item` unless `cancel` fires first. Returns `false` if the item was not delivered,
/// either because of cancellation or because every receiver is gone.
pub async fn send<T>(
    tx: &async_channel::Sender<T>,
    item: T,
    cancel: &tokio_util::sync::CancellationToken,
) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        res = tx.send(item) => res.is_ok(),
    }
}

/// Receives the next item unless `cancel` fires first; `None` once the queue is closed and
/// drained.
pub async fn recv<T>(
    rx: &async_channel::Receiver<T>,
    cancel: &tokio_util::sync::CancellationToken,
) -> Option<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        res = rx.recv() => res.ok(),
    }
}
