//! Render-rate coalescing of signal updates.
//!
//! Updates land in a pending map keyed by path (last write wins). The first
//! update after a flush asks the [`FlushScheduler`] for one flush; the flush
//! moves the whole map into the [`SignalStore`] as a single batch. Nothing is
//! scheduled while no updates arrive.

use crate::signal_store::SignalStore;
use ivi_core::signal::{ConnectionState, SignalRecord};
use ivi_core::{IviError, Result};
use ivi_interaction::SignalHandler;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// A scheduled flush. Cancelling prevents a flush that has not fired yet.
#[derive(Debug, Clone)]
pub struct FlushHandle(CancellationToken);

impl FlushHandle {
    pub fn new() -> Self {
        Self(CancellationToken::new())
    }

    pub fn cancel(&self) {
        self.0.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.is_cancelled()
    }

    fn token(&self) -> CancellationToken {
        self.0.clone()
    }
}

impl Default for FlushHandle {
    fn default() -> Self {
        Self::new()
    }
}

pub type FlushFn = Box<dyn FnOnce() + Send>;

/// Runs a flush at the next render tick.
///
/// Implementations must not invoke `flush` inline from `request_flush`.
pub trait FlushScheduler: Send + Sync {
    fn request_flush(&self, flush: FlushFn) -> FlushHandle;
}

/// Flushes one frame interval after the request, on a tokio runtime.
pub struct TickScheduler {
    handle: Handle,
    interval: Duration,
}

impl TickScheduler {
    /// Uses the runtime the caller is running on.
    pub fn new(interval: Duration) -> Result<Self> {
        let handle = Handle::try_current()
            .map_err(|err| IviError::internal(format!("TickScheduler needs a tokio runtime: {err}")))?;
        Ok(Self::with_handle(handle, interval))
    }

    pub fn with_handle(handle: Handle, interval: Duration) -> Self {
        Self { handle, interval }
    }
}

impl FlushScheduler for TickScheduler {
    fn request_flush(&self, flush: FlushFn) -> FlushHandle {
        let handle = FlushHandle::new();
        let cancelled = handle.token();
        let interval = self.interval;
        self.handle.spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(interval) => flush(),
            }
        });
        handle
    }
}

/// Queues flushes until the host render loop calls [`ManualScheduler::run_pending`].
#[derive(Default)]
pub struct ManualScheduler {
    queue: Mutex<Vec<(FlushHandle, FlushFn)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self) -> MutexGuard<'_, Vec<(FlushHandle, FlushFn)>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of queued, not-cancelled flushes.
    pub fn pending(&self) -> usize {
        self.queue()
            .iter()
            .filter(|(handle, _)| !handle.is_cancelled())
            .count()
    }

    /// Runs every queued flush that was not cancelled; returns how many ran.
    pub fn run_pending(&self) -> usize {
        let queued = std::mem::take(&mut *self.queue());
        let mut ran = 0;
        for (handle, flush) in queued {
            if !handle.is_cancelled() {
                flush();
                ran += 1;
            }
        }
        ran
    }
}

impl FlushScheduler for ManualScheduler {
    fn request_flush(&self, flush: FlushFn) -> FlushHandle {
        let handle = FlushHandle::new();
        self.queue().push((handle.clone(), flush));
        handle
    }
}

#[derive(Default)]
struct Pending {
    updates: HashMap<String, SignalRecord>,
    scheduled: Option<FlushHandle>,
    closed: bool,
}

/// Signal handler that batches updates into the store once per tick.
///
/// Connection changes and errors bypass batching and go straight to the
/// store's link status.
pub struct UpdateCoalescer {
    store: Arc<SignalStore>,
    scheduler: Arc<dyn FlushScheduler>,
    pending: Arc<Mutex<Pending>>,
}

impl UpdateCoalescer {
    pub fn new(store: Arc<SignalStore>, scheduler: Arc<dyn FlushScheduler>) -> Self {
        Self {
            store,
            scheduler,
            pending: Arc::new(Mutex::new(Pending::default())),
        }
    }

    fn lock(pending: &Mutex<Pending>) -> MutexGuard<'_, Pending> {
        pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Updates waiting for the next flush.
    pub fn pending_len(&self) -> usize {
        Self::lock(&self.pending).updates.len()
    }

    pub fn has_scheduled_flush(&self) -> bool {
        Self::lock(&self.pending).scheduled.is_some()
    }

    /// Queues one update, scheduling a flush if none is outstanding.
    pub fn push(&self, record: SignalRecord) {
        let mut pending = Self::lock(&self.pending);
        if pending.closed {
            return;
        }
        pending.updates.insert(record.path.clone(), record);
        if pending.scheduled.is_none() {
            let flush = Self::flush_fn(Arc::clone(&self.pending), Arc::clone(&self.store));
            pending.scheduled = Some(self.scheduler.request_flush(flush));
        }
    }

    fn flush_fn(pending: Arc<Mutex<Pending>>, store: Arc<SignalStore>) -> FlushFn {
        Box::new(move || {
            // Held across the apply: teardown waits for an in-flight batch.
            let mut pending = Self::lock(&pending);
            pending.scheduled = None;
            if pending.closed {
                return;
            }
            let batch = std::mem::take(&mut pending.updates);
            tracing::trace!(count = batch.len(), "flushing signal batch");
            store.apply_batch(batch);
        })
    }

    /// Cancels an outstanding flush and drops pending updates. Later
    /// updates are ignored.
    pub fn teardown(&self) {
        let mut pending = Self::lock(&self.pending);
        pending.closed = true;
        pending.updates.clear();
        if let Some(scheduled) = pending.scheduled.take() {
            scheduled.cancel();
        }
    }
}

impl SignalHandler for UpdateCoalescer {
    fn on_update(&self, _path: &str, record: SignalRecord) {
        self.push(record);
    }

    fn on_connection_change(&self, state: ConnectionState) {
        self.store.set_connection(state);
    }

    fn on_error(&self, message: &str) {
        self.store.record_error(message);
    }
}
