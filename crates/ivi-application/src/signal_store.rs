use ivi_core::signal::{ConnectionState, LinkStatus, SignalMap, SignalRecord};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Consumer-facing signal state.
///
/// Readers get immutable `Arc<SignalMap>` snapshots. A flush replaces the
/// snapshot in one step: the map is copied only while a reader still holds
/// the previous one, so a renderer never observes a half-applied batch.
pub struct SignalStore {
    signals: watch::Sender<Arc<SignalMap>>,
    link: watch::Sender<LinkStatus>,
}

impl SignalStore {
    /// Creates a new empty SignalStore.
    pub fn new() -> Self {
        let (signals, _) = watch::channel(Arc::new(SignalMap::new()));
        let (link, _) = watch::channel(LinkStatus::default());
        Self { signals, link }
    }

    /// Current snapshot of every known signal.
    pub fn snapshot(&self) -> Arc<SignalMap> {
        Arc::clone(&*self.signals.borrow())
    }

    pub fn get(&self, path: &str) -> Option<SignalRecord> {
        self.signals.borrow().get(path).cloned()
    }

    /// Receiver notified after every flush.
    pub fn subscribe(&self) -> watch::Receiver<Arc<SignalMap>> {
        self.signals.subscribe()
    }

    /// Applies one coalesced batch as a single snapshot change.
    pub fn apply_batch(&self, batch: HashMap<String, SignalRecord>) {
        if batch.is_empty() {
            return;
        }
        self.signals.send_modify(|snapshot| {
            Arc::make_mut(snapshot).extend(batch);
        });
    }

    /// Drops every record. Used on teardown.
    pub fn clear(&self) {
        self.signals.send_replace(Arc::new(SignalMap::new()));
    }

    pub fn link_status(&self) -> LinkStatus {
        self.link.borrow().clone()
    }

    pub fn watch_link(&self) -> watch::Receiver<LinkStatus> {
        self.link.subscribe()
    }

    /// Records a connection transition. Reaching `connected` clears the last error.
    pub fn set_connection(&self, state: ConnectionState) {
        self.link.send_if_modified(|link| {
            let changed = link.connection != state
                || (state.is_connected() && link.last_error.is_some());
            link.connection = state;
            if state.is_connected() {
                link.last_error = None;
            }
            changed
        });
    }

    pub fn record_error(&self, message: impl Into<String>) {
        let message = message.into();
        self.link.send_modify(|link| link.last_error = Some(message));
    }
}

impl Default for SignalStore {
    fn default() -> Self {
        Self::new()
    }
}
