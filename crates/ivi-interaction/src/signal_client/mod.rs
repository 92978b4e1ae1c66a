//! Persistent signal-server client.
//!
//! # Module Structure
//!
//! - `protocol`: request/response frames
//! - `backoff`: reconnect delay policy
//! - `transport`: connector seam and the WebSocket connector
//! - `session`: connection-independent state (subscriptions, pending requests)
//!
//! [`SignalClient`] owns one session and, while connected or reconnecting, a
//! spawned driver task that opens transports, pumps frames, and sleeps the
//! backoff delay between attempts. Callbacks reach the [`SignalHandler`]
//! outside the session lock, so a handler may call back into the client.

mod backoff;
mod protocol;
mod session;
mod transport;

pub use backoff::Backoff;
pub use protocol::{Action, ErrorBody, Frame, Request};
pub use session::Subscription;
pub use transport::{
    FrameSink, FrameStream, SignalConnector, SignalTransport, WebSocketConnector,
};

use futures::{SinkExt, StreamExt};
use ivi_core::config::SignalConfig;
use ivi_core::signal::{ConnectionState, SignalRecord, SignalValue};
use ivi_core::{IviError, Result};
use session::{Notice, SignalSession, dispatch};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Receives everything the signal client observes.
///
/// Called from the driver task (or from the caller's thread for synchronous
/// failures), never while the client holds its internal lock.
pub trait SignalHandler: Send + Sync {
    fn on_update(&self, path: &str, record: SignalRecord);

    fn on_connection_change(&self, _state: ConnectionState) {}

    fn on_error(&self, _message: &str) {}
}

/// Subscribe/unsubscribe/get/set against a VISS-style signal server, with
/// automatic reconnect and resubscribe.
pub struct SignalClient {
    url: String,
    connector: Arc<dyn SignalConnector>,
    handler: Arc<dyn SignalHandler>,
    session: Arc<Mutex<SignalSession>>,
}

impl SignalClient {
    pub fn new(
        config: &SignalConfig,
        connector: Arc<dyn SignalConnector>,
        handler: Arc<dyn SignalHandler>,
    ) -> Self {
        let backoff = Backoff::new(config.initial_backoff(), config.max_backoff());
        Self {
            url: config.url.clone(),
            connector,
            handler,
            session: Arc::new(Mutex::new(SignalSession::new(backoff))),
        }
    }

    /// WebSocket client for `config.url`.
    pub fn websocket(config: &SignalConfig, handler: Arc<dyn SignalHandler>) -> Self {
        Self::new(config, Arc::new(WebSocketConnector), handler)
    }

    fn lock(&self) -> MutexGuard<'_, SignalSession> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ConnectionState {
        self.lock().state()
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.lock().subscriptions().to_vec()
    }

    /// Starts connecting. No-op unless currently disconnected.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect(&self) {
        let Some((token, notices)) = self.lock().begin_connect() else {
            tracing::debug!("connect ignored: already connecting or connected");
            return;
        };
        dispatch(self.handler.as_ref(), notices);

        tracing::info!(url = %self.url, "starting signal client");
        let driver = Driver {
            url: self.url.clone(),
            connector: Arc::clone(&self.connector),
            handler: Arc::clone(&self.handler),
            session: Arc::clone(&self.session),
        };
        tokio::spawn(driver.run(token));
    }

    /// Closes the connection for good: no reconnect, subscriptions and
    /// pending requests are dropped.
    pub fn disconnect(&self) {
        let notices = self.lock().shutdown();
        if !notices.is_empty() {
            tracing::info!(url = %self.url, "signal client disconnected");
        }
        dispatch(self.handler.as_ref(), notices);
    }

    /// Tracks each path. Sent now if connected, otherwise on the next open.
    pub fn subscribe<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut session = self.lock();
        for path in paths {
            session.subscribe(path.into());
        }
    }

    pub fn unsubscribe(&self, path: &str) {
        self.lock().unsubscribe(path);
    }

    /// Writes a value. Fails with [`IviError::NotConnected`] (and reports
    /// through `on_error`) unless the transport is open.
    pub fn set(&self, path: &str, value: impl Into<SignalValue>) -> Result<()> {
        let value = value.into();
        let (result, notices) = self.lock().set(path, &value);
        match &result {
            Ok(()) => tracing::debug!(%path, %value, "set sent"),
            Err(err) => tracing::warn!(%path, error = %err, "set dropped"),
        }
        dispatch(self.handler.as_ref(), notices);
        result
    }

    /// Reads every record the server returns for `path` (a branch may
    /// return several).
    pub async fn get_all(&self, path: &str) -> Result<Vec<SignalRecord>> {
        let reply = self.lock().get(path)?;
        reply
            .await
            .map_err(|_| IviError::transport(format!("Connection closed before reply for {path}")))?
    }

    /// Reads the current value of one leaf signal.
    pub async fn get(&self, path: &str) -> Result<SignalRecord> {
        let mut records = self.get_all(path).await?;
        match records.iter().position(|record| record.path == path) {
            Some(index) => Ok(records.swap_remove(index)),
            None if !records.is_empty() => Ok(records.swap_remove(0)),
            None => Err(IviError::protocol(
                "none",
                "empty_response",
                format!("No data returned for {path}"),
            )),
        }
    }
}

impl Drop for SignalClient {
    fn drop(&mut self) {
        // Stops the driver; handlers are not notified on drop.
        let _ = self.lock().shutdown();
    }
}

/// Connection loop for one `connect()` run.
struct Driver {
    url: String,
    connector: Arc<dyn SignalConnector>,
    handler: Arc<dyn SignalHandler>,
    session: Arc<Mutex<SignalSession>>,
}

impl Driver {
    /// Runs `f` against the session unless this run was cancelled.
    ///
    /// `shutdown` cancels the token while holding the lock, so checking it
    /// under the lock keeps a stale driver from touching a closed session.
    fn with_session<F>(&self, token: &CancellationToken, f: F) -> Option<Vec<Notice>>
    where
        F: FnOnce(&mut SignalSession) -> Vec<Notice>,
    {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if token.is_cancelled() || session.is_intentionally_closed() {
            return None;
        }
        Some(f(&mut session))
    }

    fn notify(&self, notices: Option<Vec<Notice>>) {
        if let Some(notices) = notices {
            dispatch(self.handler.as_ref(), notices);
        }
    }

    async fn run(self, token: CancellationToken) {
        loop {
            let opened = tokio::select! {
                _ = token.cancelled() => break,
                opened = self.connector.open(&self.url) => opened,
            };

            match opened {
                Ok(transport) => {
                    self.pump(transport, &token).await;
                    let closed = self.with_session(&token, |s| s.on_close());
                    if closed.is_none() {
                        break;
                    }
                    self.notify(closed);
                }
                Err(err) => {
                    let failed = self.with_session(&token, |s| s.on_open_failed(&err));
                    if failed.is_none() {
                        break;
                    }
                    self.notify(failed);
                }
            }

            let delay = {
                let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
                session.next_delay()
            };
            tracing::info!(delay_ms = delay.as_millis() as u64, "reconnecting to signal server");

            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }
        }
        tracing::debug!(url = %self.url, "signal driver stopped");
    }

    /// Moves frames both ways until the transport closes or the run is cancelled.
    async fn pump(&self, transport: SignalTransport, token: &CancellationToken) {
        let SignalTransport {
            mut sink,
            mut stream,
        } = transport;
        let (outbox, mut outgoing) = mpsc::unbounded_channel::<String>();

        let Some(opened) = self.with_session(token, |s| s.on_open(outbox)) else {
            let _ = sink.close().await;
            return;
        };
        tracing::info!(url = %self.url, "signal transport open");
        self.notify(Some(opened));

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    let _ = sink.close().await;
                    return;
                }
                Some(frame) = outgoing.recv() => {
                    if let Err(err) = sink.send(frame).await {
                        tracing::warn!(error = %err, "signal transport write failed");
                        self.notify(Some(vec![Notice::Error(err.to_string())]));
                        return;
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(text)) => {
                        tracing::trace!(frame = %text, "signal frame received");
                        let notices = self.with_session(token, |s| s.on_frame(&text));
                        self.notify(notices);
                    }
                    Some(Err(err)) => {
                        tracing::warn!(error = %err, "signal transport read failed");
                        self.notify(Some(vec![Notice::Error(err.to_string())]));
                        return;
                    }
                    None => {
                        tracing::info!(url = %self.url, "signal transport closed");
                        return;
                    }
                },
            }
        }
    }
}
