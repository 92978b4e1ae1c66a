//! Connection-independent state of the signal client.
//!
//! `SignalSession` performs no I/O. The driver feeds it transport events
//! (`on_open`, `on_frame`, `on_close`) and public calls, and it answers with
//! outbound frames (written to the current outbox) and [`Notice`]s that the
//! driver hands to the [`SignalHandler`] once the session lock is released.

use super::backoff::Backoff;
use super::protocol::{Action, Frame, Request};
use super::SignalHandler;
use ivi_core::signal::{ConnectionState, SignalRecord, SignalValue};
use ivi_core::{IviError, Result};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Callback to deliver after the session lock is released.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Notice {
    Update(SignalRecord),
    Connection(ConnectionState),
    Error(String),
}

pub(crate) fn dispatch(handler: &dyn SignalHandler, notices: Vec<Notice>) {
    for notice in notices {
        match notice {
            Notice::Update(record) => {
                let path = record.path.clone();
                handler.on_update(&path, record);
            }
            Notice::Connection(state) => handler.on_connection_change(state),
            Notice::Error(message) => handler.on_error(&message),
        }
    }
}

/// Client-side intent to receive updates for one path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub path: String,
    /// Server-assigned id, `None` until the subscribe ack arrives.
    pub subscription_id: Option<String>,
    /// Id of the subscribe request sent on the current connection.
    pub(crate) request_id: Option<String>,
}

type GetReply = oneshot::Sender<Result<Vec<SignalRecord>>>;

enum Continuation {
    Get(GetReply),
    Ack { action: Action, path: String },
}

pub(crate) struct SignalSession {
    state: ConnectionState,
    subscriptions: Vec<Subscription>,
    pending: HashMap<String, Continuation>,
    outbox: Option<mpsc::UnboundedSender<String>>,
    backoff: Backoff,
    /// Set before a deliberate close so the close handler does not reconnect.
    intentional_close: bool,
    run: Option<CancellationToken>,
}

fn next_request_id() -> String {
    Uuid::new_v4().to_string()
}

impl SignalSession {
    pub fn new(backoff: Backoff) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            subscriptions: Vec::new(),
            pending: HashMap::new(),
            outbox: None,
            backoff,
            intentional_close: false,
            run: None,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }

    #[cfg(test)]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_intentionally_closed(&self) -> bool {
        self.intentional_close
    }

    fn set_state(&mut self, next: ConnectionState, notices: &mut Vec<Notice>) {
        if self.state != next {
            tracing::info!(from = %self.state, to = %next, "signal connection state changed");
            self.state = next;
            notices.push(Notice::Connection(next));
        }
    }

    fn is_open(&self) -> bool {
        self.state == ConnectionState::Connected && self.outbox.is_some()
    }

    /// Fails every waiting `get` with `err` and forgets pending acks.
    fn fail_pending(&mut self, err: &IviError) {
        for (_, continuation) in self.pending.drain() {
            if let Continuation::Get(reply) = continuation {
                let _ = reply.send(Err(err.clone()));
            }
        }
    }

    fn send(&self, request: &Request) -> bool {
        match &self.outbox {
            Some(outbox) => outbox.send(request.to_frame()).is_ok(),
            None => false,
        }
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Starts a connection run. `None` when already connecting/connected.
    pub fn begin_connect(&mut self) -> Option<(CancellationToken, Vec<Notice>)> {
        if self.state != ConnectionState::Disconnected {
            return None;
        }
        let mut notices = Vec::new();
        self.intentional_close = false;
        let token = CancellationToken::new();
        self.run = Some(token.clone());
        self.set_state(ConnectionState::Connecting, &mut notices);
        Some((token, notices))
    }

    /// Transport opened: reset backoff and re-send every tracked subscription.
    pub fn on_open(&mut self, outbox: mpsc::UnboundedSender<String>) -> Vec<Notice> {
        let mut notices = Vec::new();
        self.outbox = Some(outbox);
        self.backoff.reset();
        self.set_state(ConnectionState::Connected, &mut notices);

        let mut requests = Vec::with_capacity(self.subscriptions.len());
        for subscription in &mut self.subscriptions {
            let request_id = next_request_id();
            subscription.subscription_id = None;
            subscription.request_id = Some(request_id.clone());
            requests.push(Request::subscribe(request_id, &subscription.path));
        }
        for request in &requests {
            self.send(request);
        }
        if !requests.is_empty() {
            tracing::debug!(count = requests.len(), "re-sent subscriptions");
        }
        notices
    }

    /// Transport could not be constructed. Stays `connecting`; the driver retries.
    pub fn on_open_failed(&mut self, err: &IviError) -> Vec<Notice> {
        tracing::warn!(error = %err, "signal transport failed to open");
        vec![Notice::Error(err.to_string())]
    }

    /// Transport closed unexpectedly.
    pub fn on_close(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        self.outbox = None;
        self.fail_pending(&IviError::transport("Connection closed before reply"));
        for subscription in &mut self.subscriptions {
            subscription.subscription_id = None;
            subscription.request_id = None;
        }
        self.set_state(ConnectionState::Connecting, &mut notices);
        notices
    }

    pub fn next_delay(&mut self) -> Duration {
        self.backoff.next_delay()
    }

    /// Intentional disconnect: flag first, then release everything.
    pub fn shutdown(&mut self) -> Vec<Notice> {
        let mut notices = Vec::new();
        self.intentional_close = true;
        if let Some(run) = self.run.take() {
            run.cancel();
        }
        self.outbox = None;
        self.subscriptions.clear();
        self.fail_pending(&IviError::Cancelled);
        self.backoff.reset();
        self.set_state(ConnectionState::Disconnected, &mut notices);
        notices
    }

    // ------------------------------------------------------------------
    // Requests
    // ------------------------------------------------------------------

    pub fn subscribe(&mut self, path: String) {
        if self.subscriptions.iter().any(|s| s.path == path) {
            return;
        }
        let mut subscription = Subscription {
            path,
            subscription_id: None,
            request_id: None,
        };
        if self.is_open() {
            let request_id = next_request_id();
            if self.send(&Request::subscribe(request_id.clone(), &subscription.path)) {
                subscription.request_id = Some(request_id);
            }
        }
        self.subscriptions.push(subscription);
    }

    pub fn unsubscribe(&mut self, path: &str) {
        let Some(index) = self.subscriptions.iter().position(|s| s.path == path) else {
            return;
        };
        let subscription = self.subscriptions.remove(index);
        if let (true, Some(subscription_id)) = (self.is_open(), subscription.subscription_id) {
            let request_id = next_request_id();
            if self.send(&Request::unsubscribe(request_id.clone(), &subscription_id)) {
                self.pending.insert(
                    request_id,
                    Continuation::Ack {
                        action: Action::Unsubscribe,
                        path: subscription.path,
                    },
                );
            }
        }
    }

    pub fn set(&mut self, path: &str, value: &SignalValue) -> (Result<()>, Vec<Notice>) {
        let request_id = next_request_id();
        if !self.is_open() || !self.send(&Request::set(request_id.clone(), path, value)) {
            let err = IviError::not_connected(path);
            return (Err(err.clone()), vec![Notice::Error(err.to_string())]);
        }
        self.pending.insert(
            request_id,
            Continuation::Ack {
                action: Action::Set,
                path: path.to_string(),
            },
        );
        (Ok(()), Vec::new())
    }

    pub fn get(&mut self, path: &str) -> Result<oneshot::Receiver<Result<Vec<SignalRecord>>>> {
        let request_id = next_request_id();
        if !self.is_open() || !self.send(&Request::get(request_id.clone(), path)) {
            return Err(IviError::not_connected(path));
        }
        let (reply, receiver) = oneshot::channel();
        self.pending.insert(request_id, Continuation::Get(reply));
        Ok(receiver)
    }

    // ------------------------------------------------------------------
    // Inbound
    // ------------------------------------------------------------------

    pub fn on_frame(&mut self, text: &str) -> Vec<Notice> {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(err) => {
                tracing::warn!(error = %err, "malformed signal frame");
                return vec![Notice::Error(format!("Malformed signal frame: {err}"))];
            }
        };

        if frame.is_action("subscription") && frame.error.is_none() {
            return frame
                .records()
                .into_iter()
                .filter(|record| {
                    let tracked = self.subscriptions.iter().any(|s| s.path == record.path);
                    if !tracked {
                        tracing::debug!(path = %record.path, "update for untracked path");
                    }
                    tracked
                })
                .map(Notice::Update)
                .collect();
        }

        if frame.is_action("subscribe") && frame.error.is_none() {
            if let Some(subscription_id) = frame.subscription_id.clone() {
                self.attach_subscription_id(frame.request_id.as_deref(), subscription_id);
                return Vec::new();
            }
        }

        if let Some(error) = &frame.error {
            let message = error.describe();
            tracing::warn!(%message, "signal server reported an error");
            if let Some(continuation) = frame
                .request_id
                .as_deref()
                .and_then(|id| self.pending.remove(id))
            {
                let reason = error.reason.clone().unwrap_or_default();
                let detail = error.message.clone().unwrap_or_default();
                if let Continuation::Get(reply) = continuation {
                    let _ = reply.send(Err(IviError::protocol(error.code(), reason, detail)));
                }
            }
            return vec![Notice::Error(message)];
        }

        match frame
            .request_id
            .as_deref()
            .and_then(|id| self.pending.remove(id))
        {
            Some(Continuation::Get(reply)) => {
                let _ = reply.send(Ok(frame.records()));
            }
            Some(Continuation::Ack { action, path }) => {
                tracing::debug!(action = action.as_str(), %path, "request acknowledged");
            }
            None => {
                tracing::debug!(action = ?frame.action, request_id = ?frame.request_id, "unmatched signal frame");
            }
        }
        Vec::new()
    }

    /// Prefers the subscription whose subscribe request id the ack echoes;
    /// otherwise takes the first subscription still waiting for an id.
    fn attach_subscription_id(&mut self, request_id: Option<&str>, subscription_id: String) {
        let by_request = request_id.and_then(|id| {
            self.subscriptions.iter().position(|s| {
                s.subscription_id.is_none() && s.request_id.as_deref() == Some(id)
            })
        });
        let index = by_request.or_else(|| {
            self.subscriptions
                .iter()
                .position(|s| s.subscription_id.is_none())
        });
        match index {
            Some(index) => {
                let subscription = &mut self.subscriptions[index];
                tracing::debug!(path = %subscription.path, %subscription_id, "subscription confirmed");
                subscription.subscription_id = Some(subscription_id);
            }
            None => {
                tracing::debug!(%subscription_id, "subscribe ack with no waiting subscription");
            }
        }
    }
}
