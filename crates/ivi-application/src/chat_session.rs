//! Assistant turn lifecycle.
//!
//! `send_turn` appends the user message and an empty assistant message,
//! then streams the agent's events into that assistant message on a spawned
//! task. Only one turn streams at a time: starting a turn cancels the
//! previous one. Cancellation leaves the partial message in place and never
//! sets the error field.

use futures::StreamExt;
use ivi_core::chat::{ChatMessage, ChatRequest, ChatState, FoldStep, StreamEvent};
use ivi_interaction::TurnStreamer;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

enum TurnOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

struct ActiveTurn {
    id: u64,
    cancel: CancellationToken,
}

struct ChatInner {
    streamer: Arc<dyn TurnStreamer>,
    state: watch::Sender<Arc<ChatState>>,
    active: Mutex<Option<ActiveTurn>>,
    next_turn: AtomicU64,
}

/// Conversation with the vehicle agent.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<ChatInner>,
}

impl ChatSession {
    pub fn new(streamer: Arc<dyn TurnStreamer>) -> Self {
        let (state, _) = watch::channel(Arc::new(ChatState::default()));
        Self {
            inner: Arc::new(ChatInner {
                streamer,
                state,
                active: Mutex::new(None),
                next_turn: AtomicU64::new(1),
            }),
        }
    }

    pub fn state(&self) -> Arc<ChatState> {
        Arc::clone(&*self.inner.state.borrow())
    }

    pub fn watch(&self) -> watch::Receiver<Arc<ChatState>> {
        self.inner.state.subscribe()
    }

    pub fn is_streaming(&self) -> bool {
        self.inner.state.borrow().streaming
    }

    /// Starts a turn and returns the id of its assistant message.
    ///
    /// Blank input is ignored. Must be called from within a tokio runtime.
    pub fn send_turn(&self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }

        let mut active = self.inner.lock_active();

        let assistant = ChatMessage::assistant();
        let message_id = assistant.id.clone();
        let mut request = None;
        self.inner.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            // History is built from the turns before this one.
            request = Some(ChatRequest::new(text, &state.messages));
            state.messages.push(ChatMessage::user(text));
            state.messages.push(assistant);
            state.streaming = true;
            state.error = None;
        });
        let request = request?;

        let turn_id = self.inner.next_turn.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();
        let previous = active.replace(ActiveTurn {
            id: turn_id,
            cancel: cancel.clone(),
        });

        if let Some(previous) = previous {
            tracing::debug!(turn = previous.id, "superseding previous turn");
            previous.cancel.cancel();
        }

        tracing::info!(turn = turn_id, history = request.history.len(), "starting assistant turn");
        tokio::spawn(Arc::clone(&self.inner).run_turn(turn_id, request, message_id.clone(), cancel));
        Some(message_id)
    }

    /// Aborts the streaming turn, if any. Not reported as an error.
    pub fn cancel_turn(&self) {
        let Some(turn) = self.inner.lock_active().take() else {
            return;
        };
        tracing::info!(turn = turn.id, "cancelling assistant turn");
        turn.cancel.cancel();
        self.inner.state.send_if_modified(|state| {
            if !state.streaming {
                return false;
            }
            Arc::make_mut(state).streaming = false;
            true
        });
    }
}

impl ChatInner {
    fn lock_active(&self) -> MutexGuard<'_, Option<ActiveTurn>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn run_turn(
        self: Arc<Self>,
        turn_id: u64,
        request: ChatRequest,
        message_id: String,
        cancel: CancellationToken,
    ) {
        let outcome = tokio::select! {
            biased;
            _ = cancel.cancelled() => TurnOutcome::Cancelled,
            outcome = self.stream_turn(&request, &message_id) => outcome,
        };

        match &outcome {
            TurnOutcome::Completed => tracing::info!(turn = turn_id, "assistant turn completed"),
            TurnOutcome::Failed(message) => {
                tracing::error!(turn = turn_id, error = %message, "assistant turn failed")
            }
            TurnOutcome::Cancelled => tracing::debug!(turn = turn_id, "assistant turn cancelled"),
        }
        self.finish_turn(turn_id, outcome);
    }

    async fn stream_turn(&self, request: &ChatRequest, message_id: &str) -> TurnOutcome {
        let mut events = match self.streamer.open_turn(request).await {
            Ok(events) => events,
            Err(err) => return TurnOutcome::Failed(err.to_string()),
        };

        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(err) => return TurnOutcome::Failed(err.to_string()),
            };
            match self.apply(message_id, event) {
                FoldStep::Continue => {}
                FoldStep::Completed => return TurnOutcome::Completed,
                FoldStep::Failed(message) => return TurnOutcome::Failed(message),
            }
        }
        tracing::debug!("agent stream ended without a done event");
        TurnOutcome::Completed
    }

    fn apply(&self, message_id: &str, event: StreamEvent) -> FoldStep {
        match event {
            StreamEvent::Error { message } => return FoldStep::Failed(message),
            StreamEvent::Done => return FoldStep::Completed,
            _ => {}
        }
        let mut step = FoldStep::Continue;
        self.state.send_if_modified(|state| {
            let state = Arc::make_mut(state);
            match state.messages.iter_mut().rev().find(|m| m.id == message_id) {
                Some(message) => {
                    step = message.apply_event(event);
                    true
                }
                None => false,
            }
        });
        step
    }

    /// Clears the streaming flag (and records a failure) only if this turn
    /// is still the active one.
    fn finish_turn(&self, turn_id: u64, outcome: TurnOutcome) {
        let mut active = self.lock_active();
        if active.as_ref().map(|turn| turn.id) != Some(turn_id) {
            return;
        }
        *active = None;
        self.state.send_modify(|state| {
            let state = Arc::make_mut(state);
            state.streaming = false;
            if let TurnOutcome::Failed(message) = outcome {
                state.error = Some(message);
            }
        });
    }
}
