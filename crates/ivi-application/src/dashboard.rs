//! Dashboard - the consumer-facing surface of the streaming layer.
//!
//! Wires the signal client through the update coalescer into the signal
//! store, and owns the chat session. Renderers read snapshots and watch
//! receivers; they never mutate state directly.

use crate::chat_session::ChatSession;
use crate::coalescer::{FlushScheduler, TickScheduler, UpdateCoalescer};
use crate::signal_store::SignalStore;
use ivi_core::chat::ChatState;
use ivi_core::config::DashboardConfig;
use ivi_core::signal::{LinkStatus, SignalMap, SignalRecord, SignalValue};
use ivi_core::Result;
use ivi_interaction::{
    SignalClient, SignalConnector, TurnStreamer, VehicleAgentClient, WebSocketConnector,
};
use std::sync::Arc;
use tokio::sync::watch;

pub struct Dashboard {
    config: DashboardConfig,
    store: Arc<SignalStore>,
    coalescer: Arc<UpdateCoalescer>,
    signals: SignalClient,
    chat: ChatSession,
}

impl Dashboard {
    /// Builds a dashboard from explicit collaborators.
    pub fn new(
        config: DashboardConfig,
        connector: Arc<dyn SignalConnector>,
        streamer: Arc<dyn TurnStreamer>,
        scheduler: Arc<dyn FlushScheduler>,
    ) -> Self {
        let store = Arc::new(SignalStore::new());
        let coalescer = Arc::new(UpdateCoalescer::new(Arc::clone(&store), scheduler));
        let signals = SignalClient::new(&config.signal, connector, coalescer.clone());
        let chat = ChatSession::new(streamer);
        Self {
            config,
            store,
            coalescer,
            signals,
            chat,
        }
    }

    /// WebSocket signal client, HTTP agent client and a tokio frame timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn from_config(config: DashboardConfig) -> Result<Self> {
        let agent = VehicleAgentClient::from_config(&config.agent)?;
        let scheduler = TickScheduler::new(config.render.frame_interval())?;
        Ok(Self::new(
            config,
            Arc::new(WebSocketConnector),
            Arc::new(agent),
            Arc::new(scheduler),
        ))
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// Subscribes the configured signals and starts connecting.
    pub fn start(&self) {
        self.start_with(self.config.subscriptions.iter().cloned());
    }

    /// Subscribes `paths` instead of the configured set and starts connecting.
    pub fn start_with<I>(&self, paths: I)
    where
        I: IntoIterator<Item = String>,
    {
        self.signals.subscribe(paths);
        self.signals.connect();
    }

    // ------------------------------------------------------------------
    // Signals
    // ------------------------------------------------------------------

    /// Latest flushed value of every signal.
    pub fn get_signals(&self) -> Arc<SignalMap> {
        self.store.snapshot()
    }

    pub fn watch_signals(&self) -> watch::Receiver<Arc<SignalMap>> {
        self.store.subscribe()
    }

    pub fn link_status(&self) -> LinkStatus {
        self.store.link_status()
    }

    pub fn watch_link(&self) -> watch::Receiver<LinkStatus> {
        self.store.watch_link()
    }

    pub fn subscribe<I, S>(&self, paths: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.signals.subscribe(paths);
    }

    pub fn unsubscribe(&self, path: &str) {
        self.signals.unsubscribe(path);
    }

    /// Writes an actuator target. Fails immediately when not connected.
    pub fn set_actuator(&self, path: &str, value: impl Into<SignalValue>) -> Result<()> {
        self.signals.set(path, value)
    }

    /// Reads one signal from the server, bypassing the store.
    pub async fn get_signal(&self, path: &str) -> Result<SignalRecord> {
        self.signals.get(path).await
    }

    // ------------------------------------------------------------------
    // Chat
    // ------------------------------------------------------------------

    /// Sends a user message, cancelling any turn still streaming.
    pub fn send_turn(&self, text: &str) -> Option<String> {
        self.chat.send_turn(text)
    }

    pub fn cancel_turn(&self) {
        self.chat.cancel_turn();
    }

    pub fn chat_state(&self) -> Arc<ChatState> {
        self.chat.state()
    }

    pub fn watch_chat(&self) -> watch::Receiver<Arc<ChatState>> {
        self.chat.watch()
    }

    /// Stops streaming, disconnects, and drops all signal state.
    pub fn shutdown(&self) {
        tracing::info!("dashboard shutting down");
        self.chat.cancel_turn();
        self.signals.disconnect();
        self.coalescer.teardown();
        self.store.clear();
    }
}
