//! Application layer for the IVI dashboard.
//!
//! This crate connects the network clients to consumer-facing state: the
//! update coalescer and signal store, the chat session, and the
//! [`Dashboard`] facade that renderers talk to.

pub mod chat_session;
pub mod coalescer;
pub mod dashboard;
pub mod signal_store;
pub mod tracing_layer;

pub use chat_session::ChatSession;
pub use coalescer::{FlushHandle, FlushScheduler, ManualScheduler, TickScheduler, UpdateCoalescer};
pub use dashboard::Dashboard;
pub use signal_store::SignalStore;
pub use tracing_layer::{DiagnosticEvent, DiagnosticsLayer};
