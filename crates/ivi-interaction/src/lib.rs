//! Network clients for the IVI dashboard: the persistent signal-server
//! connection and the vehicle agent's streaming chat endpoint.

pub mod agent_client;
pub mod signal_client;
pub mod sse;

pub use agent_client::{AgentHealth, EventStream, TurnStreamer, VehicleAgentClient};
pub use signal_client::{
    SignalClient, SignalConnector, SignalHandler, SignalTransport, Subscription,
    WebSocketConnector,
};
pub use sse::{SseDecoder, decode_event_stream};
