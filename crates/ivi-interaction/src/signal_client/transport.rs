//! Transport seam for the signal client.
//!
//! A connector opens one text-frame duplex per connection attempt. The
//! production connector speaks WebSocket; tests plug in in-memory channels.

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use ivi_core::{IviError, Result};
use std::pin::Pin;
use tokio_tungstenite::tungstenite::Message;

pub type FrameSink = Pin<Box<dyn Sink<String, Error = IviError> + Send>>;
pub type FrameStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// One open connection: outbound text frames and inbound text frames.
///
/// The inbound stream ending (or yielding an error) means the connection closed.
pub struct SignalTransport {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

impl SignalTransport {
    pub fn new(sink: FrameSink, stream: FrameStream) -> Self {
        Self { sink, stream }
    }
}

#[async_trait]
pub trait SignalConnector: Send + Sync {
    async fn open(&self, url: &str) -> Result<SignalTransport>;
}

/// Connects over WebSocket with `tokio-tungstenite`.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl SignalConnector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<SignalTransport> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|err| IviError::transport(format!("Failed to connect to {url}: {err}")))?;

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(|err| IviError::transport(format!("WebSocket send failed: {err}")))
            .with(|frame: String| future::ready(Ok::<_, IviError>(Message::Text(frame))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                    Ok(text) => Some(Ok(text)),
                    Err(_) => {
                        tracing::debug!("dropping non-UTF-8 binary frame");
                        None
                    }
                },
                // Ping/pong are answered by tungstenite; close is followed by end of stream.
                Ok(_) => None,
                Err(err) => Some(Err(IviError::transport(format!(
                    "WebSocket receive failed: {err}"
                )))),
            })
        });

        Ok(SignalTransport::new(Box::pin(sink), Box::pin(stream)))
    }
}
