//! Control-channel transport
//!
//! The channel only needs a text sink and a text stream. [`WsConnector`] opens
//! them over a WebSocket; tests substitute an in-memory connector.

use std::pin::Pin;

use async_trait::async_trait;
use futures::{future, Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::{AppError, Result};

/// Outbound half of an open connection
pub type TextSink = Pin<Box<dyn Sink<String, Error = AppError> + Send>>;

/// Inbound half of an open connection; ends when the peer closes
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// An open control connection
pub struct Connection {
    pub sink: TextSink,
    pub stream: TextStream,
}

/// Opens control connections
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open one connection to `url`
    async fn connect(&self, url: &str) -> Result<Connection>;
}

/// WebSocket connector (`ws://` and `wss://`)
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection> {
        let (ws, response) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(|e| AppError::Signaling(format!("Failed to connect to {}: {}", url, e)))?;
        debug!("Signaling handshake complete: HTTP {}", response.status());

        let (sink, stream) = ws.split();

        let sink = sink
            .with(|text: String| future::ok::<_, tokio_tungstenite::tungstenite::Error>(Message::Text(text)))
            .sink_map_err(|e| AppError::Signaling(format!("WebSocket send failed: {}", e)));

        // Binary, ping and pong frames carry nothing for the signaling protocol
        let stream = stream.filter_map(|frame| {
            future::ready(match frame {
                Ok(Message::Text(text)) => Some(Ok(text)),
                Ok(_) => None,
                Err(e) => Some(Err(AppError::Signaling(format!(
                    "WebSocket receive failed: {}",
                    e
                )))),
            })
        });

        Ok(Connection {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}
