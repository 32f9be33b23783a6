use async_trait::async_trait;
use futures::{future, SinkExt, StreamExt};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{Link, Transport};

/// WebSocket transport. Each text message is one frame; binary and
/// control messages are skipped, a close message ends the link.
#[derive(Clone, Debug)]
pub struct WsTransport {
    url: String,
}

impl WsTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&self) -> Result<Link, TransportError> {
        let (ws, _response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!(url = %self.url, "websocket connected");

        let (ws_tx, ws_rx) = ws.split();

        let sink = ws_tx.with(|text: String| future::ready(Ok::<_, TransportError>(Message::text(text))));

        let stream = ws_rx
            .take_while(|msg| future::ready(!matches!(msg, Ok(Message::Close(_)))))
            .filter_map(|msg| {
                future::ready(match msg {
                    Ok(Message::Text(text)) => Some(Ok(text.as_str().to_owned())),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::from(e))),
                })
            });

        Ok(Link::new(sink, stream))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}
