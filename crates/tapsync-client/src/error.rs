#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),

    #[error("websocket error: {0}")]
    WebSocket(String),

    #[error("link closed")]
    Closed,

    #[error("not connected")]
    NotConnected,
}

impl From<tokio_tungstenite::tungstenite::Error> for TransportError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error;
        match e {
            Error::ConnectionClosed | Error::AlreadyClosed => TransportError::Closed,
            other => TransportError::WebSocket(other.to_string()),
        }
    }
}
