//! In-process transport.
//!
//! [`MemoryTransport::pair`] returns the client half (handed to a
//! [`ConnectionManager`](crate::ConnectionManager)) and a [`MemoryServer`]
//! that receives one [`MemoryPeer`] per successful `connect`. Used by tests
//! and by embedders that host the session owner in the same process.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

use tapsync_core::{Broadcast, Frame, Reply};

use crate::error::TransportError;
use crate::transport::{Link, Transport};

type ToClient = mpsc::UnboundedSender<Result<String, TransportError>>;

struct Shared {
    refusing: AtomicBool,
    accept_tx: mpsc::UnboundedSender<MemoryPeer>,
    current: Mutex<Option<ToClient>>,
}

/// Client half. Clones share the same server and link.
#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

/// Server half: hands out one peer per accepted connection.
pub struct MemoryServer {
    accept_rx: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryTransport {
    pub fn pair() -> (Self, MemoryServer) {
        let (accept_tx, accept_rx) = mpsc::unbounded();
        let transport = Self {
            shared: Arc::new(Shared {
                refusing: AtomicBool::new(false),
                accept_tx,
                current: Mutex::new(None),
            }),
        };
        (transport, MemoryServer { accept_rx })
    }

    /// Make subsequent `connect` calls fail (or succeed again).
    pub fn set_refusing(&self, refusing: bool) {
        self.shared.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Kill the current link as if the network dropped it.
    pub fn sever(&self) -> bool {
        match self.shared.current.lock().take() {
            Some(tx) => tx.unbounded_send(Err(TransportError::Closed)).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn connect(&self) -> Result<Link, TransportError> {
        if self.shared.refusing.load(Ordering::SeqCst) {
            return Err(TransportError::Connect("connection refused".into()));
        }

        let (to_server_tx, to_server_rx) = mpsc::unbounded::<String>();
        let (to_client_tx, to_client_rx) = mpsc::unbounded::<Result<String, TransportError>>();

        let peer = MemoryPeer {
            requests: to_server_rx,
            handle: PeerHandle {
                tx: to_client_tx.clone(),
            },
        };
        self.shared
            .accept_tx
            .unbounded_send(peer)
            .map_err(|_| TransportError::Connect("server gone".into()))?;

        *self.shared.current.lock() = Some(to_client_tx);

        let sink = to_server_tx.sink_map_err(|_| TransportError::Closed);
        Ok(Link::new(sink, to_client_rx))
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

impl MemoryServer {
    /// Wait for the next connection. `None` once every transport clone is gone.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accept_rx.next().await
    }
}

/// A request frame as seen by the owner side.
#[derive(Clone, Debug, PartialEq)]
pub struct InboundRequest {
    pub id: u64,
    pub command: String,
    pub payload: Value,
}

impl InboundRequest {
    pub fn str_field(&self, name: &str) -> Option<&str> {
        self.payload.get(name).and_then(Value::as_str)
    }
}

/// Server-side end of one link.
pub struct MemoryPeer {
    requests: mpsc::UnboundedReceiver<String>,
    handle: PeerHandle,
}

impl MemoryPeer {
    /// Next raw text frame from the client.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.requests.next().await
    }

    /// Next request frame; other frames are skipped. `None` once the client
    /// side of the link is closed.
    pub async fn next_request(&mut self) -> Option<InboundRequest> {
        loop {
            let text = self.requests.next().await?;
            match Frame::parse(&text) {
                Ok(Frame::Request {
                    id,
                    command,
                    payload,
                }) => {
                    return Some(InboundRequest {
                        id,
                        command,
                        payload,
                    })
                }
                Ok(_) => debug!("memory peer ignoring non-request frame"),
                Err(e) => debug!(error = %e, "memory peer ignoring unparseable frame"),
            }
        }
    }

    pub fn handle(&self) -> PeerHandle {
        self.handle.clone()
    }

    pub fn reply(&self, id: u64, reply: Reply) -> bool {
        self.handle.reply(id, reply)
    }

    pub fn broadcast(&self, broadcast: &Broadcast) -> bool {
        self.handle.broadcast(broadcast)
    }
}

/// Cloneable sending half of a [`MemoryPeer`].
#[derive(Clone)]
pub struct PeerHandle {
    tx: ToClient,
}

impl PeerHandle {
    pub fn send_text(&self, text: impl Into<String>) -> bool {
        self.tx.unbounded_send(Ok(text.into())).is_ok()
    }

    pub fn send_frame(&self, frame: &Frame) -> bool {
        match frame.to_text() {
            Ok(text) => self.send_text(text),
            Err(_) => false,
        }
    }

    pub fn reply(&self, id: u64, reply: Reply) -> bool {
        self.send_frame(&Frame::Reply { id, reply })
    }

    pub fn broadcast(&self, broadcast: &Broadcast) -> bool {
        let (event, data) = broadcast.encode();
        self.send_frame(&Frame::Event {
            event: event.to_string(),
            data,
        })
    }

    /// End the client's stream cleanly.
    pub fn close(&self) {
        self.tx.close_channel();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}
