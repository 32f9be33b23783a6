//! Request/reply correlation and broadcast fan-out over one connection.
//!
//! Both tables are driven by a single dispatcher task consuming
//! [`ConnectionEvent`]s in transport order, so reply continuations and
//! broadcast handlers never run concurrently with each other.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, warn};

use tapsync_core::{Broadcast, BroadcastKind, Command, Frame, Reply};

use crate::connection::{ConnectionEvent, ConnectionManager, Connectivity, ReconnectPolicy};
use crate::transport::Transport;

type Continuation = Box<dyn FnOnce(Reply) + Send>;
type Handler = Arc<dyn Fn(&Broadcast) + Send + Sync>;

/// Identity of one registered broadcast handler.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

struct Pending {
    command: &'static str,
    epoch: u64,
    continuation: Continuation,
}

struct Inner {
    connection: ConnectionManager,
    next_request: AtomicU64,
    next_subscription: AtomicU64,
    pending: Mutex<HashMap<u64, Pending>>,
    subscriptions: Mutex<HashMap<BroadcastKind, Vec<(SubscriptionId, Handler)>>>,
}

/// Shared handle; clones talk to the same connection and tables.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl Gateway {
    /// Start a connection over `transport` and the dispatcher that serves it.
    pub fn connect(transport: impl Transport, policy: ReconnectPolicy) -> Self {
        let (connection, events) = ConnectionManager::start(Arc::new(transport), policy);
        let inner = Arc::new(Inner {
            connection,
            next_request: AtomicU64::new(1),
            next_subscription: AtomicU64::new(1),
            pending: Mutex::new(HashMap::new()),
            subscriptions: Mutex::new(HashMap::new()),
        });
        tokio::spawn(dispatch_loop(Arc::downgrade(&inner), events));
        Self { inner }
    }

    /// Issue `command`; `continuation` runs exactly once with the reply.
    ///
    /// When no link is up the continuation runs before `send` returns,
    /// with the synthetic not-connected reply.
    pub fn send<F>(&self, command: &Command, continuation: F)
    where
        F: FnOnce(Reply) + Send + 'static,
    {
        let id = self.inner.next_request.fetch_add(1, Ordering::Relaxed);
        let name = command.name();
        let text = match Frame::request(id, command).to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(command = name, error = %e, "failed to encode request");
                continuation(Reply::failure(format!("encode failed: {e}")));
                return;
            }
        };

        // Hold the table while queueing so the dispatcher cannot see the
        // reply (or an undelivered notice) before the entry exists.
        let mut pending = self.inner.pending.lock();
        match self.inner.connection.send(Some(id), text) {
            Ok(epoch) => {
                let _ = pending.insert(
                    id,
                    Pending {
                        command: name,
                        epoch,
                        continuation: Box::new(continuation),
                    },
                );
                debug!(command = name, request_id = id, epoch, "request sent");
            }
            Err(e) => {
                drop(pending);
                debug!(command = name, request_id = id, error = %e, "request not sent");
                continuation(Reply::not_connected());
            }
        }
    }

    /// Future form of [`send`](Self::send).
    pub fn request(&self, command: &Command) -> impl Future<Output = Reply> + Send + 'static {
        let (tx, rx) = oneshot::channel();
        self.send(command, move |reply| {
            let _ = tx.send(reply);
        });
        async move { rx.await.unwrap_or_else(|_| Reply::not_connected()) }
    }

    /// Register a durable handler for `kind`.
    pub fn subscribe<F>(&self, kind: BroadcastKind, handler: F) -> SubscriptionId
    where
        F: Fn(&Broadcast) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.inner
            .subscriptions
            .lock()
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        debug!(event = %kind, subscription = id.0, "subscribed");
        id
    }

    /// Remove exactly `id`, or every handler for `kind` when `id` is `None`.
    /// Returns how many handlers were removed.
    pub fn unsubscribe(&self, kind: BroadcastKind, id: Option<SubscriptionId>) -> usize {
        let mut subscriptions = self.inner.subscriptions.lock();
        let Some(handlers) = subscriptions.get_mut(&kind) else {
            return 0;
        };
        let before = handlers.len();
        match id {
            Some(id) => handlers.retain(|(existing, _)| *existing != id),
            None => handlers.clear(),
        }
        let removed = before - handlers.len();
        if handlers.is_empty() {
            let _ = subscriptions.remove(&kind);
        }
        removed
    }

    pub fn connectivity(&self) -> watch::Receiver<Connectivity> {
        self.inner.connection.connectivity()
    }

    pub fn pending_count(&self) -> usize {
        self.inner.pending.lock().len()
    }

    pub fn subscriber_count(&self, kind: BroadcastKind) -> usize {
        self.inner
            .subscriptions
            .lock()
            .get(&kind)
            .map_or(0, Vec::len)
    }

    /// Close the connection. Outstanding requests resolve as not connected.
    pub async fn shutdown(&self) {
        self.inner.connection.shutdown().await;
    }
}

async fn dispatch_loop(inner: Weak<Inner>, mut events: mpsc::UnboundedReceiver<ConnectionEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = inner.upgrade() else {
            break;
        };
        inner.dispatch(event);
    }
    debug!("gateway dispatcher stopped");
}

impl Inner {
    fn dispatch(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::Frame(text) => self.on_frame(&text),
            ConnectionEvent::Connected { epoch } => debug!(epoch, "gateway sees connection"),
            ConnectionEvent::Lost { epoch } => self.fail_where(|p| p.epoch <= epoch),
            ConnectionEvent::Undelivered { correlation } => {
                let entry = self.pending.lock().remove(&correlation);
                if let Some(entry) = entry {
                    debug!(command = entry.command, request_id = correlation, "request undelivered");
                    (entry.continuation)(Reply::not_connected());
                }
            }
            ConnectionEvent::Stopped => self.fail_where(|_| true),
        }
    }

    fn on_frame(&self, text: &str) {
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error = %e, len = text.len(), "dropping unparseable frame");
                return;
            }
        };

        match frame {
            Frame::Reply { id, reply } => {
                let entry = self.pending.lock().remove(&id);
                match entry {
                    Some(entry) => {
                        debug!(command = entry.command, request_id = id, success = reply.success, "reply received");
                        (entry.continuation)(reply);
                    }
                    None => debug!(request_id = id, "reply for unknown request, ignoring"),
                }
            }
            Frame::Event { event, data } => match Broadcast::decode(&event, data) {
                Ok(Some(broadcast)) => self.publish(&broadcast),
                Ok(None) => debug!(event = %event, "ignoring unknown broadcast"),
                Err(e) => warn!(event = %event, error = %e, "dropping malformed broadcast"),
            },
            Frame::Request { command, .. } => {
                debug!(command = %command, "ignoring request frame from owner");
            }
        }
    }

    fn publish(&self, broadcast: &Broadcast) {
        let kind = broadcast.kind();
        // Handlers run outside the lock so they may (un)subscribe.
        let handlers: Vec<Handler> = self
            .subscriptions
            .lock()
            .get(&kind)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        debug!(event = %kind, handlers = handlers.len(), "broadcast received");
        for handler in handlers {
            handler(broadcast);
        }
    }

    fn fail_where<P>(&self, predicate: P)
    where
        P: Fn(&Pending) -> bool,
    {
        let mut failed: Vec<(u64, Pending)> = {
            let mut pending = self.pending.lock();
            let ids: Vec<u64> = pending
                .iter()
                .filter(|(_, p)| predicate(p))
                .map(|(id, _)| *id)
                .collect();
            ids.into_iter()
                .filter_map(|id| pending.remove(&id).map(|p| (id, p)))
                .collect()
        };
        if failed.is_empty() {
            return;
        }
        failed.sort_by_key(|(id, _)| *id);
        debug!(count = failed.len(), "failing pending requests");
        for (_, entry) in failed {
            (entry.continuation)(Reply::not_connected());
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // last handle gone: nothing can answer these anymore
        self.fail_where(|_| true);
    }
}
