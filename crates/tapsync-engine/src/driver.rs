//! Plumbing shared by the host and player session tasks.
//!
//! Gateway callbacks (reply continuations and broadcast handlers) never
//! touch a role machine directly. They post a message into the owning
//! task's inbox through a [`Poster`], and the task applies it on its own
//! schedule. Once a session shuts down its poster goes inactive, so late
//! replies and broadcasts are dropped instead of resurrecting state.

use std::future::pending;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::debug;

use tapsync_client::{Gateway, SubscriptionId};
use tapsync_core::{Broadcast, BroadcastKind, Role};

pub(crate) struct Poster<M> {
    tx: mpsc::UnboundedSender<M>,
    active: Arc<AtomicBool>,
    role: Role,
}

impl<M> Clone for Poster<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            active: Arc::clone(&self.active),
            role: self.role,
        }
    }
}

impl<M: Send + 'static> Poster<M> {
    pub(crate) fn channel(role: Role) -> (Self, mpsc::UnboundedReceiver<M>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poster = Self {
            tx,
            active: Arc::new(AtomicBool::new(true)),
            role,
        };
        (poster, rx)
    }

    pub(crate) fn post(&self, message: M) {
        if !self.active.load(Ordering::Acquire) {
            debug!(role = ?self.role, "session closed, dropping late message");
            return;
        }
        if self.tx.send(message).is_err() {
            debug!(role = ?self.role, "session task gone, dropping message");
        }
    }

    /// Subscribe to every broadcast kind, wrapping each into a message.
    pub(crate) fn subscribe_all(&self, gateway: &Gateway, wrap: fn(Broadcast) -> M) -> SubscriptionGuard {
        let ids = BroadcastKind::ALL
            .into_iter()
            .map(|kind| {
                let poster = self.clone();
                let id = gateway.subscribe(kind, move |broadcast| poster.post(wrap(broadcast.clone())));
                (kind, id)
            })
            .collect();
        SubscriptionGuard {
            gateway: gateway.clone(),
            ids,
            active: Arc::clone(&self.active),
        }
    }
}

/// Removes exactly the handlers this session registered, and deactivates
/// its poster, when dropped.
pub(crate) struct SubscriptionGuard {
    gateway: Gateway,
    ids: Vec<(BroadcastKind, SubscriptionId)>,
    active: Arc<AtomicBool>,
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::Release);
        for (kind, id) in self.ids.drain(..) {
            let _ = self.gateway.unsubscribe(kind, Some(id));
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub(crate) async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => pending::<()>().await,
    }
}
