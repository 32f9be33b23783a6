//! Connection lifecycle: one link at a time, fixed-delay reconnection,
//! connectivity published on a watch channel.

use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::transport::{Link, Transport};

/// Bounded, fixed-delay retry. Failed initial connects count too.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(1),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
    /// Waiting to make attempt number `attempt`.
    Reconnecting { attempt: u32 },
}

/// Snapshot of the connection as seen by consumers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Connectivity {
    pub state: ConnectionState,
    /// Incremented on every successful (re)connection.
    pub epoch: u64,
    /// The driver has stopped for good (retries exhausted or shut down).
    pub stopped: bool,
}

impl Connectivity {
    pub fn connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    pub fn reconnecting(&self) -> bool {
        matches!(self.state, ConnectionState::Reconnecting { .. })
    }

    /// Terminal connectivity failure: no further automatic attempts.
    pub fn gave_up(&self) -> bool {
        self.stopped && self.state == ConnectionState::Disconnected
    }
}

/// What the driver reports to the layer above, in transport order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConnectionEvent {
    Connected { epoch: u64 },
    /// One inbound text frame.
    Frame(String),
    /// The link for `epoch` is gone; nothing sent on it will be answered.
    Lost { epoch: u64 },
    /// An outbound frame never reached a link.
    Undelivered { correlation: u64 },
    /// The driver has exited.
    Stopped,
}

struct Outbound {
    epoch: u64,
    correlation: Option<u64>,
    text: String,
}

/// Owns the single transport link of this process.
///
/// Dropping the manager cancels its driver task.
pub struct ConnectionManager {
    outbound: mpsc::UnboundedSender<Outbound>,
    state: watch::Receiver<Connectivity>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectionManager {
    /// Spawn the driver. Events for the layer above arrive on the returned
    /// receiver.
    pub fn start(
        transport: Arc<dyn Transport>,
        policy: ReconnectPolicy,
    ) -> (Self, mpsc::UnboundedReceiver<ConnectionEvent>) {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(Connectivity::default());
        let cancel = CancellationToken::new();

        let driver = Driver {
            transport,
            policy,
            outbound: outbound_rx,
            events: events_tx,
            state: state_tx,
            cancel: cancel.clone(),
            epoch: 0,
        };
        let task = tokio::spawn(driver.run());

        let manager = Self {
            outbound: outbound_tx,
            state: state_rx,
            cancel,
            task: Mutex::new(Some(task)),
        };
        (manager, events_rx)
    }

    /// Queue a frame on the live link.
    ///
    /// Fails immediately when not connected; never queues for a later link.
    /// Returns the epoch of the link the frame was queued for.
    pub fn send(&self, correlation: Option<u64>, text: String) -> Result<u64, TransportError> {
        let current = *self.state.borrow();
        if !current.connected() {
            return Err(TransportError::NotConnected);
        }
        self.outbound
            .send(Outbound {
                epoch: current.epoch,
                correlation,
                text,
            })
            .map_err(|_| TransportError::NotConnected)?;
        Ok(current.epoch)
    }

    pub fn connectivity(&self) -> watch::Receiver<Connectivity> {
        self.state.clone()
    }

    pub fn current(&self) -> Connectivity {
        *self.state.borrow()
    }

    /// Stop the driver and wait for it to close the link.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

enum LinkEnd {
    Cancelled,
    Lost(String),
}

struct Driver {
    transport: Arc<dyn Transport>,
    policy: ReconnectPolicy,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<ConnectionEvent>,
    state: watch::Sender<Connectivity>,
    cancel: CancellationToken,
    epoch: u64,
}

impl Driver {
    async fn run(mut self) {
        let target = self.transport.describe();
        let mut failures: u32 = 0;

        loop {
            let Some(result) = self.connect().await else {
                break;
            };

            match result {
                Ok(link) => {
                    failures = 0;
                    self.epoch += 1;
                    let epoch = self.epoch;
                    self.publish(ConnectionState::Connected);
                    self.emit(ConnectionEvent::Connected { epoch });
                    info!(transport = %target, epoch, "connected");

                    match self.run_link(link).await {
                        LinkEnd::Cancelled => {
                            self.emit(ConnectionEvent::Lost { epoch });
                            break;
                        }
                        LinkEnd::Lost(reason) => {
                            warn!(transport = %target, epoch, reason = %reason, "connection lost");
                            if self.policy.max_attempts == 0 {
                                self.publish(ConnectionState::Disconnected);
                                self.emit(ConnectionEvent::Lost { epoch });
                                error!(transport = %target, "reconnection disabled, giving up");
                                break;
                            }
                            self.publish(ConnectionState::Reconnecting { attempt: 1 });
                            self.emit(ConnectionEvent::Lost { epoch });
                        }
                    }
                }
                Err(e) => {
                    failures += 1;
                    warn!(transport = %target, attempt = failures, error = %e, "connect attempt failed");
                    if failures >= self.policy.max_attempts {
                        error!(transport = %target, attempts = failures, "giving up on connection");
                        break;
                    }
                    self.publish(ConnectionState::Reconnecting {
                        attempt: failures + 1,
                    });
                }
            }

            if !self.idle(self.policy.delay).await {
                break;
            }
        }

        self.state.send_modify(|c| {
            c.state = ConnectionState::Disconnected;
            c.stopped = true;
        });
        self.outbound.close();
        while let Ok(frame) = self.outbound.try_recv() {
            self.reject(frame);
        }
        self.emit(ConnectionEvent::Stopped);
        debug!(transport = %target, "connection driver stopped");
    }

    /// One connect attempt. `None` when cancelled.
    async fn connect(&mut self) -> Option<Result<Link, TransportError>> {
        let transport = Arc::clone(&self.transport);
        let connect = transport.connect();
        tokio::pin!(connect);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return None,
                result = &mut connect => return Some(result),
                Some(frame) = self.outbound.recv() => self.reject(frame),
            }
        }
    }

    /// Sleep between attempts. `false` when cancelled.
    async fn idle(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                _ = &mut sleep => return true,
                Some(frame) = self.outbound.recv() => self.reject(frame),
            }
        }
    }

    async fn run_link(&mut self, link: Link) -> LinkEnd {
        let Link {
            mut sink,
            mut stream,
        } = link;

        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    let _ = sink.close().await;
                    return LinkEnd::Cancelled;
                }
                frame = self.outbound.recv() => {
                    let Some(frame) = frame else {
                        let _ = sink.close().await;
                        return LinkEnd::Cancelled;
                    };
                    if frame.epoch != self.epoch {
                        self.reject(frame);
                        continue;
                    }
                    let correlation = frame.correlation;
                    if let Err(e) = sink.send(frame.text).await {
                        if let Some(correlation) = correlation {
                            self.emit(ConnectionEvent::Undelivered { correlation });
                        }
                        return LinkEnd::Lost(e.to_string());
                    }
                }
                inbound = stream.next() => match inbound {
                    Some(Ok(text)) => self.emit(ConnectionEvent::Frame(text)),
                    Some(Err(e)) => return LinkEnd::Lost(e.to_string()),
                    None => return LinkEnd::Lost("closed by peer".to_string()),
                },
            }
        }
    }

    fn publish(&self, state: ConnectionState) {
        let epoch = self.epoch;
        self.state.send_replace(Connectivity {
            state,
            epoch,
            stopped: false,
        });
    }

    fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event);
    }

    fn reject(&self, frame: Outbound) {
        debug!(
            frame_epoch = frame.epoch,
            epoch = self.epoch,
            "dropping frame queued for a dead link"
        );
        if let Some(correlation) = frame.correlation {
            self.emit(ConnectionEvent::Undelivered { correlation });
        }
    }
}
