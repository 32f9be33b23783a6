//! Async host driver around [`HostMachine`].

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use tapsync_client::{Connectivity, SessionClient};
use tapsync_core::{
    Ack, Broadcast, CreatedSession, Role, SessionError, SessionResult, SessionSnapshot,
};

use crate::config::EngineConfig;
use crate::driver::{sleep_until_opt, Poster, SubscriptionGuard};
use crate::host::{HostMachine, HostView};

type Responder<T> = oneshot::Sender<SessionResult<T>>;

enum HostMsg {
    Create(Responder<CreatedSession>),
    Start(Responder<()>),
    Created(SessionResult<CreatedSession>, Responder<CreatedSession>),
    Started(SessionResult<Ack>, Responder<()>),
    Snapshot(SessionResult<SessionSnapshot>),
    Broadcast(Broadcast),
}

/// A running host. All state lives in one task; this handle only posts
/// commands and exposes the published [`HostView`].
///
/// Dropping the handle cancels the task.
pub struct HostSession {
    poster: Poster<HostMsg>,
    view: watch::Receiver<HostView>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HostSession {
    pub fn start(client: SessionClient, config: EngineConfig) -> Self {
        let (poster, inbox) = Poster::channel(Role::Host);
        let machine = HostMachine::new(&config);
        let (view_tx, view_rx) = watch::channel(machine.view());
        let guard = poster.subscribe_all(client.gateway(), HostMsg::Broadcast);
        let cancel = CancellationToken::new();

        let task = HostTask {
            connectivity: client.connectivity(),
            client,
            machine,
            poster: poster.clone(),
            view: view_tx,
            cancel: cancel.clone(),
            _guard: guard,
        };
        let task = tokio::spawn(task.run(inbox));

        Self {
            poster,
            view: view_rx,
            cancel,
            task: Mutex::new(Some(task)),
        }
    }

    /// Ask the owner for a new session. A second successful create while a
    /// session exists is ignored by the machine.
    pub async fn create_session(&self) -> SessionResult<CreatedSession> {
        self.ask(HostMsg::Create).await
    }

    /// Start the game once at least one participant has joined.
    pub async fn start_session(&self) -> SessionResult<()> {
        self.ask(HostMsg::Start).await
    }

    async fn ask<T>(&self, make: fn(Responder<T>) -> HostMsg) -> SessionResult<T> {
        let (tx, rx) = oneshot::channel();
        self.poster.post(make(tx));
        rx.await.unwrap_or(Err(SessionError::TransportUnavailable))
    }

    pub fn view(&self) -> watch::Receiver<HostView> {
        self.view.clone()
    }

    pub fn current(&self) -> HostView {
        self.view.borrow().clone()
    }

    pub async fn shutdown(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}

impl Drop for HostSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct HostTask {
    client: SessionClient,
    connectivity: watch::Receiver<Connectivity>,
    machine: HostMachine,
    poster: Poster<HostMsg>,
    view: watch::Sender<HostView>,
    cancel: CancellationToken,
    _guard: SubscriptionGuard,
}

impl HostTask {
    #[instrument(name = "host_session", skip_all)]
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<HostMsg>) {
        let initial = *self.connectivity.borrow_and_update();
        self.on_connectivity(initial);
        self.publish();

        let mut connectivity_open = true;
        loop {
            let deadline = self.machine.next_deadline();
            tokio::select! {
                () = self.cancel.cancelled() => break,
                message = inbox.recv() => match message {
                    Some(message) => self.handle(message),
                    None => break,
                },
                changed = self.connectivity.changed(), if connectivity_open => match changed {
                    Ok(()) => {
                        let current = *self.connectivity.borrow_and_update();
                        self.on_connectivity(current);
                    }
                    Err(_) => connectivity_open = false,
                },
                () = sleep_until_opt(deadline) => self.machine.on_timer(Instant::now()),
            }
            self.publish();
        }
        info!("host session stopped");
    }

    fn handle(&mut self, message: HostMsg) {
        let now = Instant::now();
        match message {
            HostMsg::Create(responder) => {
                let poster = self.poster.clone();
                self.client
                    .create_session()
                    .then(move |result| poster.post(HostMsg::Created(result, responder)));
            }
            HostMsg::Created(result, responder) => {
                if let Ok(created) = &result {
                    info!(session_id = %created.session_id, "session created");
                }
                self.machine.on_created(result.clone(), now);
                let _ = responder.send(result);
            }
            HostMsg::Start(responder) => match self.machine.check_start() {
                Ok(session_id) => {
                    let poster = self.poster.clone();
                    self.client
                        .start_session(&session_id)
                        .then(move |result| poster.post(HostMsg::Started(result, responder)));
                }
                Err(e) => {
                    debug!(error = %e, "start refused locally");
                    let _ = responder.send(Err(SessionError::Validation(e)));
                }
            },
            HostMsg::Started(result, responder) => {
                self.machine.on_start_reply(result.clone(), now);
                let _ = responder.send(result.map(|_| ()));
            }
            HostMsg::Snapshot(result) => self.machine.on_snapshot(result, now),
            HostMsg::Broadcast(broadcast) => self.machine.on_broadcast(&broadcast, now),
        }
    }

    fn on_connectivity(&mut self, connectivity: Connectivity) {
        if let Some(session_id) = self.machine.on_connectivity(connectivity) {
            info!(session_id = %session_id, epoch = connectivity.epoch, "reconnected, resyncing");
            let poster = self.poster.clone();
            self.client
                .query_session_state(&session_id)
                .then(move |result| poster.post(HostMsg::Snapshot(result)));
        }
    }

    fn publish(&self) {
        let _ = self.view.send_replace(self.machine.view());
    }
}
