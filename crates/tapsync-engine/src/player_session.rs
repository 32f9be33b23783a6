//! Async player driver around [`PlayerMachine`].

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use tapsync_client::{Connectivity, SessionClient};
use tapsync_core::{
    Broadcast, JoinedSession, PlayerIdentity, RejoinState, Role, SessionResult, SessionSnapshot,
    TapAck,
};
use tapsync_store::IdentityRepo;

use crate::config::EngineConfig;
use crate::driver::{sleep_until_opt, Poster, SubscriptionGuard};
use crate::error::EngineError;
use crate::player::{PlayerMachine, PlayerView, RejoinOutcome};

enum PlayerMsg {
    Tap,
    Rejoined(SessionResult<RejoinState>),
    Readded(SessionResult<JoinedSession>),
    Snapshot(SessionResult<SessionSnapshot>),
    TapReplied(SessionResult<TapAck>),
    Broadcast(Broadcast),
}

/// A running player bound to one persisted identity.
///
/// Every new connection (the first one included) triggers a rejoin followed
/// by a full state query. Dropping the handle cancels the task.
pub struct PlayerSession {
    poster: Poster<PlayerMsg>,
    view: watch::Receiver<PlayerView>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl PlayerSession {
    /// Resume the identity saved under `repo`'s profile.
    pub fn start(
        client: SessionClient,
        repo: IdentityRepo,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let Some(stored) = repo.load()? else {
            return Err(EngineError::IdentityMissing {
                profile: repo.profile().to_string(),
            });
        };
        info!(
            profile = repo.profile(),
            participant_id = %stored.identity.participant_id,
            session_id = %stored.identity.session_id,
            saved_at = %stored.saved_at,
            "resuming saved identity"
        );
        Ok(Self::with_identity(client, repo, stored.identity, config))
    }

    pub fn with_identity(
        client: SessionClient,
        repo: IdentityRepo,
        identity: PlayerIdentity,
        config: EngineConfig,
    ) -> Self {
        let (poster, inbox) = Poster::channel(Role::Player);
        let machine = PlayerMachine::new(identity, &config);
        let (view_tx, view_rx) = watch::channel(machine.view());
        let guard = poster.subscribe_all(client.gateway(), PlayerMsg::Broadcast);
        let cancel = CancellationToken::new();

        let task = PlayerTask {
            connectivity: client.connectivity(),
            client,
            repo,
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

    /// Register one tap. Ignored unless the session is active.
    pub fn tap(&self) {
        self.poster.post(PlayerMsg::Tap);
    }

    pub fn view(&self) -> watch::Receiver<PlayerView> {
        self.view.clone()
    }

    pub fn current(&self) -> PlayerView {
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

impl Drop for PlayerSession {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct PlayerTask {
    client: SessionClient,
    repo: IdentityRepo,
    connectivity: watch::Receiver<Connectivity>,
    machine: PlayerMachine,
    poster: Poster<PlayerMsg>,
    view: watch::Sender<PlayerView>,
    cancel: CancellationToken,
    _guard: SubscriptionGuard,
}

impl PlayerTask {
    #[instrument(name = "player_session", skip_all)]
    async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<PlayerMsg>) {
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
        info!("player session stopped");
    }

    fn handle(&mut self, message: PlayerMsg) {
        let now = Instant::now();
        match message {
            PlayerMsg::Tap => {
                if let Some(tap) = self.machine.tap(now) {
                    let poster = self.poster.clone();
                    self.client
                        .submit_tap(&tap.session_id, &tap.participant_id)
                        .then(move |result| poster.post(PlayerMsg::TapReplied(result)));
                }
            }
            PlayerMsg::TapReplied(result) => self.machine.on_tap_reply(result),
            PlayerMsg::Rejoined(result) => match self.machine.on_rejoin(result, now) {
                RejoinOutcome::Readd {
                    session_id,
                    display_name,
                } => {
                    let poster = self.poster.clone();
                    self.client
                        .join_session(session_id.as_str(), &display_name)
                        .then(move |result| poster.post(PlayerMsg::Readded(result)));
                }
                RejoinOutcome::Resumed | RejoinOutcome::Failed => {}
            },
            PlayerMsg::Readded(result) => match result {
                Ok(joined) => {
                    let identity = self.machine.adopt_participant(joined.participant_id);
                    if let Err(e) = self.repo.save(&identity) {
                        warn!(error = %e, "failed to persist replacement identity");
                    }
                    self.query();
                }
                Err(e) => self.machine.record_error(e),
            },
            PlayerMsg::Snapshot(result) => self.machine.on_snapshot(result, now),
            PlayerMsg::Broadcast(broadcast) => self.machine.on_broadcast(&broadcast, now),
        }
    }

    fn on_connectivity(&mut self, connectivity: Connectivity) {
        if !self.machine.on_connectivity(connectivity) {
            return;
        }
        debug!(epoch = connectivity.epoch, "connected, rejoining");
        let poster = self.poster.clone();
        self.client
            .rejoin_session(self.machine.identity())
            .then(move |result| poster.post(PlayerMsg::Rejoined(result)));
        self.query();
    }

    fn query(&self) {
        let poster = self.poster.clone();
        self.client
            .query_session_state(&self.machine.identity().session_id)
            .then(move |result| poster.post(PlayerMsg::Snapshot(result)));
    }

    fn publish(&self) {
        let _ = self.view.send_replace(self.machine.view());
    }
}
