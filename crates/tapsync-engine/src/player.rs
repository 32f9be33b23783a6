//! Player role: resumes a persisted identity and submits taps.
//!
//! Progress is authoritative-wins: every reply or broadcast carrying a
//! progress value overwrites the display. The tap counter is
//! optimistic-local-wins: it only ever grows, one per accepted tap, and no
//! snapshot resets it.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use tapsync_client::Connectivity;
use tapsync_core::session::clamp_progress;
use tapsync_core::{
    Broadcast, Participant, ParticipantId, PlayerIdentity, RejoinState, Role, SessionError,
    SessionId, SessionResult, SessionSnapshot, SessionStatus, Stage, TapAck, Transition,
};

use crate::config::EngineConfig;
use crate::countdown::Countdown;
use crate::lifecycle::Lifecycle;
use crate::markers::MarkerSet;

/// Cosmetic ripple for one accepted tap.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Ripple {
    pub tap: u64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlayerView {
    pub status: SessionStatus,
    pub identity: PlayerIdentity,
    pub participants: Vec<Participant>,
    pub progress: f64,
    pub stage: Stage,
    pub taps: u64,
    pub countdown: Option<u8>,
    pub ripples: Vec<Ripple>,
    pub connectivity: Connectivity,
    pub last_error: Option<SessionError>,
}

/// What the driver should do after a rejoin reply.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejoinOutcome {
    Resumed,
    /// The owner no longer knows this participant; join again under the
    /// same name.
    Readd { session_id: SessionId, display_name: String },
    Failed,
}

/// A tap the driver must submit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapRequest {
    pub session_id: SessionId,
    pub participant_id: ParticipantId,
}

#[derive(Clone, Debug)]
pub struct PlayerMachine {
    identity: PlayerIdentity,
    lifecycle: Lifecycle,
    participants: Vec<Participant>,
    progress: f64,
    taps: u64,
    ripples: MarkerSet<Ripple>,
    connectivity: Connectivity,
    seen_epoch: u64,
    last_error: Option<SessionError>,
}

impl PlayerMachine {
    pub fn new(identity: PlayerIdentity, config: &EngineConfig) -> Self {
        Self {
            identity,
            lifecycle: Lifecycle::new(
                Role::Player,
                Countdown::new(config.countdown_ticks, config.tick_interval),
            ),
            participants: Vec::new(),
            progress: 0.0,
            taps: 0,
            ripples: MarkerSet::new(config.ripple_ttl),
            connectivity: Connectivity::default(),
            seen_epoch: 0,
            last_error: None,
        }
    }

    pub fn identity(&self) -> &PlayerIdentity {
        &self.identity
    }

    pub fn status(&self) -> SessionStatus {
        self.lifecycle.status()
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn taps(&self) -> u64 {
        self.taps
    }

    /// Track connectivity. Returns true on every new connection epoch
    /// (first connect and each reconnect): time to rejoin and resync.
    pub fn on_connectivity(&mut self, connectivity: Connectivity) -> bool {
        self.connectivity = connectivity;
        if !connectivity.connected() || connectivity.epoch <= self.seen_epoch {
            return false;
        }
        self.seen_epoch = connectivity.epoch;
        !self.lifecycle.is_terminal()
    }

    pub fn on_rejoin(&mut self, result: SessionResult<RejoinState>, now: Instant) -> RejoinOutcome {
        match result {
            Ok(state) => {
                if self.lifecycle.is_terminal() {
                    debug!("session completed, ignoring rejoin reply");
                    return RejoinOutcome::Resumed;
                }
                self.progress = clamp_progress(state.progress);
                self.last_error = None;
                let _ = self.lifecycle.apply(Transition::Snapshot(state.status), now);
                RejoinOutcome::Resumed
            }
            Err(SessionError::ParticipantUnknown(message)) => {
                info!(
                    participant_id = %self.identity.participant_id,
                    reason = %message,
                    "participant unknown to owner, joining again"
                );
                RejoinOutcome::Readd {
                    session_id: self.identity.session_id.clone(),
                    display_name: self.identity.display_name.clone(),
                }
            }
            Err(e) => {
                self.record_error(e);
                RejoinOutcome::Failed
            }
        }
    }

    /// Adopt the id handed out by a re-join. Returns the identity to persist.
    pub fn adopt_participant(&mut self, participant_id: ParticipantId) -> PlayerIdentity {
        info!(
            old = %self.identity.participant_id,
            new = %participant_id,
            "participant id replaced"
        );
        self.identity.participant_id = participant_id;
        self.identity.clone()
    }

    pub fn on_snapshot(&mut self, result: SessionResult<SessionSnapshot>, now: Instant) {
        match result {
            Ok(snapshot) => {
                if self.lifecycle.is_terminal() {
                    debug!("session completed, ignoring snapshot");
                    return;
                }
                self.participants = snapshot.participants;
                self.progress = clamp_progress(snapshot.progress);
                let _ = self
                    .lifecycle
                    .apply(Transition::Snapshot(snapshot.status), now);
            }
            Err(e) => self.record_error(e),
        }
    }

    /// Accept a tap while active. Bumps the local counter and returns the
    /// request to send; rapid taps are never coalesced.
    pub fn tap(&mut self, now: Instant) -> Option<TapRequest> {
        if self.status() != SessionStatus::Active {
            debug!(status = ?self.status(), "tap ignored outside active play");
            return None;
        }
        self.taps += 1;
        let _ = self.ripples.spawn(Ripple { tap: self.taps }, now);
        Some(TapRequest {
            session_id: self.identity.session_id.clone(),
            participant_id: self.identity.participant_id.clone(),
        })
    }

    pub fn on_tap_reply(&mut self, result: SessionResult<TapAck>) {
        match result {
            Ok(ack) => {
                if self.lifecycle.is_terminal() {
                    return;
                }
                if let Some(progress) = ack.progress {
                    self.progress = clamp_progress(progress);
                }
            }
            // the optimistic tap stays on screen
            Err(SessionError::TransportUnavailable) => debug!("tap not delivered"),
            Err(e) => self.record_error(e),
        }
    }

    pub fn on_broadcast(&mut self, broadcast: &Broadcast, now: Instant) {
        if self.lifecycle.is_terminal() {
            debug!(event = %broadcast.kind(), "session completed, ignoring broadcast");
            return;
        }
        match broadcast {
            Broadcast::ParticipantJoined { participants } => {
                self.participants = participants.clone();
            }
            Broadcast::GameStarted => {
                let _ = self.lifecycle.apply(Transition::GameStarted, now);
            }
            Broadcast::ProgressUpdate(update) => {
                self.progress = clamp_progress(update.progress);
            }
            Broadcast::GameComplete => {
                let _ = self.lifecycle.apply(Transition::Completed, now);
            }
        }
    }

    pub fn on_timer(&mut self, now: Instant) {
        let _ = self.lifecycle.on_timer(now);
        let _ = self.ripples.expire(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.lifecycle.deadline(), self.ripples.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn record_error(&mut self, error: SessionError) {
        warn!(kind = error.error_kind(), error = %error, "player operation failed");
        self.last_error = Some(error);
    }

    pub fn view(&self) -> PlayerView {
        PlayerView {
            status: self.status(),
            identity: self.identity.clone(),
            participants: self.participants.clone(),
            progress: self.progress,
            stage: Stage::for_progress(self.progress),
            taps: self.taps,
            countdown: self.lifecycle.countdown_remaining(),
            ripples: self.ripples.iter().map(|m| m.payload).collect(),
            connectivity: self.connectivity,
            last_error: self.last_error.clone(),
        }
    }
}
