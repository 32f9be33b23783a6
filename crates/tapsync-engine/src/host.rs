//! Host role: creates and starts a session, watches aggregate progress.

use tokio::time::Instant;
use tracing::{debug, warn};

use tapsync_client::Connectivity;
use tapsync_core::session::clamp_progress;
use tapsync_core::{
    Ack, Broadcast, CreatedSession, Participant, Role, SessionError, SessionId, SessionResult,
    SessionSnapshot, SessionStatus, Stage, Transition, ValidationError,
};

use crate::config::EngineConfig;
use crate::countdown::Countdown;
use crate::lifecycle::Lifecycle;
use crate::markers::MarkerSet;

/// Cosmetic flash for one progress update while active.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapMarker {
    pub tapper_name: String,
}

/// Everything a presentation layer needs to draw the host screen.
#[derive(Clone, Debug, PartialEq)]
pub struct HostView {
    pub status: SessionStatus,
    pub session: Option<CreatedSession>,
    pub participants: Vec<Participant>,
    pub progress: f64,
    pub stage: Stage,
    pub total_taps: u64,
    pub countdown: Option<u8>,
    pub markers: Vec<TapMarker>,
    pub connectivity: Connectivity,
    pub last_error: Option<SessionError>,
}

#[derive(Clone, Debug)]
pub struct HostMachine {
    lifecycle: Lifecycle,
    session: Option<CreatedSession>,
    participants: Vec<Participant>,
    progress: f64,
    total_taps: u64,
    markers: MarkerSet<TapMarker>,
    connectivity: Connectivity,
    seen_epoch: u64,
    last_error: Option<SessionError>,
}

impl HostMachine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            lifecycle: Lifecycle::new(
                Role::Host,
                Countdown::new(config.countdown_ticks, config.tick_interval),
            ),
            session: None,
            participants: Vec::new(),
            progress: 0.0,
            total_taps: 0,
            markers: MarkerSet::new(config.marker_ttl),
            connectivity: Connectivity::default(),
            seen_epoch: 0,
            last_error: None,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.lifecycle.status()
    }

    pub fn session(&self) -> Option<&CreatedSession> {
        self.session.as_ref()
    }

    pub fn session_id(&self) -> Option<&SessionId> {
        self.session.as_ref().map(|s| &s.session_id)
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn progress(&self) -> f64 {
        self.progress
    }

    pub fn on_created(&mut self, result: SessionResult<CreatedSession>, now: Instant) {
        match result {
            Ok(created) => {
                if self.session.is_some() {
                    debug!(session_id = %created.session_id, "ignoring second create reply");
                    return;
                }
                self.session = Some(created);
                self.participants.clear();
                self.progress = 0.0;
                self.last_error = None;
                let _ = self.lifecycle.apply(Transition::Created, now);
            }
            Err(e) => self.record_error(e),
        }
    }

    /// Local guard run before start-session is sent.
    pub fn check_start(&self) -> Result<SessionId, ValidationError> {
        let Some(session_id) = self.session_id() else {
            return Err(ValidationError::NoSession);
        };
        if self.status() != SessionStatus::Lobby {
            return Err(ValidationError::NotInLobby);
        }
        if self.participants.is_empty() {
            return Err(ValidationError::NoParticipants);
        }
        Ok(session_id.clone())
    }

    pub fn on_start_reply(&mut self, result: SessionResult<Ack>, now: Instant) {
        match result {
            Ok(Ack {}) => {
                self.last_error = None;
                let _ = self.lifecycle.apply(Transition::StartAcknowledged, now);
            }
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
                self.total_taps = update.tap_count;
                if self.status() == SessionStatus::Active {
                    let _ = self.markers.spawn(
                        TapMarker {
                            tapper_name: update.tapper_name.clone(),
                        },
                        now,
                    );
                }
            }
            Broadcast::GameComplete => {
                let _ = self.lifecycle.apply(Transition::Completed, now);
            }
        }
    }

    /// Replace local state wholesale from a fresh snapshot.
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

    /// Track connectivity. Returns the session to resync when a reconnect
    /// happened after the session was created.
    pub fn on_connectivity(&mut self, connectivity: Connectivity) -> Option<SessionId> {
        self.connectivity = connectivity;
        if !connectivity.connected() || connectivity.epoch <= self.seen_epoch {
            return None;
        }
        let reconnect = self.seen_epoch > 0;
        self.seen_epoch = connectivity.epoch;
        if !reconnect || self.lifecycle.is_terminal() {
            return None;
        }
        self.session_id().cloned()
    }

    pub fn on_timer(&mut self, now: Instant) {
        let _ = self.lifecycle.on_timer(now);
        let _ = self.markers.expire(now);
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.lifecycle.deadline(), self.markers.next_expiry()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    pub fn record_error(&mut self, error: SessionError) {
        warn!(kind = error.error_kind(), error = %error, "host operation failed");
        self.last_error = Some(error);
    }

    pub fn view(&self) -> HostView {
        HostView {
            status: self.status(),
            session: self.session.clone(),
            participants: self.participants.clone(),
            progress: self.progress,
            stage: Stage::for_progress(self.progress),
            total_taps: self.total_taps,
            countdown: self.lifecycle.countdown_remaining(),
            markers: self.markers.iter().map(|m| m.payload.clone()).collect(),
            connectivity: self.connectivity,
            last_error: self.last_error.clone(),
        }
    }
}
