use tokio::time::Instant;
use tracing::info;

use tapsync_core::{Role, SessionStatus, Transition};

use crate::countdown::{Countdown, CountdownTick};

/// Session status plus the countdown it owns.
///
/// Entering `CountingDown` starts the countdown; a player's `game-started`
/// restarts it even when already counting. Reaching zero feeds
/// `CountdownElapsed` back through the transition function.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    role: Role,
    status: SessionStatus,
    countdown: Countdown,
}

impl Lifecycle {
    pub fn new(role: Role, countdown: Countdown) -> Self {
        Self {
            role,
            status: SessionStatus::Uninitialized,
            countdown,
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn countdown_remaining(&self) -> Option<u8> {
        self.countdown.remaining()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.countdown.deadline()
    }

    /// Apply `transition`; returns whether the status changed.
    pub fn apply(&mut self, transition: Transition, now: Instant) -> bool {
        let before = self.status;
        let after = before.apply(self.role, transition);

        let restart = after == SessionStatus::CountingDown
            && (before != SessionStatus::CountingDown
                || (self.role == Role::Player && transition == Transition::GameStarted));
        if restart {
            self.countdown.start(now);
        } else if after != SessionStatus::CountingDown {
            self.countdown.cancel();
        }

        self.status = after;
        if before != after {
            info!(role = ?self.role, from = ?before, to = ?after, ?transition, "session status changed");
        }
        before != after
    }

    /// Advance the countdown to `now`.
    pub fn on_timer(&mut self, now: Instant) -> bool {
        match self.countdown.tick(now) {
            CountdownTick::Elapsed => self.apply(Transition::CountdownElapsed, now),
            CountdownTick::Idle | CountdownTick::Running(_) => false,
        }
    }
}
