//! Session status vocabulary shared by the host and player roles.
//!
//! [`SessionStatus::apply`] is the only place a status changes. Both role
//! machines funnel every reply, broadcast and timer expiry through it, which
//! keeps the outcome independent of whether a transition was learned from a
//! direct reply or from a later broadcast.

use serde::{Deserialize, Serialize};

/// Which side of the session a client plays.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Host,
    Player,
}

/// Status as reported by the authoritative owner.
///
/// The owner never reports a countdown; that refinement exists only locally.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthoritativeStatus {
    #[serde(alias = "waiting")]
    Lobby,
    #[serde(alias = "playing")]
    Active,
    Completed,
}

/// Local, observable status of one role machine.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Uninitialized,
    Lobby,
    CountingDown,
    Active,
    Completed,
}

/// Everything that can move a [`SessionStatus`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Transition {
    /// create-session succeeded (host).
    Created,
    /// start-session succeeded (host).
    StartAcknowledged,
    /// `game-started` broadcast.
    GameStarted,
    /// Local countdown reached zero.
    CountdownElapsed,
    /// Wholesale snapshot from rejoin-session or query-session-state.
    Snapshot(AuthoritativeStatus),
    /// `game-complete` broadcast.
    Completed,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        self == Self::Completed
    }

    /// Compute the status that follows `transition` for the given role.
    ///
    /// `Completed` absorbs every transition. A snapshot never introduces
    /// `CountingDown`; only a start acknowledgement or a `game-started`
    /// broadcast does, and a running countdown is left to finish.
    pub fn apply(self, role: Role, transition: Transition) -> Self {
        use SessionStatus::*;

        if self.is_terminal() {
            return self;
        }

        match transition {
            Transition::Completed => Completed,
            Transition::Created => match self {
                Uninitialized if role == Role::Host => Lobby,
                other => other,
            },
            Transition::StartAcknowledged => match self {
                Lobby if role == Role::Host => CountingDown,
                other => other,
            },
            Transition::GameStarted => match (role, self) {
                // a player always restarts its lead-in, even mid-countdown
                (Role::Player, _) => CountingDown,
                (Role::Host, Uninitialized | Lobby) => CountingDown,
                (Role::Host, other) => other,
            },
            Transition::CountdownElapsed => match self {
                CountingDown => Active,
                other => other,
            },
            Transition::Snapshot(reported) => match (self, reported) {
                (_, AuthoritativeStatus::Completed) => Completed,
                (CountingDown, _) => CountingDown,
                (_, AuthoritativeStatus::Active) => Active,
                (_, AuthoritativeStatus::Lobby) => Lobby,
            },
        }
    }
}
