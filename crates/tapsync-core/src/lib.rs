//! Shared vocabulary for the tapsync session synchronization engine.
//!
//! Nothing in this crate performs I/O: it holds the identifiers, wire frames,
//! broadcast payloads, the [`SessionStatus`] transition function and the
//! client-side validation rules that every other crate agrees on.

pub mod errors;
pub mod events;
pub mod ids;
pub mod session;
pub mod status;
pub mod validation;
pub mod wire;

pub use errors::{SessionError, SessionResult, ValidationError};
pub use events::{Broadcast, BroadcastKind, ProgressUpdate};
pub use ids::{ParticipantId, SessionId};
pub use session::{
    Ack, CreatedSession, JoinedSession, Participant, PlayerIdentity, RejoinState, SessionSnapshot,
    SnapshotReply, Stage, TapAck,
};
pub use status::{AuthoritativeStatus, Role, SessionStatus, Transition};
pub use wire::{Command, Frame, Reply};
