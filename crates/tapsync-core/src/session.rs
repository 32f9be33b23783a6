//! Client-local projections of the authoritative session.
//!
//! None of these types are authoritative. Every field can be replaced
//! wholesale by the next snapshot the owner hands out.

use serde::{Deserialize, Serialize};

use crate::ids::{ParticipantId, SessionId};
use crate::status::AuthoritativeStatus;

/// One joined device within a session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub id: ParticipantId,
    pub name: String,
    /// Server-owned tap count, when the owner includes it.
    #[serde(default, alias = "clickCount", skip_serializing_if = "Option::is_none")]
    pub tap_count: Option<u64>,
}

/// Full authoritative state returned by query-session-state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub id: SessionId,
    #[serde(default, alias = "players")]
    pub participants: Vec<Participant>,
    #[serde(default)]
    pub progress: f64,
    pub status: AuthoritativeStatus,
}

/// The minimal triple a player persists to survive a reload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerIdentity {
    pub participant_id: ParticipantId,
    pub display_name: String,
    pub session_id: SessionId,
}

/// create-session reply data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedSession {
    #[serde(alias = "roomId")]
    pub session_id: SessionId,
    /// Payload for a scannable code (typically an image data URL).
    #[serde(default, alias = "qrCode")]
    pub join_code: Option<String>,
    #[serde(default)]
    pub join_url: Option<String>,
}

/// join-session reply data.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinedSession {
    #[serde(alias = "playerId")]
    pub participant_id: ParticipantId,
}

/// query-session-state reply data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SnapshotReply {
    #[serde(alias = "room")]
    pub session: SessionSnapshot,
}

/// rejoin-session reply data.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejoinState {
    #[serde(alias = "roomStatus")]
    pub status: AuthoritativeStatus,
    #[serde(default)]
    pub progress: f64,
}

/// start-session reply data (acknowledgement only).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {}

/// submit-tap reply data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TapAck {
    #[serde(default)]
    pub progress: Option<f64>,
}

/// Clamp an owner-reported progress value into the displayable range.
pub fn clamp_progress(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 100.0)
    }
}

/// Presentation band derived from aggregate progress.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    One,
    Two,
    Three,
    Four,
}

impl Stage {
    pub fn for_progress(progress: f64) -> Self {
        let p = clamp_progress(progress);
        if p < 25.0 {
            Self::One
        } else if p < 50.0 {
            Self::Two
        } else if p < 75.0 {
            Self::Three
        } else {
            Self::Four
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::One => "Stage 1",
            Self::Two => "Stage 2",
            Self::Three => "Stage 3",
            Self::Four => "Stage 4",
        }
    }
}
