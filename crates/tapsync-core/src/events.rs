use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::session::Participant;

/// Broadcast names the core subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BroadcastKind {
    ParticipantJoined,
    GameStarted,
    ProgressUpdate,
    GameComplete,
}

impl BroadcastKind {
    pub const ALL: [BroadcastKind; 4] = [
        Self::ParticipantJoined,
        Self::GameStarted,
        Self::ProgressUpdate,
        Self::GameComplete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ParticipantJoined => "participant-joined",
            Self::GameStarted => "game-started",
            Self::ProgressUpdate => "progress-update",
            Self::GameComplete => "game-complete",
        }
    }

    /// Resolve a wire event name. `player-joined` is the name legacy owners use
    /// for the participant list broadcast.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "participant-joined" | "player-joined" => Some(Self::ParticipantJoined),
            "game-started" => Some(Self::GameStarted),
            "progress-update" => Some(Self::ProgressUpdate),
            "game-complete" => Some(Self::GameComplete),
            _ => None,
        }
    }
}

impl std::fmt::Display for BroadcastKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload of a `progress-update` broadcast.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressUpdate {
    pub progress: f64,
    #[serde(default, alias = "clickCount")]
    pub tap_count: u64,
    #[serde(default, alias = "clickerName")]
    pub tapper_name: String,
}

#[derive(Deserialize)]
struct ParticipantList {
    #[serde(default, alias = "players")]
    participants: Vec<Participant>,
}

/// Unsolicited push from the authoritative owner.
#[derive(Clone, Debug, PartialEq)]
pub enum Broadcast {
    /// Complete participant list, ordered by join.
    ParticipantJoined { participants: Vec<Participant> },
    GameStarted,
    ProgressUpdate(ProgressUpdate),
    GameComplete,
}

impl Broadcast {
    pub fn kind(&self) -> BroadcastKind {
        match self {
            Self::ParticipantJoined { .. } => BroadcastKind::ParticipantJoined,
            Self::GameStarted => BroadcastKind::GameStarted,
            Self::ProgressUpdate(_) => BroadcastKind::ProgressUpdate,
            Self::GameComplete => BroadcastKind::GameComplete,
        }
    }

    /// Decode an event frame. `Ok(None)` means the name is not one we consume.
    pub fn decode(event: &str, data: Value) -> Result<Option<Self>, serde_json::Error> {
        let Some(kind) = BroadcastKind::from_name(event) else {
            return Ok(None);
        };
        let broadcast = match kind {
            BroadcastKind::ParticipantJoined => {
                let list: ParticipantList = serde_json::from_value(data)?;
                Self::ParticipantJoined {
                    participants: list.participants,
                }
            }
            BroadcastKind::GameStarted => Self::GameStarted,
            BroadcastKind::ProgressUpdate => Self::ProgressUpdate(serde_json::from_value(data)?),
            BroadcastKind::GameComplete => Self::GameComplete,
        };
        Ok(Some(broadcast))
    }

    /// Event name and data as they appear on the wire.
    pub fn encode(&self) -> (&'static str, Value) {
        let data = match self {
            Self::ParticipantJoined { participants } => {
                serde_json::json!({ "participants": participants })
            }
            Self::ProgressUpdate(update) => {
                serde_json::to_value(update).unwrap_or_else(|_| serde_json::json!({}))
            }
            Self::GameStarted | Self::GameComplete => serde_json::json!({}),
        };
        (self.kind().as_str(), data)
    }
}
