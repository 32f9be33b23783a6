//! Frames multiplexed over the single duplex channel.
//!
//! Requests and replies are correlated by `id`; events carry no id and fan
//! out to subscribers by name. The two never share a dispatch table.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::errors::{SessionError, SessionResult, NOT_CONNECTED};
use crate::ids::{ParticipantId, SessionId};

/// One JSON text frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Frame {
    Request {
        id: u64,
        command: String,
        #[serde(default)]
        payload: Value,
    },
    Reply {
        id: u64,
        reply: Reply,
    },
    Event {
        event: String,
        #[serde(default)]
        data: Value,
    },
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn request(id: u64, command: &Command) -> Self {
        Self::Request {
            id,
            command: command.name().to_string(),
            payload: command.payload(),
        }
    }
}

/// Reply body: `{ success, error?, code?, ...data }`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Reply {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(flatten)]
    pub data: Map<String, Value>,
}

impl Reply {
    /// Successful reply carrying `data` (an object; anything else is dropped).
    pub fn ok(data: Value) -> Self {
        let data = match data {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            success: true,
            error: None,
            code: None,
            data,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            code: None,
            data: Map::new(),
        }
    }

    pub fn failure_with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            ..Self::failure(message)
        }
    }

    /// Synthetic reply used whenever no transport can carry the request.
    pub fn not_connected() -> Self {
        Self::failure_with_code("NOT_CONNECTED", NOT_CONNECTED)
    }

    /// Map onto the uniform success/failure shape, decoding the data on success.
    pub fn into_result<T: DeserializeOwned>(self) -> SessionResult<T> {
        if !self.success {
            return Err(SessionError::from_failure(
                self.code.as_deref(),
                self.error.as_deref(),
            ));
        }
        serde_json::from_value(Value::Object(self.data))
            .map_err(|e| SessionError::Malformed(e.to_string()))
    }
}

/// Commands the core issues to the authoritative owner.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    CreateSession,
    JoinSession {
        session_id: SessionId,
        display_name: String,
    },
    QuerySessionState {
        session_id: SessionId,
    },
    RejoinSession {
        session_id: SessionId,
        participant_id: ParticipantId,
        display_name: String,
    },
    StartSession {
        session_id: SessionId,
    },
    SubmitTap {
        session_id: SessionId,
        participant_id: ParticipantId,
    },
}

impl Command {
    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateSession => "create-session",
            Self::JoinSession { .. } => "join-session",
            Self::QuerySessionState { .. } => "query-session-state",
            Self::RejoinSession { .. } => "rejoin-session",
            Self::StartSession { .. } => "start-session",
            Self::SubmitTap { .. } => "submit-tap",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            Self::CreateSession => json!({}),
            Self::JoinSession {
                session_id,
                display_name,
            } => json!({ "sessionId": session_id, "displayName": display_name }),
            Self::QuerySessionState { session_id } | Self::StartSession { session_id } => {
                json!({ "sessionId": session_id })
            }
            Self::RejoinSession {
                session_id,
                participant_id,
                display_name,
            } => json!({
                "sessionId": session_id,
                "participantId": participant_id,
                "displayName": display_name,
            }),
            Self::SubmitTap {
                session_id,
                participant_id,
            } => json!({ "sessionId": session_id, "participantId": participant_id }),
        }
    }
}
