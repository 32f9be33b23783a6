/// Message carried by the synthetic reply produced when no transport is available.
pub const NOT_CONNECTED: &str = "Not connected";

/// Input rejected on the client before any network round trip.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("display name must not be empty")]
    EmptyName,
    #[error("display name must be {max} characters or less")]
    NameTooLong { max: usize },
    #[error("session id must not be empty")]
    EmptySessionId,
    #[error("session id must be at least {min} characters")]
    SessionIdTooShort { min: usize },
    #[error("no session has been created yet")]
    NoSession,
    #[error("cannot start a session with no participants")]
    NoParticipants,
    #[error("session is not in the lobby")]
    NotInLobby,
}

/// Failure half of the uniform reply shape returned by every session operation.
///
/// Classified the same way regardless of which operation produced it, so
/// callers can decide between "retry later", "ask the user" and "give up".
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum SessionError {
    // Recoverable by waiting for the connection
    #[error("not connected")]
    TransportUnavailable,

    // User-correctable
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("participant unknown: {0}")]
    ParticipantUnknown(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),

    // Owner said no
    #[error("rejected: {message}")]
    Rejected {
        code: Option<String>,
        message: String,
    },
    #[error("malformed reply: {0}")]
    Malformed(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

impl SessionError {
    /// Classify a failed reply. An explicit `code` wins; otherwise the
    /// human-readable message is inspected.
    pub fn from_failure(code: Option<&str>, message: Option<&str>) -> Self {
        let message = message.unwrap_or("request failed").to_string();
        match code {
            Some("NOT_CONNECTED") => return Self::TransportUnavailable,
            Some("SESSION_NOT_FOUND" | "ROOM_NOT_FOUND") => return Self::SessionNotFound(message),
            Some("PARTICIPANT_NOT_FOUND" | "PLAYER_NOT_FOUND") => {
                return Self::ParticipantUnknown(message)
            }
            Some(other) => {
                return Self::Rejected {
                    code: Some(other.to_string()),
                    message,
                }
            }
            None => {}
        }

        let lower = message.to_ascii_lowercase();
        if lower == NOT_CONNECTED.to_ascii_lowercase() {
            Self::TransportUnavailable
        } else if lower.contains("not found") || lower.contains("unknown") {
            if lower.contains("player") || lower.contains("participant") {
                Self::ParticipantUnknown(message)
            } else {
                Self::SessionNotFound(message)
            }
        } else {
            Self::Rejected {
                code: None,
                message,
            }
        }
    }

    /// Worth retrying without changing the request.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::TransportUnavailable | Self::SessionNotFound(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::TransportUnavailable => "transport_unavailable",
            Self::SessionNotFound(_) => "session_not_found",
            Self::ParticipantUnknown(_) => "participant_unknown",
            Self::Validation(_) => "validation",
            Self::Rejected { .. } => "rejected",
            Self::Malformed(_) => "malformed",
        }
    }
}
