//! Client-side input checks, applied before anything touches the network.

use crate::errors::ValidationError;
use crate::ids::SessionId;

pub const MAX_DISPLAY_NAME_CHARS: usize = 20;
pub const MIN_SESSION_ID_CHARS: usize = 6;

/// Trim and check a player-supplied display name (1–20 characters).
pub fn display_name(raw: &str) -> Result<String, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptyName);
    }
    if trimmed.chars().count() > MAX_DISPLAY_NAME_CHARS {
        return Err(ValidationError::NameTooLong {
            max: MAX_DISPLAY_NAME_CHARS,
        });
    }
    Ok(trimmed.to_string())
}

/// Trim and check a session identifier typed or scanned by a player.
pub fn session_id(raw: &str) -> Result<SessionId, ValidationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::EmptySessionId);
    }
    if trimmed.chars().count() < MIN_SESSION_ID_CHARS {
        return Err(ValidationError::SessionIdTooShort {
            min: MIN_SESSION_ID_CHARS,
        });
    }
    Ok(SessionId::from_raw(trimmed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name_is_trimmed() {
        assert_eq!(display_name("  Ada  ").unwrap(), "Ada");
    }

    #[test]
    fn display_name_rejects_blank() {
        assert_eq!(display_name("   "), Err(ValidationError::EmptyName));
        assert_eq!(display_name(""), Err(ValidationError::EmptyName));
    }

    #[test]
    fn display_name_length_counts_chars_after_trim() {
        let twenty = "a".repeat(20);
        assert_eq!(display_name(&format!("  {twenty}  ")).unwrap(), twenty);
        assert_eq!(
            display_name(&"a".repeat(21)),
            Err(ValidationError::NameTooLong { max: 20 })
        );
        // multi-byte characters count once
        assert!(display_name(&"é".repeat(20)).is_ok());
    }

    #[test]
    fn session_id_rules() {
        assert_eq!(session_id(" ABC123 ").unwrap().as_str(), "ABC123");
        assert_eq!(session_id(""), Err(ValidationError::EmptySessionId));
        assert_eq!(
            session_id("abc"),
            Err(ValidationError::SessionIdTooShort { min: 6 })
        );
    }
}
