use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension;
use tracing::{debug, instrument};

use tapsync_core::{ParticipantId, PlayerIdentity, SessionId};

use crate::database::Database;
use crate::error::StoreError;

/// A persisted identity plus when it was written.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredIdentity {
    pub identity: PlayerIdentity,
    pub saved_at: DateTime<Utc>,
}

/// Identity slot per profile. Saving replaces whatever the profile held.
#[derive(Clone)]
pub struct IdentityRepo {
    db: Database,
    profile: String,
}

impl IdentityRepo {
    pub fn new(db: Database, profile: impl Into<String>) -> Self {
        Self {
            db,
            profile: profile.into(),
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }

    #[instrument(skip(self, identity), fields(profile = %self.profile, participant_id = %identity.participant_id, session_id = %identity.session_id))]
    pub fn save(&self, identity: &PlayerIdentity) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO identities (profile, participant_id, display_name, session_id, saved_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(profile) DO UPDATE SET
                    participant_id = excluded.participant_id,
                    display_name = excluded.display_name,
                    session_id = excluded.session_id,
                    saved_at = excluded.saved_at",
                rusqlite::params![
                    self.profile,
                    identity.participant_id.as_str(),
                    identity.display_name,
                    identity.session_id.as_str(),
                    now
                ],
            )?;
            Ok(())
        })?;
        debug!("identity saved");
        Ok(())
    }

    #[instrument(skip(self), fields(profile = %self.profile))]
    pub fn load(&self) -> Result<Option<StoredIdentity>, StoreError> {
        let row = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT participant_id, display_name, session_id, saved_at
                 FROM identities WHERE profile = ?1",
                [&self.profile],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()
            .map_err(StoreError::from)
        })?;

        let Some((participant_id, display_name, session_id, saved_at)) = row else {
            return Ok(None);
        };

        let saved_at = DateTime::parse_from_rfc3339(&saved_at)
            .map_err(|e| StoreError::CorruptRow {
                table: "identities",
                column: "saved_at",
                detail: e.to_string(),
            })?
            .with_timezone(&Utc);

        Ok(Some(StoredIdentity {
            identity: PlayerIdentity {
                participant_id: ParticipantId::from_raw(participant_id),
                display_name,
                session_id: SessionId::from_raw(session_id),
            },
            saved_at,
        }))
    }

    /// Remove the profile's identity. Returns whether one existed.
    #[instrument(skip(self), fields(profile = %self.profile))]
    pub fn clear(&self) -> Result<bool, StoreError> {
        let removed = self.db.with_conn(|conn| {
            conn.execute("DELETE FROM identities WHERE profile = ?1", [&self.profile])
                .map_err(StoreError::from)
        })?;
        Ok(removed > 0)
    }
}
