use tracing::{info, instrument};

use tapsync_client::SessionClient;
use tapsync_core::{validation, PlayerIdentity, SessionError};
use tapsync_store::IdentityRepo;

use crate::error::EngineError;

/// Join a session from raw user input and persist the resulting identity.
///
/// The session is probed first so a mistyped id surfaces as
/// `SessionNotFound` before a participant is created.
#[instrument(skip(client, repo), fields(profile = repo.profile()))]
pub async fn join_session(
    client: &SessionClient,
    repo: &IdentityRepo,
    session_input: &str,
    display_name: &str,
) -> Result<PlayerIdentity, EngineError> {
    let session_id = validation::session_id(session_input).map_err(SessionError::from)?;
    let display_name = validation::display_name(display_name).map_err(SessionError::from)?;

    let snapshot = client.query_session_state(&session_id).await?;
    info!(
        session_id = %snapshot.id,
        status = ?snapshot.status,
        participants = snapshot.participants.len(),
        "session found"
    );

    let joined = client
        .join_session(session_id.as_str(), &display_name)
        .await?;
    let identity = PlayerIdentity {
        participant_id: joined.participant_id,
        display_name,
        session_id,
    };
    repo.save(&identity)?;
    info!(participant_id = %identity.participant_id, "joined and saved identity");
    Ok(identity)
}
