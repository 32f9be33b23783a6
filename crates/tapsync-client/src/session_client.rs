//! Typed session operations over the [`Gateway`].
//!
//! Each operation issues exactly one request and maps its reply onto
//! [`SessionResult`]. Nothing here mutates role state; callers interpret
//! the data.

use std::future::IntoFuture;
use std::marker::PhantomData;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tokio::sync::{oneshot, watch};
use tracing::debug;

use tapsync_core::validation;
use tapsync_core::{
    Ack, Command, CreatedSession, JoinedSession, ParticipantId, PlayerIdentity, RejoinState,
    SessionError, SessionId, SessionResult, SessionSnapshot, SnapshotReply, TapAck,
    ValidationError,
};

use crate::connection::Connectivity;
use crate::gateway::Gateway;

#[derive(Clone)]
pub struct SessionClient {
    gateway: Gateway,
}

impl SessionClient {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn connectivity(&self) -> watch::Receiver<Connectivity> {
        self.gateway.connectivity()
    }

    pub fn create_session(&self) -> Call<CreatedSession> {
        self.call(Ok(Command::CreateSession))
    }

    /// Join with raw user input. Both fields are validated before any
    /// round trip.
    pub fn join_session(&self, session_id: &str, display_name: &str) -> Call<JoinedSession> {
        let command = validation::session_id(session_id).and_then(|session_id| {
            Ok(Command::JoinSession {
                session_id,
                display_name: validation::display_name(display_name)?,
            })
        });
        self.call(command)
    }

    pub fn query_session_state(
        &self,
        session_id: &SessionId,
    ) -> Call<SessionSnapshot, SnapshotReply> {
        Call {
            gateway: self.gateway.clone(),
            command: Ok(Command::QuerySessionState {
                session_id: session_id.clone(),
            }),
            map: |reply: SnapshotReply| reply.session,
            _marker: PhantomData,
        }
    }

    pub fn rejoin_session(&self, identity: &PlayerIdentity) -> Call<RejoinState> {
        self.call(Ok(Command::RejoinSession {
            session_id: identity.session_id.clone(),
            participant_id: identity.participant_id.clone(),
            display_name: identity.display_name.clone(),
        }))
    }

    pub fn start_session(&self, session_id: &SessionId) -> Call<Ack> {
        self.call(Ok(Command::StartSession {
            session_id: session_id.clone(),
        }))
    }

    pub fn submit_tap(&self, session_id: &SessionId, participant_id: &ParticipantId) -> Call<TapAck> {
        self.call(Ok(Command::SubmitTap {
            session_id: session_id.clone(),
            participant_id: participant_id.clone(),
        }))
    }

    fn call<T>(&self, command: Result<Command, ValidationError>) -> Call<T> {
        Call {
            gateway: self.gateway.clone(),
            command,
            map: identity::<T>,
            _marker: PhantomData,
        }
    }
}

fn identity<T>(value: T) -> T {
    value
}

/// One pending session operation resolving to `T`, decoded from the
/// reply's wire shape `W`.
///
/// Nothing is sent until the call is consumed, either by
/// [`then`](Call::then) or by awaiting it.
#[must_use = "a Call does nothing until `then` or `.await` consumes it"]
pub struct Call<T, W = T> {
    gateway: Gateway,
    command: Result<Command, ValidationError>,
    map: fn(W) -> T,
    _marker: PhantomData<fn() -> W>,
}

impl<T, W> Call<T, W>
where
    T: Send + 'static,
    W: DeserializeOwned + Send + 'static,
{
    /// Run `continuation` exactly once with the outcome.
    ///
    /// Validation failures and "not connected" resolve before this returns;
    /// replies resolve on the gateway dispatcher in transport order.
    pub fn then<F>(self, continuation: F)
    where
        F: FnOnce(SessionResult<T>) + Send + 'static,
    {
        let command = match self.command {
            Ok(command) => command,
            Err(e) => {
                debug!(error = %e, "session call rejected locally");
                continuation(Err(SessionError::Validation(e)));
                return;
            }
        };
        let map = self.map;
        let name = command.name();
        self.gateway.send(&command, move |reply| {
            let result = reply.into_result::<W>().map(map);
            if let Err(e) = &result {
                debug!(command = name, kind = e.error_kind(), error = %e, "session call failed");
            }
            continuation(result);
        });
    }
}

impl<T, W> IntoFuture for Call<T, W>
where
    T: Send + 'static,
    W: DeserializeOwned + Send + 'static,
{
    type Output = SessionResult<T>;
    type IntoFuture = BoxFuture<'static, SessionResult<T>>;

    fn into_future(self) -> Self::IntoFuture {
        let (tx, rx) = oneshot::channel();
        self.then(move |result| {
            let _ = tx.send(result);
        });
        Box::pin(async move { rx.await.unwrap_or(Err(SessionError::TransportUnavailable)) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ReconnectPolicy;
    use crate::memory::{MemoryServer, MemoryTransport};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tapsync_core::{AuthoritativeStatus, Reply};

    async fn connected() -> (SessionClient, MemoryServer) {
        let (transport, server) = MemoryTransport::pair();
        let gateway = Gateway::connect(
            transport,
            ReconnectPolicy {
                max_attempts: 2,
                delay: Duration::from_millis(10),
            },
        );
        let _ = gateway
            .connectivity()
            .wait_for(Connectivity::connected)
            .await
            .unwrap();
        (SessionClient::new(gateway), server)
    }

    fn identity() -> PlayerIdentity {
        PlayerIdentity {
            participant_id: ParticipantId::from_raw("p1"),
            display_name: "Ada".into(),
            session_id: SessionId::from_raw("ROOM42"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn create_session_decodes_reply() {
        let (client, mut server) = connected().await;
        let mut peer = server.accept().await.unwrap();

        let call = tokio::spawn(client.create_session().into_future());
        let req = peer.next_request().await.unwrap();
        assert_eq!(req.command, "create-session");
        peer.reply(
            req.id,
            Reply::ok(json!({"sessionId": "ROOM42", "joinUrl": "http://x/join/ROOM42"})),
        );

        let created = call.await.unwrap().unwrap();
        assert_eq!(created.session_id.as_str(), "ROOM42");
        assert_eq!(created.join_url.as_deref(), Some("http://x/join/ROOM42"));
    }

    #[tokio::test(start_paused = true)]
    async fn join_validates_before_sending() {
        let (client, _server) = connected().await;

        let err = client.join_session("ROOM42", "   ").await.unwrap_err();
        assert_eq!(err, SessionError::Validation(ValidationError::EmptyName));

        let err = client
            .join_session("ROOM42", "abcdefghijklmnopqrstu")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            SessionError::Validation(ValidationError::NameTooLong { max: 20 })
        );

        let err = client.join_session("ab", "Ada").await.unwrap_err();
        assert_eq!(
            err,
            SessionError::Validation(ValidationError::SessionIdTooShort { min: 6 })
        );
        assert_eq!(client.gateway().pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn join_sends_trimmed_name() {
        let (client, mut server) = connected().await;
        let mut peer = server.accept().await.unwrap();

        let call = tokio::spawn(client.join_session(" ROOM42 ", "  Ada ").into_future());
        let req = peer.next_request().await.unwrap();
        assert_eq!(req.str_field("sessionId"), Some("ROOM42"));
        assert_eq!(req.str_field("displayName"), Some("Ada"));
        peer.reply(req.id, Reply::ok(json!({"participantId": "p7"})));

        assert_eq!(call.await.unwrap().unwrap().participant_id.as_str(), "p7");
    }

    #[tokio::test(start_paused = true)]
    async fn query_unwraps_session_snapshot() {
        let (client, mut server) = connected().await;
        let mut peer = server.accept().await.unwrap();

        let call = tokio::spawn(
            client
                .query_session_state(&SessionId::from_raw("ROOM42"))
                .into_future(),
        );
        let req = peer.next_request().await.unwrap();
        peer.reply(
            req.id,
            Reply::ok(json!({"session": {
                "id": "ROOM42",
                "participants": [{"id": "p1", "name": "Ada"}],
                "progress": 42,
                "status": "active"
            }})),
        );

        let snapshot = call.await.unwrap().unwrap();
        assert_eq!(snapshot.status, AuthoritativeStatus::Active);
        assert_eq!(snapshot.participants.len(), 1);
        assert_eq!(snapshot.progress, 42.0);
    }

    #[tokio::test(start_paused = true)]
    async fn rejoin_maps_unknown_participant() {
        let (client, mut server) = connected().await;
        let mut peer = server.accept().await.unwrap();

        let call = tokio::spawn(client.rejoin_session(&identity()).into_future());
        let req = peer.next_request().await.unwrap();
        assert_eq!(req.str_field("participantId"), Some("p1"));
        peer.reply(
            req.id,
            Reply::failure_with_code("PARTICIPANT_NOT_FOUND", "Player not found"),
        );

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(err.error_kind(), "participant_unknown");
    }

    #[tokio::test(start_paused = true)]
    async fn then_runs_inline_when_disconnected() {
        let (transport, _server) = MemoryTransport::pair();
        transport.set_refusing(true);
        let client = SessionClient::new(Gateway::connect(transport, ReconnectPolicy::default()));

        let outcome = Arc::new(parking_lot::Mutex::new(None));
        let slot = Arc::clone(&outcome);
        client
            .submit_tap(&SessionId::from_raw("ROOM42"), &ParticipantId::from_raw("p1"))
            .then(move |result| *slot.lock() = Some(result));

        assert_eq!(
            outcome.lock().take(),
            Some(Err(SessionError::TransportUnavailable))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn start_rejection_keeps_code() {
        let (client, mut server) = connected().await;
        let mut peer = server.accept().await.unwrap();

        let call = tokio::spawn(client.start_session(&SessionId::from_raw("ROOM42")).into_future());
        let req = peer.next_request().await.unwrap();
        peer.reply(
            req.id,
            Reply::failure_with_code("NO_PARTICIPANTS", "Need at least one player"),
        );

        assert_eq!(
            call.await.unwrap().unwrap_err(),
            SessionError::Rejected {
                code: Some("NO_PARTICIPANTS".into()),
                message: "Need at least one player".into()
            }
        );
    }
}
