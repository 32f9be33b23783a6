//! Host and player sessions against an in-process owner, with paused time.

mod support;

use tapsync_client::{MemoryTransport, SessionClient};
use tapsync_core::{
    AuthoritativeStatus, BroadcastKind, ParticipantId, PlayerIdentity, SessionError, SessionId,
    SessionStatus, ValidationError,
};
use tapsync_engine::{join_session, EngineConfig, EngineError, HostSession, PlayerSession};
use tapsync_store::{Database, IdentityRepo};

use support::{until, FakeOwner, ROOM};

async fn connected_client(owner: &FakeOwner) -> (SessionClient, MemoryTransport) {
    let (client, transport) = support::client(owner);
    let _ = until(&mut client.connectivity(), "connection", |c| c.connected()).await;
    (client, transport)
}

fn repo() -> IdentityRepo {
    IdentityRepo::new(Database::in_memory().unwrap(), "default")
}

fn identity(participant: &str, name: &str) -> PlayerIdentity {
    PlayerIdentity {
        participant_id: ParticipantId::from_raw(participant),
        display_name: name.into(),
        session_id: SessionId::from_raw(ROOM),
    }
}

async fn joined_player(owner: &FakeOwner, name: &str) -> (PlayerSession, MemoryTransport) {
    let (client, transport) = connected_client(owner).await;
    let repo = repo();
    let _ = join_session(&client, &repo, ROOM, name).await.unwrap();
    let player = PlayerSession::start(client, repo, EngineConfig::default()).unwrap();
    (player, transport)
}

#[tokio::test(start_paused = true)]
async fn full_round_from_lobby_to_progress() {
    let owner = FakeOwner::new();
    let (host_client, _host_transport) = connected_client(&owner).await;
    let host = HostSession::start(host_client, EngineConfig::default());

    let created = host.create_session().await.unwrap();
    assert_eq!(created.session_id.as_str(), ROOM);
    let view = host.current();
    assert_eq!(view.status, SessionStatus::Lobby);
    assert!(view.participants.is_empty());
    assert_eq!(
        view.session.unwrap().join_url.as_deref(),
        Some("http://owner.test/join/ROOM42")
    );

    let (ada, _) = joined_player(&owner, "Ada").await;
    let (bo, _) = joined_player(&owner, "Bo").await;
    let _ = until(&mut host.view(), "two participants", |v| v.participants.len() == 2).await;
    for player in [&ada, &bo] {
        let _ = until(&mut player.view(), "player lobby", |v| {
            v.status == SessionStatus::Lobby
        })
        .await;
    }

    host.start_session().await.unwrap();
    let view = host.current();
    assert_eq!(view.status, SessionStatus::CountingDown);
    assert_eq!(view.countdown, Some(5));

    let _ = until(&mut host.view(), "host active", |v| v.status == SessionStatus::Active).await;
    for player in [&ada, &bo] {
        let _ = until(&mut player.view(), "player active", |v| {
            v.status == SessionStatus::Active
        })
        .await;
    }

    for _ in 0..3 {
        ada.tap();
    }
    let view = until(&mut ada.view(), "three taps acknowledged", |v| {
        v.taps == 3 && v.progress == 3.0
    })
    .await;
    assert_eq!(view.ripples.len(), 3);

    let view = until(&mut host.view(), "host progress", |v| v.progress == 3.0).await;
    assert_eq!(view.total_taps, 3);
    assert_eq!(owner.taps(), 3);

    let view = until(&mut bo.view(), "progress broadcast", |v| v.progress == 3.0).await;
    assert_eq!(view.taps, 0);
}

#[tokio::test(start_paused = true)]
async fn start_without_participants_is_refused_locally() {
    let owner = FakeOwner::new();
    let (client, _transport) = connected_client(&owner).await;
    let host = HostSession::start(client, EngineConfig::default());

    let err = host.start_session().await.unwrap_err();
    assert_eq!(err, SessionError::Validation(ValidationError::NoSession));

    let _ = host.create_session().await.unwrap();
    let err = host.start_session().await.unwrap_err();
    assert_eq!(err, SessionError::Validation(ValidationError::NoParticipants));
    assert_eq!(owner.command_count("start-session"), 0);
}

#[tokio::test(start_paused = true)]
async fn taps_while_disconnected_keep_local_count() {
    let owner = FakeOwner::seeded(AuthoritativeStatus::Active, 0.0, &[("p1", "Ada")]);
    let (client, transport) = connected_client(&owner).await;
    let player = PlayerSession::with_identity(client, repo(), identity("p1", "Ada"), EngineConfig::default());
    let _ = until(&mut player.view(), "active", |v| v.status == SessionStatus::Active).await;

    transport.set_refusing(true);
    assert!(transport.sever());
    let _ = until(&mut player.view(), "link down", |v| !v.connectivity.connected()).await;

    for _ in 0..3 {
        player.tap();
    }
    let view = until(&mut player.view(), "three local taps", |v| v.taps == 3).await;
    assert_eq!(view.progress, 0.0);
    assert_eq!(view.last_error, None);
    assert_eq!(owner.taps(), 0);

    owner.set_progress(10.0);
    transport.set_refusing(false);
    let view = until(&mut player.view(), "resynced", |v| {
        v.connectivity.connected() && v.progress == 10.0
    })
    .await;
    assert_eq!(view.taps, 3);
    assert_eq!(view.status, SessionStatus::Active);
    assert_eq!(owner.command_count("rejoin-session"), 2);
}

#[tokio::test(start_paused = true)]
async fn rejoining_an_active_session_skips_the_countdown() {
    let owner = FakeOwner::seeded(AuthoritativeStatus::Active, 42.0, &[("p1", "Ada")]);
    let (client, _transport) = connected_client(&owner).await;
    let player = PlayerSession::with_identity(client, repo(), identity("p1", "Ada"), EngineConfig::default());

    let view = until(&mut player.view(), "active", |v| v.status == SessionStatus::Active).await;
    assert_eq!(view.countdown, None);
    let view = until(&mut player.view(), "progress", |v| v.progress == 42.0).await;
    assert_eq!(view.status, SessionStatus::Active);
}

#[tokio::test(start_paused = true)]
async fn completion_before_snapshot_stays_completed() {
    let owner = FakeOwner::seeded(AuthoritativeStatus::Active, 42.0, &[("p1", "Ada")]);
    owner.hold_queries(true);
    let (client, _transport) = connected_client(&owner).await;
    let player = PlayerSession::with_identity(client, repo(), identity("p1", "Ada"), EngineConfig::default());
    let _ = until(&mut player.view(), "active", |v| v.status == SessionStatus::Active).await;

    owner.complete();
    let _ = until(&mut player.view(), "completed", |v| v.status == SessionStatus::Completed).await;

    assert_eq!(owner.release_held(), 1);
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    let view = player.current();
    assert_eq!(view.status, SessionStatus::Completed);
    player.tap();
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(player.current().taps, 0);
    assert_eq!(owner.command_count("submit-tap"), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_participant_is_readded_and_persisted() {
    let owner = FakeOwner::seeded(AuthoritativeStatus::Lobby, 0.0, &[]);
    let (client, _transport) = connected_client(&owner).await;
    let repo = repo();
    repo.save(&identity("gone", "Ada")).unwrap();

    let player = PlayerSession::start(client, repo.clone(), EngineConfig::default()).unwrap();
    let view = until(&mut player.view(), "new identity", |v| {
        v.identity.participant_id.as_str() != "gone"
    })
    .await;
    let new_id = view.identity.participant_id.clone();

    let stored = repo.load().unwrap().unwrap();
    assert_eq!(stored.identity.participant_id, new_id);
    assert_eq!(stored.identity.display_name, "Ada");

    let participants = owner.participants();
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].id, new_id);
    let _ = until(&mut player.view(), "lobby", |v| v.status == SessionStatus::Lobby).await;
}

#[tokio::test(start_paused = true)]
async fn player_requires_saved_identity() {
    let owner = FakeOwner::new();
    let (client, _transport) = connected_client(&owner).await;
    let Err(err) = PlayerSession::start(client, repo(), EngineConfig::default()) else {
        panic!("expected missing identity");
    };
    assert!(matches!(err, EngineError::IdentityMissing { ref profile } if profile == "default"));
}

#[tokio::test(start_paused = true)]
async fn host_resyncs_participants_after_reconnect() {
    let owner = FakeOwner::new();
    let (client, transport) = connected_client(&owner).await;
    let host = HostSession::start(client, EngineConfig::default());
    let _ = host.create_session().await.unwrap();
    let _ = owner.add_participant("Ada");
    let _ = until(&mut host.view(), "one participant", |v| v.participants.len() == 1).await;

    transport.set_refusing(true);
    assert!(transport.sever());
    let _ = until(&mut host.view(), "link down", |v| !v.connectivity.connected()).await;

    // missed while offline
    let _ = owner.add_participant("Bo");
    assert_eq!(host.current().participants.len(), 1);

    transport.set_refusing(false);
    let view = until(&mut host.view(), "resynced participants", |v| {
        v.connectivity.connected() && v.participants.len() == 2
    })
    .await;
    assert_eq!(view.status, SessionStatus::Lobby);
    assert_eq!(owner.command_count("query-session-state"), 1);
}

#[tokio::test(start_paused = true)]
async fn shutdown_releases_subscriptions() {
    let owner = FakeOwner::seeded(AuthoritativeStatus::Lobby, 0.0, &[("p1", "Ada")]);
    let (client, _transport) = connected_client(&owner).await;
    let gateway = client.gateway().clone();
    let player = PlayerSession::with_identity(client, repo(), identity("p1", "Ada"), EngineConfig::default());
    for kind in BroadcastKind::ALL {
        assert_eq!(gateway.subscriber_count(kind), 1);
    }

    player.shutdown().await;
    for kind in BroadcastKind::ALL {
        assert_eq!(gateway.subscriber_count(kind), 0);
    }
}

#[tokio::test(start_paused = true)]
async fn replies_after_shutdown_change_nothing() {
    let owner = FakeOwner::seeded(AuthoritativeStatus::Lobby, 5.0, &[("p1", "Ada")]);
    owner.hold_queries(true);
    let (client, _transport) = connected_client(&owner).await;
    let gateway = client.gateway().clone();
    let player = PlayerSession::with_identity(client, repo(), identity("p1", "Ada"), EngineConfig::default());

    let _ = until(&mut player.view(), "rejoined", |v| v.progress == 5.0).await;
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    assert_eq!(owner.held_count(), 1);

    player.shutdown().await;
    let before = player.current();
    assert_eq!(gateway.pending_count(), 1);

    owner.set_progress(80.0);
    assert_eq!(owner.release_held(), 1);
    owner.broadcast(&tapsync_core::Broadcast::GameStarted);
    owner.complete();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    assert_eq!(gateway.pending_count(), 0);
    assert_eq!(player.current(), before);
}
