//! In-process session owner for driving the engine end to end.
//!
//! One room per owner. Every attached [`MemoryServer`] is served on its own
//! task; broadcasts go to every live peer.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::watch;

use tapsync_client::{
    Gateway, InboundRequest, MemoryServer, MemoryTransport, PeerHandle, ReconnectPolicy,
    SessionClient,
};
use tapsync_core::{
    AuthoritativeStatus, Broadcast, Participant, ParticipantId, ProgressUpdate, Reply, SessionId,
    SessionSnapshot, SnapshotReply,
};

pub const ROOM: &str = "ROOM42";
/// Progress added by one tap.
pub const TAP_WEIGHT: f64 = 1.0;

struct Room {
    session_id: Option<SessionId>,
    status: AuthoritativeStatus,
    participants: Vec<Participant>,
    taps: u64,
    progress: f64,
    next_participant: u64,
    peers: Vec<PeerHandle>,
    hold_queries: bool,
    held: Vec<(PeerHandle, u64, Reply)>,
    commands: Vec<String>,
}

#[derive(Clone)]
pub struct FakeOwner {
    room: Arc<Mutex<Room>>,
}

impl FakeOwner {
    pub fn new() -> Self {
        Self {
            room: Arc::new(Mutex::new(Room {
                session_id: None,
                status: AuthoritativeStatus::Lobby,
                participants: Vec::new(),
                taps: 0,
                progress: 0.0,
                next_participant: 1,
                peers: Vec::new(),
                hold_queries: false,
                held: Vec::new(),
                commands: Vec::new(),
            })),
        }
    }

    /// An owner that already hosts `ROOM42` with the given participants.
    pub fn seeded(status: AuthoritativeStatus, progress: f64, names: &[(&str, &str)]) -> Self {
        let owner = Self::new();
        {
            let mut room = owner.room.lock();
            room.session_id = Some(SessionId::from_raw(ROOM));
            room.status = status;
            room.progress = progress;
            room.participants = names
                .iter()
                .map(|(id, name)| Participant {
                    id: ParticipantId::from_raw(*id),
                    name: (*name).to_string(),
                    tap_count: None,
                })
                .collect();
        }
        owner
    }

    /// Serve every connection arriving on `server`.
    pub fn attach(&self, mut server: MemoryServer) {
        let owner = self.clone();
        tokio::spawn(async move {
            while let Some(mut peer) = server.accept().await {
                let handle = peer.handle();
                owner.room.lock().peers.push(handle.clone());
                let owner = owner.clone();
                tokio::spawn(async move {
                    while let Some(request) = peer.next_request().await {
                        owner.handle(&handle, request);
                    }
                });
            }
        });
    }

    fn handle(&self, peer: &PeerHandle, request: InboundRequest) {
        let mut room = self.room.lock();
        room.commands.push(request.command.clone());
        let (reply, broadcasts) = room.answer(&request);
        match reply {
            Some(reply) if room.hold_queries && request.command == "query-session-state" => {
                room.held.push((peer.clone(), request.id, reply));
            }
            Some(reply) => {
                let _ = peer.reply(request.id, reply);
            }
            None => {}
        }
        for broadcast in &broadcasts {
            room.broadcast(broadcast);
        }
    }

    pub fn broadcast(&self, broadcast: &Broadcast) {
        self.room.lock().broadcast(broadcast);
    }

    pub fn complete(&self) {
        let mut room = self.room.lock();
        room.status = AuthoritativeStatus::Completed;
        room.broadcast(&Broadcast::GameComplete);
    }

    pub fn set_progress(&self, progress: f64) {
        self.room.lock().progress = progress;
    }

    /// Park query-session-state replies until [`release_held`](Self::release_held).
    pub fn hold_queries(&self, hold: bool) {
        self.room.lock().hold_queries = hold;
    }

    pub fn release_held(&self) -> usize {
        let mut room = self.room.lock();
        room.hold_queries = false;
        let held = std::mem::take(&mut room.held);
        let count = held.len();
        for (peer, id, reply) in held {
            let _ = peer.reply(id, reply);
        }
        count
    }

    pub fn held_count(&self) -> usize {
        self.room.lock().held.len()
    }

    pub fn participants(&self) -> Vec<Participant> {
        self.room.lock().participants.clone()
    }

    pub fn taps(&self) -> u64 {
        self.room.lock().taps
    }

    pub fn command_count(&self, command: &str) -> usize {
        self.room
            .lock()
            .commands
            .iter()
            .filter(|c| c.as_str() == command)
            .count()
    }

    /// Add a participant without any client, as another device would.
    pub fn add_participant(&self, name: &str) -> ParticipantId {
        let mut room = self.room.lock();
        let id = room.admit(name);
        let joined = Broadcast::ParticipantJoined {
            participants: room.participants.clone(),
        };
        room.broadcast(&joined);
        id
    }
}

impl Room {
    fn broadcast(&mut self, broadcast: &Broadcast) {
        self.peers.retain(|peer| !peer.is_closed());
        for peer in &self.peers {
            let _ = peer.broadcast(broadcast);
        }
    }

    fn admit(&mut self, name: &str) -> ParticipantId {
        let id = ParticipantId::from_raw(format!("p{}", self.next_participant));
        self.next_participant += 1;
        self.participants.push(Participant {
            id: id.clone(),
            name: name.to_string(),
            tap_count: Some(0),
        });
        id
    }

    fn knows_session(&self, request: &InboundRequest) -> bool {
        match (&self.session_id, request.str_field("sessionId")) {
            (Some(id), Some(requested)) => id.as_str() == requested,
            _ => false,
        }
    }

    fn participant_index(&self, request: &InboundRequest) -> Option<usize> {
        let requested = request.str_field("participantId")?;
        self.participants
            .iter()
            .position(|p| p.id.as_str() == requested)
    }

    fn answer(&mut self, request: &InboundRequest) -> (Option<Reply>, Vec<Broadcast>) {
        if request.command == "create-session" {
            self.session_id = Some(SessionId::from_raw(ROOM));
            self.status = AuthoritativeStatus::Lobby;
            self.participants.clear();
            self.taps = 0;
            self.progress = 0.0;
            let reply = Reply::ok(json!({
                "sessionId": ROOM,
                "joinUrl": format!("http://owner.test/join/{ROOM}"),
            }));
            return (Some(reply), vec![]);
        }
        if !self.knows_session(request) {
            return (Some(Reply::failure("Room not found")), vec![]);
        }

        match request.command.as_str() {
            "join-session" => {
                let name = request.str_field("displayName").unwrap_or_default().to_string();
                let id = self.admit(&name);
                let joined = Broadcast::ParticipantJoined {
                    participants: self.participants.clone(),
                };
                (Some(Reply::ok(json!({ "participantId": id }))), vec![joined])
            }
            "query-session-state" => {
                let snapshot = SnapshotReply {
                    session: SessionSnapshot {
                        id: SessionId::from_raw(ROOM),
                        participants: self.participants.clone(),
                        progress: self.progress,
                        status: self.status,
                    },
                };
                let data = serde_json::to_value(snapshot).unwrap();
                (Some(Reply::ok(data)), vec![])
            }
            "rejoin-session" => {
                if self.participant_index(request).is_none() {
                    return (Some(Reply::failure("Player not found")), vec![]);
                }
                let reply = Reply::ok(json!({ "status": self.status, "progress": self.progress }));
                (Some(reply), vec![])
            }
            "start-session" => {
                if self.participants.is_empty() {
                    let reply = Reply::failure_with_code("NO_PARTICIPANTS", "No players yet");
                    return (Some(reply), vec![]);
                }
                self.status = AuthoritativeStatus::Active;
                (Some(Reply::ok(json!({}))), vec![Broadcast::GameStarted])
            }
            "submit-tap" => {
                let Some(index) = self.participant_index(request) else {
                    return (Some(Reply::failure("Player not found")), vec![]);
                };
                if self.status != AuthoritativeStatus::Active {
                    return (Some(Reply::failure("Game not active")), vec![]);
                }
                self.taps += 1;
                self.progress = (self.progress + TAP_WEIGHT).min(100.0);
                let participant = &mut self.participants[index];
                participant.tap_count = Some(participant.tap_count.unwrap_or(0) + 1);
                let mut broadcasts = vec![Broadcast::ProgressUpdate(ProgressUpdate {
                    progress: self.progress,
                    tap_count: self.taps,
                    tapper_name: participant.name.clone(),
                })];
                if self.progress >= 100.0 {
                    self.status = AuthoritativeStatus::Completed;
                    broadcasts.push(Broadcast::GameComplete);
                }
                (Some(Reply::ok(json!({ "progress": self.progress }))), broadcasts)
            }
            other => (Some(Reply::failure(format!("Unknown command {other}"))), vec![]),
        }
    }
}

pub fn policy() -> ReconnectPolicy {
    ReconnectPolicy {
        max_attempts: 10,
        delay: Duration::from_secs(1),
    }
}

/// A client attached to `owner`, plus its transport for fault injection.
pub fn client(owner: &FakeOwner) -> (SessionClient, MemoryTransport) {
    let (transport, server) = MemoryTransport::pair();
    owner.attach(server);
    let gateway = Gateway::connect(transport.clone(), policy());
    (SessionClient::new(gateway), transport)
}

pub async fn until<T: Clone>(
    rx: &mut watch::Receiver<T>,
    what: &str,
    predicate: impl FnMut(&T) -> bool,
) -> T {
    match tokio::time::timeout(Duration::from_secs(120), rx.wait_for(predicate)).await {
        Ok(Ok(view)) => view.clone(),
        Ok(Err(_)) => panic!("view closed while waiting for {what}"),
        Err(_) => panic!("timed out waiting for {what}"),
    }
}
