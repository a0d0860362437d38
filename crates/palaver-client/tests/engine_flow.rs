//! End-to-end scenarios for the synchronization engine.
//!
//! Each test drives a [`Client`] through realistic event sequences - the
//! same shapes the transport driver would feed it - and checks the actions
//! and published state changes against the engine's contracts.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

use palaver_client::{
    Client, ClientAction, ClientEvent, ConnectionPhase, Environment, HttpCall, KvStore, MemoryKv,
    SyncEvent, keys,
};
use palaver_proto::{ClientFrame, Identity, Message, Room, UserStatus};

/// Deterministic environment with a manually advanced clock.
#[derive(Clone)]
struct SimEnv {
    start: Instant,
    offset: Arc<Mutex<Duration>>,
    counter: Arc<AtomicU64>,
}

impl SimEnv {
    fn new() -> Self {
        Self {
            start: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
            counter: Arc::new(AtomicU64::new(1)),
        }
    }

    fn advance(&self, by: Duration) {
        *self.offset.lock().unwrap() += by;
    }
}

impl Environment for SimEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        self.start + *self.offset.lock().unwrap()
    }

    fn unix_millis(&self) -> i64 {
        self.offset.lock().unwrap().as_millis() as i64
    }

    fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        async {}
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        let seed = self.counter.fetch_add(1, Ordering::Relaxed);
        for (i, byte) in buffer.iter_mut().enumerate() {
            *byte = (seed.wrapping_add(i as u64) & 0xFF) as u8;
        }
    }
}

fn room(id: &str, name: &str) -> Room {
    Room {
        id: id.into(),
        name: name.into(),
        description: String::new(),
        is_private: false,
        member_count: 0,
        unread_count: 0,
        last_activity: 0,
    }
}

fn auth_ok(username: &str) -> String {
    format!(
        r#"{{"type":"auth_response","success":true,"user":{{"id":"u1","username":"{username}","status":"online"}}}}"#
    )
}

fn room_list(rooms: &[(&str, &str)]) -> String {
    let body: Vec<String> = rooms
        .iter()
        .map(|(id, name)| format!(r#"{{"id":"{id}","name":"{name}"}}"#))
        .collect();
    format!(r#"{{"type":"room_list","rooms":[{}]}}"#, body.join(","))
}

fn published(actions: &[ClientAction]) -> Vec<&SyncEvent> {
    actions
        .iter()
        .filter_map(|a| match a {
            ClientAction::Publish(event) => Some(event),
            _ => None,
        })
        .collect()
}

fn phases(actions: &[ClientAction]) -> Vec<ConnectionPhase> {
    published(actions)
        .into_iter()
        .filter_map(|e| match e {
            SyncEvent::PhaseChanged(p) => Some(*p),
            _ => None,
        })
        .collect()
}

/// Drive a fresh client to the `Connected` phase.
fn connected_client() -> (Client<SimEnv, MemoryKv>, SimEnv, MemoryKv) {
    let env = SimEnv::new();
    let kv = MemoryKv::new();
    let mut client = Client::new(env.clone(), kv.clone());

    client.handle(ClientEvent::Start).unwrap();
    client
        .handle(ClientEvent::IdentityFetched {
            identity: Identity { id: None, username: Some("ada".into()) },
        })
        .unwrap();
    client.handle(ClientEvent::ChannelOpen).unwrap();
    client.handle(ClientEvent::ChannelText(auth_ok("ada"))).unwrap();
    assert!(client.is_connected());
    (client, env, kv)
}

#[test]
fn bootstrap_handshake_reaches_connected() {
    let env = SimEnv::new();
    let kv = MemoryKv::new();
    let mut client = Client::new(env, kv.clone());

    let actions = client.handle(ClientEvent::Start).unwrap();
    assert!(actions.contains(&ClientAction::Http(HttpCall::FetchIdentity)));
    assert_eq!(phases(&actions), vec![ConnectionPhase::IdentityPending]);

    let actions = client
        .handle(ClientEvent::IdentityFetched {
            identity: Identity { id: None, username: Some("ada".into()) },
        })
        .unwrap();
    assert!(actions.contains(&ClientAction::OpenChannel));

    let actions = client.handle(ClientEvent::ChannelOpen).unwrap();
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::Auth {
        username: "ada".into()
    })));
    assert_eq!(client.phase(), ConnectionPhase::Authenticating);

    let actions = client.handle(ClientEvent::ChannelText(auth_ok("ada"))).unwrap();
    assert!(client.is_connected());
    // Directory refresh is requested as part of completing authentication.
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::GetRooms)));

    // Identity survived into durable storage for the next session.
    assert_eq!(kv.get(keys::USERNAME).unwrap(), Some("ada".into()));
}

#[test]
fn reconnect_phases_observed_exactly_once_each() {
    let (mut client, _env, _kv) = connected_client();

    let mut observed = Vec::new();
    for event in [
        ClientEvent::ChannelClosed { reason: "eof".into() },
        ClientEvent::TimerElapsed,
        ClientEvent::ChannelOpen,
        ClientEvent::ChannelText(auth_ok("ada")),
    ] {
        observed.extend(phases(&client.handle(event).unwrap()));
    }

    assert_eq!(observed, vec![
        ConnectionPhase::Reconnecting,
        ConnectionPhase::Connecting,
        ConnectionPhase::Authenticating,
        ConnectionPhase::Connected,
    ]);
}

#[test]
fn send_hello_is_optimistic_then_confirmed_in_place() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("general", "General")]))).unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "general".into() }).unwrap();

    let actions = client.handle(ClientEvent::SendMessage { content: "hello".into() }).unwrap();

    // Exactly one pending entry in the log.
    let entries = client.messages().log("general");
    assert_eq!(entries.len(), 1);
    assert!(entries[0].pending);
    assert_eq!(entries[0].message.content, "hello");

    // The outgoing frame carries the correlation tag.
    let tag = actions
        .iter()
        .find_map(|a| match a {
            ClientAction::SendFrame(ClientFrame::SendMessage { client_tag, .. }) => {
                client_tag.clone()
            },
            _ => None,
        })
        .unwrap();

    // Server echoes the broadcast with our tag.
    let echo = format!(
        r#"{{"type":"message","message":{{"id":"m1","room_id":"general","user_id":"u1","username":"ada","content":"hello","timestamp":1234,"client_tag":"{tag}"}}}}"#
    );
    let actions = client.handle(ClientEvent::ChannelText(echo)).unwrap();

    assert!(published(&actions).iter().any(|e| matches!(
        e,
        SyncEvent::MessageConfirmed { id, .. } if id == "m1"
    )));
    let entries = client.messages().log("general");
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].pending);
    assert_eq!(entries[0].message.id, "m1");
}

#[test]
fn select_room_joins_and_requests_history() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("general", "General")]))).unwrap();

    let actions = client.handle(ClientEvent::SelectRoom { room_id: "general".into() }).unwrap();
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::JoinRoom {
        room_id: "general".into()
    })));
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::GetMessages {
        room_id: "general".into(),
        limit: 50,
        before_id: None,
    })));
    assert_eq!(client.active_room(), Some("general"));
}

#[test]
fn pagination_uses_earliest_confirmed_id_as_cursor() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("general", "General")]))).unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "general".into() }).unwrap();

    // Newest-first page: m3 then m2.
    let history = r#"{"type":"message_history","room_id":"general","messages":[
        {"id":"m3","room_id":"general","content":"c","timestamp":3000},
        {"id":"m2","room_id":"general","content":"b","timestamp":2000}]}"#;
    let actions = client.handle(ClientEvent::ChannelText(history.into())).unwrap();
    assert!(published(&actions).iter().any(|e| matches!(
        e,
        SyncEvent::HistoryPrepended { count: 2, .. }
    )));

    let actions = client.handle(ClientEvent::FetchOlder).unwrap();
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::GetMessages {
        room_id: "general".into(),
        limit: 20,
        before_id: Some("m2".into()),
    })));
}

#[test]
fn late_history_page_for_abandoned_room_is_ignored() {
    let (mut client, _env, _kv) = connected_client();
    client
        .handle(ClientEvent::ChannelText(room_list(&[("a", "A"), ("b", "B")])))
        .unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "b".into() }).unwrap();

    // Page requested while in room A arrives after the switch.
    let stale = r#"{"type":"message_history","room_id":"a","messages":[
        {"id":"m1","room_id":"a","content":"late","timestamp":1000}]}"#;
    let actions = client.handle(ClientEvent::ChannelText(stale.into())).unwrap();

    assert!(published(&actions).is_empty());
    assert!(client.messages().log("a").is_empty());
}

#[test]
fn reconnect_distrusts_deltas_until_fresh_snapshot() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("r1", "One")]))).unwrap();
    assert!(client.directory().is_synced());

    // Lose and reopen the channel.
    client.handle(ClientEvent::ChannelClosed { reason: "eof".into() }).unwrap();
    client.handle(ClientEvent::TimerElapsed).unwrap();
    client.handle(ClientEvent::ChannelOpen).unwrap();
    let actions = client.handle(ClientEvent::ChannelText(auth_ok("ada"))).unwrap();
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::GetRooms)));

    // A delta that races ahead of the snapshot is not applied.
    let early_delta = r#"{"type":"room_joined","room":{"id":"r9","name":"Nine"}}"#;
    let actions = client.handle(ClientEvent::ChannelText(early_delta.into())).unwrap();
    assert!(published(&actions).is_empty());
    assert!(client.directory().room("r9").is_none());

    // Once the snapshot lands, deltas are trusted again.
    client.handle(ClientEvent::ChannelText(room_list(&[("r1", "One")]))).unwrap();
    let actions = client
        .handle(ClientEvent::ChannelText(
            r#"{"type":"room_joined","room":{"id":"r9","name":"Nine"}}"#.into(),
        ))
        .unwrap();
    assert!(!published(&actions).is_empty());
    assert!(client.directory().room("r9").is_some());
}

#[test]
fn switching_rooms_flushes_and_loads_drafts() {
    let (mut client, _env, kv) = connected_client();
    client
        .handle(ClientEvent::ChannelText(room_list(&[("a", "A"), ("b", "B")])))
        .unwrap();

    // Pre-existing stored draft for room B.
    kv.put(
        &keys::draft("b"),
        r#"{"room_id":"b","text":"stored b","saved_at":50}"#,
    )
    .unwrap();

    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();
    client.handle(ClientEvent::InputChanged { text: "half-typed".into() }).unwrap();

    // Switch before the debounce window elapses.
    let actions = client.handle(ClientEvent::SelectRoom { room_id: "b".into() }).unwrap();

    // A's draft was flushed immediately.
    assert!(kv.get(&keys::draft("a")).unwrap().unwrap().contains("half-typed"));
    // B's stored draft was loaded into the input.
    assert!(published(&actions).iter().any(|e| matches!(
        e,
        SyncEvent::DraftLoaded { room_id, text } if room_id == "b" && text == "stored b"
    )));
}

#[test]
fn draft_saves_after_debounce_and_clears_on_send() {
    let (mut client, env, kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("a", "A")]))).unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();

    client.handle(ClientEvent::InputChanged { text: "brb".into() }).unwrap();
    env.advance(Duration::from_secs(6));
    client.handle(ClientEvent::Tick).unwrap();
    assert!(kv.get(&keys::draft("a")).unwrap().is_some());

    client.handle(ClientEvent::SendMessage { content: "brb".into() }).unwrap();
    assert_eq!(kv.get(&keys::draft("a")).unwrap(), None);
}

#[test]
fn disconnected_commands_fall_back_to_http() {
    let env = SimEnv::new();
    let kv = MemoryKv::new();
    let mut client = Client::new(env, kv);

    // No connection at all: selecting a room warns about the dropped join
    // and fetches messages over HTTP instead.
    let actions = client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();
    assert!(actions.contains(&ClientAction::Http(HttpCall::FetchMessages {
        room_id: "a".into()
    })));
    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::Log { message } if message.contains("join_room")
    )));

    // Sending routes through the fallback endpoint, still optimistic.
    let actions = client.handle(ClientEvent::SendMessage { content: "hi".into() }).unwrap();
    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::Http(HttpCall::SendMessage { room_id, content, .. })
            if room_id == "a" && content == "hi"
    )));
    assert_eq!(client.messages().log("a").len(), 1);
    assert!(client.messages().log("a")[0].pending);

    // The HTTP confirmation reconciles the pending entry.
    let tag = actions
        .iter()
        .find_map(|a| match a {
            ClientAction::Http(HttpCall::SendMessage { client_tag, .. }) => {
                Some(client_tag.clone())
            },
            _ => None,
        })
        .unwrap();
    let confirmed = Message {
        id: "m1".into(),
        room_id: "a".into(),
        user_id: String::new(),
        username: "Anonymous".into(),
        content: "hi".into(),
        timestamp: 99,
        client_tag: Some(tag),
    };
    client.handle(ClientEvent::HttpMessageSent { message: confirmed }).unwrap();
    let entries = client.messages().log("a");
    assert_eq!(entries.len(), 1);
    assert!(!entries[0].pending);
    assert_eq!(entries[0].message.id, "m1");
}

#[test]
fn http_messages_arrive_oldest_first_and_order_correctly() {
    let env = SimEnv::new();
    let kv = MemoryKv::new();
    let mut client = Client::new(env, kv);
    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();

    let oldest_first: Vec<Message> = (1..=3)
        .map(|i| Message {
            id: format!("m{i}"),
            room_id: "a".into(),
            user_id: "u1".into(),
            username: "ada".into(),
            content: format!("c{i}"),
            timestamp: i * 1000,
            client_tag: None,
        })
        .collect();
    client
        .handle(ClientEvent::HttpMessagesLoaded { room_id: "a".into(), messages: oldest_first })
        .unwrap();

    let ids: Vec<&str> =
        client.messages().log("a").iter().map(|e| e.message.id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2", "m3"]);
}

#[test]
fn pushes_to_inactive_rooms_increment_unread() {
    let (mut client, _env, _kv) = connected_client();
    client
        .handle(ClientEvent::ChannelText(room_list(&[("a", "A"), ("b", "B")])))
        .unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();

    let push = r#"{"type":"message","message":{"id":"m1","room_id":"b","user_id":"u2","username":"bob","content":"psst","timestamp":500}}"#;
    let actions = client.handle(ClientEvent::ChannelText(push.into())).unwrap();

    assert!(published(&actions).iter().any(|e| matches!(
        e,
        SyncEvent::RoomUpdated { room } if room.id == "b" && room.unread_count == 1
    )));

    // Entering the room clears the badge.
    client.handle(ClientEvent::SelectRoom { room_id: "b".into() }).unwrap();
    assert_eq!(client.directory().room("b").unwrap().unread_count, 0);
}

#[test]
fn roster_tracks_user_joined_and_left() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("a", "A")]))).unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();

    let joined = r#"{"type":"user_joined","user":{"id":"u2","username":"bob","status":"online"}}"#;
    let actions = client.handle(ClientEvent::ChannelText(joined.into())).unwrap();
    assert!(published(&actions).iter().any(|e| matches!(e, SyncEvent::UserJoined { .. })));
    assert_eq!(client.directory().user("u2").map(|u| u.status), Some(UserStatus::Online));

    let left = r#"{"type":"user_left","user_id":"u2"}"#;
    client.handle(ClientEvent::ChannelText(left.into())).unwrap();
    assert!(client.directory().user("u2").is_none());

    // A second user_left for the same id publishes nothing.
    let actions = client
        .handle(ClientEvent::ChannelText(r#"{"type":"user_left","user_id":"u2"}"#.into()))
        .unwrap();
    assert!(published(&actions).is_empty());
}

#[test]
fn unknown_and_malformed_frames_are_dropped_nonfatally() {
    let (mut client, _env, _kv) = connected_client();

    let actions = client
        .handle(ClientEvent::ChannelText(r#"{"type":"typing","user_id":"u2"}"#.into()))
        .unwrap();
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Log { .. })));

    let actions = client.handle(ClientEvent::ChannelText("{broken".into())).unwrap();
    assert!(actions.iter().any(|a| matches!(a, ClientAction::Log { .. })));

    // The engine is unaffected.
    assert!(client.is_connected());
}

#[test]
fn auth_rejection_surfaces_and_schedules_retry() {
    let env = SimEnv::new();
    let kv = MemoryKv::new();
    let mut client = Client::new(env, kv);
    client.handle(ClientEvent::Start).unwrap();
    client
        .handle(ClientEvent::IdentityFetched { identity: Identity::default() })
        .unwrap();
    client.handle(ClientEvent::ChannelOpen).unwrap();

    let rejected =
        r#"{"type":"auth_response","success":false,"error":"username taken"}"#;
    let actions = client.handle(ClientEvent::ChannelText(rejected.into())).unwrap();

    assert!(published(&actions).iter().any(|e| matches!(
        e,
        SyncEvent::AuthRejected { reason } if reason == "username taken"
    )));
    assert_eq!(client.phase(), ConnectionPhase::Failed);
    assert!(actions.iter().any(|a| matches!(a, ClientAction::StartTimer(_))));
}

#[test]
fn created_room_is_inserted_and_auto_selected() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[]))).unwrap();

    let actions = client
        .handle(ClientEvent::CreateRoom {
            name: "new".into(),
            description: "d".into(),
            is_private: false,
        })
        .unwrap();
    assert!(actions.iter().any(|a| matches!(
        a,
        ClientAction::Http(HttpCall::CreateRoom { name, .. }) if name == "new"
    )));

    let actions =
        client.handle(ClientEvent::HttpRoomCreated { room: room("r7", "new") }).unwrap();
    assert!(client.directory().room("r7").is_some());
    assert_eq!(client.active_room(), Some("r7"));
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::JoinRoom {
        room_id: "r7".into()
    })));
}

#[test]
fn leaving_the_active_room_clears_room_scoped_state() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("a", "A")]))).unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();
    client.handle(ClientEvent::SendMessage { content: "bye".into() }).unwrap();

    let actions = client.handle(ClientEvent::LeaveRoom).unwrap();
    assert!(actions.contains(&ClientAction::SendFrame(ClientFrame::LeaveRoom {
        room_id: "a".into()
    })));
    assert_eq!(client.active_room(), None);
    assert!(client.messages().log("a").is_empty());
}

#[test]
fn server_initiated_room_left_clears_active_room() {
    let (mut client, _env, _kv) = connected_client();
    client.handle(ClientEvent::ChannelText(room_list(&[("a", "A")]))).unwrap();
    client.handle(ClientEvent::SelectRoom { room_id: "a".into() }).unwrap();

    let actions = client
        .handle(ClientEvent::ChannelText(r#"{"type":"room_left","room_id":"a"}"#.into()))
        .unwrap();
    assert!(published(&actions).iter().any(|e| matches!(
        e,
        SyncEvent::RoomLeft { room_id } if room_id == "a"
    )));
    assert_eq!(client.active_room(), None);
}
