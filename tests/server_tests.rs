#![cfg(all(feature = "server", feature = "transport-websocket"))]
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! End-to-end tests: real clients against a real server over loopback
//! WebSockets, from game creation through moves, errors, watchers,
//! reconnects, and matchmaking.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use uuid::Uuid;

use supertac::board::{Mark, Move};
use supertac::protocol::{
    ClientMessage, GameMode, GameStateSnapshot, ParticipantRole, QueueJoinResponse,
    QueueStatusResponse, ServerMessage, UserId,
};
use supertac::server::{GameRegistry, GameServer, MatchmakingQueue, ServerConfig};
use supertac::transports::WebSocketTransport;
use supertac::{
    ErrorCode, SupertacClient, SupertacConfig, SupertacEvent, Transport,
};

type Events = tokio::sync::mpsc::Receiver<SupertacEvent>;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

async fn start_server() -> (SocketAddr, GameRegistry, MatchmakingQueue) {
    let server = GameServer::bind(ServerConfig::new().with_bind_addr("127.0.0.1:0"))
        .await
        .expect("bind");
    let addr = server.local_addr().expect("local addr");
    let registry = server.registry().clone();
    let queue = server.queue().clone();
    tokio::spawn(server.run());
    (addr, registry, queue)
}

async fn connect(addr: SocketAddr, game_id: Uuid, user_id: &str) -> (SupertacClient, Events) {
    let url = format!("ws://{addr}/ws/{game_id}");
    let transport = WebSocketTransport::connect(&url).await.expect("connect");
    SupertacClient::start(transport, SupertacConfig::new(game_id, user_id))
}

async fn next_event(events: &mut Events) -> SupertacEvent {
    timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for an event")
        .expect("event stream ended")
}

/// Consumes events until the own welcome (the `player_joined` carrying a
/// snapshot) arrives; returns the assigned seat.
async fn expect_seat(events: &mut Events) -> (Option<Mark>, ParticipantRole) {
    loop {
        match next_event(events).await {
            SupertacEvent::PlayerJoined {
                symbol,
                status,
                game_state: Some(_),
                ..
            } => return (symbol, status),
            SupertacEvent::ServerError { message, .. } => {
                panic!("join rejected: {message}");
            }
            SupertacEvent::Disconnected { reason } => {
                panic!("disconnected while joining: {reason:?}");
            }
            _ => {}
        }
    }
}

/// Consumes events until a `game_update` arrives. Join notices and
/// watcher counts are skipped; an error fails the test.
async fn next_update(events: &mut Events) -> (UserId, GameStateSnapshot) {
    loop {
        match next_event(events).await {
            SupertacEvent::GameUpdated {
                user_id,
                game_state,
            } => return (user_id, game_state),
            SupertacEvent::ServerError { message, .. } => {
                panic!("unexpected error while waiting for update: {message}");
            }
            SupertacEvent::Disconnected { reason } => {
                panic!("disconnected while waiting for update: {reason:?}");
            }
            _ => {}
        }
    }
}

async fn next_error(events: &mut Events) -> (String, Option<ErrorCode>) {
    loop {
        match next_event(events).await {
            SupertacEvent::ServerError {
                message,
                error_code,
            } => return (message, error_code),
            SupertacEvent::Disconnected { reason } => {
                panic!("disconnected while waiting for error: {reason:?}");
            }
            _ => {}
        }
    }
}

async fn next_watchers(events: &mut Events) -> u32 {
    loop {
        match next_event(events).await {
            SupertacEvent::WatchersUpdated { watchers_count } => return watchers_count,
            SupertacEvent::ServerError { message, .. } => {
                panic!("unexpected error while waiting for watchers: {message}");
            }
            _ => {}
        }
    }
}

fn mv(board: u8, cell: u8) -> Move {
    Move::new(board, cell)
}

// ════════════════════════════════════════════════════════════════════
// Game flow over real sockets
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn two_players_and_a_watcher_follow_a_game() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    assert_eq!(
        expect_seat(&mut alice_events).await,
        (Some(Mark::X), ParticipantRole::Player)
    );

    let (_bob, mut bob_events) = connect(addr, created.game_id, "bob").await;
    assert_eq!(
        expect_seat(&mut bob_events).await,
        (Some(Mark::O), ParticipantRole::Player)
    );

    let (_carol, mut carol_events) = connect(addr, created.game_id, "carol").await;
    assert_eq!(
        expect_seat(&mut carol_events).await,
        (None, ParticipantRole::Watcher)
    );
    assert_eq!(next_watchers(&mut alice_events).await, 1);

    alice.make_move(mv(4, 4)).expect("send move");
    for events in [&mut alice_events, &mut bob_events, &mut carol_events] {
        let (user_id, game_state) = next_update(events).await;
        assert_eq!(user_id, "alice");
        assert_eq!(game_state.move_count, 1);
        assert_eq!(game_state.active_board, Some(4));
        assert_eq!(game_state.current_player, Mark::O);
    }
}

#[tokio::test]
async fn the_active_board_rule_is_enforced() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    expect_seat(&mut alice_events).await;
    let (bob, mut bob_events) = connect(addr, created.game_id, "bob").await;
    expect_seat(&mut bob_events).await;

    alice.make_move(mv(4, 7)).expect("send move");
    next_update(&mut alice_events).await;
    next_update(&mut bob_events).await;

    // Cell 7 sends the opponent to board 7; board 0 is off limits.
    bob.make_move(mv(0, 0)).expect("send move");
    let (message, error_code) = next_error(&mut bob_events).await;
    assert_eq!(error_code, Some(ErrorCode::IllegalMove));
    assert!(message.contains("active board"), "got: {message}");

    bob.make_move(mv(7, 0)).expect("send move");
    let (user_id, game_state) = next_update(&mut bob_events).await;
    assert_eq!(user_id, "bob");
    assert_eq!(game_state.move_count, 2);
    assert_eq!(game_state.active_board, Some(0));
}

#[tokio::test]
async fn rejected_moves_stay_private() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    expect_seat(&mut alice_events).await;
    let (bob, mut bob_events) = connect(addr, created.game_id, "bob").await;
    expect_seat(&mut bob_events).await;

    // X moves first; bob jumps the turn and is told off privately.
    bob.make_move(mv(0, 0)).expect("send move");
    let (_, error_code) = next_error(&mut bob_events).await;
    assert_eq!(error_code, Some(ErrorCode::NotYourTurn));

    // Alice's stream holds no error: her next substantive event is the
    // update for her own move (next_update panics on errors).
    alice.make_move(mv(4, 4)).expect("send move");
    let (user_id, game_state) = next_update(&mut alice_events).await;
    assert_eq!(user_id, "alice");
    assert_eq!(game_state.move_count, 1);
}

#[tokio::test]
async fn reset_reopens_the_game_for_everyone() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    expect_seat(&mut alice_events).await;
    let (bob, mut bob_events) = connect(addr, created.game_id, "bob").await;
    expect_seat(&mut bob_events).await;

    alice.make_move(mv(4, 4)).expect("send move");
    next_update(&mut alice_events).await;
    next_update(&mut bob_events).await;

    bob.reset_game().expect("send reset");
    for events in [&mut alice_events, &mut bob_events] {
        let (user_id, game_state) = next_update(events).await;
        assert_eq!(user_id, "bob");
        assert_eq!(game_state.move_count, 0);
        assert_eq!(game_state.winner, None);
        assert_eq!(game_state.active_board, None);
        assert_eq!(game_state.current_player, Mark::X);
    }
}

#[tokio::test]
async fn a_returning_player_gets_the_same_seat() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (mut alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    assert_eq!(
        expect_seat(&mut alice_events).await,
        (Some(Mark::X), ParticipantRole::Player)
    );
    let (_bob, mut bob_events) = connect(addr, created.game_id, "bob").await;
    expect_seat(&mut bob_events).await;

    alice.make_move(mv(4, 4)).expect("send move");
    next_update(&mut alice_events).await;
    alice.shutdown().await;

    // Same user id, fresh connection: seat and position come back.
    let (alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    assert_eq!(
        expect_seat(&mut alice_events).await,
        (Some(Mark::X), ParticipantRole::Player)
    );
    let view = alice.game_view().await.expect("replica");
    assert_eq!(view.state.move_count, 1);
    assert_eq!(view.state.active_board, Some(4));
}

#[tokio::test]
async fn watchers_can_step_away() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (_alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    expect_seat(&mut alice_events).await;
    let (carol, mut carol_events) = connect(addr, created.game_id, "carol").await;
    assert_eq!(
        expect_seat(&mut carol_events).await,
        (None, ParticipantRole::Watcher)
    );
    assert_eq!(next_watchers(&mut alice_events).await, 1);

    carol.leave_watcher().expect("send leave");
    assert_eq!(next_watchers(&mut alice_events).await, 0);
}

#[tokio::test]
async fn a_watcher_dropping_offline_updates_the_count() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (_alice, mut alice_events) = connect(addr, created.game_id, "alice").await;
    expect_seat(&mut alice_events).await;
    let (mut carol, mut carol_events) = connect(addr, created.game_id, "carol").await;
    assert_eq!(
        expect_seat(&mut carol_events).await,
        (None, ParticipantRole::Watcher)
    );
    assert_eq!(next_watchers(&mut alice_events).await, 1);

    // Carol's socket closes without a leave_watcher; the hangup alone
    // must bring the count back down for everyone still attached.
    carol.shutdown().await;
    assert_eq!(next_watchers(&mut alice_events).await, 0);
}

// ════════════════════════════════════════════════════════════════════
// Connection-level rejections
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn unknown_games_are_turned_away() {
    let (addr, _registry, _queue) = start_server().await;
    let never_created = Uuid::new_v4();

    let (_client, mut events) = connect(addr, never_created, "ghost").await;
    let (message, error_code) = next_error(&mut events).await;
    assert_eq!(error_code, Some(ErrorCode::GameNotFound));
    assert_eq!(message, "game not found");
    // The server hangs up after the rejection.
    assert!(matches!(
        next_event(&mut events).await,
        SupertacEvent::Disconnected { .. }
    ));
}

#[tokio::test]
async fn malformed_paths_are_turned_away() {
    let (addr, _registry, _queue) = start_server().await;

    let mut transport = WebSocketTransport::connect(&format!("ws://{addr}/ws/not-a-uuid"))
        .await
        .expect("connect");
    let frame = transport
        .recv()
        .await
        .expect("a frame before close")
        .expect("clean frame");
    let message: ServerMessage = serde_json::from_str(&frame).expect("parse");
    match message {
        ServerMessage::Error { error_code, .. } => {
            assert_eq!(error_code, Some(ErrorCode::InvalidMessage));
        }
        other => panic!("expected error, got {other:?}"),
    }
    assert!(transport.recv().await.is_none(), "server closes the socket");
}

#[tokio::test]
async fn joining_comes_before_everything_else() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let mut transport = WebSocketTransport::connect(&format!("ws://{addr}/ws/{}", created.game_id))
        .await
        .expect("connect");
    let premature = serde_json::to_string(&ClientMessage::MakeMove {
        user_id: "alice".into(),
        mv: mv(4, 4),
    })
    .expect("serialize");
    transport.send(premature).await.expect("send");

    let frame = transport
        .recv()
        .await
        .expect("a reply")
        .expect("clean frame");
    let message: ServerMessage = serde_json::from_str(&frame).expect("parse");
    match message {
        ServerMessage::Error { error_code, .. } => {
            assert_eq!(error_code, Some(ErrorCode::NotInGame));
        }
        other => panic!("expected error, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_frames_are_answered_without_closing_the_socket() {
    let (addr, registry, _queue) = start_server().await;
    let created = registry.create_game(GameMode::Remote, None).await;

    let (socket, _response) =
        tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{}", created.game_id))
            .await
            .expect("connect");
    let (mut tx, mut rx) = socket.split();

    tx.send(Message::Text("not even close to json".into()))
        .await
        .expect("send garbage");
    let reply = timeout(Duration::from_secs(5), rx.next())
        .await
        .expect("timed out waiting for a reply")
        .expect("a reply before close")
        .expect("clean frame");
    let message: ServerMessage =
        serde_json::from_str(reply.to_text().expect("text frame")).expect("parse");
    match message {
        ServerMessage::Error { error_code, .. } => {
            assert_eq!(error_code, Some(ErrorCode::InvalidMessage));
        }
        other => panic!("expected error, got {other:?}"),
    }

    // Binary frames are dropped without a reply.
    tx.send(Message::Binary(vec![0x00, 0x9f].into()))
        .await
        .expect("send binary");

    // The same socket is still welcome at the table.
    let join = serde_json::to_string(&ClientMessage::JoinGame {
        user_id: "alice".into(),
    })
    .expect("serialize");
    tx.send(Message::Text(join.into())).await.expect("send join");
    let welcome = timeout(Duration::from_secs(5), rx.next())
        .await
        .expect("timed out waiting for the welcome")
        .expect("a welcome")
        .expect("clean frame");
    let message: ServerMessage =
        serde_json::from_str(welcome.to_text().expect("text frame")).expect("parse");
    match message {
        ServerMessage::PlayerJoined(payload) => {
            assert_eq!(payload.user_id, "alice");
            assert_eq!(payload.symbol, Some(Mark::X));
            assert!(payload.game_state.is_some());
        }
        other => panic!("expected the welcome, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Matchmaking
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn queued_users_are_paired_and_play() {
    let (addr, registry, queue) = start_server().await;

    assert_eq!(
        queue.join("u1").await.expect("join queue"),
        QueueJoinResponse::Queued {
            position: 0,
            queue_size: 1,
        }
    );
    let QueueJoinResponse::Matched { game_id } = queue.join("u2").await.expect("join queue")
    else {
        panic!("u2 should be matched immediately");
    };

    // u1 discovers the pairing by polling; the result sticks around.
    assert_eq!(
        queue.status("u1").await.expect("status"),
        QueueStatusResponse::Matched { game_id }
    );
    assert!(registry.handle(&game_id).await.is_some());

    let (u1, mut u1_events) = connect(addr, game_id, "u1").await;
    assert_eq!(
        expect_seat(&mut u1_events).await,
        (Some(Mark::X), ParticipantRole::Player)
    );
    let (_u2, mut u2_events) = connect(addr, game_id, "u2").await;
    assert_eq!(
        expect_seat(&mut u2_events).await,
        (Some(Mark::O), ParticipantRole::Player)
    );

    u1.make_move(mv(4, 4)).expect("send move");
    let (user_id, game_state) = next_update(&mut u2_events).await;
    assert_eq!(user_id, "u1");
    assert_eq!(game_state.move_count, 1);

    // Leaving afterwards is allowed and idempotent.
    assert!(queue.leave("u1").await.expect("leave"));
    assert!(!queue.leave("u1").await.expect("leave"));
}
