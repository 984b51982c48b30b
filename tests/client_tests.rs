#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Integration-style client tests for Supertac.
//!
//! Uses the shared `MockTransport` from `tests/common` to script server
//! responses and verify that `SupertacClient` processes them correctly,
//! including state transitions, outgoing message generation, and event
//! delivery order.

mod common;

use supertac::board::{Mark, Move};
use supertac::protocol::{ClientMessage, ParticipantRole};
use supertac::{
    ErrorCode, SupertacClient, SupertacConfig, SupertacError, SupertacEvent, Transport,
};
use uuid::Uuid;

use common::{
    error_json, game_update_json, joined_notice_json, snapshot_after, watchers_update_json,
    welcome_json, MockTransport,
};

const GAME_ID: Uuid = Uuid::from_u128(7);

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

/// Start a client with the given scripted server responses. The first item
/// is typically a `welcome_json(..)` so the join handshake succeeds.
#[allow(clippy::type_complexity)]
fn start_client(
    user_id: &str,
    incoming: Vec<Option<Result<String, SupertacError>>>,
) -> (
    SupertacClient,
    tokio::sync::mpsc::Receiver<SupertacEvent>,
    std::sync::Arc<std::sync::Mutex<Vec<String>>>,
    std::sync::Arc<std::sync::atomic::AtomicBool>,
) {
    let (transport, sent, closed) = MockTransport::new(incoming);
    let config = SupertacConfig::new(GAME_ID, user_id);
    let (client, events) = SupertacClient::start(transport, config);
    (client, events, sent, closed)
}

/// Consume events up to and including the first `PlayerJoined`.
/// Panics if the Connected or PlayerJoined events are not received.
async fn drain_until_joined(rx: &mut tokio::sync::mpsc::Receiver<SupertacEvent>) {
    let ev = rx.recv().await.expect("expected Connected event");
    assert!(
        matches!(ev, SupertacEvent::Connected),
        "first event should be Connected, got {ev:?}"
    );
    let ev = rx.recv().await.expect("expected PlayerJoined event");
    assert!(
        matches!(ev, SupertacEvent::PlayerJoined { .. }),
        "second event should be PlayerJoined, got {ev:?}"
    );
}

// ════════════════════════════════════════════════════════════════════
// Join flow lifecycle
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn join_flow_connected_then_seated() {
    let (mut client, mut events, sent, _closed) = start_client(
        "alice",
        vec![Some(Ok(welcome_json(
            "alice",
            Some(Mark::X),
            ParticipantRole::Player,
            0,
            snapshot_after(&[]),
        )))],
    );

    // First event: Connected (synthetic).
    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, SupertacEvent::Connected));

    // Second event: PlayerJoined (from server response).
    let ev = events.recv().await.expect("event");
    if let SupertacEvent::PlayerJoined {
        user_id,
        symbol,
        status,
        game_state,
        ..
    } = ev
    {
        assert_eq!(user_id, "alice");
        assert_eq!(symbol, Some(Mark::X));
        assert_eq!(status, ParticipantRole::Player);
        assert!(game_state.is_some(), "own join carries the snapshot");
    } else {
        panic!("expected PlayerJoined, got {ev:?}");
    }

    assert!(client.is_connected());
    assert!(client.has_joined());
    assert_eq!(client.my_symbol().await, Some(Mark::X));
    assert_eq!(client.my_role().await, Some(ParticipantRole::Player));

    // Verify the join message went out first, with the camelCase key.
    {
        let messages = sent.lock().unwrap();
        assert!(!messages.is_empty());
        let first: ClientMessage =
            serde_json::from_str(&messages[0]).expect("parse join message");
        assert!(matches!(first, ClientMessage::JoinGame { user_id } if user_id == "alice"));
        assert!(messages[0].contains("\"userId\":\"alice\""));
    }

    client.shutdown().await;
}

#[tokio::test]
async fn rejoining_mid_game_restores_the_seat_and_snapshot() {
    // The server answers a rejoin with the same seat and the current
    // position, here three moves in.
    let (mut client, mut events, _sent, _closed) = start_client(
        "alice",
        vec![Some(Ok(welcome_json(
            "alice",
            Some(Mark::X),
            ParticipantRole::Player,
            1,
            snapshot_after(&[(4, 4), (4, 0), (0, 0)]),
        )))],
    );

    drain_until_joined(&mut events).await;
    assert_eq!(client.my_symbol().await, Some(Mark::X));

    let view = client.game_view().await.expect("replica exists");
    assert_eq!(view.state.move_count, 3);
    assert_eq!(view.state.current_player, Mark::O);
    assert_eq!(view.watchers_count, 1);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Replica maintenance
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn replica_follows_a_move_sequence() {
    let (mut client, mut events, _sent, _closed) = start_client(
        "alice",
        vec![
            Some(Ok(welcome_json(
                "alice",
                Some(Mark::X),
                ParticipantRole::Player,
                0,
                snapshot_after(&[]),
            ))),
            Some(Ok(joined_notice_json(
                "bob",
                Some(Mark::O),
                ParticipantRole::Player,
                0,
            ))),
            Some(Ok(game_update_json("alice", snapshot_after(&[(4, 4)])))),
            Some(Ok(game_update_json(
                "bob",
                snapshot_after(&[(4, 4), (4, 0)]),
            ))),
            Some(Ok(watchers_update_json(2))),
        ],
    );

    // Events arrive in exactly the order the server sent them.
    let mut names = Vec::new();
    for _ in 0..5 {
        let ev = events.recv().await.expect("event");
        names.push(match ev {
            SupertacEvent::Connected => "connected",
            SupertacEvent::PlayerJoined { .. } => "player_joined",
            SupertacEvent::GameUpdated { .. } => "game_updated",
            SupertacEvent::WatchersUpdated { .. } => "watchers_updated",
            other => panic!("unexpected event {other:?}"),
        });
    }
    // The sixth is the watchers update.
    let ev = events.recv().await.expect("event");
    assert!(matches!(
        ev,
        SupertacEvent::WatchersUpdated { watchers_count: 2 }
    ));
    assert_eq!(
        names,
        vec![
            "connected",
            "player_joined",
            "player_joined",
            "game_updated",
            "game_updated",
        ]
    );

    let view = client.game_view().await.expect("replica exists");
    assert_eq!(view.state.move_count, 2);
    assert_eq!(view.state.active_board, Some(0));
    assert_eq!(view.state.current_player, Mark::X);
    assert_eq!(view.watchers_count, 2);
    assert_eq!(view.players.len(), 2);
    assert!(view
        .players
        .iter()
        .any(|p| p.user_id == "alice" && p.symbol == Mark::X));
    assert!(view
        .players
        .iter()
        .any(|p| p.user_id == "bob" && p.symbol == Mark::O));

    client.shutdown().await;
}

#[tokio::test]
async fn server_errors_leave_the_replica_alone() {
    let (mut client, mut events, _sent, _closed) = start_client(
        "alice",
        vec![
            Some(Ok(welcome_json(
                "alice",
                Some(Mark::X),
                ParticipantRole::Player,
                0,
                snapshot_after(&[]),
            ))),
            Some(Ok(error_json(
                "not your turn",
                Some(ErrorCode::NotYourTurn),
            ))),
        ],
    );

    drain_until_joined(&mut events).await;

    let ev = events.recv().await.expect("event");
    match ev {
        SupertacEvent::ServerError {
            message,
            error_code,
        } => {
            assert_eq!(message, "not your turn");
            assert_eq!(error_code, Some(ErrorCode::NotYourTurn));
        }
        other => panic!("expected ServerError, got {other:?}"),
    }

    // The rejection changed nothing: still joined, board untouched.
    assert!(client.has_joined());
    let view = client.game_view().await.expect("replica exists");
    assert_eq!(view.state.move_count, 0);

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Watcher flow
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn watchers_get_a_seatless_welcome_and_can_leave() {
    let (mut client, mut events, sent, _closed) = start_client(
        "carol",
        vec![
            Some(Ok(welcome_json(
                "carol",
                None,
                ParticipantRole::Watcher,
                1,
                snapshot_after(&[(4, 4)]),
            ))),
            Some(Ok(watchers_update_json(0))),
        ],
    );

    drain_until_joined(&mut events).await;
    assert_eq!(client.my_role().await, Some(ParticipantRole::Watcher));
    assert_eq!(client.my_symbol().await, None);

    client.leave_watcher().expect("send leave");
    let ev = events.recv().await.expect("event");
    assert!(matches!(
        ev,
        SupertacEvent::WatchersUpdated { watchers_count: 0 }
    ));

    let view = client.game_view().await.expect("replica exists");
    assert_eq!(view.watchers_count, 0);
    assert!(view.players.is_empty(), "watchers never enter the seat list");

    {
        let messages = sent.lock().unwrap();
        let last: ClientMessage =
            serde_json::from_str(messages.last().unwrap()).expect("parse leave message");
        assert!(matches!(last, ClientMessage::LeaveWatcher { user_id } if user_id == "carol"));
    }

    client.shutdown().await;
}

// ════════════════════════════════════════════════════════════════════
// Disconnects
// ════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn transport_failure_disconnects_the_client() {
    let (client, mut events, _sent, _closed) = start_client(
        "alice",
        vec![
            Some(Ok(welcome_json(
                "alice",
                Some(Mark::X),
                ParticipantRole::Player,
                0,
                snapshot_after(&[]),
            ))),
            Some(Err(SupertacError::TransportReceive(
                "connection reset".into(),
            ))),
        ],
    );

    drain_until_joined(&mut events).await;

    let ev = events.recv().await.expect("event");
    match ev {
        SupertacEvent::Disconnected { reason } => {
            assert!(reason.is_some(), "transport failures carry a reason");
        }
        other => panic!("expected Disconnected, got {other:?}"),
    }

    assert!(!client.is_connected());
    let result = client.make_move(Move {
        global_board_index: 4,
        local_board_index: 4,
    });
    assert!(matches!(result, Err(SupertacError::NotConnected)));
}

#[tokio::test]
async fn shutdown_closes_the_transport_and_notifies() {
    let (mut client, mut events, _sent, closed) = start_client(
        "alice",
        vec![Some(Ok(welcome_json(
            "alice",
            Some(Mark::X),
            ParticipantRole::Player,
            0,
            snapshot_after(&[]),
        )))],
    );

    drain_until_joined(&mut events).await;
    client.shutdown().await;

    assert!(closed.load(std::sync::atomic::Ordering::Relaxed));
    let ev = events.recv().await.expect("event");
    assert!(matches!(ev, SupertacEvent::Disconnected { .. }));
    assert!(events.recv().await.is_none(), "event channel closes");
    assert!(!client.is_connected());
}

// ════════════════════════════════════════════════════════════════════
// Fixture contract
// ════════════════════════════════════════════════════════════════════

#[test]
fn a_drained_mock_transport_parks_instead_of_closing() {
    let frame = watchers_update_json(3);
    let (mut transport, _sent, _closed) = MockTransport::new(vec![Some(Ok(frame.clone()))]);
    {
        let mut scripted = tokio_test::task::spawn(transport.recv());
        match tokio_test::assert_ready!(scripted.poll()) {
            Some(Ok(got)) => assert_eq!(got, frame),
            other => panic!("expected the scripted frame, got {other:?}"),
        }
    }
    // Out of script means idle, not closed.
    let mut drained = tokio_test::task::spawn(transport.recv());
    tokio_test::assert_pending!(drained.poll());
    assert!(!drained.is_woken(), "nothing should wake a drained script");
}
