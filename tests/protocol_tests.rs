#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Supertac protocol.
//!
//! Pins the exact JSON the server speaks: `type`-tagged realtime
//! messages with camelCase `userId`, snake_case management payloads,
//! 9x9 board arrays, and the presence/absence rules for optional keys.
//! Shapes here are fixtures; behavior lives in the client and server
//! tests.

use serde_json::{json, Value};
use supertac::board::{GameWinner, GlobalBoard, Mark, Move};
use supertac::error_codes::ErrorCode;
use supertac::protocol::{
    AiDifficulty, ClientMessage, CreateGameRequest, CreateGameResponse, GameMode,
    GameStateSnapshot, ParticipantRole, PlayerJoinedPayload, QueueJoinResponse,
    QueueStatusResponse, ResetRequest, ResetResponse, ServerMessage,
};
use uuid::Uuid;

// ════════════════════════════════════════════════════════════════════
// Helpers
// ════════════════════════════════════════════════════════════════════

fn test_uuid(n: u128) -> Uuid {
    Uuid::from_u128(n)
}

fn to_value<T: serde::Serialize>(val: &T) -> Value {
    serde_json::to_value(val).expect("serialize")
}

/// A 9x9 grid of `null` cells, the empty global board on the wire.
fn empty_board_json() -> Value {
    json!(vec![vec![Value::Null; 9]; 9])
}

/// Snapshot one move in: X placed at board 4, cell 4.
fn one_move_snapshot() -> GameStateSnapshot {
    let mut global_board = GlobalBoard::default();
    global_board
        .place(Move::new(4, 4), Mark::X)
        .expect("legal placement");
    GameStateSnapshot {
        global_board,
        active_board: Some(4),
        move_count: 1,
        winner: None,
        current_player: Mark::O,
    }
}

// ════════════════════════════════════════════════════════════════════
// Client → server messages
// ════════════════════════════════════════════════════════════════════

#[test]
fn join_game_wire_shape() {
    let msg = ClientMessage::JoinGame {
        user_id: "alice".into(),
    };
    assert_eq!(
        to_value(&msg),
        json!({"type": "join_game", "userId": "alice"})
    );
}

#[test]
fn make_move_wire_shape() {
    let msg = ClientMessage::MakeMove {
        user_id: "alice".into(),
        mv: Move::new(4, 7),
    };
    assert_eq!(
        to_value(&msg),
        json!({
            "type": "make_move",
            "userId": "alice",
            "move": {"global_board_index": 4, "local_board_index": 7},
        })
    );
}

#[test]
fn leave_watcher_and_reset_wire_shapes() {
    assert_eq!(
        to_value(&ClientMessage::LeaveWatcher {
            user_id: "carol".into(),
        }),
        json!({"type": "leave_watcher", "userId": "carol"})
    );
    assert_eq!(
        to_value(&ClientMessage::ResetGame {
            user_id: "alice".into(),
        }),
        json!({"type": "reset_game", "userId": "alice"})
    );
}

#[test]
fn client_messages_parse_from_raw_fixtures() {
    let raw = r#"{"type":"make_move","userId":"bob","move":{"global_board_index":0,"local_board_index":8}}"#;
    let msg: ClientMessage = serde_json::from_str(raw).expect("parse");
    match msg {
        ClientMessage::MakeMove { user_id, mv } => {
            assert_eq!(user_id, "bob");
            assert_eq!(mv, Move::new(0, 8));
        }
        other => panic!("expected make_move, got {other:?}"),
    }

    let raw = r#"{"type":"join_game","userId":"carol"}"#;
    let msg: ClientMessage = serde_json::from_str(raw).expect("parse");
    assert!(matches!(msg, ClientMessage::JoinGame { user_id } if user_id == "carol"));
}

#[test]
fn unknown_message_types_fail_to_parse() {
    assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"fly_home","userId":"a"}"#).is_err());
    assert!(serde_json::from_str::<ServerMessage>(r#"{"type":"room_joined"}"#).is_err());
}

// ════════════════════════════════════════════════════════════════════
// Server → client messages
// ════════════════════════════════════════════════════════════════════

#[test]
fn full_player_joined_carries_the_snapshot() {
    let msg = ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
        user_id: "alice".into(),
        symbol: Some(Mark::X),
        status: ParticipantRole::Player,
        watchers_count: 0,
        game_state: Some(GameStateSnapshot::default()),
    }));
    assert_eq!(
        to_value(&msg),
        json!({
            "type": "player_joined",
            "userId": "alice",
            "symbol": "X",
            "status": "PLAYER",
            "watchers_count": 0,
            "game_state": {
                "global_board": empty_board_json(),
                "active_board": null,
                "move_count": 0,
                "winner": null,
                "current_player": "X",
            },
        })
    );
}

#[test]
fn light_player_joined_omits_the_snapshot_key() {
    let msg = ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
        user_id: "carol".into(),
        symbol: None,
        status: ParticipantRole::Watcher,
        watchers_count: 3,
        game_state: None,
    }));
    let value = to_value(&msg);
    let obj = value.as_object().expect("object");
    assert!(
        !obj.contains_key("game_state"),
        "light notice must omit game_state entirely"
    );
    assert_eq!(obj.get("symbol"), Some(&Value::Null));
    assert_eq!(obj.get("status"), Some(&json!("WATCHER")));
}

#[test]
fn game_update_wire_shape() {
    let msg = ServerMessage::GameUpdate {
        user_id: "alice".into(),
        game_state: one_move_snapshot(),
    };
    let value = to_value(&msg);
    assert_eq!(value["type"], json!("game_update"));
    assert_eq!(value["userId"], json!("alice"));
    assert_eq!(value["game_state"]["move_count"], json!(1));
    assert_eq!(value["game_state"]["active_board"], json!(4));
    assert_eq!(value["game_state"]["current_player"], json!("O"));
    assert_eq!(value["game_state"]["winner"], Value::Null);
    // 9 arrays of 9 cells, "X" | "O" | null.
    let board = value["game_state"]["global_board"]
        .as_array()
        .expect("outer array");
    assert_eq!(board.len(), 9);
    assert!(board.iter().all(|row| row.as_array().is_some_and(|r| r.len() == 9)));
    assert_eq!(board[4][4], json!("X"));
    assert_eq!(board[0][0], Value::Null);
}

#[test]
fn watchers_update_wire_shape() {
    assert_eq!(
        to_value(&ServerMessage::WatchersUpdate { watchers_count: 5 }),
        json!({"type": "watchers_update", "watchers_count": 5})
    );
}

#[test]
fn error_code_key_is_optional() {
    assert_eq!(
        to_value(&ServerMessage::Error {
            message: "not your turn".into(),
            error_code: Some(ErrorCode::NotYourTurn),
        }),
        json!({
            "type": "error",
            "message": "not your turn",
            "error_code": "NOT_YOUR_TURN",
        })
    );

    // Without a code the key disappears; parsing such a message yields None.
    assert_eq!(
        to_value(&ServerMessage::Error {
            message: "oops".into(),
            error_code: None,
        }),
        json!({"type": "error", "message": "oops"})
    );
    let parsed: ServerMessage =
        serde_json::from_str(r#"{"type":"error","message":"oops"}"#).expect("parse");
    assert!(matches!(
        parsed,
        ServerMessage::Error { error_code: None, .. }
    ));
}

#[test]
fn server_messages_parse_from_raw_fixtures() {
    // Exactly what the server emits for a mid-game update, nulls and all.
    let mut rows = vec![vec![Value::Null; 9]; 9];
    rows[4][4] = json!("X");
    let raw = json!({
        "type": "game_update",
        "userId": "alice",
        "game_state": {
            "global_board": rows,
            "active_board": 4,
            "move_count": 1,
            "winner": null,
            "current_player": "O",
        },
    })
    .to_string();

    let parsed: ServerMessage = serde_json::from_str(&raw).expect("parse");
    match parsed {
        ServerMessage::GameUpdate {
            user_id,
            game_state,
        } => {
            assert_eq!(user_id, "alice");
            assert_eq!(game_state, one_move_snapshot());
        }
        other => panic!("expected game_update, got {other:?}"),
    }
}

// ════════════════════════════════════════════════════════════════════
// Enum encodings
// ════════════════════════════════════════════════════════════════════

#[test]
fn game_modes_are_uppercase() {
    assert_eq!(to_value(&GameMode::Local), json!("LOCAL"));
    assert_eq!(to_value(&GameMode::Remote), json!("REMOTE"));
    assert_eq!(to_value(&GameMode::Random), json!("RANDOM"));
    assert_eq!(to_value(&GameMode::Ai), json!("AI"));
}

#[test]
fn difficulties_are_lowercase() {
    assert_eq!(to_value(&AiDifficulty::Easy), json!("easy"));
    assert_eq!(to_value(&AiDifficulty::Medium), json!("medium"));
    assert_eq!(to_value(&AiDifficulty::Hard), json!("hard"));
}

#[test]
fn winner_encodes_marks_and_tie() {
    assert_eq!(to_value(&GameWinner::X), json!("X"));
    assert_eq!(to_value(&GameWinner::O), json!("O"));
    assert_eq!(to_value(&GameWinner::Tie), json!("T"));
    assert_eq!(
        serde_json::from_value::<GameWinner>(json!("T")).expect("parse"),
        GameWinner::Tie
    );
}

#[test]
fn error_codes_are_screaming_snake_case() {
    let cases = [
        (ErrorCode::GameNotFound, "GAME_NOT_FOUND"),
        (ErrorCode::NotYourTurn, "NOT_YOUR_TURN"),
        (ErrorCode::IllegalMove, "ILLEGAL_MOVE"),
        (ErrorCode::NotInGame, "NOT_IN_GAME"),
        (ErrorCode::InvalidMessage, "INVALID_MESSAGE"),
        (ErrorCode::AiUnavailable, "AI_UNAVAILABLE"),
        (ErrorCode::InternalError, "INTERNAL_ERROR"),
    ];
    for (code, expected) in cases {
        assert_eq!(to_value(&code), json!(expected));
        assert_eq!(
            serde_json::from_value::<ErrorCode>(json!(expected)).expect("parse"),
            code
        );
    }
}

// ════════════════════════════════════════════════════════════════════
// Management payloads (snake_case)
// ════════════════════════════════════════════════════════════════════

#[test]
fn queue_join_responses_are_status_tagged() {
    let game_id = test_uuid(9);
    assert_eq!(
        to_value(&QueueJoinResponse::Matched { game_id }),
        json!({"status": "matched", "game_id": game_id})
    );
    assert_eq!(
        to_value(&QueueJoinResponse::Queued {
            position: 0,
            queue_size: 1,
        }),
        json!({"status": "queued", "position": 0, "queue_size": 1})
    );
}

#[test]
fn queue_status_adds_not_queued() {
    assert_eq!(
        to_value(&QueueStatusResponse::NotQueued),
        json!({"status": "not_queued"})
    );
    let parsed: QueueStatusResponse =
        serde_json::from_value(json!({"status": "queued", "position": 2, "queue_size": 3}))
            .expect("parse");
    assert_eq!(
        parsed,
        QueueStatusResponse::Queued {
            position: 2,
            queue_size: 3,
        }
    );
}

#[test]
fn game_creation_payloads_use_snake_case() {
    let request = CreateGameRequest {
        mode: GameMode::Ai,
        ai_difficulty: Some(AiDifficulty::Hard),
    };
    assert_eq!(
        to_value(&request),
        json!({"mode": "AI", "ai_difficulty": "hard"})
    );

    // Difficulty is omitted when absent, not null.
    let request = CreateGameRequest {
        mode: GameMode::Remote,
        ai_difficulty: None,
    };
    assert_eq!(to_value(&request), json!({"mode": "REMOTE"}));

    let game_id = test_uuid(11);
    assert_eq!(
        to_value(&CreateGameResponse {
            game_id,
            mode: GameMode::Remote,
        }),
        json!({"game_id": game_id, "mode": "REMOTE"})
    );
}

#[test]
fn reset_payloads_use_snake_case() {
    let game_id = test_uuid(12);
    assert_eq!(
        to_value(&ResetRequest {
            game_id,
            user_id: "alice".into(),
        }),
        json!({"game_id": game_id, "user_id": "alice"})
    );
    assert_eq!(
        to_value(&ResetResponse {
            success: true,
            message: None,
        }),
        json!({"success": true})
    );
    assert_eq!(
        to_value(&ResetResponse {
            success: false,
            message: Some("game not found".into()),
        }),
        json!({"success": false, "message": "game not found"})
    );
}
