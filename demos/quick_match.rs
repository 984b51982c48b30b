//! # Quick Match Example
//!
//! Runs the whole pipeline in one process: an in-process server, two users
//! paired through the FIFO matchmaking queue, and a scripted opening played
//! over real WebSocket connections.
//!
//! ## Running
//!
//! ```sh
//! cargo run --example quick_match
//! ```

use supertac::board::Move;
use supertac::protocol::QueueJoinResponse;
use supertac::{
    GameServer, ServerConfig, SupertacClient, SupertacConfig, SupertacEvent, WebSocketTransport,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // ─────────────────────────────────────────────────────────────────
    // Step 1: Start a server on an ephemeral port
    // ─────────────────────────────────────────────────────────────────
    let server = GameServer::bind(ServerConfig::new().with_bind_addr("127.0.0.1:0")).await?;
    let addr = server.local_addr()?;
    let queue = server.queue().clone();
    tokio::spawn(server.run());
    tracing::info!("server listening on {addr}");

    // ─────────────────────────────────────────────────────────────────
    // Step 2: Pair two users through the matchmaking queue
    // ─────────────────────────────────────────────────────────────────
    // The first join waits at the head of the queue; the second completes
    // the pair and creates the game both sides will connect to.
    let first = queue.join("alice").await?;
    tracing::info!("alice queued: {first:?}");

    let QueueJoinResponse::Matched { game_id } = queue.join("bob").await? else {
        return Err("bob should have been matched immediately".into());
    };
    tracing::info!("matched into game {game_id}");

    // ─────────────────────────────────────────────────────────────────
    // Step 3: Both users connect to the matched game
    // ─────────────────────────────────────────────────────────────────
    let url = format!("ws://{addr}/ws/{game_id}");

    let alice_transport = WebSocketTransport::connect(&url).await?;
    let (alice, mut alice_events) =
        SupertacClient::start(alice_transport, SupertacConfig::new(game_id, "alice"));

    let bob_transport = WebSocketTransport::connect(&url).await?;
    let (bob, mut bob_events) =
        SupertacClient::start(bob_transport, SupertacConfig::new(game_id, "bob"));

    // ─────────────────────────────────────────────────────────────────
    // Step 4: Play a scripted opening
    // ─────────────────────────────────────────────────────────────────
    // Center board, center cell; each reply lands on the board the
    // previous move pointed at.
    let script = [Move::new(4, 4), Move::new(4, 0), Move::new(0, 4)];
    let mut next = script.iter();

    // Drive both event streams until the script is exhausted. Whoever's
    // replica says it is their turn takes the next scripted move; accepted
    // moves are counted on alice's stream only so each is tallied once.
    let mut done = 0usize;
    while done < script.len() {
        tokio::select! {
            Some(event) = alice_events.recv() => {
                if let Some(mv) = turn_reaction(&event, "alice", &mut next) {
                    alice.make_move(mv)?;
                }
                if matches!(event, SupertacEvent::GameUpdated { .. }) {
                    done += 1;
                }
            }
            Some(event) = bob_events.recv() => {
                if let Some(mv) = turn_reaction(&event, "bob", &mut next) {
                    bob.make_move(mv)?;
                }
            }
            else => break,
        }
    }

    if let Some(view) = alice.game_view().await {
        tracing::info!(
            "final position: {} move(s), next player {:?}, active board {:?}",
            view.state.move_count,
            view.state.current_player,
            view.state.active_board,
        );
    }

    Ok(())
}

/// Returns the next scripted move when `event` says it is `user`'s turn.
fn turn_reaction(
    event: &SupertacEvent,
    user: &str,
    script: &mut std::slice::Iter<'_, Move>,
) -> Option<Move> {
    let my_turn = match event {
        // Our own welcome: X (the first joiner) opens.
        SupertacEvent::PlayerJoined {
            user_id,
            symbol: Some(symbol),
            game_state: Some(state),
            ..
        } => user_id == user && *symbol == state.current_player,
        SupertacEvent::GameUpdated { game_state, .. } => {
            let to_move = game_state.current_player;
            // X is always the first joiner here, O the second.
            (user == "alice") == (to_move == supertac::board::Mark::X)
        }
        _ => false,
    };
    if my_turn {
        script.next().copied()
    } else {
        None
    }
}
