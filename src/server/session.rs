//! Per-game session task.
//!
//! Every live game is owned by exactly one [`GameSession`] task, which
//! is the single writer of its [`GameState`]. Connection tasks, the
//! matchmaking queue, AI provider tasks, and grace timers all talk to it
//! through [`GameCommand`]s on an unbounded channel, so every message a
//! game emits has one total order: the order this task processed the
//! commands in.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::ai::{MoveProvider, MoveProviderError};
use crate::board::Move;
use crate::error_codes::ErrorCode;
use crate::game::GameState;
use crate::protocol::{ParticipantRole, PlayerJoinedPayload, ServerMessage, UserId};
use crate::server::registry::GameRegistry;

/// Process-unique id for one attached connection. Assigned by the accept
/// loop; never reused within a server's lifetime.
pub type ConnId = u64;

/// The `userId` stamped on game updates produced by the AI opponent.
pub const AI_USER_ID: &str = "ai";

/// Provider retries after a failed or illegal AI move, on top of the
/// initial attempt.
const AI_RETRY_LIMIT: u32 = 2;

/// Pause before each provider retry.
const AI_RETRY_DELAY: Duration = Duration::from_millis(250);

// ── Commands ────────────────────────────────────────────────────────

/// Commands accepted by a game session task.
#[derive(Debug)]
pub enum GameCommand {
    /// Attach a connection as player or watcher (`join_game`).
    Attach {
        conn_id: ConnId,
        user_id: UserId,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    },
    /// Validate and apply a move (`make_move`).
    Move {
        conn_id: ConnId,
        user_id: UserId,
        mv: Move,
    },
    /// Reinitialize boards, turn, and winner (`reset_game`).
    Reset { conn_id: ConnId, user_id: UserId },
    /// Stop watching without closing the socket (`leave_watcher`).
    LeaveWatcher { conn_id: ConnId, user_id: UserId },
    /// The connection dropped, cleanly or not.
    Hangup { conn_id: ConnId },
    /// Reset requested through the management API rather than a socket.
    /// Replies whether the requesting user held a seat.
    ManagementReset {
        user_id: UserId,
        reply: oneshot::Sender<bool>,
    },
    /// A grace timer fired. Ignored unless the epoch still matches and
    /// no player connection has returned.
    Reap { epoch: u64 },
    /// A provider task finished thinking. `for_move` pins the move count
    /// the request was made against so stale replies can be dropped.
    AiMove {
        for_move: u32,
        attempt: u32,
        result: Result<Move, MoveProviderError>,
    },
}

/// Cheap cloneable handle to one game's session task.
///
/// Dropping handles does not stop the session; it exits on its own once
/// no player connection returns within the reconnect grace.
#[derive(Debug, Clone)]
pub struct GameHandle {
    cmd_tx: mpsc::UnboundedSender<GameCommand>,
}

impl GameHandle {
    /// Queues a command for the session. Returns `false` if the session
    /// has already shut down.
    pub fn send(&self, cmd: GameCommand) -> bool {
        self.cmd_tx.send(cmd).is_ok()
    }
}

/// Spawns the session task for `game` and returns its handle.
pub(crate) fn spawn(
    game: GameState,
    provider: Arc<dyn MoveProvider>,
    reconnect_grace: Duration,
    registry: GameRegistry,
) -> GameHandle {
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
    let session = GameSession {
        game,
        connections: HashMap::new(),
        provider,
        reconnect_grace,
        reap_epoch: 0,
        cmd_tx: cmd_tx.clone(),
        cmd_rx,
    };
    tokio::spawn(session.run(registry));
    GameHandle { cmd_tx }
}

// ── Session task ────────────────────────────────────────────────────

/// One attached connection, as the session sees it.
struct Connection {
    user_id: UserId,
    role: ParticipantRole,
    outbound: mpsc::UnboundedSender<ServerMessage>,
    /// Set when a watcher sends `leave_watcher`: the socket stays open
    /// but the connection no longer receives broadcasts or counts.
    detached: bool,
}

struct GameSession {
    game: GameState,
    connections: HashMap<ConnId, Connection>,
    provider: Arc<dyn MoveProvider>,
    reconnect_grace: Duration,
    /// Bumped whenever a player attaches or a new grace timer starts, so
    /// timers from an earlier player-less stretch cannot reap the game.
    reap_epoch: u64,
    /// Own sender, cloned into provider tasks and grace timers.
    cmd_tx: mpsc::UnboundedSender<GameCommand>,
    cmd_rx: mpsc::UnboundedReceiver<GameCommand>,
}

impl GameSession {
    async fn run(mut self, registry: GameRegistry) {
        info!(game_id = %self.game.id(), mode = ?self.game.mode(), "game session started");
        // A freshly created game has no players yet and idles out on the
        // same grace timer as a fully abandoned one.
        self.schedule_reap();
        while let Some(cmd) = self.cmd_rx.recv().await {
            match cmd {
                GameCommand::Attach {
                    conn_id,
                    user_id,
                    outbound,
                } => self.handle_attach(conn_id, user_id, outbound),
                GameCommand::Move {
                    conn_id,
                    user_id,
                    mv,
                } => self.handle_move(conn_id, user_id, mv),
                GameCommand::Reset { conn_id, user_id } => self.handle_reset(conn_id, user_id),
                GameCommand::LeaveWatcher { conn_id, user_id } => {
                    self.handle_leave_watcher(conn_id, user_id);
                }
                GameCommand::Hangup { conn_id } => self.handle_hangup(conn_id),
                GameCommand::ManagementReset { user_id, reply } => {
                    let _ = reply.send(self.handle_management_reset(user_id));
                }
                GameCommand::Reap { epoch } => {
                    if epoch == self.reap_epoch && self.live_player_connections() == 0 {
                        info!(
                            game_id = %self.game.id(),
                            "no player within the grace period, closing game"
                        );
                        break;
                    }
                }
                GameCommand::AiMove {
                    for_move,
                    attempt,
                    result,
                } => self.handle_ai_move(for_move, attempt, result),
            }
        }
        registry.remove(&self.game.id()).await;
        info!(game_id = %self.game.id(), "game session closed");
    }

    // ── Joining ─────────────────────────────────────────────────────

    fn handle_attach(
        &mut self,
        conn_id: ConnId,
        user_id: UserId,
        outbound: mpsc::UnboundedSender<ServerMessage>,
    ) {
        // A repeated join on the same connection is a client retry: resend
        // the snapshot, change nothing.
        if let Some(existing) = self.connections.get(&conn_id) {
            if existing.user_id != user_id {
                let _ = outbound.send(ServerMessage::Error {
                    message: "connection already joined under a different user id".to_owned(),
                    error_code: Some(ErrorCode::InvalidMessage),
                });
                return;
            }
            let outcome = self.game.join(&user_id);
            let _ = outbound.send(ServerMessage::PlayerJoined(Box::new(PlayerJoinedPayload {
                user_id,
                symbol: outcome.symbol,
                status: outcome.role,
                watchers_count: self.game.watcher_count(),
                game_state: Some(self.game.snapshot()),
            })));
            return;
        }

        let outcome = self.game.join(&user_id);
        match outcome.role {
            ParticipantRole::Watcher => {
                self.game.add_watcher();
            }
            ParticipantRole::Player => {
                // A live player cancels any pending reap.
                self.reap_epoch += 1;
            }
        }
        info!(
            game_id = %self.game.id(),
            user_id = %user_id,
            role = ?outcome.role,
            rejoined = outcome.rejoined,
            "participant attached"
        );

        let notice = PlayerJoinedPayload {
            user_id: user_id.clone(),
            symbol: outcome.symbol,
            status: outcome.role,
            watchers_count: self.game.watcher_count(),
            game_state: None,
        };
        let mut welcome = notice.clone();
        welcome.game_state = Some(self.game.snapshot());
        let _ = outbound.send(ServerMessage::PlayerJoined(Box::new(welcome)));

        self.connections.insert(
            conn_id,
            Connection {
                user_id,
                role: outcome.role,
                outbound,
                detached: false,
            },
        );
        match outcome.role {
            ParticipantRole::Player => {
                self.broadcast_except(conn_id, &ServerMessage::PlayerJoined(Box::new(notice)));
            }
            ParticipantRole::Watcher => {
                self.broadcast_except(
                    conn_id,
                    &ServerMessage::WatchersUpdate {
                        watchers_count: self.game.watcher_count(),
                    },
                );
            }
        }
    }

    // ── Moves and resets ────────────────────────────────────────────

    fn handle_move(&mut self, conn_id: ConnId, user_id: UserId, mv: Move) {
        if !self.connection_matches(conn_id, &user_id) {
            return;
        }
        match self.game.apply_move(&user_id, mv) {
            Ok(game_state) => {
                self.broadcast(&ServerMessage::GameUpdate {
                    user_id,
                    game_state,
                });
                self.maybe_request_ai_move();
            }
            Err(err) => {
                debug!(
                    game_id = %self.game.id(),
                    user_id = %user_id,
                    error = %err,
                    "move rejected"
                );
                self.send_to(
                    conn_id,
                    &ServerMessage::Error {
                        message: err.to_string(),
                        error_code: Some(err.code()),
                    },
                );
            }
        }
    }

    fn handle_reset(&mut self, conn_id: ConnId, user_id: UserId) {
        if !self.connection_matches(conn_id, &user_id) {
            return;
        }
        if !self.holds_seat(&user_id) {
            self.send_to(
                conn_id,
                &ServerMessage::Error {
                    message: "only a seated player can reset the game".to_owned(),
                    error_code: Some(ErrorCode::NotYourTurn),
                },
            );
            return;
        }
        self.reset_and_broadcast(user_id);
    }

    fn handle_management_reset(&mut self, user_id: UserId) -> bool {
        if !self.holds_seat(&user_id) {
            return false;
        }
        self.reset_and_broadcast(user_id);
        true
    }

    fn reset_and_broadcast(&mut self, user_id: UserId) {
        let game_state = self.game.reset();
        info!(game_id = %self.game.id(), user_id = %user_id, "game reset");
        self.broadcast(&ServerMessage::GameUpdate {
            user_id,
            game_state,
        });
    }

    // ── Watchers and disconnects ────────────────────────────────────

    fn handle_leave_watcher(&mut self, conn_id: ConnId, user_id: UserId) {
        if !self.connection_matches(conn_id, &user_id) {
            return;
        }
        let Some(conn) = self.connections.get_mut(&conn_id) else {
            return;
        };
        // Idempotent: repeated leaves and leaves from players change nothing.
        if conn.role != ParticipantRole::Watcher || conn.detached {
            return;
        }
        conn.detached = true;
        let watchers_count = self.game.remove_watcher();
        debug!(
            game_id = %self.game.id(),
            user_id = %user_id,
            watchers_count,
            "watcher left"
        );
        self.broadcast(&ServerMessage::WatchersUpdate { watchers_count });
    }

    fn handle_hangup(&mut self, conn_id: ConnId) {
        let Some(conn) = self.connections.remove(&conn_id) else {
            return;
        };
        debug!(
            game_id = %self.game.id(),
            user_id = %conn.user_id,
            role = ?conn.role,
            "connection dropped"
        );
        match conn.role {
            ParticipantRole::Watcher => {
                if !conn.detached {
                    let watchers_count = self.game.remove_watcher();
                    self.broadcast(&ServerMessage::WatchersUpdate { watchers_count });
                }
            }
            ParticipantRole::Player => {
                // The seat stays reserved; the game only dies if nobody
                // holding a seat comes back in time.
                if self.live_player_connections() == 0 {
                    self.schedule_reap();
                }
            }
        }
    }

    fn schedule_reap(&mut self) {
        self.reap_epoch += 1;
        let epoch = self.reap_epoch;
        let grace = self.reconnect_grace;
        let cmd_tx = self.cmd_tx.clone();
        debug!(
            game_id = %self.game.id(),
            epoch,
            grace_ms = grace.as_millis() as u64,
            "reap timer started"
        );
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            let _ = cmd_tx.send(GameCommand::Reap { epoch });
        });
    }

    // ── AI turns ────────────────────────────────────────────────────

    fn maybe_request_ai_move(&mut self) {
        if self.game.awaiting_ai_move() {
            self.request_ai_move(1);
        }
    }

    fn request_ai_move(&self, attempt: u32) {
        let Some(difficulty) = self.game.ai_difficulty() else {
            return;
        };
        let provider = Arc::clone(&self.provider);
        let snapshot = self.game.snapshot();
        let for_move = self.game.move_count();
        let cmd_tx = self.cmd_tx.clone();
        debug!(game_id = %self.game.id(), attempt, ?difficulty, "ai move requested");
        tokio::spawn(async move {
            if attempt > 1 {
                tokio::time::sleep(AI_RETRY_DELAY).await;
            }
            let result = provider.provide(&snapshot, difficulty).await;
            let _ = cmd_tx.send(GameCommand::AiMove {
                for_move,
                attempt,
                result,
            });
        });
    }

    fn handle_ai_move(
        &mut self,
        for_move: u32,
        attempt: u32,
        result: Result<Move, MoveProviderError>,
    ) {
        // A reset (or anything else that changed the move count) makes
        // the reply stale.
        if for_move != self.game.move_count() || !self.game.awaiting_ai_move() {
            debug!(game_id = %self.game.id(), for_move, "dropping stale ai move");
            return;
        }
        let mv = match result {
            Ok(mv) => mv,
            Err(err) => {
                warn!(game_id = %self.game.id(), attempt, error = %err, "move provider failed");
                self.retry_or_give_up(attempt);
                return;
            }
        };
        let Some(symbol) = self.game.ai_symbol() else {
            return;
        };
        match self.game.apply_move_as(symbol, mv) {
            Ok(game_state) => {
                self.broadcast(&ServerMessage::GameUpdate {
                    user_id: AI_USER_ID.to_owned(),
                    game_state,
                });
            }
            Err(err) => {
                // Providers are advisory; their moves pass the same
                // validation as everyone else's.
                warn!(
                    game_id = %self.game.id(),
                    attempt,
                    error = %err,
                    "move provider produced an illegal move"
                );
                self.retry_or_give_up(attempt);
            }
        }
    }

    fn retry_or_give_up(&mut self, attempt: u32) {
        if attempt <= AI_RETRY_LIMIT {
            self.request_ai_move(attempt + 1);
            return;
        }
        error!(
            game_id = %self.game.id(),
            "move provider exhausted its retries, leaving the game on the ai turn"
        );
        let Some(seat) = self.game.players().first() else {
            return;
        };
        let message = ServerMessage::Error {
            message: "AI opponent is unavailable, try again later".to_owned(),
            error_code: Some(ErrorCode::AiUnavailable),
        };
        for conn in self
            .connections
            .values()
            .filter(|conn| conn.user_id == seat.user_id)
        {
            let _ = conn.outbound.send(message.clone());
        }
    }

    // ── Delivery ────────────────────────────────────────────────────

    /// The message's `userId` must belong to this connection; a mismatch
    /// is answered with an error instead of acting on behalf of someone
    /// else.
    fn connection_matches(&self, conn_id: ConnId, user_id: &UserId) -> bool {
        let Some(conn) = self.connections.get(&conn_id) else {
            debug!(game_id = %self.game.id(), conn_id, "command from unattached connection");
            return false;
        };
        if conn.user_id == *user_id {
            return true;
        }
        let _ = conn.outbound.send(ServerMessage::Error {
            message: "user id does not match this connection".to_owned(),
            error_code: Some(ErrorCode::InvalidMessage),
        });
        false
    }

    fn live_player_connections(&self) -> usize {
        self.connections
            .values()
            .filter(|conn| conn.role == ParticipantRole::Player)
            .count()
    }

    fn holds_seat(&self, user_id: &str) -> bool {
        self.game
            .players()
            .iter()
            .any(|seat| seat.user_id == user_id)
    }

    fn send_to(&self, conn_id: ConnId, message: &ServerMessage) {
        if let Some(conn) = self.connections.get(&conn_id) {
            let _ = conn.outbound.send(message.clone());
        }
    }

    fn broadcast(&self, message: &ServerMessage) {
        for conn in self.connections.values().filter(|conn| !conn.detached) {
            let _ = conn.outbound.send(message.clone());
        }
    }

    fn broadcast_except(&self, skip: ConnId, message: &ServerMessage) {
        for (conn_id, conn) in &self.connections {
            if *conn_id != skip && !conn.detached {
                let _ = conn.outbound.send(message.clone());
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    use async_trait::async_trait;
    use tokio::sync::mpsc::UnboundedReceiver;
    use tokio::time::timeout;

    use crate::ai::RandomMoveProvider;
    use crate::board::Mark;
    use crate::protocol::{AiDifficulty, GameMode, GameStateSnapshot};

    const GRACE: Duration = Duration::from_secs(5);

    fn registry() -> GameRegistry {
        GameRegistry::new(Arc::new(RandomMoveProvider), GRACE)
    }

    fn attach(handle: &GameHandle, conn_id: ConnId, user: &str) -> UnboundedReceiver<ServerMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        assert!(handle.send(GameCommand::Attach {
            conn_id,
            user_id: user.to_owned(),
            outbound: tx,
        }));
        rx
    }

    async fn next(rx: &mut UnboundedReceiver<ServerMessage>) -> ServerMessage {
        timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("timed out waiting for a message")
            .expect("session dropped the connection")
    }

    async fn assert_silent(rx: &mut UnboundedReceiver<ServerMessage>) {
        // Give the session task a chance to process everything queued.
        tokio::task::yield_now().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(rx.try_recv().is_err(), "expected no further messages");
    }

    fn as_joined(msg: ServerMessage) -> PlayerJoinedPayload {
        match msg {
            ServerMessage::PlayerJoined(payload) => *payload,
            other => panic!("expected player_joined, got {other:?}"),
        }
    }

    fn as_update(msg: ServerMessage) -> (UserId, GameStateSnapshot) {
        match msg {
            ServerMessage::GameUpdate {
                user_id,
                game_state,
            } => (user_id, game_state),
            other => panic!("expected game_update, got {other:?}"),
        }
    }

    fn mv(board: u8, cell: u8) -> Move {
        Move {
            global_board_index: board,
            local_board_index: cell,
        }
    }

    #[tokio::test]
    async fn joiner_gets_the_snapshot_and_peers_a_light_notice() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let welcome = as_joined(next(&mut alice).await);
        assert_eq!(welcome.user_id, "alice");
        assert_eq!(welcome.status, ParticipantRole::Player);
        assert_eq!(welcome.symbol, Some(Mark::X));
        assert!(welcome.game_state.is_some());

        let mut bob = attach(&handle, 2, "bob");
        let welcome = as_joined(next(&mut bob).await);
        assert_eq!(welcome.symbol, Some(Mark::O));
        assert!(welcome.game_state.is_some());

        let notice = as_joined(next(&mut alice).await);
        assert_eq!(notice.user_id, "bob");
        assert!(notice.game_state.is_none(), "peers get the light notice");
    }

    #[tokio::test]
    async fn watcher_join_and_leave_update_the_count() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let mut bob = attach(&handle, 2, "bob");
        next(&mut alice).await; // own welcome
        next(&mut alice).await; // bob's notice
        next(&mut bob).await; // own welcome

        let mut carol = attach(&handle, 3, "carol");
        let welcome = as_joined(next(&mut carol).await);
        assert_eq!(welcome.status, ParticipantRole::Watcher);
        assert_eq!(welcome.symbol, None);
        assert_eq!(welcome.watchers_count, 1);

        for rx in [&mut alice, &mut bob] {
            match next(rx).await {
                ServerMessage::WatchersUpdate { watchers_count } => {
                    assert_eq!(watchers_count, 1);
                }
                other => panic!("expected watchers_update, got {other:?}"),
            }
        }

        assert!(handle.send(GameCommand::LeaveWatcher {
            conn_id: 3,
            user_id: "carol".to_owned(),
        }));
        for rx in [&mut alice, &mut bob] {
            match next(rx).await {
                ServerMessage::WatchersUpdate { watchers_count } => {
                    assert_eq!(watchers_count, 0);
                }
                other => panic!("expected watchers_update, got {other:?}"),
            }
        }

        // Leaving twice is a no-op.
        assert!(handle.send(GameCommand::LeaveWatcher {
            conn_id: 3,
            user_id: "carol".to_owned(),
        }));
        assert_silent(&mut alice).await;
        assert_silent(&mut carol).await;
    }

    #[tokio::test]
    async fn legal_moves_broadcast_to_every_connection() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let mut bob = attach(&handle, 2, "bob");
        let mut carol = attach(&handle, 3, "carol");
        next(&mut alice).await;
        next(&mut alice).await;
        next(&mut alice).await; // watchers_update for carol
        next(&mut bob).await;
        next(&mut bob).await;
        next(&mut carol).await;

        assert!(handle.send(GameCommand::Move {
            conn_id: 1,
            user_id: "alice".to_owned(),
            mv: mv(4, 4),
        }));
        for rx in [&mut alice, &mut bob, &mut carol] {
            let (user_id, game_state) = as_update(next(rx).await);
            assert_eq!(user_id, "alice");
            assert_eq!(game_state.move_count, 1);
            assert_eq!(game_state.active_board, Some(4));
            assert_eq!(game_state.current_player, Mark::O);
        }
    }

    #[tokio::test]
    async fn rejected_moves_reach_only_the_offender() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let mut bob = attach(&handle, 2, "bob");
        next(&mut alice).await;
        next(&mut alice).await;
        next(&mut bob).await;

        // X moves first; bob holds O.
        assert!(handle.send(GameCommand::Move {
            conn_id: 2,
            user_id: "bob".to_owned(),
            mv: mv(0, 0),
        }));
        match next(&mut bob).await {
            ServerMessage::Error {
                message,
                error_code,
            } => {
                assert_eq!(error_code, Some(ErrorCode::NotYourTurn));
                assert!(!message.is_empty());
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_silent(&mut alice).await;
    }

    #[tokio::test]
    async fn reset_requires_a_seat() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let mut bob = attach(&handle, 2, "bob");
        let mut carol = attach(&handle, 3, "carol");
        next(&mut alice).await;
        next(&mut alice).await;
        next(&mut alice).await;
        next(&mut bob).await;
        next(&mut bob).await;
        next(&mut carol).await;

        assert!(handle.send(GameCommand::Reset {
            conn_id: 3,
            user_id: "carol".to_owned(),
        }));
        match next(&mut carol).await {
            ServerMessage::Error { error_code, .. } => {
                assert_eq!(error_code, Some(ErrorCode::NotYourTurn));
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert_silent(&mut alice).await;

        assert!(handle.send(GameCommand::Move {
            conn_id: 1,
            user_id: "alice".to_owned(),
            mv: mv(4, 4),
        }));
        for rx in [&mut alice, &mut bob, &mut carol] {
            next(rx).await;
        }

        assert!(handle.send(GameCommand::Reset {
            conn_id: 1,
            user_id: "alice".to_owned(),
        }));
        for rx in [&mut alice, &mut bob, &mut carol] {
            let (user_id, game_state) = as_update(next(rx).await);
            assert_eq!(user_id, "alice");
            assert_eq!(game_state.move_count, 0);
            assert_eq!(game_state.current_player, Mark::X);
            assert_eq!(game_state.active_board, None);
        }
    }

    #[tokio::test]
    async fn mismatched_user_id_is_rejected() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        next(&mut alice).await;

        assert!(handle.send(GameCommand::Move {
            conn_id: 1,
            user_id: "mallory".to_owned(),
            mv: mv(0, 0),
        }));
        match next(&mut alice).await {
            ServerMessage::Error { error_code, .. } => {
                assert_eq!(error_code, Some(ErrorCode::InvalidMessage));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeat_join_resends_the_snapshot_without_side_effects() {
        let registry = registry();
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let mut bob = attach(&handle, 2, "bob");
        next(&mut alice).await;
        next(&mut alice).await;
        next(&mut bob).await;

        let (tx, mut retry) = mpsc::unbounded_channel();
        assert!(handle.send(GameCommand::Attach {
            conn_id: 1,
            user_id: "alice".to_owned(),
            outbound: tx,
        }));
        let welcome = as_joined(next(&mut retry).await);
        assert_eq!(welcome.user_id, "alice");
        assert_eq!(welcome.symbol, Some(Mark::X));
        assert!(welcome.game_state.is_some());
        assert_silent(&mut bob).await;
    }

    #[tokio::test]
    async fn abandoned_games_are_reaped_after_the_grace_period() {
        let registry = GameRegistry::new(Arc::new(RandomMoveProvider), Duration::from_millis(30));
        let created = registry.create_game(GameMode::Remote, None).await;
        assert_eq!(registry.game_count().await, 1);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.game_count().await, 0);
        assert!(registry.handle(&created.game_id).await.is_none());
    }

    #[tokio::test]
    async fn returning_player_keeps_the_game_alive() {
        let registry = GameRegistry::new(Arc::new(RandomMoveProvider), Duration::from_millis(60));
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let welcome = as_joined(next(&mut alice).await);
        assert_eq!(welcome.symbol, Some(Mark::X));
        assert!(handle.send(GameCommand::Hangup { conn_id: 1 }));

        // Back within the grace period, on a new connection.
        tokio::time::sleep(Duration::from_millis(20)).await;
        let mut alice = attach(&handle, 2, "alice");
        let welcome = as_joined(next(&mut alice).await);
        assert_eq!(welcome.symbol, Some(Mark::X), "seat should be restored");
        assert_eq!(welcome.status, ParticipantRole::Player);

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.game_count().await, 1);
    }

    #[tokio::test]
    async fn watcher_connections_do_not_hold_a_game_open() {
        let registry = GameRegistry::new(Arc::new(RandomMoveProvider), Duration::from_millis(30));
        let created = registry.create_game(GameMode::Remote, None).await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        next(&mut alice).await;
        let mut carol = attach(&handle, 2, "carol");
        let welcome = as_joined(next(&mut carol).await);
        assert_eq!(welcome.status, ParticipantRole::Watcher);

        assert!(handle.send(GameCommand::Hangup { conn_id: 1 }));
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(registry.game_count().await, 0);
    }

    #[tokio::test]
    async fn ai_opponent_answers_after_a_human_move() {
        let registry = registry();
        let created = registry
            .create_game(GameMode::Ai, Some(AiDifficulty::Easy))
            .await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        let welcome = as_joined(next(&mut alice).await);
        assert_eq!(welcome.symbol, Some(Mark::X));

        assert!(handle.send(GameCommand::Move {
            conn_id: 1,
            user_id: "alice".to_owned(),
            mv: mv(4, 4),
        }));
        let (user_id, game_state) = as_update(next(&mut alice).await);
        assert_eq!(user_id, "alice");
        assert_eq!(game_state.move_count, 1);

        let (user_id, game_state) = as_update(next(&mut alice).await);
        assert_eq!(user_id, AI_USER_ID);
        assert_eq!(game_state.move_count, 2);
        assert_eq!(game_state.current_player, Mark::X);
    }

    #[derive(Debug)]
    struct BrokenProvider;

    #[async_trait]
    impl MoveProvider for BrokenProvider {
        async fn provide(
            &self,
            _state: &GameStateSnapshot,
            _difficulty: AiDifficulty,
        ) -> Result<Move, MoveProviderError> {
            Err(MoveProviderError::Backend("backend offline".to_owned()))
        }
    }

    #[tokio::test]
    async fn exhausted_provider_reports_ai_unavailable_to_the_player() {
        let registry = GameRegistry::new(Arc::new(BrokenProvider), GRACE);
        let created = registry
            .create_game(GameMode::Ai, Some(AiDifficulty::Hard))
            .await;
        let handle = registry.handle(&created.game_id).await.unwrap();

        let mut alice = attach(&handle, 1, "alice");
        next(&mut alice).await;
        let mut carol = attach(&handle, 2, "carol");
        next(&mut carol).await;
        next(&mut alice).await; // carol's watchers_update

        assert!(handle.send(GameCommand::Move {
            conn_id: 1,
            user_id: "alice".to_owned(),
            mv: mv(4, 4),
        }));
        next(&mut alice).await; // own game_update
        next(&mut carol).await;

        // Initial attempt plus two retries, then the failure surfaces to
        // the seated player only.
        match timeout(Duration::from_secs(3), alice.recv()).await {
            Ok(Some(ServerMessage::Error {
                error_code,
                message,
            })) => {
                assert_eq!(error_code, Some(ErrorCode::AiUnavailable));
                assert!(!message.is_empty());
            }
            other => panic!("expected ai_unavailable error, got {other:?}"),
        }
        assert_silent(&mut carol).await;
    }
}
