//! FIFO matchmaking queue.
//!
//! A single worker task owns the queue, so joins, leaves, and pairings
//! are applied in arrival order and two users can never be handed the
//! same slot. Pairing is immediate: a join either matches the
//! longest-waiting user or appends the joiner.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{Result, SupertacError};
use crate::protocol::{GameId, GameMode, QueueJoinResponse, QueueStatusResponse, UserId};
use crate::server::registry::GameRegistry;

/// How long a completed pairing stays visible to status polls. A user
/// who never fetches their match forfeits it after this long.
const MATCH_RESULT_TTL: Duration = Duration::from_secs(300);

#[derive(Debug)]
enum QueueCommand {
    Join {
        user_id: UserId,
        reply: oneshot::Sender<QueueJoinResponse>,
    },
    Leave {
        user_id: UserId,
        reply: oneshot::Sender<bool>,
    },
    Status {
        user_id: UserId,
        reply: oneshot::Sender<QueueStatusResponse>,
    },
}

/// Handle to the matchmaking worker. Cloning is cheap; all clones feed
/// the same queue.
#[derive(Debug, Clone)]
pub struct MatchmakingQueue {
    cmd_tx: mpsc::UnboundedSender<QueueCommand>,
}

impl MatchmakingQueue {
    /// Spawns the queue worker. Matched pairs get a fresh
    /// [`GameMode::Random`] game from `registry`.
    #[must_use]
    pub fn spawn(registry: GameRegistry) -> Self {
        Self::spawn_with_ttl(registry, MATCH_RESULT_TTL)
    }

    fn spawn_with_ttl(registry: GameRegistry, match_ttl: Duration) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let worker = QueueWorker {
            registry,
            match_ttl,
            waiting: VecDeque::new(),
            matched: HashMap::new(),
        };
        tokio::spawn(worker.run(cmd_rx));
        Self { cmd_tx }
    }

    /// Joins the queue: pairs with the longest-waiting user when one
    /// exists, otherwise enqueues. Joining while already queued changes
    /// nothing and reports the current position.
    pub async fn join(&self, user_id: impl Into<UserId>) -> Result<QueueJoinResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(QueueCommand::Join {
            user_id: user_id.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| SupertacError::QueueClosed)
    }

    /// Leaves the queue and discards any unclaimed match result.
    /// Returns whether anything was removed; leaving while not queued
    /// is a no-op.
    pub async fn leave(&self, user_id: impl Into<UserId>) -> Result<bool> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(QueueCommand::Leave {
            user_id: user_id.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| SupertacError::QueueClosed)
    }

    /// Reports where the user stands. A completed pairing keeps
    /// answering `matched` until it expires or the user leaves.
    pub async fn status(&self, user_id: impl Into<UserId>) -> Result<QueueStatusResponse> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(QueueCommand::Status {
            user_id: user_id.into(),
            reply: reply_tx,
        })?;
        reply_rx.await.map_err(|_| SupertacError::QueueClosed)
    }

    fn send(&self, cmd: QueueCommand) -> Result<()> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| SupertacError::QueueClosed)
    }
}

// ── Worker ──────────────────────────────────────────────────────────

struct MatchResult {
    game_id: GameId,
    paired_at: Instant,
}

struct QueueWorker {
    registry: GameRegistry,
    match_ttl: Duration,
    waiting: VecDeque<UserId>,
    matched: HashMap<UserId, MatchResult>,
}

impl QueueWorker {
    async fn run(mut self, mut cmd_rx: mpsc::UnboundedReceiver<QueueCommand>) {
        while let Some(cmd) = cmd_rx.recv().await {
            self.purge_expired();
            match cmd {
                QueueCommand::Join { user_id, reply } => {
                    let response = self.join(user_id).await;
                    let _ = reply.send(response);
                }
                QueueCommand::Leave { user_id, reply } => {
                    let _ = reply.send(self.leave(&user_id));
                }
                QueueCommand::Status { user_id, reply } => {
                    let _ = reply.send(self.status(&user_id));
                }
            }
        }
        debug!("matchmaking queue worker stopped");
    }

    async fn join(&mut self, user_id: UserId) -> QueueJoinResponse {
        // Joining again supersedes an unclaimed match result.
        self.matched.remove(&user_id);

        if let Some(position) = self.position(&user_id) {
            return QueueJoinResponse::Queued {
                position,
                queue_size: self.waiting.len(),
            };
        }

        let Some(partner) = self.waiting.pop_front() else {
            self.waiting.push_back(user_id);
            return QueueJoinResponse::Queued {
                position: self.waiting.len() - 1,
                queue_size: self.waiting.len(),
            };
        };

        let created = self.registry.create_game(GameMode::Random, None).await;
        info!(
            game_id = %created.game_id,
            user_a = %partner,
            user_b = %user_id,
            "matched queue pair"
        );
        let now = Instant::now();
        self.matched.insert(
            partner,
            MatchResult {
                game_id: created.game_id,
                paired_at: now,
            },
        );
        self.matched.insert(
            user_id,
            MatchResult {
                game_id: created.game_id,
                paired_at: now,
            },
        );
        QueueJoinResponse::Matched {
            game_id: created.game_id,
        }
    }

    fn leave(&mut self, user_id: &UserId) -> bool {
        let was_waiting = self.position(user_id).is_some();
        self.waiting.retain(|queued| queued != user_id);
        let had_match = self.matched.remove(user_id).is_some();
        was_waiting || had_match
    }

    fn status(&self, user_id: &UserId) -> QueueStatusResponse {
        if let Some(result) = self.matched.get(user_id) {
            return QueueStatusResponse::Matched {
                game_id: result.game_id,
            };
        }
        match self.position(user_id) {
            Some(position) => QueueStatusResponse::Queued {
                position,
                queue_size: self.waiting.len(),
            },
            None => QueueStatusResponse::NotQueued,
        }
    }

    fn position(&self, user_id: &UserId) -> Option<usize> {
        self.waiting.iter().position(|queued| queued == user_id)
    }

    fn purge_expired(&mut self) {
        let ttl = self.match_ttl;
        self.matched
            .retain(|_, result| result.paired_at.elapsed() < ttl);
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

    use std::sync::Arc;

    use crate::ai::RandomMoveProvider;

    fn registry() -> GameRegistry {
        GameRegistry::new(Arc::new(RandomMoveProvider), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn second_joiner_is_matched_with_the_first() {
        let registry = registry();
        let queue = MatchmakingQueue::spawn(registry.clone());

        assert_eq!(
            queue.join("u1").await.unwrap(),
            QueueJoinResponse::Queued {
                position: 0,
                queue_size: 1,
            }
        );
        let QueueJoinResponse::Matched { game_id } = queue.join("u2").await.unwrap() else {
            panic!("second joiner should be matched");
        };

        // The game exists and both sides see the same pairing.
        assert!(registry.handle(&game_id).await.is_some());
        assert_eq!(
            queue.status("u1").await.unwrap(),
            QueueStatusResponse::Matched { game_id }
        );
        // Match results persist across polls.
        assert_eq!(
            queue.status("u1").await.unwrap(),
            QueueStatusResponse::Matched { game_id }
        );
        assert_eq!(
            queue.status("u2").await.unwrap(),
            QueueStatusResponse::Matched { game_id }
        );
    }

    #[tokio::test]
    async fn pairing_follows_arrival_order() {
        let registry = registry();
        let queue = MatchmakingQueue::spawn(registry.clone());

        queue.join("u1").await.unwrap();
        let QueueJoinResponse::Matched { game_id: first } = queue.join("u2").await.unwrap() else {
            panic!("expected a match");
        };
        queue.join("u3").await.unwrap();
        let QueueJoinResponse::Matched { game_id: second } = queue.join("u4").await.unwrap() else {
            panic!("expected a match");
        };

        assert_ne!(first, second);
        assert_eq!(
            queue.status("u3").await.unwrap(),
            QueueStatusResponse::Matched { game_id: second }
        );
        assert_eq!(registry.game_count().await, 2);
    }

    #[tokio::test]
    async fn joining_twice_keeps_a_single_entry() {
        let registry = registry();
        let queue = MatchmakingQueue::spawn(registry.clone());

        queue.join("u1").await.unwrap();
        assert_eq!(
            queue.join("u1").await.unwrap(),
            QueueJoinResponse::Queued {
                position: 0,
                queue_size: 1,
            },
            "re-joining must not duplicate the entry or self-match"
        );

        // The single entry still pairs normally.
        assert!(matches!(
            queue.join("u2").await.unwrap(),
            QueueJoinResponse::Matched { .. }
        ));
        assert_eq!(registry.game_count().await, 1);
    }

    #[tokio::test]
    async fn leave_is_idempotent() {
        let registry = registry();
        let queue = MatchmakingQueue::spawn(registry);

        queue.join("u1").await.unwrap();
        assert!(queue.leave("u1").await.unwrap());
        assert!(!queue.leave("u1").await.unwrap());
        assert_eq!(
            queue.status("u1").await.unwrap(),
            QueueStatusResponse::NotQueued
        );

        // The queue is empty again, so the next joiner waits.
        assert_eq!(
            queue.join("u2").await.unwrap(),
            QueueJoinResponse::Queued {
                position: 0,
                queue_size: 1,
            }
        );
    }

    #[tokio::test]
    async fn leave_discards_an_unclaimed_match() {
        let registry = registry();
        let queue = MatchmakingQueue::spawn(registry);

        queue.join("u1").await.unwrap();
        queue.join("u2").await.unwrap();
        assert!(queue.leave("u1").await.unwrap());
        assert_eq!(
            queue.status("u1").await.unwrap(),
            QueueStatusResponse::NotQueued
        );
        // u2 keeps their side of the pairing.
        assert!(matches!(
            queue.status("u2").await.unwrap(),
            QueueStatusResponse::Matched { .. }
        ));
    }

    #[tokio::test]
    async fn rejoining_supersedes_an_unclaimed_match() {
        let registry = registry();
        let queue = MatchmakingQueue::spawn(registry);

        queue.join("u1").await.unwrap();
        queue.join("u2").await.unwrap();

        // u1 wants a different opponent instead of the finished pairing.
        assert_eq!(
            queue.join("u1").await.unwrap(),
            QueueJoinResponse::Queued {
                position: 0,
                queue_size: 1,
            }
        );
        assert_eq!(
            queue.status("u1").await.unwrap(),
            QueueStatusResponse::Queued {
                position: 0,
                queue_size: 1,
            }
        );
    }

    #[tokio::test]
    async fn match_results_expire() {
        let registry = registry();
        let queue = MatchmakingQueue::spawn_with_ttl(registry, Duration::from_millis(40));

        queue.join("u1").await.unwrap();
        queue.join("u2").await.unwrap();
        assert!(matches!(
            queue.status("u1").await.unwrap(),
            QueueStatusResponse::Matched { .. }
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(
            queue.status("u1").await.unwrap(),
            QueueStatusResponse::NotQueued
        );
        assert_eq!(
            queue.status("u2").await.unwrap(),
            QueueStatusResponse::NotQueued
        );
    }
}
