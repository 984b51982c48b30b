//! The async client: a cheap handle in front of a background task that
//! owns the [`Transport`].
//!
//! [`SupertacClient::start`] spawns the task, queues the mandatory
//! `join_game`, and hands back the handle plus a bounded receiver of
//! [`SupertacEvent`]s. Requests go out through the handle and never wait
//! for the server; answers, rejections, and everyone else's actions come
//! back as events. Between events, the accessors read a local replica that
//! tracks the server's snapshots.
//!
//! ```rust,ignore
//! let transport = WebSocketTransport::connect(&url).await?;
//! let (client, mut events) =
//!     SupertacClient::start(transport, SupertacConfig::new(game_id, "alice"));
//!
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SupertacEvent::GameUpdated { game_state, .. } => {
//!             if client.my_symbol().await == Some(game_state.current_player) {
//!                 client.make_move(choose_reply(&game_state))?;
//!             }
//!         }
//!         SupertacEvent::Disconnected { .. } => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, Mutex};
use tracing::{debug, error, warn};

use crate::board::{Mark, Move};
use crate::error::{Result, SupertacError};
use crate::event::SupertacEvent;
use crate::protocol::{ClientMessage, GameId, ParticipantRole, ServerMessage, UserId};
use crate::store::{GameStore, GameView};
use crate::transport::Transport;

/// Event channel capacity unless the config says otherwise.
const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// How long a graceful shutdown waits before aborting the task.
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

// ── Configuration ───────────────────────────────────────────────────

/// Settings for one client connection.
///
/// Two fields matter: which game, and who you are. The rest tune the
/// plumbing and default sensibly.
///
/// ```
/// use std::time::Duration;
/// use supertac::client::SupertacConfig;
/// use uuid::Uuid;
///
/// let config = SupertacConfig::new(Uuid::new_v4(), "alice")
///     .with_event_channel_capacity(512)
///     .with_shutdown_timeout(Duration::from_secs(5));
/// assert_eq!(config.user_id, "alice");
/// ```
#[derive(Debug, Clone)]
pub struct SupertacConfig {
    /// The game this connection attaches to. The id rides the WebSocket
    /// URL path; wire messages never repeat it.
    pub game_id: GameId,
    /// Stable user id to join as. Presenting a seated player's id again
    /// restores that seat.
    pub user_id: UserId,
    /// Size of the bounded event channel, default 256, clamped to 1.
    ///
    /// A consumer that falls this far behind starts losing events (each
    /// drop is logged). `Disconnected` is exempt: it is pushed with a
    /// waiting send and always arrives last.
    pub event_channel_capacity: usize,
    /// How long [`SupertacClient::shutdown`] waits for the background task
    /// to close the transport before aborting it. Default 1 second; zero
    /// means abort straight away.
    pub shutdown_timeout: Duration,
}

impl SupertacConfig {
    /// Settings for joining `game_id` as `user_id`, with default tuning.
    pub fn new(game_id: GameId, user_id: impl Into<UserId>) -> Self {
        Self {
            game_id,
            user_id: user_id.into(),
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Overrides the event channel capacity (values below 1 become 1).
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Overrides the graceful-shutdown deadline.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

// ── Shared state ────────────────────────────────────────────────────

/// State both the handle and the background task can see.
struct ClientState {
    connected: AtomicBool,
    /// Flips once the server's welcome for our own user id arrives.
    joined: AtomicBool,
    game_id: GameId,
    user_id: UserId,
    symbol: Mutex<Option<Mark>>,
    role: Mutex<Option<ParticipantRole>>,
    store: Mutex<GameStore>,
}

impl ClientState {
    fn new(game_id: GameId, user_id: UserId) -> Self {
        Self {
            connected: AtomicBool::new(true),
            joined: AtomicBool::new(false),
            game_id,
            user_id,
            symbol: Mutex::new(None),
            role: Mutex::new(None),
            store: Mutex::new(GameStore::new()),
        }
    }

    /// Folds a server message into the replica, claiming the seat when the
    /// welcome names our own user id. Runs before the corresponding event
    /// is delivered, so accessors never lag the event stream.
    async fn observe(&self, message: &ServerMessage) {
        if let ServerMessage::PlayerJoined(payload) = message {
            if payload.user_id == self.user_id {
                self.joined.store(true, Ordering::Release);
                *self.symbol.lock().await = payload.symbol;
                *self.role.lock().await = Some(payload.status);
                debug!(
                    game_id = %self.game_id,
                    status = ?payload.status,
                    symbol = ?payload.symbol,
                    "seated",
                );
            }
        }
        self.store.lock().await.apply(self.game_id, message);
    }

    fn disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.joined.store(false, Ordering::Release);
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a running client connection.
///
/// Obtained from [`SupertacClient::start`]. Every request method
/// serializes one [`ClientMessage`], queues it for the background task,
/// and returns; a server rejection shows up later as
/// [`SupertacEvent::ServerError`].
pub struct SupertacClient {
    /// Requests on their way to the background task.
    request_tx: mpsc::UnboundedSender<ClientMessage>,
    /// State the background task keeps current.
    state: Arc<ClientState>,
    /// The background task itself, until shutdown reaps it.
    task: Option<tokio::task::JoinHandle<()>>,
    /// Fires once to ask the task for a graceful exit.
    stop_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl SupertacClient {
    /// Spawns the background task over `transport` and returns the handle
    /// plus the event receiver.
    ///
    /// The protocol wants `join_game` first on every connection, so the
    /// join for `config.user_id` is queued here, before the task even
    /// starts. The receiver yields events until the connection ends, then
    /// closes after a final [`SupertacEvent::Disconnected`].
    #[must_use = "dropping the receiver throws the event stream away"]
    pub fn start(
        transport: impl Transport,
        config: SupertacConfig,
    ) -> (Self, mpsc::Receiver<SupertacEvent>) {
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        // A zero-capacity tokio channel panics; clamp like the builder does.
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity.max(1));

        let state = Arc::new(ClientState::new(config.game_id, config.user_id.clone()));

        // Queued before spawn, so it is the first thing on the wire.
        let _ = request_tx.send(ClientMessage::JoinGame {
            user_id: config.user_id,
        });

        let relay = Relay {
            transport,
            event_tx,
            state: Arc::clone(&state),
        };
        let task = tokio::spawn(relay.run(request_rx, stop_rx));

        let client = Self {
            request_tx,
            state,
            task: Some(task),
            stop_tx: Some(stop_tx),
            shutdown_timeout: config.shutdown_timeout,
        };
        (client, event_rx)
    }

    // ── Requests ────────────────────────────────────────────────────

    /// Sends `join_game` again for this connection's user id.
    ///
    /// [`start`](Self::start) already joined; the server answers a repeat
    /// with a fresh full snapshot, which makes this a cheap resync.
    ///
    /// # Errors
    ///
    /// [`SupertacError::NotConnected`] once the transport is gone.
    pub fn join_game(&self) -> Result<()> {
        self.request(ClientMessage::JoinGame {
            user_id: self.state.user_id.clone(),
        })
    }

    /// Submits a move. The server validates seat, turn, and placement; a
    /// rejection comes back as [`SupertacEvent::ServerError`] on this
    /// connection only.
    ///
    /// # Errors
    ///
    /// [`SupertacError::NotConnected`] once the transport is gone.
    pub fn make_move(&self, mv: Move) -> Result<()> {
        self.request(ClientMessage::MakeMove {
            user_id: self.state.user_id.clone(),
            mv,
        })
    }

    /// Stops watching. Idempotent, and meaningless for seated players.
    ///
    /// # Errors
    ///
    /// [`SupertacError::NotConnected`] once the transport is gone.
    pub fn leave_watcher(&self) -> Result<()> {
        self.request(ClientMessage::LeaveWatcher {
            user_id: self.state.user_id.clone(),
        })
    }

    /// Asks for a fresh game: boards, turn, and winner reset while id,
    /// seats, and mode survive.
    ///
    /// # Errors
    ///
    /// [`SupertacError::NotConnected`] once the transport is gone.
    pub fn reset_game(&self) -> Result<()> {
        self.request(ClientMessage::ResetGame {
            user_id: self.state.user_id.clone(),
        })
    }

    /// Ends the connection: asks the background task to close the
    /// transport, waits up to the configured timeout, and aborts the task
    /// if it will not die. The event receiver sees a final `Disconnected`
    /// (on the graceful path) and then `None`.
    pub async fn shutdown(&mut self) {
        debug!("client shutdown requested");
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => warn!("background task failed: {join_err}"),
                Err(_elapsed) => {
                    warn!(
                        timeout = ?self.shutdown_timeout,
                        "background task ignored shutdown, aborting",
                    );
                    task.abort();
                    let _ = task.await;
                }
            }
        }
        self.state.connected.store(false, Ordering::Release);
    }

    // ── Accessors ───────────────────────────────────────────────────

    /// Whether the transport is still believed to be up.
    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Acquire)
    }

    /// Whether the server has acknowledged our join.
    pub fn has_joined(&self) -> bool {
        self.state.joined.load(Ordering::Acquire)
    }

    /// Our mark, when seated as a player.
    pub async fn my_symbol(&self) -> Option<Mark> {
        *self.state.symbol.lock().await
    }

    /// The role the server assigned us.
    pub async fn my_role(&self) -> Option<ParticipantRole> {
        *self.state.role.lock().await
    }

    /// A copy of the replicated view of the game, once any server message
    /// has seeded it.
    pub async fn game_view(&self) -> Option<GameView> {
        self.state
            .store
            .lock()
            .await
            .game(&self.state.game_id)
            .cloned()
    }

    fn request(&self, message: ClientMessage) -> Result<()> {
        if !self.is_connected() {
            return Err(SupertacError::NotConnected);
        }
        self.request_tx
            .send(message)
            .map_err(|_| SupertacError::NotConnected)
    }
}

impl std::fmt::Debug for SupertacClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupertacClient")
            .field("game_id", &self.state.game_id)
            .field("user_id", &self.state.user_id)
            .field("connected", &self.is_connected())
            .field("joined", &self.has_joined())
            .finish_non_exhaustive()
    }
}

impl Drop for SupertacClient {
    fn drop(&mut self) {
        // No executor to drive a graceful close from a sync Drop, so the
        // task is aborted; the transport is freed when its future drops.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Background task ─────────────────────────────────────────────────

/// Why the relay loop stopped.
enum Exit {
    /// Our side is done (handle dropped or shutdown requested); the
    /// transport still deserves a polite close.
    Local,
    /// The transport failed, with the error's own description.
    Failed(String),
    /// The server closed cleanly.
    PeerClosed,
}

/// Owns the transport and shuttles messages both ways until either side
/// ends the connection.
struct Relay<T: Transport> {
    transport: T,
    event_tx: mpsc::Sender<SupertacEvent>,
    state: Arc<ClientState>,
}

impl<T: Transport> Relay<T> {
    async fn run(
        mut self,
        mut request_rx: mpsc::UnboundedReceiver<ClientMessage>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        debug!("relay started");
        self.deliver(SupertacEvent::Connected).await;

        let exit = loop {
            tokio::select! {
                request = request_rx.recv() => match request {
                    Some(message) => {
                        if let Err(exit) = self.forward(message).await {
                            break exit;
                        }
                    }
                    None => break Exit::Local,
                },
                _ = &mut stop_rx => break Exit::Local,
                frame = self.transport.recv() => match frame {
                    Some(Ok(text)) => self.absorb(&text).await,
                    Some(Err(e)) => {
                        error!("transport receive failed: {e}");
                        break Exit::Failed(e.to_string());
                    }
                    None => break Exit::PeerClosed,
                },
            }
        };

        let reason = match exit {
            Exit::Local => {
                let _ = self.transport.close().await;
                Some("client shut down".to_string())
            }
            Exit::Failed(detail) => Some(detail),
            Exit::PeerClosed => None,
        };
        self.state.disconnected();
        // Waiting send: the goodbye may not be dropped, however full the
        // channel is.
        if self
            .event_tx
            .send(SupertacEvent::Disconnected { reason })
            .await
            .is_err()
        {
            debug!("event receiver already dropped");
        }
        debug!("relay exited");
    }

    /// Puts one request on the wire. A request that cannot be serialized
    /// is a bug in this crate, logged and skipped; a transport failure
    /// ends the relay.
    async fn forward(&mut self, message: ClientMessage) -> std::result::Result<(), Exit> {
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                error!("unserializable client message: {e}");
                return Ok(());
            }
        };
        match self.transport.send(json).await {
            Ok(()) => Ok(()),
            Err(e) => {
                error!("transport send failed: {e}");
                Err(Exit::Failed(e.to_string()))
            }
        }
    }

    /// Takes one frame from the server: replica first, then the event.
    /// Unparseable frames are logged and skipped.
    async fn absorb(&mut self, text: &str) {
        match serde_json::from_str::<ServerMessage>(text) {
            Ok(message) => {
                self.state.observe(&message).await;
                self.deliver(SupertacEvent::from(message)).await;
            }
            Err(e) => warn!("unparseable server message ({e}): {text}"),
        }
    }

    /// Hands an event to the consumer without ever parking the relay: a
    /// full channel drops the event with a log line instead.
    async fn deliver(&mut self, event: SupertacEvent) {
        match self.event_tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(lost)) => {
                warn!("event channel full, dropping {lost:?}");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!("event receiver already dropped");
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
    use crate::error_codes::ErrorCode;
    use crate::game::GameState;
    use crate::protocol::{GameMode, GameStateSnapshot, PlayerJoinedPayload};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    // ── Scripted transport ──────────────────────────────────────────

    /// What the fake server does next.
    enum Feed {
        Msg(String),
        Fault(&'static str),
        Eof,
    }

    /// Transport that plays a fixed script on `recv`, records everything
    /// sent, and flags `close`. Once the script runs dry, `recv` parks
    /// forever so the relay stays up until told otherwise.
    struct ScriptedTransport {
        feed: VecDeque<Feed>,
        outbox: Arc<StdMutex<Vec<String>>>,
        closed: Arc<AtomicBool>,
    }

    type Outbox = Arc<StdMutex<Vec<String>>>;

    fn scripted(feed: Vec<Feed>) -> (ScriptedTransport, Outbox, Arc<AtomicBool>) {
        let outbox = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = ScriptedTransport {
            feed: feed.into(),
            outbox: Arc::clone(&outbox),
            closed: Arc::clone(&closed),
        };
        (transport, outbox, closed)
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: String) -> std::result::Result<(), SupertacError> {
            self.outbox.lock().unwrap().push(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SupertacError>> {
            match self.feed.pop_front() {
                Some(Feed::Msg(text)) => Some(Ok(text)),
                Some(Feed::Fault(e)) => Some(Err(SupertacError::TransportReceive(e.into()))),
                Some(Feed::Eof) => None,
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> std::result::Result<(), SupertacError> {
            self.closed.store(true, Ordering::Relaxed);
            Ok(())
        }
    }

    // ── Fixtures ────────────────────────────────────────────────────

    fn config() -> SupertacConfig {
        SupertacConfig::new(uuid::Uuid::from_u128(7), "alice")
    }

    fn welcome() -> Feed {
        let payload = PlayerJoinedPayload {
            user_id: "alice".into(),
            symbol: Some(Mark::X),
            status: ParticipantRole::Player,
            watchers_count: 0,
            game_state: Some(GameStateSnapshot::default()),
        };
        Feed::Msg(
            serde_json::to_string(&ServerMessage::PlayerJoined(Box::new(payload))).unwrap(),
        )
    }

    fn bob_notice() -> Feed {
        let payload = PlayerJoinedPayload {
            user_id: "bob".into(),
            symbol: Some(Mark::O),
            status: ParticipantRole::Player,
            watchers_count: 0,
            game_state: None,
        };
        Feed::Msg(
            serde_json::to_string(&ServerMessage::PlayerJoined(Box::new(payload))).unwrap(),
        )
    }

    fn center_move_update() -> Feed {
        let mut game = GameState::create(GameMode::Remote, None);
        game.join("alice");
        game.join("bob");
        let snapshot = game.apply_move("alice", Move::new(4, 4)).unwrap();
        Feed::Msg(
            serde_json::to_string(&ServerMessage::GameUpdate {
                user_id: "alice".into(),
                game_state: snapshot,
            })
            .unwrap(),
        )
    }

    fn watchers(watchers_count: u32) -> Feed {
        Feed::Msg(serde_json::to_string(&ServerMessage::WatchersUpdate { watchers_count }).unwrap())
    }

    /// Consumes the Connected event and the own welcome.
    async fn seated(events: &mut mpsc::Receiver<SupertacEvent>) {
        assert!(matches!(
            events.recv().await.unwrap(),
            SupertacEvent::Connected
        ));
        assert!(matches!(
            events.recv().await.unwrap(),
            SupertacEvent::PlayerJoined { .. }
        ));
    }

    /// Polls `check` until it holds, or fails the test after half a second.
    async fn eventually(what: &str, check: impl Fn() -> bool) {
        for _ in 0..100 {
            if check() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("timed out waiting for {what}");
    }

    // ── Startup and requests ────────────────────────────────────────

    #[tokio::test]
    async fn connected_leads_the_event_stream() {
        let (transport, _outbox, _closed) = scripted(vec![welcome()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());

        assert!(matches!(
            events.recv().await.unwrap(),
            SupertacEvent::Connected
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn the_join_request_goes_out_first() {
        let (transport, outbox, _closed) = scripted(vec![welcome()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        let first: ClientMessage =
            serde_json::from_str(&outbox.lock().unwrap()[0]).unwrap();
        match first {
            ClientMessage::JoinGame { user_id } => assert_eq!(user_id, "alice"),
            other => panic!("expected join_game first, got {other:?}"),
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn the_welcome_claims_our_seat() {
        let (transport, _outbox, _closed) = scripted(vec![welcome()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        assert!(client.is_connected());
        assert!(client.has_joined());
        assert_eq!(client.my_symbol().await, Some(Mark::X));
        assert_eq!(client.my_role().await, Some(ParticipantRole::Player));

        let view = client.game_view().await.unwrap();
        assert_eq!(view.state, GameStateSnapshot::default());
        assert_eq!(view.players.len(), 1);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn peer_joins_leave_our_seat_alone() {
        let (transport, _outbox, _closed) = scripted(vec![welcome(), bob_notice()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;
        let _ = events.recv().await; // bob's notice

        assert_eq!(client.my_symbol().await, Some(Mark::X));
        assert_eq!(client.game_view().await.unwrap().players.len(), 2);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn requests_reach_the_wire_in_protocol_shape() {
        let (transport, outbox, _closed) = scripted(vec![welcome()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        client.make_move(Move::new(4, 8)).unwrap();
        client.leave_watcher().unwrap();
        client.reset_game().unwrap();
        client.join_game().unwrap();

        let outbox_watch = Arc::clone(&outbox);
        eventually("all requests to flush", move || {
            outbox_watch.lock().unwrap().len() >= 5
        })
        .await;

        let sent = outbox.lock().unwrap();
        // camelCase user id and the "move" object, exactly as the wire wants.
        assert!(sent[1].contains("\"userId\":\"alice\""));
        assert!(sent[1].contains("\"move\":{\"global_board_index\":4,\"local_board_index\":8}"));
        let kinds: Vec<ClientMessage> = sent[1..=4]
            .iter()
            .map(|raw| serde_json::from_str(raw).unwrap())
            .collect();
        assert!(matches!(kinds[0], ClientMessage::MakeMove { .. }));
        assert!(matches!(kinds[1], ClientMessage::LeaveWatcher { .. }));
        assert!(matches!(kinds[2], ClientMessage::ResetGame { .. }));
        assert!(matches!(kinds[3], ClientMessage::JoinGame { .. }));

        drop(sent);
        client.shutdown().await;
    }

    // ── Replica upkeep ──────────────────────────────────────────────

    #[tokio::test]
    async fn updates_fill_the_replica() {
        let (transport, _outbox, _closed) = scripted(vec![welcome(), center_move_update()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        assert!(matches!(
            events.recv().await.unwrap(),
            SupertacEvent::GameUpdated { .. }
        ));
        let view = client.game_view().await.unwrap();
        assert_eq!(view.state.move_count, 1);
        assert_eq!(view.state.active_board, Some(4));
        assert_eq!(view.state.current_player, Mark::O);

        client.shutdown().await;
    }

    #[tokio::test]
    async fn watcher_counts_patch_without_clobbering_the_snapshot() {
        let (transport, _outbox, _closed) = scripted(vec![welcome(), watchers(4)]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        assert!(matches!(
            events.recv().await.unwrap(),
            SupertacEvent::WatchersUpdated { watchers_count: 4 }
        ));
        let view = client.game_view().await.unwrap();
        assert_eq!(view.watchers_count, 4);
        assert_eq!(view.state, GameStateSnapshot::default());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn server_errors_surface_and_change_nothing() {
        let rejection = serde_json::to_string(&ServerMessage::Error {
            message: "not your turn".into(),
            error_code: Some(ErrorCode::NotYourTurn),
        })
        .unwrap();
        let (transport, _outbox, _closed) = scripted(vec![welcome(), Feed::Msg(rejection)]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        match events.recv().await.unwrap() {
            SupertacEvent::ServerError {
                message,
                error_code,
            } => {
                assert_eq!(message, "not your turn");
                assert_eq!(error_code, Some(ErrorCode::NotYourTurn));
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
        assert_eq!(
            client.game_view().await.unwrap().state,
            GameStateSnapshot::default()
        );

        client.shutdown().await;
    }

    #[tokio::test]
    async fn garbage_frames_are_skipped() {
        let (transport, _outbox, _closed) = scripted(vec![
            Feed::Msg("{not json".into()),
            Feed::Msg(r#"{"type":"no_such_message"}"#.into()),
            welcome(),
        ]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        // Both bad frames vanish; the welcome still comes through.
        seated(&mut events).await;

        client.shutdown().await;
    }

    // ── Ends of the connection ──────────────────────────────────────

    #[tokio::test]
    async fn a_clean_server_close_disconnects_without_a_reason() {
        let (transport, _outbox, _closed) = scripted(vec![welcome(), Feed::Eof]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        match events.recv().await.unwrap() {
            SupertacEvent::Disconnected { reason } => assert_eq!(reason, None),
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(!client.is_connected());
        assert!(!client.has_joined());

        client.shutdown().await;
    }

    #[tokio::test]
    async fn transport_faults_carry_their_reason() {
        let (transport, _outbox, _closed) = scripted(vec![Feed::Fault("boom")]);
        let (mut client, mut events) = SupertacClient::start(transport, config());

        let _connected = events.recv().await.unwrap();
        match events.recv().await.unwrap() {
            SupertacEvent::Disconnected { reason } => {
                assert!(reason.unwrap().contains("boom"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }

        client.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_closes_the_transport_and_says_goodbye() {
        let (transport, _outbox, closed) = scripted(vec![welcome()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        client.shutdown().await;

        match events.recv().await.unwrap() {
            SupertacEvent::Disconnected { reason } => {
                assert_eq!(reason.as_deref(), Some("client shut down"));
            }
            other => panic!("expected Disconnected, got {other:?}"),
        }
        assert!(closed.load(Ordering::Relaxed));
        assert!(!client.is_connected());

        // Requests after shutdown fail fast.
        assert!(matches!(
            client.make_move(Move::new(0, 0)),
            Err(SupertacError::NotConnected)
        ));
        // A second shutdown is a no-op.
        client.shutdown().await;
    }

    #[tokio::test]
    async fn dropping_the_handle_stops_the_task() {
        let (transport, _outbox, _closed) = scripted(vec![welcome()]);
        let (client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        drop(client);

        // The aborted task closes the event channel; draining must end.
        while events.recv().await.is_some() {}
    }

    /// Transport whose `close` never finishes, to exercise the abort path.
    struct WedgedTransport {
        close_called: Arc<AtomicBool>,
        dropped: Arc<AtomicBool>,
    }

    impl Drop for WedgedTransport {
        fn drop(&mut self) {
            self.dropped.store(true, Ordering::Release);
        }
    }

    #[async_trait]
    impl Transport for WedgedTransport {
        async fn send(&mut self, _message: String) -> std::result::Result<(), SupertacError> {
            Ok(())
        }

        async fn recv(&mut self) -> Option<std::result::Result<String, SupertacError>> {
            std::future::pending().await
        }

        async fn close(&mut self) -> std::result::Result<(), SupertacError> {
            self.close_called.store(true, Ordering::Release);
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn shutdown_aborts_a_wedged_transport() {
        let close_called = Arc::new(AtomicBool::new(false));
        let dropped = Arc::new(AtomicBool::new(false));
        let transport = WedgedTransport {
            close_called: Arc::clone(&close_called),
            dropped: Arc::clone(&dropped),
        };

        let (mut client, mut events) =
            SupertacClient::start(transport, config().with_shutdown_timeout(Duration::from_millis(20)));
        assert!(matches!(
            events.recv().await.unwrap(),
            SupertacEvent::Connected
        ));

        client.shutdown().await;

        assert!(close_called.load(Ordering::Acquire), "close was attempted");
        assert!(dropped.load(Ordering::Acquire), "abort dropped the transport");
        assert!(!client.is_connected());
    }

    // ── Event channel behavior ──────────────────────────────────────

    #[tokio::test]
    async fn a_lagging_consumer_loses_events_but_keeps_the_goodbye() {
        let mut feed = vec![welcome()];
        feed.extend((0..20).map(watchers));
        feed.push(Feed::Eof);
        let (transport, _outbox, _closed) = scripted(feed);

        let (mut client, mut events) =
            SupertacClient::start(transport, config().with_event_channel_capacity(1));

        // Read nothing while the relay floods the one-slot channel.
        tokio::time::sleep(Duration::from_millis(100)).await;

        let mut received = Vec::new();
        while let Some(event) = events.recv().await {
            received.push(event);
        }
        // 22 candidates were produced; a one-slot channel cannot hold them.
        assert!(received.len() < 22, "expected drops, got {}", received.len());
        assert!(
            matches!(received.last(), Some(SupertacEvent::Disconnected { .. })),
            "the goodbye survives any amount of lag"
        );

        client.shutdown().await;
    }

    // ── Config ──────────────────────────────────────────────────────

    #[test]
    fn config_defaults() {
        let game_id = uuid::Uuid::from_u128(7);
        let config = SupertacConfig::new(game_id, "alice");
        assert_eq!(config.game_id, game_id);
        assert_eq!(config.user_id, "alice");
        assert_eq!(config.event_channel_capacity, 256);
        assert_eq!(config.shutdown_timeout, Duration::from_secs(1));
    }

    #[test]
    fn config_builders_apply_and_clamp() {
        let tuned = config()
            .with_event_channel_capacity(512)
            .with_shutdown_timeout(Duration::from_secs(5));
        assert_eq!(tuned.event_channel_capacity, 512);
        assert_eq!(tuned.shutdown_timeout, Duration::from_secs(5));

        assert_eq!(config().with_event_channel_capacity(0).event_channel_capacity, 1);
    }

    #[tokio::test]
    async fn zero_capacity_still_starts() {
        let (transport, _outbox, _closed) = scripted(vec![]);
        let mut raw = config();
        raw.event_channel_capacity = 0;
        let (mut client, mut events) = SupertacClient::start(transport, raw);

        assert!(matches!(
            events.recv().await.unwrap(),
            SupertacEvent::Connected
        ));
        client.shutdown().await;
    }

    #[tokio::test]
    async fn debug_output_names_the_connection() {
        let (transport, _outbox, _closed) = scripted(vec![welcome()]);
        let (mut client, mut events) = SupertacClient::start(transport, config());
        seated(&mut events).await;

        let printed = format!("{client:?}");
        assert!(printed.contains("SupertacClient"));
        assert!(printed.contains("connected"));
        assert!(printed.contains("alice"));

        client.shutdown().await;
    }
}
