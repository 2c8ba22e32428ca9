//! C10: the realtime hub. One task owns the `clients` map under a
//! readers-writer lock; every connection gets a read-loop task (inbound
//! player actions) and a write-loop task (the only task that ever touches
//! the socket for sending). Broadcasts are personalized per player via the
//! rule engine's `project_for`.

pub mod protocol;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};
use wager_core::model::LiveGameState;

use crate::component::Attachable;
use crate::config::SharedConfig;
use crate::engine::{Outcome, RuleEngine};
use crate::frame::EventFrame;
use crate::store::ephemeral::IdleSet;
use crate::store::{DurableStore, EphemeralStore};

use protocol::{ClientMessage, ServerMessage};

/// Presence changes the session manager needs to react to: starting the
/// IN_PROGRESS clock once both players have shown up, and arming/disarming
/// the disconnect-grace timer.
#[derive(Debug, Clone)]
pub enum PresenceEvent {
    Connected { game_id: i64, player_id: i64 },
    Disconnected { game_id: i64, player_id: i64 },
    /// The rule engine reported a terminal outcome for an in-progress move.
    /// `conceded` distinguishes an explicit concede (status FORFEIT) from a
    /// clean rule-engine win (status COMPLETED) — the two share an `Outcome`
    /// shape but not a session disposition.
    Terminal { game_id: i64, outcome: Outcome, conceded: bool },
}

struct ClientHandle {
    game_id: i64,
    tx: mpsc::Sender<Message>,
}

pub struct Hub {
    clients: RwLock<HashMap<i64, ClientHandle>>,
    store: DurableStore,
    ephemeral: EphemeralStore,
    engine: Arc<dyn RuleEngine>,
    config: SharedConfig,
    presence_tx: mpsc::Sender<PresenceEvent>,
    input_tx: mpsc::Sender<EventFrame>,
    input_rx: tokio::sync::Mutex<Option<mpsc::Receiver<EventFrame>>>,
    ping_interval: Duration,
    read_timeout: Duration,
    send_buffer: usize,
}

impl Hub {
    pub fn new(
        store: DurableStore,
        ephemeral: EphemeralStore,
        engine: Arc<dyn RuleEngine>,
        config: SharedConfig,
        presence_tx: mpsc::Sender<PresenceEvent>,
        ping_interval: Duration,
        read_timeout: Duration,
        send_buffer: usize,
    ) -> Arc<Self> {
        let (input_tx, input_rx) = mpsc::channel(128);
        Arc::new(Self {
            clients: RwLock::new(HashMap::new()),
            store,
            ephemeral,
            engine,
            config,
            presence_tx,
            input_tx,
            input_rx: tokio::sync::Mutex::new(Some(input_rx)),
            ping_interval,
            read_timeout,
            send_buffer,
        })
    }

    /// Drains events forwarded by the event bus and turns them into
    /// personalized pushes. Spawned once at startup by whoever wires the bus.
    pub fn spawn_bus_listener(self: Arc<Self>) {
        tokio::spawn(async move {
            let mut rx = self
                .input_rx
                .lock()
                .await
                .take()
                .expect("spawn_bus_listener called more than once");
            while let Some(frame) = rx.recv().await {
                self.handle_frame(frame).await;
            }
        });
    }

    async fn handle_frame(&self, frame: EventFrame) {
        match frame {
            EventFrame::Unicast { player_id, message } => self.send_to(player_id, message).await,
            EventFrame::PlayerForfeit { game_id, winner_id, loser_id, player1_state, player2_state } => {
                self.dispatch_terminal(game_id, |pid| ServerMessage::PlayerForfeit {
                    winner_id,
                    loser_id,
                    state: if pid == winner_id { player1_state.clone() } else { player2_state.clone() },
                })
                .await;
            }
            EventFrame::GameWon { game_id, winner_id, loser_id: _, player1_state, player2_state } => {
                self.dispatch_terminal(game_id, |pid| ServerMessage::GameOver {
                    winner_id: Some(winner_id),
                    draw: false,
                    state: if pid == winner_id { player1_state.clone() } else { player2_state.clone() },
                })
                .await;
            }
            EventFrame::GameDraw { game_id, player1_state, player2_state } => {
                if let Ok(Some(session)) = self.store.get_session(game_id).await {
                    let state = |pid: i64| if pid == session.player1_id { player1_state.clone() } else { player2_state.clone() };
                    self.send_to(session.player1_id, ServerMessage::GameOver { winner_id: None, draw: true, state: state(session.player1_id) }).await;
                    if let Some(p2) = session.player2_id {
                        self.send_to(p2, ServerMessage::GameOver { winner_id: None, draw: true, state: state(p2) }).await;
                    }
                }
            }
            EventFrame::SessionStarted { game_id, player1_state, player2_state } => {
                if let Ok(Some(session)) = self.store.get_session(game_id).await {
                    self.send_to(session.player1_id, ServerMessage::GameStarting { state: player1_state }).await;
                    if let Some(p2) = session.player2_id {
                        self.send_to(p2, ServerMessage::GameStarting { state: player2_state }).await;
                    }
                }
            }
            EventFrame::SessionCancelled { game_id, message } => {
                if let Ok(Some(session)) = self.store.get_session(game_id).await {
                    self.send_to(session.player1_id, ServerMessage::SessionCancelled { message: message.clone() }).await;
                    if let Some(p2) = session.player2_id {
                        self.send_to(p2, ServerMessage::SessionCancelled { message }).await;
                    }
                }
            }
            EventFrame::IdleWarning { game_id: _, player_id, forfeit_at_unix_ms } => {
                self.send_to(player_id, ServerMessage::PlayerIdleWarning { player_id, forfeit_at_unix_ms }).await;
            }
            EventFrame::IdleCanceled { game_id: _, player_id } => {
                self.send_to(player_id, ServerMessage::PlayerIdleCanceled { player_id }).await;
            }
            EventFrame::Shutdown => {}
        }
    }

    async fn dispatch_terminal(&self, game_id: i64, msg_for: impl Fn(i64) -> ServerMessage) {
        if let Ok(Some(session)) = self.store.get_session(game_id).await {
            self.send_to(session.player1_id, msg_for(session.player1_id)).await;
            if let Some(p2) = session.player2_id {
                self.send_to(p2, msg_for(p2)).await;
            }
        }
    }

    /// Bounded, lossy enqueue: if the client's buffer is full, the message
    /// is dropped and logged rather than tearing down the connection.
    async fn send_to(&self, player_id: i64, message: ServerMessage) {
        let clients = self.clients.read().await;
        let Some(client) = clients.get(&player_id) else {
            return;
        };
        let Ok(text) = serde_json::to_string(&message) else {
            return;
        };
        if client.tx.try_send(Message::Text(text)).is_err() {
            warn!(player_id, "dropped message, client send buffer full");
        }
    }

    /// Single-active-connection-per-player: the old socket is told to close
    /// with `replaced by new connection` before the new one is installed.
    async fn register(&self, player_id: i64, game_id: i64, tx: mpsc::Sender<Message>) {
        let mut clients = self.clients.write().await;
        if let Some(old) = clients.remove(&player_id) {
            let _ = old
                .tx
                .send(Message::Close(Some(axum::extract::ws::CloseFrame {
                    code: 1000,
                    reason: "replaced by new connection".into(),
                })))
                .await;
        }
        clients.insert(player_id, ClientHandle { game_id, tx });
    }

    async fn unregister(&self, player_id: i64, game_id: i64) {
        let mut clients = self.clients.write().await;
        if matches!(clients.get(&player_id), Some(c) if c.game_id == game_id) {
            clients.remove(&player_id);
        }
    }

    /// Arms both idle-deadline sets for a player, as a valid action or a
    /// fresh "both present" transition does. No-op while the opponent is
    /// away — a player can't be forfeited for idleness alone in the room.
    async fn arm_idle(&self, game_id: i64, player_id: i64) {
        let cfg = *self.config.read().await;
        let now = chrono::Utc::now();
        let _ = self
            .ephemeral
            .schedule_idle_deadline(IdleSet::Warning, game_id, player_id, now + chrono::Duration::seconds(cfg.idle_warning_seconds))
            .await;
        let _ = self
            .ephemeral
            .schedule_idle_deadline(IdleSet::Forfeit, game_id, player_id, now + chrono::Duration::seconds(cfg.idle_forfeit_seconds))
            .await;
    }

    async fn disarm_idle(&self, game_id: i64, player_id: i64) {
        let _ = self.ephemeral.cancel_idle_deadline(IdleSet::Warning, game_id, player_id).await;
        let _ = self.ephemeral.cancel_idle_deadline(IdleSet::Forfeit, game_id, player_id).await;
    }

    async fn load_state(&self, game_id: i64) -> Option<LiveGameState> {
        let value = self.ephemeral.get_live_state(game_id).await.ok().flatten()?;
        serde_json::from_value(value).ok()
    }

    async fn save_state(&self, game_id: i64, state: &LiveGameState) {
        if let Ok(value) = serde_json::to_value(state) {
            let _ = self.ephemeral.put_live_state(game_id, value).await;
        }
    }
}

/// Entry point wired from the axum route for `/api/v1/game/{token}/ws`.
/// `game_token`/`player_token` are validated by the caller before upgrade.
pub async fn handle_socket(socket: WebSocket, hub: Arc<Hub>, game_id: i64, player_id: i64) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(hub.send_buffer);

    hub.register(player_id, game_id, tx.clone()).await;
    mark_connected(&hub, game_id, player_id).await;
    let _ = hub.presence_tx.send(PresenceEvent::Connected { game_id, player_id }).await;

    let write_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if sink.send(msg).await.is_err() {
                break;
            }
            if is_close {
                break;
            }
        }
    });

    let ping_tx = tx.clone();
    let ping_hub = hub.clone();
    let ping_task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(ping_hub.ping_interval);
        loop {
            interval.tick().await;
            if ping_tx.send(Message::Ping(vec![])).await.is_err() {
                break;
            }
        }
    });

    loop {
        let next = tokio::time::timeout(hub.read_timeout, stream.next()).await;
        match next {
            Ok(Some(Ok(Message::Text(text)))) => {
                if let Ok(client_msg) = serde_json::from_str::<ClientMessage>(&text) {
                    handle_client_message(&hub, game_id, player_id, client_msg).await;
                } else {
                    let _ = tx.send(Message::Text(
                        serde_json::to_string(&ServerMessage::Error { message: "malformed message".into() }).unwrap(),
                    )).await;
                }
            }
            Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
            Ok(Some(Ok(_))) => continue,
            Ok(Some(Err(e))) => {
                warn!(player_id, "websocket read error: {}", e);
                break;
            }
            Err(_) => {
                info!(player_id, "read deadline exceeded, closing");
                break;
            }
        }
    }

    ping_task.abort();
    let _ = tx.send(Message::Close(None)).await;
    drop(tx);
    let _ = write_task.await;

    hub.unregister(player_id, game_id).await;
    mark_disconnected(&hub, game_id, player_id).await;
    let _ = hub.presence_tx.send(PresenceEvent::Disconnected { game_id, player_id }).await;
}

async fn mark_connected(hub: &Hub, game_id: i64, player_id: i64) {
    if let Some(mut state) = hub.load_state(game_id).await {
        if let Some(runtime) = state.runtime_for_mut(player_id) {
            runtime.connected = true;
            runtime.disconnected_at = None;
            if runtime.shown_up_at.is_none() {
                runtime.shown_up_at = Some(chrono::Utc::now());
            }
        }
        let both_present = state.both_present();
        let opponent_id = state.opponent_of(player_id).map(|o| o.id);
        hub.save_state(game_id, &state).await;
        if let Some(opponent_id) = opponent_id {
            hub.send_to(opponent_id, ServerMessage::PlayerConnected { player_id }).await;
        }
        if both_present {
            hub.arm_idle(game_id, player_id).await;
            if let Some(opponent_id) = opponent_id {
                hub.arm_idle(game_id, opponent_id).await;
            }
        } else {
            hub.send_to(player_id, ServerMessage::WaitingForOpponent).await;
        }
    }
}

async fn mark_disconnected(hub: &Hub, game_id: i64, player_id: i64) {
    if let Some(mut state) = hub.load_state(game_id).await {
        if let Some(runtime) = state.runtime_for_mut(player_id) {
            runtime.connected = false;
            runtime.disconnected_at = Some(chrono::Utc::now());
        }
        let opponent_id = state.opponent_of(player_id).map(|o| o.id);
        if let Some(opponent_id) = opponent_id {
            hub.send_to(opponent_id, ServerMessage::PlayerDisconnected { player_id }).await;
        }
        hub.save_state(game_id, &state).await;

        // Nobody can be idle-forfeited while the other side is away.
        hub.disarm_idle(game_id, player_id).await;
        if let Some(opponent_id) = opponent_id {
            hub.disarm_idle(game_id, opponent_id).await;
        }
    }
}

async fn handle_client_message(hub: &Arc<Hub>, game_id: i64, player_id: i64, msg: ClientMessage) {
    if msg.kind == "get_state" {
        if let Some(state) = hub.load_state(game_id).await {
            let projected = hub.engine.project_for(&state.engine_state, player_id);
            hub.send_to(player_id, ServerMessage::GameState { state: projected }).await;
        }
        return;
    }

    let Some(mut state) = hub.load_state(game_id).await else {
        hub.send_to(player_id, ServerMessage::Error { message: "no active game state".into() }).await;
        return;
    };

    match hub.engine.apply_move(&state.engine_state, player_id, &msg.kind, msg.data) {
        Ok(new_state) => {
            state.engine_state = new_state;
            let outcome = hub.engine.is_terminal(&state.engine_state);
            hub.save_state(game_id, &state).await;

            for runtime in [&state.player1, &state.player2] {
                let projected = hub.engine.project_for(&state.engine_state, runtime.id);
                hub.send_to(runtime.id, ServerMessage::GameUpdate { state: projected }).await;
            }

            if state.both_present() {
                hub.arm_idle(game_id, player_id).await;
            }
            hub.send_to(player_id, ServerMessage::PlayerIdleCanceled { player_id }).await;

            if !matches!(outcome, Outcome::InProgress) {
                let conceded = msg.kind == "concede";
                let _ = hub.presence_tx.send(PresenceEvent::Terminal { game_id, outcome, conceded }).await;
            }
        }
        Err(e) => {
            hub.send_to(player_id, ServerMessage::Error { message: e.to_string() }).await;
        }
    }
}

impl Attachable for Arc<Hub> {
    fn input(&mut self) -> Option<mpsc::Sender<EventFrame>> {
        Some(self.input_tx.clone())
    }

    fn output(&mut self) -> Option<mpsc::Receiver<EventFrame>> {
        None
    }
}
