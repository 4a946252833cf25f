//! Component E: the Room event loop. Owns one `GameState`, the stroke
//! history, and the Round Controller; receives events serially from a
//! single `mpsc` channel fed by connection tasks and by timers (§5, §9).
//! No mutex is needed inside a room: everything that touches its state
//! runs inside `Room::run`'s loop body.

pub mod broadcaster;
pub mod manager;
pub mod roster;
pub mod round;
pub mod score;
pub mod state;
pub mod stroke;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rand::thread_rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::sleep;

use crate::error::RoomError;
use crate::protocol::{ClientToServer, ServerToClient};

use self::broadcaster::Broadcaster;
use self::manager::{RoomCode, RoomHandle};
use self::round::{RoundController, TimerKind, TimerToken};
use self::state::{ChatEntry, GameMode, GameState, Phase, Role, SessionId, now_ms};
use self::stroke::StrokeHistory;

const MAX_CLIENTS: usize = 16;
const RECONNECT_GRACE: Duration = Duration::from_secs(20);

/// Events flowing into a room's serial queue. Every variant either comes
/// from a connection task or from a timer posting its own outcome back
/// (§9: "the handler body is the sole mutator").
pub enum RoomEvent {
    Join {
        session_id: SessionId,
        nickname: String,
        reply: oneshot::Sender<Result<JoinAck, RoomError>>,
    },
    Client(SessionId, ClientToServer),
    Disconnect {
        session_id: SessionId,
        consented: bool,
    },
    Timer(TimerToken),
    GraceExpired {
        session_id: SessionId,
        generation: u64,
    },
}

pub struct JoinAck {
    pub session_id: SessionId,
    pub room_code: String,
    pub outbound_rx: mpsc::UnboundedReceiver<ServerToClient>,
}

/// Borrows only the connections map, so it can be constructed alongside a
/// `&mut` borrow of `state`/`history`/`round` without conflicting (§9:
/// controllers take a broadcaster, never a back-reference to the Room).
struct ConnBroadcaster<'a> {
    connections: &'a HashMap<SessionId, mpsc::UnboundedSender<ServerToClient>>,
}

impl Broadcaster for ConnBroadcaster<'_> {
    fn broadcast_all(&mut self, msg: ServerToClient) {
        for tx in self.connections.values() {
            let _ = tx.send(msg.clone());
        }
    }

    fn broadcast_except(&mut self, exclude: SessionId, msg: ServerToClient) {
        for (id, tx) in self.connections {
            if *id != exclude {
                let _ = tx.send(msg.clone());
            }
        }
    }

    fn send_to(&mut self, target: SessionId, msg: ServerToClient) {
        if let Some(tx) = self.connections.get(&target) {
            let _ = tx.send(msg);
        }
    }
}

pub struct Room {
    code: RoomCode,
    state: GameState,
    history: StrokeHistory,
    round: RoundController<RoomEvent>,
    event_tx: mpsc::UnboundedSender<RoomEvent>,
    event_rx: mpsc::UnboundedReceiver<RoomEvent>,
    connections: HashMap<SessionId, mpsc::UnboundedSender<ServerToClient>>,
    directory: Arc<DashMap<RoomCode, RoomHandle>>,
    next_avatar_index: usize,
    disconnect_generations: HashMap<SessionId, u64>,
    disposed: bool,
}

impl Room {
    pub fn spawn_new(code: RoomCode, directory: Arc<DashMap<RoomCode, RoomHandle>>) -> (RoomHandle, Room) {
        let (tx, rx) = mpsc::unbounded_channel();
        let round = RoundController::new(tx.clone(), RoomEvent::Timer);
        let room = Room {
            code: code.clone(),
            state: GameState::default(),
            history: StrokeHistory::default(),
            round,
            event_tx: tx.clone(),
            event_rx: rx,
            connections: HashMap::new(),
            directory,
            next_avatar_index: 0,
            disconnect_generations: HashMap::new(),
            disposed: false,
        };
        let handle = RoomHandle { code, tx };
        (handle, room)
    }

    pub async fn run(mut self) {
        tracing::info!(room_code = %self.code, "room created");
        while let Some(event) = self.event_rx.recv().await {
            self.handle_event(event);
            if self.disposed {
                break;
            }
        }
        tracing::info!(room_code = %self.code, "room disposed");
    }

    fn handle_event(&mut self, event: RoomEvent) {
        match event {
            RoomEvent::Join { session_id, nickname, reply } => {
                self.handle_join(session_id, nickname, reply)
            }
            RoomEvent::Client(session_id, msg) => self.handle_client_message(session_id, msg),
            RoomEvent::Disconnect { session_id, consented } => {
                self.handle_disconnect(session_id, consented)
            }
            RoomEvent::Timer(token) => self.handle_timer(token),
            RoomEvent::GraceExpired { session_id, generation } => {
                self.handle_grace_expired(session_id, generation)
            }
        }
    }

    fn broadcaster(&self) -> ConnBroadcaster<'_> {
        ConnBroadcaster { connections: &self.connections }
    }

    fn is_host(&self, session_id: SessionId) -> bool {
        self.state.players.get(&session_id).map(|p| p.is_host).unwrap_or(false)
    }

    fn send_error(&self, session_id: SessionId, message: impl Into<String>) {
        if let Some(tx) = self.connections.get(&session_id) {
            let _ = tx.send(ServerToClient::Error { message: message.into() });
        }
    }

    fn broadcast_state(&mut self) {
        let snapshot = Box::new(self.state.clone());
        self.broadcaster().broadcast_all(ServerToClient::State(snapshot));
    }

    // ---- Join / leave / reconnect (§4.E) ----

    fn handle_join(
        &mut self,
        session_id: SessionId,
        nickname: String,
        reply: oneshot::Sender<Result<JoinAck, RoomError>>,
    ) {
        if self.connections.len() >= MAX_CLIENTS {
            let _ = reply.send(Err(RoomError::RoomFull));
            return;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(session_id, tx.clone());

        let reconnect_target = self
            .state
            .players
            .iter()
            .find(|(_, p)| !p.is_connected && p.nickname.eq_ignore_ascii_case(&nickname))
            .map(|(id, _)| *id);

        if let Some(old_id) = reconnect_target {
            self.remap_reconnect(old_id, session_id);
            tracing::debug!(room_code = %self.code, %session_id, "reconnected");
        } else {
            let index = self.next_avatar_index;
            self.next_avatar_index += 1;
            let color = roster::next_avatar_color(index);
            let is_host = self.state.players.is_empty();
            let player = state::Player::new(session_id, nickname, color, is_host);
            self.state.players.insert(session_id, player);
            tracing::debug!(room_code = %self.code, %session_id, "joined");
        }

        if self.state.phase == Phase::Drawing && !self.history.is_empty() {
            let _ = tx.send(ServerToClient::StrokeHistory { strokes: self.history.snapshot() });
        }

        let _ = tx.send(ServerToClient::Joined {
            session_id,
            room_code: self.code.as_str().to_string(),
        });

        let _ = reply.send(Ok(JoinAck {
            session_id,
            room_code: self.code.as_str().to_string(),
            outbound_rx: rx,
        }));

        self.broadcast_state();
    }

    /// Patch `old_id` to `session_id` everywhere it appears: drawer queue,
    /// FFA pool, `currentDrawer`, player scores, sudden-death winner list.
    fn remap_reconnect(&mut self, old_id: SessionId, session_id: SessionId) {
        let Some(mut player) = self.state.players.remove(&old_id) else { return };
        player.session_id = session_id;
        player.is_connected = true;

        if player.team_index >= 0 {
            if let Some(team) = self.state.teams.get_mut(player.team_index as usize) {
                match team.drawer_queue.iter().position(|id| *id == old_id) {
                    Some(pos) => team.drawer_queue[pos] = session_id,
                    None => team.drawer_queue.push_back(session_id),
                }
            }
        }
        if let Some(pos) = self.state.ffa_pool.iter().position(|id| *id == old_id) {
            self.state.ffa_pool[pos] = session_id;
        }
        if self.state.current_drawer == Some(old_id) {
            self.state.current_drawer = Some(session_id);
        }
        if let Some(score) = self.state.player_scores.remove(&old_id) {
            self.state.player_scores.insert(session_id, score);
        }
        for id in self.state.winner_session_ids.iter_mut() {
            if *id == old_id {
                *id = session_id;
            }
        }

        self.disconnect_generations.remove(&old_id);
        self.state.players.insert(session_id, player);
    }

    fn handle_disconnect(&mut self, session_id: SessionId, consented: bool) {
        if consented {
            self.leave_consented(session_id);
        } else {
            self.connections.remove(&session_id);
            roster::handle_disconnect(&mut self.state, session_id);

            let generation = {
                let e = self.disconnect_generations.entry(session_id).or_insert(0);
                *e += 1;
                *e
            };
            let tx = self.event_tx.clone();
            tokio::spawn(async move {
                sleep(RECONNECT_GRACE).await;
                let _ = tx.send(RoomEvent::GraceExpired { session_id, generation });
            });

            self.broadcast_state();
        }
    }

    fn handle_grace_expired(&mut self, session_id: SessionId, generation: u64) {
        if self.disconnect_generations.get(&session_id) == Some(&generation) {
            self.leave_consented(session_id);
        }
    }

    fn leave_consented(&mut self, session_id: SessionId) {
        self.connections.remove(&session_id);
        self.disconnect_generations.remove(&session_id);

        let was_host = self
            .state
            .players
            .get(&session_id)
            .map(|p| p.is_host)
            .unwrap_or(false);
        if let Some(player) = self.state.players.get(&session_id) {
            if player.team_index >= 0 {
                if let Some(team) = self.state.teams.get_mut(player.team_index as usize) {
                    team.drawer_queue.retain(|id| *id != session_id);
                }
            }
        }
        self.state.ffa_pool.retain(|id| *id != session_id);
        self.state.players.remove(&session_id);

        if self.state.players.is_empty() {
            self.dispose();
            return;
        }
        if was_host {
            if let Some(next) = self.state.players.values_mut().next() {
                next.is_host = true;
            }
        }
        self.broadcast_state();
    }

    fn dispose(&mut self) {
        self.round.cancel_all();
        self.directory.remove(&self.code);
        self.disposed = true;
    }

    // ---- Client message dispatch (§4.E: phase -> identity -> payload -> apply) ----

    fn handle_client_message(&mut self, sender: SessionId, msg: ClientToServer) {
        match msg {
            ClientToServer::SetGameMode { game_mode } => self.on_set_game_mode(sender, game_mode),
            ClientToServer::JoinTeam { team_index } => self.on_join_team(sender, team_index),
            ClientToServer::Spectate => self.on_spectate(sender),
            ClientToServer::StartGame { settings } => self.on_start_game(sender, settings),
            ClientToServer::SelectWord { word_index } => self.on_select_word(sender, word_index),
            ClientToServer::Draw { stroke } => self.on_draw(sender, stroke),
            ClientToServer::ClearCanvas => self.on_clear_canvas(sender),
            ClientToServer::Undo => self.on_undo(sender),
            ClientToServer::Guess { text } => self.on_guess(sender, text),
            ClientToServer::Chat { text } => self.on_chat(sender, text),
            ClientToServer::PlayAgain => self.on_play_again(sender),
        }
    }

    fn on_set_game_mode(&mut self, sender: SessionId, game_mode: String) {
        if self.state.phase != Phase::ModeSelect {
            return;
        }
        if !self.is_host(sender) {
            self.send_error(sender, "only the host can set the game mode");
            return;
        }
        let Some(mode) = crate::protocol::parse_game_mode(&game_mode) else {
            self.send_error(sender, "unknown game mode");
            return;
        };
        self.state.settings.game_mode = mode;
        match mode {
            GameMode::Ffa => self.state.teams.clear(),
            GameMode::Teams => {
                if self.state.teams.is_empty() {
                    roster::init_teams(&mut self.state, 2);
                }
            }
        }
        self.state.phase = Phase::Lobby;
        self.broadcast_state();
    }

    fn on_join_team(&mut self, sender: SessionId, team_index: i32) {
        if self.state.phase != Phase::Lobby {
            return;
        }
        if roster::join_team(&mut self.state, sender, team_index).is_ok() {
            self.broadcast_state();
        }
    }

    fn on_spectate(&mut self, sender: SessionId) {
        if self.state.phase != Phase::Lobby {
            return;
        }
        roster::set_spectator(&mut self.state, sender);
        self.broadcast_state();
    }

    fn on_start_game(&mut self, sender: SessionId, settings: Option<crate::protocol::PartialSettings>) {
        if self.state.phase != Phase::Lobby {
            return;
        }
        if !self.is_host(sender) {
            self.send_error(sender, "only the host can start the game");
            return;
        }
        if let Err(e) = roster::can_start_game(&self.state) {
            self.send_error(sender, e.to_string());
            return;
        }
        if let Some(patch) = settings {
            patch.merge_into(&mut self.state.settings);
        }
        self.round.arm_start_game_delay();
    }

    fn on_select_word(&mut self, sender: SessionId, word_index: usize) {
        let mut bc = ConnBroadcaster { connections: &self.connections };
        let _ = self.round.select_word(&mut self.state, &mut bc, sender, word_index);
        drop(bc);
        self.broadcast_state();
    }

    fn on_draw(&mut self, sender: SessionId, stroke: state::DrawStroke) {
        if self.state.phase != Phase::Drawing || self.state.current_drawer != Some(sender) {
            return;
        }
        self.history.push(stroke.clone());
        self.broadcaster().broadcast_except(sender, ServerToClient::Draw { stroke });
    }

    fn on_clear_canvas(&mut self, sender: SessionId) {
        if self.state.phase != Phase::Drawing || self.state.current_drawer != Some(sender) {
            return;
        }
        self.history.clear();
        self.broadcaster().broadcast_all(ServerToClient::ClearCanvas);
    }

    fn on_undo(&mut self, sender: SessionId) {
        if self.state.phase != Phase::Drawing || self.state.current_drawer != Some(sender) {
            return;
        }
        self.history.undo();
        self.broadcaster().broadcast_all(ServerToClient::Undo);
    }

    fn guess_allowed(&self, sender: SessionId) -> bool {
        if self.state.current_drawer == Some(sender) {
            return false;
        }
        let Some(player) = self.state.players.get(&sender) else { return false };
        match self.state.settings.game_mode {
            GameMode::Teams => player.role == Role::Guesser,
            GameMode::Ffa => {
                if self.state.is_sudden_death {
                    self.state.winner_session_ids.contains(&sender) && player.role == Role::Guesser
                } else {
                    true
                }
            }
        }
    }

    fn on_guess(&mut self, sender: SessionId, text: String) {
        if self.state.phase != Phase::Drawing {
            return;
        }
        if !self.guess_allowed(sender) {
            self.send_error(sender, "you can't guess right now");
            return;
        }
        if text.trim().is_empty() {
            return;
        }
        let Some(nickname) = self.state.players.get(&sender).map(|p| p.nickname.clone()) else {
            return;
        };
        let mut rng = thread_rng();
        let mut bc = ConnBroadcaster { connections: &self.connections };
        self.round
            .process_guess(&mut self.state, &mut self.history, &mut bc, &mut rng, sender, nickname, text);
        drop(bc);
        self.broadcast_state();
    }

    fn on_chat(&mut self, sender: SessionId, text: String) {
        let is_guesser = self
            .state
            .players
            .get(&sender)
            .map(|p| p.role == Role::Guesser)
            .unwrap_or(false);
        if self.state.phase == Phase::Drawing && is_guesser {
            self.send_error(sender, "guessers can't chat while drawing");
            return;
        }
        if text.trim().is_empty() {
            return;
        }
        let Some(nickname) = self.state.players.get(&sender).map(|p| p.nickname.clone()) else {
            return;
        };
        self.state.push_chat(ChatEntry { player_id: sender, nickname, text, timestamp: now_ms() });
        self.broadcast_state();
    }

    fn on_play_again(&mut self, sender: SessionId) {
        if !self.is_host(sender) {
            return;
        }
        self.round.cancel_all();
        self.history.clear();
        self.state.current_round = 0;
        self.state.active_team_index = 0;
        self.state.current_drawer = None;
        self.state.word_hint.clear();
        self.state.time_remaining = 0;
        self.state.guesses.clear();
        self.state.winning_team_index = -1;
        self.state.player_scores.clear();
        self.state.winner_session_ids.clear();
        self.state.is_sudden_death = false;
        self.state.ffa_pool.clear();
        for player in self.state.players.values_mut() {
            player.role = Role::Spectator;
            player.team_index = -1;
        }
        roster::init_teams(&mut self.state, 2);
        self.state.settings.game_mode = GameMode::Teams;
        self.state.phase = Phase::ModeSelect;
        self.broadcast_state();
    }

    // ---- Timer firing (§5: guarded no-op if stale) ----

    fn handle_timer(&mut self, token: TimerToken) {
        if !self.round.is_current(&token) {
            return;
        }
        let mut rng = thread_rng();
        match token.kind {
            TimerKind::AutoPickWord => {
                let mut bc = ConnBroadcaster { connections: &self.connections };
                self.round.auto_pick_word(&mut self.state, &mut bc, &mut rng);
            }
            TimerKind::DrawTick => {
                let mut bc = ConnBroadcaster { connections: &self.connections };
                self.round.tick(&mut self.state, &mut self.history, &mut bc, &mut rng);
            }
            TimerKind::HintReveal => {
                self.round.reveal_hint(&mut self.state, &mut rng);
            }
            TimerKind::RoundAdvance(transition) => {
                let mut bc = ConnBroadcaster { connections: &self.connections };
                self.round
                    .apply_round_advance(&mut self.state, &mut self.history, &mut bc, &mut rng, transition);
            }
            TimerKind::StartGame => {
                let mut bc = ConnBroadcaster { connections: &self.connections };
                self.round.start_game(&mut self.state, &mut self.history, &mut bc, &mut rng);
            }
        }
        self.broadcast_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ClientToServer;
    use tokio::time::timeout;
    use uuid::Uuid;

    async fn join(tx: &mpsc::UnboundedSender<RoomEvent>, nickname: &str) -> (SessionId, JoinAck) {
        let session_id = Uuid::new_v4();
        let (reply_tx, reply_rx) = oneshot::channel();
        tx.send(RoomEvent::Join {
            session_id,
            nickname: nickname.to_string(),
            reply: reply_tx,
        })
        .unwrap();
        let ack = reply_rx.await.unwrap().unwrap();
        (session_id, ack)
    }

    /// Drain `rx` until a message `f` accepts, discarding everything else
    /// (interleaved `State` broadcasts we don't care about for this step).
    async fn next_matching<T>(
        rx: &mut mpsc::UnboundedReceiver<ServerToClient>,
        mut f: impl FnMut(&ServerToClient) -> Option<T>,
    ) -> T {
        loop {
            let msg = timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for a message")
                .expect("outbound channel closed");
            if let Some(v) = f(&msg) {
                return v;
            }
        }
    }

    /// End-to-end: join three players onto two teams, start the game, let the
    /// drawer pick a word, have a teammate guess it correctly, and check the
    /// round-end invariants (#1/#2: no drawer outside word-select/drawing).
    #[tokio::test]
    async fn join_start_guess_round_end_flow() {
        let directory: Arc<DashMap<RoomCode, RoomHandle>> = Arc::new(DashMap::new());
        let (handle, room) = Room::spawn_new(RoomCode::normalize("TEST1"), directory);
        tokio::spawn(room.run());

        let (host_id, mut host) = join(&handle.tx, "host").await;
        let (guesser_id, mut guesser) = join(&handle.tx, "guesser").await;
        let (other_id, _other) = join(&handle.tx, "other").await;

        handle
            .tx
            .send(RoomEvent::Client(host_id, ClientToServer::SetGameMode { game_mode: "teams".to_string() }))
            .unwrap();
        handle
            .tx
            .send(RoomEvent::Client(host_id, ClientToServer::JoinTeam { team_index: 0 }))
            .unwrap();
        handle
            .tx
            .send(RoomEvent::Client(guesser_id, ClientToServer::JoinTeam { team_index: 0 }))
            .unwrap();
        handle
            .tx
            .send(RoomEvent::Client(other_id, ClientToServer::JoinTeam { team_index: 1 }))
            .unwrap();
        handle
            .tx
            .send(RoomEvent::Client(host_id, ClientToServer::StartGame { settings: None }))
            .unwrap();

        // host is first into team 0's queue, so it draws round one.
        let words = next_matching(&mut host.outbound_rx, |msg| match msg {
            ServerToClient::WordChoices { words } => Some(words.clone()),
            _ => None,
        })
        .await;

        handle
            .tx
            .send(RoomEvent::Client(host_id, ClientToServer::SelectWord { word_index: 0 }))
            .unwrap();

        let secret = next_matching(&mut host.outbound_rx, |msg| match msg {
            ServerToClient::SecretWord { word } => Some(word.clone()),
            _ => None,
        })
        .await;
        assert_eq!(secret, words[0]);

        handle
            .tx
            .send(RoomEvent::Client(guesser_id, ClientToServer::Guess { text: secret.clone() }))
            .unwrap();

        let (nickname, word) = next_matching(&mut guesser.outbound_rx, |msg| match msg {
            ServerToClient::CorrectGuess { nickname, word, .. } => Some((nickname.clone(), word.clone())),
            _ => None,
        })
        .await;
        assert_eq!(nickname, "guesser");
        assert_eq!(word, secret);

        let end_state = next_matching(&mut guesser.outbound_rx, |msg| match msg {
            ServerToClient::State(s) if s.phase == Phase::RoundEnd => Some(s.clone()),
            _ => None,
        })
        .await;

        assert!(end_state.current_drawer.is_none());
        assert_eq!(end_state.teams[0].score, 1);
        assert_ne!(end_state.players.get(&host_id).unwrap().role, Role::Drawer);
    }
}
