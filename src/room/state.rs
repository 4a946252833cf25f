//! Component A: the passive game-state data record. Mutated only from
//! within the Room's serial event loop (`room::mod`); the controllers in
//! `roster`, `score` and `round` take `&mut GameState` borrows.

use std::collections::{HashMap, VecDeque};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::palette;

/// Opaque transport-assigned token, unique within a room's lifetime.
pub type SessionId = Uuid;

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before epoch")
        .as_millis() as u64
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    ModeSelect,
    Lobby,
    WordSelect,
    Drawing,
    RoundEnd,
    GameOver,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Drawer,
    Guesser,
    Opponent,
    Spectator,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GameMode {
    Teams,
    Ffa,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WinMode {
    Points,
    Rounds,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Player {
    pub session_id: SessionId,
    pub nickname: String,
    pub avatar_color: &'static str,
    pub team_index: i32,
    pub role: Role,
    pub is_host: bool,
    pub is_connected: bool,
}

impl Player {
    pub fn new(session_id: SessionId, nickname: String, avatar_color: &'static str, is_host: bool) -> Self {
        Self {
            session_id,
            nickname,
            avatar_color,
            team_index: -1,
            role: Role::Spectator,
            is_host,
            is_connected: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Team {
    pub name: &'static str,
    pub color: &'static str,
    pub score: u32,
    pub drawer_queue: VecDeque<SessionId>,
}

impl Team {
    pub fn from_preset(index: usize) -> Self {
        let (name, color) = palette::team_preset(index);
        Self {
            name,
            color,
            score: 0,
            drawer_queue: VecDeque::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameSettings {
    pub game_mode: GameMode,
    pub win_mode: WinMode,
    pub target_score: u32,
    pub total_rounds: u32,
    pub draw_time: u32,
    pub word_category: String,
}

impl Default for GameSettings {
    fn default() -> Self {
        Self {
            game_mode: GameMode::Teams,
            win_mode: WinMode::Points,
            target_score: 10,
            total_rounds: 10,
            draw_time: 75,
            word_category: "mixed".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuessEntry {
    pub player_id: SessionId,
    pub nickname: String,
    pub text: String,
    pub timestamp: u64,
    pub is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatEntry {
    pub player_id: SessionId,
    pub nickname: String,
    pub text: String,
    pub timestamp: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tool {
    Pen,
    Eraser,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DrawStroke {
    pub points: Vec<(f32, f32)>,
    pub color: String,
    pub width: u32,
    pub tool: Tool,
}

/// The full authoritative game state of one room.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub phase: Phase,
    pub settings: GameSettings,
    pub players: HashMap<SessionId, Player>,
    pub teams: Vec<Team>,
    pub ffa_pool: VecDeque<SessionId>,

    pub current_round: u32,
    pub active_team_index: i32,
    pub current_drawer: Option<SessionId>,
    pub word_hint: String,
    pub time_remaining: u32,
    pub guesses: Vec<GuessEntry>,
    pub chat_messages: Vec<ChatEntry>,
    pub winning_team_index: i32,
    pub player_scores: HashMap<SessionId, u32>,
    pub winner_session_ids: Vec<SessionId>,
    pub is_sudden_death: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self {
            phase: Phase::ModeSelect,
            settings: GameSettings::default(),
            players: HashMap::new(),
            teams: Vec::new(),
            ffa_pool: VecDeque::new(),
            current_round: 0,
            active_team_index: 0,
            current_drawer: None,
            word_hint: String::new(),
            time_remaining: 0,
            guesses: Vec::new(),
            chat_messages: Vec::new(),
            winning_team_index: -1,
            player_scores: HashMap::new(),
            winner_session_ids: Vec::new(),
            is_sudden_death: false,
        }
    }
}

impl GameState {
    pub fn connected_player_count(&self) -> usize {
        self.players.values().filter(|p| p.is_connected).count()
    }

    pub fn push_chat(&mut self, entry: ChatEntry) {
        self.chat_messages.push(entry);
        if self.chat_messages.len() > 100 {
            self.chat_messages.drain(0..50);
        }
    }
}
