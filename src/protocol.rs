//! Wire protocol: tagged-union client/server messages (§6, §9's "dynamic
//! dispatch on incoming messages" note). Replaces the distilled source's
//! string-keyed handler registry with an exhaustively-matched enum.

use serde::{Deserialize, Serialize};

use crate::room::state::{DrawStroke, GameSettings, SessionId};

/// The first frame on a fresh connection: either create a room or join one
/// by code. Resolved by the transport shell (§4.H) before a Room ever sees
/// the connection.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum JoinRequest {
    CreateRoom { nickname: String },
    JoinRoom { room_code: String, nickname: String },
}

/// Messages accepted from an already-joined client, dispatched by the Room
/// under the phase → identity → payload guard order of §4.E.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ClientToServer {
    SetGameMode { game_mode: String },
    JoinTeam { team_index: i32 },
    Spectate,
    StartGame { settings: Option<PartialSettings> },
    SelectWord { word_index: usize },
    Draw { stroke: DrawStroke },
    ClearCanvas,
    Undo,
    Guess { text: String },
    Chat { text: String },
    PlayAgain,
}

/// A partial settings patch, as sent with `startGame`; unset fields keep
/// their current value.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartialSettings {
    pub game_mode: Option<String>,
    pub win_mode: Option<String>,
    pub target_score: Option<u32>,
    pub total_rounds: Option<u32>,
    pub draw_time: Option<u32>,
    pub word_category: Option<String>,
}

impl PartialSettings {
    pub fn merge_into(&self, base: &mut GameSettings) {
        if let Some(ref m) = self.game_mode {
            if let Some(parsed) = parse_game_mode(m) {
                base.game_mode = parsed;
            }
        }
        if let Some(ref m) = self.win_mode {
            if let Some(parsed) = parse_win_mode(m) {
                base.win_mode = parsed;
            }
        }
        if let Some(v) = self.target_score {
            base.target_score = v;
        }
        if let Some(v) = self.total_rounds {
            base.total_rounds = v;
        }
        if let Some(v) = self.draw_time {
            base.draw_time = v.clamp(30, 120);
        }
        if let Some(ref v) = self.word_category {
            base.word_category = v.clone();
        }
    }
}

pub fn parse_game_mode(s: &str) -> Option<crate::room::state::GameMode> {
    use crate::room::state::GameMode;
    match s {
        "teams" => Some(GameMode::Teams),
        "ffa" => Some(GameMode::Ffa),
        _ => None,
    }
}

pub fn parse_win_mode(s: &str) -> Option<crate::room::state::WinMode> {
    use crate::room::state::WinMode;
    match s {
        "points" => Some(WinMode::Points),
        "rounds" => Some(WinMode::Rounds),
        _ => None,
    }
}

/// Messages sent from the room to one or more clients (§6). `State` carries
/// a full snapshot, sent after every mutating event and once synchronously
/// at join time.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ServerToClient {
    Joined {
        session_id: SessionId,
        room_code: String,
    },
    State(Box<crate::room::state::GameState>),
    WordChoices {
        words: Vec<String>,
    },
    SecretWord {
        word: String,
    },
    StrokeHistory {
        strokes: Vec<DrawStroke>,
    },
    Draw {
        stroke: DrawStroke,
    },
    ClearCanvas,
    Undo,
    CorrectGuess {
        player_id: SessionId,
        nickname: String,
        word: String,
    },
    RoundResult {
        word: String,
        was_correct: bool,
        team_index: i32,
        team_name: Option<String>,
    },
    Error {
        message: String,
    },
}
