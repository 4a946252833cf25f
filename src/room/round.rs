//! Component D: the Round Controller — the phase state machine. Owns no
//! reference back to the Room (§9 design notes); it's handed a `&mut
//! GameState`, the stroke history, a broadcaster, and an RNG on every call,
//! and arms timers by cloning the Room's own event sender.
//!
//! Cancellation is a plain generation counter, not a runtime `JoinHandle`
//! (§9 "Timer handles"): every timer-arming method captures the counter's
//! current value; any transition that should invalidate outstanding timers
//! bumps it first. A `TimerFired` event whose captured generation no
//! longer matches `self.generation` is a no-op.

use std::time::Duration;

use rand::Rng;
use tokio::sync::mpsc;
use tokio::time::sleep;

use crate::protocol::ServerToClient;
use crate::room::broadcaster::Broadcaster;
use crate::room::state::{now_ms, GameMode, GameState, GuessEntry, Phase, Role, SessionId};
use crate::room::stroke::StrokeHistory;
use crate::room::{roster, score};
use crate::wordbank;

pub const WORD_SELECT_TIMEOUT: Duration = Duration::from_secs(15);
pub const HINT_INTERVAL: Duration = Duration::from_secs(20);
pub const ROUND_END_DELAY: Duration = Duration::from_secs(5);
pub const START_GAME_DELAY: Duration = Duration::from_millis(500);
pub const DRAW_TICK: Duration = Duration::from_secs(1);

/// What to do once the round-end delay elapses; captured at `end_round`
/// time since nothing else can mutate score/winner state during the wait.
#[derive(Debug, Clone)]
pub enum PendingTransition {
    GameOverTeams { winning_team_index: i32 },
    NextRound,
    GameOverFfa { winner: SessionId },
    SuddenDeath { tied: Vec<SessionId> },
}

#[derive(Debug, Clone)]
pub enum TimerKind {
    AutoPickWord,
    DrawTick,
    HintReveal,
    RoundAdvance(PendingTransition),
    StartGame,
}

/// A timer-fired event, tagged with the generation it was armed under.
#[derive(Debug, Clone)]
pub struct TimerToken {
    pub generation: u64,
    pub kind: TimerKind,
}

/// Drop the outgoing drawer back to a non-drawer role and clear
/// `currentDrawer`, so invariants #1/#2 (exactly one drawer iff phase is
/// word-select/drawing) hold the instant the round leaves drawing, not just
/// after the next round or `playAgain` reassigns roles.
fn clear_current_drawer(state: &mut GameState) {
    let Some(drawer) = state.current_drawer.take() else { return };
    if let Some(player) = state.players.get_mut(&drawer) {
        player.role = match state.settings.game_mode {
            GameMode::Teams => Role::Guesser,
            GameMode::Ffa => {
                if state.ffa_pool.contains(&drawer) {
                    Role::Guesser
                } else {
                    Role::Spectator
                }
            }
        };
    }
}

pub struct RoundController<Tx> {
    generation: u64,
    current_word: Option<String>,
    revealed_positions: std::collections::HashSet<usize>,
    pending_choices: Vec<String>,
    event_tx: mpsc::UnboundedSender<Tx>,
    make_timer_fired: fn(TimerToken) -> Tx,
}

impl<Tx: Send + 'static> RoundController<Tx> {
    pub fn new(event_tx: mpsc::UnboundedSender<Tx>, make_timer_fired: fn(TimerToken) -> Tx) -> Self {
        Self {
            generation: 0,
            current_word: None,
            revealed_positions: std::collections::HashSet::new(),
            pending_choices: Vec::new(),
            event_tx,
            make_timer_fired,
        }
    }

    #[cfg(test)]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[cfg(test)]
    pub fn current_word(&self) -> Option<&str> {
        self.current_word.as_deref()
    }

    /// Invalidate every outstanding timer at once.
    fn clear_timers(&mut self) -> u64 {
        self.generation += 1;
        self.generation
    }

    fn arm(&self, generation: u64, kind: TimerKind, delay: Duration) {
        let tx = self.event_tx.clone();
        let make = self.make_timer_fired;
        tokio::spawn(async move {
            sleep(delay).await;
            let _ = tx.send(make(TimerToken { generation, kind }));
        });
    }

    /// True if a fired token still belongs to the current generation.
    pub fn is_current(&self, token: &TimerToken) -> bool {
        token.generation == self.generation
    }

    pub fn start_game(
        &mut self,
        state: &mut GameState,
        history: &mut StrokeHistory,
        bc: &mut dyn Broadcaster,
        rng: &mut impl Rng,
    ) {
        state.current_round = 0;
        state.active_team_index = 0;
        state.winning_team_index = -1;
        state.is_sudden_death = false;
        state.winner_session_ids.clear();
        match state.settings.game_mode {
            GameMode::Teams => score::reset_team_scores(state),
            GameMode::Ffa => {
                state.player_scores.clear();
                roster::init_ffa(state);
            }
        }
        self.start_next_round(state, history, bc, rng);
    }

    pub fn start_next_round(
        &mut self,
        state: &mut GameState,
        history: &mut StrokeHistory,
        bc: &mut dyn Broadcaster,
        rng: &mut impl Rng,
    ) {
        let generation = self.clear_timers();
        history.clear();
        bc.broadcast_all(ServerToClient::ClearCanvas);
        state.guesses.clear();
        state.word_hint.clear();
        self.current_word = None;
        self.revealed_positions.clear();
        state.current_round += 1;

        let drawer = match state.settings.game_mode {
            GameMode::Teams => {
                let n = state.teams.len();
                if n == 0 {
                    return;
                }
                let mut attempts = 0;
                while attempts < n
                    && state.teams[state.active_team_index as usize]
                        .drawer_queue
                        .is_empty()
                {
                    state.active_team_index = (state.active_team_index + 1) % n as i32;
                    attempts += 1;
                }
                match roster::get_next_drawer(state, state.active_team_index) {
                    Some(d) => {
                        roster::assign_roles(state, d, state.active_team_index);
                        d
                    }
                    None => return,
                }
            }
            GameMode::Ffa => match roster::get_next_ffa_drawer(state) {
                Some(d) => {
                    roster::assign_ffa_roles(state, d);
                    d
                }
                None => return,
            },
        };
        state.current_drawer = Some(drawer);

        let words = wordbank::draw_words(&state.settings.word_category, 3, rng);
        bc.send_to(
            drawer,
            ServerToClient::WordChoices {
                words: words.clone(),
            },
        );
        self.pending_choices = words;
        state.phase = Phase::WordSelect;
        self.arm(generation, TimerKind::AutoPickWord, WORD_SELECT_TIMEOUT);
    }

    pub fn select_word(
        &mut self,
        state: &mut GameState,
        bc: &mut dyn Broadcaster,
        sender: SessionId,
        index: usize,
    ) -> Result<(), crate::error::RoomError> {
        if state.phase != Phase::WordSelect {
            return Err(crate::error::RoomError::WrongPhase);
        }
        if state.current_drawer != Some(sender) {
            return Err(crate::error::RoomError::WrongRole);
        }
        if index >= self.pending_choices.len() {
            return Err(crate::error::RoomError::InvalidPayload(
                "wordIndex out of range".to_string(),
            ));
        }
        let word = self.pending_choices[index].clone();
        self.begin_drawing(state, bc, word);
        Ok(())
    }

    /// Internal: auto-pick a uniformly random offered word. Called when the
    /// 15-second word-select timer fires; bypasses the sender/index guards
    /// `select_word` enforces since there is no client message here.
    pub fn auto_pick_word(
        &mut self,
        state: &mut GameState,
        bc: &mut dyn Broadcaster,
        rng: &mut impl Rng,
    ) {
        if self.pending_choices.is_empty() {
            return;
        }
        let idx = rng.gen_range(0..self.pending_choices.len());
        let word = self.pending_choices[idx].clone();
        self.begin_drawing(state, bc, word);
    }

    fn begin_drawing(&mut self, state: &mut GameState, bc: &mut dyn Broadcaster, word: String) {
        let generation = self.clear_timers();
        self.current_word = Some(word.clone());
        self.revealed_positions.clear();
        state.word_hint = wordbank::mask_word(&word);
        state.time_remaining = state.settings.draw_time;
        state.phase = Phase::Drawing;
        if let Some(drawer) = state.current_drawer {
            bc.send_to(drawer, ServerToClient::SecretWord { word });
        }
        self.arm(generation, TimerKind::DrawTick, DRAW_TICK);
        self.arm(generation, TimerKind::HintReveal, HINT_INTERVAL);
    }

    /// Called on each `DrawTick` firing that's still current.
    pub fn tick(
        &mut self,
        state: &mut GameState,
        history: &mut StrokeHistory,
        bc: &mut dyn Broadcaster,
        rng: &mut impl Rng,
    ) {
        if state.phase != Phase::Drawing {
            return;
        }
        state.time_remaining = state.time_remaining.saturating_sub(1);
        if state.time_remaining == 0 {
            self.end_round(state, history, bc, rng, false);
        } else {
            self.arm(self.generation, TimerKind::DrawTick, DRAW_TICK);
        }
    }

    /// Called on each `HintReveal` firing that's still current.
    pub fn reveal_hint(&mut self, state: &mut GameState, rng: &mut impl Rng) {
        if state.phase != Phase::Drawing {
            return;
        }
        if let Some(word) = self.current_word.clone() {
            let (hint, revealed) = wordbank::reveal_random_char(&word, &self.revealed_positions, rng);
            state.word_hint = hint;
            self.revealed_positions = revealed;
        }
        self.arm(self.generation, TimerKind::HintReveal, HINT_INTERVAL);
    }

    pub fn process_guess(
        &mut self,
        state: &mut GameState,
        history: &mut StrokeHistory,
        bc: &mut dyn Broadcaster,
        rng: &mut impl Rng,
        player_id: SessionId,
        nickname: String,
        text: String,
    ) {
        let normalized_text = text.trim().to_lowercase();
        let secret = self.current_word.clone().unwrap_or_default();
        let normalized_secret = secret.trim().to_lowercase();
        let is_correct = !normalized_text.is_empty() && normalized_text == normalized_secret;

        let logged_text = if is_correct {
            "\u{2713} Correct!".to_string()
        } else {
            text
        };
        state.guesses.push(GuessEntry {
            player_id,
            nickname: nickname.clone(),
            text: logged_text,
            timestamp: now_ms(),
            is_correct,
        });

        if !is_correct {
            return;
        }

        match (state.settings.game_mode, state.is_sudden_death) {
            (GameMode::Teams, _) => {
                score::award_point(state, state.active_team_index);
                bc.broadcast_all(ServerToClient::CorrectGuess {
                    player_id,
                    nickname,
                    word: secret,
                });
                self.end_round(state, history, bc, rng, true);
            }
            (GameMode::Ffa, false) => {
                score::award_player_point(state, player_id);
                bc.broadcast_all(ServerToClient::CorrectGuess {
                    player_id,
                    nickname,
                    word: secret,
                });
                self.end_round(state, history, bc, rng, true);
            }
            (GameMode::Ffa, true) => {
                bc.broadcast_all(ServerToClient::CorrectGuess {
                    player_id,
                    nickname,
                    word: secret,
                });
                self.end_sudden_death_win(state, bc, player_id);
            }
        }
    }

    pub fn end_round(
        &mut self,
        state: &mut GameState,
        _history: &mut StrokeHistory,
        bc: &mut dyn Broadcaster,
        _rng: &mut impl Rng,
        was_correct: bool,
    ) {
        let generation = self.clear_timers();
        state.phase = Phase::RoundEnd;
        clear_current_drawer(state);

        let team_index = if matches!(state.settings.game_mode, GameMode::Teams) {
            state.active_team_index
        } else {
            -1
        };
        let team_name = if team_index >= 0 {
            state.teams.get(team_index as usize).map(|t| t.name.to_string())
        } else {
            None
        };
        bc.broadcast_all(ServerToClient::RoundResult {
            word: self.current_word.clone().unwrap_or_default(),
            was_correct,
            team_index,
            team_name,
        });

        let transition = match state.settings.game_mode {
            GameMode::Teams => {
                let winner = score::check_win_condition(state);
                if winner >= 0 {
                    PendingTransition::GameOverTeams {
                        winning_team_index: winner,
                    }
                } else {
                    let n = state.teams.len() as i32;
                    if n > 0 {
                        state.active_team_index = (state.active_team_index + 1) % n;
                    }
                    PendingTransition::NextRound
                }
            }
            GameMode::Ffa => {
                let winners = score::check_ffa_win_condition(state);
                if winners.len() == 1 {
                    PendingTransition::GameOverFfa { winner: winners[0] }
                } else if winners.len() >= 2 {
                    PendingTransition::SuddenDeath { tied: winners }
                } else {
                    PendingTransition::NextRound
                }
            }
        };
        self.arm(generation, TimerKind::RoundAdvance(transition), ROUND_END_DELAY);
    }

    /// Apply a `RoundAdvance` transition once its timer fires and is still
    /// current. `NextRound` and `SuddenDeath` recurse back into this
    /// controller; the other two just flip terminal state fields.
    pub fn apply_round_advance(
        &mut self,
        state: &mut GameState,
        history: &mut StrokeHistory,
        bc: &mut dyn Broadcaster,
        rng: &mut impl Rng,
        transition: PendingTransition,
    ) {
        match transition {
            PendingTransition::GameOverTeams { winning_team_index } => {
                state.winning_team_index = winning_team_index;
                state.phase = Phase::GameOver;
                clear_current_drawer(state);
            }
            PendingTransition::NextRound => {
                self.start_next_round(state, history, bc, rng);
            }
            PendingTransition::GameOverFfa { winner } => {
                state.winner_session_ids = vec![winner];
                state.phase = Phase::GameOver;
                clear_current_drawer(state);
            }
            PendingTransition::SuddenDeath { tied } => {
                self.start_sudden_death(state, bc, rng, tied);
            }
        }
    }

    pub fn start_sudden_death(
        &mut self,
        state: &mut GameState,
        bc: &mut dyn Broadcaster,
        rng: &mut impl Rng,
        tied_ids: Vec<SessionId>,
    ) {
        let generation = self.clear_timers();
        state.is_sudden_death = true;
        state.winner_session_ids = tied_ids.clone();
        state.guesses.clear();
        state.word_hint.clear();
        self.current_word = None;
        self.revealed_positions.clear();

        let Some(drawer) = roster::get_sudden_death_drawer(state, &tied_ids) else {
            return;
        };
        state.current_drawer = Some(drawer);
        for player in state.players.values_mut() {
            player.role = if player.session_id == drawer {
                crate::room::state::Role::Drawer
            } else if tied_ids.contains(&player.session_id) {
                crate::room::state::Role::Guesser
            } else {
                crate::room::state::Role::Spectator
            };
        }

        let words = wordbank::draw_words(&state.settings.word_category, 3, rng);
        bc.send_to(
            drawer,
            ServerToClient::WordChoices {
                words: words.clone(),
            },
        );
        self.pending_choices = words;
        state.phase = Phase::WordSelect;
        self.arm(generation, TimerKind::AutoPickWord, WORD_SELECT_TIMEOUT);
    }

    pub fn end_sudden_death_win(
        &mut self,
        state: &mut GameState,
        _bc: &mut dyn Broadcaster,
        winner: SessionId,
    ) {
        self.clear_timers();
        state.is_sudden_death = false;
        state.winner_session_ids = vec![winner];
        state.phase = Phase::GameOver;
    }

    /// Schedules the 500ms `startGame` delay from the dispatch handler.
    pub fn arm_start_game_delay(&mut self) {
        let generation = self.clear_timers();
        self.arm(generation, TimerKind::StartGame, START_GAME_DELAY);
    }

    /// Invalidate every outstanding timer and drop round-local state.
    /// Used on `playAgain` and room disposal.
    pub fn cancel_all(&mut self) {
        self.clear_timers();
        self.current_word = None;
        self.revealed_positions.clear();
        self.pending_choices.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::broadcaster::RecordingBroadcaster;
    use crate::room::state::{GameState, Player};
    use rand::rngs::mock::StepRng;
    use uuid::Uuid;

    #[derive(Debug, Clone)]
    enum TestEvent {
        Timer(TimerToken),
    }

    fn controller() -> RoundController<TestEvent> {
        let (tx, _rx) = mpsc::unbounded_channel();
        RoundController::new(tx, TestEvent::Timer)
    }

    fn add_player(state: &mut GameState, host: bool) -> SessionId {
        let id = Uuid::new_v4();
        state.players.insert(id, Player::new(id, format!("p-{id}"), "#000", host));
        id
    }

    #[test]
    fn start_next_round_assigns_drawer_and_sends_choices() {
        let mut state = GameState::default();
        state.settings.game_mode = GameMode::Ffa;
        let a = add_player(&mut state, true);
        let _b = add_player(&mut state, false);
        roster::init_ffa(&mut state);

        let mut ctrl = controller();
        let mut history = StrokeHistory::default();
        let mut bc = RecordingBroadcaster::default();
        let mut rng = StepRng::new(0, 1);

        ctrl.start_next_round(&mut state, &mut history, &mut bc, &mut rng);

        assert_eq!(state.phase, Phase::WordSelect);
        assert!(state.current_drawer.is_some());
        assert_eq!(bc.direct.len(), 1);
        // drawer got word choices, not necessarily `a` since queue order depends on join order
        let (target, _msg) = &bc.direct[0];
        assert!(state.players.contains_key(target));
        let _ = a;
    }

    #[test]
    fn clear_timers_bumps_generation_and_invalidates_old_tokens() {
        let mut ctrl = controller();
        let gen0 = ctrl.generation;
        let stale = TimerToken {
            generation: gen0,
            kind: TimerKind::DrawTick,
        };
        ctrl.clear_timers();
        assert!(!ctrl.is_current(&stale));
    }

    #[test]
    fn select_word_rejects_wrong_drawer() {
        let mut state = GameState::default();
        state.phase = Phase::WordSelect;
        let drawer = add_player(&mut state, true);
        let other = add_player(&mut state, false);
        state.current_drawer = Some(drawer);

        let mut ctrl = controller();
        ctrl.pending_choices = vec!["a".into(), "b".into(), "c".into()];
        let mut bc = RecordingBroadcaster::default();

        let result = ctrl.select_word(&mut state, &mut bc, other, 0);
        assert!(matches!(result, Err(crate::error::RoomError::WrongRole)));
    }

    #[test]
    fn select_word_transitions_to_drawing_and_sends_secret() {
        let mut state = GameState::default();
        state.phase = Phase::WordSelect;
        state.settings.draw_time = 60;
        let drawer = add_player(&mut state, true);
        state.current_drawer = Some(drawer);

        let mut ctrl = controller();
        ctrl.pending_choices = vec!["cat".into(), "dog".into(), "owl".into()];
        let mut bc = RecordingBroadcaster::default();

        ctrl.select_word(&mut state, &mut bc, drawer, 1).unwrap();

        assert_eq!(state.phase, Phase::Drawing);
        assert_eq!(state.time_remaining, 60);
        assert_eq!(ctrl.current_word(), Some("dog"));
        assert_eq!(bc.direct.len(), 1);
    }

    #[test]
    fn tick_ends_round_at_zero() {
        let mut state = GameState::default();
        state.phase = Phase::Drawing;
        state.time_remaining = 1;
        state.settings.game_mode = GameMode::Ffa;

        let mut ctrl = controller();
        ctrl.current_word = Some("cat".to_string());
        let mut history = StrokeHistory::default();
        let mut bc = RecordingBroadcaster::default();
        let mut rng = StepRng::new(0, 1);

        ctrl.tick(&mut state, &mut history, &mut bc, &mut rng);

        assert_eq!(state.time_remaining, 0);
        assert_eq!(state.phase, Phase::RoundEnd);
    }

    #[test]
    fn process_guess_case_and_whitespace_insensitive() {
        let mut state = GameState::default();
        state.phase = Phase::Drawing;
        state.settings.game_mode = GameMode::Ffa;
        let guesser = add_player(&mut state, false);
        roster::init_ffa(&mut state);

        let mut ctrl = controller();
        ctrl.current_word = Some("Pizza".to_string());
        let mut history = StrokeHistory::default();
        let mut bc = RecordingBroadcaster::default();
        let mut rng = StepRng::new(0, 1);

        ctrl.process_guess(
            &mut state,
            &mut history,
            &mut bc,
            &mut rng,
            guesser,
            "tester".to_string(),
            "  PIZZA  ".to_string(),
        );

        assert!(state.guesses.last().unwrap().is_correct);
        assert_eq!(state.guesses.last().unwrap().text, "\u{2713} Correct!");
        assert_eq!(state.phase, Phase::RoundEnd);
    }

    #[test]
    fn sudden_death_win_clears_flag_and_sets_winner() {
        let mut state = GameState::default();
        let winner = add_player(&mut state, true);
        state.is_sudden_death = true;

        let mut ctrl = controller();
        let mut bc = RecordingBroadcaster::default();
        ctrl.end_sudden_death_win(&mut state, &mut bc, winner);

        assert!(!state.is_sudden_death);
        assert_eq!(state.winner_session_ids, vec![winner]);
        assert_eq!(state.phase, Phase::GameOver);
    }
}
