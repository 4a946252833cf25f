//! Component C: Score Controller.
//!
//! The rounds-mode tie-break for teams is strict-greater, which implicitly
//! favors the lowest team index (the scan stops at the first `>`); this
//! matches the distilled source and is intentional (§9 design notes), not
//! an oversight.

use crate::room::state::{GameMode, GameState, SessionId, WinMode};

pub fn award_point(state: &mut GameState, team_index: i32) {
    if let Some(team) = state.teams.get_mut(team_index as usize) {
        team.score += 1;
    }
}

pub fn award_player_point(state: &mut GameState, session_id: SessionId) {
    *state.player_scores.entry(session_id).or_insert(0) += 1;
}

/// Teams win condition. Points mode: lowest-index team with
/// `score >= target_score`, else -1. Rounds mode: once `current_round >=
/// total_rounds`, the strictly-highest scoring team (ties broken toward the
/// lowest index), else -1.
pub fn check_win_condition(state: &GameState) -> i32 {
    match state.settings.win_mode {
        WinMode::Points => state
            .teams
            .iter()
            .position(|t| t.score >= state.settings.target_score)
            .map(|i| i as i32)
            .unwrap_or(-1),
        WinMode::Rounds => {
            if state.current_round < state.settings.total_rounds {
                return -1;
            }
            let mut best_index = -1i32;
            let mut best_score = 0u32;
            for (i, team) in state.teams.iter().enumerate() {
                if team.score > best_score || best_index == -1 {
                    best_score = team.score;
                    best_index = i as i32;
                }
            }
            best_index
        }
    }
}

/// FFA win condition. Returns every sessionId tied at the max score, or
/// empty if no one has won yet (points not yet reached / rounds not yet
/// elapsed / max score is zero).
pub fn check_ffa_win_condition(state: &GameState) -> Vec<SessionId> {
    let max_score = state.player_scores.values().copied().max().unwrap_or(0);

    match state.settings.win_mode {
        WinMode::Points => {
            if max_score < state.settings.target_score {
                return Vec::new();
            }
        }
        WinMode::Rounds => {
            if state.current_round < state.settings.total_rounds {
                return Vec::new();
            }
        }
    }

    if max_score == 0 {
        return Vec::new();
    }

    let mut winners: Vec<SessionId> = state
        .player_scores
        .iter()
        .filter(|(_, &score)| score == max_score)
        .map(|(&id, _)| id)
        .collect();
    winners.sort();
    winners
}

pub fn reset_team_scores(state: &mut GameState) {
    for team in &mut state.teams {
        team.score = 0;
    }
}

pub fn reset_player_scores(state: &mut GameState) {
    state.player_scores.clear();
}

pub fn reset_all(state: &mut GameState) {
    match state.settings.game_mode {
        GameMode::Teams => reset_team_scores(state),
        GameMode::Ffa => reset_player_scores(state),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::state::Team;

    fn team(score: u32) -> Team {
        let mut t = Team::from_preset(0);
        t.score = score;
        t
    }

    #[test]
    fn points_mode_returns_lowest_index_at_target() {
        let mut state = GameState::default();
        state.settings.target_score = 2;
        state.teams = vec![team(1), team(2), team(2)];
        assert_eq!(check_win_condition(&state), 1);
    }

    #[test]
    fn points_mode_returns_none_below_target() {
        let mut state = GameState::default();
        state.settings.target_score = 10;
        state.teams = vec![team(1), team(2)];
        assert_eq!(check_win_condition(&state), -1);
    }

    #[test]
    fn rounds_mode_ties_broken_to_lowest_index() {
        let mut state = GameState::default();
        state.settings.win_mode = WinMode::Rounds;
        state.settings.total_rounds = 3;
        state.current_round = 3;
        state.teams = vec![team(2), team(2), team(1)];
        assert_eq!(check_win_condition(&state), 0);
    }

    #[test]
    fn rounds_mode_not_yet_finished() {
        let mut state = GameState::default();
        state.settings.win_mode = WinMode::Rounds;
        state.settings.total_rounds = 5;
        state.current_round = 2;
        state.teams = vec![team(9)];
        assert_eq!(check_win_condition(&state), -1);
    }

    #[test]
    fn ffa_tie_returns_all_tied_winners() {
        let mut state = GameState::default();
        state.settings.game_mode = GameMode::Ffa;
        state.settings.target_score = 1;
        let a = uuid::Uuid::new_v4();
        let b = uuid::Uuid::new_v4();
        let c = uuid::Uuid::new_v4();
        state.player_scores.insert(a, 1);
        state.player_scores.insert(b, 1);
        state.player_scores.insert(c, 0);
        let mut winners = check_ffa_win_condition(&state);
        winners.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(winners, expected);
    }

    #[test]
    fn ffa_zero_score_never_wins() {
        let state = GameState::default();
        assert!(check_ffa_win_condition(&state).is_empty());
    }
}
