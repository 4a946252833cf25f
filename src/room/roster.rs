//! Component B: Team / Roster Controller. Free functions operating on a
//! `&mut GameState` borrow (§9: controllers take no back-reference to the
//! Room, so they're trivial to unit test against a bare `GameState`).

use crate::palette;
use crate::room::state::{GameState, Role, SessionId, Team};

/// Replace the teams array with `count` fresh teams from the preset table.
/// Clears queues and scores.
pub fn init_teams(state: &mut GameState, count: usize) {
    state.teams = (0..count).map(Team::from_preset).collect();
}

#[derive(Debug, PartialEq, Eq)]
pub enum JoinTeamError {
    OutOfRange,
}

/// Move `session_id` onto `team_index`'s queue, removing it from any
/// previous team's queue first. Same-team rejoin reorders to the tail.
pub fn join_team(
    state: &mut GameState,
    session_id: SessionId,
    team_index: i32,
) -> Result<(), JoinTeamError> {
    if team_index < 0 || team_index as usize >= state.teams.len() {
        return Err(JoinTeamError::OutOfRange);
    }

    remove_from_current_team(state, session_id);

    if let Some(team) = state.teams.get_mut(team_index as usize) {
        team.drawer_queue.push_back(session_id);
    }
    if let Some(player) = state.players.get_mut(&session_id) {
        player.team_index = team_index;
    }
    Ok(())
}

fn remove_from_current_team(state: &mut GameState, session_id: SessionId) {
    let prev_index = state.players.get(&session_id).map(|p| p.team_index);
    if let Some(idx) = prev_index {
        if idx >= 0 {
            if let Some(team) = state.teams.get_mut(idx as usize) {
                team.drawer_queue.retain(|id| *id != session_id);
            }
        }
    }
    state.ffa_pool.retain(|id| *id != session_id);
}

/// Remove the player from any team queue and mark them a spectator.
pub fn set_spectator(state: &mut GameState, session_id: SessionId) {
    remove_from_current_team(state, session_id);
    if let Some(player) = state.players.get_mut(&session_id) {
        player.team_index = -1;
        player.role = Role::Spectator;
    }
}

/// Round-robin: pop the front of `team_index`'s queue, push it to the tail,
/// return it. `None` if the queue is empty.
pub fn get_next_drawer(state: &mut GameState, team_index: i32) -> Option<SessionId> {
    let team = state.teams.get_mut(team_index as usize)?;
    let next = team.drawer_queue.pop_front()?;
    team.drawer_queue.push_back(next);
    Some(next)
}

/// Teams mode: assign drawer/guesser/opponent/spectator for this round.
pub fn assign_roles(state: &mut GameState, drawer: SessionId, active_team_index: i32) {
    for player in state.players.values_mut() {
        player.role = if player.session_id == drawer {
            Role::Drawer
        } else if player.team_index < 0 {
            Role::Spectator
        } else if player.team_index == active_team_index {
            Role::Guesser
        } else {
            Role::Opponent
        };
    }
}

/// Clear teams and collect every connected player into the FFA pool.
pub fn init_ffa(state: &mut GameState) {
    state.teams.clear();
    state.ffa_pool.clear();
    let ids: Vec<SessionId> = state
        .players
        .values()
        .filter(|p| p.is_connected)
        .map(|p| p.session_id)
        .collect();
    for id in ids {
        if let Some(player) = state.players.get_mut(&id) {
            player.team_index = 0;
        }
        state.ffa_pool.push_back(id);
    }
}

/// FFA: drawer for `drawer`, guesser for everyone else in the pool,
/// spectator otherwise.
pub fn assign_ffa_roles(state: &mut GameState, drawer: SessionId) {
    let pool: std::collections::HashSet<SessionId> = state.ffa_pool.iter().copied().collect();
    for player in state.players.values_mut() {
        player.role = if player.session_id == drawer {
            Role::Drawer
        } else if pool.contains(&player.session_id) {
            Role::Guesser
        } else {
            Role::Spectator
        };
    }
}

/// Round-robin on the FFA pool queue.
pub fn get_next_ffa_drawer(state: &mut GameState) -> Option<SessionId> {
    let next = state.ffa_pool.pop_front()?;
    state.ffa_pool.push_back(next);
    Some(next)
}

/// First connected pool member not in `tied_ids`, queue order; falls back
/// to `tied_ids[0]` if every pool member is tied.
pub fn get_sudden_death_drawer(state: &GameState, tied_ids: &[SessionId]) -> Option<SessionId> {
    for &id in &state.ffa_pool {
        if !tied_ids.contains(&id) {
            if let Some(player) = state.players.get(&id) {
                if player.is_connected {
                    return Some(id);
                }
            }
        }
    }
    tied_ids.first().copied()
}

/// teams mode: at least two teams have ≥1 queued player each. FFA: at
/// least two connected players. `Err(RoomError::StartCondition(reason))`
/// carries the reason to surface back to the host.
pub fn can_start_game(state: &GameState) -> Result<(), crate::error::RoomError> {
    use crate::room::state::GameMode;
    match state.settings.game_mode {
        GameMode::Teams => {
            let teams_with_players = state.teams.iter().filter(|t| !t.drawer_queue.is_empty()).count();
            if teams_with_players >= 2 {
                Ok(())
            } else {
                Err(crate::error::RoomError::StartCondition(
                    "need at least two teams with a player each".to_string(),
                ))
            }
        }
        GameMode::Ffa => {
            if state.connected_player_count() >= 2 {
                Ok(())
            } else {
                Err(crate::error::RoomError::StartCondition(
                    "need at least two players".to_string(),
                ))
            }
        }
    }
}

pub fn handle_disconnect(state: &mut GameState, session_id: SessionId) {
    if let Some(player) = state.players.get_mut(&session_id) {
        player.is_connected = false;
    }
}

pub fn handle_reconnect(state: &mut GameState, session_id: SessionId) {
    if let Some(player) = state.players.get_mut(&session_id) {
        player.is_connected = true;
    }
}

/// Assign the avatar color for the `index`-th player to ever join a room.
pub fn next_avatar_color(index: usize) -> &'static str {
    palette::avatar_color(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::room::state::Player;
    use uuid::Uuid;

    fn add_player(state: &mut GameState, host: bool) -> SessionId {
        let id = Uuid::new_v4();
        state.players.insert(
            id,
            Player::new(id, format!("p-{id}"), "#000", host),
        );
        id
    }

    #[test]
    fn join_team_moves_between_queues() {
        let mut state = GameState::default();
        init_teams(&mut state, 2);
        let p = add_player(&mut state, true);
        join_team(&mut state, p, 0).unwrap();
        assert!(state.teams[0].drawer_queue.contains(&p));
        join_team(&mut state, p, 1).unwrap();
        assert!(!state.teams[0].drawer_queue.contains(&p));
        assert!(state.teams[1].drawer_queue.contains(&p));
        assert_eq!(state.players[&p].team_index, 1);
    }

    #[test]
    fn join_team_out_of_range_rejected() {
        let mut state = GameState::default();
        init_teams(&mut state, 2);
        let p = add_player(&mut state, true);
        assert_eq!(join_team(&mut state, p, 5), Err(JoinTeamError::OutOfRange));
    }

    #[test]
    fn get_next_drawer_round_robins() {
        let mut state = GameState::default();
        init_teams(&mut state, 1);
        let a = add_player(&mut state, true);
        let b = add_player(&mut state, false);
        join_team(&mut state, a, 0).unwrap();
        join_team(&mut state, b, 0).unwrap();
        assert_eq!(get_next_drawer(&mut state, 0), Some(a));
        assert_eq!(get_next_drawer(&mut state, 0), Some(b));
        assert_eq!(get_next_drawer(&mut state, 0), Some(a));
    }

    #[test]
    fn sudden_death_drawer_skips_tied_ids() {
        let mut state = GameState::default();
        let x = add_player(&mut state, true);
        let y = add_player(&mut state, false);
        let z = add_player(&mut state, false);
        init_ffa(&mut state);
        // queue order is insertion order into ffa_pool (join order)
        let tied = vec![x, z];
        let drawer = get_sudden_death_drawer(&state, &tied);
        assert_eq!(drawer, Some(y));
    }

    #[test]
    fn sudden_death_drawer_falls_back_when_all_tied() {
        let mut state = GameState::default();
        let x = add_player(&mut state, true);
        let y = add_player(&mut state, false);
        init_ffa(&mut state);
        let tied = vec![x, y];
        assert_eq!(get_sudden_death_drawer(&state, &tied), Some(x));
    }

    #[test]
    fn can_start_game_ffa_requires_two_players() {
        let mut state = GameState::default();
        state.settings.game_mode = crate::room::state::GameMode::Ffa;
        add_player(&mut state, true);
        assert!(can_start_game(&state).is_err());
        add_player(&mut state, false);
        assert!(can_start_game(&state).is_ok());
    }
}
