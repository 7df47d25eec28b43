//! Snapshot builders shared by unit tests

use crate::ws::protocol::{
    MatchEndReason, MatchOverResult, MatchState, ParticipantDelta, ParticipantState, RoundOutcome,
    RoundPhase, RoundResult,
};

pub fn participant(player_id: &str, username: &str) -> ParticipantState {
    ParticipantState {
        player_id: player_id.to_string(),
        username: username.to_string(),
        health: 10,
        energy: 2,
        rank: "Bronze".to_string(),
        cards: Vec::new(),
        current_action: None,
        is_ready: true,
        is_connected: true,
        remaining_time: Some(30),
        has_acted: false,
    }
}

/// Two connected participants, alice (u1) in slot A and bob (u2) in slot B
pub fn match_state(match_id: &str, round: u32, phase: RoundPhase) -> MatchState {
    MatchState {
        match_id: match_id.to_string(),
        player1: participant("u1", "alice"),
        player2: participant("u2", "bob"),
        current_round: round,
        round_phase: phase,
        remaining_time: 30,
        winner: None,
        is_ready: true,
    }
}

pub fn round_result(round: u32) -> RoundResult {
    RoundResult {
        round,
        player1_action: None,
        player2_action: None,
        results: RoundOutcome {
            exploded: None,
            exploded_players: None,
            player1: ParticipantDelta {
                health_change: -1,
                energy_change: 1,
            },
            player2: ParticipantDelta {
                health_change: 0,
                energy_change: -2,
            },
        },
        card_effects: Vec::new(),
    }
}

pub fn match_over(winner: &str) -> MatchOverResult {
    MatchOverResult {
        winner: winner.to_string(),
        reason: MatchEndReason::HealthZero,
        rewards: None,
    }
}
