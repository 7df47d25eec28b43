//! Viewer-relative view of a settled round
//!
//! A [`RoundResult`] is keyed by the server's fixed slots. The view turns it
//! around so the viewer's current player is always on the `current` side.

use std::cmp::Ordering;

use crate::ws::protocol::{BattleAction, ParticipantDelta, ParticipantState, RoundResult, Slot};

/// How a round went for the viewer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundVerdict {
    Win,
    Lose,
    Tie,
}

/// One participant's part in a settled round
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundSide {
    pub player_id: String,
    pub username: String,
    pub action: Option<BattleAction>,
    pub delta: ParticipantDelta,
    pub exploded: bool,
}

/// A settled round seen from the viewer's side
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoundView {
    pub round: u32,
    pub current: RoundSide,
    pub opponent: RoundSide,
    /// The round ended in an explosion
    pub exploded: bool,
}

impl RoundView {
    /// Orient `result` toward `current`.
    ///
    /// The recorded actions decide which slot belongs to the current player;
    /// `current_slot` is used when neither action names them.
    pub fn resolve(
        result: &RoundResult,
        current_slot: Slot,
        current: Option<&ParticipantState>,
        opponent: Option<&ParticipantState>,
    ) -> Self {
        let current_id = current.map(|p| p.player_id.as_str()).unwrap_or_default();
        let acted_by = |action: &Option<BattleAction>| {
            !current_id.is_empty()
                && action
                    .as_ref()
                    .is_some_and(|action| action.player_id == current_id)
        };

        let slot = if acted_by(&result.player1_action) {
            Slot::A
        } else if acted_by(&result.player2_action) {
            Slot::B
        } else {
            current_slot
        };

        let exploded_players = result.results.exploded_players.as_deref().unwrap_or_default();
        let side = |slot: Slot, participant: Option<&ParticipantState>| {
            let (action, delta) = match slot {
                Slot::A => (&result.player1_action, result.results.player1),
                Slot::B => (&result.player2_action, result.results.player2),
            };
            let player_id = participant
                .map(|p| p.player_id.clone())
                .filter(|id| !id.is_empty())
                .or_else(|| action.as_ref().map(|a| a.player_id.clone()))
                .unwrap_or_default();
            RoundSide {
                exploded: !player_id.is_empty() && exploded_players.contains(&player_id),
                username: participant.map(|p| p.username.clone()).unwrap_or_default(),
                action: action.clone(),
                delta,
                player_id,
            }
        };

        Self {
            round: result.round,
            current: side(slot, current),
            opponent: side(slot.other(), opponent),
            exploded: result.results.exploded.unwrap_or(false),
        }
    }

    /// Explosions decide first, then health lost, then energy gained
    pub fn verdict(&self) -> RoundVerdict {
        if self.exploded {
            return match (self.current.exploded, self.opponent.exploded) {
                (false, true) => RoundVerdict::Win,
                (true, _) => RoundVerdict::Lose,
                (false, false) => RoundVerdict::Tie,
            };
        }

        let mine = self.current.delta.health_change;
        let theirs = self.opponent.delta.health_change;
        match (mine < 0, theirs < 0) {
            (true, true) => match mine.abs().cmp(&theirs.abs()) {
                Ordering::Greater => RoundVerdict::Lose,
                Ordering::Less => RoundVerdict::Win,
                Ordering::Equal => RoundVerdict::Tie,
            },
            (true, false) => RoundVerdict::Lose,
            (false, true) => RoundVerdict::Win,
            (false, false) => match self
                .current
                .delta
                .energy_change
                .cmp(&self.opponent.delta.energy_change)
            {
                Ordering::Greater => RoundVerdict::Win,
                Ordering::Less => RoundVerdict::Lose,
                Ordering::Equal => RoundVerdict::Tie,
            },
        }
    }
}
