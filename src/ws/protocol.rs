//! WebSocket protocol message definitions
//! These are the wire types for client-server communication

use serde::{Deserialize, Serialize};

/// Combinable attack actions. A round may repeat the same action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActiveActionName {
    Sa,
    Tin,
    NanMan,
    DaShan,
    WanJian,
    Nuclear,
}

impl ActiveActionName {
    pub const ALL: [ActiveActionName; 6] = [
        Self::Sa,
        Self::Tin,
        Self::NanMan,
        Self::DaShan,
        Self::WanJian,
        Self::Nuclear,
    ];
}

/// Non-combinable basic objects, including the two special defenses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PassiveObject {
    Cake,
    Pouch,
    BasicShield,
    BasicDefense,
    /// Defends one chosen attack type
    #[serde(rename = "object_defense")]
    ObjectDefense,
    /// Defends a combination of two or more attacks
    #[serde(rename = "action_defense")]
    ActionDefense,
}

impl PassiveObject {
    /// Plain passives, no sub-selection required
    pub const PLAIN: [PassiveObject; 4] = [
        Self::Cake,
        Self::Pouch,
        Self::BasicShield,
        Self::BasicDefense,
    ];

    /// Special defenses that need extra picks before they can be submitted
    pub const SPECIAL: [PassiveObject; 2] = [Self::ObjectDefense, Self::ActionDefense];

    pub fn defense_kind(self) -> Option<DefenseKind> {
        match self {
            Self::ObjectDefense => Some(DefenseKind::Target),
            Self::ActionDefense => Some(DefenseKind::Combo),
            _ => None,
        }
    }
}

/// Special-defense sub-type carried on a passive payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefenseKind {
    /// Needs exactly one target
    #[serde(rename = "object_defense")]
    Target,
    /// Needs at least two attacks
    #[serde(rename = "action_defense")]
    Combo,
}

/// Frozen passive action as sent to the server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassivePayload {
    pub object_name: PassiveObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub defense_type: Option<DefenseKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_object: Option<ActiveActionName>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_action: Option<Vec<ActiveActionName>>,
}

/// Action body, tagged by category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "actionCategory", rename_all = "snake_case")]
pub enum ActionPayload {
    Passive(PassivePayload),
    Active { actions: Vec<ActiveActionName> },
}

/// A committed action for one round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BattleAction {
    #[serde(rename = "type")]
    pub payload: ActionPayload,
    pub player_id: String,
    /// Unix milliseconds at submission
    pub timestamp: i64,
}

/// Round sub-phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundPhase {
    Waiting,
    /// Selection open
    Action,
    /// Round being settled
    Result,
    Finished,
}

/// Card effect category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardEffectKind {
    Penetrate,
    Develop,
    Reflect,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardRarity {
    Common,
    Rare,
    Legendary,
}

/// Card held by a participant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardState {
    pub card_id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub effect: CardEffectKind,
    pub rarity: CardRarity,
    /// Trigger probability (0.0 - 1.0)
    pub effect_chance: f64,
}

/// One participant slot in a match snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantState {
    pub player_id: String,
    pub username: String,
    pub health: i32,
    pub energy: i32,
    #[serde(default)]
    pub rank: String,
    #[serde(default)]
    pub cards: Vec<CardState>,
    /// Absent until the participant commits for this round
    #[serde(default)]
    pub current_action: Option<BattleAction>,
    #[serde(default)]
    pub is_ready: bool,
    #[serde(default)]
    pub is_connected: bool,
    /// Seconds left in the action phase
    #[serde(default)]
    pub remaining_time: Option<u32>,
    #[serde(default)]
    pub has_acted: bool,
}

/// Fixed slot of a participant, independent of who is viewing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Slot {
    A,
    B,
}

impl Slot {
    pub fn other(self) -> Slot {
        match self {
            Slot::A => Slot::B,
            Slot::B => Slot::A,
        }
    }
}

/// Root snapshot broadcast by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchState {
    #[serde(rename = "roomId")]
    pub match_id: String,
    pub player1: ParticipantState,
    pub player2: ParticipantState,
    pub current_round: u32,
    pub round_phase: RoundPhase,
    /// Seconds left in the current phase
    #[serde(default)]
    pub remaining_time: u32,
    #[serde(default, deserialize_with = "empty_as_none")]
    pub winner: Option<String>,
    #[serde(default)]
    pub is_ready: bool,
}

impl MatchState {
    pub fn slot(&self, slot: Slot) -> &ParticipantState {
        match slot {
            Slot::A => &self.player1,
            Slot::B => &self.player2,
        }
    }

    /// Slot whose participant id equals `player_id`
    pub fn slot_of(&self, player_id: &str) -> Option<Slot> {
        if player_id.is_empty() {
            return None;
        }
        if self.player1.player_id == player_id {
            Some(Slot::A)
        } else if self.player2.player_id == player_id {
            Some(Slot::B)
        } else {
            None
        }
    }

    /// Both slots are filled and report a live transport
    pub fn both_connected(&self) -> bool {
        [&self.player1, &self.player2]
            .iter()
            .all(|p| p.is_connected && !p.player_id.is_empty())
    }
}

/// Health / energy delta for one participant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantDelta {
    pub health_change: i32,
    pub energy_change: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundOutcome {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploded: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exploded_players: Option<Vec<String>>,
    pub player1: ParticipantDelta,
    pub player2: ParticipantDelta,
}

/// Card effect roll during a round
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardEffect {
    pub player_id: String,
    pub card_name: String,
    pub effect_type: CardEffectKind,
    pub triggered: bool,
}

/// Settled round, immutable once received
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub round: u32,
    #[serde(default)]
    pub player1_action: Option<BattleAction>,
    #[serde(default)]
    pub player2_action: Option<BattleAction>,
    pub results: RoundOutcome,
    #[serde(default)]
    pub card_effects: Vec<CardEffect>,
}

/// Why the match ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchEndReason {
    HealthZero,
    Disconnect,
    Surrender,
    #[serde(alias = "timeout")]
    TimeUp,
    #[serde(other)]
    Unknown,
}

/// Optional reward summary attached to a match end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchRewards {
    pub stones: i64,
    #[serde(default)]
    pub rank_change: Option<i64>,
}

/// Terminal result of a match
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchOverResult {
    /// Display name of the winner
    pub winner: String,
    pub reason: MatchEndReason,
    #[serde(default)]
    pub rewards: Option<MatchRewards>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantJoined {
    pub player_id: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantLeft {
    pub player_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Frames sent from server to client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerFrame {
    GameState(MatchState),
    RoundResult(RoundResult),
    GameOver(MatchOverResult),
    PlayerJoined(ParticipantJoined),
    PlayerLeft(ParticipantLeft),
    Error(ErrorPayload),
}

/// Frames sent from client to server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientFrame {
    PlayerAction(BattleAction),
    PlayerReady,
}

fn empty_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.filter(|s| !s.is_empty()))
}
