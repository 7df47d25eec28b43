//! Match state store
//!
//! Holds the latest authoritative snapshot, resolves the viewer's perspective
//! and owns the local action selection. Every transition is driven by an
//! inbound event or an explicit player intent; nothing here runs on a timer.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::store::identity::ViewerIdentity;
use crate::util::time::action_timestamp;
use crate::ws::protocol::{
    ActiveActionName, BattleAction, MatchOverResult, MatchState, ParticipantJoined,
    ParticipantLeft, ParticipantState, PassiveObject, RoundPhase, RoundResult, Slot,
};
use crate::ws::IntentSink;

use super::round::RoundView;
use super::rules::{self, ActionOption};
use super::selection::ActionSelection;

/// Lifecycle of the room as seen by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomStatus {
    Connecting,
    Waiting,
    Ready,
    Playing,
    Finished,
}

/// Transport health as surfaced to the presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Disconnected { reason: String },
    /// Reconnection exhausted; stays here until the viewer retries
    Failed,
}

/// Outcome of applying an inbound snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateUpdate {
    Applied { round_advanced: bool },
    /// Older round for the same match, dropped
    Stale,
}

/// Inputs to the derived action-selector visibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SelectorGate {
    pub playing: bool,
    pub action_phase: bool,
    /// The viewer already committed an action this round
    pub committed: bool,
}

impl SelectorGate {
    pub fn is_open(&self) -> bool {
        self.playing && self.action_phase && !self.committed
    }
}

/// Local submit rejections. Never produce transport traffic.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectionError {
    #[error("An action was already submitted this round")]
    AlreadySubmitted,

    #[error("Selection is incomplete")]
    Incomplete,

    #[error("No current player resolved for the viewer")]
    NoViewer,
}

/// Canonical match state for one session
pub struct MatchStore {
    viewer: ViewerIdentity,
    intents: Arc<dyn IntentSink>,

    match_id: Option<String>,
    room_status: RoomStatus,
    connection: ConnectionStatus,
    state: Option<MatchState>,

    /// Slot of the viewer's current player in the latest snapshot
    current_slot: Slot,
    /// Participant id last resolved as the current player
    anchor_id: Option<String>,
    /// An action phase was seen for this match id
    started: bool,

    selection: ActionSelection,
    submitted: Option<BattleAction>,

    round_history: Vec<RoundResult>,
    outcome: Option<MatchOverResult>,
}

impl MatchStore {
    pub fn new(viewer: ViewerIdentity, intents: Arc<dyn IntentSink>) -> Self {
        Self {
            viewer,
            intents,
            match_id: None,
            room_status: RoomStatus::Connecting,
            connection: ConnectionStatus::Connecting,
            state: None,
            current_slot: Slot::A,
            anchor_id: None,
            started: false,
            selection: ActionSelection::new(),
            submitted: None,
            round_history: Vec::new(),
            outcome: None,
        }
    }

    /// Start a session bound to `match_id`
    pub fn begin(&mut self, match_id: &str) {
        self.reset();
        self.match_id = Some(match_id.to_string());
        info!(match_id = %match_id, "Match session started");
    }

    /// Transport connect resolved
    pub fn transport_opened(&mut self) {
        self.connection = ConnectionStatus::Connected;
        if self.room_status == RoomStatus::Connecting {
            self.set_room_status(RoomStatus::Waiting);
        }
    }

    pub fn set_connection(&mut self, status: ConnectionStatus) {
        if self.connection != status {
            info!(from = ?self.connection, to = ?status, "Connection status changed");
            self.connection = status;
        }
    }

    /// Replace the snapshot. The pending selection survives unless the round advances.
    pub fn apply_state(&mut self, state: MatchState) -> StateUpdate {
        if let Some(previous) = &self.state {
            if previous.match_id == state.match_id && state.current_round < previous.current_round
            {
                warn!(
                    match_id = %state.match_id,
                    round = state.current_round,
                    latest = previous.current_round,
                    "Dropping stale match state"
                );
                return StateUpdate::Stale;
            }
        }

        let fresh_match = self
            .match_id
            .as_deref()
            .map_or(true, |id| id != state.match_id)
            || self
                .state
                .as_ref()
                .is_some_and(|previous| previous.match_id != state.match_id);

        if fresh_match {
            if self.match_id.is_some() {
                info!(match_id = %state.match_id, "New match id, starting fresh");
            }
            self.start_fresh_match(&state.match_id);
        }

        let round_advanced = self
            .state
            .as_ref()
            .is_some_and(|previous| state.current_round > previous.current_round);
        if round_advanced {
            debug!(round = state.current_round, "Round advanced, clearing selection");
            self.selection.clear();
            self.submitted = None;
        }

        let (slot, matched) = self.resolve_slot(&state);
        self.current_slot = slot;
        // A slot-A fallback never overwrites an established anchor
        let current_id = &state.slot(slot).player_id;
        if !current_id.is_empty() && (matched || self.anchor_id.is_none()) {
            self.anchor_id = Some(current_id.clone());
        }

        if state.round_phase == RoundPhase::Action {
            self.started = true;
        }

        let next_status = match self.room_status {
            RoomStatus::Finished => RoomStatus::Finished,
            _ if state.round_phase == RoundPhase::Action => RoomStatus::Playing,
            RoomStatus::Playing => RoomStatus::Playing,
            _ if state.both_connected() && self.started => RoomStatus::Playing,
            _ if state.both_connected() => RoomStatus::Ready,
            _ => RoomStatus::Waiting,
        };
        self.set_room_status(next_status);
        self.set_connection(ConnectionStatus::Connected);

        self.state = Some(state);
        StateUpdate::Applied { round_advanced }
    }

    /// Append a settled round; exact redeliveries are ignored
    pub fn record_round_result(&mut self, result: RoundResult) -> bool {
        if self.round_history.last() == Some(&result) {
            debug!(round = result.round, "Duplicate round result ignored");
            return false;
        }
        info!(round = result.round, "Round result received");
        self.round_history.push(result);
        true
    }

    /// Terminal match result; returns false for a repeated delivery
    pub fn finish(&mut self, result: MatchOverResult) -> bool {
        if self.outcome.as_ref() == Some(&result) {
            debug!(winner = %result.winner, "Duplicate match over ignored");
            return false;
        }
        info!(winner = %result.winner, reason = ?result.reason, "Match over");
        self.outcome = Some(result);
        self.set_room_status(RoomStatus::Finished);
        true
    }

    pub fn participant_joined(&mut self, joined: &ParticipantJoined) {
        info!(player_id = %joined.player_id, username = %joined.username, "Participant joined");
    }

    pub fn participant_left(&mut self, left: &ParticipantLeft) {
        info!(player_id = %left.player_id, "Participant left");
        if self.room_status != RoomStatus::Finished {
            self.set_room_status(RoomStatus::Waiting);
        }
    }

    /// Clear everything for a new session
    pub fn reset(&mut self) {
        self.match_id = None;
        self.room_status = RoomStatus::Connecting;
        self.connection = ConnectionStatus::Connecting;
        self.state = None;
        self.current_slot = Slot::A;
        self.anchor_id = None;
        self.started = false;
        self.selection.clear();
        self.submitted = None;
        self.round_history.clear();
        self.outcome = None;
    }

    pub fn ready(&self) {
        self.intents.send_ready();
    }

    pub fn select_passive(&mut self, object: PassiveObject) {
        if self.is_locked() {
            debug!(?object, "Selection locked after submit");
            return;
        }
        self.selection.select_passive(object);
    }

    pub fn select_active(&mut self, name: ActiveActionName) {
        if self.is_locked() {
            debug!(?name, "Selection locked after submit");
            return;
        }
        self.selection.select_active(name);
    }

    pub fn remove_active(&mut self, name: ActiveActionName) -> bool {
        if self.is_locked() {
            return false;
        }
        self.selection.remove_active(name)
    }

    pub fn clear_selection(&mut self) {
        if !self.is_locked() {
            self.selection.clear();
        }
    }

    pub fn can_submit(&self) -> bool {
        !self.is_locked() && self.selection.can_submit()
    }

    /// Freeze the selection and hand it to the transport.
    ///
    /// Energy is not checked here; the server settles the round.
    pub fn submit(&mut self) -> Result<BattleAction, SelectionError> {
        if self.is_locked() {
            warn!("Submit rejected, action already submitted");
            return Err(SelectionError::AlreadySubmitted);
        }

        let Some(payload) = self
            .selection
            .pending()
            .filter(|pending| pending.is_complete())
            .map(|pending| pending.to_payload())
        else {
            warn!(pending = ?self.selection.pending(), "Submit rejected, selection incomplete");
            return Err(SelectionError::Incomplete);
        };

        let Some(player_id) = self
            .current_player()
            .map(|player| player.player_id.clone())
            .filter(|id| !id.is_empty())
        else {
            warn!("Submit rejected, no current player");
            return Err(SelectionError::NoViewer);
        };

        let action = BattleAction {
            payload,
            player_id,
            timestamp: action_timestamp(),
        };

        info!(
            player_id = %action.player_id,
            round = self.state.as_ref().map(|s| s.current_round),
            "Submitting action"
        );
        self.intents.send_action(&action);
        self.submitted = Some(action.clone());
        Ok(action)
    }

    pub fn selector_gate(&self) -> SelectorGate {
        let Some(state) = &self.state else {
            return SelectorGate::default();
        };
        let committed = self.submitted.is_some()
            || self
                .current_player()
                .is_some_and(|player| player.current_action.is_some());

        SelectorGate {
            playing: self.room_status == RoomStatus::Playing,
            action_phase: state.round_phase == RoundPhase::Action,
            committed,
        }
    }

    /// Whether `option` should be greyed out for the current player
    pub fn option_disabled(&self, option: ActionOption) -> bool {
        let energy = self.current_player().map_or(0, |player| player.energy);
        rules::option_disabled(
            option,
            energy,
            self.selection.pending(),
            self.submitted.is_some(),
        )
    }

    pub fn match_id(&self) -> Option<&str> {
        self.match_id.as_deref()
    }

    pub fn room_status(&self) -> RoomStatus {
        self.room_status
    }

    pub fn connection_status(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn state(&self) -> Option<&MatchState> {
        self.state.as_ref()
    }

    pub fn current_slot(&self) -> Slot {
        self.current_slot
    }

    pub fn current_player(&self) -> Option<&ParticipantState> {
        self.state.as_ref().map(|s| s.slot(self.current_slot))
    }

    pub fn opponent(&self) -> Option<&ParticipantState> {
        self.state.as_ref().map(|s| s.slot(self.current_slot.other()))
    }

    pub fn selection(&self) -> &ActionSelection {
        &self.selection
    }

    /// Action submitted this round, readable until the round advances
    pub fn submitted(&self) -> Option<&BattleAction> {
        self.submitted.as_ref()
    }

    pub fn round_history(&self) -> &[RoundResult] {
        &self.round_history
    }

    pub fn outcome(&self) -> Option<&MatchOverResult> {
        self.outcome.as_ref()
    }

    /// `result` oriented toward the current player
    pub fn round_view(&self, result: &RoundResult) -> RoundView {
        RoundView::resolve(
            result,
            self.current_slot,
            self.current_player(),
            self.opponent(),
        )
    }

    pub fn last_round_view(&self) -> Option<RoundView> {
        self.round_history.last().map(|result| self.round_view(result))
    }

    fn is_locked(&self) -> bool {
        self.submitted.is_some()
    }

    /// Viewer id first, then the previously resolved participant, then slot A.
    /// The flag is false for the slot-A fallback.
    fn resolve_slot(&self, state: &MatchState) -> (Slot, bool) {
        let viewer_id = self.viewer.user_id();
        state
            .slot_of(&viewer_id)
            .or_else(|| self.anchor_id.as_deref().and_then(|id| state.slot_of(id)))
            .map_or((Slot::A, false), |slot| (slot, true))
    }

    fn start_fresh_match(&mut self, match_id: &str) {
        self.match_id = Some(match_id.to_string());
        self.state = None;
        self.anchor_id = None;
        self.started = false;
        self.current_slot = Slot::A;
        self.selection.clear();
        self.submitted = None;
        self.round_history.clear();
        self.outcome = None;
        if self.room_status == RoomStatus::Finished {
            self.room_status = RoomStatus::Waiting;
        }
    }

    fn set_room_status(&mut self, status: RoomStatus) {
        if self.room_status != status {
            info!(
                match_id = ?self.match_id,
                from = ?self.room_status,
                to = ?status,
                "Room status changed"
            );
            self.room_status = status;
        }
    }
}

#[cfg(test)]
mod tests {
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::fixtures;
    use crate::game::round::RoundVerdict;
    use crate::store::identity::ViewerProfile;
    use crate::ws::protocol::ActionPayload;

    #[derive(Default)]
    struct RecordingSink {
        actions: Mutex<Vec<BattleAction>>,
        readies: AtomicUsize,
    }

    impl IntentSink for RecordingSink {
        fn send_action(&self, action: &BattleAction) {
            self.actions.lock().push(action.clone());
        }

        fn send_ready(&self) {
            self.readies.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn store_for(viewer_id: &str, viewer_name: &str) -> (MatchStore, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::default());
        let viewer = ViewerIdentity::new(ViewerProfile::new(viewer_id, viewer_name));
        let mut store = MatchStore::new(viewer, sink.clone());
        store.begin("room-1");
        store.transport_opened();
        (store, sink)
    }

    fn swapped(mut state: MatchState) -> MatchState {
        std::mem::swap(&mut state.player1, &mut state.player2);
        state
    }

    #[test]
    fn round_number_never_decreases() {
        let (mut store, _) = store_for("u1", "alice");
        store.apply_state(fixtures::match_state("room-1", 3, RoundPhase::Action));

        let stale = store.apply_state(fixtures::match_state("room-1", 2, RoundPhase::Action));
        assert_eq!(stale, StateUpdate::Stale);
        assert_eq!(store.state().map(|s| s.current_round), Some(3));

        let same = store.apply_state(fixtures::match_state("room-1", 3, RoundPhase::Result));
        assert_eq!(same, StateUpdate::Applied { round_advanced: false });
    }

    #[test]
    fn perspective_survives_slot_swap() {
        let (mut store, _) = store_for("u2", "bob");
        let state = fixtures::match_state("room-1", 1, RoundPhase::Action);
        store.apply_state(state.clone());
        assert_eq!(store.current_player().map(|p| p.username.as_str()), Some("bob"));
        assert_eq!(store.opponent().map(|p| p.username.as_str()), Some("alice"));

        let mut next = swapped(state);
        next.current_round = 2;
        store.apply_state(next);
        assert_eq!(store.current_slot(), Slot::A);
        assert_eq!(store.current_player().map(|p| p.username.as_str()), Some("bob"));
    }

    #[test]
    fn unknown_viewer_falls_back_to_slot_a_then_anchors() {
        let (mut store, _) = store_for("", "");
        let state = fixtures::match_state("room-1", 1, RoundPhase::Waiting);
        store.apply_state(state.clone());
        assert_eq!(store.current_player().map(|p| p.player_id.as_str()), Some("u1"));

        store.apply_state(swapped(state));
        assert_eq!(store.current_slot(), Slot::B);
        assert_eq!(store.current_player().map(|p| p.player_id.as_str()), Some("u1"));
    }

    #[test]
    fn unmatched_snapshot_keeps_the_anchor() {
        let (mut store, _) = store_for("", "");
        let state = fixtures::match_state("room-1", 1, RoundPhase::Waiting);
        store.apply_state(state.clone());
        assert_eq!(store.current_player().map(|p| p.player_id.as_str()), Some("u1"));

        let mut strangers = state.clone();
        strangers.player1.player_id = "x".to_string();
        strangers.player2.player_id = "y".to_string();
        store.apply_state(strangers);
        assert_eq!(store.current_slot(), Slot::A);

        store.apply_state(swapped(state));
        assert_eq!(store.current_slot(), Slot::B);
        assert_eq!(store.current_player().map(|p| p.player_id.as_str()), Some("u1"));
    }

    #[test]
    fn started_match_resumes_playing_after_rejoin() {
        let (mut store, _) = store_for("u1", "alice");
        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Action));
        store.participant_left(&ParticipantLeft {
            player_id: "u2".to_string(),
        });
        assert_eq!(store.room_status(), RoomStatus::Waiting);

        let mut alone = fixtures::match_state("room-1", 1, RoundPhase::Result);
        alone.player2.is_connected = false;
        store.apply_state(alone);
        assert_eq!(store.room_status(), RoomStatus::Waiting);

        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Result));
        assert_eq!(store.room_status(), RoomStatus::Playing);
    }

    #[test]
    fn room_status_follows_events() {
        let sink = Arc::new(RecordingSink::default());
        let viewer = ViewerIdentity::new(ViewerProfile::new("u1", "alice"));
        let mut store = MatchStore::new(viewer, sink);
        store.begin("room-1");
        assert_eq!(store.room_status(), RoomStatus::Connecting);

        store.transport_opened();
        assert_eq!(store.room_status(), RoomStatus::Waiting);

        let mut lonely = fixtures::match_state("room-1", 0, RoundPhase::Waiting);
        lonely.player2.is_connected = false;
        store.apply_state(lonely);
        assert_eq!(store.room_status(), RoomStatus::Waiting);

        store.apply_state(fixtures::match_state("room-1", 0, RoundPhase::Waiting));
        assert_eq!(store.room_status(), RoomStatus::Ready);

        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Action));
        assert_eq!(store.room_status(), RoomStatus::Playing);

        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Result));
        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Finished));
        assert_eq!(store.room_status(), RoomStatus::Playing);

        assert!(store.finish(fixtures::match_over("alice")));
        assert!(!store.finish(fixtures::match_over("alice")));
        store.participant_left(&ParticipantLeft {
            player_id: "u2".to_string(),
        });
        store.apply_state(fixtures::match_state("room-1", 2, RoundPhase::Action));
        assert_eq!(store.room_status(), RoomStatus::Finished);
    }

    #[test]
    fn participant_left_drops_to_waiting() {
        let (mut store, _) = store_for("u1", "alice");
        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Action));
        store.participant_left(&ParticipantLeft {
            player_id: "u2".to_string(),
        });
        assert_eq!(store.room_status(), RoomStatus::Waiting);
    }

    #[test]
    fn submit_sends_once_and_locks_until_next_round() {
        let (mut store, sink) = store_for("u1", "alice");
        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Action));
        assert!(store.selector_gate().is_open());

        store.select_active(ActiveActionName::Sa);
        let action = store.submit().unwrap();
        assert_eq!(action.player_id, "u1");
        assert_eq!(
            action.payload,
            ActionPayload::Active {
                actions: vec![ActiveActionName::Sa]
            }
        );
        assert!(store.selector_gate().committed);

        store.select_passive(PassiveObject::Cake);
        assert_eq!(store.submit(), Err(SelectionError::AlreadySubmitted));
        assert_eq!(sink.actions.lock().len(), 1);
        assert!(store.submitted().is_some());

        store.apply_state(fixtures::match_state("room-1", 2, RoundPhase::Action));
        assert!(store.submitted().is_none());
        assert!(store.selection().pending().is_none());
        assert!(store.selector_gate().is_open());
    }

    #[test]
    fn pending_selection_survives_same_round_update() {
        let (mut store, _) = store_for("u1", "alice");
        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Action));
        store.select_passive(PassiveObject::ActionDefense);
        store.select_active(ActiveActionName::Tin);

        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Action));
        assert_eq!(store.selection().count_of(ActiveActionName::Tin), 1);
    }

    #[test]
    fn incomplete_selection_produces_no_traffic() {
        let (mut store, sink) = store_for("u1", "alice");
        store.apply_state(fixtures::match_state("room-1", 1, RoundPhase::Action));

        assert_eq!(store.submit(), Err(SelectionError::Incomplete));
        store.select_passive(PassiveObject::ObjectDefense);
        assert!(!store.can_submit());
        assert_eq!(store.submit(), Err(SelectionError::Incomplete));
        assert!(sink.actions.lock().is_empty());
    }

    #[test]
    fn submit_without_snapshot_has_no_player() {
        let (mut store, sink) = store_for("u1", "alice");
        store.select_passive(PassiveObject::Cake);
        assert_eq!(store.submit(), Err(SelectionError::NoViewer));
        assert!(sink.actions.lock().is_empty());
    }

    #[test]
    fn zero_energy_greys_out_but_still_submits() {
        let (mut store, sink) = store_for("u1", "alice");
        let mut state = fixtures::match_state("room-1", 1, RoundPhase::Action);
        state.player1.energy = 0;
        store.apply_state(state);

        let sa = ActionOption::Active(ActiveActionName::Sa);
        assert!(store.option_disabled(sa));

        store.select_active(ActiveActionName::Sa);
        assert!(store.submit().is_ok());
        assert_eq!(sink.actions.lock().len(), 1);
    }

    #[test]
    fn server_committed_action_closes_gate() {
        let (mut store, _) = store_for("u1", "alice");
        let mut state = fixtures::match_state("room-1", 1, RoundPhase::Action);
        state.player1.current_action = Some(BattleAction {
            payload: ActionPayload::Active {
                actions: vec![ActiveActionName::Tin],
            },
            player_id: "u1".to_string(),
            timestamp: 1,
        });
        store.apply_state(state);
        assert!(!store.selector_gate().is_open());
    }

    #[test]
    fn new_match_id_starts_fresh() {
        let (mut store, _) = store_for("u1", "alice");
        store.apply_state(fixtures::match_state("room-1", 4, RoundPhase::Action));
        store.record_round_result(fixtures::round_result(3));
        store.finish(fixtures::match_over("bob"));

        let update = store.apply_state(fixtures::match_state("room-2", 1, RoundPhase::Waiting));
        assert_eq!(update, StateUpdate::Applied { round_advanced: false });
        assert_eq!(store.match_id(), Some("room-2"));
        assert!(store.round_history().is_empty());
        assert!(store.outcome().is_none());
        assert_eq!(store.room_status(), RoomStatus::Ready);
    }

    #[test]
    fn duplicate_round_result_is_not_appended() {
        let (mut store, _) = store_for("u1", "alice");
        assert!(store.record_round_result(fixtures::round_result(1)));
        assert!(!store.record_round_result(fixtures::round_result(1)));
        assert!(store.record_round_result(fixtures::round_result(2)));
        assert_eq!(store.round_history().len(), 2);
    }

    #[test]
    fn round_view_follows_the_anchored_player() {
        let (mut store, _) = store_for("u2", "bob");
        store.apply_state(swapped(fixtures::match_state("room-1", 1, RoundPhase::Result)));
        assert!(store.last_round_view().is_none());

        // bob sits in slot A now and took no damage; alice lost one
        let mut result = fixtures::round_result(1);
        result.results.player1.health_change = 0;
        result.results.player2.health_change = -1;
        store.record_round_result(result);

        let view = store.last_round_view().expect("round recorded");
        assert_eq!(view.current.username, "bob");
        assert_eq!(view.opponent.username, "alice");
        assert_eq!(view.verdict(), RoundVerdict::Win);
    }

    #[test]
    fn ready_is_forwarded() {
        let (store, sink) = store_for("u1", "alice");
        store.ready();
        assert_eq!(sink.readies.load(Ordering::SeqCst), 1);
    }
}
