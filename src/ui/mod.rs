//! UI orchestration store
//!
//! Presentation-only state: modal visibility, exit animations and the derived
//! action-selector visibility. Timed transitions run as spawned tasks tagged
//! with a generation number; a task whose generation is stale does nothing.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::debug;

use crate::config::UiTimings;
use crate::game::store::SelectorGate;
use crate::ws::protocol::{MatchOverResult, RoundResult};

/// How a modal is being dismissed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HideMode {
    Close,
    /// Leaves a re-show affordance behind
    Temporary,
}

/// Round-result modal lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalPhase {
    Hidden,
    /// Waiting out the show delay
    Scheduled,
    Visible,
    Exiting(HideMode),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorPhase {
    Hidden,
    Visible,
    Exiting,
}

#[derive(Debug)]
struct RoundResultModal {
    phase: ModalPhase,
    /// Result being shown (or about to be)
    current: Option<RoundResult>,
    /// Most recent result, kept regardless of visibility
    last: Option<RoundResult>,
    temporarily_hidden: bool,
    /// Hide requested while the show delay was pending
    queued_hide: Option<HideMode>,
    generation: u64,
}

#[derive(Debug, Default)]
struct GameOverModal {
    visible: bool,
    temporarily_hidden: bool,
    result: Option<MatchOverResult>,
}

#[derive(Debug)]
struct ActionSelector {
    phase: SelectorPhase,
    temporarily_hidden: bool,
    generation: u64,
}

#[derive(Debug)]
struct UiState {
    round_result: RoundResultModal,
    game_over: GameOverModal,
    selector: ActionSelector,
}

impl Default for UiState {
    fn default() -> Self {
        Self {
            round_result: RoundResultModal {
                phase: ModalPhase::Hidden,
                current: None,
                last: None,
                temporarily_hidden: false,
                queued_hide: None,
                generation: 0,
            },
            game_over: GameOverModal::default(),
            selector: ActionSelector {
                phase: SelectorPhase::Hidden,
                temporarily_hidden: false,
                generation: 0,
            },
        }
    }
}

/// Read-only view for rendering
#[derive(Debug, Clone, PartialEq)]
pub struct UiSnapshot {
    pub round_result_phase: ModalPhase,
    pub round_result: Option<RoundResult>,
    pub last_round_result: Option<RoundResult>,
    pub round_result_temporarily_hidden: bool,
    pub game_over_visible: bool,
    pub game_over_temporarily_hidden: bool,
    pub game_over_result: Option<MatchOverResult>,
    pub action_selector: SelectorPhase,
    pub action_selector_temporarily_hidden: bool,
}

impl UiSnapshot {
    pub fn round_result_visible(&self) -> bool {
        matches!(
            self.round_result_phase,
            ModalPhase::Visible | ModalPhase::Exiting(_)
        )
    }

    pub fn action_selector_visible(&self) -> bool {
        self.action_selector != SelectorPhase::Hidden
    }
}

/// Shared handle to the presentation state
#[derive(Clone)]
pub struct UiStore {
    state: Arc<Mutex<UiState>>,
    timings: UiTimings,
}

impl UiStore {
    pub fn new(timings: UiTimings) -> Self {
        Self {
            state: Arc::new(Mutex::new(UiState::default())),
            timings,
        }
    }

    pub fn timings(&self) -> UiTimings {
        self.timings
    }

    pub fn snapshot(&self) -> UiSnapshot {
        let state = self.state.lock();
        UiSnapshot {
            round_result_phase: state.round_result.phase,
            round_result: state.round_result.current.clone(),
            last_round_result: state.round_result.last.clone(),
            round_result_temporarily_hidden: state.round_result.temporarily_hidden,
            game_over_visible: state.game_over.visible,
            game_over_temporarily_hidden: state.game_over.temporarily_hidden,
            game_over_result: state.game_over.result.clone(),
            action_selector: state.selector.phase,
            action_selector_temporarily_hidden: state.selector.temporarily_hidden,
        }
    }

    /// Record a new round result and show it after the round-transition delay
    pub fn on_round_result(&self, result: RoundResult) {
        let generation = {
            let mut state = self.state.lock();
            let modal = &mut state.round_result;
            modal.generation += 1;
            modal.last = Some(result.clone());
            modal.current = Some(result);
            modal.phase = ModalPhase::Scheduled;
            modal.temporarily_hidden = false;
            modal.queued_hide = None;
            modal.generation
        };

        let this = self.clone();
        self.after(self.timings.round_result_delay, move |state| {
            let modal = &mut state.round_result;
            if modal.generation != generation || modal.phase != ModalPhase::Scheduled {
                return;
            }
            debug!(round = ?modal.current.as_ref().map(|r| r.round), "Showing round result");
            modal.phase = ModalPhase::Visible;
            if let Some(mode) = modal.queued_hide.take() {
                this.begin_round_result_exit(state, mode);
            }
        });
    }

    pub fn hide_round_result(&self) {
        self.request_round_result_hide(HideMode::Close);
    }

    pub fn hide_round_result_temporarily(&self) {
        self.request_round_result_hide(HideMode::Temporary);
    }

    /// Re-show the retained result without touching match data
    pub fn show_last_round_result(&self) -> bool {
        let mut state = self.state.lock();
        let modal = &mut state.round_result;
        let Some(last) = modal.last.clone() else {
            return false;
        };
        modal.generation += 1;
        modal.current = Some(last);
        modal.phase = ModalPhase::Visible;
        modal.temporarily_hidden = false;
        modal.queued_hide = None;
        true
    }

    pub fn show_game_over(&self, result: MatchOverResult) {
        let mut state = self.state.lock();
        state.game_over = GameOverModal {
            visible: true,
            temporarily_hidden: false,
            result: Some(result),
        };
    }

    /// Close for good and drop the result
    pub fn hide_game_over(&self) {
        self.state.lock().game_over = GameOverModal::default();
    }

    pub fn hide_game_over_temporarily(&self) {
        let mut state = self.state.lock();
        if state.game_over.visible {
            state.game_over.visible = false;
            state.game_over.temporarily_hidden = true;
        }
    }

    pub fn show_game_over_again(&self) -> bool {
        let mut state = self.state.lock();
        if state.game_over.result.is_none() {
            return false;
        }
        state.game_over.visible = true;
        state.game_over.temporarily_hidden = false;
        true
    }

    /// Recompute selector visibility from the match store
    pub fn refresh_action_selector(&self, gate: SelectorGate) {
        let mut state = self.state.lock();
        let selector = &mut state.selector;
        if selector.phase == SelectorPhase::Exiting {
            return;
        }
        let visible = gate.is_open() && !selector.temporarily_hidden;
        selector.phase = if visible {
            SelectorPhase::Visible
        } else {
            SelectorPhase::Hidden
        };
    }

    pub fn hide_action_selector_temporarily(&self) {
        let generation = {
            let mut state = self.state.lock();
            let selector = &mut state.selector;
            if selector.phase != SelectorPhase::Visible {
                selector.temporarily_hidden = true;
                return;
            }
            selector.generation += 1;
            selector.phase = SelectorPhase::Exiting;
            selector.generation
        };

        self.after(self.timings.exit_animation, move |state| {
            let selector = &mut state.selector;
            if selector.generation == generation && selector.phase == SelectorPhase::Exiting {
                selector.phase = SelectorPhase::Hidden;
                selector.temporarily_hidden = true;
            }
        });
    }

    /// Undo a temporary hide; shows only when the gate allows
    pub fn show_action_selector_again(&self, gate: SelectorGate) -> bool {
        let mut state = self.state.lock();
        let selector = &mut state.selector;
        selector.generation += 1;
        selector.temporarily_hidden = false;
        selector.phase = if gate.is_open() {
            SelectorPhase::Visible
        } else {
            SelectorPhase::Hidden
        };
        selector.phase == SelectorPhase::Visible
    }

    /// A new round began; the viewer's temporary selector hide no longer applies
    pub fn new_round(&self) {
        let mut state = self.state.lock();
        state.selector.temporarily_hidden = false;
        if state.selector.phase == SelectorPhase::Exiting {
            state.selector.generation += 1;
            state.selector.phase = SelectorPhase::Hidden;
        }
    }

    /// Back to initial flags; in-flight timers become no-ops
    pub fn reset(&self) {
        let mut state = self.state.lock();
        let round_generation = state.round_result.generation + 1;
        let selector_generation = state.selector.generation + 1;
        *state = UiState::default();
        state.round_result.generation = round_generation;
        state.selector.generation = selector_generation;
    }

    fn request_round_result_hide(&self, mode: HideMode) {
        let mut state = self.state.lock();
        let phase = state.round_result.phase;
        match phase {
            ModalPhase::Scheduled => {
                debug!(?mode, "Hide queued behind pending show");
                state.round_result.queued_hide = Some(mode);
            }
            ModalPhase::Visible => self.begin_round_result_exit(&mut state, mode),
            ModalPhase::Hidden | ModalPhase::Exiting(_) => {}
        }
    }

    fn begin_round_result_exit(&self, state: &mut UiState, mode: HideMode) {
        let modal = &mut state.round_result;
        modal.generation += 1;
        modal.phase = ModalPhase::Exiting(mode);
        let generation = modal.generation;

        self.after(self.timings.exit_animation, move |state| {
            let modal = &mut state.round_result;
            if modal.generation != generation || modal.phase != ModalPhase::Exiting(mode) {
                return;
            }
            modal.phase = ModalPhase::Hidden;
            modal.temporarily_hidden = mode == HideMode::Temporary;
            if mode == HideMode::Close {
                modal.current = None;
            }
        });
    }

    fn after<F>(&self, delay: Duration, apply: F)
    where
        F: FnOnce(&mut UiState) + Send + 'static,
    {
        let state = self.state.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let mut guard = state.lock();
            apply(&mut guard);
        });
    }
}
