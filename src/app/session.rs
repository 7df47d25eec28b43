//! Battle session: the composition root
//!
//! Owns one handle to every store and wires transport events into them. The
//! stores never reach each other directly; everything flows through here.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{info, warn};

use crate::config::ClientConfig;
use crate::game::round::RoundView;
use crate::game::rules::ActionOption;
use crate::game::store::{ConnectionStatus, MatchStore, RoomStatus, SelectionError, StateUpdate};
use crate::settlement::{AssetLedger, SettlementDispatcher};
use crate::store::api::ApiClient;
use crate::store::assets::AssetClient;
use crate::store::identity::{MatchStatus, ProfileField, ViewerIdentity};
use crate::ui::{UiSnapshot, UiStore};
use crate::ws::protocol::{ActiveActionName, BattleAction, PassiveObject};
use crate::ws::{
    BattleEvent, ConnectionManager, Connector, EventKind, ListenerId, TransportError, WsConnector,
};

/// One viewer's battle session
#[derive(Clone)]
pub struct BattleSession {
    config: Arc<ClientConfig>,
    viewer: ViewerIdentity,
    connection: Arc<ConnectionManager>,
    game: Arc<Mutex<MatchStore>>,
    ui: UiStore,
    settlement: SettlementDispatcher,
}

impl BattleSession {
    pub fn new(
        config: ClientConfig,
        viewer: ViewerIdentity,
        connector: Arc<dyn Connector>,
        ledger: Arc<dyn AssetLedger>,
    ) -> Self {
        let config = Arc::new(config);

        // Transport, and the match store writing intents through it
        let connection = Arc::new(ConnectionManager::new(config.transport.clone(), connector));
        let game = Arc::new(Mutex::new(MatchStore::new(
            viewer.clone(),
            connection.clone(),
        )));

        let ui = UiStore::new(config.ui);
        let settlement = SettlementDispatcher::new(
            ledger,
            viewer.clone(),
            config.reward_amount,
            config.ui.balance_apply_delay,
        );

        Self {
            config,
            viewer,
            connection,
            game,
            ui,
            settlement,
        }
    }

    /// Production wiring: WebSocket transport and the HTTP asset service
    pub fn from_config(config: ClientConfig, viewer: ViewerIdentity) -> Self {
        let api = ApiClient::new(
            config.asset_service_url.clone(),
            config.request_timeout,
            viewer.clone(),
        );
        let ledger = Arc::new(AssetClient::new(api));
        Self::new(config, viewer, Arc::new(WsConnector), ledger)
    }

    /// Start a new match session. Clears every store and settlement guard.
    ///
    /// Listeners registered through [`BattleSession::on_event`] before this call are dropped.
    pub async fn connect(&self, match_id: &str) -> Result<(), TransportError> {
        info!(match_id = %match_id, "Joining battle room");

        self.settlement.begin_session();
        self.ui.reset();
        self.game.lock().begin(match_id);
        self.connection.disconnect();
        self.install_listeners();

        let viewer = self.viewer.snapshot();
        match self
            .connection
            .connect(match_id, &viewer.user_id, &viewer.user_name)
            .await
        {
            Ok(()) => {
                self.game.lock().transport_opened();
                self.viewer
                    .set_field(ProfileField::MatchStatus(MatchStatus::InBattle));
                Ok(())
            }
            Err(TransportError::Cancelled) => {
                info!(match_id = %match_id, "Join abandoned before the transport opened");
                Err(TransportError::Cancelled)
            }
            Err(e) => {
                self.game.lock().set_connection(ConnectionStatus::Disconnected {
                    reason: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Reconnect to the current room after a terminal failure
    pub async fn retry_connection(&self) -> Result<(), TransportError> {
        let match_id = self.game.lock().match_id().map(str::to_string);
        let Some(match_id) = match_id else {
            warn!("Retry requested without a room");
            return Err(TransportError::NoMatch);
        };
        self.connect(&match_id).await
    }

    pub fn leave_room(&self) {
        info!(match_id = ?self.game.lock().match_id(), "Leaving battle room");
        self.connection.disconnect();
        self.game.lock().reset();
        self.ui.reset();
        self.viewer.set_field(ProfileField::MatchStatus(MatchStatus::Idle));
    }

    pub fn ready(&self) {
        self.game.lock().ready();
    }

    pub fn select_passive(&self, object: PassiveObject) {
        self.game.lock().select_passive(object);
    }

    pub fn select_active(&self, name: ActiveActionName) {
        self.game.lock().select_active(name);
    }

    pub fn remove_active(&self, name: ActiveActionName) -> bool {
        self.game.lock().remove_active(name)
    }

    pub fn clear_selection(&self) {
        self.game.lock().clear_selection();
    }

    pub fn can_submit(&self) -> bool {
        self.game.lock().can_submit()
    }

    pub fn option_disabled(&self, option: ActionOption) -> bool {
        self.game.lock().option_disabled(option)
    }

    /// Submit the pending action and tuck the selector away
    pub fn submit_action(&self) -> Result<BattleAction, SelectionError> {
        let action = self.game.lock().submit()?;
        self.ui.hide_action_selector_temporarily();
        Ok(action)
    }

    pub fn show_action_selector_again(&self) -> bool {
        let gate = self.game.lock().selector_gate();
        self.ui.show_action_selector_again(gate)
    }

    pub fn hide_round_result(&self) {
        self.ui.hide_round_result();
    }

    pub fn hide_round_result_temporarily(&self) {
        self.ui.hide_round_result_temporarily();
    }

    pub fn show_last_round_result(&self) -> bool {
        self.ui.show_last_round_result()
    }

    /// Duck from the game-over modal back to the last round
    pub fn view_last_round_from_game_over(&self) -> bool {
        self.settlement.mark_reward_processed();
        self.ui.hide_game_over_temporarily();
        self.ui.show_last_round_result()
    }

    pub fn return_to_game_over(&self) -> bool {
        self.ui.hide_round_result();
        self.ui.show_game_over_again()
    }

    /// Leave through the game-over modal
    pub async fn game_over_exit(&self) {
        self.settle_before_exit();
        self.ui.hide_game_over();
        tokio::time::sleep(self.config.ui.exit_to_leave_delay).await;
        self.leave_room();
    }

    /// Leave straight from the round-result modal, skipping game over
    pub async fn direct_exit_from_round_result(&self) {
        self.settle_before_exit();
        self.ui.hide_round_result();
        self.ui.hide_game_over();
        tokio::time::sleep(self.config.ui.exit_to_leave_delay).await;
        self.leave_room();
    }

    /// Subscribe to transport events alongside the stores
    pub fn on_event<F>(&self, kind: EventKind, handler: F) -> ListenerId
    where
        F: Fn(&BattleEvent) + Send + Sync + 'static,
    {
        self.connection.on(kind, handler)
    }

    pub fn off_event(&self, kind: EventKind, id: ListenerId) -> bool {
        self.connection.off(kind, id)
    }

    pub fn ui_snapshot(&self) -> UiSnapshot {
        self.ui.snapshot()
    }

    pub fn room_status(&self) -> RoomStatus {
        self.game.lock().room_status()
    }

    /// Latest settled round from the viewer's side
    pub fn last_round_view(&self) -> Option<RoundView> {
        self.game.lock().last_round_view()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.game.lock().connection_status().clone()
    }

    /// Read the match store under its lock
    pub fn with_match<R>(&self, read: impl FnOnce(&MatchStore) -> R) -> R {
        let game = self.game.lock();
        read(&game)
    }

    pub fn viewer(&self) -> &ViewerIdentity {
        &self.viewer
    }

    pub fn settlement(&self) -> &SettlementDispatcher {
        &self.settlement
    }

    fn settle_before_exit(&self) {
        self.settlement.refresh_balance();
        self.settlement.mark_reward_processed();
    }

    fn install_listeners(&self) {
        {
            let game = self.game.clone();
            let ui = self.ui.clone();
            self.connection.on(EventKind::MatchState, move |event| {
                let BattleEvent::MatchState(state) = event else {
                    return;
                };
                let (update, gate) = {
                    let mut game = game.lock();
                    let update = game.apply_state(state.clone());
                    (update, game.selector_gate())
                };
                if matches!(update, StateUpdate::Applied { round_advanced: true }) {
                    ui.new_round();
                }
                ui.refresh_action_selector(gate);
            });
        }

        {
            let game = self.game.clone();
            let ui = self.ui.clone();
            self.connection.on(EventKind::RoundResult, move |event| {
                let BattleEvent::RoundResult(result) = event else {
                    return;
                };
                let fresh = game.lock().record_round_result(result.clone());
                if fresh {
                    ui.on_round_result(result.clone());
                }
            });
        }

        {
            let game = self.game.clone();
            let ui = self.ui.clone();
            let settlement = self.settlement.clone();
            self.connection.on(EventKind::MatchOver, move |event| {
                let BattleEvent::MatchOver(result) = event else {
                    return;
                };
                let (fresh, gate) = {
                    let mut game = game.lock();
                    (game.finish(result.clone()), game.selector_gate())
                };
                ui.refresh_action_selector(gate);
                if fresh {
                    ui.show_game_over(result.clone());
                }
                settlement.on_match_over(result);
            });
        }

        {
            let game = self.game.clone();
            self.connection.on(EventKind::ParticipantJoined, move |event| {
                if let BattleEvent::ParticipantJoined(joined) = event {
                    game.lock().participant_joined(joined);
                }
            });
        }

        {
            let game = self.game.clone();
            let ui = self.ui.clone();
            self.connection.on(EventKind::ParticipantLeft, move |event| {
                let BattleEvent::ParticipantLeft(left) = event else {
                    return;
                };
                let gate = {
                    let mut game = game.lock();
                    game.participant_left(left);
                    game.selector_gate()
                };
                ui.refresh_action_selector(gate);
            });
        }

        {
            let game = self.game.clone();
            self.connection.on(EventKind::TransportError, move |event| {
                if let BattleEvent::TransportError { message } = event {
                    game.lock().set_connection(ConnectionStatus::Disconnected {
                        reason: message.clone(),
                    });
                }
            });
        }

        {
            let game = self.game.clone();
            self.connection.on(EventKind::ConnectionFailed, move |_| {
                warn!("Battle transport failed for good, waiting for retry or leave");
                game.lock().set_connection(ConnectionStatus::Failed);
            });
        }
    }
}
