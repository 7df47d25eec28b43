mod support;

use std::time::Duration;

use tokio::time::sleep;
use tokio_test::{assert_err, assert_ok};
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::Message;

use battle_client::game::rules::ActionOption;
use battle_client::game::store::{ConnectionStatus, RoomStatus};
use battle_client::store::identity::MatchStatus;
use battle_client::ui::SelectorPhase;
use battle_client::ws::protocol::{ActiveActionName, PassiveObject, RoundResult};
use battle_client::ws::TransportError;

use support::{eventually, game_over, game_state, game_state_with, harness, LedgerCall};

#[tokio::test(start_paused = true)]
async fn full_match_settles_once_and_leaves() {
    let h = harness();
    let mut server = h.connector.serve();

    assert_ok!(h.session.connect("room-1").await);
    assert_eq!(h.session.room_status(), RoomStatus::Waiting);
    assert_eq!(h.viewer.snapshot().match_status, MatchStatus::InBattle);

    h.session.ready();
    assert_eq!(server.next_json().await, serde_json::json!({ "type": "player_ready" }));

    server.push(game_state_with("room-1", 1, "waiting", 3, false));
    server.push(game_state("room-1", 1, "waiting"));
    eventually(|| h.session.room_status() == RoomStatus::Ready).await;

    server.push(game_state("room-1", 1, "action"));
    eventually(|| h.session.ui_snapshot().action_selector_visible()).await;
    assert_eq!(h.session.room_status(), RoomStatus::Playing);

    h.session.select_active(ActiveActionName::Sa);
    h.session.select_active(ActiveActionName::Sa);
    let action = assert_ok!(h.session.submit_action());
    assert_eq!(action.player_id, "u1");
    assert_eq!(h.session.ui_snapshot().action_selector, SelectorPhase::Exiting);

    let sent = server.next_json().await;
    assert_eq!(sent["type"], "player_action");
    assert_eq!(sent["data"]["playerId"], "u1");
    assert_eq!(sent["data"]["type"]["actionCategory"], "active");
    assert_eq!(sent["data"]["type"]["actions"], serde_json::json!(["Sa", "Sa"]));

    server.push(support::round_result(1));
    eventually(|| h.session.ui_snapshot().last_round_result.is_some()).await;
    assert!(!h.session.ui_snapshot().round_result_visible());
    sleep(Duration::from_millis(1100)).await;
    assert!(h.session.ui_snapshot().round_result_visible());

    server.push(game_over("alice"));
    server.push(game_over("alice"));
    eventually(|| h.session.ui_snapshot().game_over_visible).await;
    sleep(Duration::from_millis(100)).await;
    assert_eq!(h.ledger.calls(), vec![LedgerCall::Reward("u1".to_string(), 50)]);
    assert_eq!(h.session.room_status(), RoomStatus::Finished);

    h.session.game_over_exit().await;

    match server.next_message().await {
        Message::Close(Some(frame)) => assert_eq!(frame.code, CloseCode::Normal),
        other => panic!("expected close frame, got {other:?}"),
    }
    assert_eq!(h.session.room_status(), RoomStatus::Connecting);
    assert_eq!(h.viewer.snapshot().match_status, MatchStatus::Idle);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(h.viewer.snapshot().stone_amount, 230);
    assert_eq!(
        h.ledger.calls(),
        vec![
            LedgerCall::Reward("u1".to_string(), 50),
            LedgerCall::Query("u1".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn ducking_to_last_round_does_not_resettle() {
    let h = harness();
    let server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);

    server.push(game_state("room-1", 2, "action"));
    server.push(support::round_result(2));
    server.push(game_over("bob"));
    eventually(|| h.session.ui_snapshot().game_over_visible).await;
    sleep(Duration::from_millis(1100)).await;

    let expected: RoundResult =
        serde_json::from_value(support::round_result_data(2)).expect("valid round result");

    assert!(h.session.view_last_round_from_game_over());
    let ducked = h.session.ui_snapshot();
    assert!(!ducked.game_over_visible);
    assert!(ducked.game_over_temporarily_hidden);
    assert_eq!(ducked.round_result, Some(expected.clone()));

    assert!(h.session.return_to_game_over());
    assert!(h.session.ui_snapshot().game_over_visible);

    assert!(h.session.view_last_round_from_game_over());
    assert_eq!(h.session.ui_snapshot().round_result, Some(expected));

    h.session.direct_exit_from_round_result().await;
    sleep(Duration::from_secs(1)).await;

    assert_eq!(
        h.ledger.calls(),
        vec![
            LedgerCall::Deduct("u1".to_string(), 50),
            LedgerCall::Query("u1".to_string()),
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn temporarily_hidden_result_comes_back_without_requests() {
    let h = harness();
    let server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);

    server.push(support::round_result(1));
    sleep(Duration::from_millis(1100)).await;
    let shown = h.session.ui_snapshot().round_result;
    assert!(shown.is_some());

    h.session.hide_round_result_temporarily();
    sleep(Duration::from_millis(400)).await;
    let hidden = h.session.ui_snapshot();
    assert!(!hidden.round_result_visible());
    assert!(hidden.round_result_temporarily_hidden);

    assert!(h.session.show_last_round_result());
    assert_eq!(h.session.ui_snapshot().round_result, shown);
    assert!(h.ledger.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn terminal_failure_then_retry() {
    let h = harness();
    let server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);

    drop(server);
    eventually(|| h.session.connection_status() == ConnectionStatus::Failed).await;
    assert_eq!(h.connector.attempts(), 6);

    sleep(Duration::from_secs(30)).await;
    assert_eq!(h.connector.attempts(), 6);

    let server = h.connector.serve();
    assert_ok!(h.session.retry_connection().await);
    assert_eq!(h.session.connection_status(), ConnectionStatus::Connected);

    server.push(game_state("room-1", 1, "action"));
    eventually(|| h.session.room_status() == RoomStatus::Playing).await;
}

#[tokio::test(start_paused = true)]
async fn malformed_and_stale_frames_leave_state_intact() {
    let h = harness();
    let server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);

    server.push(game_state("room-1", 2, "action"));
    server.push_raw("{\"type\":\"game_state\"");
    server.push_raw("{\"type\":\"emote\",\"data\":{}}");
    server.push(game_state("room-1", 1, "waiting"));
    server.push(serde_json::json!({
        "type": "player_joined",
        "data": { "playerId": "u3", "username": "carol" }
    }));
    sleep(Duration::from_millis(200)).await;

    h.session.with_match(|game| {
        let state = game.state().expect("state applied");
        assert_eq!(state.current_round, 2);
        assert_eq!(state.round_phase, battle_client::ws::protocol::RoundPhase::Action);
    });
    assert_eq!(h.session.connection_status(), ConnectionStatus::Connected);
}

#[tokio::test(start_paused = true)]
async fn incomplete_defense_is_not_sent() {
    let h = harness();
    let mut server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);
    server.push(game_state("room-1", 1, "action"));
    eventually(|| h.session.room_status() == RoomStatus::Playing).await;

    h.session.select_passive(PassiveObject::ObjectDefense);
    assert!(!h.session.can_submit());
    assert_err!(h.session.submit_action());

    h.session.select_active(ActiveActionName::NanMan);
    assert_ok!(h.session.submit_action());

    let sent = server.next_json().await;
    assert_eq!(sent["data"]["type"]["objectName"], "object_defense");
    assert_eq!(sent["data"]["type"]["defenseType"], "object_defense");
    assert_eq!(sent["data"]["type"]["targetObject"], "NanMan");
}

#[tokio::test(start_paused = true)]
async fn zero_energy_option_is_greyed_but_submittable() {
    let h = harness();
    let mut server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);
    server.push(game_state_with("room-1", 1, "action", 0, true));
    eventually(|| h.session.room_status() == RoomStatus::Playing).await;

    assert!(h
        .session
        .option_disabled(ActionOption::Active(ActiveActionName::Sa)));

    h.session.select_active(ActiveActionName::Sa);
    assert_ok!(h.session.submit_action());
    assert_eq!(server.next_json().await["type"], "player_action");
}

#[tokio::test(start_paused = true)]
async fn participant_leaving_drops_to_waiting() {
    let h = harness();
    let server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);
    server.push(game_state("room-1", 1, "action"));
    eventually(|| h.session.room_status() == RoomStatus::Playing).await;

    server.push(serde_json::json!({ "type": "player_left", "data": { "playerId": "u2" } }));
    eventually(|| h.session.room_status() == RoomStatus::Waiting).await;
    assert!(!h.session.ui_snapshot().action_selector_visible());
}

#[tokio::test(start_paused = true)]
async fn leaving_during_pending_join_stays_out_of_the_room() {
    let h = harness();
    h.connector.set_open_delay(Duration::from_secs(1));
    let _server = h.connector.serve();

    let joining = {
        let session = h.session.clone();
        tokio::spawn(async move { session.connect("room-1").await })
    };
    sleep(Duration::from_millis(100)).await;
    h.session.leave_room();

    let outcome = joining.await.expect("join task panicked");
    assert!(matches!(outcome, Err(TransportError::Cancelled)));
    assert_eq!(h.viewer.snapshot().match_status, MatchStatus::Idle);
    assert_eq!(h.session.room_status(), RoomStatus::Connecting);
    assert_eq!(h.session.connection_status(), ConnectionStatus::Connecting);
    assert!(h.session.with_match(|game| game.match_id().is_none()));

    sleep(Duration::from_secs(30)).await;
    assert_eq!(h.connector.attempts(), 1);
}

#[tokio::test(start_paused = true)]
async fn opponent_rejoining_mid_round_resumes_play() {
    let h = harness();
    let server = h.connector.serve();
    assert_ok!(h.session.connect("room-1").await);
    server.push(game_state("room-1", 1, "action"));
    eventually(|| h.session.room_status() == RoomStatus::Playing).await;

    server.push(serde_json::json!({ "type": "player_left", "data": { "playerId": "u2" } }));
    eventually(|| h.session.room_status() == RoomStatus::Waiting).await;

    server.push(game_state("room-1", 1, "result"));
    eventually(|| h.session.room_status() == RoomStatus::Playing).await;
}
