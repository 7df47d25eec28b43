//! Shared helpers for session integration tests

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedReceiver, UnboundedSender};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};

use battle_client::settlement::AssetLedger;
use battle_client::store::api::ApiError;
use battle_client::store::identity::{ViewerIdentity, ViewerProfile};
use battle_client::ws::{Connector, Link, TransportError};
use battle_client::{BattleSession, ClientConfig};

/// Server side of an in-memory transport
pub struct ServerEnd {
    to_client: UnboundedSender<Message>,
    from_client: UnboundedReceiver<Message>,
}

impl ServerEnd {
    pub fn push(&self, frame: Value) {
        self.push_raw(&frame.to_string());
    }

    pub fn push_raw(&self, text: &str) {
        self.to_client
            .unbounded_send(Message::Text(text.to_string()))
            .expect("client side dropped");
    }

    pub async fn next_message(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(5), self.from_client.next())
            .await
            .expect("no frame from client")
            .expect("client stream ended")
    }

    /// Next text frame, decoded
    pub async fn next_json(&mut self) -> Value {
        match self.next_message().await {
            Message::Text(text) => serde_json::from_str(&text).expect("client sent invalid json"),
            other => panic!("expected text frame, got {other:?}"),
        }
    }
}

fn memory_link() -> (Link, ServerEnd) {
    let (to_client, client_rx) = unbounded::<Message>();
    let (client_tx, from_client) = unbounded::<Message>();
    let link = Link {
        sink: Box::pin(client_tx.sink_map_err(|_| WsError::ConnectionClosed)),
        stream: Box::pin(client_rx.map(Ok::<Message, WsError>)),
    };
    (link, ServerEnd { to_client, from_client })
}

/// Connector handing out queued in-memory links; refuses once they run out
#[derive(Default)]
pub struct MemoryConnector {
    links: Mutex<VecDeque<Link>>,
    attempts: AtomicUsize,
    open_delay: Mutex<Option<Duration>>,
}

impl MemoryConnector {
    pub fn serve(&self) -> ServerEnd {
        let (link, server) = memory_link();
        self.links.lock().push_back(link);
        server
    }

    /// Make every later open take `delay` before resolving
    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock() = Some(delay);
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn open(&self, _url: &str) -> Result<Link, TransportError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let delay = *self.open_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let next = self.links.lock().pop_front();
        next.ok_or_else(|| TransportError::Refused("no server".to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerCall {
    Reward(String, i64),
    Deduct(String, i64),
    Query(String),
}

/// Ledger double recording every request
pub struct RecordingLedger {
    pub calls: Mutex<Vec<LedgerCall>>,
    pub balance: i64,
}

impl RecordingLedger {
    pub fn new(balance: i64) -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            balance,
        }
    }

    pub fn calls(&self) -> Vec<LedgerCall> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl AssetLedger for RecordingLedger {
    async fn reward(&self, user_id: &str, amount: i64) -> Result<(), ApiError> {
        self.calls
            .lock()
            .push(LedgerCall::Reward(user_id.to_string(), amount));
        Ok(())
    }

    async fn deduct(&self, user_id: &str, amount: i64) -> Result<(), ApiError> {
        self.calls
            .lock()
            .push(LedgerCall::Deduct(user_id.to_string(), amount));
        Ok(())
    }

    async fn query_balance(&self, user_id: &str) -> Result<i64, ApiError> {
        self.calls.lock().push(LedgerCall::Query(user_id.to_string()));
        Ok(self.balance)
    }
}

pub struct Harness {
    pub session: BattleSession,
    pub connector: Arc<MemoryConnector>,
    pub ledger: Arc<RecordingLedger>,
    pub viewer: ViewerIdentity,
}

/// Session for viewer alice (u1) over in-memory doubles
pub fn harness() -> Harness {
    let connector = Arc::new(MemoryConnector::default());
    let ledger = Arc::new(RecordingLedger::new(230));
    let viewer = ViewerIdentity::new(ViewerProfile::new("u1", "alice"));
    let config = ClientConfig::new("battle.test:9000", "http://assets.test");
    let session = BattleSession::new(config, viewer.clone(), connector.clone(), ledger.clone());
    Harness {
        session,
        connector,
        ledger,
        viewer,
    }
}

/// Poll `condition` on virtual time until it holds
pub async fn eventually(condition: impl Fn() -> bool) {
    for _ in 0..2000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not reached");
}

fn participant(id: &str, name: &str, energy: i32, connected: bool) -> Value {
    json!({
        "playerId": id,
        "username": name,
        "health": 10,
        "energy": energy,
        "rank": "Bronze",
        "cards": [],
        "currentAction": null,
        "isReady": true,
        "isConnected": connected,
        "hasActed": false
    })
}

pub fn game_state(room: &str, round: u32, phase: &str) -> Value {
    game_state_with(room, round, phase, 3, true)
}

pub fn game_state_with(
    room: &str,
    round: u32,
    phase: &str,
    viewer_energy: i32,
    opponent_connected: bool,
) -> Value {
    json!({
        "type": "game_state",
        "data": {
            "roomId": room,
            "player1": participant("u1", "alice", viewer_energy, true),
            "player2": participant("u2", "bob", 3, opponent_connected),
            "currentRound": round,
            "roundPhase": phase,
            "remainingTime": 30,
            "winner": "",
            "isReady": opponent_connected
        }
    })
}

pub fn round_result_data(round: u32) -> Value {
    json!({
        "round": round,
        "player1Action": {
            "type": { "actionCategory": "active", "actions": ["Sa"] },
            "playerId": "u1",
            "timestamp": 1
        },
        "player2Action": {
            "type": { "actionCategory": "passive", "objectName": "Cake" },
            "playerId": "u2",
            "timestamp": 2
        },
        "results": {
            "player1": { "healthChange": 0, "energyChange": -1 },
            "player2": { "healthChange": -1, "energyChange": 1 }
        },
        "cardEffects": [
            { "playerId": "u2", "cardName": "Mirror", "effectType": "reflect", "triggered": false }
        ]
    })
}

pub fn round_result(round: u32) -> Value {
    json!({ "type": "round_result", "data": round_result_data(round) })
}

pub fn game_over(winner: &str) -> Value {
    json!({
        "type": "game_over",
        "data": { "winner": winner, "reason": "health_zero", "rewards": { "stones": 50 } }
    })
}
