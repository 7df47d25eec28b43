//! Battle transport: wire protocol and connection management

pub mod connection;
pub mod protocol;

pub use connection::{
    BattleEvent, ConnectionManager, Connector, EventKind, Link, ListenerId, TransportError,
    WsConnector,
};

use protocol::BattleAction;

/// Outbound player intents, as consumed by the match store
pub trait IntentSink: Send + Sync {
    fn send_action(&self, action: &BattleAction);
    fn send_ready(&self);
}
