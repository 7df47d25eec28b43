//! Session composition

pub mod session;

pub use session::BattleSession;
