//! Battle Client - real-time battle session protocol client
//!
//! Connects a viewer to a two-player battle room, mirrors the authoritative
//! match state, builds and submits round actions, paces the result screens
//! and settles the match reward exactly once per session.

pub mod app;
pub mod config;
pub mod game;
pub mod settlement;
pub mod store;
pub mod ui;
pub mod util;
pub mod ws;

#[cfg(test)]
pub(crate) mod fixtures;

pub use app::BattleSession;
pub use config::{ClientConfig, ConfigError};
