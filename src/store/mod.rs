//! Clients for the services around a battle: asset ledger and viewer identity

pub mod api;
pub mod assets;
pub mod identity;

pub use api::{ApiClient, ApiError};
pub use assets::AssetClient;
pub use identity::{ViewerIdentity, ViewerProfile};
