//! Viewer identity and profile fields

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Where the viewer currently is in the matchmaking flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    #[default]
    Idle,
    Matching,
    InBattle,
}

/// Profile of the signed-in viewer
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewerProfile {
    pub user_id: String,
    pub user_name: String,
    pub rank: String,
    pub rank_position: Option<u32>,
    /// Currency balance
    pub stone_amount: i64,
    pub match_status: MatchStatus,
}

impl ViewerProfile {
    pub fn new(user_id: impl Into<String>, user_name: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_name: user_name.into(),
            ..Self::default()
        }
    }
}

/// Single-field profile update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileField {
    StoneAmount(i64),
    Rank(String),
    RankPosition(Option<u32>),
    MatchStatus(MatchStatus),
}

/// Shared handle to the viewer profile
#[derive(Clone, Default)]
pub struct ViewerIdentity {
    profile: Arc<RwLock<ViewerProfile>>,
}

impl ViewerIdentity {
    pub fn new(profile: ViewerProfile) -> Self {
        Self {
            profile: Arc::new(RwLock::new(profile)),
        }
    }

    pub fn snapshot(&self) -> ViewerProfile {
        self.profile.read().clone()
    }

    pub fn user_id(&self) -> String {
        self.profile.read().user_id.clone()
    }

    pub fn user_name(&self) -> String {
        self.profile.read().user_name.clone()
    }

    pub fn is_signed_in(&self) -> bool {
        !self.profile.read().user_id.is_empty()
    }

    pub fn set_field(&self, field: ProfileField) {
        debug!(?field, "Profile field updated");
        let mut profile = self.profile.write();
        match field {
            ProfileField::StoneAmount(amount) => profile.stone_amount = amount,
            ProfileField::Rank(rank) => profile.rank = rank,
            ProfileField::RankPosition(position) => profile.rank_position = position,
            ProfileField::MatchStatus(status) => profile.match_status = status,
        }
    }

    pub fn replace(&self, profile: ViewerProfile) {
        *self.profile.write() = profile;
    }

    /// Drop every profile field
    pub fn sign_out(&self) {
        let mut profile = self.profile.write();
        info!(user_id = %profile.user_id, "Signing out viewer");
        *profile = ViewerProfile::default();
    }
}

impl std::fmt::Debug for ViewerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ViewerIdentity").field(&*self.profile.read()).finish()
    }
}
