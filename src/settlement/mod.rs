//! Settlement dispatcher
//!
//! Applies the end-of-match reward or penalty and the follow-up balance
//! refresh at most once per match session. Each guard flag is set before its
//! request is issued and cleared only by [`SettlementDispatcher::begin_session`].
//!
//! The flags live in memory only. A process restart mid-dispatch loses them,
//! so a duplicate reward is possible in that window; closing it needs a
//! server-side idempotency key.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use crate::store::api::ApiError;
use crate::store::identity::{ProfileField, ViewerIdentity};
use crate::ws::protocol::MatchOverResult;

/// Economic side effects consumed by the dispatcher
#[async_trait]
pub trait AssetLedger: Send + Sync {
    async fn reward(&self, user_id: &str, amount: i64) -> Result<(), ApiError>;
    async fn deduct(&self, user_id: &str, amount: i64) -> Result<(), ApiError>;
    async fn query_balance(&self, user_id: &str) -> Result<i64, ApiError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RewardDirection {
    Grant,
    Deduct,
}

/// Per-session guards
#[derive(Debug, Default)]
struct SessionFlags {
    reward_dispatched: AtomicBool,
    balance_refreshed: AtomicBool,
}

#[derive(Clone)]
pub struct SettlementDispatcher {
    ledger: Arc<dyn AssetLedger>,
    viewer: ViewerIdentity,
    reward_amount: i64,
    balance_apply_delay: Duration,
    flags: Arc<SessionFlags>,
}

impl SettlementDispatcher {
    pub fn new(
        ledger: Arc<dyn AssetLedger>,
        viewer: ViewerIdentity,
        reward_amount: i64,
        balance_apply_delay: Duration,
    ) -> Self {
        Self {
            ledger,
            viewer,
            reward_amount,
            balance_apply_delay,
            flags: Arc::new(SessionFlags::default()),
        }
    }

    /// New match session; both guards are cleared
    pub fn begin_session(&self) {
        self.flags.reward_dispatched.store(false, Ordering::Release);
        self.flags.balance_refreshed.store(false, Ordering::Release);
        debug!("Settlement guards reset");
    }

    /// Dispatch the reward or penalty for `result`.
    /// Returns the direction when a request was issued.
    pub fn on_match_over(&self, result: &MatchOverResult) -> Option<RewardDirection> {
        let user_id = self.viewer.user_id();
        if user_id.is_empty() {
            warn!("No viewer id, settlement skipped");
            return None;
        }

        if self.flags.reward_dispatched.swap(true, Ordering::AcqRel) {
            debug!(winner = %result.winner, "Settlement already dispatched");
            return None;
        }

        let direction = if result.winner == self.viewer.user_name() {
            RewardDirection::Grant
        } else {
            RewardDirection::Deduct
        };
        info!(user_id = %user_id, ?direction, amount = self.reward_amount, "Dispatching settlement");

        let ledger = self.ledger.clone();
        let amount = self.reward_amount;
        tokio::spawn(async move {
            let outcome = match direction {
                RewardDirection::Grant => ledger.reward(&user_id, amount).await,
                RewardDirection::Deduct => ledger.deduct(&user_id, amount).await,
            };
            match outcome {
                Ok(()) => info!(user_id = %user_id, ?direction, "Settlement applied"),
                Err(e) => error!(user_id = %user_id, ?direction, error = %e, "Settlement failed"),
            }
        });

        Some(direction)
    }

    /// Suppress any later dispatch for this session
    pub fn mark_reward_processed(&self) {
        self.flags.reward_dispatched.store(true, Ordering::Release);
    }

    /// Refresh the balance once per session. The new value lands after a short delay.
    pub fn refresh_balance(&self) -> bool {
        let user_id = self.viewer.user_id();
        if user_id.is_empty() {
            warn!("No viewer id, balance refresh skipped");
            return false;
        }

        if self.flags.balance_refreshed.swap(true, Ordering::AcqRel) {
            debug!("Balance already refreshed");
            return false;
        }

        let ledger = self.ledger.clone();
        let viewer = self.viewer.clone();
        let delay = self.balance_apply_delay;
        tokio::spawn(async move {
            match ledger.query_balance(&user_id).await {
                Ok(balance) => {
                    tokio::time::sleep(delay).await;
                    viewer.set_field(ProfileField::StoneAmount(balance));
                    info!(user_id = %user_id, balance, "Balance refreshed");
                }
                Err(e) => error!(user_id = %user_id, error = %e, "Balance refresh failed"),
            }
        });

        true
    }

    pub fn reward_dispatched(&self) -> bool {
        self.flags.reward_dispatched.load(Ordering::Acquire)
    }

    pub fn balance_refreshed(&self) -> bool {
        self.flags.balance_refreshed.load(Ordering::Acquire)
    }
}
