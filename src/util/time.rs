//! Time utilities and presentation pacing constants

/// Wall-clock stamp attached to outbound actions
pub fn action_timestamp() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Round result is shown after the round transition animation settles
pub const ROUND_RESULT_DELAY_MS: u64 = 1000;
/// Modal / selector exit animation
pub const EXIT_ANIMATION_MS: u64 = 300;
/// Pause between closing the last modal and leaving the room
pub const EXIT_TO_LEAVE_DELAY_MS: u64 = 200;
/// Balance refresh lands after the page transition has started
pub const BALANCE_APPLY_DELAY_MS: u64 = 800;
/// Delay before a superseded or expired session is signed out
pub const FORCED_SIGN_OUT_DELAY_MS: u64 = 3000;
