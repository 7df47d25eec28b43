//! Configuration module - environment variable parsing

use std::env;
use std::time::Duration;

use crate::util::time::{
    BALANCE_APPLY_DELAY_MS, EXIT_ANIMATION_MS, EXIT_TO_LEAVE_DELAY_MS, ROUND_RESULT_DELAY_MS,
};

/// Client configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Log line format
    pub log_format: LogFormat,

    /// Battle transport settings
    pub transport: TransportConfig,

    /// Asset service base URL (reward, deduct, balance)
    pub asset_service_url: String,
    /// Timeout applied to every request/response call
    pub request_timeout: Duration,

    /// Currency granted to the winner and deducted from the loser
    pub reward_amount: i64,

    /// Presentation pacing
    pub ui: UiTimings,
}

/// Output format of the log subscriber
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ConfigError::Invalid("LOG_FORMAT")),
        }
    }
}

/// Battle transport configuration
#[derive(Clone, Debug)]
pub struct TransportConfig {
    /// host:port of the battle service
    pub battle_service_addr: String,
    /// Reconnection attempts after an unexpected closure
    pub max_reconnect_attempts: u32,
    /// Delay before each reconnection attempt
    pub reconnect_delay: Duration,
}

impl TransportConfig {
    pub fn new(battle_service_addr: impl Into<String>) -> Self {
        Self {
            battle_service_addr: battle_service_addr.into(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_secs(3),
        }
    }
}

/// Fixed delays used to pace modals and exits. None of these advance game state.
#[derive(Clone, Copy, Debug)]
pub struct UiTimings {
    /// Wait before a freshly received round result is shown
    pub round_result_delay: Duration,
    /// Length of the exit animation for modals and the action selector
    pub exit_animation: Duration,
    /// Wait between closing the final modal and leaving the room
    pub exit_to_leave_delay: Duration,
    /// Wait before a refreshed balance is written to the viewer profile
    pub balance_apply_delay: Duration,
}

impl Default for UiTimings {
    fn default() -> Self {
        Self {
            round_result_delay: Duration::from_millis(ROUND_RESULT_DELAY_MS),
            exit_animation: Duration::from_millis(EXIT_ANIMATION_MS),
            exit_to_leave_delay: Duration::from_millis(EXIT_TO_LEAVE_DELAY_MS),
            balance_apply_delay: Duration::from_millis(BALANCE_APPLY_DELAY_MS),
        }
    }
}

impl ClientConfig {
    /// Build a configuration with default tuning and explicit service addresses
    pub fn new(battle_service_addr: impl Into<String>, asset_service_url: impl Into<String>) -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            transport: TransportConfig::new(battle_service_addr),
            asset_service_url: asset_service_url.into(),
            request_timeout: Duration::from_secs(50),
            reward_amount: 50,
            ui: UiTimings::default(),
        }
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        let battle_service_addr = env::var("BATTLE_SERVICE_ADDR")
            .map_err(|_| ConfigError::Missing("BATTLE_SERVICE_ADDR"))?;
        let asset_service_url = env::var("ASSET_SERVICE_URL")
            .map_err(|_| ConfigError::Missing("ASSET_SERVICE_URL"))?;

        let mut config = Self::new(battle_service_addr, asset_service_url);

        config.log_level = env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string());
        if let Ok(raw) = env::var("LOG_FORMAT") {
            config.log_format = raw.parse()?;
        }

        if let Some(attempts) = parse_var::<u32>("RECONNECT_ATTEMPTS")? {
            config.transport.max_reconnect_attempts = attempts;
        }
        if let Some(ms) = parse_var::<u64>("RECONNECT_DELAY_MS")? {
            config.transport.reconnect_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = parse_var::<u64>("REQUEST_TIMEOUT_MS")? {
            config.request_timeout = Duration::from_millis(ms);
        }
        if let Some(amount) = parse_var::<i64>("REWARD_AMOUNT")? {
            config.reward_amount = amount;
        }

        Ok(config)
    }
}

/// Parse an optional numeric variable, failing only when it is present but malformed
fn parse_var<T: std::str::FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid(name)),
        Err(_) => Ok(None),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),
}
