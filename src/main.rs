//! Battle Client - headless battle session runner
//!
//! Joins one battle room as the configured viewer, readies up and logs the
//! session until the match ends, the transport fails for good, or a shutdown
//! signal arrives.

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use battle_client::store::identity::{ViewerIdentity, ViewerProfile};
use battle_client::ws::{BattleEvent, EventKind};
use battle_client::config::LogFormat;
use battle_client::{BattleSession, ClientConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = ClientConfig::from_env()?;

    // Initialize tracing
    init_tracing(&config.log_level, config.log_format);

    let viewer_id = std::env::var("VIEWER_ID").context("VIEWER_ID must be set")?;
    let viewer_name = std::env::var("VIEWER_NAME").context("VIEWER_NAME must be set")?;
    let match_id = std::env::var("MATCH_ID").context("MATCH_ID must be set")?;

    info!("Starting Battle Client");
    info!("Battle service: {}", config.transport.battle_service_addr);
    info!("Asset service: {}", config.asset_service_url);

    let settle_grace = config.ui.balance_apply_delay;
    let viewer = ViewerIdentity::new(ViewerProfile::new(viewer_id, viewer_name));
    let session = BattleSession::from_config(config, viewer);

    session.connect(&match_id).await?;

    // Terminal events end the run
    let (tx, mut rx) = mpsc::unbounded_channel();
    for kind in [EventKind::MatchOver, EventKind::ConnectionFailed] {
        let tx = tx.clone();
        session.on_event(kind, move |event| {
            let _ = tx.send(event.clone());
        });
    }

    let round_log = session.clone();
    session.on_event(EventKind::RoundResult, move |_| {
        if let Some(view) = round_log.last_round_view() {
            info!(
                round = view.round,
                verdict = ?view.verdict(),
                health_change = view.current.delta.health_change,
                opponent_health_change = view.opponent.delta.health_change,
                "Round settled"
            );
        }
    });

    session.ready();

    tokio::select! {
        Some(event) = rx.recv() => match event {
            BattleEvent::MatchOver(result) => {
                info!(winner = %result.winner, reason = ?result.reason, "Match finished");
                session.game_over_exit().await;
                // Let the settlement requests land before the runtime stops
                tokio::time::sleep(settle_grace).await;
            }
            _ => {
                error!("Battle transport failed, leaving room");
                session.leave_room();
            }
        },
        _ = shutdown_signal() => {
            session.leave_room();
        }
    }

    info!(
        stones = session.viewer().snapshot().stone_amount,
        "Battle client shutdown complete"
    );
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str, format: LogFormat) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let (text, json) = match format {
        LogFormat::Text => (Some(tracing_subscriber::fmt::layer().with_target(true)), None),
        LogFormat::Json => (
            None,
            Some(tracing_subscriber::fmt::layer().json().with_target(true)),
        ),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(text)
        .with(json)
        .init();
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, leaving battle room");
        }
        _ = terminate => {
            info!("Received terminate signal, leaving battle room");
        }
    }
}
