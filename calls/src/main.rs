//! Call engine service.
//!
//! Runs the lifecycle sweeper over in-memory collaborators seeded with a demo
//! offering, after walking one call through schedule, join and start.

use anyhow::Context;
use chrono::Duration as ChronoDuration;
use metrics_exporter_prometheus::PrometheusBuilder;
use skillswap_calls::memory::{
    InMemoryAccounts, InMemoryCallStore, InMemoryOfferings, StubMeetingProvisioner,
};
use skillswap_calls::{
    CallEngine, CallKind, Collaborators, Config, LifecycleSweeper, OfferingId, Points,
    ScheduleCall, UserId,
};
use skillswap_core::environment::SystemClock;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("skillswap_calls={}", config.observability.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        sweeper_enabled = config.sweeper.enabled,
        sweep_interval_secs = config.sweeper.interval_secs,
        metrics_enabled = config.observability.metrics_enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        let addr = config.metrics_addr().context("invalid metrics address")?;
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("failed to install Prometheus exporter")?;
        info!(%addr, "Prometheus exporter listening");
    }

    let accounts = Arc::new(InMemoryAccounts::new());
    let offerings = Arc::new(InMemoryOfferings::new());
    let engine = Arc::new(
        CallEngine::new(Collaborators {
            store: Arc::new(InMemoryCallStore::new()),
            accounts: accounts.clone(),
            offerings: offerings.clone(),
            provisioner: Arc::new(StubMeetingProvisioner::new()),
            clock: Arc::new(SystemClock),
        })
        .with_meeting_topic(config.meetings.topic.clone()),
    );

    walkthrough(&engine, &accounts, &offerings).await?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);
    let sweeper = config.sweeper.enabled.then(|| {
        LifecycleSweeper::new(Arc::clone(&engine), config.sweep_interval())
            .spawn(shutdown_tx.subscribe())
    });

    info!("Call engine running, press Ctrl-C to stop");
    signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("Shutdown signal received");

    let _ = shutdown_tx.send(());
    if let Some(handle) = sweeper {
        match tokio::time::timeout(config.shutdown_timeout(), handle).await {
            Ok(Ok(())) => info!("Sweeper stopped"),
            Ok(Err(error)) => warn!(%error, "Sweeper task failed"),
            Err(_) => warn!("Sweeper did not stop before the shutdown timeout"),
        }
    }

    info!("Call engine stopped");
    Ok(())
}

/// Seed one owner, two learners and an offering, then schedule, fill and start a call
async fn walkthrough(
    engine: &CallEngine,
    accounts: &InMemoryAccounts,
    offerings: &InMemoryOfferings,
) -> anyhow::Result<()> {
    let owner = UserId::new();
    let learners = [UserId::new(), UserId::new()];
    accounts.open(owner, Points::new(0));
    for learner in learners {
        accounts.open(learner, Points::new(300));
    }
    let offering = OfferingId::new();
    offerings.publish(offering, Points::new(100));

    let call = engine
        .schedule_call(ScheduleCall {
            offering_id: offering,
            owner,
            kind: CallKind::Teaching,
            scheduled_time: engine.now() - ChronoDuration::minutes(5),
            max_participants: 2,
        })
        .await?;
    info!(call_id = %call.id, join_url = %call.meeting.join_url, "Demo call scheduled");

    for learner in learners {
        engine.join_call(call.id, learner).await?;
    }
    let started = engine.start_or_enter(call.id, owner).await?;
    info!(
        call_id = %started.id,
        status = %started.status,
        ends_at = ?started.ends_at(),
        "Demo call started; the sweeper completes it once its slot is over"
    );
    debug!(record = %serde_json::to_string(&started)?, "Demo call record");
    Ok(())
}
