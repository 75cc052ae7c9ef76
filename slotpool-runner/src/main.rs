//! Slotpool Runner demo
//!
//! Runs the device pools against the in-memory simulated backend.
//!
//! Architecture:
//! - Configuration: loaded from environment or defaults
//! - Provider: two simulated devices with different job durations
//! - Scheduler: one pool per device, driven by the pool manager
//!
//! The defaults poll every 10 seconds; set `SLOTPOOL_POLL_INTERVAL_MS` and
//! `SLOTPOOL_GRACE_INTERVAL_MS` to something small for a quick run.

use anyhow::{Context, Result};
use slotpool_core::{JobState, Submission};
use slotpool_runner::{JobHandle, PoolConfig, PoolManager};
use slotpool_sim::{JobScript, SimBackend, SimProvider};
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEMO_JOBS: usize = 12;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotpool_runner=info,slotpool_sim=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting slotpool demo");

    let config = load_config()?;
    info!(
        "Loaded configuration: workers_per_device={}, poll_interval={:?}, grace_interval={:?}",
        config.workers_per_device, config.poll_interval, config.grace_interval
    );

    let provider = SimProvider::new(["sim_lima"])
        .with_backend(SimBackend::with_default_script(
            "sim_quito",
            JobScript::CompleteAfter(3),
        ));

    let manager = PoolManager::from_provider(&provider, config.clone())
        .context("Failed to start device pools")?;

    let mut handles = Vec::with_capacity(DEMO_JOBS);
    for i in 0..DEMO_JOBS {
        let device = &manager.devices()[i % manager.devices().len()];
        let submission = Submission::new(serde_json::json!({ "circuit": format!("ghz-{}", i) }))
            .with_param("shots", serde_json::json!(1024));
        let handle = manager
            .enqueue(submission, device)
            .with_context(|| format!("Failed to enqueue job on {}", device))?;
        handles.push(handle);
    }

    info!("Enqueued {} job(s)", handles.len());

    let mut ticker = tokio::time::interval(config.poll_interval.max(Duration::from_millis(100)));
    loop {
        ticker.tick().await;
        info!("Pool status:\n{}", manager.render().await);

        if handles.iter().all(|h| h.state().is_terminal()) {
            break;
        }
    }

    report_results(&handles).await;

    manager.shutdown_all().await;
    info!("Demo finished");
    Ok(())
}

/// Loads configuration from environment variables with fallback to defaults
fn load_config() -> Result<PoolConfig> {
    let config = PoolConfig::from_env();
    config.validate().context("Invalid pool configuration")?;
    Ok(config)
}

async fn report_results(handles: &[JobHandle]) {
    for handle in handles {
        if handle.state() != JobState::Completed {
            warn!(
                device = handle.device(),
                job_id = handle.id(),
                state = %handle.state(),
                "Job did not complete"
            );
            continue;
        }

        match handle.result().await {
            Ok(outcome) => info!(
                device = handle.device(),
                job_id = handle.id(),
                "Result: {}",
                outcome.into_value().unwrap_or_default()
            ),
            Err(e) => warn!(
                device = handle.device(),
                job_id = handle.id(),
                "Failed to fetch result: {}",
                e
            ),
        }
    }
}
