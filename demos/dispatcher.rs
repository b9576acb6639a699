//! A message dispatcher guarded by a shared admission controller.
//!
//! ```text
//! cargo run --example dispatcher                 # built-in settings
//! cargo run --example dispatcher -- gate.toml    # settings from a file
//! RUST_LOG=floodgate=debug cargo run --example dispatcher
//! ```

use floodgate::{AdmissionConfig, AdmissionController, Decision, SharedController};
use std::error::Error;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_CONFIG: &str = r#"
profile = "strict"
timeframe_ms = 2000
cooldown_ms = 3000

[eviction]
max_tracked = 1000
sweep_interval_ms = 500
"#;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .try_init()?;

    let config = match std::env::args().nth(1) {
        Some(path) => {
            info!(path = %path, "loading admission config");
            AdmissionConfig::from_toml_file(path)?
        }
        None => AdmissionConfig::from_toml_str(DEFAULT_CONFIG)?,
    };
    info!(
        max_events = config.max_events,
        timeframe_ms = config.timeframe_ms,
        cooldown_ms = config.cooldown_ms,
        "admission config ready"
    );

    let controller: SharedController = Arc::new(AdmissionController::try_new(config)?);
    let (sweeper, stop_sweeper) = controller.clone().start_sweeper()?;

    // Each worker owns a few chats; chat 0 of every worker floods.
    let workers: Vec<_> = (0..4)
        .map(|worker| {
            let controller = controller.clone();
            thread::Builder::new()
                .name(format!("worker-{worker}"))
                .spawn(move || dispatch(&controller, worker))
        })
        .collect::<std::io::Result<_>>()?;

    for worker in workers {
        if worker.join().is_err() {
            warn!("worker panicked");
        }
    }

    let _ = stop_sweeper.send(());
    if sweeper.join().is_err() {
        warn!("sweeper panicked");
    }

    let metrics = controller.metrics();
    println!("{}", metrics.summary());
    println!();
    println!("{}", controller.stats());

    let health = metrics.health_status();
    if health.is_unhealthy() {
        warn!(%health, action = health.suggested_action(), "controller unhealthy");
    }

    Ok(())
}

fn dispatch(controller: &AdmissionController, worker: usize) {
    for round in 0..40 {
        for chat in 0..3 {
            // The flooding chat sends every round, the others every fifth.
            if chat != 0 && round % 5 != 0 {
                continue;
            }

            let identity = format!("chat:{worker}-{chat}");
            match controller.check_now(identity.as_str()) {
                Decision::Admit => info!(identity = %identity, round, "delivered"),
                Decision::Reject => {
                    let remaining = controller
                        .cooldown_remaining(identity.as_str(), floodgate::current_time_ms())
                        .unwrap_or_default();
                    info!(
                        identity = %identity,
                        round,
                        retry_in_ms = u64::try_from(remaining.as_millis()).unwrap_or(u64::MAX),
                        "throttled"
                    );
                }
            }
        }
        thread::sleep(Duration::from_millis(100));
    }
}
