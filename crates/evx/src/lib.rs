//! 🚀 evx — events in, batches out.
//!
//! 🎬 *[narrator voice]* "Every event wanted to be a row. But rows come in batches,
//! and batches come when they're full or when the clock says so. Whichever first."
//!
//! 📦 Producers (the HTTP front desk) push [`Record`]s into a bounded
//! [`IngestionQueue`]. A fixed pool of flush workers pulls from it, each one
//! accumulating a batch and committing it to the sink on size or deadline.
//! Ctrl-C closes the front door, closes the queue, and waits for the drain. 🦆

use std::future;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::net::TcpListener;
use tracing::{info, warn};

pub mod app_config;
mod backends;
pub mod common;
pub mod ingest;
pub mod queue;
mod report;
mod supervisors;

pub use app_config::{AppConfig, load_config};
pub use backends::{ClickHouseSinkConfig, InMemorySinkConfig};
pub use common::Record;
pub use queue::{EnqueueError, IngestionQueue};
pub use supervisors::{FailureEvent, FailureKind, HealthSnapshot, PoolHealth};

use crate::backends::SinkBackend;
use crate::ingest::AppState;
use crate::supervisors::Supervisor;

/// 🚀 Build the sink, start the pool, serve until Ctrl-C, drain, report.
pub async fn run(app_config: AppConfig) -> Result<()> {
    let started = Instant::now();

    let sink = SinkBackend::from_config(&app_config.sink_config)
        .await
        .context("💀 Could not set up the sink. No sink, no service.")?;
    let listener = TcpListener::bind(app_config.server.listen_addr)
        .await
        .with_context(|| {
            format!(
                "💀 Could not bind {}. Someone else is sitting in our chair.",
                app_config.server.listen_addr
            )
        })?;

    let supervisor = Supervisor::start(&app_config.runtime, sink)?;
    let state = AppState {
        queue: supervisor.queue(),
        health: supervisor.health(),
        max_body_bytes: app_config.server.max_body_bytes,
    };

    // 🌐 a server error still drains the pool before we report it
    let served = ingest::serve(listener, state, shutdown_signal()).await;

    let drained = supervisor.shutdown().await;
    if let Ok(snapshot) = &drained {
        info!(
            "📊 final tally\n{}",
            report::summary_table(snapshot, started.elapsed())
        );
    }
    settle(served, drained)
}

/// 🧾 One verdict from two outcomes. If both went wrong, neither gets swallowed.
fn settle(served: Result<()>, drained: Result<HealthSnapshot>) -> Result<()> {
    match (served, drained) {
        (Ok(()), Ok(_)) => Ok(()),
        (Err(server), Ok(_)) => Err(server),
        (Ok(()), Err(shutdown)) => Err(shutdown),
        (Err(server), Err(shutdown)) => Err(shutdown.context(format!(
            "💀 the pool did not drain cleanly, and before that the HTTP server failed: {server:#}"
        ))),
    }
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("🛑 Ctrl-C received, closing the front door"),
        Err(e) => {
            warn!("⚠️ could not listen for Ctrl-C ({e}), running until killed");
            future::pending::<()>().await;
        }
    }
}
