//! 🎬 *[camera pans across a dimly lit server room]*
//! 🎬 *[dramatic orchestral music swells]*
//! 🎬 "In a world where workers toil endlessly..."
//! 🎬 "One supervisor dared to manage them all."
//! 🎬 *[record scratch]* 🦆
//!
//! 📦 The Supervisor module: the worker pool. It builds the ingestion queue,
//! starts a fixed crew of flush workers against it, hands producers a handle,
//! and at the end of the day closes the queue and waits for everyone to drain.
//!
//! ⚠️ DO NOT MAKE THE WORKERS PUB EVER
//! 💀 WORKERS ARE SUPERVISORS PRIVATE LITTLE MINIONS WHOM THE WORLD FORGOT ABOUT
//! 🔒 Like Fight Club, but for async tasks. First rule: you don't pub the workers.

mod health;
mod workers;

pub use health::{FailureEvent, FailureKind, HealthSnapshot, PoolHealth};

use anyhow::{Context, Result, anyhow};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::app_config::RuntimeConfig;
use crate::backends::SinkBackend;
use crate::queue::IngestionQueue;
use workers::{FlushPolicy, FlushWorker, Worker};

/// 📦 The Supervisor: a fixed-size pool of flush workers sharing one queue.
///
/// No resizing, no restarts. What it does have: a health handle that knows how
/// many workers are still alive, and a shutdown that doesn't leave rows behind.
#[derive(Debug)]
pub(crate) struct Supervisor {
    queue: IngestionQueue,
    health: PoolHealth,
    workers: Vec<JoinHandle<Result<()>>>,
}

impl Supervisor {
    /// 🧵 Unleash the workers! Like releasing the Kraken, but with more
    /// structured concurrency and fewer tentacles.
    ///
    /// Must be called from inside a tokio runtime.
    pub(crate) fn start(runtime: &RuntimeConfig, sink: SinkBackend) -> Result<Self> {
        runtime
            .validate()
            .context("💀 Supervisor refused to start with a nonsensical runtime config")?;

        let queue = IngestionQueue::bounded(runtime.queue_capacity);
        let health = PoolHealth::new(runtime.num_workers, runtime.failure_event_capacity);
        let policy = FlushPolicy::from(runtime);

        let workers = (0..runtime.num_workers)
            .map(|worker_id| {
                FlushWorker::new(
                    worker_id,
                    queue.clone(),
                    sink.clone(),
                    policy.clone(),
                    health.clone(),
                )
                .start()
            })
            .collect();

        info!(
            num_workers = runtime.num_workers,
            queue_capacity = runtime.queue_capacity,
            batch_size = runtime.batch_size,
            batch_ttl_ms = runtime.batch_ttl_ms,
            "🧵 flush workers are on the clock"
        );
        Ok(Self {
            queue,
            health,
            workers,
        })
    }

    /// 📥 The producer end. Clone away.
    pub(crate) fn queue(&self) -> IngestionQueue {
        self.queue.clone()
    }

    pub(crate) fn health(&self) -> PoolHealth {
        self.health.clone()
    }

    /// 🏁 Close the queue, let every worker drain and commit one last time, join them.
    ///
    /// Worker errors (abort policy, or a sink that wouldn't prepare during the
    /// drain) are logged and show up in the snapshot, along with any records the
    /// workers left behind in the queue. A panicked worker is an error.
    pub(crate) async fn shutdown(self) -> Result<HealthSnapshot> {
        info!(queued = self.queue.len(), "🚪 closing the ingestion queue, draining workers");
        self.queue.close();

        let outcomes = futures::future::join_all(self.workers).await;
        let mut panicked = 0usize;
        for (worker_id, outcome) in outcomes.into_iter().enumerate() {
            match outcome {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!(worker_id, "⚠️ worker ended with an error: {e:#}"),
                Err(join_error) => {
                    panicked += 1;
                    error!(worker_id, "💀 worker task did not finish cleanly: {join_error}");
                }
            }
        }

        // 🪦 every worker has left; whatever is still queued isn't going anywhere
        let mut stranded = 0usize;
        while self.queue.try_dequeue().is_some() {
            stranded += 1;
        }
        if stranded > 0 {
            error!(stranded, "💀 workers gave up with records still queued, counting them as lost");
            self.health.record_stranded(stranded);
        }

        self.health.close_events();
        let snapshot = self.health.snapshot();
        info!(
            commits = snapshot.commits,
            records_committed = snapshot.records_committed,
            records_lost = snapshot.records_lost,
            failures = snapshot.failures,
            "🏁 all workers drained"
        );
        if panicked > 0 {
            return Err(anyhow!("💀 {panicked} flush worker(s) panicked during shutdown"));
        }
        Ok(snapshot)
    }
}
