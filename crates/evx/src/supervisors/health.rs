//! 🩺 Pool health — "is anybody still in there?"
//!
//! 🎬 *[the queue is full. every producer is blocked. from the outside it looks
//! like backpressure. from the inside, every worker died an hour ago.]*
//! *[nobody knew. there was no way to know.]*
//!
//! 📦 This module is the way to know. A handful of shared atomics every worker
//! bumps, a serializable snapshot for `/health`, and a bounded channel of
//! [`FailureEvent`]s for anyone who wants the gory details.
//!
//! 🧠 Knowledge graph:
//! - `PoolHealth` is cloned into every worker; clones share the same counters
//! - Failure events use `try_send`: a slow observer never stalls a flush worker
//! - `workers_alive == 0` is the "full outage" signal `/health` turns into a 503

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use async_channel::{Receiver, Sender};
use serde::Serialize;
use tracing::debug;

/// 💀 Which sink operation let us down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Prepare,
    Append,
    Commit,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Prepare => "prepare",
            FailureKind::Append => "append",
            FailureKind::Commit => "commit",
        };
        f.write_str(name)
    }
}

/// 📣 One structured "the sink said no" report.
#[derive(Debug, Clone, Serialize)]
pub struct FailureEvent {
    pub worker_id: usize,
    pub kind: FailureKind,
    /// 🪦 Records that went down with the batch (0 for prepare failures).
    pub records_lost: usize,
    pub error: String,
}

#[derive(Debug, Default)]
struct Counters {
    workers_alive: AtomicUsize,
    commits: AtomicU64,
    empty_commits: AtomicU64,
    records_committed: AtomicU64,
    records_lost: AtomicU64,
    failures: AtomicU64,
}

/// 📊 A point-in-time copy of the counters. Serializable, printable, immutable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HealthSnapshot {
    pub workers_configured: usize,
    pub workers_alive: usize,
    pub commits: u64,
    pub empty_commits: u64,
    pub records_committed: u64,
    pub records_lost: u64,
    pub failures: u64,
}

impl HealthSnapshot {
    /// ✅ At least one worker is still draining the queue.
    pub fn is_serving(&self) -> bool {
        self.workers_alive > 0
    }
}

/// 🎟️ Proof of life for one worker. Dropping it, on return or on unwind,
/// takes the worker off the alive count.
#[derive(Debug)]
pub(crate) struct AliveToken {
    counters: Arc<Counters>,
}

impl Drop for AliveToken {
    fn drop(&mut self) {
        self.counters.workers_alive.fetch_sub(1, Ordering::SeqCst);
    }
}

/// 🩺 Shared health counters plus the failure-event outlet.
#[derive(Debug, Clone)]
pub struct PoolHealth {
    counters: Arc<Counters>,
    workers_configured: usize,
    events_tx: Sender<FailureEvent>,
    events_rx: Receiver<FailureEvent>,
}

impl PoolHealth {
    pub(crate) fn new(workers_configured: usize, event_capacity: usize) -> Self {
        let (events_tx, events_rx) = async_channel::bounded(event_capacity);
        Self {
            counters: Arc::new(Counters::default()),
            workers_configured,
            events_tx,
            events_rx,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let c = &self.counters;
        HealthSnapshot {
            workers_configured: self.workers_configured,
            workers_alive: c.workers_alive.load(Ordering::SeqCst),
            commits: c.commits.load(Ordering::SeqCst),
            empty_commits: c.empty_commits.load(Ordering::SeqCst),
            records_committed: c.records_committed.load(Ordering::SeqCst),
            records_lost: c.records_lost.load(Ordering::SeqCst),
            failures: c.failures.load(Ordering::SeqCst),
        }
    }

    /// 📣 Subscribe to failure events. Every subscriber competes for the same
    /// events (it's a queue, not a broadcast), so usually you want exactly one.
    pub fn failure_events(&self) -> Receiver<FailureEvent> {
        self.events_rx.clone()
    }

    /// 🩺 Count one more worker alive until the returned token is dropped.
    #[must_use = "the worker counts as alive only while the token is held"]
    pub(crate) fn worker_started(&self) -> AliveToken {
        self.counters.workers_alive.fetch_add(1, Ordering::SeqCst);
        AliveToken {
            counters: Arc::clone(&self.counters),
        }
    }

    pub(crate) fn record_commit(&self, records: usize) {
        let c = &self.counters;
        c.commits.fetch_add(1, Ordering::SeqCst);
        if records == 0 {
            c.empty_commits.fetch_add(1, Ordering::SeqCst);
        }
        c.records_committed
            .fetch_add(records as u64, Ordering::SeqCst);
    }

    pub(crate) fn record_failure(&self, event: FailureEvent) {
        let c = &self.counters;
        c.failures.fetch_add(1, Ordering::SeqCst);
        c.records_lost
            .fetch_add(event.records_lost as u64, Ordering::SeqCst);
        if let Err(dropped) = self.events_tx.try_send(event) {
            debug!(
                "📣 failure event dropped, nobody is draining the outlet: {:?}",
                dropped.into_inner()
            );
        }
    }

    /// 🪦 Records nobody will ever commit (left in a closed queue after every
    /// worker has gone home). Counted as lost, no failure attached.
    pub(crate) fn record_stranded(&self, records: usize) {
        self.counters
            .records_lost
            .fetch_add(records as u64, Ordering::SeqCst);
    }

    /// 🚪 Close the outlet so subscribers see the end of the stream after shutdown.
    pub(crate) fn close_events(&self) {
        self.events_tx.close();
    }
}
