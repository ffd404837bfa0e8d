//! 🎬 *[a queue fills with records. somewhere, a batch waits.]*
//! *[the clock on the wall reads 2:47am. the deadline timer reads 4m59s.]*
//! *[nobody asked for a hundred thousand rows. and yet, here we are.]*
//!
//! 🚰 The FlushWorker module. Patient, tireless, and deeply unbothered by the
//! chaos happening upstream. It pulls records. It appends them. It commits when
//! the batch is full or the clock runs out, whichever comes first. Then it
//! starts over with a fresh batch and a freshly wound timer.
//!
//! 🧠 Knowledge graph (the state machine, such as it is):
//! ```text
//!           ┌──────────── append ok, count < batch_size ───────────┐
//!           ▼                                                      │
//!   ┌──────────────┐  count == batch_size  ┌──────────┐            │
//!   │ ACCUMULATING │──────────────────────▶│ FLUSHING │            │
//!   │ batch, count │──── deadline fired ──▶│  commit  │            │
//!   └──────────────┘                       └────┬─────┘            │
//!           ▲      fresh batch, count = 0,      │                  │
//!           └────── timer rearmed to full TTL ◀─┘                  │
//!           └──────────────────────────────────────────────────────┘
//! ```
//! - Each worker owns exactly one batch and one deadline. Nothing else is shared
//!   except the queue, so there is nothing to lock.
//! - The deadline is polled first, so a firehose of records can't starve a
//!   time-triggered flush.
//! - The queue closing is the shutdown signal: drain it, commit one last time, go home.
//! - When the sink says no, the [`FailurePolicy`] decides: report and carry on
//!   with a fresh batch, or report and stop.
//!
//! 🦆 (the duck has no comment at this time)

use std::fmt;
use std::time::Duration;

use anyhow::{Result, anyhow};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

use super::Worker;
use crate::app_config::{FailurePolicy, RuntimeConfig};
use crate::backends::{Batch, BatchBackend, Sink, SinkBackend};
use crate::common::Record;
use crate::queue::IngestionQueue;
use crate::supervisors::health::{FailureEvent, FailureKind, PoolHealth};

/// 🔁 Prepare attempts a worker gets once the queue is closed. Enough to ride out
/// a blip during shutdown, not enough to hang it on a dead sink.
pub(crate) const DRAIN_PREPARE_ATTEMPTS: u32 = 5;

/// ⏰ Why a batch got committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FlushTrigger {
    Size,
    Deadline,
    Drain,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FlushTrigger::Size => "size",
            FlushTrigger::Deadline => "deadline",
            FlushTrigger::Drain => "drain",
        };
        f.write_str(name)
    }
}

/// 📐 The per-worker slice of [`RuntimeConfig`].
#[derive(Debug, Clone)]
pub(crate) struct FlushPolicy {
    pub(crate) batch_size: usize,
    pub(crate) batch_ttl: Duration,
    pub(crate) skip_empty_commits: bool,
    pub(crate) failure_policy: FailurePolicy,
    pub(crate) retry_base_delay: Duration,
    pub(crate) retry_max_delay: Duration,
}

impl From<&RuntimeConfig> for FlushPolicy {
    fn from(runtime: &RuntimeConfig) -> Self {
        Self {
            batch_size: runtime.batch_size,
            batch_ttl: runtime.batch_ttl(),
            skip_empty_commits: runtime.skip_empty_commits,
            failure_policy: runtime.failure_policy,
            retry_base_delay: runtime.retry_base_delay(),
            retry_max_delay: runtime.retry_max_delay(),
        }
    }
}

/// 📦 The ACCUMULATING state: the open batch, how much is in it, and when it's due.
#[derive(Debug)]
pub(crate) struct Accumulator {
    batch: BatchBackend,
    count: usize,
    deadline: Instant,
}

impl Accumulator {
    /// 🆕 Fresh batch, zero count, timer wound to the full TTL from right now.
    fn fresh(batch: BatchBackend, ttl: Duration) -> Self {
        Self {
            batch,
            count: 0,
            deadline: Instant::now() + ttl,
        }
    }

    fn rearmed(self, ttl: Duration) -> Self {
        Self {
            deadline: Instant::now() + ttl,
            ..self
        }
    }

    pub(crate) fn count(&self) -> usize {
        self.count
    }

    pub(crate) fn deadline(&self) -> Instant {
        self.deadline
    }
}

/// 🔔 What woke the worker up.
enum Wake {
    Deadline,
    Dequeued(Option<Record>),
}

/// 🚰 The FlushWorker: takes records from the queue, batches them into a sink.
#[derive(Debug)]
pub(crate) struct FlushWorker {
    worker_id: usize,
    queue: IngestionQueue,
    sink: SinkBackend,
    policy: FlushPolicy,
    health: PoolHealth,
}

impl FlushWorker {
    pub(crate) fn new(
        worker_id: usize,
        queue: IngestionQueue,
        sink: SinkBackend,
        policy: FlushPolicy,
        health: PoolHealth,
    ) -> Self {
        Self {
            worker_id,
            queue,
            sink,
            policy,
            health,
        }
    }

    /// 🎬 Initial state: ACCUMULATING with an empty batch and a full TTL.
    pub(crate) async fn begin(&self) -> Result<Accumulator> {
        let batch = self.open_batch().await?;
        Ok(Accumulator::fresh(batch, self.policy.batch_ttl))
    }

    /// 📥 One record arrived. Append it; flush if that filled the batch.
    ///
    /// A rejected append poisons the whole batch: it is dropped uncommitted,
    /// never shipped as if it were complete.
    pub(crate) async fn on_record(&self, mut acc: Accumulator, record: Record) -> Result<Accumulator> {
        match acc.batch.append(record).await {
            Ok(()) => {
                acc.count += 1;
                if acc.count >= self.policy.batch_size {
                    return self.flush(acc, FlushTrigger::Size).await;
                }
                Ok(acc)
            }
            Err(append_error) => {
                let Accumulator {
                    batch,
                    count,
                    deadline,
                } = acc;
                drop(batch);
                self.fail(FailureKind::Append, count + 1, append_error)?;
                let batch = self.open_batch().await?;
                Ok(Accumulator {
                    batch,
                    count: 0,
                    deadline,
                })
            }
        }
    }

    /// ⏰ The deadline fired. Commit whatever we have, even if that's nothing
    /// (unless we've been told empty commits are a waste of everyone's time).
    pub(crate) async fn on_deadline(&self, acc: Accumulator) -> Result<Accumulator> {
        if acc.count == 0 && self.policy.skip_empty_commits {
            debug!(worker_id = self.worker_id, "⏰ deadline on an empty batch, rearming");
            return Ok(acc.rearmed(self.policy.batch_ttl));
        }
        self.flush(acc, FlushTrigger::Deadline).await
    }

    /// 🚀 FLUSHING: commit, then back to ACCUMULATING with a fresh batch and timer.
    async fn flush(&self, acc: Accumulator, trigger: FlushTrigger) -> Result<Accumulator> {
        self.commit(acc.batch, acc.count, trigger).await?;
        let batch = self.open_batch().await?;
        Ok(Accumulator::fresh(batch, self.policy.batch_ttl))
    }

    /// 🏁 The queue is closed and empty. One last commit, then we're done.
    async fn drain(&self, acc: Accumulator) -> Result<()> {
        debug!(worker_id = self.worker_id, records = acc.count(), "🏁 queue drained, final commit");
        if acc.count() == 0 && self.policy.skip_empty_commits {
            return Ok(());
        }
        self.commit(acc.batch, acc.count, FlushTrigger::Drain).await
    }

    async fn commit(&self, batch: BatchBackend, count: usize, trigger: FlushTrigger) -> Result<()> {
        match batch.commit().await {
            Ok(()) => {
                self.health.record_commit(count);
                debug!(
                    worker_id = self.worker_id,
                    records = count,
                    %trigger,
                    "🚀 batch committed"
                );
                Ok(())
            }
            Err(commit_error) => self.fail(FailureKind::Commit, count, commit_error),
        }
    }

    /// 🏗️ Ask the sink for a batch, backing off until it says yes.
    ///
    /// Under [`FailurePolicy::Abort`] the first refusal is final. Once the queue
    /// is closed the retries are capped at [`DRAIN_PREPARE_ATTEMPTS`], and an
    /// empty closed queue means there is nothing left to prepare for.
    async fn open_batch(&self) -> Result<BatchBackend> {
        let mut delay = self.policy.retry_base_delay;
        let mut attempts_while_draining = 0u32;
        loop {
            match self.sink.prepare().await {
                Ok(batch) => return Ok(batch),
                Err(prepare_error) => {
                    let message = format!("{prepare_error:#}");
                    self.fail(FailureKind::Prepare, 0, prepare_error)?;
                    if self.queue.is_closed() {
                        attempts_while_draining += 1;
                        if self.queue.is_empty() || attempts_while_draining >= DRAIN_PREPARE_ATTEMPTS {
                            return Err(anyhow!(
                                "💀 worker {} could not prepare a batch while draining \
                                 ({} record(s) still queued): {message}",
                                self.worker_id,
                                self.queue.len()
                            ));
                        }
                    }
                    warn!(
                        worker_id = self.worker_id,
                        retry_in_ms = delay.as_millis() as u64,
                        draining = self.queue.is_closed(),
                        "🔁 sink would not prepare a batch, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(self.policy.retry_max_delay);
                }
            }
        }
    }

    /// 💀 Log it, count it, publish it. Then let the policy decide if we keep going.
    fn fail(&self, kind: FailureKind, records_lost: usize, cause: anyhow::Error) -> Result<()> {
        error!(
            worker_id = self.worker_id,
            %kind,
            records_lost,
            error = %format!("{cause:#}"),
            "💀 sink {kind} failed"
        );
        self.health.record_failure(FailureEvent {
            worker_id: self.worker_id,
            kind,
            records_lost,
            error: format!("{cause:#}"),
        });
        match self.policy.failure_policy {
            FailurePolicy::Recover => Ok(()),
            FailurePolicy::Abort => Err(cause.context(format!(
                "FlushWorker {} aborted after a sink {kind} failure",
                self.worker_id
            ))),
        }
    }

    /// 🔄 The loop: wait for "next record OR deadline", react, repeat until drained.
    async fn run(&self) -> Result<()> {
        let mut acc = self.begin().await?;
        loop {
            let wake = tokio::select! {
                biased;
                () = sleep_until(acc.deadline()) => Wake::Deadline,
                next = self.queue.dequeue() => Wake::Dequeued(next),
            };
            acc = match wake {
                Wake::Deadline => self.on_deadline(acc).await?,
                Wake::Dequeued(Some(record)) => self.on_record(acc, record).await?,
                Wake::Dequeued(None) => return self.drain(acc).await,
            };
        }
    }
}

impl Worker for FlushWorker {
    fn start(self) -> JoinHandle<Result<()>> {
        // 🩺 counted alive before the task exists, so a snapshot taken right
        // after start never shows a pool of ghosts. The token leaves with the
        // task, panics included.
        let alive = self.health.worker_started();
        tokio::spawn(async move {
            let _alive = alive;
            debug!(worker_id = self.worker_id, "📥 FlushWorker started draining the queue");
            let outcome = self.run().await;
            match &outcome {
                Ok(()) => info!(worker_id = self.worker_id, "🏁 FlushWorker drained. Shutting down."),
                Err(e) => error!(worker_id = self.worker_id, "💀 FlushWorker stopped: {e:#}"),
            }
            outcome
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemorySink, InMemorySinkConfig};
    use crate::common::fixtures::{poison_record, sample_record, sequences};

    fn policy(batch_size: usize, batch_ttl: Duration) -> FlushPolicy {
        FlushPolicy {
            batch_size,
            batch_ttl,
            skip_empty_commits: false,
            failure_policy: FailurePolicy::Recover,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(1),
        }
    }

    struct Rig {
        worker: FlushWorker,
        queue: IngestionQueue,
        sink: InMemorySink,
        health: PoolHealth,
    }

    fn rig(sink: InMemorySink, policy: FlushPolicy) -> Rig {
        let queue = IngestionQueue::bounded(64);
        let health = PoolHealth::new(1, 64);
        let worker = FlushWorker::new(
            0,
            queue.clone(),
            SinkBackend::InMemory(sink.clone()),
            policy,
            health.clone(),
        );
        Rig {
            worker,
            queue,
            sink,
            health,
        }
    }

    const FOREVER: Duration = Duration::from_secs(3600);

    #[tokio::test]
    async fn the_one_where_nothing_commits_below_the_threshold() -> Result<()> {
        let rig = rig(InMemorySink::default(), policy(3, FOREVER));
        let mut acc = rig.worker.begin().await?;
        for n in 1..=2 {
            acc = rig.worker.on_record(acc, sample_record(n)).await?;
        }

        assert_eq!(acc.count(), 2);
        assert_eq!(rig.sink.commit_count().await, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_exactly_batch_size_records_commit_once_in_order() -> Result<()> {
        let rig = rig(InMemorySink::default(), policy(3, FOREVER));
        let mut acc = rig.worker.begin().await?;
        for n in 1..=3 {
            acc = rig.worker.on_record(acc, sample_record(n)).await?;
        }

        let committed = rig.sink.committed().await;
        assert_eq!(committed.len(), 1);
        assert_eq!(sequences(&committed[0]), vec![1, 2, 3]);
        assert_eq!(acc.count(), 0, "count resets after a flush");
        assert_eq!(rig.sink.prepared_count(), 2, "a fresh batch replaced the committed one");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_r4_waits_for_the_next_cycle() -> Result<()> {
        // 🧪 batch_size=3, [r1,r2,r3,r4], no deadline → one commit of r1..r3, r4 pending
        let rig = rig(InMemorySink::default(), policy(3, FOREVER));
        let mut acc = rig.worker.begin().await?;
        for n in 1..=4 {
            acc = rig.worker.on_record(acc, sample_record(n)).await?;
        }

        let committed = rig.sink.committed().await;
        assert_eq!(committed.len(), 1);
        assert_eq!(sequences(&committed[0]), vec![1, 2, 3]);
        assert_eq!(acc.count(), 1, "r4 sits in the next, uncommitted batch");
        assert_eq!(rig.sink.appended_count(), 4);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_deadline_commits_a_partial_batch_and_rearms() -> Result<()> {
        let ttl = Duration::from_secs(2);
        let rig = rig(InMemorySink::default(), policy(100, ttl));
        let mut acc = rig.worker.begin().await?;
        acc = rig.worker.on_record(acc, sample_record(1)).await?;
        acc = rig.worker.on_record(acc, sample_record(2)).await?;

        tokio::time::advance(Duration::from_millis(700)).await;
        let committed_at = Instant::now();
        let acc = rig.worker.on_deadline(acc).await?;

        let committed = rig.sink.committed().await;
        assert_eq!(committed.len(), 1);
        assert_eq!(sequences(&committed[0]), vec![1, 2]);
        assert_eq!(acc.count(), 0);
        assert_eq!(acc.deadline(), committed_at + ttl, "timer measured from the commit");
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_deadline_still_commits_by_default() -> Result<()> {
        let rig = rig(InMemorySink::default(), policy(100, FOREVER));
        let acc = rig.worker.begin().await?;
        let acc = rig.worker.on_deadline(acc).await?;

        assert_eq!(rig.sink.committed().await, vec![Vec::<Record>::new()]);
        assert_eq!(rig.health.snapshot().empty_commits, 1);
        assert_eq!(acc.count(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_skip_empty_commits_just_rewinds_the_clock() -> Result<()> {
        let ttl = Duration::from_secs(5);
        let rig = rig(
            InMemorySink::default(),
            FlushPolicy {
                skip_empty_commits: true,
                ..policy(100, ttl)
            },
        );
        let acc = rig.worker.begin().await?;
        tokio::time::advance(Duration::from_secs(5)).await;
        let acc = rig.worker.on_deadline(acc).await?;

        assert_eq!(rig.sink.commit_count().await, 0);
        assert_eq!(rig.sink.prepared_count(), 1, "the same empty batch is kept");
        assert_eq!(acc.deadline(), Instant::now() + ttl);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_poisoned_append_never_ships_a_partial_batch() -> Result<()> {
        let sink = InMemorySink::new(InMemorySinkConfig {
            poison_event: Some("poison".to_string()),
            ..InMemorySinkConfig::default()
        });
        let rig = rig(sink, policy(100, FOREVER));
        let events = rig.health.failure_events();

        let mut acc = rig.worker.begin().await?;
        acc = rig.worker.on_record(acc, sample_record(1)).await?;
        acc = rig.worker.on_record(acc, poison_record(2)).await?;
        assert_eq!(acc.count(), 0, "the broken batch was thrown away");

        acc = rig.worker.on_record(acc, sample_record(3)).await?;
        rig.worker.on_deadline(acc).await?;

        let committed = rig.sink.committed().await;
        assert_eq!(committed.len(), 1);
        assert_eq!(sequences(&committed[0]), vec![3], "r1 never shipped as if complete");

        let event = events.try_recv().expect("💀 the append failure must be surfaced");
        assert_eq!(event.kind, FailureKind::Append);
        assert_eq!(event.records_lost, 2);
        assert_eq!(rig.health.snapshot().records_lost, 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_abort_policy_surfaces_the_append_error() -> Result<()> {
        let sink = InMemorySink::new(InMemorySinkConfig {
            poison_event: Some("poison".to_string()),
            ..InMemorySinkConfig::default()
        });
        let rig = rig(
            sink,
            FlushPolicy {
                failure_policy: FailurePolicy::Abort,
                ..policy(100, FOREVER)
            },
        );

        let acc = rig.worker.begin().await?;
        let acc = rig.worker.on_record(acc, sample_record(1)).await?;
        let outcome = rig.worker.on_record(acc, poison_record(2)).await;

        let error = outcome.expect_err("💀 abort policy must propagate the append failure");
        assert!(format!("{error:#}").contains("aborted after a sink append failure"));
        assert_eq!(rig.sink.commit_count().await, 0, "no partial commit on the way out");
        assert_eq!(rig.health.snapshot().failures, 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_failed_commit_is_reported_and_life_goes_on() -> Result<()> {
        let rig = rig(InMemorySink::default(), policy(2, FOREVER));
        rig.sink.fail_next_commits(1).await;
        let events = rig.health.failure_events();

        let mut acc = rig.worker.begin().await?;
        for n in 1..=4 {
            acc = rig.worker.on_record(acc, sample_record(n)).await?;
        }

        let committed = rig.sink.committed().await;
        assert_eq!(committed.len(), 1);
        assert_eq!(sequences(&committed[0]), vec![3, 4]);

        let event = events.try_recv().expect("💀 the commit failure must be surfaced");
        assert_eq!(event.kind, FailureKind::Commit);
        assert_eq!(event.records_lost, 2);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_prepare_backs_off_until_the_sink_comes_around() -> Result<()> {
        let rig = rig(InMemorySink::default(), policy(10, FOREVER));
        rig.sink.fail_next_prepares(2).await;
        let started = Instant::now();

        let acc = rig.worker.begin().await?;

        assert_eq!(acc.count(), 0);
        // 🔁 100ms, then 200ms of backoff before the third attempt lands
        assert!(Instant::now() - started >= Duration::from_millis(300));
        let snapshot = rig.health.snapshot();
        assert_eq!(snapshot.failures, 2);
        assert_eq!(snapshot.records_lost, 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_prepare_gives_up_once_the_queue_is_closed() {
        let rig = rig(InMemorySink::default(), policy(10, FOREVER));
        rig.sink.fail_next_prepares(1).await;
        rig.queue.close();

        assert!(rig.worker.begin().await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_blip_during_shutdown_still_drains_everything() -> Result<()> {
        let Rig {
            worker,
            queue,
            sink,
            health,
        } = rig(InMemorySink::default(), policy(2, FOREVER));
        let handle = worker.start();
        tokio::task::yield_now().await;
        assert_eq!(sink.prepared_count(), 1, "the first batch opened cleanly");

        sink.fail_next_prepares(1).await;
        for n in 1..=4 {
            queue.enqueue(sample_record(n)).await?;
        }
        queue.close();
        handle.await??;

        let committed: Vec<Record> = sink.committed().await.into_iter().flatten().collect();
        assert_eq!(sequences(&committed), vec![1, 2, 3, 4], "r3 and r4 made it too");
        assert!(queue.is_empty());
        let snapshot = health.snapshot();
        assert_eq!(snapshot.records_committed, 4);
        assert_eq!(snapshot.records_lost, 0);
        assert_eq!(snapshot.failures, 1, "the blip is still on the record");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_a_dead_sink_during_shutdown_gives_up_eventually() -> Result<()> {
        let Rig {
            worker,
            queue,
            sink,
            health,
        } = rig(InMemorySink::default(), policy(2, FOREVER));
        let handle = worker.start();
        tokio::task::yield_now().await;

        sink.fail_next_prepares(usize::MAX).await;
        for n in 1..=4 {
            queue.enqueue(sample_record(n)).await?;
        }
        queue.close();

        assert!(handle.await?.is_err(), "a sink that never comes back ends the drain");
        assert_eq!(health.snapshot().failures, u64::from(DRAIN_PREPARE_ATTEMPTS));
        assert_eq!(queue.len(), 2, "r3 and r4 are left for the pool to account for");
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_deadline_cuts_in_line_ahead_of_queued_records() -> Result<()> {
        let Rig {
            worker,
            queue,
            sink,
            ..
        } = rig(InMemorySink::default(), policy(100, Duration::from_secs(2)));
        let handle = worker.start();
        tokio::task::yield_now().await;

        queue.enqueue(sample_record(1)).await?;
        queue.enqueue(sample_record(2)).await?;
        tokio::task::yield_now().await;
        assert_eq!(sink.appended_count(), 2);

        // 🚦 records waiting AND the deadline passed: both branches are ready at once
        for n in 3..=5 {
            queue.enqueue(sample_record(n)).await?;
        }
        tokio::time::advance(Duration::from_secs(3)).await;
        queue.close();
        handle.await??;

        let committed = sink.committed().await;
        assert_eq!(committed.len(), 2);
        assert_eq!(sequences(&committed[0]), vec![1, 2], "the deadline went first");
        assert_eq!(sequences(&committed[1]), vec![3, 4, 5]);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn the_one_where_the_clock_runs_out_at_two_and_not_before() -> Result<()> {
        // 🧪 batch_size=100, TTL=2s, [r1,r2] then silence → one commit at ~2s
        let Rig {
            worker,
            queue,
            sink,
            ..
        } = rig(InMemorySink::default(), policy(100, Duration::from_secs(2)));
        let handle = worker.start();

        queue.enqueue(sample_record(1)).await?;
        queue.enqueue(sample_record(2)).await?;

        tokio::time::sleep(Duration::from_millis(1_900)).await;
        assert_eq!(sink.commit_count().await, 0, "too early to flush");

        tokio::time::sleep(Duration::from_millis(200)).await;
        let committed = sink.committed().await;
        assert_eq!(committed.len(), 1);
        assert_eq!(sequences(&committed[0]), vec![1, 2]);

        // ⏰ rearmed from the commit at t=2s: the next (empty) flush is at t=4s
        tokio::time::sleep(Duration::from_millis(1_800)).await;
        assert_eq!(sink.commit_count().await, 1);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(sink.commit_count().await, 2);

        queue.close();
        handle.await??;
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_closing_the_queue_drains_and_commits_the_stragglers() -> Result<()> {
        let Rig {
            worker,
            queue,
            sink,
            health,
        } = rig(InMemorySink::default(), policy(10, FOREVER));
        for n in 1..=3 {
            queue.enqueue(sample_record(n)).await?;
        }
        queue.close();

        worker.start().await??;

        let committed = sink.committed().await;
        assert_eq!(committed.len(), 1);
        assert_eq!(sequences(&committed[0]), vec![1, 2, 3]);
        assert_eq!(health.snapshot().workers_alive, 0);
        Ok(())
    }
}
