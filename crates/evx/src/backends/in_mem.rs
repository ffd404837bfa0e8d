//! # Previously, on evx...
//!
//! 🎬 The events were ready. The ClickHouse server was not. It was in a
//! docker-compose file three directories away, and nobody had run `up -d`.
//! Someone had to catch the rows. Someone had to be brave. Someone had to
//! write a sink so simple it lives entirely in RAM, gone the moment you blink.
//!
//! That someone was this module.
//!
//! `in_mem` provides an in-memory [`Sink`] for tests and local runs. Committed
//! batches are kept behind an `Arc` so callers can inspect what arrived.
//! Great for assertions. Also great for trust issues.
//!
//! 🧨 It also misbehaves on request: fail the next N prepares, fail the next N
//! commits, or choke on every record with a given event name. Chaos, but
//! configurable. Like a toddler with a settings menu.
//!
//! 🦆
//!
//! ⚠️ This is NOT for production. If you're deploying this to prod, please
//! also deploy a therapist.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::{Result, bail};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::backends::{Batch, Sink};
use crate::common::Record;

/// 🧨 Fault injection knobs. All default to "behave".
#[derive(Debug, Default, Deserialize, Clone)]
pub struct InMemorySinkConfig {
    /// 💀 The next N `prepare` calls fail.
    #[serde(default)]
    pub fail_next_prepares: usize,
    /// 💀 The next N `commit` calls fail (and take their records with them).
    #[serde(default)]
    pub fail_next_commits: usize,
    /// ☠️ Any record whose `event` equals this is rejected on append.
    #[serde(default)]
    pub poison_event: Option<String>,
}

/// 📒 The shared ledger every clone of the sink (and every batch) writes into.
#[derive(Debug, Default)]
struct Ledger {
    committed: Mutex<Vec<Vec<Record>>>,
    faults: Mutex<InMemorySinkConfig>,
    prepared: AtomicUsize,
    appended: AtomicUsize,
}

/// 📦 A sink that never forgets. Unlike my dad, who forgot my soccer game in 1998.
///
/// Clone-able because each flush worker holds its own handle, and tests need to
/// peek inside after handing clones off to the pool. The `Arc` means everyone
/// shares the same ledger. Communist data, but in a good way.
#[derive(Debug, Default, Clone)]
pub(crate) struct InMemorySink {
    ledger: Arc<Ledger>,
}

impl InMemorySink {
    pub(crate) fn new(config: InMemorySinkConfig) -> Self {
        Self {
            ledger: Arc::new(Ledger {
                faults: Mutex::new(config),
                ..Ledger::default()
            }),
        }
    }

    /// 🔍 Every successfully committed batch, in commit order.
    pub(crate) async fn committed(&self) -> Vec<Vec<Record>> {
        self.ledger.committed.lock().await.clone()
    }

    /// 🔢 Successful commits so far (empty ones included).
    pub(crate) async fn commit_count(&self) -> usize {
        self.ledger.committed.lock().await.len()
    }

    /// 🔢 Batches handed out so far.
    pub(crate) fn prepared_count(&self) -> usize {
        self.ledger.prepared.load(Ordering::SeqCst)
    }

    /// 🔢 Records successfully appended so far, committed or not.
    pub(crate) fn appended_count(&self) -> usize {
        self.ledger.appended.load(Ordering::SeqCst)
    }

    /// 🧨 Arm more chaos mid-test.
    pub(crate) async fn fail_next_commits(&self, count: usize) {
        self.ledger.faults.lock().await.fail_next_commits = count;
    }

    pub(crate) async fn fail_next_prepares(&self, count: usize) {
        self.ledger.faults.lock().await.fail_next_prepares = count;
    }
}

#[async_trait]
impl Sink for InMemorySink {
    type Batch = InMemoryBatch;

    async fn prepare(&self) -> Result<InMemoryBatch> {
        {
            let mut faults = self.ledger.faults.lock().await;
            if faults.fail_next_prepares > 0 {
                faults.fail_next_prepares -= 1;
                bail!("💀 in-memory sink refused to prepare a batch (injected fault)");
            }
        }
        self.ledger.prepared.fetch_add(1, Ordering::SeqCst);
        Ok(InMemoryBatch {
            records: Vec::new(),
            ledger: Arc::clone(&self.ledger),
        })
    }
}

/// 📦 An in-flight batch. Lives in a worker, dies on commit (or on drop, unmourned).
#[derive(Debug)]
pub(crate) struct InMemoryBatch {
    records: Vec<Record>,
    ledger: Arc<Ledger>,
}

#[async_trait]
impl Batch for InMemoryBatch {
    async fn append(&mut self, record: Record) -> Result<()> {
        let poisoned = {
            let faults = self.ledger.faults.lock().await;
            faults.poison_event.as_deref() == Some(record.event.as_str())
        };
        if poisoned {
            bail!(
                "💀 in-memory sink rejected record seq={} event='{}' (injected fault)",
                record.sequence,
                record.event
            );
        }
        self.records.push(record);
        self.ledger.appended.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn commit(self) -> Result<()> {
        {
            let mut faults = self.ledger.faults.lock().await;
            if faults.fail_next_commits > 0 {
                faults.fail_next_commits -= 1;
                bail!(
                    "💀 in-memory sink refused to commit {} records (injected fault)",
                    self.records.len()
                );
            }
        }
        // 🔒 the Mutex is load-bearing: several workers commit into the same ledger.
        self.ledger.committed.lock().await.push(self.records);
        Ok(())
    }
}
