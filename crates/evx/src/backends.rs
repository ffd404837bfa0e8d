//! 🔌 Backends — where the real I/O happens.
//!
//! 🚰 A flush worker asks a [`Sink`] for a fresh [`Batch`], appends records to
//! it one at a time, and commits it when the size or the clock says so.
//! That's the whole contract. Three verbs. Prepare, append, commit.
//! Fewer verbs than a toddler, more consequences.
//!
//! 🎭 This module is the casting agency. Need rows in ClickHouse? We've got a
//! backend for that. Need rows in a `Vec` so a test can stare at them? Also that.
//!
//! 🧠 Knowledge graph:
//! - Pattern: trait → concrete impls (InMemorySink, ClickHouseSink) → SinkBackend enum
//! - `Sink::prepare` must be callable over and over, handing out independent batches
//! - `Batch::commit` takes `self`: a committed batch is gone. No double commits.
//!   The borrow checker enforces what the old code only asked nicely for.
//! - Dropping a batch without committing discards it. For ClickHouse that aborts the INSERT.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::SinkConfig;
use crate::common::Record;

pub(crate) mod clickhouse;
pub(crate) mod in_mem;

pub use self::clickhouse::ClickHouseSinkConfig;
pub use self::in_mem::InMemorySinkConfig;

// ===== Sink and Batch traits =====

/// 🕳️ A destination that can hand out batches.
///
/// # Contract 📜
/// - `prepare` allocates a new, empty, independent batch bound to the destination.
/// - Connection pooling is the sink's business. Workers share one sink by cloning it.
#[async_trait]
pub(crate) trait Sink: std::fmt::Debug + Send + Sync {
    type Batch: Batch;

    /// 🏗️ Allocate a new empty batch. May fail; the destination might be having a day.
    async fn prepare(&self) -> Result<Self::Batch>;
}

/// 📦 One in-flight, append-only group of records headed for one destination write.
///
/// # Contract 📜
/// - `append` may fail per record (schema mismatch, transient I/O).
/// - `commit` may fail as a whole. Either way the batch is consumed.
/// - Neither is idempotent. Neither needs to be: you can't call them twice.
#[async_trait]
pub(crate) trait Batch: std::fmt::Debug + Send {
    /// 📥 Add one record to the batch.
    async fn append(&mut self, record: Record) -> Result<()>;
    /// 🚀 Ship the whole batch. Consumes the handle.
    async fn commit(self) -> Result<()>;
}

// ===== Backend enums =====

/// 🎭 The many faces of a Sink: a polymorphic casting call for destinations.
///
/// Cheap to clone: every variant is a handle over shared state (a connection
/// pool, or an `Arc`'d ledger), so each flush worker gets its own clone.
#[derive(Debug, Clone)]
pub(crate) enum SinkBackend {
    InMemory(in_mem::InMemorySink),
    ClickHouse(clickhouse::ClickHouseSink),
}

/// 🎭 ...and the many faces of the batches those sinks hand out.
#[derive(Debug)]
pub(crate) enum BatchBackend {
    InMemory(in_mem::InMemoryBatch),
    ClickHouse(clickhouse::ClickHouseBatch),
}

impl SinkBackend {
    /// 🚀 Build the sink the config asks for. For ClickHouse this connects and,
    /// if asked, provisions the table, so a bad URL fails at boot, not at 3am.
    pub(crate) async fn from_config(config: &SinkConfig) -> Result<Self> {
        match config {
            SinkConfig::InMemory(in_mem_config) => Ok(SinkBackend::InMemory(
                in_mem::InMemorySink::new(in_mem_config.clone()),
            )),
            SinkConfig::ClickHouse(clickhouse_config) => Ok(SinkBackend::ClickHouse(
                clickhouse::ClickHouseSink::new(clickhouse_config.clone()).await?,
            )),
        }
    }
}

#[async_trait]
impl Sink for SinkBackend {
    type Batch = BatchBackend;

    async fn prepare(&self) -> Result<BatchBackend> {
        match self {
            SinkBackend::InMemory(sink) => Ok(BatchBackend::InMemory(sink.prepare().await?)),
            SinkBackend::ClickHouse(sink) => Ok(BatchBackend::ClickHouse(sink.prepare().await?)),
        }
    }
}

#[async_trait]
impl Batch for BatchBackend {
    async fn append(&mut self, record: Record) -> Result<()> {
        match self {
            BatchBackend::InMemory(batch) => batch.append(record).await,
            BatchBackend::ClickHouse(batch) => batch.append(record).await,
        }
    }

    async fn commit(self) -> Result<()> {
        match self {
            BatchBackend::InMemory(batch) => batch.commit().await,
            BatchBackend::ClickHouse(batch) => batch.commit().await,
        }
    }
}
