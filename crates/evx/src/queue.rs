//! 🚦 The Ingestion Queue — one bounded channel to rule them all.
//!
//! 🎬 *[a request handler arrives, arms full of records]*
//! *[the queue is full. the handler waits. it does not drop anything.]*
//! *[somewhere a flush worker finally dequeues. the handler exhales.]*
//!
//! 📦 Every producer pushes here. Every flush worker pulls from here. It is the
//! only shared thing in the whole engine, and it is an `async_channel` bounded
//! MPMC channel, so nobody needs a mutex. The mutex stays home. The mutex is fine.
//!
//! 🧠 Knowledge graph:
//! - `enqueue` suspends while full → backpressure, never a drop
//! - `try_enqueue` refuses while full → [`EnqueueError::Full`], the flow-control signal
//! - `dequeue` returns `None` only once the queue is closed AND empty → drain done
//! - `close` is the shutdown lever: producers bounce, consumers keep draining
//!
//! 🦆

use async_channel::{Receiver, Sender, TryRecvError, TrySendError};
use thiserror::Error;

use crate::common::Record;

/// 💀 Why a record did not make it into the queue. The record comes back to you
/// either way. We are a queue, not a shredder.
#[derive(Debug, Error)]
pub enum EnqueueError {
    /// 🚦 At capacity. Not an error so much as a polite "not right now".
    #[error("ingestion queue is full")]
    Full(Record),
    /// 🚪 The queue was closed for shutdown. Nobody is coming to collect it.
    #[error("ingestion queue is closed")]
    Closed(Record),
}

impl EnqueueError {
    /// 🔙 Hand the rejected record back, whatever the reason.
    pub fn into_record(self) -> Record {
        match self {
            EnqueueError::Full(record) | EnqueueError::Closed(record) => record,
        }
    }
}

/// 🚦 A bounded, multi-producer, multi-consumer FIFO of [`Record`]s.
///
/// Clone it freely: every clone is another handle to the SAME channel.
/// Producers hold clones. Workers hold clones. The channel itself only closes
/// when someone calls [`close`](Self::close), not when a clone is dropped,
/// because every clone carries both ends.
#[derive(Debug, Clone)]
pub struct IngestionQueue {
    tx: Sender<Record>,
    rx: Receiver<Record>,
}

impl IngestionQueue {
    /// 🏗️ Build a queue with a fixed capacity. Zero is not a capacity, it's a cry
    /// for help; config validation catches it before we get here.
    pub fn bounded(capacity: usize) -> Self {
        let (tx, rx) = async_channel::bounded(capacity);
        Self { tx, rx }
    }

    /// 📥 Push a record, waiting politely while the queue is full.
    ///
    /// Only fails once the queue is closed, and then it hands the record back.
    pub async fn enqueue(&self, record: Record) -> Result<(), EnqueueError> {
        self.tx
            .send(record)
            .await
            .map_err(|rejected| EnqueueError::Closed(rejected.into_inner()))
    }

    /// 📥 Push a record only if there is room right now.
    pub fn try_enqueue(&self, record: Record) -> Result<(), EnqueueError> {
        self.tx.try_send(record).map_err(|rejected| match rejected {
            TrySendError::Full(record) => EnqueueError::Full(record),
            TrySendError::Closed(record) => EnqueueError::Closed(record),
        })
    }

    /// 📤 Pull the next record, waiting while the queue is empty.
    ///
    /// `None` means closed and fully drained. Not "empty for now". Empty forever.
    pub async fn dequeue(&self) -> Option<Record> {
        self.rx.recv().await.ok()
    }

    /// 📤 Non-blocking pull. `None` means nothing there right now (or ever).
    pub fn try_dequeue(&self) -> Option<Record> {
        match self.rx.try_recv() {
            Ok(record) => Some(record),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => None,
        }
    }

    /// 🚪 Stop accepting new records. Already-queued records stay dequeuable.
    /// Returns `true` if this call did the closing.
    pub fn close(&self) -> bool {
        self.tx.close()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    pub fn len(&self) -> usize {
        self.tx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        // 🔧 bounded() always sets a capacity; the fallback is unreachable in practice.
        self.tx.capacity().unwrap_or(usize::MAX)
    }
}
