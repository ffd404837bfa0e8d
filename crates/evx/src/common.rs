//! 📦 Common data structures — the building blocks of evx
//!
//! ---
//!
//! 🎬 COLD OPEN — INT. DATA CENTER — 3:47 AM
//!
//! 🌩️  A phone somewhere in the world taps a button. An event is born.
//! It has a device id, a session, a sequence number, and absolutely no idea
//! that it is about to wait in a queue with a hundred thousand of its closest
//! friends before anyone writes it down.
//!
//! ✅ This module defines that event: the [`Record`]. One row. Ten columns.
//! Zero opinions. It is decoded upstream, enriched upstream, and then handed
//! to the flush workers by value, exactly once, like a baton in a relay race
//! where dropping it is a data-loss incident.
//!
//! 🦆
//!
//! ⚠️  The field order here IS the column order of the destination table.
//! RowBinary does not negotiate. Reorder a field and ClickHouse will happily
//! read a session token as a device OS. Nobody wants that. Not even ClickHouse.

use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use clickhouse::Row;
use serde::Serialize;
use uuid::Uuid;

/// 🎯 A singular `Record`: one event, one row, one destiny.
///
/// Immutable once built. Moves by value from the decoder into the
/// [`IngestionQueue`](crate::queue::IngestionQueue), and from there into
/// exactly one flush worker's batch. Nobody clones it on the hot path.
/// (Tests clone it. Tests are allowed to have nice things.)
///
/// ```sql
/// CREATE TABLE events (
///     client_time DateTime,
///     server_time DateTime,
///     ip          IPv4,
///     device_id   UUID,
///     device_os   String,
///     session     String,
///     sequence    Int32,
///     event       String,
///     param_int   Int32,
///     param_str   String
/// ) ENGINE = MergeTree() ORDER BY server_time;
/// ```
#[derive(Debug, Clone, PartialEq, Row, Serialize)]
pub struct Record {
    /// ⏰ When the device says it happened. Devices lie. We store it anyway.
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub client_time: DateTime<Utc>,

    /// ⏰ When we say it arrived. We also lie, but consistently.
    #[serde(with = "clickhouse::serde::chrono::datetime")]
    pub server_time: DateTime<Utc>,

    /// 📡 Peer address as observed by the listener.
    #[serde(with = "clickhouse::serde::ipv4")]
    pub ip: Ipv4Addr,

    #[serde(with = "clickhouse::serde::uuid")]
    pub device_id: Uuid,

    pub device_os: String,
    pub session: String,

    /// 🔢 Per-session sequence number, as sent by the client.
    pub sequence: i32,

    /// 🏷️ The event name. "app_open", "purchase", "rage_quit", you know the drill.
    pub event: String,
    pub param_int: i32,
    pub param_str: String,
}
