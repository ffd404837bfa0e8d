//! 🔍 Decode: turning newline-delimited JSON into [`Record`]s.
//!
//! 🎬 *[a POST arrives. it is 40KB of JSON, one event per line, gzipped,
//! with a Windows line ending on line 312 because of course it does.]*
//!
//! 🧠 Knowledge graph:
//! - `maybe_gunzip`: `Content-Encoding: gzip` bodies are inflated, capped at the body limit
//! - `decode_body`: split on `\n` (memchr), trim a trailing `\r`, skip blank lines,
//!   `serde_json` each line into an [`EventPayload`]. All or nothing: one bad line
//!   and the whole request bounces with its line number.
//! - `EventPayload::into_record`: the enrichment step, stamping server time and the peer IP

use std::borrow::Cow;
use std::io::Read;
use std::net::{IpAddr, Ipv4Addr};

use chrono::{DateTime, NaiveDateTime, SubsecRound, Utc};
use flate2::read::GzDecoder;
use serde::Deserialize;
use thiserror::Error;
use uuid::Uuid;

use crate::common::Record;

/// ⏰ `2024-03-14 09:26:53`. No zone, no fractions. It's UTC, trust us.
pub const CLIENT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 💀 Why a request body was turned away.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("line {line}: {source}")]
    Malformed {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
    #[error("request body is not valid gzip: {0}")]
    Gzip(#[source] std::io::Error),
    #[error("request body is larger than {limit} bytes once decompressed")]
    TooLarge { limit: usize },
}

/// 📨 One event as the client sends it, before we add our two cents.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventPayload {
    #[serde(deserialize_with = "deserialize_client_time")]
    pub client_time: DateTime<Utc>,
    pub device_id: Uuid,
    #[serde(default)]
    pub device_os: String,
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub sequence: i32,
    pub event: String,
    #[serde(default)]
    pub param_int: i32,
    #[serde(default)]
    pub param_str: String,
}

fn deserialize_client_time<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Cow::<str>::deserialize(deserializer)?;
    NaiveDateTime::parse_from_str(&raw, CLIENT_TIME_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| {
            serde::de::Error::custom(format!(
                "client_time {raw:?} does not match \"{CLIENT_TIME_FORMAT}\": {e}"
            ))
        })
}

impl EventPayload {
    /// 🏷️ Enrichment: the payload plus what only the server knows.
    pub fn into_record(self, server_time: DateTime<Utc>, ip: Ipv4Addr) -> Record {
        Record {
            client_time: self.client_time,
            server_time,
            ip,
            device_id: self.device_id,
            device_os: self.device_os,
            session: self.session,
            sequence: self.sequence,
            event: self.event,
            param_int: self.param_int,
            param_str: self.param_str,
        }
    }
}

/// ⏰ Now, to the second. The column is a `DateTime`, not a `DateTime64`.
pub fn server_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(0)
}

/// 📡 The column is IPv4. Mapped v6 addresses get unwrapped, real v6 gets `0.0.0.0`.
pub fn peer_ipv4(peer: IpAddr) -> Ipv4Addr {
    match peer {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6.to_ipv4_mapped().unwrap_or(Ipv4Addr::UNSPECIFIED),
    }
}

/// 🗜️ Inflate a gzip body, refusing to produce more than `limit` bytes.
pub fn gunzip(body: &[u8], limit: usize) -> Result<Vec<u8>, DecodeError> {
    let mut inflated = Vec::new();
    GzDecoder::new(body)
        .take(limit as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(DecodeError::Gzip)?;
    if inflated.len() > limit {
        return Err(DecodeError::TooLarge { limit });
    }
    Ok(inflated)
}

/// 🗜️ Plain bodies are borrowed as-is; gzip bodies are inflated.
pub fn maybe_gunzip(body: &[u8], gzipped: bool, limit: usize) -> Result<Cow<'_, [u8]>, DecodeError> {
    if gzipped {
        gunzip(body, limit).map(Cow::Owned)
    } else {
        Ok(Cow::Borrowed(body))
    }
}

/// ✂️ Lines with their 1-based line numbers. Blank lines are skipped but still counted.
pub fn split_lines(body: &[u8]) -> impl Iterator<Item = (usize, &[u8])> {
    let mut start = 0;
    let ends = memchr::memchr_iter(b'\n', body).chain(std::iter::once(body.len()));
    ends.enumerate()
        .map(move |(index, end)| {
            let mut line = &body[start..end];
            start = end + 1;
            if let [rest @ .., b'\r'] = line {
                line = rest;
            }
            (index + 1, line)
        })
        .filter(|(_, line)| !line.iter().all(u8::is_ascii_whitespace))
}

/// 🔍 Decode a whole body. Any malformed line fails the lot.
pub fn decode_body(body: &[u8]) -> Result<Vec<EventPayload>, DecodeError> {
    split_lines(body)
        .map(|(line, bytes)| {
            serde_json::from_slice(bytes).map_err(|source| DecodeError::Malformed { line, source })
        })
        .collect()
}
