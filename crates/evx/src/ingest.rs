//! 📥 Ingest: everything between "a client POSTed some bytes" and "a record is in the queue".
//!
//! 🧠 Knowledge graph:
//! - [`decode`]: NDJSON → [`EventPayload`] → enriched [`Record`](crate::common::Record)
//! - [`server`]: the axum router that calls it and feeds the queue

pub mod decode;
pub mod server;

pub use decode::{DecodeError, EventPayload, decode_body};
pub use server::{AppState, build_router, serve};
