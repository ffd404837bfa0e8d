//! # 🏠 THE CLICKHOUSE BACKEND
//!
//! 🎬 COLD OPEN — INT. SERVER ROOM — 3:47 AM
//!
//! A MergeTree sits in the dark, sorted by `server_time`, waiting. It does not
//! want your rows one at a time. It has told us this. Repeatedly. With parts.
//! So many parts. "Too many parts," it says, in the logs, in a tone.
//!
//! 🚀 This module is how rows reach it in bulk: one `INSERT` per batch, sent over
//! the HTTP interface in RowBinary by the `clickhouse` crate. Prepare hands out an
//! empty batch. Append buffers a row in memory. Commit opens the insert, writes
//! every buffered row, ends it, and waits for the server to say yes. No request
//! is in flight while a batch fills up, so a slow TTL never holds a socket open.
//! Drop without commit and the server never knew.
//!
//! ⚠️ Schema provisioning lives here too: `CREATE TABLE IF NOT EXISTS` at boot,
//! so the first batch of the day doesn't discover the table is missing.
//!
//! 🦆

use anyhow::{Context, Result, ensure};
use async_trait::async_trait;
use clickhouse::Client;
use clickhouse::insert::Insert;
use serde::Deserialize;
use tracing::{debug, info};

use crate::backends::{Batch, Sink};
use crate::common::Record;

// 🏠 ClickHouseSinkConfig lives next to the sink it configures. Socks near feet.
#[derive(Debug, Deserialize, Clone)]
pub struct ClickHouseSinkConfig {
    /// 📡 HTTP interface URL, scheme and port included.
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_username")]
    pub username: String,
    /// 🔒 Empty by default, which is a confession, not a password.
    #[serde(default)]
    pub password: String,
    /// 🏗️ Run `CREATE TABLE IF NOT EXISTS` on startup.
    #[serde(default = "default_create_table")]
    pub create_table: bool,
}

fn default_url() -> String {
    "http://clickhouse-server:8123".to_string()
}

fn default_database() -> String {
    "events".to_string()
}

fn default_table() -> String {
    "events".to_string()
}

fn default_username() -> String {
    "default".to_string()
}

fn default_create_table() -> bool {
    true
}

impl Default for ClickHouseSinkConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            database: default_database(),
            table: default_table(),
            username: default_username(),
            password: String::new(),
            create_table: default_create_table(),
        }
    }
}

/// 🧱 Table and database names get spliced into DDL, so they only get to be boring.
fn ensure_plain_identifier(kind: &str, name: &str) -> Result<()> {
    ensure!(
        !name.is_empty()
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_'),
        "💀 ClickHouse {kind} name '{name}' must be non-empty and only [A-Za-z0-9_]. \
         Backticks, dots, and semicolons are how incidents start."
    );
    Ok(())
}

/// 🏗️ The DDL for the events table: ten columns, 1:1 with [`Record`], sorted by arrival.
pub(crate) fn create_table_sql(database: &str, table: &str) -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {database}.{table}
        (
            client_time DateTime,
            server_time DateTime,
            ip IPv4,
            device_id UUID,
            device_os String,
            session String,
            sequence Int32,
            event String,
            param_int Int32,
            param_str String
        )
        ENGINE = MergeTree()
        ORDER BY server_time"
    )
}

/// 📦 The sink side of ClickHouse. A client (which is secretly a connection pool)
/// and a table name. Clone it per worker; the pool comes along for the ride.
#[derive(Clone)]
pub(crate) struct ClickHouseSink {
    client: Client,
    config: ClickHouseSinkConfig,
}

// 🎭 manual Debug impl: the client keeps its HTTP internals to itself, and the
// password keeps itself out of the logs.
impl std::fmt::Debug for ClickHouseSink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseSink")
            .field("url", &self.config.url)
            .field("database", &self.config.database)
            .field("table", &self.config.table)
            .finish()
    }
}

impl ClickHouseSink {
    /// 🚀 Build the client and, if configured, make sure the table exists.
    pub(crate) async fn new(config: ClickHouseSinkConfig) -> Result<Self> {
        ensure_plain_identifier("database", &config.database)?;
        ensure_plain_identifier("table", &config.table)?;

        let client = Client::default()
            .with_url(config.url.as_str())
            .with_database(config.database.as_str())
            .with_user(config.username.as_str())
            .with_password(config.password.as_str());

        let sink = Self { client, config };
        if sink.config.create_table {
            sink.ensure_table().await?;
        }
        info!(
            url = %sink.config.url,
            database = %sink.config.database,
            table = %sink.config.table,
            "🏠 ClickHouse sink ready"
        );
        Ok(sink)
    }

    /// 🏗️ `CREATE TABLE IF NOT EXISTS`. Idempotent, unlike my Monday mornings.
    pub(crate) async fn ensure_table(&self) -> Result<()> {
        let ddl = create_table_sql(&self.config.database, &self.config.table);
        debug!(table = %self.config.table, "🏗️ provisioning events table");
        self.client.query(&ddl).execute().await.context(format!(
            "💀 Failed to create table '{}.{}' at '{}'. Either the server is down, \
             the credentials are wrong, or the database doesn't exist. Pick one. Check all three.",
            self.config.database, self.config.table, self.config.url
        ))
    }
}

#[async_trait]
impl Sink for ClickHouseSink {
    type Batch = ClickHouseBatch;

    async fn prepare(&self) -> Result<ClickHouseBatch> {
        Ok(ClickHouseBatch {
            client: self.client.clone(),
            table: self.config.table.clone(),
            rows: Vec::new(),
        })
    }
}

/// 📦 Rows waiting for their `INSERT`. Nothing touches the network until commit.
pub(crate) struct ClickHouseBatch {
    client: Client,
    table: String,
    rows: Vec<Record>,
}

impl std::fmt::Debug for ClickHouseBatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClickHouseBatch")
            .field("table", &self.table)
            .field("rows", &self.rows.len())
            .finish()
    }
}

#[async_trait]
impl Batch for ClickHouseBatch {
    async fn append(&mut self, record: Record) -> Result<()> {
        self.rows.push(record);
        Ok(())
    }

    /// 🚀 insert → write × N → end, all or nothing.
    async fn commit(self) -> Result<()> {
        let Self {
            client,
            table,
            rows,
        } = self;
        let mut insert: Insert<Record> = client
            .insert(&table)
            .await
            .context(format!("💀 Failed to open an INSERT into '{table}'"))?;
        for row in &rows {
            insert
                .write(row)
                .await
                .context(format!("💀 Failed to write a row into the INSERT on '{table}'"))?;
        }
        insert.end().await.context(format!(
            "💀 ClickHouse rejected a batch of {} rows. They were so close to the disk.",
            rows.len()
        ))
    }
}
