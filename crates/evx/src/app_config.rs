//! 🔧 App Configuration — the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." — every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.
//!
//! 🧠 Knowledge graph:
//! - `runtime`: the four knobs of the flush engine (queue capacity, batch size,
//!   batch TTL, worker count) plus how workers behave when the sink misbehaves
//! - `sink_config`: where committed batches land (ClickHouse, or RAM for tests)
//! - `server`: where the HTTP front desk listens
//! - Everything is static for the life of the process. Restart to change your mind.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, ensure};
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{ClickHouseSinkConfig, InMemorySinkConfig};

/// 📦 The AppConfig: one struct to rule them all, one struct to find them,
/// one struct to bring them all, and in the Figment bind them.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub runtime: RuntimeConfig,
    #[serde(default)]
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

/// 🎭 Where batches go to live. Externally tagged: `[sink_config.clickhouse]`.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    #[serde(rename = "in_memory", alias = "InMemory")]
    InMemory(InMemorySinkConfig),
    #[serde(rename = "clickhouse", alias = "ClickHouse")]
    ClickHouse(ClickHouseSinkConfig),
}

impl Default for SinkConfig {
    fn default() -> Self {
        SinkConfig::ClickHouse(ClickHouseSinkConfig::default())
    }
}

/// 🚑 What a flush worker does when the sink says no.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// 🩹 Report it, drop the broken batch, start a fresh one, keep going.
    #[default]
    Recover,
    /// 💀 Report it and stop the worker. The pool gets one worker smaller.
    Abort,
}

/// 🧵 The flush engine's knobs.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 🚦 How many records may wait in the ingestion queue before producers block.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 📦 Commit as soon as a worker has appended this many records.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// ⏰ Commit whatever a worker has after this long without a flush.
    #[serde(default = "default_batch_ttl_ms")]
    pub batch_ttl_ms: u64,
    /// 🧵 Flush workers in the pool. Fixed for the life of the process.
    #[serde(default = "default_num_workers")]
    pub num_workers: usize,
    /// 🫥 When the deadline fires on an empty batch, just rearm instead of committing nothing.
    #[serde(default)]
    pub skip_empty_commits: bool,
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    /// 🔁 First backoff step when the sink can't prepare a batch. Doubles each retry.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    /// 📣 Buffered failure events before new ones are dropped on the floor.
    #[serde(default = "default_failure_event_capacity")]
    pub failure_event_capacity: usize,
}

// 🚦 10k records of slack. Past that, producers wait their turn.
fn default_queue_capacity() -> usize {
    10_000
}

// 📦 100k rows per INSERT. ClickHouse likes them chunky.
fn default_batch_size() -> usize {
    100_000
}

// ⏰ five minutes. quiet hours still get their rows written, eventually.
fn default_batch_ttl_ms() -> u64 {
    300_000
}

fn default_num_workers() -> usize {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    10_000
}

fn default_failure_event_capacity() -> usize {
    1024
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            batch_size: default_batch_size(),
            batch_ttl_ms: default_batch_ttl_ms(),
            num_workers: default_num_workers(),
            skip_empty_commits: false,
            failure_policy: FailurePolicy::default(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            failure_event_capacity: default_failure_event_capacity(),
        }
    }
}

impl RuntimeConfig {
    pub fn batch_ttl(&self) -> Duration {
        Duration::from_millis(self.batch_ttl_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    /// 🔒 Zeroes here mean a queue nobody can enter, a batch that never fills,
    /// a timer that fires in a tight loop, or a pool with nobody in it.
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.queue_capacity > 0, "💀 runtime.queue_capacity must be > 0");
        ensure!(self.batch_size > 0, "💀 runtime.batch_size must be > 0");
        ensure!(self.batch_ttl_ms > 0, "💀 runtime.batch_ttl_ms must be > 0");
        ensure!(self.num_workers > 0, "💀 runtime.num_workers must be > 0");
        ensure!(
            self.failure_event_capacity > 0,
            "💀 runtime.failure_event_capacity must be > 0"
        );
        ensure!(
            self.retry_base_delay_ms <= self.retry_max_delay_ms,
            "💀 runtime.retry_base_delay_ms ({}) must not exceed retry_max_delay_ms ({})",
            self.retry_base_delay_ms,
            self.retry_max_delay_ms
        );
        Ok(())
    }
}

/// 🌐 The HTTP front desk.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,
    /// 📏 Largest request body we'll read, after decompression.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 80))
}

// 📏 16MiB. If one request carries more events than that, it should be two requests.
fn default_max_body_bytes() -> usize {
    16 * 1024 * 1024
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// 🚀 Load the config: from a file, from env vars, or from the sheer power of hoping.
///
/// 🔧 Merges environment variables (`EVX_*`, nested keys split on `__`, e.g.
/// `EVX_RUNTIME__BATCH_SIZE=500`) with an optional TOML file. TOML wins on conflicts.
/// No file? Env vars and defaults only. We don't assume a `evx.toml` into existence.
///
/// 💀 Returns an error if the config is unparseable or fails validation.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("EVX_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (EVX_*). \
             The file exists in our hearts, but apparently not on disk.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (EVX_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    let app_config: AppConfig = config.extract().context(context_msg)?;
    app_config
        .runtime
        .validate()
        .context("💀 The runtime config parsed fine but makes no sense")?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_test_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .expect("💀 Failed to create a temp config. The filesystem said 'new phone who dis'.");
        file.write_all(contents.as_bytes())
            .expect("💀 Failed to write test config.");
        file
    }

    #[test]
    fn the_one_where_every_knob_comes_from_the_file() {
        let config_file = write_test_config(
            r#"
            [runtime]
            queue_capacity = 8
            batch_size = 3
            batch_ttl_ms = 2000
            num_workers = 4
            skip_empty_commits = true
            failure_policy = "abort"

            [sink_config.clickhouse]
            url = "http://localhost:8123"
            table = "events_v2"

            [server]
            listen_addr = "127.0.0.1:8080"
            "#,
        );

        let app_config = load_config(Some(config_file.path()))
            .expect("💀 Full config should parse. The schema drift goblin does not get this win.");

        assert_eq!(app_config.runtime.queue_capacity, 8);
        assert_eq!(app_config.runtime.batch_size, 3);
        assert_eq!(app_config.runtime.batch_ttl(), Duration::from_secs(2));
        assert_eq!(app_config.runtime.num_workers, 4);
        assert!(app_config.runtime.skip_empty_commits);
        assert_eq!(app_config.runtime.failure_policy, FailurePolicy::Abort);
        assert_eq!(app_config.server.listen_addr, SocketAddr::from(([127, 0, 0, 1], 8080)));
        match app_config.sink_config {
            SinkConfig::ClickHouse(clickhouse) => {
                assert_eq!(clickhouse.url, "http://localhost:8123");
                assert_eq!(clickhouse.table, "events_v2");
                assert_eq!(clickhouse.database, "events", "unset fields keep their defaults");
            }
            honestly_who_knows => panic!(
                "💀 Expected ClickHouse sink config, but serde took us to {:?}. Plot twist energy.",
                honestly_who_knows
            ),
        }
    }

    #[test]
    fn the_one_where_defaults_show_up_uninvited_but_helpful() {
        let config_file = write_test_config("");

        let app_config: AppConfig = Figment::new()
            .merge(Toml::file(config_file.path()))
            .extract()
            .expect("💀 Empty config should fall back to defaults.");

        assert_eq!(app_config.runtime.queue_capacity, 10_000);
        assert_eq!(app_config.runtime.batch_size, 100_000);
        assert_eq!(app_config.runtime.batch_ttl(), Duration::from_secs(300));
        assert_eq!(app_config.runtime.num_workers, 2);
        assert!(!app_config.runtime.skip_empty_commits);
        assert_eq!(app_config.runtime.failure_policy, FailurePolicy::Recover);
        assert_eq!(app_config.server.listen_addr, SocketAddr::from(([0, 0, 0, 0], 80)));
        assert!(matches!(app_config.sink_config, SinkConfig::ClickHouse(_)));
    }

    #[test]
    fn the_one_where_the_in_memory_sink_brings_its_chaos_knobs() {
        let config_file = write_test_config(
            r#"
            [sink_config.InMemory]
            fail_next_commits = 2
            poison_event = "boom"
            "#,
        );

        let app_config = load_config(Some(config_file.path())).expect("💀 should parse");
        match app_config.sink_config {
            SinkConfig::InMemory(in_mem) => {
                assert_eq!(in_mem.fail_next_commits, 2);
                assert_eq!(in_mem.fail_next_prepares, 0);
                assert_eq!(in_mem.poison_event.as_deref(), Some("boom"));
            }
            other => panic!("💀 expected the in-memory sink, got {other:?}"),
        }
    }

    #[test]
    fn the_one_where_the_runtime_knobs_answer_to_their_own_names_only() {
        let config_file = write_test_config(
            r#"
            [runtime]
            channel_size = 12
            queue_capacity = 34
            "#,
        );

        let app_config = load_config(Some(config_file.path()))
            .expect("💀 Unknown keys are ignored, not fatal.");

        assert_eq!(app_config.runtime.queue_capacity, 34);
        assert_eq!(app_config.runtime.num_workers, default_num_workers());
    }

    #[test]
    fn the_one_where_zero_workers_is_not_a_pool() {
        let config_file = write_test_config(
            r#"
            [runtime]
            num_workers = 0
            "#,
        );

        let error = load_config(Some(config_file.path()))
            .expect_err("💀 zero workers should fail validation");
        assert!(
            format!("{error:#}").contains("num_workers"),
            "the error should name the offending knob, got: {error:#}"
        );
    }

    #[test]
    fn the_one_where_backoff_bounds_must_make_sense() {
        let runtime = RuntimeConfig {
            retry_base_delay_ms: 5_000,
            retry_max_delay_ms: 100,
            ..RuntimeConfig::default()
        };
        assert!(runtime.validate().is_err());
        assert!(RuntimeConfig::default().validate().is_ok());
    }
}
