//! 🚀 evx-cli — the front door, the bouncer, the maitre d' of evx.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 This binary crate is the thin CLI wrapper that loads config,
//! sets up logging, and then lets the real code do the heavy lifting.
//! Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// 📥 Accepts events over HTTP and writes them to ClickHouse in batches.
#[derive(Debug, Parser)]
#[command(name = "evx", version, about)]
struct Args {
    /// 🔧 TOML config file. Skipped if it doesn't exist; `EVX_*` env vars still apply.
    #[arg(default_value = "evx.toml")]
    config: PathBuf,
}

/// 🚀 main() — where it all begins. The genesis. The big bang.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the thing until Ctrl-C
/// 5. Handle errors (cry)
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 `RUST_LOG` decides; `info` if it doesn't
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // 🔒 Check the config file exists before we get too emotionally attached
    let config_file = args
        .config
        .try_exists()
        .with_context(|| {
            format!(
                "💀 Couldn't tell whether the configuration file exists. Check permissions, \
                 or use an absolute path to be absolutely certain. Was checking here: '{}'",
                args.config.display()
            )
        })?
        .then_some(args.config.as_path());

    let app_config = evx::load_config(config_file)
        .context("💀 In evx-cli, main, we couldn't load the config. Take a look at the file and the EVX_* env vars")?;

    // 🚀 SEND IT.
    let result = evx::run(app_config).await;

    if let Err(err) = result {
        error!("💀 error: {}", err);
        // -- 🧅 peel the onion of sadness, one layer at a time
        let mut the_vibes_are_giving_connection_issues = false;
        for cause in err.chain().skip(1) {
            error!("⚠️  cause: {}", cause);
            let cause_str = cause.to_string();
            if cause_str.contains("error sending request")
                || cause_str.contains("connection refused")
                || cause_str.contains("Connection refused")
                || cause_str.contains("tcp connect error")
                || cause_str.contains("dns error")
            {
                the_vibes_are_giving_connection_issues = true;
            }
        }

        // -- 📡 if it smells like a connection problem, it's probably a connection problem
        if the_vibes_are_giving_connection_issues {
            error!(
                "🔧 hint: looks like ClickHouse isn't reachable. \
                Check `sink_config.clickhouse.url` (default http://clickhouse-server:8123) \
                and that the server is actually running. If you're using Docker, try \
                `docker ps` to see what's up, or `docker compose up -d` to resurrect it. ☕"
            );
        }

        // 🗑️ Exit with prejudice.
        std::process::exit(1);
    }

    // ✅ Drained, committed, reported. Pop the champagne. 🍾
    Ok(())
}
