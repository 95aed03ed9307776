//! nitter-relay — forwards new posts of one Nitter account to a Telegram chat.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌────────────┐ FeedItems ┌──────────┐  text   ┌──────────────┐
//! │ source/    │ ────────► │ poll.rs  │ ──────► │ sink/        │
//! │ (Nitter)   │           │ (engine) │         │ (Telegram)   │
//! └────────────┘           └──────────┘         └──────────────┘
//!                               │ after each delivery
//!                               ▼
//!                          ┌──────────┐
//!                          │ state.rs │  JSON file, temp + rename
//!                          └──────────┘
//!
//! ┌────────────┐
//! │ health.rs  │  GET / and /health, runs alongside the engine
//! └────────────┘
//! ```
//!
//! * **`config`** — flags and environment, parsed once.
//! * **`source/`** — the `DataSource` trait and the Nitter RSS source.
//! * **`sink/`** — the `DeliverySink` trait and the Telegram sink.
//! * **`state`** — durable record of what was already delivered.
//! * **`poll`** — the engine: fetch, pick new items, deliver, record.
//! * **`health`** — liveness endpoint.
//! * **`main`** — wires everything together and supervises the two tasks.

mod config;
mod health;
mod poll;
mod sink;
mod source;
mod state;

use anyhow::{bail, Context, Result};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use config::Config;
use poll::Engine;
use sink::TelegramSink;
use source::NitterSource;
use state::StateStore;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    init_tracing();

    if let Err(e) = run(Config::load()).await {
        error!(error = ?e, "terminated with error");
        std::process::exit(1);
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(config: Config) -> Result<()> {
    // -- shared HTTP client (bounded timeout for every call) -----------------
    let client = reqwest::Client::builder()
        .timeout(config.http_timeout())
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to build HTTP client")?;

    // -- collaborators -------------------------------------------------------
    let source = NitterSource::new(client.clone(), config.source_instance(), &config.target_username);
    let sink = TelegramSink::new(client, &config.telegram_api_base, config.credentials());
    let store = StateStore::new(&config.state_file);

    info!(
        url = %config.feed_url(),
        state_file = %config.state_file.display(),
        "starting relay"
    );

    let mut engine = Engine::new(
        Box::new(source),
        Box::new(sink),
        store,
        config.target_username.clone(),
        config.poll_interval(),
    );

    if config.once {
        let report = engine.run_cycle().await;
        info!(
            fetched = report.fetched,
            novel = report.novel,
            delivered = report.delivered,
            failed = report.failed,
            last_guid = ?engine.state().last_guid,
            "single cycle finished"
        );
        return Ok(());
    }

    // -- supervise: either task ending is fatal, Ctrl-C is a clean stop ------
    let mut poll_task = tokio::spawn(engine.run());
    let mut health_task = tokio::spawn(health::serve(config.port()));

    tokio::select! {
        res = &mut poll_task => {
            res.context("poll engine panicked")?;
            bail!("poll engine stopped unexpectedly")
        }
        res = &mut health_task => {
            res.context("health server panicked")?
                .context("health server failed")?;
            bail!("health server stopped unexpectedly")
        }
        res = tokio::signal::ctrl_c() => {
            res.context("failed to listen for Ctrl-C")?;
            info!("stopped by user");
            Ok(())
        }
    }
}
