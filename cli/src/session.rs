//! The `replay` and `show` subcommands.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, bail};
use tokio::sync::mpsc::UnboundedReceiver;

use weft_config::WeftConfig;
use weft_context::{FeedStore, SqliteFeedStore, hydrate};
use weft_core::FeedReconciler;
use weft_engine::{
    ChannelTransport, OutboundRequest, SessionRegistry, SessionSettings, SharedStore, now_ms,
};
use weft_types::SessionKey;
use weft_utils::DiffEngine;

use crate::cli::{ReplayArgs, SessionArgs, ShowArgs};
use crate::render::{FeedDump, render_feed};
use crate::script::{ScriptStep, parse_line};

pub fn session_settings(config: &WeftConfig) -> SessionSettings {
    SessionSettings {
        start_timeout: config.start_timeout(),
        provider_id: config.provider_id().map(str::to_string),
        sanitize: config.sanitize_limits(),
        resolver: config.resolver_weights(),
        diff: config.diff_limits(),
    }
}

fn database_path(config: &WeftConfig, args: &SessionArgs) -> PathBuf {
    args.db.clone().unwrap_or_else(|| config.database_path())
}

fn open_store(path: &Path) -> Result<SqliteFeedStore> {
    SqliteFeedStore::open(path)
        .with_context(|| format!("failed to open feed database {}", path.display()))
}

fn print_feed(feed: &FeedReconciler, config: &WeftConfig, json: bool) -> Result<()> {
    if json {
        let dump = serde_json::to_string_pretty(&FeedDump::new(feed))?;
        println!("{dump}");
    } else {
        print!("{}", render_feed(feed, &DiffEngine::new(config.diff_limits())));
    }
    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplayStats {
    pub events: usize,
    pub commands: usize,
    pub rejected: usize,
    pub skipped: usize,
    pub outbound: usize,
}

fn drain_outbound(rx: &mut UnboundedReceiver<OutboundRequest>, stats: &mut ReplayStats) {
    while let Ok(request) = rx.try_recv() {
        tracing::debug!(request = request.label(), "outbound request");
        stats.outbound += 1;
    }
}

pub async fn replay(config: &WeftConfig, args: ReplayArgs) -> Result<()> {
    let script = fs::read_to_string(&args.script)
        .with_context(|| format!("failed to read script {}", args.script.display()))?;
    let path = database_path(config, &args.session);
    let store: SharedStore = Arc::new(Mutex::new(open_store(&path)?));
    let mut registry = SessionRegistry::new(store, session_settings(config), config.feed_limits());

    let key = SessionKey::new(args.session.task.as_str());
    let (transport, mut outbound) = ChannelTransport::new();
    registry.open_session(key.clone(), Box::new(transport)).await?;
    tracing::info!(session = %key, script = %args.script.display(), db = %path.display(), "replay started");

    let started = now_ms();
    let mut stats = ReplayStats::default();
    for (index, line) in script.lines().enumerate() {
        let line_no = index + 1;
        // One virtual millisecond per line keeps run durations deterministic.
        let now = started + index as i64;
        let step = match parse_line(line) {
            Ok(Some(step)) => step,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(line = line_no, "skipping script line: {err:#}");
                stats.skipped += 1;
                continue;
            }
        };
        match step {
            ScriptStep::Event(value) => {
                registry.dispatch(&key, &value, now)?;
                stats.events += 1;
            }
            ScriptStep::Command(command) => {
                let name = command.name();
                let controller = registry
                    .session_mut(&key)
                    .context("session closed during replay")?;
                let result = command.run(controller, now);
                if result.success {
                    stats.commands += 1;
                } else {
                    let reason = result.error.unwrap_or_default();
                    if args.strict {
                        bail!("line {line_no}: {name} rejected: {reason}");
                    }
                    eprintln!("line {line_no}: {name} rejected: {reason}");
                    stats.rejected += 1;
                }
            }
        }
        drain_outbound(&mut outbound, &mut stats);
        for timed_out in registry.tick(now) {
            eprintln!("line {line_no}: session {timed_out} did not start in time");
        }
    }

    let controller = registry
        .session(&key)
        .context("session closed during replay")?;
    print_feed(controller.feed(), config, args.session.json)?;
    if !args.session.json {
        println!(
            "{} events, {} commands ({} rejected, {} lines skipped), {} outbound requests; session {}",
            stats.events,
            stats.commands,
            stats.rejected,
            stats.skipped,
            stats.outbound,
            controller.status()
        );
    }
    registry.dispose(&key).await;
    Ok(())
}

pub fn show(config: &WeftConfig, args: &ShowArgs) -> Result<()> {
    let path = database_path(config, &args.session);
    let store = open_store(&path)?;
    let key = SessionKey::new(args.session.task.as_str());
    let rows = store.load_session(&key)?;
    let hydrated = hydrate(&rows, config.feed_limits());
    if hydrated.dropped_rows() > 0 {
        eprintln!("{} stored rows skipped", hydrated.dropped_rows());
    }
    if hydrated.items().is_empty() && !args.session.json {
        println!("no stored feed for {key} in {}", path.display());
        return Ok(());
    }
    print_feed(hydrated.feed(), config, args.session.json)
}
