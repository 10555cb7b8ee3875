// src/main.rs

//! `pawn-redis-host`: a stand-in game server host. It loads a Lua script as the
//! scripting VM, binds the configured channels and queues to its callbacks, and
//! drives the tick loop that delivers messages.

use anyhow::{Context, Result, anyhow};
use pawn_redis::config::Config;
use pawn_redis::core::scripting::LuaHost;
use pawn_redis::RedisContext;
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{error, info, warn};
use tracing_subscriber::{filter::EnvFilter, prelude::*};

fn main() -> Result<()> {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    let args: Vec<String> = env::args().collect();

    if args.contains(&"--version".to_string()) {
        println!("pawn-redis-host version {VERSION}");
        return Ok(());
    }

    // Defaults to "pawn-redis.toml" when --config is not given.
    let config_path = args
        .iter()
        .position(|arg| arg == "--config")
        .and_then(|i| args.get(i + 1))
        .map(|s| s.as_str())
        .unwrap_or("pawn-redis.toml");

    let config = match Config::from_file(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to load configuration from \"{config_path}\": {e:#}");
            std::process::exit(1);
        }
    };

    let log_level = env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone());
    tracing_subscriber::registry()
        .with(EnvFilter::new(log_level))
        .with(tracing_subscriber::fmt::layer().compact().with_ansi(true))
        .init();

    info!("pawn-redis-host {} starting", VERSION);
    if let Err(e) = run(config) {
        error!("Host runtime error: {:#}", e);
        return Err(e);
    }
    Ok(())
}

fn run(config: Config) -> Result<()> {
    let mut host = LuaHost::from_file(&config.script)?;
    let ctx = RedisContext::new(&config.context).context("Failed to start the bridge runtime")?;

    let auth = config.store.auth.as_deref().unwrap_or("");
    let handle = ctx
        .connect(&config.store.host, i32::from(config.store.port), auth)
        .map_err(|e| anyhow!("Failed to connect to the store (code {}): {e}", e.code()))?;

    for sub in &config.subscriptions {
        ctx.subscribe(handle, &sub.channel, &sub.callback)
            .map_err(|e| anyhow!("Failed to subscribe to '{}': {e}", sub.channel))?;
    }
    for queue in &config.queues {
        ctx.bind_message(handle, &queue.list, &queue.callback)
            .map_err(|e| anyhow!("Failed to bind queue '{}': {e}", queue.list))?;
    }

    let stop = Arc::new(AtomicBool::new(false));
    let stop_signal = stop.clone();
    ctx.runtime_handle().spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop_signal.store(true, Ordering::SeqCst);
        }
    });

    info!(
        "ticking every {:?} with {} subscription(s) and {} queue(s)",
        config.tick_interval,
        config.subscriptions.len(),
        config.queues.len()
    );
    while !stop.load(Ordering::SeqCst) {
        let started = Instant::now();
        let report = ctx.tick_drain(&mut host);
        if report.failed > 0 || report.missing > 0 {
            warn!(
                "tick delivered {} message(s), {} missing callback(s), {} failure(s)",
                report.delivered, report.missing, report.failed
            );
        }
        if let Some(rest) = config.tick_interval.checked_sub(started.elapsed()) {
            std::thread::sleep(rest);
        }
    }

    info!("shutting down");
    ctx.close_all();
    Ok(())
}
