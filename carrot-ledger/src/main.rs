use carrot_ledger::clock::SystemClock;
use carrot_ledger::config::{AppConfig, ConfigError, EXAMPLE_CONFIG};
use carrot_ledger::service::{Service, ServiceOptions};
use carrot_ledger::storage::Store;
use carrot_shared::api::ServiceEvent;
use carrot_shared::auth::Actor;
mod cli;
mod commands;
mod session;

use std::path::Path;
use std::sync::Arc;
use tracing::{Instrument, info_span};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[tokio::main]
async fn main() {
    use clap::Parser;
    let args = cli::Cli::parse();
    if let cli::Command::InitConfig { path, force } = &args.command {
        if let Err(e) = write_example_config(path, *force) {
            eprintln!("init-config error: {}", e);
            std::process::exit(2);
        }
        println!("wrote {}", path.display());
        return;
    }

    // Logs go to stderr so stdout stays clean for --json
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();

    let config = match load_config(args.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error=%e, "Failed to load config");
            std::process::exit(2);
        }
    };
    let options = match ServiceOptions::from_config(&config) {
        Ok(o) => o,
        Err(e) => {
            tracing::error!(error=%e, "Invalid config");
            std::process::exit(2);
        }
    };

    let store = if args.ephemeral {
        None
    } else {
        let db_path = args
            .db
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| config.resolve_db_path());
        // Ensure data dir exists when using default
        if let Some(parent) = Path::new(&db_path).parent()
            && !parent.as_os_str().is_empty()
        {
            let _ = std::fs::create_dir_all(parent);
        }
        match Store::connect_sqlite(&db_path).await {
            Ok(s) => Some(s),
            Err(e) => {
                tracing::error!(error=%e, path=%db_path, "Failed to open database");
                std::process::exit(3);
            }
        }
    };

    let service = match Service::open(options, store, Arc::new(SystemClock)).await {
        Ok(s) => s,
        Err(e) => {
            tracing::error!(error=%e, "Failed to load ledger");
            std::process::exit(4);
        }
    };

    let mut code = match args.command {
        cli::Command::Ledger(cmd) => one_shot(&service, &args.actor, args.json, cmd).await,
        cli::Command::Session => session::run(&service, args.actor, args.json, shutdown_signal()).await,
        cli::Command::Snapshots { prune } => snapshots(&service, &args.actor, args.json, prune).await,
        cli::Command::InitConfig { .. } => 0,
    };

    if let Err(e) = service.shutdown().await {
        tracing::error!(error=%e, "Failed to save on shutdown");
        code = code.max(1);
    }
    std::process::exit(code);
}

fn load_config(path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    match path {
        // an explicitly named file has to exist
        Some(p) => AppConfig::load_from_path(p),
        None => AppConfig::load(),
    }
}

fn write_example_config(path: &Path, force: bool) -> Result<(), String> {
    if path.exists() && !force {
        return Err(format!(
            "{} already exists (use --force to overwrite)",
            path.display()
        ));
    }
    if let Some(dir) = path.parent()
        && !dir.as_os_str().is_empty()
    {
        std::fs::create_dir_all(dir).map_err(|e| format!("create dir {}: {}", dir.display(), e))?;
    }
    std::fs::write(path, EXAMPLE_CONFIG).map_err(|e| format!("write {}: {}", path.display(), e))
}

/// Runs one command, waits for any bonus it scheduled and reports it.
async fn one_shot(service: &Service, actor: &Actor, json: bool, cmd: cli::LedgerCommand) -> i32 {
    let span = info_span!("command", request_id = %Uuid::new_v4(), actor = %actor);
    let mut events = service.subscribe();
    let result = commands::run(service, actor, cmd).instrument(span).await;
    match result {
        Ok(out) => {
            println!("{}", out.render(json));
            service.drain().await;
            while let Ok(event) = events.try_recv() {
                if let ServiceEvent::BonusCredited(_) = &event
                    && !json
                    && let Some(text) = commands::event_line(&event)
                {
                    println!("{text}");
                }
            }
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

async fn snapshots(service: &Service, actor: &Actor, json: bool, prune: Option<u32>) -> i32 {
    let result = match prune {
        Some(keep) => service
            .prune_snapshots(actor, keep)
            .await
            .map(|removed| {
                if json {
                    serde_json::json!({ "removed": removed }).to_string()
                } else {
                    format!("removed {removed} snapshot(s)")
                }
            }),
        None => service.snapshots(actor).await.map(|rows| {
            if json {
                let rows: Vec<_> = rows
                    .iter()
                    .map(|r| serde_json::json!({ "id": r.id, "version": r.version, "saved_at": r.saved_at }))
                    .collect();
                serde_json::Value::Array(rows).to_string()
            } else if rows.is_empty() {
                "no snapshots".to_string()
            } else {
                rows.iter()
                    .map(|r| format!("#{} v{} saved {}", r.id, r.version, r.saved_at.format("%Y-%m-%d %H:%M:%S")))
                    .collect::<Vec<_>>()
                    .join("\n")
            }
        }),
    };
    match result {
        Ok(text) => {
            println!("{text}");
            0
        }
        Err(e) => {
            eprintln!("error: {e}");
            1
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let (Ok(mut sigint), Ok(mut sigterm)) = (
            signal(SignalKind::interrupt()),
            signal(SignalKind::terminate()),
        ) else {
            tracing::warn!("shutdown: cannot listen for signals, falling back to Ctrl+C");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };
        tokio::select! {
            _ = sigint.recv() => {
                tracing::info!("shutdown: received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("shutdown: received SIGTERM");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        tracing::info!("shutdown: received Ctrl+C");
    }
}
