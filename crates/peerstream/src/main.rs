mod config;
mod control;
mod hooks;
mod report;

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use fileserver::{FileServerApi, GatewayOptions};
use tokio::sync::broadcast::{self, error::RecvError};
use torrent::{
    blocklist, format_size, EngineEvent, FileOrder, FileSelector, FlowController, SwarmEngine,
    TorrentApi,
};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::report::{Reporter, REPORT_INTERVAL};

/// Time given to background tasks once the server has stopped
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file
    let _ = dotenv::dotenv();

    let config = Config::parse();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start async runtime")?;

    let result = runtime.block_on(run(config));
    // A pending stdin read must not hold the process open
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    result
}

async fn run(config: Config) -> anyhow::Result<()> {
    let ranges = match &config.blocklist {
        Some(path) => blocklist::parse(path)
            .with_context(|| format!("Failed to read blocklist {}", path.display()))?,
        None => Vec::new(),
    };

    let api = TorrentApi::connect(config.qbit_settings(), &config.torrent)
        .await
        .context("Failed to attach torrent in qBittorrent")?;
    let engine: Arc<dyn SwarmEngine> = Arc::new(api.clone());

    let mut events = engine.subscribe();
    let watcher = api.spawn_watcher();

    if !ranges.is_empty() {
        engine.block(&ranges).await.context("Failed to apply blocklist")?;
        tracing::info!("Blocking {} address ranges", ranges.len());
    }
    for peer in &config.peers {
        if let Err(e) = engine.connect(peer).await {
            tracing::warn!("Failed to add peer {}: {}", peer, e);
        }
    }

    wait_until_ready(&mut events).await?;

    let selector = Arc::new(FileSelector::new(engine.clone()));
    if config.list {
        for file in selector.sorted_files(FileOrder::Path) {
            println!("{} : {} : {}", file.index, file.name, format_size(file.length));
        }
        watcher.abort();
        return Ok(());
    }

    selector
        .resolve(config.index)
        .await
        .context("Failed to select the file to stream")?;
    if config.all {
        selector.select_all().await.context("Failed to select all files")?;
    }

    tokio::spawn(FlowController::new(engine.clone()).run());
    tokio::spawn(
        Reporter::new(engine.clone(), selector.clone(), config.on_downloaded.clone())
            .run(engine.subscribe(), REPORT_INTERVAL),
    );
    if std::io::stdin().is_terminal() {
        tracing::info!("Type p and Enter to pause or resume the download");
        tokio::spawn(control::watch_input(tokio::io::stdin(), selector.clone()));
    }

    let listener = FileServerApi::bind(config.bind_host(), config.port).await?;
    let url = config.stream_url(listener.local_addr()?.port());
    if config.quiet {
        println!("Server is listening on {}", url);
    } else {
        tracing::info!("Server is listening on {}", url);
    }
    if let Some(command) = &config.on_listening {
        hooks::spawn_hook(command, Some(&url));
    }

    let server = FileServerApi::new(engine.clone(), selector, GatewayOptions::default());
    server.serve(listener, shutdown_signal()).await?;

    tracing::info!("Exiting");
    watcher.abort();
    if config.remove {
        engine.remove().await.context("Failed to remove torrent")?;
    }
    Ok(())
}

/// Block until the engine has metadata, logging verification of existing data
async fn wait_until_ready(events: &mut broadcast::Receiver<EngineEvent>) -> anyhow::Result<()> {
    tracing::info!("Fetching torrent metadata");
    let mut verified = 0u64;
    loop {
        match events.recv().await {
            Ok(EngineEvent::Ready) => {
                if verified > 0 {
                    tracing::info!("Verified {} pieces", verified);
                }
                return Ok(());
            }
            Ok(EngineEvent::Verifying) => tracing::info!("Verifying downloaded data"),
            Ok(EngineEvent::Verify { .. }) => verified += 1,
            Ok(_) | Err(RecvError::Lagged(_)) => {}
            Err(RecvError::Closed) => bail!("Engine stopped before the torrent was ready"),
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
