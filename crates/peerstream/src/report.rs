//! Periodic progress reporting

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast::{self, error::RecvError};
use torrent::{format_size, format_speed, EngineEvent, FileSelector, SwarmEngine};

use crate::hooks;

/// How often a progress line is logged
pub const REPORT_INTERVAL: Duration = Duration::from_secs(5);

/// Counters fed by engine events
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Progress {
    pub verified: u64,
    pub invalid: u64,
    pub hotswaps: u64,
    pub downloaded: bool,
}

impl Progress {
    /// Record `event`; returns true the first time demand is lost, which is
    /// when the selected files are complete
    pub fn record(&mut self, event: EngineEvent) -> bool {
        match event {
            EngineEvent::Verify { .. } => self.verified += 1,
            EngineEvent::InvalidPiece { .. } => self.invalid += 1,
            EngineEvent::Hotswap => self.hotswaps += 1,
            EngineEvent::Uninterested if !self.downloaded => {
                self.downloaded = true;
                return true;
            }
            _ => {}
        }
        false
    }
}

/// Logs swarm progress and fires the download-complete hook
pub struct Reporter {
    engine: Arc<dyn SwarmEngine>,
    selector: Arc<FileSelector>,
    on_downloaded: Option<String>,
    progress: Progress,
    started: Instant,
}

impl Reporter {
    pub fn new(
        engine: Arc<dyn SwarmEngine>,
        selector: Arc<FileSelector>,
        on_downloaded: Option<String>,
    ) -> Self {
        Self {
            engine,
            selector,
            on_downloaded,
            progress: Progress::default(),
            started: Instant::now(),
        }
    }

    /// Log progress every `interval` and count events until the engine's
    /// event stream closes
    pub async fn run(mut self, mut events: broadcast::Receiver<EngineEvent>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.report().await,
                event = events.recv() => match event {
                    Ok(event) => {
                        if self.progress.record(event) {
                            tracing::info!("Selected files downloaded");
                            if let Some(command) = &self.on_downloaded {
                                hooks::spawn_hook(command, None);
                            }
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!("Progress reporter missed {} events", missed);
                    }
                    Err(RecvError::Closed) => break,
                },
            }
        }
    }

    async fn report(&self) {
        let stats = match self.engine.stats().await {
            Ok(stats) => stats,
            Err(e) => {
                tracing::debug!("Failed to read swarm stats: {}", e);
                return;
            }
        };

        let file = self
            .selector
            .primary()
            .map(|file| format!("{} ({})", file.name, format_size(file.length)))
            .unwrap_or_else(|| "nothing".to_string());
        let paused = if self.selector.is_paused() { " [paused]" } else { "" };

        tracing::info!(
            "Streaming {}{} - {} from {}/{} peers",
            file,
            paused,
            format_speed(stats.download_speed),
            stats.active_peers,
            stats.total_peers
        );
        tracing::info!(
            "Downloaded {} and uploaded {} in {}s with {} hotswaps, verified {} pieces, {} invalid, peer queue size {}",
            format_size(stats.downloaded),
            format_size(stats.uploaded),
            self.started.elapsed().as_secs(),
            self.progress.hotswaps,
            self.progress.verified,
            self.progress.invalid,
            stats.queued_peers
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use torrent::MemoryEngine;

    #[test]
    fn test_counters() {
        let mut progress = Progress::default();
        progress.record(EngineEvent::Verify { piece: 0 });
        progress.record(EngineEvent::Verify { piece: 1 });
        progress.record(EngineEvent::InvalidPiece { piece: 2 });
        progress.record(EngineEvent::Hotswap);
        progress.record(EngineEvent::Interested);

        assert_eq!(progress.verified, 2);
        assert_eq!(progress.invalid, 1);
        assert_eq!(progress.hotswaps, 1);
        assert!(!progress.downloaded);
    }

    #[test]
    fn test_downloaded_fires_once() {
        let mut progress = Progress::default();
        assert!(progress.record(EngineEvent::Uninterested));
        assert!(!progress.record(EngineEvent::Interested));
        assert!(!progress.record(EngineEvent::Uninterested));
        assert!(progress.downloaded);
    }

    #[tokio::test]
    async fn test_reporter_stops_when_events_close() {
        let engine = Arc::new(MemoryEngine::builder().file("a.mkv", vec![0u8; 4]).build());
        let selector = Arc::new(FileSelector::new(engine.clone()));
        let reporter = Reporter::new(engine, selector, None);

        let (tx, rx) = broadcast::channel(4);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(5), reporter.run(rx, REPORT_INTERVAL))
            .await
            .unwrap();
    }
}
