//! In-process swarm engine backed by byte buffers
//!
//! Serves files straight from memory and records every control call, which
//! makes it a stand-in for a real swarm in tests and demos. Files count as
//! still downloading until [`MemoryEngine::finish`] is called, so selecting
//! one raises demand the same way a real swarm does.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::broadcast;

use crate::blocklist::BlocklistRange;
use crate::demand::DemandTracker;
use crate::engine::{
    EngineEvent, FileEntry, FileStream, RangeRequest, SwarmEngine, SwarmStats,
    EVENT_CHANNEL_CAPACITY,
};
use crate::error::{Result, TorrentError};

/// A control call received by a [`MemoryEngine`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Select(usize),
    Deselect(usize),
    Pause,
    Resume,
    Connect(String),
    Block(usize),
    Remove,
}

struct MemoryFile {
    entry: FileEntry,
    data: Bytes,
    complete: bool,
}

/// Swarm engine serving in-memory files and recording control calls
pub struct MemoryEngine {
    files: RwLock<Vec<MemoryFile>>,
    stats: RwLock<SwarmStats>,
    calls: Mutex<Vec<EngineCall>>,
    fail_next: AtomicBool,
    events: broadcast::Sender<EngineEvent>,
    demand: DemandTracker,
}

/// Builder for [`MemoryEngine`]
#[derive(Default)]
pub struct MemoryEngineBuilder {
    files: Vec<(String, Bytes)>,
    stats: SwarmStats,
}

impl MemoryEngineBuilder {
    /// Add a file at `path` holding `data`
    pub fn file(mut self, path: impl Into<String>, data: impl Into<Bytes>) -> Self {
        self.files.push((path.into(), data.into()));
        self
    }

    /// Stats reported by `stats()`
    pub fn stats(mut self, stats: SwarmStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn build(self) -> MemoryEngine {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let files = self
            .files
            .into_iter()
            .enumerate()
            .map(|(index, (path, data))| MemoryFile {
                entry: FileEntry::new(index, path, data.len() as u64),
                data,
                complete: false,
            })
            .collect();

        MemoryEngine {
            files: RwLock::new(files),
            stats: RwLock::new(self.stats),
            calls: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            demand: DemandTracker::new(events.clone()),
            events,
        }
    }
}

impl MemoryEngine {
    pub fn builder() -> MemoryEngineBuilder {
        MemoryEngineBuilder::default()
    }

    /// Publish an event to all subscribers
    pub fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }

    /// Calls received so far, in order
    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Make the next control call fail after it is recorded
    pub fn fail_next_call(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn set_stats(&self, stats: SwarmStats) {
        *self.stats.write().unwrap_or_else(|e| e.into_inner()) = stats;
    }

    /// Mark a file fully downloaded
    pub fn finish(&self, index: usize) -> Result<()> {
        {
            let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
            let count = files.len();
            let file = files
                .get_mut(index)
                .ok_or(TorrentError::InvalidFileIndex { index, count })?;
            file.complete = true;
        }
        self.update_demand();
        Ok(())
    }

    fn update_demand(&self) {
        let wanted = {
            let files = self.files.read().unwrap_or_else(|e| e.into_inner());
            files.iter().any(|file| file.entry.selected && !file.complete)
        };
        self.demand.set_wanted(wanted);
    }

    fn record(&self, call: EngineCall) -> Result<()> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TorrentError::Io(std::io::Error::other("injected failure")));
        }
        Ok(())
    }

    fn set_selected(&self, index: usize, selected: bool) -> Result<()> {
        let mut files = self.files.write().unwrap_or_else(|e| e.into_inner());
        let count = files.len();
        let file = files
            .get_mut(index)
            .ok_or(TorrentError::InvalidFileIndex { index, count })?;
        file.entry.selected = selected;
        Ok(())
    }
}

#[async_trait]
impl SwarmEngine for MemoryEngine {
    fn files(&self) -> Vec<FileEntry> {
        let files = self.files.read().unwrap_or_else(|e| e.into_inner());
        files.iter().map(|file| file.entry.clone()).collect()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn select(&self, index: usize) -> Result<()> {
        self.record(EngineCall::Select(index))?;
        self.set_selected(index, true)?;
        self.update_demand();
        Ok(())
    }

    async fn deselect(&self, index: usize) -> Result<()> {
        self.record(EngineCall::Deselect(index))?;
        self.set_selected(index, false)?;
        self.update_demand();
        Ok(())
    }

    async fn open(&self, index: usize, range: Option<RangeRequest>) -> Result<FileStream> {
        let data = {
            let files = self.files.read().unwrap_or_else(|e| e.into_inner());
            let file = files.get(index).ok_or(TorrentError::InvalidFileIndex {
                index,
                count: files.len(),
            })?;
            file.data.clone()
        };

        let data = match range {
            Some(range) => {
                let end = (range.end as usize + 1).min(data.len());
                let start = (range.start as usize).min(end);
                data.slice(start..end)
            }
            None => data,
        };

        Ok(Box::pin(Cursor::new(data)))
    }

    async fn pause(&self) -> Result<()> {
        self.record(EngineCall::Pause)
    }

    async fn resume(&self) -> Result<()> {
        self.record(EngineCall::Resume)
    }

    async fn stats(&self) -> Result<SwarmStats> {
        Ok(self.stats.read().unwrap_or_else(|e| e.into_inner()).clone())
    }

    async fn connect(&self, addr: &str) -> Result<()> {
        crate::engine::parse_peer_addr(addr)?;
        self.record(EngineCall::Connect(addr.to_string()))
    }

    async fn block(&self, ranges: &[BlocklistRange]) -> Result<()> {
        self.record(EngineCall::Block(ranges.len()))
    }

    async fn remove(&self) -> Result<()> {
        self.record(EngineCall::Remove)
    }
}
