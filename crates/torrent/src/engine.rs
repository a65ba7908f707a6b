//! Collaborator contract between the streaming gateway and a swarm engine

use std::pin::Pin;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::sync::broadcast;

use crate::blocklist::BlocklistRange;
use crate::error::Result;

/// Capacity of the engine event channel
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A file inside the torrent
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Position in the torrent's file list, stable for the session
    pub index: usize,
    /// Display name (last path component)
    pub name: String,
    /// Path relative to the torrent root
    pub path: String,
    /// Length in bytes
    pub length: u64,
    /// Whether the engine is fetching this file
    pub selected: bool,
}

impl FileEntry {
    pub fn new(index: usize, path: impl Into<String>, length: u64) -> Self {
        let path = path.into();
        let name = path.rsplit('/').next().unwrap_or(&path).to_string();
        Self {
            index,
            name,
            path,
            length,
            selected: false,
        }
    }
}

/// Inclusive byte range within a single file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeRequest {
    pub start: u64,
    pub end: u64,
}

impl RangeRequest {
    /// Number of bytes covered by the range
    pub fn len(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Point-in-time transfer statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SwarmStats {
    /// Cumulative bytes downloaded
    pub downloaded: u64,
    /// Cumulative bytes uploaded
    pub uploaded: u64,
    /// Current download rate in bytes/sec
    pub download_speed: u64,
    /// Current upload rate in bytes/sec
    pub upload_speed: u64,
    /// Connected peers
    pub total_peers: usize,
    /// Connected peers not choking us
    pub active_peers: usize,
    /// Known peers waiting for a connection slot
    pub queued_peers: usize,
}

/// Lifecycle and demand events raised by an engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    /// Torrent metadata resolved, file list available
    Ready,
    /// Integrity check of existing data started
    Verifying,
    /// A piece passed verification
    Verify { piece: usize },
    /// A consumer is waiting for data not yet available
    Interested,
    /// No consumer is waiting for missing data
    Uninterested,
    /// A slow peer's request was reassigned
    Hotswap,
    /// A piece failed its hash check
    InvalidPiece { piece: usize },
}

/// Readable byte stream for (part of) a file
pub type FileStream = Pin<Box<dyn AsyncRead + Send>>;

/// Operations the gateway needs from a swarm engine.
///
/// Implementations own the file list and all transfer state. Every method
/// that talks to the swarm is async; `files` and `subscribe` must not block.
#[async_trait]
pub trait SwarmEngine: Send + Sync + 'static {
    /// Snapshot of the file list, empty until metadata is ready
    fn files(&self) -> Vec<FileEntry>;

    /// Subscribe to the engine's event stream
    fn subscribe(&self) -> broadcast::Receiver<EngineEvent>;

    /// Start fetching a file
    async fn select(&self, index: usize) -> Result<()>;

    /// Stop fetching a file
    async fn deselect(&self, index: usize) -> Result<()>;

    /// Open a reader over a file, optionally bounded to a byte range
    async fn open(&self, index: usize, range: Option<RangeRequest>) -> Result<FileStream>;

    /// Stop requesting data from peers
    async fn pause(&self) -> Result<()>;

    /// Resume requesting data from peers
    async fn resume(&self) -> Result<()>;

    /// Current transfer statistics
    async fn stats(&self) -> Result<SwarmStats>;

    /// Connect to a peer given as `ip:port`
    async fn connect(&self, addr: &str) -> Result<()>;

    /// Install the peer admission blocklist
    async fn block(&self, ranges: &[BlocklistRange]) -> Result<()>;

    /// Drop the torrent and its downloaded data
    async fn remove(&self) -> Result<()>;
}

/// Split `host:port`, rejecting anything without a numeric port
pub fn parse_peer_addr(addr: &str) -> Result<(&str, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| crate::TorrentError::InvalidPeer(addr.to_string()))?;
    let host = host.trim_start_matches('[').trim_end_matches(']');
    let port = port
        .parse::<u16>()
        .map_err(|_| crate::TorrentError::InvalidPeer(addr.to_string()))?;
    if host.is_empty() {
        return Err(crate::TorrentError::InvalidPeer(addr.to_string()));
    }
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_entry_name_from_path() {
        let entry = FileEntry::new(2, "Show/Season 1/episode.mkv", 10);
        assert_eq!(entry.name, "episode.mkv");
        assert_eq!(entry.path, "Show/Season 1/episode.mkv");
        assert!(!entry.selected);

        let flat = FileEntry::new(0, "movie.mp4", 10);
        assert_eq!(flat.name, "movie.mp4");
    }

    #[test]
    fn test_range_len() {
        assert_eq!(RangeRequest { start: 0, end: 0 }.len(), 1);
        assert_eq!(RangeRequest { start: 10, end: 19 }.len(), 10);
    }

    #[test]
    fn test_parse_peer_addr() {
        assert_eq!(parse_peer_addr("1.2.3.4:6881").unwrap(), ("1.2.3.4", 6881));
        assert_eq!(parse_peer_addr("[::1]:51413").unwrap(), ("::1", 51413));
        assert!(parse_peer_addr("1.2.3.4").is_err());
        assert!(parse_peer_addr("1.2.3.4:http").is_err());
        assert!(parse_peer_addr(":6881").is_err());
    }
}
