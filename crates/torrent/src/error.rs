use thiserror::Error;

/// Errors raised by the swarm engine layer
#[derive(Debug, Error)]
pub enum TorrentError {
    /// qBittorrent Web API error
    #[error("qBittorrent error: {0}")]
    Qbit(#[from] qbit_rs::Error),
    /// Local disk error (blocklist file, torrent data)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// File index outside the torrent's file list
    #[error("file index {index} is out of range ({count} files)")]
    InvalidFileIndex { index: usize, count: usize },
    /// Torrent metadata has not been resolved yet
    #[error("torrent metadata is not ready")]
    NotReady,
    /// Torrent could not be located in the client
    #[error("torrent not found: {0}")]
    TorrentNotFound(String),
    /// Source is neither a magnet link nor a URL
    #[error("unsupported torrent source: {0}")]
    UnsupportedSource(String),
    /// Peer address is not of the form `host:port`
    #[error("invalid peer address: {0}")]
    InvalidPeer(String),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, TorrentError>;
