use thiserror::Error;

/// Errors raised while running the gateway
#[derive(Debug, Error)]
pub enum ServerError {
    /// Binding or serving the listener failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// Swarm engine error
    #[error(transparent)]
    Torrent(#[from] torrent::TorrentError),
}

/// Result type alias for file server operations
pub type Result<T> = std::result::Result<T, ServerError>;
