//! HTTP gateway for streaming torrent files
//!
//! Serves the files of a single torrent over HTTP with range request support,
//! plus a JSON status snapshot and an M3U playlist for media players.

pub mod body;
mod error;
pub mod listing;
pub mod range;
mod server;
mod state;

pub use error::{Result, ServerError};
pub use server::FileServerApi;
pub use state::{ContentTypeFn, FileFilter, GatewayOptions, ServerState};
