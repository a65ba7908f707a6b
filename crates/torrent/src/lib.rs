//! Swarm engine layer
//!
//! This crate defines the contract the streaming gateway expects from a
//! swarm engine, a qBittorrent-backed implementation of it, and the pieces
//! that sit between the two: blocklist parsing, primary file selection and
//! demand-driven flow control.

pub mod blocklist;
pub mod demand;
pub mod engine;
pub mod error;
pub mod flow;
pub mod memory;
pub mod selector;
pub mod torrent;
pub mod utils;

pub use blocklist::BlocklistRange;
pub use engine::{EngineEvent, FileEntry, FileStream, RangeRequest, SwarmEngine, SwarmStats};
pub use error::{Result, TorrentError};
pub use flow::{FlowController, FlowState};
pub use memory::MemoryEngine;
pub use selector::{FileOrder, FileSelector};
pub use torrent::{QbitSettings, TorrentApi};
pub use utils::{extract_info_hash, format_size, format_speed};
