//! Peer blocklist parsing
//!
//! Reads PeerGuardian-style text lists (`label:start-end`, one range per
//! line). Anything that does not look like a range is skipped silently.

use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::Result;

/// Label used when writing ranges back out
const RENDER_LABEL: &str = "peerstream";

const LINE_PATTERN: &str = r"^\s*[^#].*?\s*:\s*([a-f0-9.:]+?)\s*-\s*([a-f0-9.:]+?)\s*$";

static LINE_REGEX: OnceLock<Option<Regex>> = OnceLock::new();

/// An inclusive range of excluded peer addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlocklistRange {
    pub start: String,
    pub end: String,
}

/// Read and parse a blocklist file
///
/// # Errors
/// Returns an error if the file cannot be opened or is not valid UTF-8
pub fn parse(path: impl AsRef<Path>) -> Result<Vec<BlocklistRange>> {
    let path = path.as_ref();
    let data = std::fs::read_to_string(path)?;
    let ranges = parse_str(&data);
    tracing::info!("Loaded {} blocklist ranges from {}", ranges.len(), path.display());
    Ok(ranges)
}

/// Parse blocklist text, keeping input order
pub fn parse_str(data: &str) -> Vec<BlocklistRange> {
    let Some(regex) = LINE_REGEX.get_or_init(|| Regex::new(LINE_PATTERN).ok()) else {
        return Vec::new();
    };

    data.split('\n')
        .filter_map(|line| regex.captures(line))
        .map(|caps| BlocklistRange {
            start: caps[1].to_string(),
            end: caps[2].to_string(),
        })
        .collect()
}

/// Serialise ranges as PeerGuardian text, one `label:start-end` per line
pub fn render_p2p(ranges: &[BlocklistRange]) -> String {
    let mut out = String::new();
    for range in ranges {
        out.push_str(&format!("{}:{}-{}\n", RENDER_LABEL, range.start, range.end));
    }
    out
}
