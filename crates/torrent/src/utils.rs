//! Utility functions for torrent sources and formatting

use std::collections::HashSet;

/// Extract info hash from magnet link
///
/// Magnet links have the format: magnet:?xt=urn:btih:HASH&...
/// This function extracts the info hash (HASH) from the link
pub fn extract_info_hash(magnet_url: &str) -> Option<String> {
    let query = magnet_url.strip_prefix("magnet:?")?;

    query
        .split('&')
        .find_map(|param| param.strip_prefix("xt=urn:btih:"))
        .filter(|hash| !hash.is_empty())
        .map(str::to_lowercase)
}

/// Whether `source` looks like something the client can add by URL
pub fn is_url_source(source: &str) -> bool {
    source.starts_with("magnet:?")
        || source.starts_with("http://")
        || source.starts_with("https://")
}

/// Find the hash of a torrent that appeared between two listings
///
/// Prefers `expected` when it is present, otherwise returns the single hash
/// that is in `after` but not in `before`.
pub fn find_added_torrent(
    before: &HashSet<String>,
    after: &HashSet<String>,
    expected: Option<&str>,
) -> Option<String> {
    if let Some(hash) = expected {
        if let Some(found) = after.iter().find(|h| h.eq_ignore_ascii_case(hash)) {
            return Some(found.clone());
        }
    }

    let mut added = after.difference(before);
    match (added.next(), added.next()) {
        (Some(hash), None) => Some(hash.clone()),
        _ => None,
    }
}

/// Format file size in human-readable format
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes = bytes as f64;
    let unit_index = (bytes.ln() / 1024_f64.ln()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes / 1024_f64.powi(unit_index as i32);
    format!("{:.1} {}", size, UNITS[unit_index])
}

/// Format speed (bytes/sec) in human-readable format
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", format_size(bytes_per_sec))
}
