//! `/.json` status snapshot and `/.m3u` playlist

use serde::Serialize;
use torrent::{FileEntry, SwarmStats};

/// Link to one file of the torrent
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileLink {
    pub name: String,
    pub url: String,
    pub length: u64,
}

/// Snapshot served at `/.json`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SwarmStatus {
    pub total_length: u64,
    pub downloaded: u64,
    pub uploaded: u64,
    pub download_speed: u64,
    pub upload_speed: u64,
    pub total_peers: usize,
    pub active_peers: usize,
    pub files: Vec<FileLink>,
}

fn file_url(host: &str, file: &FileEntry) -> String {
    format!("http://{}/{}", host, file.index)
}

impl SwarmStatus {
    /// Build a snapshot from the listed `files` and the engine's `stats`
    pub fn new(files: &[FileEntry], stats: &SwarmStats, host: &str) -> Self {
        Self {
            total_length: files.iter().map(|file| file.length).sum(),
            downloaded: stats.downloaded,
            uploaded: stats.uploaded,
            download_speed: stats.download_speed,
            upload_speed: stats.upload_speed,
            total_peers: stats.total_peers,
            active_peers: stats.active_peers,
            files: files
                .iter()
                .map(|file| FileLink {
                    name: file.name.clone(),
                    url: file_url(host, file),
                    length: file.length,
                })
                .collect(),
        }
    }
}

/// Render an extended M3U playlist, one `#EXTINF` and URL line pair per file
pub fn playlist(files: &[FileEntry], host: &str) -> String {
    let entries: Vec<String> = files
        .iter()
        .map(|file| format!("#EXTINF:-1,{}\n{}", file.path, file_url(host, file)))
        .collect();
    format!("#EXTM3U\n{}", entries.join("\n"))
}
