//! Shared state for request handlers

use std::sync::Arc;
use std::time::Duration;

use torrent::selector::sort_files;
use torrent::{FileEntry, FileOrder, FileSelector, SwarmEngine};

use crate::body::STREAM_IDLE_TIMEOUT;

/// Predicate deciding which files appear in `/.json` and `/.m3u`
pub type FileFilter = Arc<dyn Fn(&FileEntry) -> bool + Send + Sync>;

/// Maps a file name to the `Content-Type` it is served with
pub type ContentTypeFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Gateway behaviour knobs
#[derive(Clone)]
pub struct GatewayOptions {
    /// Inclusion predicate for listings; `None` lists everything
    pub filter: Option<FileFilter>,
    /// Listing order
    pub order: FileOrder,
    /// Overrides extension-based content type detection
    pub content_type: Option<ContentTypeFn>,
    /// Longest a stream may stall before it is closed
    pub idle_timeout: Duration,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            filter: None,
            order: FileOrder::default(),
            content_type: None,
            idle_timeout: STREAM_IDLE_TIMEOUT,
        }
    }
}

/// State handed to every request
#[derive(Clone)]
pub struct ServerState {
    engine: Arc<dyn SwarmEngine>,
    selector: Arc<FileSelector>,
    options: Arc<GatewayOptions>,
}

impl ServerState {
    pub fn new(
        engine: Arc<dyn SwarmEngine>,
        selector: Arc<FileSelector>,
        options: GatewayOptions,
    ) -> Self {
        Self {
            engine,
            selector,
            options: Arc::new(options),
        }
    }

    pub fn engine(&self) -> &Arc<dyn SwarmEngine> {
        &self.engine
    }

    pub fn options(&self) -> &GatewayOptions {
        &self.options
    }

    /// Files passing the inclusion predicate, in listing order
    pub fn listed_files(&self) -> Vec<FileEntry> {
        let files: Vec<FileEntry> = self
            .engine
            .files()
            .into_iter()
            .filter(|file| self.options.filter.as_ref().map_or(true, |keep| keep(file)))
            .collect();
        sort_files(&files, self.options.order)
    }

    /// Content type for a file name
    pub fn content_type(&self, name: &str) -> String {
        match &self.options.content_type {
            Some(lookup) => lookup(name),
            None => mime_guess::from_path(name)
                .first_or_octet_stream()
                .to_string(),
        }
    }

    /// Rewrite `/` to the primary file and a torrent path to its index.
    /// Anything else is returned unchanged.
    pub fn normalize_path(&self, path: &str) -> String {
        if path == "/" {
            return match self.selector.primary_index() {
                Some(index) => format!("/{}", index),
                None => path.to_string(),
            };
        }

        let Some(decoded) = path
            .strip_prefix('/')
            .and_then(|p| urlencoding::decode(p).ok())
        else {
            return path.to_string();
        };

        self.engine
            .files()
            .iter()
            .find(|file| file.path == decoded)
            .map(|file| format!("/{}", file.index))
            .unwrap_or_else(|| path.to_string())
    }
}
