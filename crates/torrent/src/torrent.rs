//! qBittorrent-backed swarm engine
//!
//! The torrent lives in a qBittorrent instance reached over its Web API.
//! Files are read straight from the client's save path, piece by piece, as
//! soon as qBittorrent reports each piece downloaded.

use std::collections::HashSet;
use std::io::SeekFrom;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream;
use qbit_rs::model::{
    AddTorrentArg, Credential, GetTorrentListArg, PieceState, Preferences, Priority, State,
    Torrent, TorrentFile, TorrentSource,
};
use qbit_rs::Qbit;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::io::StreamReader;

use crate::blocklist::{self, BlocklistRange};
use crate::demand::{BlockedGuard, DemandTracker};
use crate::engine::{
    parse_peer_addr, EngineEvent, FileEntry, FileStream, RangeRequest, SwarmEngine, SwarmStats,
    EVENT_CHANNEL_CAPACITY,
};
use crate::error::{Result, TorrentError};
use crate::utils;

/// Largest chunk handed out by a file reader
const READ_CHUNK_SIZE: u64 = 256 * 1024;

/// Attempts made to find a freshly added torrent in the client
const ATTACH_ATTEMPTS: usize = 20;

/// Connection settings for the qBittorrent Web API
#[derive(Debug, Clone)]
pub struct QbitSettings {
    /// Web UI endpoint, e.g. http://localhost:8080
    pub endpoint: String,
    pub username: String,
    pub password: String,
    /// How often torrent state is polled
    pub poll_interval: Duration,
    /// Where the normalised blocklist is written for the client to load
    pub filter_path: PathBuf,
    /// Download directory for newly added torrents; client default if unset
    pub save_path: Option<String>,
}

impl QbitSettings {
    pub fn new(
        endpoint: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            username: username.into(),
            password: password.into(),
            poll_interval: Duration::from_secs(1),
            filter_path: std::env::temp_dir().join("peerstream-blocklist.p2p"),
            save_path: None,
        }
    }
}

#[derive(Debug, Clone)]
struct FileLayout {
    entry: FileEntry,
    /// Offset of the file's first byte within the torrent
    offset: u64,
    /// Priority raised for a reader without the file being selected
    streaming: bool,
    /// Open readers over this file
    readers: usize,
}

impl FileLayout {
    /// Drop one reader. Returns true when the last reader of a file that
    /// was only fetched for streaming went away, clearing the flag.
    fn release_reader(&mut self) -> bool {
        self.readers = self.readers.saturating_sub(1);
        if self.readers == 0 && self.streaming && !self.entry.selected {
            self.streaming = false;
            return true;
        }
        false
    }
}

#[derive(Debug)]
struct Metadata {
    files: Vec<FileLayout>,
    piece_size: u64,
    save_path: PathBuf,
}

#[derive(Debug, Default)]
struct Progress {
    pieces: Vec<bool>,
    checking: bool,
}

struct Inner {
    client: Arc<Qbit>,
    hash: String,
    settings: QbitSettings,
    metadata: RwLock<Option<Metadata>>,
    progress: RwLock<Progress>,
    events: broadcast::Sender<EngineEvent>,
    demand: DemandTracker,
}

/// Swarm engine driving a single torrent inside qBittorrent
#[derive(Clone)]
pub struct TorrentApi {
    inner: Arc<Inner>,
}

impl TorrentApi {
    /// Log in and attach to the torrent described by `source`
    ///
    /// `source` is a magnet link, a .torrent URL or a local .torrent file. A
    /// torrent already present in the client is reused, otherwise it is added.
    ///
    /// # Errors
    /// Returns an error if authentication fails, the source cannot be read,
    /// or the torrent cannot be found after adding it
    pub async fn connect(settings: QbitSettings, source: &str) -> Result<Self> {
        let add_source = torrent_source(source).await?;

        let credential = Credential::new(settings.username.clone(), settings.password.clone());
        let client = Arc::new(Qbit::new(settings.endpoint.as_str(), credential));
        client.login(false).await.map_err(|e| {
            tracing::error!("Failed to login to qBittorrent: {}", e);
            e
        })?;

        let hash = attach(&client, source, add_source, &settings).await?;
        tracing::info!("Attached to torrent {}", hash);

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let demand = DemandTracker::new(events.clone());
        Ok(Self {
            inner: Arc::new(Inner {
                client,
                hash,
                settings,
                metadata: RwLock::new(None),
                progress: RwLock::new(Progress::default()),
                events,
                demand,
            }),
        })
    }

    /// Info hash of the attached torrent
    pub fn hash(&self) -> &str {
        &self.inner.hash
    }

    /// Spawn the task that turns client state into engine events
    pub fn spawn_watcher(&self) -> JoinHandle<()> {
        let inner = self.inner.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(inner.settings.poll_interval);
            loop {
                interval.tick().await;
                if let Err(e) = inner.poll().await {
                    tracing::warn!("Failed to poll torrent {}: {}", inner.hash, e);
                }
            }
        })
    }
}

fn list_all() -> GetTorrentListArg {
    GetTorrentListArg {
        filter: None,
        category: None,
        tag: None,
        sort: None,
        reverse: None,
        limit: None,
        offset: None,
        hashes: None,
    }
}

async fn list_hashes(client: &Qbit) -> Result<HashSet<String>> {
    let torrents = client.get_torrent_list(list_all()).await?;
    Ok(torrents.into_iter().filter_map(|t| t.hash).collect())
}

/// Build the add-torrent source: URLs are passed through, anything else is
/// read as a .torrent file
async fn torrent_source(source: &str) -> Result<TorrentSource> {
    if utils::is_url_source(source) {
        let url = url::Url::parse(source)
            .map_err(|_| TorrentError::UnsupportedSource(source.to_string()))?;
        return Ok(TorrentSource::Urls {
            urls: vec![url].into(),
        });
    }

    let path = Path::new(source);
    let data = tokio::fs::read(path).await.map_err(|e| {
        tracing::error!("Failed to read torrent file {}: {}", path.display(), e);
        e
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload.torrent".to_string());

    Ok(TorrentSource::TorrentFiles {
        torrents: vec![TorrentFile { filename, data }],
    })
}

async fn attach(
    client: &Qbit,
    source: &str,
    add_source: TorrentSource,
    settings: &QbitSettings,
) -> Result<String> {
    let expected = utils::extract_info_hash(source);
    let before = list_hashes(client).await?;

    let existing = expected
        .as_deref()
        .and_then(|hash| before.iter().find(|known| known.eq_ignore_ascii_case(hash)));
    if let Some(hash) = existing {
        tracing::info!("Torrent {} already present in qBittorrent", hash);
        return Ok(hash.clone());
    }

    let arg = AddTorrentArg {
        source: add_source,
        savepath: settings.save_path.clone(),
        ..Default::default()
    };
    client.add_torrent(arg).await.map_err(|e| {
        tracing::error!("Error adding torrent: {}", e);
        e
    })?;

    for _ in 0..ATTACH_ATTEMPTS {
        let after = list_hashes(client).await?;
        if let Some(hash) = utils::find_added_torrent(&before, &after, expected.as_deref()) {
            client.toggle_sequential_download(vec![hash.clone()]).await?;
            return Ok(hash);
        }
        tokio::time::sleep(settings.poll_interval).await;
    }

    Err(TorrentError::TorrentNotFound(source.to_string()))
}

/// Range of pieces covering `length` bytes starting at torrent offset `offset`
fn piece_span(offset: u64, length: u64, piece_size: u64) -> Range<usize> {
    if length == 0 || piece_size == 0 {
        return 0..0;
    }
    let first = offset / piece_size;
    let last = (offset + length - 1) / piece_size;
    first as usize..last as usize + 1
}

/// End (exclusive, file coordinates) of the next read starting at `position`:
/// never crosses a piece boundary, the requested end, or the chunk limit
fn chunk_end(position: u64, end: u64, file_offset: u64, piece_size: u64) -> u64 {
    let absolute = file_offset + position;
    let piece_end = (absolute / piece_size + 1) * piece_size - file_offset;
    end.min(piece_end).min(position + READ_CHUNK_SIZE)
}

/// Whether qBittorrent peer flags describe a peer that is not choking us:
/// `D` while we are interested, `K` while we are not
fn is_unchoking(flags: &str) -> bool {
    flags.contains('D') || flags.contains('K')
}

impl Inner {
    async fn torrent(&self) -> Result<Torrent> {
        self.client
            .get_torrent_list(list_all())
            .await?
            .into_iter()
            .find(|t| t.hash.as_deref() == Some(self.hash.as_str()))
            .ok_or_else(|| TorrentError::TorrentNotFound(self.hash.clone()))
    }

    async fn poll(&self) -> Result<()> {
        let torrent = self.torrent().await?;
        let checking = matches!(
            torrent.state,
            Some(State::CheckingUP | State::CheckingDL | State::CheckingResumeData)
        );
        let started_checking = {
            let mut progress = self.progress.write().unwrap_or_else(|e| e.into_inner());
            let started = checking && !progress.checking;
            progress.checking = checking;
            started
        };
        if started_checking {
            self.emit(EngineEvent::Verifying);
        }

        if !self.is_ready() {
            if matches!(torrent.state, Some(State::MetaDL)) {
                return Ok(());
            }
            self.load_metadata().await?;
        }

        self.refresh_pieces().await?;
        self.demand.set_wanted(self.selected_incomplete());
        Ok(())
    }

    async fn load_metadata(&self) -> Result<()> {
        let contents = self.client.get_torrent_contents(&self.hash, None).await?;
        let properties = self.client.get_torrent_properties(&self.hash).await?;
        let piece_size = properties.piece_size.unwrap_or(0).max(0) as u64;
        if contents.is_empty() || piece_size == 0 {
            return Ok(());
        }

        let mut offset = 0;
        let mut files = Vec::with_capacity(contents.len());
        for (index, content) in contents.into_iter().enumerate() {
            let entry = FileEntry::new(index, content.name, content.size as u64);
            let length = entry.length;
            files.push(FileLayout {
                entry,
                offset,
                streaming: false,
                readers: 0,
            });
            offset += length;
        }

        // Nothing is fetched until a file is selected
        let indexes: Vec<i64> = (0..files.len() as i64).collect();
        self.client
            .set_file_priority(&self.hash, indexes, Priority::DoNotDownload)
            .await?;

        let save_path = PathBuf::from(properties.save_path.unwrap_or_else(|| ".".to_string()));
        tracing::info!(
            "Torrent metadata ready: {} files, {} byte pieces, saving to {}",
            files.len(),
            piece_size,
            save_path.display()
        );

        *self.metadata.write().unwrap_or_else(|e| e.into_inner()) = Some(Metadata {
            files,
            piece_size,
            save_path,
        });
        self.emit(EngineEvent::Ready);
        Ok(())
    }

    /// Fetch piece states, emitting `Verify` for every newly completed piece
    async fn refresh_pieces(&self) -> Result<()> {
        let states = self.client.get_torrent_pieces_states(&self.hash).await?;
        let have: Vec<bool> = states
            .iter()
            .map(|state| matches!(state, PieceState::Downloaded))
            .collect();

        let completed: Vec<usize> = {
            let mut progress = self.progress.write().unwrap_or_else(|e| e.into_inner());
            let completed = have
                .iter()
                .enumerate()
                .filter(|(i, done)| **done && !progress.pieces.get(*i).copied().unwrap_or(false))
                .map(|(i, _)| i)
                .collect();
            progress.pieces = have;
            completed
        };

        for piece in completed {
            self.emit(EngineEvent::Verify { piece });
        }
        Ok(())
    }

    fn has_piece(&self, piece: usize) -> bool {
        let progress = self.progress.read().unwrap_or_else(|e| e.into_inner());
        progress.pieces.get(piece).copied().unwrap_or(false)
    }

    fn has_pieces(&self, pieces: Range<usize>) -> bool {
        let progress = self.progress.read().unwrap_or_else(|e| e.into_inner());
        pieces.into_iter().all(|piece| progress.pieces.get(piece).copied().unwrap_or(false))
    }

    fn selected_incomplete(&self) -> bool {
        let metadata = self.metadata.read().unwrap_or_else(|e| e.into_inner());
        let Some(metadata) = metadata.as_ref() else {
            return false;
        };
        metadata
            .files
            .iter()
            .filter(|file| file.entry.selected)
            .any(|file| {
                !self.has_pieces(piece_span(file.offset, file.entry.length, metadata.piece_size))
            })
    }

    /// Wait until `piece` is on disk, counting as a blocked reader meanwhile
    async fn wait_for_piece(&self, piece: usize) -> std::io::Result<()> {
        if self.has_piece(piece) {
            return Ok(());
        }

        let _blocked = BlockedGuard::new(&self.demand);
        tracing::debug!("Reader waiting for piece {}", piece);
        loop {
            self.refresh_pieces().await.map_err(std::io::Error::other)?;
            if self.has_piece(piece) {
                return Ok(());
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }

    fn is_ready(&self) -> bool {
        self.metadata
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn layout(&self, index: usize) -> Result<(FileLayout, u64, PathBuf)> {
        let metadata = self.metadata.read().unwrap_or_else(|e| e.into_inner());
        let metadata = metadata.as_ref().ok_or(TorrentError::NotReady)?;
        let file = metadata
            .files
            .get(index)
            .ok_or(TorrentError::InvalidFileIndex {
                index,
                count: metadata.files.len(),
            })?;
        let path = metadata.save_path.join(&file.entry.path);
        Ok((file.clone(), metadata.piece_size, path))
    }

    fn update_file(&self, index: usize, change: impl FnOnce(&mut FileLayout)) -> Result<()> {
        let mut metadata = self.metadata.write().unwrap_or_else(|e| e.into_inner());
        let metadata = metadata.as_mut().ok_or(TorrentError::NotReady)?;
        let count = metadata.files.len();
        let file = metadata
            .files
            .get_mut(index)
            .ok_or(TorrentError::InvalidFileIndex { index, count })?;
        change(file);
        Ok(())
    }

    /// Called when a reader goes away. Once the last reader of a file that
    /// is not selected is gone, the file stops being fetched.
    fn release_reader(self: &Arc<Self>, index: usize) {
        let lower = {
            let mut metadata = self.metadata.write().unwrap_or_else(|e| e.into_inner());
            metadata
                .as_mut()
                .and_then(|m| m.files.get_mut(index))
                .is_some_and(|file| file.release_reader())
        };
        if !lower {
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner = self.clone();
        runtime.spawn(async move {
            // A select or a new reader may have claimed the file meanwhile
            if !inner.is_idle(index) {
                return;
            }
            match inner.set_priority(index, Priority::DoNotDownload).await {
                Ok(()) => tracing::debug!("Last reader of file #{} closed, stopped fetching", index),
                Err(e) => tracing::warn!("Failed to lower priority of file #{}: {}", index, e),
            }
        });
    }

    fn is_idle(&self, index: usize) -> bool {
        let metadata = self.metadata.read().unwrap_or_else(|e| e.into_inner());
        metadata
            .as_ref()
            .and_then(|m| m.files.get(index))
            .is_some_and(|file| !file.entry.selected && !file.streaming && file.readers == 0)
    }

    async fn set_priority(&self, index: usize, priority: Priority) -> Result<()> {
        self.client
            .set_file_priority(&self.hash, vec![index as i64], priority)
            .await?;
        Ok(())
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

/// Sequential reader over one file of the torrent
struct PieceReader {
    inner: Arc<Inner>,
    index: usize,
    path: PathBuf,
    file: Option<File>,
    file_offset: u64,
    piece_size: u64,
    position: u64,
    end: u64,
}

impl PieceReader {
    async fn next_chunk(&mut self) -> std::io::Result<Bytes> {
        let piece = ((self.file_offset + self.position) / self.piece_size) as usize;
        self.inner.wait_for_piece(piece).await?;

        let chunk_end = chunk_end(self.position, self.end, self.file_offset, self.piece_size);
        let mut file = match self.file.take() {
            Some(file) => file,
            None => open_data_file(&self.path).await?,
        };

        file.seek(SeekFrom::Start(self.position)).await?;
        let mut buffer = vec![0; (chunk_end - self.position) as usize];
        file.read_exact(&mut buffer).await?;
        self.file = Some(file);
        self.position = chunk_end;
        Ok(Bytes::from(buffer))
    }
}

impl Drop for PieceReader {
    fn drop(&mut self) {
        self.inner.release_reader(self.index);
    }
}

async fn open_data_file(path: &Path) -> std::io::Result<File> {
    File::open(path).await.map_err(|e| {
        tracing::warn!("Failed to open torrent data {}: {}", path.display(), e);
        e
    })
}

#[async_trait]
impl SwarmEngine for TorrentApi {
    fn files(&self) -> Vec<FileEntry> {
        let metadata = self.inner.metadata.read().unwrap_or_else(|e| e.into_inner());
        metadata
            .as_ref()
            .map(|m| m.files.iter().map(|file| file.entry.clone()).collect())
            .unwrap_or_default()
    }

    fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.inner.events.subscribe()
    }

    async fn select(&self, index: usize) -> Result<()> {
        self.inner.layout(index)?;
        self.inner.set_priority(index, Priority::Normal).await?;
        self.inner.update_file(index, |file| file.entry.selected = true)?;
        self.inner.demand.set_wanted(self.inner.selected_incomplete());
        Ok(())
    }

    async fn deselect(&self, index: usize) -> Result<()> {
        self.inner.layout(index)?;
        self.inner.set_priority(index, Priority::DoNotDownload).await?;
        self.inner.update_file(index, |file| {
            file.entry.selected = false;
            file.streaming = false;
        })?;
        self.inner.demand.set_wanted(self.inner.selected_incomplete());
        Ok(())
    }

    async fn open(&self, index: usize, range: Option<RangeRequest>) -> Result<FileStream> {
        let (layout, piece_size, path) = self.inner.layout(index)?;

        if !layout.entry.selected && !layout.streaming {
            tracing::debug!("Raising priority of unselected file #{} for a reader", index);
            self.inner.set_priority(index, Priority::Normal).await?;
            self.inner.update_file(index, |file| file.streaming = true)?;
        }
        self.inner.update_file(index, |file| file.readers += 1)?;

        let (start, end) = match range {
            Some(range) => (range.start, (range.end + 1).min(layout.entry.length)),
            None => (0, layout.entry.length),
        };

        let reader = PieceReader {
            inner: self.inner.clone(),
            index,
            path,
            file: None,
            file_offset: layout.offset,
            piece_size,
            position: start,
            end,
        };

        let chunks = stream::unfold(reader, |mut reader| async move {
            if reader.position >= reader.end {
                return None;
            }
            match reader.next_chunk().await {
                Ok(chunk) => Some((Ok(chunk), reader)),
                Err(e) => {
                    reader.position = reader.end;
                    Some((Err(e), reader))
                }
            }
        });

        Ok(Box::pin(StreamReader::new(Box::pin(chunks))))
    }

    async fn pause(&self) -> Result<()> {
        self.inner
            .client
            .stop_torrents(vec![self.inner.hash.clone()])
            .await?;
        Ok(())
    }

    async fn resume(&self) -> Result<()> {
        self.inner
            .client
            .start_torrents(vec![self.inner.hash.clone()])
            .await?;
        Ok(())
    }

    async fn stats(&self) -> Result<SwarmStats> {
        let properties = self.inner.client.get_torrent_properties(&self.inner.hash).await?;
        let peers = self
            .inner
            .client
            .get_torrent_peers(&self.inner.hash, None)
            .await?
            .peers
            .unwrap_or_default();

        let total_peers = peers.len();
        let active_peers = peers
            .values()
            .filter(|peer| peer.flags.as_deref().is_some_and(is_unchoking))
            .count();

        let known = properties.peers_total.unwrap_or(0) + properties.seeds_total.unwrap_or(0);
        let connected = properties.peers.unwrap_or(0) + properties.seeds.unwrap_or(0);

        Ok(SwarmStats {
            downloaded: properties.total_downloaded.unwrap_or(0).max(0) as u64,
            uploaded: properties.total_uploaded.unwrap_or(0).max(0) as u64,
            download_speed: properties.dl_speed.unwrap_or(0).max(0) as u64,
            upload_speed: properties.up_speed.unwrap_or(0).max(0) as u64,
            total_peers,
            active_peers,
            queued_peers: (known - connected).max(0) as usize,
        })
    }

    async fn connect(&self, addr: &str) -> Result<()> {
        parse_peer_addr(addr)?;
        self.inner
            .client
            .add_peers(vec![self.inner.hash.clone()], vec![addr.to_string()])
            .await?;
        tracing::info!("Added peer {}", addr);
        Ok(())
    }

    async fn block(&self, ranges: &[BlocklistRange]) -> Result<()> {
        let path = &self.inner.settings.filter_path;
        tokio::fs::write(path, blocklist::render_p2p(ranges)).await?;

        let preferences = Preferences {
            ip_filter_enabled: Some(true),
            ip_filter_path: Some(path.display().to_string()),
            ..Default::default()
        };
        self.inner.client.set_preferences(preferences).await?;
        tracing::info!("Installed blocklist with {} ranges", ranges.len());
        Ok(())
    }

    async fn remove(&self) -> Result<()> {
        self.inner
            .client
            .delete_torrents(vec![self.inner.hash.clone()], true)
            .await?;
        tracing::info!("Removed torrent {} and its data", self.inner.hash);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_piece_span() {
        // Whole first piece
        assert_eq!(piece_span(0, 16, 16), 0..1);
        // Straddles a boundary
        assert_eq!(piece_span(10, 10, 16), 0..2);
        // Starts mid-torrent
        assert_eq!(piece_span(32, 1, 16), 2..3);
        // Empty file covers nothing
        assert_eq!(piece_span(40, 0, 16), 0..0);
    }

    #[test]
    fn test_chunk_end_stops_at_piece_boundary() {
        // File starts 10 bytes into the torrent, pieces of 16 bytes:
        // file position 0 is torrent byte 10, the piece ends at torrent byte 16
        assert_eq!(chunk_end(0, 100, 10, 16), 6);
        assert_eq!(chunk_end(6, 100, 10, 16), 22);
        // Requested end comes first
        assert_eq!(chunk_end(6, 8, 10, 16), 8);
    }

    #[test]
    fn test_chunk_end_limited_by_chunk_size() {
        let piece_size = 4 * READ_CHUNK_SIZE;
        assert_eq!(chunk_end(0, u64::MAX, 0, piece_size), READ_CHUNK_SIZE);
    }

    #[test]
    fn test_settings_defaults() {
        let settings = QbitSettings::new("http://localhost:8080", "admin", "secret");
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert!(settings.filter_path.ends_with("peerstream-blocklist.p2p"));
        assert!(settings.save_path.is_none());
    }

    fn settings_from_env() -> QbitSettings {
        dotenv::dotenv().ok();
        QbitSettings::new(
            std::env::var("QBIT_HOST").unwrap_or_else(|_| "http://localhost:8080".into()),
            std::env::var("QBIT_USERNAME").unwrap_or_default(),
            std::env::var("QBIT_PASSWORD").unwrap_or_default(),
        )
    }

    #[tokio::test]
    #[ignore = "requires a running qBittorrent instance"]
    async fn test_connect_and_stats() {
        let source = std::env::var("TEST_MAGNET").expect("TEST_MAGNET must be set");
        let api = TorrentApi::connect(settings_from_env(), &source).await;
        assert!(api.is_ok(), "Connect failed: {:?}", api.as_ref().err());

        let stats = api.unwrap().stats().await;
        assert!(stats.is_ok(), "Stats failed: {:?}", stats.err());
    }

    #[tokio::test]
    async fn test_local_torrent_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("show.torrent");
        std::fs::write(&path, b"d4:infod4:name4:showee").unwrap();

        let source = torrent_source(path.to_str().unwrap()).await.unwrap();
        match source {
            TorrentSource::TorrentFiles { torrents } => {
                assert_eq!(torrents.len(), 1);
                assert_eq!(torrents[0].filename, "show.torrent");
                assert_eq!(torrents[0].data, b"d4:infod4:name4:showee");
            }
            other => panic!("expected a torrent file source, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_url_source() {
        let source = torrent_source("magnet:?xt=urn:btih:abc").await.unwrap();
        assert!(matches!(source, TorrentSource::Urls { .. }));
    }

    #[tokio::test]
    async fn test_missing_torrent_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.torrent");
        let result = torrent_source(path.to_str().unwrap()).await;
        assert!(matches!(result, Err(TorrentError::Io(_))));
    }

    #[test]
    fn test_unchoking_flags() {
        // Interested and unchoked
        assert!(is_unchoking("D X E P"));
        // Unchoked while we are not interested
        assert!(is_unchoking("K"));
        // Interested but choked
        assert!(!is_unchoking("d"));
        assert!(!is_unchoking("k U"));
        assert!(!is_unchoking(""));
    }

    fn layout(selected: bool, streaming: bool, readers: usize) -> FileLayout {
        let mut entry = FileEntry::new(0, "a.mkv", 10);
        entry.selected = selected;
        FileLayout {
            entry,
            offset: 0,
            streaming,
            readers,
        }
    }

    #[test]
    fn test_last_reader_releases_streaming_file() {
        let mut file = layout(false, true, 2);
        assert!(!file.release_reader());
        assert!(file.streaming);
        assert!(file.release_reader());
        assert!(!file.streaming);
        assert_eq!(file.readers, 0);
    }

    #[test]
    fn test_selected_file_is_kept() {
        let mut file = layout(true, false, 1);
        assert!(!file.release_reader());

        // Extra releases never underflow
        let mut file = layout(false, false, 0);
        assert!(!file.release_reader());
        assert_eq!(file.readers, 0);
    }
}
