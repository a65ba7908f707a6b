//! Primary file selection
//!
//! The selector owns the "primary file" the gateway serves at `/`, and the
//! operator-facing pause switch that deselects it.

use std::sync::{Arc, RwLock};

use crate::engine::{FileEntry, SwarmEngine};
use crate::error::{Result, TorrentError};

/// Display ordering for file listings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FileOrder {
    /// Torrent enumeration order
    #[default]
    Torrent,
    /// Lexicographic by path
    Path,
    /// Largest first
    Size,
}

/// Pick the primary file.
///
/// An explicit index wins if it is in range. Otherwise the longest file is
/// chosen, ties going to the earliest one in enumeration order.
pub fn resolve_primary(files: &[FileEntry], explicit: Option<usize>) -> Result<FileEntry> {
    if let Some(index) = explicit {
        return files
            .get(index)
            .cloned()
            .ok_or(TorrentError::InvalidFileIndex {
                index,
                count: files.len(),
            });
    }

    files
        .iter()
        .reduce(|best, file| if file.length > best.length { file } else { best })
        .cloned()
        .ok_or(TorrentError::NotReady)
}

/// Return a display-ordered copy of `files`; indices are left untouched
pub fn sort_files(files: &[FileEntry], order: FileOrder) -> Vec<FileEntry> {
    let mut sorted = files.to_vec();
    match order {
        FileOrder::Torrent => {}
        FileOrder::Path => sorted.sort_by(|a, b| a.path.cmp(&b.path)),
        FileOrder::Size => sorted.sort_by(|a, b| b.length.cmp(&a.length)),
    }
    sorted
}

#[derive(Debug, Default)]
struct Selection {
    primary: Option<usize>,
    all: bool,
    paused: bool,
}

/// Owner of the primary file reference
pub struct FileSelector {
    engine: Arc<dyn SwarmEngine>,
    selection: RwLock<Selection>,
}

impl FileSelector {
    pub fn new(engine: Arc<dyn SwarmEngine>) -> Self {
        Self {
            engine,
            selection: RwLock::new(Selection::default()),
        }
    }

    /// Resolve the primary file and ask the engine to fetch it
    ///
    /// A previous primary is deselected unless every file is selected, and
    /// a paused download is running again afterwards.
    ///
    /// # Errors
    /// Fails if metadata is not ready, the explicit index is out of range,
    /// or the engine rejects the selection
    pub async fn resolve(&self, explicit: Option<usize>) -> Result<FileEntry> {
        let files = self.engine.files();
        let primary = resolve_primary(&files, explicit)?;
        self.engine.select(primary.index).await?;

        let (previous, all) = {
            let selection = self.read();
            (selection.primary, selection.all)
        };
        if let Some(previous) = previous.filter(|index| *index != primary.index) {
            if !all {
                self.engine.deselect(previous).await?;
            }
        }

        {
            let mut selection = self.write();
            selection.primary = Some(primary.index);
            selection.paused = false;
        }
        tracing::info!(
            "Primary file is #{} {} ({} bytes)",
            primary.index,
            primary.path,
            primary.length
        );
        Ok(primary)
    }

    /// Explicitly reassign the primary file
    pub async fn set_primary(&self, index: usize) -> Result<FileEntry> {
        self.resolve(Some(index)).await
    }

    /// Select every file, for whole-torrent playback
    pub async fn select_all(&self) -> Result<()> {
        for file in self.engine.files() {
            self.engine.select(file.index).await?;
        }
        self.write().all = true;
        Ok(())
    }

    /// Current primary file, with its latest `selected` flag
    pub fn primary(&self) -> Option<FileEntry> {
        let index = self.primary_index()?;
        self.engine.files().into_iter().find(|file| file.index == index)
    }

    pub fn primary_index(&self) -> Option<usize> {
        self.read().primary
    }

    pub fn is_paused(&self) -> bool {
        self.read().paused
    }

    /// Stop fetching by deselecting the primary file, or every file in
    /// whole-torrent mode. The engine reports the lost demand on its own.
    pub async fn pause(&self) -> Result<()> {
        for index in self.targets() {
            self.engine.deselect(index).await?;
        }
        self.write().paused = true;
        tracing::info!("Download paused");
        Ok(())
    }

    /// Undo [`FileSelector::pause`]
    pub async fn resume(&self) -> Result<()> {
        for index in self.targets() {
            self.engine.select(index).await?;
        }
        self.write().paused = false;
        tracing::info!("Download resumed");
        Ok(())
    }

    /// Flip between paused and running, returning the new paused state
    pub async fn toggle_pause(&self) -> Result<bool> {
        if self.is_paused() {
            self.resume().await?;
            Ok(false)
        } else {
            self.pause().await?;
            Ok(true)
        }
    }

    /// File list in display order
    pub fn sorted_files(&self, order: FileOrder) -> Vec<FileEntry> {
        sort_files(&self.engine.files(), order)
    }

    fn targets(&self) -> Vec<usize> {
        let selection = self.read();
        if selection.all {
            self.engine.files().iter().map(|file| file.index).collect()
        } else {
            selection.primary.into_iter().collect()
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Selection> {
        self.selection.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Selection> {
        self.selection.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{EngineCall, MemoryEngine};

    fn entries(lengths: &[u64]) -> Vec<FileEntry> {
        lengths
            .iter()
            .enumerate()
            .map(|(i, len)| FileEntry::new(i, format!("file{}.bin", i), *len))
            .collect()
    }

    fn engine() -> Arc<MemoryEngine> {
        Arc::new(
            MemoryEngine::builder()
                .file("b/small.txt", vec![0u8; 10])
                .file("a/movie.mkv", vec![0u8; 100])
                .file("c/extra.mkv", vec![0u8; 100])
                .build(),
        )
    }

    #[test]
    fn test_longest_file_wins() {
        let primary = resolve_primary(&entries(&[5, 50, 20]), None).unwrap();
        assert_eq!(primary.index, 1);
    }

    #[test]
    fn test_ties_go_to_first_occurrence() {
        let primary = resolve_primary(&entries(&[5, 50, 50, 20]), None).unwrap();
        assert_eq!(primary.index, 1);
    }

    #[test]
    fn test_explicit_index() {
        let primary = resolve_primary(&entries(&[5, 50, 20]), Some(2)).unwrap();
        assert_eq!(primary.index, 2);
    }

    #[test]
    fn test_explicit_index_out_of_range() {
        let result = resolve_primary(&entries(&[5, 50]), Some(2));
        assert!(matches!(
            result,
            Err(TorrentError::InvalidFileIndex { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_empty_file_list_is_not_ready() {
        assert!(matches!(resolve_primary(&[], None), Err(TorrentError::NotReady)));
    }

    #[test]
    fn test_sorting_keeps_indices() {
        let files = vec![
            FileEntry::new(0, "zeta.mkv", 1),
            FileEntry::new(1, "alpha.mkv", 3),
            FileEntry::new(2, "mid.mkv", 2),
        ];

        let by_path = sort_files(&files, FileOrder::Path);
        let indices: Vec<usize> = by_path.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 2, 0]);

        let by_size = sort_files(&files, FileOrder::Size);
        let indices: Vec<usize> = by_size.iter().map(|f| f.index).collect();
        assert_eq!(indices, vec![1, 2, 0]);

        assert_eq!(sort_files(&files, FileOrder::Torrent), files);
    }

    #[tokio::test]
    async fn test_resolve_selects_primary() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());

        let primary = selector.resolve(None).await.unwrap();
        assert_eq!(primary.index, 1);
        assert_eq!(selector.primary_index(), Some(1));
        assert!(selector.primary().unwrap().selected);
        assert_eq!(engine.calls(), vec![EngineCall::Select(1)]);
    }

    #[tokio::test]
    async fn test_set_primary_reassigns() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());
        selector.resolve(None).await.unwrap();

        selector.set_primary(2).await.unwrap();
        assert_eq!(selector.primary_index(), Some(2));

        assert!(selector.set_primary(9).await.is_err());
        assert_eq!(selector.primary_index(), Some(2));
    }

    #[tokio::test]
    async fn test_reassigned_primary_releases_previous() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());
        selector.resolve(None).await.unwrap();
        selector.set_primary(0).await.unwrap();

        let selected: Vec<usize> = engine
            .files()
            .iter()
            .filter(|file| file.selected)
            .map(|file| file.index)
            .collect();
        assert_eq!(selected, vec![0]);

        selector.pause().await.unwrap();
        assert!(engine.files().iter().all(|file| !file.selected));
        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::Select(1),
                EngineCall::Select(0),
                EngineCall::Deselect(1),
                EngineCall::Deselect(0),
            ]
        );
    }

    #[tokio::test]
    async fn test_reassigning_while_paused_resumes() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());
        selector.resolve(None).await.unwrap();
        selector.pause().await.unwrap();

        selector.set_primary(2).await.unwrap();
        assert!(!selector.is_paused());
        assert!(selector.primary().unwrap().selected);
    }

    #[tokio::test]
    async fn test_reassigning_in_all_mode_keeps_selection() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());
        selector.resolve(None).await.unwrap();
        selector.select_all().await.unwrap();

        selector.set_primary(0).await.unwrap();
        assert!(engine.files().iter().all(|file| file.selected));
    }

    #[tokio::test]
    async fn test_sorted_listing_does_not_move_primary() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());
        selector.resolve(None).await.unwrap();

        let sorted = selector.sorted_files(FileOrder::Path);
        assert_eq!(sorted[0].path, "a/movie.mkv");
        assert_eq!(sorted[0].index, 1);
        assert_eq!(selector.primary_index(), Some(1));
    }

    #[tokio::test]
    async fn test_pause_and_resume_primary() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());
        selector.resolve(None).await.unwrap();

        assert!(selector.toggle_pause().await.unwrap());
        assert!(selector.is_paused());
        assert!(!selector.primary().unwrap().selected);

        assert!(!selector.toggle_pause().await.unwrap());
        assert!(selector.primary().unwrap().selected);

        assert_eq!(
            engine.calls(),
            vec![
                EngineCall::Select(1),
                EngineCall::Deselect(1),
                EngineCall::Select(1)
            ]
        );
    }

    #[tokio::test]
    async fn test_pause_all_files() {
        let engine = engine();
        let selector = FileSelector::new(engine.clone());
        selector.resolve(None).await.unwrap();
        selector.select_all().await.unwrap();

        selector.pause().await.unwrap();
        assert!(engine.files().iter().all(|file| !file.selected));

        selector.resume().await.unwrap();
        assert!(engine.files().iter().all(|file| file.selected));
    }
}
