//! Download storage: fetches media into the canonical layout and manages the
//! files already there.
//!
//! A file existing at an item's canonical path is the only record that the
//! item is downloaded. Transfers stream into `<path>.tmp` and are renamed into
//! place only once complete.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::CoreError;
use crate::models::MediaItem;
use crate::paths::{is_media_file, PathResolver};

/// Supplies the URL an item's media can be fetched from.
pub trait RemoteSource {
    /// `None` when no authenticated session is available.
    fn download_url(&self, item_id: &str) -> Option<String>;
}

/// Suffix for partially transferred files.
pub const TEMP_SUFFIX: &str = ".tmp";

pub fn temp_path(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(TEMP_SUFFIX);
    PathBuf::from(os)
}

/// Manages downloaded media under a single storage root.
#[derive(Debug, Clone)]
pub struct DownloadManager {
    resolver: PathResolver,
    http: reqwest::Client,
    in_flight: Arc<Mutex<HashSet<PathBuf>>>,
}

/// Releases an in-flight claim when dropped.
struct InFlightGuard {
    set: Arc<Mutex<HashSet<PathBuf>>>,
    path: PathBuf,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.path);
        }
    }
}

impl DownloadManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_client(root, reqwest::Client::new())
    }

    pub fn with_client(root: impl Into<PathBuf>, http: reqwest::Client) -> Self {
        Self {
            resolver: PathResolver::new(root),
            http,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn root(&self) -> &Path {
        self.resolver.root()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    /// Whether the item is present on disk, along with where it would live.
    pub fn is_downloaded(&self, item: &MediaItem) -> (bool, PathBuf) {
        let path = self.resolver.absolute(item);
        (path.is_file(), path)
    }

    /// Absolute path of the downloaded file, if present.
    pub fn local_path(&self, item: &MediaItem) -> Option<PathBuf> {
        match self.is_downloaded(item) {
            (true, path) => Some(path),
            (false, _) => None,
        }
    }

    /// Size of the downloaded file in bytes, 0 when absent.
    pub fn download_size(&self, item: &MediaItem) -> u64 {
        self.local_path(item)
            .and_then(|p| std::fs::metadata(p).ok())
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Fetch an item into its canonical path.
    ///
    /// `on_progress(bytes_so_far, total_bytes)` runs after every chunk;
    /// `total_bytes` is 0 when the server does not announce a length.
    pub async fn download<S, F>(
        &self,
        item: &MediaItem,
        source: &S,
        mut on_progress: F,
    ) -> Result<PathBuf, CoreError>
    where
        S: RemoteSource + ?Sized,
        F: FnMut(u64, u64),
    {
        let (exists, path) = self.is_downloaded(item);
        if exists {
            return Err(CoreError::AlreadyExists(path));
        }
        let url = source
            .download_url(&item.id)
            .ok_or(CoreError::NotAuthenticated)?;
        let _guard = self.claim(&path)?;

        let parent = path
            .parent()
            .ok_or_else(|| CoreError::DownloadFailed(format!("{} has no parent", path.display())))?;
        tokio::fs::create_dir_all(parent).await.map_err(|e| {
            CoreError::DownloadFailed(format!("could not create {}: {e}", parent.display()))
        })?;

        let tmp = temp_path(&path);
        info!(item_id = %item.id, path = %path.display(), "Starting download");

        if let Err(e) = self.fetch_to(&url, &tmp, &mut on_progress).await {
            warn!(item_id = %item.id, error = %e, "Download failed");
            discard(&tmp).await;
            self.prune_empty_dirs(parent);
            return Err(e);
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            discard(&tmp).await;
            self.prune_empty_dirs(parent);
            return Err(CoreError::DownloadFailed(format!(
                "could not move {} into place: {e}",
                tmp.display()
            )));
        }

        info!(item_id = %item.id, path = %path.display(), "Download complete");
        Ok(path)
    }

    async fn fetch_to<F>(&self, url: &str, tmp: &Path, on_progress: &mut F) -> Result<(), CoreError>
    where
        F: FnMut(u64, u64),
    {
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(failed)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(CoreError::DownloadFailed(format!(
                "server responded with {status}"
            )));
        }

        let total = resp.content_length().unwrap_or(0);
        let mut file = tokio::fs::File::create(tmp).await.map_err(failed)?;
        let mut stream = resp.bytes_stream();
        let mut written: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(failed)?;
            file.write_all(&chunk).await.map_err(failed)?;
            written += chunk.len() as u64;
            on_progress(written, total);
        }

        file.flush().await.map_err(failed)?;
        file.sync_all().await.map_err(failed)?;
        debug!(bytes = written, "Transfer finished");
        Ok(())
    }

    fn claim(&self, path: &Path) -> Result<InFlightGuard, CoreError> {
        let mut set = self
            .in_flight
            .lock()
            .map_err(|_| CoreError::DownloadFailed("download registry poisoned".into()))?;
        if !set.insert(path.to_path_buf()) {
            return Err(CoreError::InProgress(path.to_path_buf()));
        }
        Ok(InFlightGuard {
            set: Arc::clone(&self.in_flight),
            path: path.to_path_buf(),
        })
    }

    /// Delete a downloaded item and any directories left empty by it.
    pub fn remove(&self, item: &MediaItem) -> Result<PathBuf, CoreError> {
        let (exists, path) = self.is_downloaded(item);
        if !exists {
            return Err(CoreError::NotFound(path.display().to_string()));
        }
        self.remove_path(&path)?;
        Ok(path)
    }

    /// Delete a media file under the root, such as one found by the offline
    /// catalog whose name does not follow the canonical layout.
    pub fn remove_path(&self, path: &Path) -> Result<(), CoreError> {
        if !path.starts_with(self.resolver.root()) || !path.is_file() {
            return Err(CoreError::NotFound(path.display().to_string()));
        }
        std::fs::remove_file(path)?;
        info!(path = %path.display(), "Removed download");

        if let Some(parent) = path.parent() {
            self.prune_empty_dirs(parent);
        }
        Ok(())
    }

    /// Walk upwards removing empty directories, stopping at the root or the
    /// first directory that still has content.
    fn prune_empty_dirs(&self, start: &Path) {
        let root = self.resolver.root();
        let mut dir = start.to_path_buf();
        while dir != root && dir.starts_with(root) {
            let empty = match std::fs::read_dir(&dir) {
                Ok(mut entries) => entries.next().is_none(),
                Err(_) => break,
            };
            if !empty {
                break;
            }
            if let Err(e) = std::fs::remove_dir(&dir) {
                warn!(path = %dir.display(), error = %e, "Failed to remove empty directory");
                break;
            }
            debug!(path = %dir.display(), "Removed empty directory");
            match dir.parent() {
                Some(parent) => dir = parent.to_path_buf(),
                None => break,
            }
        }
    }

    /// Relative paths of every media file under the root.
    pub fn list_downloads(&self) -> BTreeSet<PathBuf> {
        let root = self.resolver.root();
        if !root.is_dir() {
            return BTreeSet::new();
        }
        WalkDir::new(root)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file() && is_media_file(e.path()))
            .filter_map(|e| e.path().strip_prefix(root).ok().map(Path::to_path_buf))
            .collect()
    }
}

fn failed(e: impl std::fmt::Display) -> CoreError {
    CoreError::DownloadFailed(e.to_string())
}

async fn discard(tmp: &Path) {
    if let Err(e) = tokio::fs::remove_file(tmp).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %tmp.display(), error = %e, "Failed to delete partial download");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ItemKind;
    use mockito::Server;
    use tempfile::TempDir;

    struct FakeSource {
        base: Option<String>,
    }

    impl RemoteSource for FakeSource {
        fn download_url(&self, item_id: &str) -> Option<String> {
            self.base
                .as_ref()
                .map(|b| format!("{b}/Items/{item_id}/Download?api_key=token"))
        }
    }

    fn movie() -> MediaItem {
        MediaItem {
            id: "m1".into(),
            name: "Alien".into(),
            kind: ItemKind::Movie,
            production_year: Some(1979),
            ..Default::default()
        }
    }

    fn episode() -> MediaItem {
        MediaItem {
            id: "e1".into(),
            name: "Pilot".into(),
            kind: ItemKind::Episode,
            series_name: Some("Lost".into()),
            parent_index_number: Some(1),
            index_number: Some(1),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_download_writes_canonical_file() {
        let mut server = Server::new_async().await;
        let body = vec![7u8; 64 * 1024];
        let mock = server
            .mock("GET", "/Items/m1/Download")
            .match_query(mockito::Matcher::Any)
            .with_status(200)
            .with_body(&body)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let source = FakeSource {
            base: Some(server.url()),
        };

        let mut calls = Vec::new();
        let path = manager
            .download(&movie(), &source, |done, total| calls.push((done, total)))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(path, dir.path().join("Movies/Alien (1979).mkv"));
        assert_eq!(std::fs::read(&path).unwrap(), body);
        assert!(!temp_path(&path).exists());

        let (done, total) = *calls.last().unwrap();
        assert_eq!(done, body.len() as u64);
        assert!(total == 0 || total == body.len() as u64);
        assert!(calls.windows(2).all(|w| w[0].0 <= w[1].0));

        assert!(manager.is_downloaded(&movie()).0);
        assert_eq!(manager.download_size(&movie()), body.len() as u64);
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_nothing_behind() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/Items/m1/Download")
            .match_query(mockito::Matcher::Any)
            .with_status(500)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let source = FakeSource {
            base: Some(server.url()),
        };

        let err = manager.download(&movie(), &source, |_, _| {}).await;
        assert!(matches!(err, Err(CoreError::DownloadFailed(_))));

        let path = manager.resolver().absolute(&movie());
        assert!(!path.exists());
        assert!(!temp_path(&path).exists());
        assert!(!dir.path().join("Movies").exists());
        assert!(dir.path().is_dir());
        assert!(manager.list_downloads().is_empty());
    }

    #[tokio::test]
    async fn test_unwritable_root_is_download_failed() {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("media");
        std::fs::write(&root, b"not a directory").unwrap();
        let manager = DownloadManager::new(root.clone());
        let source = FakeSource {
            base: Some("http://127.0.0.1:9".into()),
        };

        let err = manager.download(&movie(), &source, |_, _| {}).await;
        assert!(matches!(err, Err(CoreError::DownloadFailed(_))));
        assert!(manager.claim(&manager.resolver().absolute(&movie())).is_ok());
    }

    #[tokio::test]
    async fn test_existing_file_is_already_exists() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let path = manager.resolver().absolute(&movie());
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"data").unwrap();

        let source = FakeSource { base: None };
        let err = manager.download(&movie(), &source, |_, _| {}).await;
        assert!(matches!(err, Err(CoreError::AlreadyExists(p)) if p == path));
    }

    #[tokio::test]
    async fn test_missing_session_is_not_authenticated() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let source = FakeSource { base: None };
        let err = manager.download(&movie(), &source, |_, _| {}).await;
        assert!(matches!(err, Err(CoreError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_concurrent_download_is_in_progress() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let path = manager.resolver().absolute(&movie());
        let _held = manager.claim(&path).unwrap();

        let source = FakeSource {
            base: Some("http://127.0.0.1:9".into()),
        };
        let err = manager.download(&movie(), &source, |_, _| {}).await;
        assert!(matches!(err, Err(CoreError::InProgress(p)) if p == path));
    }

    #[test]
    fn test_claim_released_on_drop() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let path = dir.path().join("x.mkv");
        drop(manager.claim(&path).unwrap());
        assert!(manager.claim(&path).is_ok());
    }

    #[test]
    fn test_remove_prunes_empty_ancestors() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());

        let ep = manager.resolver().absolute(&episode());
        std::fs::create_dir_all(ep.parent().unwrap()).unwrap();
        std::fs::write(&ep, b"x").unwrap();
        let mv = manager.resolver().absolute(&movie());
        std::fs::create_dir_all(mv.parent().unwrap()).unwrap();
        std::fs::write(&mv, b"y").unwrap();

        manager.remove(&episode()).unwrap();
        assert!(!manager.is_downloaded(&episode()).0);
        assert!(manager.is_downloaded(&movie()).0);
        assert!(!dir.path().join("Lost").exists());
        assert!(dir.path().join("Movies").is_dir());
        assert!(dir.path().exists());

        manager.remove(&movie()).unwrap();
        assert!(!manager.is_downloaded(&movie()).0);
        assert!(!dir.path().join("Movies").exists());
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_remove_keeps_non_empty_directories() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let ep = manager.resolver().absolute(&episode());
        let season = ep.parent().unwrap().to_path_buf();
        std::fs::create_dir_all(&season).unwrap();
        std::fs::write(&ep, b"x").unwrap();
        std::fs::write(season.join("S01E02 - Next.mkv"), b"z").unwrap();

        manager.remove(&episode()).unwrap();
        assert!(season.is_dir());
    }

    #[test]
    fn test_remove_absent_is_not_found() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        assert!(matches!(
            manager.remove(&movie()),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_remove_path_outside_root_is_not_found() {
        let dir = TempDir::new().unwrap();
        let outside = TempDir::new().unwrap();
        let stray = outside.path().join("stray.mkv");
        std::fs::write(&stray, b"x").unwrap();

        let manager = DownloadManager::new(dir.path());
        assert!(matches!(
            manager.remove_path(&stray),
            Err(CoreError::NotFound(_))
        ));
        assert!(stray.exists());

        let other = dir.path().join("Other");
        std::fs::create_dir_all(&other).unwrap();
        std::fs::write(other.join("clip.mkv"), b"x").unwrap();
        manager.remove_path(&other.join("clip.mkv")).unwrap();
        assert!(!other.exists());
        assert!(dir.path().is_dir());
    }

    #[test]
    fn test_list_downloads_filters_media() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path());
        let movies = dir.path().join("Movies");
        std::fs::create_dir_all(&movies).unwrap();
        std::fs::write(movies.join("Alien (1979).mkv"), b"a").unwrap();
        std::fs::write(movies.join("Heat (1995).mkv.tmp"), b"b").unwrap();
        std::fs::write(movies.join("notes.txt"), b"c").unwrap();

        let listed = manager.list_downloads();
        assert_eq!(listed.len(), 1);
        assert!(listed.contains(Path::new("Movies/Alien (1979).mkv")));
        assert_eq!(manager.local_path(&movie()), Some(movies.join("Alien (1979).mkv")));
    }

    #[test]
    fn test_list_downloads_missing_root_is_empty() {
        let dir = TempDir::new().unwrap();
        let manager = DownloadManager::new(dir.path().join("nope"));
        assert!(manager.list_downloads().is_empty());
        assert_eq!(manager.download_size(&movie()), 0);
    }
}
