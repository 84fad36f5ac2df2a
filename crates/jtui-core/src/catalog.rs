//! Offline catalog.
//!
//! Walks the download root and reconstructs item metadata from the storage
//! layout alone. Nothing is cached: every query rescans the disk, so the
//! catalog always reflects what is currently downloaded.

use std::collections::BTreeSet;
use std::path::{Component, Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::CoreError;
use crate::models::catalog::{
    OFFLINE_EPISODE_PREFIX, OFFLINE_MOVIE_PREFIX, OFFLINE_OTHER_PREFIX, OFFLINE_SERIES_PREFIX,
};
use crate::models::{CatalogEntry, ItemKind, LocalFile, OFFLINE_LIBRARY_ID};
use crate::paths::{is_media_file, slug, MEDIA_EXTENSION, MOVIES_DIR, OTHER_DIR};

static EPISODE_FILE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^S(\d+)E(\d+) - (.*)$").expect("valid regex"));
static SEASON_DIR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Season\s*(\d+)").expect("valid regex"));
static MOVIE_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\((\d{4})\)$").expect("valid regex"));

/// Read-only view over the download root.
#[derive(Debug, Clone)]
pub struct OfflineCatalog {
    root: PathBuf,
}

impl OfflineCatalog {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The virtual library all offline content hangs off.
    pub fn library_root(&self) -> CatalogEntry {
        CatalogEntry::library_root()
    }

    /// Top-level offline content: one folder per series, then movies, then
    /// everything else, each group sorted by name.
    pub fn discover_all(&self) -> Vec<CatalogEntry> {
        let files = self.scan(&self.root);

        let mut series_names = BTreeSet::new();
        let mut movies = Vec::new();
        let mut others = Vec::new();
        for entry in files {
            match entry.kind {
                ItemKind::Episode => {
                    if let Some(name) = entry.series_name {
                        series_names.insert(name);
                    }
                }
                ItemKind::Movie => movies.push(entry),
                _ => others.push(entry),
            }
        }
        movies.sort_by(|a, b| a.name.cmp(&b.name).then(a.year.cmp(&b.year)));
        others.sort_by(|a, b| a.name.cmp(&b.name));

        let mut items: Vec<CatalogEntry> = series_names.into_iter().map(series_entry).collect();
        items.extend(movies);
        items.extend(others);
        debug!(count = items.len(), root = %self.root.display(), "Discovered offline content");
        items
    }

    /// Whether anything playable is stored.
    pub fn has_content(&self) -> bool {
        !self.discover_all().is_empty()
    }

    /// Episodes stored under `<root>/<series>`, ordered by season, episode,
    /// then title.
    pub fn episodes_for_series(&self, series: &str) -> Vec<CatalogEntry> {
        let mut episodes: Vec<CatalogEntry> = self
            .scan(&self.root.join(series))
            .into_iter()
            .filter(|e| e.kind == ItemKind::Episode && e.series_name.as_deref() == Some(series))
            .collect();
        episodes.sort_by(|a, b| {
            (a.season.unwrap_or(0), a.episode.unwrap_or(0), &a.name).cmp(&(
                b.season.unwrap_or(0),
                b.episode.unwrap_or(0),
                &b.name,
            ))
        });
        episodes
    }

    /// Look an entry up by synthetic id, rescanning the disk.
    pub fn get_by_id(&self, id: &str) -> Result<CatalogEntry, CoreError> {
        if id == OFFLINE_LIBRARY_ID {
            return Ok(self.library_root());
        }
        if id.starts_with(OFFLINE_SERIES_PREFIX) {
            return self
                .discover_all()
                .into_iter()
                .find(|e| e.id == id)
                .ok_or_else(|| CoreError::NotFound(id.to_string()));
        }
        self.scan(&self.root)
            .into_iter()
            .find(|e| e.id == id)
            .ok_or_else(|| CoreError::NotFound(id.to_string()))
    }

    /// Children of an offline folder. Unknown or non-folder ids have none.
    pub fn children(&self, parent_id: &str) -> Vec<CatalogEntry> {
        if parent_id == OFFLINE_LIBRARY_ID {
            return self.discover_all();
        }
        if parent_id.starts_with(OFFLINE_SERIES_PREFIX) {
            if let Ok(series) = self.get_by_id(parent_id) {
                return self.episodes_for_series(&series.name);
            }
        }
        Vec::new()
    }

    /// Every media file under `dir`, parsed but not aggregated.
    fn scan(&self, dir: &Path) -> Vec<CatalogEntry> {
        if !dir.is_dir() {
            return Vec::new();
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(dir)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() || !is_media_file(entry.path()) {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(&self.root) else {
                continue;
            };
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    warn!(path = %entry.path().display(), error = %e, "Failed to read file metadata");
                    continue;
                }
            };

            let file = LocalFile {
                path: entry.path().to_path_buf(),
                relative: relative.to_path_buf(),
                size: metadata.len(),
                modified: metadata.modified().ok().map(Into::into),
            };
            entries.push(parse_entry(file));
        }
        entries
    }
}

fn series_entry(name: String) -> CatalogEntry {
    CatalogEntry {
        id: format!("{OFFLINE_SERIES_PREFIX}{}", slug(&name)),
        name: name.clone(),
        kind: ItemKind::Series,
        series_name: Some(name),
        season: None,
        episode: None,
        year: None,
        file: None,
    }
}

/// Invert the canonical layout for one stored file.
pub fn parse_entry(file: LocalFile) -> CatalogEntry {
    let dirs: Vec<String> = file
        .relative
        .parent()
        .map(|p| {
            p.components()
                .filter_map(|c| match c {
                    Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                    _ => None,
                })
                .collect()
        })
        .unwrap_or_default();
    let stem = file
        .relative
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .map(|n| strip_extension(&n).to_string())
        .unwrap_or_default();

    let mut entry = CatalogEntry {
        id: String::new(),
        name: stem.clone(),
        kind: ItemKind::Other,
        series_name: None,
        season: None,
        episode: None,
        year: None,
        file: None,
    };

    let season_dir = dirs.get(1).and_then(|d| SEASON_DIR.captures(d));
    match dirs.first().map(String::as_str) {
        Some(series) if season_dir.is_some() => {
            entry.kind = ItemKind::Episode;
            entry.series_name = Some(series.to_string());
            entry.season = season_dir.and_then(|c| c[1].parse().ok());
            if let Some(caps) = EPISODE_FILE.captures(&stem) {
                entry.season = caps[1].parse().ok().or(entry.season);
                entry.episode = caps[2].parse().ok();
                entry.name = caps[3].to_string();
            }
        }
        Some(MOVIES_DIR) => {
            entry.kind = ItemKind::Movie;
            if let Some(caps) = MOVIE_YEAR.captures(&stem) {
                entry.name = caps[1].to_string();
                entry.year = caps[2].parse().ok();
            }
        }
        Some(series) if dirs.len() == 1 && series != OTHER_DIR => {
            entry.kind = ItemKind::Episode;
            entry.series_name = Some(series.to_string());
        }
        _ => {}
    }

    entry.id = match entry.kind {
        ItemKind::Episode => format!(
            "{OFFLINE_EPISODE_PREFIX}{}",
            slug(&file.relative.to_string_lossy())
        ),
        ItemKind::Movie => format!("{OFFLINE_MOVIE_PREFIX}{}", slug(&stem)),
        _ => format!("{OFFLINE_OTHER_PREFIX}{}", slug(&stem)),
    };
    entry.file = Some(file);
    entry
}

fn strip_extension(name: &str) -> &str {
    let suffix_len = MEDIA_EXTENSION.len() + 1;
    match name.len().checked_sub(suffix_len) {
        Some(cut)
            if name.is_char_boundary(cut)
                && name[cut..].eq_ignore_ascii_case(&format!(".{MEDIA_EXTENSION}")) =>
        {
            &name[..cut]
        }
        _ => name,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Item, MediaItem};
    use crate::paths::PathResolver;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"video").unwrap();
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Movies/Spirited Away (2001).mkv");
        touch(dir.path(), "Movies/Akira.mkv");
        touch(dir.path(), "Dark/Season 01/S01E02 - Lies.mkv");
        touch(dir.path(), "Dark/Season 01/S01E01 - Secrets.mkv");
        touch(dir.path(), "Dark/Season 02/S02E01 - Beginnings and Endings.mkv");
        touch(dir.path(), "Lost/Season 01/S01E01 - Pilot.mkv");
        touch(dir.path(), "Other/Concert.mkv");
        touch(dir.path(), "Movies/Partial (2020).mkv.tmp");
        touch(dir.path(), "Other/readme.txt");
        dir
    }

    #[test]
    fn test_discover_all_groups_and_orders() {
        let dir = fixture();
        let catalog = OfflineCatalog::new(dir.path());
        let items = catalog.discover_all();

        let names: Vec<_> = items.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Dark", "Lost", "Akira", "Spirited Away", "Concert"]);

        let kinds: Vec<_> = items.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            [
                ItemKind::Series,
                ItemKind::Series,
                ItemKind::Movie,
                ItemKind::Movie,
                ItemKind::Other
            ]
        );
        assert!(items[0].is_folder());
        assert_eq!(items[0].id, "offline-series-Dark");
        assert_eq!(items[3].year, Some(2001));
        assert_eq!(items[3].id, "offline-movie-Spirited-Away-2001");
        assert_eq!(items[4].id, "offline-other-Concert");
    }

    #[test]
    fn test_empty_or_missing_root() {
        let dir = TempDir::new().unwrap();
        assert!(OfflineCatalog::new(dir.path()).discover_all().is_empty());
        assert!(!OfflineCatalog::new(dir.path().join("missing")).has_content());
    }

    #[test]
    fn test_episodes_for_series_sorted() {
        let dir = fixture();
        let catalog = OfflineCatalog::new(dir.path());
        let episodes = catalog.episodes_for_series("Dark");

        let order: Vec<_> = episodes
            .iter()
            .map(|e| (e.season.unwrap(), e.episode.unwrap(), e.name.as_str()))
            .collect();
        assert_eq!(
            order,
            [
                (1, 1, "Secrets"),
                (1, 2, "Lies"),
                (2, 1, "Beginnings and Endings")
            ]
        );
        assert!(episodes.iter().all(|e| e.id.starts_with(OFFLINE_EPISODE_PREFIX)));
        assert!(catalog.episodes_for_series("Missing").is_empty());
    }

    #[test]
    fn test_get_by_id_rescans() {
        let dir = fixture();
        let catalog = OfflineCatalog::new(dir.path());
        let movie = catalog.get_by_id("offline-movie-Akira").unwrap();
        assert_eq!(movie.kind, ItemKind::Movie);
        assert_eq!(
            movie.file_path().unwrap(),
            &dir.path().join("Movies/Akira.mkv")
        );

        std::fs::remove_file(dir.path().join("Movies/Akira.mkv")).unwrap();
        assert!(matches!(
            catalog.get_by_id("offline-movie-Akira"),
            Err(CoreError::NotFound(_))
        ));

        let series = catalog.get_by_id("offline-series-Lost").unwrap();
        assert!(series.file.is_none());
        assert_eq!(
            catalog.get_by_id(OFFLINE_LIBRARY_ID).unwrap().name,
            "Downloaded Content"
        );
    }

    #[test]
    fn test_episode_ids_are_stable() {
        let dir = fixture();
        let catalog = OfflineCatalog::new(dir.path());
        let first = catalog.episodes_for_series("Lost");
        let second = catalog.episodes_for_series("Lost");
        assert_eq!(first[0].id, second[0].id);
        assert_eq!(first[0].id, "offline-episode-Lost-Season-01-S01E01-Pilot-mkv");
        assert_eq!(catalog.get_by_id(&first[0].id).unwrap().name, "Pilot");
    }

    #[test]
    fn test_children() {
        let dir = fixture();
        let catalog = OfflineCatalog::new(dir.path());
        assert_eq!(catalog.children(OFFLINE_LIBRARY_ID).len(), 5);
        assert_eq!(catalog.children("offline-series-Dark").len(), 3);
        assert!(catalog.children("offline-series-Nope").is_empty());
        assert!(catalog.children("offline-movie-Akira").is_empty());
    }

    #[test]
    fn test_series_without_seasons() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "Planet Earth/Mountains.mkv");
        let catalog = OfflineCatalog::new(dir.path());
        let items = catalog.discover_all();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, ItemKind::Series);
        let episodes = catalog.episodes_for_series("Planet Earth");
        assert_eq!(episodes[0].name, "Mountains");
        assert_eq!(episodes[0].season, None);
    }

    #[test]
    fn test_unparseable_files_are_other() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "loose.mkv");
        touch(dir.path(), "a/b/c/deep.mkv");
        let catalog = OfflineCatalog::new(dir.path());
        let items = catalog.discover_all();
        assert_eq!(items.len(), 2);
        assert!(items.iter().all(|e| e.kind == ItemKind::Other));
    }

    #[test]
    fn test_layout_round_trip() {
        let dir = TempDir::new().unwrap();
        let resolver = PathResolver::new(dir.path());
        let item = MediaItem {
            id: "remote".into(),
            name: "Home".into(),
            kind: ItemKind::Episode,
            series_name: Some("The Expanse".into()),
            parent_index_number: Some(2),
            index_number: Some(5),
            ..Default::default()
        };
        let path = resolver.absolute(&item);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"x").unwrap();

        let catalog = OfflineCatalog::new(dir.path());
        let episode = &catalog.episodes_for_series("The Expanse")[0];
        assert_eq!(episode.name, "Home");
        assert_eq!((episode.season, episode.episode), (Some(2), Some(5)));
        assert_eq!(resolver.absolute(&episode.to_media_item()), path);
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("Heat.mkv"), "Heat");
        assert_eq!(strip_extension("Heat.MKV"), "Heat");
        assert_eq!(strip_extension("mkv"), "mkv");
    }
}
