use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::media::{Item, ItemKind, MediaItem};

/// Id of the virtual library that holds all downloaded content.
pub const OFFLINE_LIBRARY_ID: &str = "offline-library";
pub const OFFLINE_PREFIX: &str = "offline-";
pub const OFFLINE_MOVIE_PREFIX: &str = "offline-movie-";
pub const OFFLINE_EPISODE_PREFIX: &str = "offline-episode-";
pub const OFFLINE_SERIES_PREFIX: &str = "offline-series-";
pub const OFFLINE_OTHER_PREFIX: &str = "offline-other-";

/// Whether an id was synthesized by the offline catalog.
pub fn is_offline_id(id: &str) -> bool {
    id.starts_with(OFFLINE_PREFIX)
}

/// A media file found in the storage root.
#[derive(Debug, Clone, Serialize)]
pub struct LocalFile {
    pub path: PathBuf,
    /// Path relative to the storage root.
    pub relative: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

/// An item reconstructed from the storage layout.
///
/// Series entries are synthetic folders and carry no file.
#[derive(Debug, Clone, Serialize)]
pub struct CatalogEntry {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub series_name: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub year: Option<u32>,
    pub file: Option<LocalFile>,
}

impl CatalogEntry {
    /// The virtual "Downloaded Content" library shown while offline.
    pub fn library_root() -> Self {
        Self {
            id: OFFLINE_LIBRARY_ID.into(),
            name: "Downloaded Content".into(),
            kind: ItemKind::Other,
            series_name: None,
            season: None,
            episode: None,
            year: None,
            file: None,
        }
    }

    /// Absolute path of the backing file, if this entry is playable.
    pub fn file_path(&self) -> Option<&PathBuf> {
        self.file.as_ref().map(|f| &f.path)
    }

    /// View this entry as a server-shaped item, e.g. for path resolution.
    pub fn to_media_item(&self) -> MediaItem {
        MediaItem {
            id: self.id.clone(),
            name: self.name.clone(),
            is_folder: self.is_folder(),
            kind: self.kind,
            series_name: self.series_name.clone(),
            parent_index_number: self.season,
            index_number: self.episode,
            production_year: self.year,
            ..Default::default()
        }
    }
}

impl Item for CatalogEntry {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_folder(&self) -> bool {
        self.id == OFFLINE_LIBRARY_ID || self.kind == ItemKind::Series
    }
}
