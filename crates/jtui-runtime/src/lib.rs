pub mod mode;

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{info, warn};

use jtui_api::{JellyfinClient, JellyfinError, MediaServer};
use jtui_core::config::AppConfig;
use jtui_core::models::{
    is_offline_id, seconds_to_ticks, CatalogEntry, Item, MediaItem, OFFLINE_LIBRARY_ID,
};
use jtui_core::{CoreError, DownloadManager, OfflineCatalog};
use jtui_player::{
    PlayRequest, PlaybackController, PlaybackEvent, PlaybackTarget, PlayerError, SessionState,
};

pub use mode::Mode;

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Api(#[from] JellyfinError),
    #[error(transparent)]
    Player(#[from] PlayerError),
    #[error("{0} is a folder and cannot be played")]
    NotPlayable(String),
    #[error("not available in offline mode")]
    Offline,
}

/// Summary shown by `jtui status`.
#[derive(Debug, Clone, Serialize)]
pub struct StatusDto {
    pub mode: Mode,
    pub server: String,
    pub downloads_root: PathBuf,
    pub downloads: usize,
    pub session: SessionState,
}

/// Facade over the server, the download store and the player.
///
/// Every lookup is routed by mode: offline ids always go to the local
/// catalog, server ids need online mode.
pub struct Client {
    config: AppConfig,
    session_path: PathBuf,
    server: Arc<JellyfinClient>,
    downloads: DownloadManager,
    catalog: OfflineCatalog,
    mode: RwLock<Mode>,
    player: PlaybackController<JellyfinClient>,
    /// Server copy of the item handed to the player last.
    now_playing: Mutex<Option<MediaItem>>,
}

impl Client {
    /// Build a client using the default session location.
    pub async fn connect(
        config: AppConfig,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PlaybackEvent>), RuntimeError> {
        Self::connect_with(config, AppConfig::session_path()).await
    }

    pub async fn connect_with(
        config: AppConfig,
        session_path: PathBuf,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PlaybackEvent>), RuntimeError> {
        let server = Arc::new(JellyfinClient::from_config(&config.server)?);
        let root = config.downloads_root();
        let downloads = DownloadManager::new(&root);
        let catalog = OfflineCatalog::new(&root);

        let mode = mode::select_mode(&server, &config.server, &session_path, &catalog).await?;
        let (player, events) =
            PlaybackController::new(config.player.clone(), Some(Arc::clone(&server)));

        Ok((
            Self {
                config,
                session_path,
                server,
                downloads,
                catalog,
                mode: RwLock::new(mode),
                player,
                now_playing: Mutex::new(None),
            },
            events,
        ))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn player(&self) -> &PlaybackController<JellyfinClient> {
        &self.player
    }

    pub fn catalog(&self) -> &OfflineCatalog {
        &self.catalog
    }

    pub async fn mode(&self) -> Mode {
        *self.mode.read().await
    }

    /// Re-run mode selection, e.g. after the server comes back.
    pub async fn reconnect(&self) -> Result<Mode, RuntimeError> {
        let mode = mode::select_mode(
            &self.server,
            &self.config.server,
            &self.session_path,
            &self.catalog,
        )
        .await?;
        *self.mode.write().await = mode;
        Ok(mode)
    }

    pub async fn status(&self) -> StatusDto {
        StatusDto {
            mode: self.mode().await,
            server: self.server.base_url().to_string(),
            downloads_root: self.downloads.root().to_path_buf(),
            downloads: self.downloads.list_downloads().len(),
            session: self.player.state().await,
        }
    }

    async fn require_online(&self) -> Result<(), RuntimeError> {
        match self.mode().await {
            Mode::Online => Ok(()),
            Mode::Offline => Err(RuntimeError::Offline),
        }
    }

    /// Look up a server item with the user's playback data.
    pub async fn item(&self, item_id: &str) -> Result<MediaItem, RuntimeError> {
        self.require_online().await?;
        Ok(self.server.get_item(item_id).await?)
    }

    /// Work out what the player should open for an item.
    ///
    /// A local copy wins over streaming. `resume` starts from the saved
    /// server position; offline content always starts at the beginning.
    pub async fn resolve_target(
        &self,
        item_id: &str,
        resume: bool,
    ) -> Result<PlayRequest, RuntimeError> {
        Ok(self.resolve(item_id, resume).await?.0)
    }

    /// The request plus the server item behind it, if there is one.
    async fn resolve(
        &self,
        item_id: &str,
        resume: bool,
    ) -> Result<(PlayRequest, Option<MediaItem>), RuntimeError> {
        if is_offline_id(item_id) {
            let entry = self.catalog.get_by_id(item_id)?;
            let path = entry
                .file_path()
                .ok_or_else(|| RuntimeError::NotPlayable(entry.name.clone()))?;
            let request = PlayRequest {
                item_id: entry.id.clone(),
                target: PlaybackTarget::Local(path.clone()),
                start_ticks: 0,
            };
            return Ok((request, None));
        }

        let item = self.item(item_id).await?;
        if item.is_folder() {
            return Err(RuntimeError::NotPlayable(item.name.clone()));
        }
        let target = match self.downloads.local_path(&item) {
            Some(path) => PlaybackTarget::Local(path),
            None => PlaybackTarget::Remote(
                MediaServer::download_url(self.server.as_ref(), &item.id)
                    .ok_or(CoreError::NotAuthenticated)?,
            ),
        };
        let start_ticks = if resume {
            item.playback_position_ticks()
        } else {
            0
        };
        let request = PlayRequest {
            item_id: item.id.clone(),
            target,
            start_ticks,
        };
        Ok((request, Some(item)))
    }

    pub async fn play(&self, item_id: &str, resume: bool) -> Result<PlayRequest, RuntimeError> {
        let (request, item) = self.resolve(item_id, resume).await?;
        self.player.play(request.clone()).await?;
        *self.now_playing.lock().unwrap_or_else(|e| e.into_inner()) = item;
        Ok(request)
    }

    /// Apply a completion event to the item that was playing, ahead of the
    /// server's own copy: played past the threshold, or a new resume point.
    /// `None` for other events and for items without a server copy.
    pub fn finish(&self, event: &PlaybackEvent) -> Option<MediaItem> {
        let PlaybackEvent::Completed {
            item_id,
            position,
            watched,
            ..
        } = event
        else {
            return None;
        };
        let mut now_playing = self.now_playing.lock().unwrap_or_else(|e| e.into_inner());
        if now_playing.as_ref().map_or(true, |item| item.id != *item_id) {
            return None;
        }
        let mut item = now_playing.take()?;
        if *watched {
            item.mark_played();
        } else {
            item.user_data.playback_position_ticks = seconds_to_ticks(*position);
        }
        Some(item)
    }

    /// Download a server item into the storage root.
    pub async fn download<F>(&self, item_id: &str, on_progress: F) -> Result<PathBuf, RuntimeError>
    where
        F: FnMut(u64, u64),
    {
        let item = self.item(item_id).await?;
        if item.is_folder() {
            return Err(RuntimeError::NotPlayable(item.name.clone()));
        }
        Ok(self
            .downloads
            .download(&item, self.server.as_ref(), on_progress)
            .await?)
    }

    /// Delete a local copy, addressed by a server id or an offline id.
    pub async fn remove(&self, item_id: &str) -> Result<PathBuf, RuntimeError> {
        if is_offline_id(item_id) {
            let entry = self.catalog.get_by_id(item_id)?;
            let path = entry
                .file_path()
                .ok_or_else(|| RuntimeError::NotPlayable(entry.name.clone()))?
                .clone();
            self.downloads.remove_path(&path)?;
            return Ok(path);
        }
        let item = self.item(item_id).await?;
        Ok(self.downloads.remove(&item)?)
    }

    pub fn downloads(&self) -> BTreeSet<PathBuf> {
        self.downloads.list_downloads()
    }

    /// Browse downloaded content; `None` lists the library root.
    pub fn offline_children(&self, parent_id: Option<&str>) -> Vec<CatalogEntry> {
        self.catalog.children(parent_id.unwrap_or(OFFLINE_LIBRARY_ID))
    }

    /// Set the watched flag on the server and return the item as it now
    /// stands. Offline ids have no server counterpart.
    pub async fn set_watched(&self, item_id: &str, watched: bool) -> Result<MediaItem, RuntimeError> {
        if is_offline_id(item_id) {
            return Err(RuntimeError::Offline);
        }
        let mut item = self.item(item_id).await?;
        if watched {
            self.server.mark_watched(item_id).await?;
            item.mark_played();
        } else {
            self.server.mark_unwatched(item_id).await?;
            item.mark_unplayed();
        }
        info!(item_id, watched, "Watched state updated");
        Ok(item)
    }

    /// Kill the player and clean up its endpoint.
    pub async fn shutdown(&self) {
        self.player.shutdown().await;
        if self.player.tracked_players().await > 0 {
            warn!("Players still tracked after shutdown");
        }
    }
}
