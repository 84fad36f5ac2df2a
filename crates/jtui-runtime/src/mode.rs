//! Online/offline mode selection.

use std::path::Path;

use jtui_api::jellyfin::auth::{clear_session, load_session, save_session};
use jtui_api::{JellyfinClient, JellyfinError};
use jtui_core::config::ServerConfig;
use jtui_core::{CoreError, OfflineCatalog};
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Mode {
    Online,
    Offline,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Online => f.write_str("online"),
            Self::Offline => f.write_str("offline"),
        }
    }
}

/// Bring the client to an authenticated state.
///
/// Order: the client's current session, then the saved one, then the
/// configured credentials (saving the new session on success). A saved
/// session the server refuses is deleted.
pub async fn connect(
    client: &JellyfinClient,
    server: &ServerConfig,
    session_path: &Path,
) -> Result<(), JellyfinError> {
    client.ping().await?;

    if client.session().is_some_and(|s| s.is_complete()) {
        match client.validate_session().await {
            Ok(()) => return Ok(()),
            Err(e) => debug!(error = %e, "Current session rejected"),
        }
    }

    match load_session(session_path) {
        Ok(Some(saved)) => {
            client.set_session(Some(saved));
            match client.validate_session().await {
                Ok(()) => {
                    info!("Resumed saved session");
                    return Ok(());
                }
                Err(JellyfinError::NotAuthenticated) => {
                    debug!("Saved session rejected, forgetting it");
                    client.set_session(None);
                    if let Err(e) = clear_session(session_path) {
                        warn!(error = %e, "Failed to delete saved session");
                    }
                }
                Err(e) => {
                    debug!(error = %e, "Saved session could not be checked");
                    client.set_session(None);
                }
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Ignoring unreadable saved session"),
    }

    let (Some(username), Some(password)) = (&server.username, &server.password) else {
        return Err(JellyfinError::NotAuthenticated);
    };
    let session = client.authenticate_by_name(username, password).await?;
    if let Err(e) = save_session(session_path, &session) {
        warn!(error = %e, "Failed to save session");
    }
    Ok(())
}

/// Online when [`connect`] succeeds; otherwise offline, which needs at least
/// one downloaded item.
pub async fn select_mode(
    client: &JellyfinClient,
    server: &ServerConfig,
    session_path: &Path,
    catalog: &OfflineCatalog,
) -> Result<Mode, CoreError> {
    match connect(client, server, session_path).await {
        Ok(()) => {
            info!(server = %client.base_url(), "Online mode");
            Ok(Mode::Online)
        }
        Err(e) => {
            warn!(error = %e, "Server unavailable, falling back to downloads");
            if catalog.has_content() {
                info!(root = %catalog.root().display(), "Offline mode");
                Ok(Mode::Offline)
            } else {
                Err(CoreError::NoContentAvailable)
            }
        }
    }
}
