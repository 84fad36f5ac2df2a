//! Persisted login sessions.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::JellyfinError;

/// Credentials returned by a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub access_token: String,
    pub user_id: String,
}

impl Session {
    pub fn is_complete(&self) -> bool {
        !self.access_token.is_empty() && !self.user_id.is_empty()
    }
}

/// Read a saved session. Returns `Ok(None)` when nothing has been saved yet.
pub fn load_session(path: &Path) -> Result<Option<Session>, JellyfinError> {
    if !path.exists() {
        return Ok(None);
    }
    let content =
        std::fs::read_to_string(path).map_err(|e| JellyfinError::Session(e.to_string()))?;
    let session: Session =
        serde_json::from_str(&content).map_err(|e| JellyfinError::Session(e.to_string()))?;
    if !session.is_complete() {
        return Err(JellyfinError::Session("saved session is incomplete".into()));
    }
    debug!(path = %path.display(), "Loaded saved session");
    Ok(Some(session))
}

/// Write a session so later runs can skip the login.
pub fn save_session(path: &Path, session: &Session) -> Result<(), JellyfinError> {
    if !session.is_complete() {
        return Err(JellyfinError::Session("no complete session data to save".into()));
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| JellyfinError::Session(e.to_string()))?;
    }
    let json = serde_json::to_string(session).map_err(|e| JellyfinError::Session(e.to_string()))?;
    std::fs::write(path, json).map_err(|e| JellyfinError::Session(e.to_string()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(|e| JellyfinError::Session(e.to_string()))?;
    }

    debug!(path = %path.display(), "Saved session");
    Ok(())
}

/// Forget a saved session.
pub fn clear_session(path: &Path) -> Result<(), JellyfinError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(JellyfinError::Session(e.to_string())),
    }
}
