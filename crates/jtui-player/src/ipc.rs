//! JSON IPC client for mpv.
//!
//! Each request opens a fresh connection to the player's Unix socket, writes a
//! single newline-terminated `{"command": [...]}` object and reads lines until
//! the reply arrives. Event lines the player interleaves are skipped.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::trace;

use crate::error::PlayerError;
use crate::retry::{Clock, RetryPolicy, TokioClock};

/// Which track list a label is requested for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Subtitle,
    Audio,
}

impl TrackKind {
    fn property(self) -> &'static str {
        match self {
            Self::Subtitle => "current-tracks/sub",
            Self::Audio => "current-tracks/audio",
        }
    }

    fn cycle_property(self) -> &'static str {
        match self {
            Self::Subtitle => "sid",
            Self::Audio => "aid",
        }
    }

    fn fallback(self) -> &'static str {
        match self {
            Self::Subtitle => "Off",
            Self::Audio => "Unknown",
        }
    }
}

#[derive(Clone)]
pub struct MpvIpc {
    path: PathBuf,
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for MpvIpc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MpvIpc")
            .field("path", &self.path)
            .field("policy", &self.policy)
            .finish()
    }
}

impl MpvIpc {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_policy(path, RetryPolicy::default(), Arc::new(TokioClock))
    }

    pub fn with_policy(path: impl Into<PathBuf>, policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            path: path.into(),
            policy,
            clock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Send a command and return the reply's `data` field.
    pub async fn request(&self, command: &[Value]) -> Result<Value, PlayerError> {
        let line = format!("{}\n", json!({ "command": command }));
        self.policy
            .execute(self.clock.as_ref(), || request_once(&self.path, &line))
            .await
    }

    pub async fn get_property(&self, name: &str) -> Result<Value, PlayerError> {
        self.request(&[json!("get_property"), json!(name)]).await
    }

    /// Numeric property, 0 when unavailable.
    pub async fn get_f64(&self, name: &str) -> f64 {
        self.get_property(name)
            .await
            .ok()
            .and_then(|v| v.as_f64())
            .unwrap_or(0.0)
    }

    /// Pause flag, `None` when the player could not be asked.
    pub async fn get_pause(&self) -> Option<bool> {
        self.get_property("pause").await.ok().and_then(|v| v.as_bool())
    }

    pub async fn cycle(&self, property: &str) -> Result<(), PlayerError> {
        self.request(&[json!("cycle"), json!(property)]).await?;
        Ok(())
    }

    pub async fn cycle_track(&self, kind: TrackKind) -> Result<(), PlayerError> {
        self.cycle(kind.cycle_property()).await
    }

    pub async fn quit(&self) -> Result<(), PlayerError> {
        self.request(&[json!("quit")]).await?;
        Ok(())
    }

    /// Human-readable label for the active track of a kind.
    pub async fn track_label(&self, kind: TrackKind) -> String {
        match self.get_property(kind.property()).await {
            Ok(track) => describe_track(&track, kind),
            Err(_) => kind.fallback().to_string(),
        }
    }
}

/// Title, else language, else `Track <id>`, else the kind's fallback.
pub fn describe_track(track: &Value, kind: TrackKind) -> String {
    let non_empty = |key: &str| {
        track
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    non_empty("title")
        .or_else(|| non_empty("lang"))
        .or_else(|| track.get("id").and_then(Value::as_i64).map(|id| format!("Track {id}")))
        .unwrap_or_else(|| kind.fallback().to_string())
}

#[cfg(unix)]
async fn request_once(path: &Path, line: &str) -> Result<Value, PlayerError> {
    let stream = tokio::net::UnixStream::connect(path)
        .await
        .map_err(|e| PlayerError::IpcUnreachable(e.to_string()))?;
    let (reader, mut writer) = stream.into_split();
    writer.write_all(line.as_bytes()).await?;
    trace!(request = line.trim_end(), "IPC request");

    let mut lines = BufReader::new(reader).lines();
    while let Some(raw) = lines.next_line().await? {
        let reply: Value = match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => return Err(PlayerError::Protocol(format!("invalid reply: {e}"))),
        };
        if reply.get("event").is_some() {
            continue;
        }
        return match reply.get("error").and_then(Value::as_str) {
            Some("success") => Ok(reply.get("data").cloned().unwrap_or(Value::Null)),
            Some(other) => Err(PlayerError::Protocol(other.to_string())),
            None => Err(PlayerError::Protocol(format!("unexpected reply: {raw}"))),
        };
    }
    Err(PlayerError::Protocol("connection closed before reply".into()))
}

#[cfg(not(unix))]
async fn request_once(path: &Path, _line: &str) -> Result<Value, PlayerError> {
    Err(PlayerError::IpcUnreachable(format!(
        "{} (Unix sockets are not supported on this platform)",
        path.display()
    )))
}
