use std::sync::RwLock;
use std::time::Duration;

use jtui_core::config::ServerConfig;
use jtui_core::models::MediaItem;
use jtui_core::RemoteSource;
use reqwest::{Client, StatusCode};
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use super::auth::Session;
use super::error::JellyfinError;
use super::types::{AuthRequest, AuthResponse, PlaybackReport, ServerInfo};
use crate::traits::MediaServer;

const CLIENT_NAME: &str = "jtui";
const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");
const PLAY_METHOD: &str = "DirectPlay";

/// Jellyfin REST client.
///
/// The session sits behind a lock so a shared client can log in or reconnect
/// while playback tasks hold references to it.
pub struct JellyfinClient {
    http: Client,
    base_url: String,
    device_name: String,
    device_id: String,
    session: RwLock<Option<Session>>,
}

impl JellyfinClient {
    pub fn new(base_url: &str, device_name: &str, timeout: Duration) -> Result<Self, JellyfinError> {
        let parsed = Url::parse(base_url)
            .map_err(|e| JellyfinError::Parse(format!("invalid server URL {base_url:?}: {e}")))?;
        let http = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            http,
            base_url: parsed.as_str().trim_end_matches('/').to_string(),
            device_name: device_name.to_string(),
            device_id: Uuid::new_v4().to_string(),
            session: RwLock::new(None),
        })
    }

    pub fn from_config(config: &ServerConfig) -> Result<Self, JellyfinError> {
        Self::new(
            &config.url,
            &config.device_name,
            Duration::from_secs(config.timeout_secs),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session(&self) -> Option<Session> {
        self.session
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap_or_else(|e| e.into_inner()) = session;
    }

    fn require_session(&self) -> Result<Session, JellyfinError> {
        self.session()
            .filter(Session::is_complete)
            .ok_or(JellyfinError::NotAuthenticated)
    }

    fn auth_header(&self, token: Option<&str>) -> String {
        let mut header = format!(
            r#"MediaBrowser Client="{CLIENT_NAME}", Device="{}", DeviceId="{}", Version="{CLIENT_VERSION}""#,
            self.device_name, self.device_id
        );
        if let Some(token) = token {
            header.push_str(&format!(r#", Token="{token}""#));
        }
        header
    }

    async fn check_response(resp: reqwest::Response) -> Result<reqwest::Response, JellyfinError> {
        if resp.status().is_success() {
            Ok(resp)
        } else {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            Err(JellyfinError::Api {
                status,
                message: body,
            })
        }
    }

    /// Reachability check. An unauthorized answer still proves the server is
    /// up.
    pub async fn ping(&self) -> Result<(), JellyfinError> {
        let resp = self
            .http
            .get(format!("{}/System/Info", self.base_url))
            .send()
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let info: ServerInfo = resp.json().await.unwrap_or_default();
                debug!(
                    server = info.server_name.as_deref().unwrap_or("unknown"),
                    version = info.version.as_deref().unwrap_or("unknown"),
                    "Server reachable"
                );
                Ok(())
            }
            StatusCode::UNAUTHORIZED => Ok(()),
            _ => Self::check_response(resp).await.map(|_| ()),
        }
    }

    /// Confirm the current token is still accepted.
    pub async fn validate_session(&self) -> Result<(), JellyfinError> {
        let session = self.require_session()?;
        let resp = self
            .http
            .get(format!("{}/Library/MediaFolders", self.base_url))
            .header("X-Emby-Authorization", self.auth_header(Some(&session.access_token)))
            .send()
            .await?;

        if resp.status() == StatusCode::UNAUTHORIZED {
            return Err(JellyfinError::NotAuthenticated);
        }
        Self::check_response(resp).await?;
        Ok(())
    }

    /// Log in with a username and password. The new session replaces any
    /// existing one.
    pub async fn authenticate_by_name(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Session, JellyfinError> {
        info!(username, server = %self.base_url, "Authenticating");
        let resp = self
            .http
            .post(format!("{}/Users/AuthenticateByName", self.base_url))
            .header("X-Emby-Authorization", self.auth_header(None))
            .json(&AuthRequest {
                username,
                pw: password,
            })
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        let body: AuthResponse = resp
            .json()
            .await
            .map_err(|e| JellyfinError::Parse(e.to_string()))?;

        let session = Session {
            access_token: body.access_token,
            user_id: body.user.id,
        };
        if !session.is_complete() {
            return Err(JellyfinError::Parse(
                "login response is missing the token or user id".into(),
            ));
        }
        info!(user = %body.user.name, "Authenticated");
        self.set_session(Some(session.clone()));
        Ok(session)
    }

    /// Fetch one item with the user's playback data.
    pub async fn get_item(&self, item_id: &str) -> Result<MediaItem, JellyfinError> {
        let session = self.require_session()?;
        let resp = self
            .http
            .get(format!(
                "{}/Users/{}/Items/{item_id}",
                self.base_url, session.user_id
            ))
            .header("X-Emby-Authorization", self.auth_header(Some(&session.access_token)))
            .send()
            .await?;

        let resp = Self::check_response(resp).await?;
        resp.json()
            .await
            .map_err(|e| JellyfinError::Parse(e.to_string()))
    }

    async fn post_report(&self, path: &str, report: &PlaybackReport<'_>) -> Result<(), JellyfinError> {
        let session = self.require_session()?;
        let resp = self
            .http
            .post(format!("{}{path}", self.base_url))
            .header("X-Emby-Authorization", self.auth_header(Some(&session.access_token)))
            .json(report)
            .send()
            .await?;
        Self::check_response(resp).await?;
        Ok(())
    }

    async fn set_played(&self, item_id: &str, played: bool) -> Result<(), JellyfinError> {
        let session = self.require_session()?;
        let url = format!(
            "{}/Users/{}/PlayedItems/{item_id}",
            self.base_url, session.user_id
        );
        let request = if played {
            self.http.post(url)
        } else {
            self.http.delete(url)
        };
        let resp = request
            .header("X-Emby-Authorization", self.auth_header(Some(&session.access_token)))
            .send()
            .await?;
        Self::check_response(resp).await?;
        debug!(item_id, played, "Updated watched state");
        Ok(())
    }

    fn media_url(&self, path: String) -> Option<String> {
        let session = self.require_session().ok()?;
        Some(format!(
            "{}{path}?api_key={}",
            self.base_url, session.access_token
        ))
    }

    fn report<'a>(&'a self, item_id: &'a str, position_ticks: i64) -> PlaybackReport<'a> {
        PlaybackReport {
            item_id,
            media_source_id: item_id,
            session_id: &self.device_id,
            position_ticks,
            is_paused: None,
            can_seek: None,
            play_method: None,
        }
    }
}

impl MediaServer for JellyfinClient {
    type Error = JellyfinError;

    fn is_authenticated(&self) -> bool {
        self.require_session().is_ok()
    }

    fn download_url(&self, item_id: &str) -> Option<String> {
        self.media_url(format!("/Items/{item_id}/Download"))
    }

    async fn report_start(&self, item_id: &str) -> Result<(), JellyfinError> {
        let report = PlaybackReport {
            can_seek: Some(true),
            play_method: Some(PLAY_METHOD),
            ..self.report(item_id, 0)
        };
        self.post_report("/Sessions/Playing", &report).await
    }

    async fn report_progress(
        &self,
        item_id: &str,
        position_ticks: i64,
        is_paused: bool,
    ) -> Result<(), JellyfinError> {
        let report = PlaybackReport {
            is_paused: Some(is_paused),
            can_seek: Some(true),
            play_method: Some(PLAY_METHOD),
            ..self.report(item_id, position_ticks)
        };
        self.post_report("/Sessions/Playing/Progress", &report)
            .await
    }

    async fn report_stop(&self, item_id: &str, position_ticks: i64) -> Result<(), JellyfinError> {
        let report = self.report(item_id, position_ticks);
        self.post_report("/Sessions/Playing/Stopped", &report).await
    }

    async fn mark_watched(&self, item_id: &str) -> Result<(), JellyfinError> {
        self.set_played(item_id, true).await
    }

    async fn mark_unwatched(&self, item_id: &str) -> Result<(), JellyfinError> {
        self.set_played(item_id, false).await
    }
}

impl RemoteSource for JellyfinClient {
    fn download_url(&self, item_id: &str) -> Option<String> {
        MediaServer::download_url(self, item_id)
    }
}
