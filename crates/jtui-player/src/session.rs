//! Playback session control.
//!
//! At most one player runs at a time. Starting playback terminates every
//! player still tracked, launches a new one and hands it to a supervisor task
//! that waits for the process to exit, settles watch state with the server and
//! emits a completion event. A companion reporter task polls the player while
//! it runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use jtui_api::MediaServer;
use jtui_core::config::PlayerConfig;
use jtui_core::models::{is_offline_id, seconds_to_ticks, ticks_to_seconds};
use serde::Serialize;
use tokio::process::Child;
use tokio::sync::{mpsc, oneshot, Mutex, RwLock};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::PlayerError;
use crate::ipc::{MpvIpc, TrackKind};
use crate::launch::{self, PlaybackTarget};
use crate::progress::{ProgressReporter, StatusSample};
use crate::state::{completion_ratio, PlaybackState, SessionState};

/// How long to wait for a killed player to exit.
const KILL_TIMEOUT: Duration = Duration::from_secs(3);

/// A request to start playback.
#[derive(Debug, Clone)]
pub struct PlayRequest {
    pub item_id: String,
    pub target: PlaybackTarget,
    /// Resume offset; 0 starts from the beginning.
    pub start_ticks: i64,
}

/// Notifications for the user interface.
#[derive(Debug, Clone, Serialize)]
pub enum PlaybackEvent {
    Started {
        item_id: String,
        remote: bool,
    },
    Progress(PlaybackState),
    /// The player stopped answering with an empty status; state was cleared.
    PlayerGone {
        item_id: String,
    },
    /// The player process exited.
    Completed {
        item_id: String,
        position: f64,
        duration: f64,
        watched: bool,
    },
}

/// Per-launch bookkeeping shared by the controller, reporter and supervisor.
pub(crate) struct SessionHandle {
    pub(crate) id: u64,
    pub(crate) item_id: String,
    pub(crate) remote: bool,
    generation: Arc<AtomicU64>,
    stopped: AtomicBool,
    last: std::sync::Mutex<StatusSample>,
}

impl SessionHandle {
    fn new(id: u64, item_id: String, remote: bool, generation: Arc<AtomicU64>) -> Self {
        Self {
            id,
            item_id,
            remote,
            generation,
            stopped: AtomicBool::new(false),
            last: std::sync::Mutex::new(StatusSample::default()),
        }
    }

    /// Still the latest launch and not stopped by the user.
    pub(crate) fn is_current(&self) -> bool {
        self.is_latest() && !self.stopped.load(Ordering::SeqCst)
    }

    fn is_latest(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.id
    }

    /// Remember the most recent non-empty sample.
    pub(crate) fn record(&self, sample: StatusSample) {
        if !sample.is_empty() {
            *self.last.lock().unwrap_or_else(|e| e.into_inner()) = sample;
        }
    }

    fn last_sample(&self) -> StatusSample {
        *self.last.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct TrackedPlayer {
    session: u64,
    kill: oneshot::Sender<()>,
    exited: oneshot::Receiver<()>,
}

struct Inner<S> {
    config: PlayerConfig,
    ipc: MpvIpc,
    server: Option<Arc<S>>,
    events: mpsc::UnboundedSender<PlaybackEvent>,
    state: Arc<RwLock<SessionState>>,
    players: Mutex<Vec<TrackedPlayer>>,
    current: std::sync::Mutex<Option<Arc<SessionHandle>>>,
    generation: Arc<AtomicU64>,
}

/// Owns the player process and the session state.
pub struct PlaybackController<S> {
    inner: Arc<Inner<S>>,
}

impl<S> Clone for PlaybackController<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S: MediaServer + 'static> PlaybackController<S> {
    pub fn new(
        config: PlayerConfig,
        server: Option<Arc<S>>,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let ipc = MpvIpc::new(&config.ipc_path);
        Self::with_ipc(config, ipc, server)
    }

    pub fn with_ipc(
        config: PlayerConfig,
        ipc: MpvIpc,
        server: Option<Arc<S>>,
    ) -> (Self, mpsc::UnboundedReceiver<PlaybackEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let inner = Inner {
            config,
            ipc,
            server,
            events,
            state: Arc::new(RwLock::new(SessionState::Idle)),
            players: Mutex::new(Vec::new()),
            current: std::sync::Mutex::new(None),
            generation: Arc::new(AtomicU64::new(0)),
        };
        (
            Self {
                inner: Arc::new(inner),
            },
            rx,
        )
    }

    pub async fn state(&self) -> SessionState {
        self.inner.state.read().await.clone()
    }

    /// Number of player processes still being supervised.
    pub async fn tracked_players(&self) -> usize {
        self.inner.players.lock().await.len()
    }

    /// Start playback, replacing whatever is playing.
    pub async fn play(&self, request: PlayRequest) -> Result<(), PlayerError> {
        self.terminate_all().await;

        let inner = &self.inner;
        let id = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let remote = request.target.is_remote();
        *inner.state.write().await = SessionState::Launching {
            item_id: request.item_id.clone(),
        };

        let start = ticks_to_seconds(request.start_ticks.max(0));
        let args = launch::build_args(&inner.config, &request.target, start);
        let child = match launch::spawn(&inner.config.program, &args) {
            Ok(child) => child,
            Err(e) => {
                *inner.state.write().await = SessionState::Idle;
                return Err(e);
            }
        };

        let handle = Arc::new(SessionHandle::new(
            id,
            request.item_id.clone(),
            remote,
            Arc::clone(&inner.generation),
        ));
        *inner.current.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&handle));
        *inner.state.write().await =
            SessionState::Active(PlaybackState::new(&request.item_id, remote, start));
        info!(item_id = %request.item_id, remote, start, "Playback started");
        let _ = inner.events.send(PlaybackEvent::Started {
            item_id: request.item_id.clone(),
            remote,
        });

        if remote {
            if let Some(server) = &inner.server {
                let server = Arc::clone(server);
                let item_id = request.item_id.clone();
                tokio::spawn(async move {
                    if let Err(e) = server.report_start(&item_id).await {
                        warn!(item_id = %item_id, error = %e, "Start report failed");
                    }
                });
            }
        }

        let reporters = ProgressReporter {
            ipc: inner.ipc.clone(),
            server: inner.server.clone(),
            handle: Arc::clone(&handle),
            state: Arc::clone(&inner.state),
            events: inner.events.clone(),
            status_interval: Duration::from_millis(inner.config.status_interval_ms.max(1)),
            report_interval: Duration::from_secs(inner.config.report_interval_secs.max(1)),
        }
        .spawn();

        let (kill_tx, kill_rx) = oneshot::channel();
        let (exited_tx, exited_rx) = oneshot::channel();
        inner.players.lock().await.push(TrackedPlayer {
            session: id,
            kill: kill_tx,
            exited: exited_rx,
        });
        tokio::spawn(supervise(
            Arc::clone(inner),
            handle,
            child,
            kill_rx,
            exited_tx,
            reporters,
        ));
        Ok(())
    }

    fn active_handle(&self) -> Result<Arc<SessionHandle>, PlayerError> {
        self.inner
            .current
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
            .filter(|h| h.is_current())
            .ok_or(PlayerError::NotPlaying)
    }

    /// Ask the player to quit. The session ends immediately; the supervisor
    /// settles watch state once the process exits.
    ///
    /// mpv may close the socket before acknowledging `quit`, which counts as
    /// success. A player that cannot be reached at all is killed instead.
    pub async fn stop(&self) -> Result<(), PlayerError> {
        let handle = self.active_handle()?;
        let unreachable = match self.inner.ipc.quit().await {
            Ok(()) => false,
            Err(e @ (PlayerError::Protocol(_) | PlayerError::Io(_))) => {
                debug!(item_id = %handle.item_id, error = %e, "Player hung up on quit");
                false
            }
            Err(e @ PlayerError::IpcUnreachable(_)) => {
                debug!(item_id = %handle.item_id, error = %e, "Player unreachable, killing it");
                true
            }
            Err(e) => return Err(e),
        };
        handle.stopped.store(true, Ordering::SeqCst);
        if unreachable {
            self.terminate_all().await;
        }
        *self.inner.state.write().await = SessionState::Idle;
        info!(item_id = %handle.item_id, "Playback stopped");
        Ok(())
    }

    pub async fn toggle_pause(&self) -> Result<(), PlayerError> {
        self.active_handle()?;
        self.inner.ipc.cycle("pause").await
    }

    pub async fn cycle_subtitle(&self) -> Result<(), PlayerError> {
        self.active_handle()?;
        self.inner.ipc.cycle_track(TrackKind::Subtitle).await
    }

    pub async fn cycle_audio(&self) -> Result<(), PlayerError> {
        self.active_handle()?;
        self.inner.ipc.cycle_track(TrackKind::Audio).await
    }

    pub async fn current_subtitle(&self) -> String {
        self.inner.ipc.track_label(TrackKind::Subtitle).await
    }

    pub async fn current_audio(&self) -> String {
        self.inner.ipc.track_label(TrackKind::Audio).await
    }

    /// Kill every tracked player and remove the IPC socket.
    pub async fn shutdown(&self) {
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        self.terminate_all().await;
        *self.inner.current.lock().unwrap_or_else(|e| e.into_inner()) = None;
        *self.inner.state.write().await = SessionState::Idle;

        let path = self.inner.ipc.path();
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Removed IPC socket"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove IPC socket"),
        }
    }

    async fn terminate_all(&self) {
        let tracked = std::mem::take(&mut *self.inner.players.lock().await);
        for player in tracked {
            let _ = player.kill.send(());
            if tokio::time::timeout(KILL_TIMEOUT, player.exited)
                .await
                .is_err()
            {
                warn!(session = player.session, "Player did not exit after kill");
            }
        }
    }
}

async fn supervise<S: MediaServer + 'static>(
    inner: Arc<Inner<S>>,
    handle: Arc<SessionHandle>,
    mut child: Child,
    kill: oneshot::Receiver<()>,
    exited: oneshot::Sender<()>,
    mut reporters: JoinSet<()>,
) {
    let killed = tokio::select! {
        status = child.wait() => {
            match status {
                Ok(status) => debug!(item_id = %handle.item_id, %status, "Player exited"),
                Err(e) => warn!(item_id = %handle.item_id, error = %e, "Failed to wait for player"),
            }
            false
        }
        _ = kill => {
            if let Err(e) = child.start_kill() {
                warn!(item_id = %handle.item_id, error = %e, "Failed to kill player");
            }
            let _ = child.wait().await;
            debug!(item_id = %handle.item_id, "Player killed");
            true
        }
    };

    reporters.abort_all();
    let _ = exited.send(());
    inner.players.lock().await.retain(|p| p.session != handle.id);

    // A newer session owns the socket now, so only the latest one may query it.
    let latest = handle.is_latest();
    let last = handle.last_sample();
    let sample = if killed || !latest {
        last
    } else {
        let position = inner.ipc.get_f64("time-pos").await;
        let duration = inner.ipc.get_f64("duration").await;
        if position > 0.0 && duration > 0.0 {
            StatusSample {
                position,
                duration,
                pause: None,
            }
        } else {
            last
        }
    };

    // Whoever killed the player owns the state. Otherwise clear it, checking
    // under the lock so a launch that raced in is left alone.
    if !killed {
        let mut state = inner.state.write().await;
        if handle.is_latest() {
            *state = SessionState::Idle;
            let mut current = inner.current.lock().unwrap_or_else(|e| e.into_inner());
            if current.as_ref().is_some_and(|c| c.id == handle.id) {
                *current = None;
            }
        }
    }

    let watched = settle(&inner, &handle, sample).await;
    info!(
        item_id = %handle.item_id,
        position = sample.position,
        duration = sample.duration,
        watched,
        "Playback finished"
    );
    let _ = inner.events.send(PlaybackEvent::Completed {
        item_id: handle.item_id.clone(),
        position: sample.position,
        duration: sample.duration,
        watched,
    });
}

/// Push the final position and mark the item watched past the threshold.
/// Returns whether the item was marked.
async fn settle<S: MediaServer>(inner: &Inner<S>, handle: &SessionHandle, sample: StatusSample) -> bool {
    let Some(server) = &inner.server else {
        return false;
    };

    let ratio = completion_ratio(sample.position, sample.duration);
    let eligible = ratio >= inner.config.watched_threshold
        && !is_offline_id(&handle.item_id)
        && (handle.remote || server.is_authenticated());

    let mut watched = false;
    if eligible {
        match server.mark_watched(&handle.item_id).await {
            Ok(()) => watched = true,
            Err(e) => warn!(item_id = %handle.item_id, error = %e, "Failed to mark watched"),
        }
    }

    if handle.remote {
        let ticks = seconds_to_ticks(sample.position);
        if let Err(e) = server.report_stop(&handle.item_id, ticks).await {
            warn!(item_id = %handle.item_id, error = %e, "Stop report failed");
        }
    }
    watched
}
