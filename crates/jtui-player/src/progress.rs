//! Status polling and remote progress reports for the active session.

use std::sync::Arc;
use std::time::Duration;

use jtui_api::MediaServer;
use jtui_core::models::seconds_to_ticks;
use tokio::sync::{mpsc, RwLock, RwLockWriteGuard};
use tokio::task::JoinSet;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

use crate::ipc::MpvIpc;
use crate::session::{PlaybackEvent, SessionHandle};
use crate::state::{PlaybackState, SessionState};

/// Delay before the first poll, giving the player time to open its socket.
pub const STARTUP_DELAY: Duration = Duration::from_millis(500);

/// One reading of the player's status.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct StatusSample {
    pub position: f64,
    pub duration: f64,
    /// `None` when the pause query failed.
    pub pause: Option<bool>,
}

impl StatusSample {
    /// Playing when the player says it is unpaused, or when the pause query
    /// failed but position or duration still came back.
    pub fn is_playing(&self) -> bool {
        match self.pause {
            Some(paused) => !paused,
            None => self.position > 0.0 || self.duration > 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.position == 0.0 && self.duration == 0.0
    }
}

pub async fn poll_status(ipc: &MpvIpc) -> StatusSample {
    let pause = ipc.get_pause().await;
    let position = ipc.get_f64("time-pos").await;
    let duration = ipc.get_f64("duration").await;
    StatusSample {
        position,
        duration,
        pause,
    }
}

/// Background tasks that follow the active session: a status poll driving
/// the shared state, and for remote content a slower push of the position to
/// the server.
pub(crate) struct ProgressReporter<S> {
    pub(crate) ipc: MpvIpc,
    pub(crate) server: Option<Arc<S>>,
    pub(crate) handle: Arc<SessionHandle>,
    pub(crate) state: Arc<RwLock<SessionState>>,
    pub(crate) events: mpsc::UnboundedSender<PlaybackEvent>,
    pub(crate) status_interval: Duration,
    pub(crate) report_interval: Duration,
}

impl<S: MediaServer + 'static> ProgressReporter<S> {
    /// Spawn the reporter tasks. Both end once the session is superseded or
    /// stopped; the supervisor aborts whatever is left when the process exits.
    pub(crate) fn spawn(self) -> JoinSet<()> {
        let reporter = Arc::new(self);
        let mut tasks = JoinSet::new();
        if reporter.handle.remote {
            if let Some(server) = reporter.server.clone() {
                tasks.spawn(Arc::clone(&reporter).push_loop(server));
            }
        }
        tasks.spawn(reporter.poll_loop());
        tasks
    }

    async fn poll_loop(self: Arc<Self>) {
        tokio::time::sleep(STARTUP_DELAY).await;

        let mut seen_playing = false;
        let mut gone = false;

        while self.handle.is_current() {
            let sample = poll_status(&self.ipc).await;
            if !self.handle.is_current() {
                break;
            }
            let playing = sample.is_playing();

            if seen_playing && !playing && sample.is_empty() {
                debug!(item_id = %self.handle.item_id, "Player went away");
                if let Some(mut state) = self.current_state().await {
                    *state = SessionState::Idle;
                }
                let _ = self.events.send(PlaybackEvent::PlayerGone {
                    item_id: self.handle.item_id.clone(),
                });
                seen_playing = false;
                gone = true;
            }
            if gone {
                if sample.is_empty() {
                    tokio::time::sleep(self.status_interval).await;
                    continue;
                }
                debug!(item_id = %self.handle.item_id, "Player answering again");
                gone = false;
            }
            seen_playing |= playing;
            self.handle.record(sample);

            let snapshot = PlaybackState {
                item_id: self.handle.item_id.clone(),
                position: sample.position,
                duration: sample.duration,
                playing,
                paused: sample.pause.unwrap_or(false),
                remote: self.handle.remote,
            };
            match self.current_state().await {
                Some(mut state) => *state = SessionState::Active(snapshot.clone()),
                None => break,
            }
            let _ = self.events.send(PlaybackEvent::Progress(snapshot));

            tokio::time::sleep(self.status_interval).await;
        }
    }

    async fn push_loop(self: Arc<Self>, server: Arc<S>) {
        let mut ticker = interval_at(Instant::now() + self.report_interval, self.report_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if !self.handle.is_current() {
                break;
            }
            let position = self.ipc.get_f64("time-pos").await;
            if position <= 0.0 {
                continue;
            }
            let paused = self.ipc.get_pause().await.unwrap_or(false);
            let ticks = seconds_to_ticks(position);
            if let Err(e) = server
                .report_progress(&self.handle.item_id, ticks, paused)
                .await
            {
                warn!(item_id = %self.handle.item_id, error = %e, "Progress report failed");
            }
        }
    }

    /// Write access to the shared state, unless this session was superseded
    /// while waiting for the lock.
    async fn current_state(&self) -> Option<RwLockWriteGuard<'_, SessionState>> {
        let state = self.state.write().await;
        self.handle.is_current().then_some(state)
    }
}
