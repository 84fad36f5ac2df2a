use jtui_core::models::seconds_to_ticks;
use serde::Serialize;

/// Snapshot of the active playback, refreshed by each status poll.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlaybackState {
    pub item_id: String,
    /// Seconds.
    pub position: f64,
    /// Seconds; 0 until the player reports it.
    pub duration: f64,
    pub playing: bool,
    pub paused: bool,
    /// Streaming from the server rather than a local file.
    pub remote: bool,
}

impl PlaybackState {
    pub fn new(item_id: impl Into<String>, remote: bool, start_position: f64) -> Self {
        Self {
            item_id: item_id.into(),
            position: start_position,
            duration: 0.0,
            playing: false,
            paused: false,
            remote,
        }
    }

    pub fn position_ticks(&self) -> i64 {
        seconds_to_ticks(self.position)
    }

    /// Fraction watched, 0 when the duration is unknown.
    pub fn ratio(&self) -> f64 {
        completion_ratio(self.position, self.duration)
    }
}

pub fn completion_ratio(position: f64, duration: f64) -> f64 {
    if duration > 0.0 {
        position / duration
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub enum SessionState {
    #[default]
    Idle,
    Launching {
        item_id: String,
    },
    Active(PlaybackState),
}

impl SessionState {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn playback(&self) -> Option<&PlaybackState> {
        match self {
            Self::Active(state) => Some(state),
            _ => None,
        }
    }

    pub fn item_id(&self) -> Option<&str> {
        match self {
            Self::Idle => None,
            Self::Launching { item_id } => Some(item_id),
            Self::Active(state) => Some(&state.item_id),
        }
    }
}
