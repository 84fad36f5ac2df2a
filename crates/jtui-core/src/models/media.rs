use serde::{Deserialize, Serialize};

/// Remote position fields are expressed in 100 ns ticks.
pub const TICKS_PER_SECOND: i64 = 10_000_000;

pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / TICKS_PER_SECOND as f64
}

pub fn seconds_to_ticks(seconds: f64) -> i64 {
    (seconds * TICKS_PER_SECOND as f64) as i64
}

/// Capabilities shared by every browsable item, remote or offline.
pub trait Item {
    fn id(&self) -> &str;
    fn name(&self) -> &str;
    fn is_folder(&self) -> bool;
}

/// The kind of media an item represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemKind {
    Movie,
    Episode,
    Series,
    #[serde(other)]
    Other,
}

impl ItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Movie => "Movie",
            Self::Episode => "Episode",
            Self::Series => "Series",
            Self::Other => "Other",
        }
    }
}

impl Default for ItemKind {
    fn default() -> Self {
        Self::Other
    }
}

impl std::fmt::Display for ItemKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-user playback data attached to an item by the server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct UserData {
    pub playback_position_ticks: i64,
    pub play_count: u32,
    pub played: bool,
}

/// A playable or browsable unit as described by the media server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MediaItem {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub is_folder: bool,
    #[serde(rename = "Type", default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub series_name: Option<String>,
    /// Season number.
    #[serde(default)]
    pub parent_index_number: Option<u32>,
    /// Episode number.
    #[serde(default)]
    pub index_number: Option<u32>,
    #[serde(default)]
    pub production_year: Option<u32>,
    #[serde(default)]
    pub run_time_ticks: Option<i64>,
    #[serde(default)]
    pub user_data: UserData,
}

impl MediaItem {
    pub fn season_number(&self) -> u32 {
        self.parent_index_number.unwrap_or(0)
    }

    pub fn episode_number(&self) -> u32 {
        self.index_number.unwrap_or(0)
    }

    pub fn year(&self) -> u32 {
        self.production_year.unwrap_or(0)
    }

    pub fn playback_position_ticks(&self) -> i64 {
        self.user_data.playback_position_ticks
    }

    pub fn is_watched(&self) -> bool {
        self.user_data.played
    }

    /// A partially watched item that playback can resume from.
    pub fn has_resume_position(&self) -> bool {
        self.user_data.playback_position_ticks > 0 && !self.user_data.played
    }

    /// Formatted run time such as `1h 42m`, or `None` when unknown.
    pub fn runtime_label(&self) -> Option<String> {
        let ticks = self.run_time_ticks.filter(|t| *t > 0)?;
        let minutes = ticks / (TICKS_PER_SECOND * 60);
        let (hours, mins) = (minutes / 60, minutes % 60);
        Some(if hours > 0 {
            format!("{hours}h {mins}m")
        } else {
            format!("{mins}m")
        })
    }

    /// Reflect a completed viewing locally before the server confirms it.
    pub fn mark_played(&mut self) {
        self.user_data.played = true;
        self.user_data.play_count = self.user_data.play_count.max(1);
        self.user_data.playback_position_ticks = 0;
    }

    pub fn mark_unplayed(&mut self) {
        self.user_data.played = false;
        self.user_data.play_count = 0;
    }
}

impl Item for MediaItem {
    fn id(&self) -> &str {
        &self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn is_folder(&self) -> bool {
        self.is_folder
    }
}
