use jtui_core::models::{ticks_to_seconds, CatalogEntry, ItemKind, MediaItem};
use jtui_player::PlaybackState;

/// `H:MM:SS` past an hour, `M:SS` below.
pub fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (h, m, s) = (total / 3600, (total % 3600) / 60, total % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

pub fn percent(ratio: f64) -> u32 {
    (ratio.clamp(0.0, 1.0) * 100.0).round() as u32
}

pub fn progress_line(state: &PlaybackState) -> String {
    let status = match (state.playing, state.paused) {
        (_, true) => "paused",
        (true, false) => "playing",
        (false, false) => "loading",
    };
    if state.duration > 0.0 {
        format!(
            "[{status}] {} / {} ({}%)",
            clock(state.position),
            clock(state.duration),
            percent(state.ratio())
        )
    } else {
        format!("[{status}] {}", clock(state.position))
    }
}

/// Binary units, one decimal.
pub fn bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["KiB", "MiB", "GiB", "TiB"];
    if n < 1024 {
        return format!("{n} B");
    }
    let mut value = n as f64 / 1024.0;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

pub fn entry_line(entry: &CatalogEntry) -> String {
    let label = match (entry.kind, entry.season, entry.episode, entry.year) {
        (ItemKind::Episode, Some(s), Some(e), _) => format!("S{s:02}E{e:02} {}", entry.name),
        (ItemKind::Movie, _, _, Some(year)) => format!("{} ({year})", entry.name),
        (ItemKind::Series, ..) => format!("{}/", entry.name),
        _ => entry.name.clone(),
    };
    let size = entry
        .file
        .as_ref()
        .map(|f| format!("  {}", bytes(f.size)))
        .unwrap_or_default();
    format!("{:<48} {label}{size}", entry.id)
}

/// One line describing a server item and where the user stands with it.
pub fn item_summary(item: &MediaItem) -> String {
    let mut line = match (item.kind, &item.series_name) {
        (ItemKind::Episode, Some(series)) => format!(
            "{series} S{:02}E{:02} {}",
            item.season_number(),
            item.episode_number(),
            item.name
        ),
        _ if item.year() > 0 => format!("{} ({})", item.name, item.year()),
        _ => item.name.clone(),
    };
    if let Some(runtime) = item.runtime_label() {
        line.push_str(&format!("  {runtime}"));
    }
    if item.is_watched() {
        line.push_str("  watched");
    } else if item.has_resume_position() {
        line.push_str(&format!(
            "  resume at {}",
            clock(ticks_to_seconds(item.playback_position_ticks()))
        ));
    }
    line
}
