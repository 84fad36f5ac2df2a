//! Canonical storage paths for downloaded media.
//!
//! Every download lands at a path derived only from the item's metadata, so
//! the offline catalog can recover that metadata later by reading the layout
//! back:
//!
//! ```text
//! Movies/<Title> (<Year>).mkv
//! <Series>/Season <NN>/S<NN>E<NN> - <Title>.mkv
//! Other/<Title>.mkv
//! ```

use std::path::{Path, PathBuf};

use crate::models::{ItemKind, MediaItem};

/// Container extension used for every download.
pub const MEDIA_EXTENSION: &str = "mkv";

/// Longest allowed path segment, in characters.
pub const MAX_SEGMENT_LEN: usize = 100;

pub const MOVIES_DIR: &str = "Movies";
pub const OTHER_DIR: &str = "Other";

const ILLEGAL_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const FALLBACK_NAME: &str = "Untitled";

/// Make free text safe to use as a single path segment.
///
/// Illegal characters become `_`, surrounding whitespace is trimmed and the
/// result is capped at [`MAX_SEGMENT_LEN`] characters.
pub fn sanitize_segment(name: &str) -> String {
    sanitize_with_limit(name, MAX_SEGMENT_LEN)
}

fn sanitize_with_limit(name: &str, limit: usize) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if ILLEGAL_CHARS.contains(&c) { '_' } else { c })
        .collect();
    let truncated: String = replaced.trim().chars().take(limit).collect();
    let cleaned = truncated.trim_end();

    if cleaned.is_empty() || cleaned.chars().all(|c| c == '.') {
        FALLBACK_NAME.chars().take(limit.max(1)).collect()
    } else {
        cleaned.to_string()
    }
}

/// Build a file segment `<prefix><title><suffix>.mkv` whose total length
/// stays within [`MAX_SEGMENT_LEN`], shortening only the title.
fn file_segment(prefix: &str, title: &str, suffix: &str) -> String {
    let fixed = prefix.chars().count() + suffix.chars().count() + MEDIA_EXTENSION.len() + 1;
    let budget = MAX_SEGMENT_LEN.saturating_sub(fixed).max(1);
    format!(
        "{prefix}{}{suffix}.{MEDIA_EXTENSION}",
        sanitize_with_limit(title, budget)
    )
}

/// Normalize free text into an id-safe slug.
///
/// Runs of non-alphanumeric characters collapse into a single `-`; leading and
/// trailing separators are dropped. Deterministic, but distinct inputs can
/// produce the same slug.
pub fn slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut pending_sep = false;
    for c in input.chars() {
        if c.is_ascii_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('-');
            }
            pending_sep = false;
            out.push(c);
        } else {
            pending_sep = true;
        }
    }
    out
}

/// Relative canonical path for an item. Pure: never touches the filesystem.
pub fn resolve(item: &MediaItem) -> PathBuf {
    let title = item.name.as_str();
    let series = item
        .series_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());

    match (item.kind, series) {
        (ItemKind::Episode, Some(series)) => {
            let series_dir = sanitize_segment(series);
            let (season, episode) = (item.season_number(), item.episode_number());
            if season > 0 && episode > 0 {
                let code = format!("S{season:02}E{episode:02} - ");
                [
                    series_dir,
                    format!("Season {season:02}"),
                    file_segment(&code, title, ""),
                ]
                .iter()
                .collect()
            } else {
                [series_dir, file_segment("", title, "")].iter().collect()
            }
        }
        (ItemKind::Movie, _) => {
            let suffix = match item.year() {
                0 => String::new(),
                year => format!(" ({year})"),
            };
            [MOVIES_DIR.to_string(), file_segment("", title, &suffix)]
                .iter()
                .collect()
        }
        _ => [OTHER_DIR.to_string(), file_segment("", title, "")]
            .iter()
            .collect(),
    }
}

/// Maps items to locations under a storage root.
#[derive(Debug, Clone)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path relative to the storage root.
    pub fn resolve(&self, item: &MediaItem) -> PathBuf {
        resolve(item)
    }

    /// Absolute path under the storage root.
    pub fn absolute(&self, item: &MediaItem) -> PathBuf {
        self.root.join(resolve(item))
    }
}

/// Whether a path carries the media extension (case-insensitive).
pub fn is_media_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(MEDIA_EXTENSION))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(series: &str, season: u32, episode: u32, title: &str) -> MediaItem {
        MediaItem {
            id: "ep".into(),
            name: title.into(),
            kind: ItemKind::Episode,
            series_name: Some(series.into()),
            parent_index_number: Some(season),
            index_number: Some(episode),
            ..Default::default()
        }
    }

    fn movie(title: &str, year: Option<u32>) -> MediaItem {
        MediaItem {
            id: "mv".into(),
            name: title.into(),
            kind: ItemKind::Movie,
            production_year: year,
            ..Default::default()
        }
    }

    fn segments(path: &Path) -> Vec<String> {
        path.components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_episode_layout() {
        let path = resolve(&episode("The Expanse", 2, 5, "Home"));
        assert_eq!(
            path,
            PathBuf::from("The Expanse/Season 02/S02E05 - Home.mkv")
        );
    }

    #[test]
    fn test_episode_without_numbers_sits_under_series() {
        let path = resolve(&episode("The Expanse", 0, 3, "Special"));
        assert_eq!(path, PathBuf::from("The Expanse/Special.mkv"));

        let path = resolve(&episode("The Expanse", 1, 0, "Recap"));
        assert_eq!(path, PathBuf::from("The Expanse/Recap.mkv"));
    }

    #[test]
    fn test_episode_without_series_is_other() {
        let mut item = episode("", 1, 1, "Orphan");
        item.series_name = Some("   ".into());
        assert_eq!(resolve(&item), PathBuf::from("Other/Orphan.mkv"));
        item.series_name = None;
        assert_eq!(resolve(&item), PathBuf::from("Other/Orphan.mkv"));
    }

    #[test]
    fn test_movie_layout() {
        assert_eq!(
            resolve(&movie("Alien", Some(1979))),
            PathBuf::from("Movies/Alien (1979).mkv")
        );
        assert_eq!(
            resolve(&movie("Alien", None)),
            PathBuf::from("Movies/Alien.mkv")
        );
    }

    #[test]
    fn test_other_layout() {
        let item = MediaItem {
            id: "o".into(),
            name: "Concert: Live?".into(),
            ..Default::default()
        };
        assert_eq!(resolve(&item), PathBuf::from("Other/Concert_ Live_.mkv"));
    }

    #[test]
    fn test_resolve_is_idempotent() {
        let item = episode("Dark", 3, 8, "The Paradise");
        let first = resolve(&item);
        let _ = resolve(&movie("Unrelated", Some(2001)));
        assert_eq!(first, resolve(&item));
        assert_eq!(first, resolve(&item.clone()));
    }

    #[test]
    fn test_sanitize_removes_illegal_characters() {
        let dirty = r#"a<b>c:d"e/f\g|h?i*j"#;
        let clean = sanitize_segment(dirty);
        assert!(!clean.contains(ILLEGAL_CHARS));
        assert_eq!(clean, "a_b_c_d_e_f_g_h_i_j");
    }

    #[test]
    fn test_sanitize_trims_and_caps_length() {
        assert_eq!(sanitize_segment("   padded  "), "padded");
        let long = "x".repeat(250);
        assert_eq!(sanitize_segment(&long).chars().count(), MAX_SEGMENT_LEN);
        let multibyte = "é".repeat(150);
        assert_eq!(sanitize_segment(&multibyte).chars().count(), MAX_SEGMENT_LEN);
    }

    #[test]
    fn test_sanitize_never_yields_empty_or_dot_segments() {
        assert_eq!(sanitize_segment(""), "Untitled");
        assert_eq!(sanitize_segment("   "), "Untitled");
        assert_eq!(sanitize_segment(".."), "Untitled");
    }

    #[test]
    fn test_every_segment_respects_limits() {
        let long = format!("{}<>:\"|?*", "Title ".repeat(40));
        let items = [
            episode(&long, 12, 34, &long),
            episode(&long, 0, 0, &long),
            movie(&long, Some(2020)),
            MediaItem {
                name: long.clone(),
                ..Default::default()
            },
        ];
        for item in &items {
            for seg in segments(&resolve(item)) {
                assert!(seg.chars().count() <= MAX_SEGMENT_LEN, "too long: {seg}");
                assert!(!seg.contains(ILLEGAL_CHARS), "illegal char in {seg}");
            }
        }
    }

    #[test]
    fn test_slug() {
        assert_eq!(slug("Spirited Away"), "Spirited-Away");
        assert_eq!(slug("  --Hello,   World!!  "), "Hello-World");
        assert_eq!(slug("Amélie"), "Am-lie");
        assert_eq!(slug("!!!"), "");
    }

    #[test]
    fn test_slug_is_deterministic_and_idempotent() {
        let title = "Star Wars: Episode IV - A New Hope";
        let once = slug(title);
        assert_eq!(once, slug(title));
        assert_eq!(once, slug(&once));
    }

    #[test]
    fn test_resolver_joins_root() {
        let resolver = PathResolver::new("/srv/media");
        assert_eq!(
            resolver.absolute(&movie("Up", Some(2009))),
            PathBuf::from("/srv/media/Movies/Up (2009).mkv")
        );
        assert_eq!(resolver.root(), Path::new("/srv/media"));
    }

    #[test]
    fn test_is_media_file() {
        assert!(is_media_file(Path::new("a/b.mkv")));
        assert!(is_media_file(Path::new("a/b.MKV")));
        assert!(!is_media_file(Path::new("a/b.mkv.tmp")));
        assert!(!is_media_file(Path::new("a/b.mp4")));
    }
}
