//! The media-server interface used by playback.
//!
//! The playback controller only needs a handful of calls: URLs to hand to the
//! player, session reports and watch-state updates. Keeping them behind a
//! trait lets the controller run against a recording fake in tests.

use std::future::Future;

pub trait MediaServer: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Whether a complete session (token and user) is present.
    fn is_authenticated(&self) -> bool;

    /// Original-file URL the player and downloads fetch, `None` without a
    /// session.
    fn download_url(&self, item_id: &str) -> Option<String>;

    /// Tell the server playback of an item began.
    fn report_start(&self, item_id: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Push the current position.
    fn report_progress(
        &self,
        item_id: &str,
        position_ticks: i64,
        is_paused: bool,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Tell the server playback ended at the given position.
    fn report_stop(
        &self,
        item_id: &str,
        position_ticks: i64,
    ) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn mark_watched(&self, item_id: &str) -> impl Future<Output = Result<(), Self::Error>> + Send;

    fn mark_unwatched(&self, item_id: &str)
        -> impl Future<Output = Result<(), Self::Error>> + Send;
}
