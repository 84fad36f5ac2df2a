pub mod catalog;
pub mod media;

pub use catalog::{is_offline_id, CatalogEntry, LocalFile, OFFLINE_LIBRARY_ID};
pub use media::{
    seconds_to_ticks, ticks_to_seconds, Item, ItemKind, MediaItem, UserData,
    TICKS_PER_SECOND,
};
