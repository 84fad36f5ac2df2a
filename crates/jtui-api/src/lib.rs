pub mod jellyfin;
pub mod traits;

pub use jellyfin::{JellyfinClient, JellyfinError, Session};
pub use traits::MediaServer;
