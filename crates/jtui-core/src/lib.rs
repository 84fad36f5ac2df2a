pub mod catalog;
pub mod config;
pub mod downloads;
pub mod error;
pub mod models;
pub mod paths;

pub use catalog::OfflineCatalog;
pub use downloads::{DownloadManager, RemoteSource};
pub use error::CoreError;
pub use paths::PathResolver;
