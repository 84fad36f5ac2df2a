use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("client is not authenticated")]
    NotAuthenticated,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already downloaded at {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("download already in progress for {}", .0.display())]
    InProgress(PathBuf),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("no server connection and no offline content available")]
    NoContentAvailable,

    #[error("config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
