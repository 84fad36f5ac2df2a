use thiserror::Error;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player IPC endpoint unreachable: {0}")]
    IpcUnreachable(String),

    #[error("failed to start player: {0}")]
    Spawn(std::io::Error),

    #[error("IPC protocol error: {0}")]
    Protocol(String),

    #[error("nothing is playing")]
    NotPlaying,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
