pub mod error;
pub mod ipc;
pub mod launch;
pub mod progress;
pub mod retry;
pub mod session;
pub mod state;

pub use error::PlayerError;
pub use ipc::{MpvIpc, TrackKind};
pub use launch::PlaybackTarget;
pub use retry::{Clock, RetryPolicy, TokioClock};
pub use session::{PlayRequest, PlaybackController, PlaybackEvent};
pub use state::{PlaybackState, SessionState};
