use std::path::PathBuf;
use std::process::Stdio;

use jtui_core::config::PlayerConfig;
use tokio::process::{Child, Command};
use tracing::info;

use crate::error::PlayerError;

/// What the player is pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackTarget {
    Local(PathBuf),
    Remote(String),
}

impl PlaybackTarget {
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    fn as_arg(&self) -> String {
        match self {
            Self::Local(path) => path.display().to_string(),
            Self::Remote(url) => url.clone(),
        }
    }
}

/// `[extra args] --input-ipc-server=<path> [--start=<s.ss>] <target>`
pub fn build_args(config: &PlayerConfig, target: &PlaybackTarget, start_seconds: f64) -> Vec<String> {
    let mut args = config.args.clone();
    args.push(format!("--input-ipc-server={}", config.ipc_path.display()));
    if start_seconds > 0.0 {
        args.push(format!("--start={start_seconds:.2}"));
    }
    args.push(target.as_arg());
    args
}

/// Start the player detached from the terminal's stdio.
pub fn spawn(program: &str, args: &[String]) -> Result<Child, PlayerError> {
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .map_err(PlayerError::Spawn)?;
    info!(program, pid = child.id(), "Player started");
    Ok(child)
}
