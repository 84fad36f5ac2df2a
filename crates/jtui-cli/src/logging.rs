use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const CRATES: &[&str] = &["jtui", "jtui_core", "jtui_api", "jtui_player", "jtui_runtime"];

/// Route logs to a daily file under `dir`; the terminal stays free for
/// output. `RUST_LOG` overrides the configured level.
///
/// The returned guard flushes the writer on drop and must outlive `main`'s
/// work.
pub fn init(dir: &Path, level: &str) -> Option<WorkerGuard> {
    if let Err(e) = std::fs::create_dir_all(dir) {
        eprintln!("warning: cannot create log directory {}: {e}", dir.display());
        return None;
    }
    let appender = tracing_appender::rolling::daily(dir, "jtui.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(level)));

    tracing_subscriber::fmt()
        .with_writer(writer)
        .with_env_filter(filter)
        .with_ansi(false)
        .init();
    Some(guard)
}

/// `warn` for dependencies, `level` for this workspace.
fn default_directive(level: &str) -> String {
    let mut directive = String::from("warn");
    for name in CRATES {
        directive.push_str(&format!(",{name}={level}"));
    }
    directive
}
