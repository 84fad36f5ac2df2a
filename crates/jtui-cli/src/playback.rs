//! Interactive playback: progress on stderr, single-key commands on stdin.

use std::future::Future;
use std::time::Duration;

use jtui_core::models::MediaItem;
use jtui_player::PlaybackEvent;
use jtui_runtime::{Client, RuntimeError};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::warn;

use crate::format;

/// How long to wait for watch state to settle after killing the player.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

const HELP: &str = "keys: p pause  s stop  u subtitles  a audio  q quit  (then Enter)";

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub async fn run(
    client: &Client,
    mut events: UnboundedReceiver<PlaybackEvent>,
    item_id: &str,
    resume: bool,
) -> Result<(), RuntimeError> {
    let request = client.play(item_id, resume).await?;
    let source = if request.target.is_remote() {
        "streaming"
    } else {
        "local file"
    };
    println!("Playing {} ({source})", request.item_id);
    println!("{HELP}");

    let stdin = BufReader::new(tokio::io::stdin()).lines();
    let finished = follow(client, &mut events, stdin, tokio::signal::ctrl_c()).await;

    client.shutdown().await;
    if !finished {
        settle(client, &mut events).await;
    }
    Ok(())
}

/// Show events and dispatch keys until playback completes, the user quits or
/// `interrupt` fires. Returns whether the completion event was seen.
async fn follow<R, I>(
    client: &Client,
    events: &mut UnboundedReceiver<PlaybackEvent>,
    mut keys: Lines<R>,
    interrupt: I,
) -> bool
where
    R: AsyncBufRead + Unpin,
    I: Future,
{
    tokio::pin!(interrupt);
    let mut keys_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(PlaybackEvent::Progress(state)) => {
                    eprint!("\r{:<60}", format::progress_line(&state));
                }
                Some(PlaybackEvent::PlayerGone { .. }) => {
                    eprintln!();
                    println!("Player closed");
                }
                Some(event @ PlaybackEvent::Completed { .. }) => {
                    eprintln!();
                    print_completion(&event, client.finish(&event).as_ref());
                    return true;
                }
                Some(PlaybackEvent::Started { .. }) => {}
                None => return false,
            },
            line = keys.next_line(), if keys_open => match line {
                Ok(Some(line)) => {
                    if handle_key(client, line.trim()).await == Flow::Quit {
                        return false;
                    }
                }
                Ok(None) => keys_open = false,
                Err(e) => {
                    warn!(error = %e, "Reading stdin failed");
                    keys_open = false;
                }
            },
            _ = &mut interrupt => {
                eprintln!();
                return false;
            }
        }
    }
}

async fn handle_key(client: &Client, key: &str) -> Flow {
    let player = client.player();
    let result = match key {
        "" => return Flow::Continue,
        "q" => return Flow::Quit,
        "p" => player.toggle_pause().await,
        "s" => player.stop().await,
        "u" => match player.cycle_subtitle().await {
            Ok(()) => {
                eprintln!("\nSubtitles: {}", player.current_subtitle().await);
                Ok(())
            }
            Err(e) => Err(e),
        },
        "a" => match player.cycle_audio().await {
            Ok(()) => {
                eprintln!("\nAudio: {}", player.current_audio().await);
                Ok(())
            }
            Err(e) => Err(e),
        },
        other => {
            eprintln!("\nunknown key {other:?}; {HELP}");
            return Flow::Continue;
        }
    };
    if let Err(e) = result {
        eprintln!("\n{e}");
    }
    Flow::Continue
}

/// Wait for the supervisor to report the killed player's final state.
async fn settle(client: &Client, events: &mut UnboundedReceiver<PlaybackEvent>) {
    let wait = async {
        while let Some(event) = events.recv().await {
            if let PlaybackEvent::Completed { .. } = event {
                print_completion(&event, client.finish(&event).as_ref());
                return;
            }
        }
    };
    if tokio::time::timeout(SETTLE_TIMEOUT, wait).await.is_err() {
        warn!("Playback did not settle before exit");
    }
}

/// `item` is the server copy updated by the completion, when there is one.
fn print_completion(event: &PlaybackEvent, item: Option<&MediaItem>) {
    let PlaybackEvent::Completed {
        item_id,
        position,
        duration,
        watched,
    } = event
    else {
        return;
    };
    let name = item.map_or(item_id.as_str(), |i| i.name.as_str());
    let mut line = format!("{name} stopped at {}", format::clock(*position));
    if *duration > 0.0 {
        line.push_str(&format!(
            " of {} ({}%)",
            format::clock(*duration),
            format::percent(position / duration)
        ));
    }
    if item.map_or(*watched, MediaItem::is_watched) {
        line.push_str(", marked watched");
    }
    println!("{line}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use jtui_core::config::AppConfig;
    use jtui_player::PlaybackState;
    use tempfile::TempDir;
    use tokio::sync::{mpsc, oneshot};

    async fn offline_client(dir: &TempDir) -> Client {
        let root = dir.path().join("media");
        let file = root.join("Movies/Heat (1995).mkv");
        std::fs::create_dir_all(file.parent().unwrap()).unwrap();
        std::fs::write(&file, b"media").unwrap();

        let mut config = AppConfig::default();
        config.server.url = "http://127.0.0.1:9".into();
        config.downloads.root = Some(root.clone());
        config.player.ipc_path = root.join("mpv.sock");
        let (client, _events) = Client::connect_with(config, dir.path().join("session.json"))
            .await
            .unwrap();
        client
    }

    fn no_keys() -> Lines<BufReader<&'static [u8]>> {
        BufReader::new(&b""[..]).lines()
    }

    #[tokio::test]
    async fn test_interrupt_wins_over_busy_event_stream() {
        let dir = TempDir::new().unwrap();
        let client = offline_client(&dir).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (fire, interrupt) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let mut fire = Some(fire);
            for tick in 0u32.. {
                let state = PlaybackState::new("m1", false, f64::from(tick));
                if tx.send(PlaybackEvent::Progress(state)).is_err() {
                    break;
                }
                if tick == 20 {
                    if let Some(fire) = fire.take() {
                        let _ = fire.send(());
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        });

        let finished = tokio::time::timeout(
            Duration::from_secs(5),
            follow(&client, &mut rx, no_keys(), interrupt),
        )
        .await
        .expect("interrupt was lost");
        assert!(!finished);
    }

    #[tokio::test]
    async fn test_completion_ends_follow() {
        let dir = TempDir::new().unwrap();
        let client = offline_client(&dir).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(PlaybackEvent::Completed {
            item_id: "m1".into(),
            position: 190.0,
            duration: 200.0,
            watched: true,
        })
        .unwrap();

        let finished = follow(&client, &mut rx, no_keys(), std::future::pending::<()>()).await;
        assert!(finished);
    }

    #[tokio::test]
    async fn test_quit_key_ends_follow() {
        let dir = TempDir::new().unwrap();
        let client = offline_client(&dir).await;
        let (_tx, mut rx) = mpsc::unbounded_channel();
        let keys = BufReader::new(&b"x\nq\n"[..]).lines();

        let finished = follow(&client, &mut rx, keys, std::future::pending::<()>()).await;
        assert!(!finished);
    }
}
