mod format;
mod logging;
mod playback;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use jtui_core::config::AppConfig;
use jtui_core::CoreError;
use jtui_player::SessionState;
use jtui_runtime::{Client, RuntimeError};
use tracing::error;

#[derive(Parser)]
#[command(name = "jtui", version, about = "Terminal Jellyfin client with offline downloads")]
struct Cli {
    /// Config file to use instead of the platform default
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show connection mode, storage and player state
    Status {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show a server item with its watch state
    Info { id: String },
    /// Play an item in mpv and control it from the terminal
    Play {
        id: String,
        /// Start from the saved server position
        #[arg(short, long)]
        resume: bool,
    },
    /// Download an item into the storage root
    Download { id: String },
    /// Delete a downloaded item
    Remove { id: String },
    /// List downloaded files
    Downloads,
    /// Browse downloaded content; no id lists the library root
    Offline { parent: Option<String> },
    /// Mark an item watched on the server
    Watched {
        id: String,
        /// Mark unwatched instead
        #[arg(long)]
        unset: bool,
    },
    /// Show the config location, or write the defaults with --init
    Config {
        #[arg(long)]
        init: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(AppConfig::config_path);

    let config = match AppConfig::load_from(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: {e}");
            return ExitCode::FAILURE;
        }
    };
    let _guard = logging::init(&AppConfig::log_dir(), &config.logging.level);

    match run(cli.command, config, &config_path).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Command, config: AppConfig, config_path: &Path) -> Result<(), RuntimeError> {
    if let Command::Config { init } = command {
        return show_config(&config, config_path, init);
    }

    let (client, events) = Client::connect(config).await?;
    match command {
        Command::Status { json } => print_status(&client, json).await,
        Command::Info { id } => {
            let item = client.item(&id).await?;
            println!("{}", format::item_summary(&item));
        }
        Command::Play { id, resume } => playback::run(&client, events, &id, resume).await?,
        Command::Download { id } => {
            let mut last = None;
            let path = client
                .download(&id, |done, total| {
                    let shown = if total > 0 {
                        format!("{}%", format::percent(done as f64 / total as f64))
                    } else {
                        format::bytes(done)
                    };
                    if last.as_ref() != Some(&shown) {
                        eprint!("\rDownloading {shown:<12}");
                        last = Some(shown);
                    }
                })
                .await;
            eprintln!();
            println!("Saved {}", path?.display());
        }
        Command::Remove { id } => {
            let path = client.remove(&id).await?;
            println!("Removed {}", path.display());
        }
        Command::Downloads => {
            let downloads = client.downloads();
            for path in &downloads {
                println!("{}", path.display());
            }
            println!(
                "{} file(s) in {}",
                downloads.len(),
                client.config().downloads_root().display()
            );
        }
        Command::Offline { parent } => {
            for entry in client.offline_children(parent.as_deref()) {
                println!("{}", format::entry_line(&entry));
            }
        }
        Command::Watched { id, unset } => {
            let item = client.set_watched(&id, !unset).await?;
            println!("{}", format::item_summary(&item));
        }
        Command::Config { .. } => {}
    }
    Ok(())
}

async fn print_status(client: &Client, json: bool) {
    let status = client.status().await;
    if json {
        match serde_json::to_string_pretty(&status) {
            Ok(out) => println!("{out}"),
            Err(e) => eprintln!("error: {e}"),
        }
        return;
    }

    let player = match &status.session {
        SessionState::Idle => "idle".to_string(),
        SessionState::Launching { item_id } => format!("starting {item_id}"),
        SessionState::Active(state) => format!("{} {}", state.item_id, format::progress_line(state)),
    };
    println!("mode:      {}", status.mode);
    println!("server:    {}", status.server);
    println!(
        "downloads: {} file(s) in {}",
        status.downloads,
        status.downloads_root.display()
    );
    println!("player:    {player}");
}

fn show_config(config: &AppConfig, path: &Path, init: bool) -> Result<(), RuntimeError> {
    if init {
        if path.exists() {
            return Err(CoreError::Config(format!("{} already exists", path.display())).into());
        }
        AppConfig::default().save_to(path)?;
        println!("Wrote default config to {}", path.display());
        return Ok(());
    }

    println!("config:    {}", path.display());
    println!("server:    {}", config.server.url);
    println!(
        "user:      {}",
        config.server.username.as_deref().unwrap_or("(not set)")
    );
    println!("downloads: {}", config.downloads_root().display());
    println!("player:    {} {}", config.player.program, config.player.args.join(" "));
    println!("session:   {}", AppConfig::session_path().display());
    println!("logs:      {}", AppConfig::log_dir().display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_play_with_resume() {
        let cli = Cli::try_parse_from(["jtui", "play", "abc", "--resume"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Play { ref id, resume: true } if id == "abc"
        ));
    }

    #[test]
    fn test_parse_info() {
        let cli = Cli::try_parse_from(["jtui", "info", "abc"]).unwrap();
        assert!(matches!(cli.command, Command::Info { ref id } if id == "abc"));
    }

    #[test]
    fn test_config_init_writes_defaults_once() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("jtui/config.toml");
        let config = AppConfig::default();

        show_config(&config, &path, true).unwrap();
        let written = AppConfig::load_from(&path).unwrap();
        assert_eq!(written.player.program, config.player.program);

        assert!(matches!(
            show_config(&config, &path, true),
            Err(RuntimeError::Core(CoreError::Config(_)))
        ));
    }
}
