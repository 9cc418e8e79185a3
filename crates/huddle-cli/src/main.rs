mod cli;
mod prefs;
mod settings;
mod simulate;

use std::path::PathBuf;
use std::process::ExitCode;

use huddle_common::{ConfigError, HuddleError};
use huddle_config::{HuddleConfig, LogLevel};
use huddle_voice::{ParticipantId, RoomId, SignalRelay, WebSocketSignalRelay};
use tracing_subscriber::EnvFilter;

use cli::Command;

/// `RUST_LOG` wins, then the `--log-level` flag, then the config file.
fn init_logging(flag: Option<&str>, config_level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            let directive = flag.map_or_else(|| config_level.directive(), str::to_string);
            EnvFilter::try_new(directive)
        })
        .unwrap_or_else(|_| EnvFilter::new("huddle=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn load_config(path: Option<&PathBuf>) -> Result<HuddleConfig, ConfigError> {
    match path {
        Some(path) => huddle_config::load_config_from(path),
        None => huddle_config::load_config(),
    }
}

fn config_path(path: Option<PathBuf>) -> Option<PathBuf> {
    path.or_else(|| huddle_config::toml_loader::default_config_path().ok())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = cli::parse();

    let loaded = load_config(args.config.as_ref());
    let level = loaded
        .as_ref()
        .map(|config| config.logging.level)
        .unwrap_or_default();
    init_logging(args.log_level.as_deref(), level);

    tracing::info!("huddle v{} starting", env!("CARGO_PKG_VERSION"));

    let result = match args.command {
        Command::CheckConfig => check_config(loaded),
        command => match loaded {
            Ok(config) => run(command, config, args.config).await,
            Err(e) => Err(e.into()),
        },
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "huddle failed");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn check_config(loaded: Result<HuddleConfig, ConfigError>) -> Result<(), HuddleError> {
    let config = loaded?;
    println!("{}", huddle_config::config_to_json(&config));
    Ok(())
}

async fn run(
    command: Command,
    config: HuddleConfig,
    config_override: Option<PathBuf>,
) -> Result<(), HuddleError> {
    match command {
        Command::CheckConfig => check_config(Ok(config)),
        Command::Simulate {
            participants,
            room,
            speaker,
            persist_device,
        } => {
            let options = simulate::SimulateOptions {
                participants,
                room,
                speaker,
                persist_to: if persist_device {
                    config_path(config_override)
                } else {
                    None
                },
            };
            let settings = settings::voice_settings(&config);
            let report = simulate::run(&config, settings, options).await?;
            print!("{}", report.render());
            if report.is_full_mesh() {
                Ok(())
            } else {
                Err(HuddleError::Other("mesh did not complete".into()))
            }
        }
        Command::Listen { room, participant } => listen(&config, room, participant).await,
    }
}

async fn listen(config: &HuddleConfig, room: String, participant: String) -> Result<(), HuddleError> {
    let relay = WebSocketSignalRelay::connect(settings::relay_config(config));
    let room = RoomId::from(room);
    let local = ParticipantId::from(participant);
    let mut inbound = relay.subscribe(&room, &local).await?;
    tracing::info!(room = %room, participant = %local, "Listening for voice signals");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            next = inbound.recv() => match next {
                Some(signal) => {
                    let json = serde_json::to_string(&signal.signal)
                        .map_err(|e| HuddleError::Other(e.to_string()))?;
                    println!("{} {}", signal.from, json);
                }
                None => break,
            },
        }
    }

    relay.disconnect().await;
    Ok(())
}
