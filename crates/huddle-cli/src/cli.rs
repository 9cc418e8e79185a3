use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// huddle: mesh voice rooms from the terminal.
#[derive(Parser, Debug)]
#[command(name = "huddle", version, about)]
pub struct Args {
    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Log filter override (e.g. `debug` or `huddle_voice=trace`).
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate the configuration and print it as JSON.
    CheckConfig,

    /// Run an in-process room with simulated participants.
    Simulate {
        /// Number of participants to join.
        #[arg(short = 'n', long, default_value_t = 3)]
        participants: usize,

        /// Room to join.
        #[arg(long, default_value = "simulation")]
        room: String,

        /// Index of a participant that starts talking once the mesh is up.
        #[arg(long)]
        speaker: Option<usize>,

        /// Persist the first participant's resolved microphone in the config file.
        #[arg(long)]
        persist_device: bool,
    },

    /// Connect to the configured relay and print voice signals addressed
    /// to a participant.
    Listen {
        /// Room to listen on.
        #[arg(long)]
        room: String,

        /// Participant id to receive signals for.
        #[arg(long)]
        participant: String,
    },
}

pub fn parse() -> Args {
    Args::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simulate_defaults() {
        let args = Args::try_parse_from(["huddle", "simulate"]).unwrap();
        match args.command {
            Command::Simulate {
                participants,
                room,
                speaker,
                persist_device,
            } => {
                assert_eq!(participants, 3);
                assert_eq!(room, "simulation");
                assert!(speaker.is_none());
                assert!(!persist_device);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn global_flags_after_subcommand() {
        let args = Args::try_parse_from([
            "huddle",
            "check-config",
            "--config",
            "/tmp/huddle.toml",
            "--log-level",
            "debug",
        ])
        .unwrap();
        assert!(matches!(args.command, Command::CheckConfig));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/huddle.toml")));
        assert_eq!(args.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn listen_requires_room_and_participant() {
        assert!(Args::try_parse_from(["huddle", "listen", "--room", "a"]).is_err());
        let args =
            Args::try_parse_from(["huddle", "listen", "--room", "a", "--participant", "p-1"]).unwrap();
        assert!(matches!(args.command, Command::Listen { .. }));
    }

    #[test]
    fn subcommand_is_required() {
        assert!(Args::try_parse_from(["huddle"]).is_err());
    }
}
