//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// notes-wakatime - WakaTime heartbeats for a note-taking app
///
/// Reads note activity from the host application as JSON lines and reports
/// heartbeats through the wakatime-cli agent, installing it when missing.
#[derive(Parser, Debug)]
#[command(name = "notes-wakatime")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the daemon, reading host events from stdin or a file
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "NOTES_WAKATIME_CONFIG")]
        config: Option<String>,

        /// Read host events from this file instead of stdin
        #[arg(short, long)]
        events: Option<String>,
    },

    /// Download and install wakatime-cli if it is missing
    Install {
        /// Path to configuration file
        #[arg(short, long, env = "NOTES_WAKATIME_CONFIG")]
        config: Option<String>,
    },

    /// Show where wakatime-cli lives and whether it is installed
    Status {
        /// Path to configuration file
        #[arg(short, long, env = "NOTES_WAKATIME_CONFIG")]
        config: Option<String>,
    },

    /// Send a single heartbeat and report how the agent exited
    Heartbeat {
        /// Entity (note title) to report
        #[arg(long)]
        entity: String,

        /// Project (notebook) the entity belongs to
        #[arg(long)]
        project: Option<String>,

        /// Report the heartbeat as a save
        #[arg(long)]
        write: bool,

        /// Path to configuration file
        #[arg(short, long, env = "NOTES_WAKATIME_CONFIG")]
        config: Option<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

/// Configuration subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the current configuration, API key masked
    Show {
        /// Path to configuration file
        #[arg(short, long)]
        config: Option<String>,
    },

    /// Initialize a new configuration file
    Init {
        /// Path where to create the config file
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        config: Option<String>,
    },
}

impl Commands {
    /// Config path given to commands that load configuration
    pub fn config_path(&self) -> Option<&str> {
        match self {
            Commands::Run { config, .. }
            | Commands::Install { config }
            | Commands::Status { config }
            | Commands::Heartbeat { config, .. } => config.as_deref(),
            Commands::Version | Commands::Config { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_command() {
        let cli = Cli::parse_from(["notes-wakatime", "run"]);
        match cli.command {
            Commands::Run { config, events } => {
                assert!(config.is_none());
                assert!(events.is_none());
            }
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_run_with_events_file() {
        let cli = Cli::parse_from([
            "notes-wakatime",
            "run",
            "--config",
            "/etc/notes-wakatime.toml",
            "--events",
            "events.jsonl",
        ]);
        assert_eq!(cli.command.config_path(), Some("/etc/notes-wakatime.toml"));
        match cli.command {
            Commands::Run { events, .. } => assert_eq!(events.as_deref(), Some("events.jsonl")),
            _ => panic!("Expected Run command"),
        }
    }

    #[test]
    fn test_heartbeat_command() {
        let cli = Cli::parse_from([
            "notes-wakatime",
            "heartbeat",
            "--entity",
            "Meeting notes",
            "--project",
            "Work",
            "--write",
        ]);
        match cli.command {
            Commands::Heartbeat {
                entity,
                project,
                write,
                config,
            } => {
                assert_eq!(entity, "Meeting notes");
                assert_eq!(project.as_deref(), Some("Work"));
                assert!(write);
                assert!(config.is_none());
            }
            _ => panic!("Expected Heartbeat command"),
        }
    }

    #[test]
    fn test_heartbeat_requires_entity() {
        assert!(Cli::try_parse_from(["notes-wakatime", "heartbeat"]).is_err());
    }

    #[test]
    fn test_verbose_flags() {
        let cli = Cli::parse_from(["notes-wakatime", "-vv", "version"]);
        assert_eq!(cli.verbose, 2);
        assert!(!cli.quiet);
        assert!(cli.command.config_path().is_none());
    }

    #[test]
    fn test_quiet_flag() {
        let cli = Cli::parse_from(["notes-wakatime", "status", "--quiet"]);
        assert!(cli.quiet);
    }

    #[test]
    fn test_config_init() {
        let cli = Cli::parse_from(["notes-wakatime", "config", "init", "--force"]);
        match cli.command {
            Commands::Config {
                subcommand: ConfigSubcommand::Init { path, force },
            } => {
                assert!(path.is_none());
                assert!(force);
            }
            _ => panic!("Expected Config Init command"),
        }
    }
}
