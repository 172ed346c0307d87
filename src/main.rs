//! notes-wakatime - WakaTime heartbeats for a note-taking app
//!
//! The host application pipes note activity into `notes-wakatime run` as
//! JSON lines. The daemon decides which activity becomes a heartbeat and
//! reports it through the `wakatime-cli` agent, which it installs on demand.

mod agent;
mod analytics;
mod cli;
mod config;
mod daemon;
mod error;
mod heartbeat;
mod host;
mod logger;
mod logging;
mod settings;
mod util;
mod version;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::agent::{AgentProcessManager, HeartbeatRequest, InvocationOutcome};
use crate::analytics::Analytics;
use crate::cli::{Cli, Commands};
use crate::config::AppConfig;
use crate::daemon::EventSource;
use crate::error::{Error, Result};
use crate::logger::{Environment, Severity, SharedLogger, TracingLogger};

fn main() -> Result<()> {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    match &cli.command {
        Commands::Version => {
            version::print_version();
            return Ok(());
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            return handle_config_command(subcommand.clone());
        }
        _ => {}
    }

    let config = match AppConfig::load(cli.command.config_path()) {
        Ok(cfg) => cfg,
        Err(e) => exit_with(&e),
    };

    let environment = Environment::from_env();
    let verbose = match environment {
        Environment::Development => cli.verbose.max(1),
        Environment::Production => cli.verbose,
    };

    // The guards must be kept alive for the lifetime of the program
    let _log_guards = logging::init_logging(&config.logging, verbose, cli.quiet)?;

    let build = version::build_info();
    info!(
        version = %build.full_version(),
        target = %build.target,
        environment = ?environment,
        "Starting notes-wakatime"
    );

    let logger = core_logger(environment, cli.verbose);

    let result = match cli.command {
        Commands::Run { events, .. } => {
            let source = match events {
                Some(path) => EventSource::File(PathBuf::from(path)),
                None => EventSource::Stdin,
            };
            daemon::run(config, logger, source).map(|_| ())
        }
        Commands::Install { .. } => run_install(&config, logger),
        Commands::Status { .. } => run_status(&config, logger),
        Commands::Heartbeat {
            entity,
            project,
            write,
            ..
        } => run_heartbeat(
            &config,
            logger,
            HeartbeatRequest {
                entity,
                project,
                is_write: write,
            },
        ),
        Commands::Version | Commands::Config { .. } => {
            // Already handled above
            unreachable!();
        }
    };

    if let Err(e) = result {
        exit_with(&e);
    }
    Ok(())
}

/// Logger handed to the heartbeat engine; `-v` lifts the production floor
fn core_logger(environment: Environment, verbose: u8) -> SharedLogger {
    if verbose > 0 {
        Arc::new(TracingLogger::new(Severity::Debug))
    } else {
        logger::for_environment(environment)
    }
}

fn exit_with(e: &Error) -> ! {
    eprint!("{}", e.format_for_terminal());
    std::process::exit(e.exit_code());
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

fn agent_manager(config: &AppConfig, logger: SharedLogger) -> Result<AgentProcessManager> {
    let analytics = Arc::new(Analytics::new(config.analytics.enabled));
    let (manager, _events) =
        AgentProcessManager::new(config, &config.credentials.api_key, logger, analytics)?;
    Ok(manager)
}

/// Install wakatime-cli in the foreground
fn run_install(config: &AppConfig, logger: SharedLogger) -> Result<()> {
    runtime()?.block_on(async {
        let mut manager = agent_manager(config, logger)?;
        if manager.ensure_installed().await {
            println!("wakatime-cli installed at {}", manager.binary_path().display());
            Ok(())
        } else {
            Err(Error::AgentNotInstalled {
                path: manager.binary_path().to_path_buf(),
            })
        }
    })
}

/// Print agent location, install state and credential validity
fn run_status(config: &AppConfig, logger: SharedLogger) -> Result<()> {
    let manager = agent_manager(config, logger)?;
    let key = &config.credentials.api_key;

    println!("Platform:      {}", manager.platform().combination());
    println!(
        "Supported:     {}",
        if manager.platform().is_supported() { "yes" } else { "no" }
    );
    println!("Resource dir:  {}", manager.resource_dir().display());
    println!("Agent binary:  {}", manager.binary_path().display());
    println!(
        "Installed:     {}",
        if manager.is_installed() { "yes" } else { "no" }
    );
    println!(
        "API key:       {}",
        match (key.is_empty(), util::valid_api_key(key)) {
            (true, _) => "not set".to_string(),
            (false, true) => format!("{} (valid)", util::mask_key(key)),
            (false, false) => "invalid".to_string(),
        }
    );
    println!("User agent:    {}", manager.user_agent());
    Ok(())
}

/// Send one heartbeat and wait for the agent to exit
fn run_heartbeat(config: &AppConfig, logger: SharedLogger, request: HeartbeatRequest) -> Result<()> {
    runtime()?.block_on(async {
        let manager = agent_manager(config, logger)?;
        if !manager.is_installed() {
            return Err(Error::AgentNotInstalled {
                path: manager.binary_path().to_path_buf(),
            });
        }

        let invocation = manager.prepare(&request);
        let report = invocation.run().await;
        match manager.report_exit(report) {
            Some(InvocationOutcome::Success) => {
                println!("Heartbeat sent for {}", request.entity);
                Ok(())
            }
            Some(outcome) => {
                eprintln!("Heartbeat failed: {:?}", outcome);
                std::process::exit(1);
            }
            None => Err(Error::AgentSpawn {
                message: format!("could not launch {}", manager.binary_path().display()),
            }),
        }
    })
}

fn handle_config_command(subcommand: cli::ConfigSubcommand) -> Result<()> {
    use cli::ConfigSubcommand;

    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = AppConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg.redacted())?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => match AppConfig::load(config.as_deref()) {
            Ok(_) => {
                println!("Configuration is valid.");
            }
            Err(e) => exit_with(&e),
        },
    }

    Ok(())
}
