//! Daemon: the single-threaded loop that ties host, coordinator and agent together
//!
//! Host lines, agent completions and Ctrl-C are multiplexed with
//! `tokio::select!` on a current-thread runtime. Coordinator and agent
//! state are owned by the loop; background tasks hand results back over
//! the agent's event channel.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::agent::{AgentEvent, AgentProcessManager, InstallStart};
use crate::analytics::Analytics;
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::heartbeat::{ActivityEvent, HeartbeatCoordinator};
use crate::host::{self, HostMessage};
use crate::logger::SharedLogger;
use crate::settings::{SettingChange, Settings};

/// Where host messages are read from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventSource {
    Stdin,
    File(PathBuf),
}

/// Counters reported when the loop ends
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Non-blank lines read
    pub messages: u64,
    /// Lines that could not be parsed
    pub malformed: u64,
    /// Activity events received
    pub activities: u64,
    /// Activity events dropped because reporting is disabled
    pub dropped: u64,
    /// Heartbeats the coordinator initiated
    pub heartbeats: u64,
}

pub struct Daemon {
    config: AppConfig,
    settings: Settings,
    analytics: Arc<Analytics>,
    logger: SharedLogger,
    coordinator: Option<HeartbeatCoordinator>,
    agent: AgentProcessManager,
    agent_rx: mpsc::UnboundedReceiver<AgentEvent>,
    summary: RunSummary,
}

impl Daemon {
    pub fn new(config: AppConfig, logger: SharedLogger) -> Result<Self> {
        let settings = Settings::new(config.credentials.api_key.clone(), config.analytics.enabled);
        let analytics = Arc::new(Analytics::new(settings.analytics_enabled()));
        let (agent, agent_rx) =
            AgentProcessManager::new(&config, settings.api_key(), logger.clone(), analytics.clone())?;

        let coordinator = if settings.has_valid_api_key() {
            Some(HeartbeatCoordinator::new(&config.heartbeat, logger.clone()))
        } else {
            logger.warn("Invalid WakaTime API key, heartbeats are disabled");
            None
        };

        Ok(Self {
            config,
            settings,
            analytics,
            logger,
            coordinator,
            agent,
            agent_rx,
            summary: RunSummary::default(),
        })
    }

    #[cfg(test)]
    pub fn agent(&self) -> &AgentProcessManager {
        &self.agent
    }

    #[cfg(test)]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    #[cfg(test)]
    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    #[cfg(test)]
    pub fn coordinator(&self) -> Option<&HeartbeatCoordinator> {
        self.coordinator.as_ref()
    }

    /// Read host messages from `source` until it ends or Ctrl-C
    pub async fn run_source(&mut self, source: EventSource) -> Result<RunSummary> {
        match source {
            EventSource::Stdin => self.run(BufReader::new(tokio::io::stdin())).await,
            EventSource::File(path) => {
                let file = tokio::fs::File::open(&path)
                    .await
                    .map_err(|e| Error::IoRead { path, source: e })?;
                self.run(BufReader::new(file)).await
            }
        }
    }

    /// Event loop over an arbitrary line source
    pub async fn run<R>(&mut self, mut input: R) -> Result<RunSummary>
    where
        R: AsyncBufRead + Unpin,
    {
        self.start();

        // bytes of a partial line survive a cancelled read and are completed by the next one
        let mut line = Vec::new();
        let mut input_open = true;

        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        info!(
            resource_dir = %self.agent.resource_dir().display(),
            reporting = self.coordinator.is_some(),
            "Daemon event loop started"
        );

        loop {
            if !input_open && self.agent.in_flight() == 0 && !self.agent.state().is_busy() {
                break;
            }

            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown signal received");
                    break;
                }

                read = input.read_until(b'\n', &mut line), if input_open => {
                    match read {
                        Ok(0) => {
                            if !line.is_empty() {
                                self.handle_line(&line);
                                line.clear();
                            }
                            input_open = false;
                            debug!(
                                in_flight = self.agent.in_flight(),
                                install = ?self.agent.state(),
                                "Host input closed"
                            );
                        }
                        Ok(_) => {
                            self.handle_line(&line);
                            line.clear();
                        }
                        Err(e) => {
                            self.logger.warn_with_cause("Failed to read host input", &e);
                            input_open = false;
                        }
                    }
                }

                Some(event) = self.agent_rx.recv() => {
                    self.agent.handle_event(event);
                }

                else => break,
            }
        }

        info!(
            messages = self.summary.messages,
            malformed = self.summary.malformed,
            activities = self.summary.activities,
            dropped = self.summary.dropped,
            heartbeats = self.summary.heartbeats,
            "Daemon stopped"
        );
        Ok(self.summary)
    }

    fn start(&mut self) {
        if self.config.agent.auto_install {
            if self.agent.ensure_installed_in_background() == InstallStart::Started {
                info!("Installing wakatime-cli in the background");
            }
        } else if !self.agent.is_installed() {
            self.logger.warn(&format!(
                "wakatime-cli not found at {}; run `notes-wakatime install`",
                self.agent.binary_path().display()
            ));
        }
    }

    /// Handle one raw input line
    pub fn handle_line(&mut self, line: impl AsRef<[u8]>) {
        let message = match host::parse_bytes(line.as_ref()) {
            Ok(Some(message)) => message,
            Ok(None) => return,
            Err(e) => {
                self.summary.messages += 1;
                self.summary.malformed += 1;
                self.logger.warn(&e.format_for_log());
                return;
            }
        };
        self.summary.messages += 1;
        debug!(kind = message.kind(), "Host message");
        self.handle_message(message, Utc::now());
    }

    /// Route one parsed host message
    pub fn handle_message(&mut self, message: HostMessage, received_at: DateTime<Utc>) {
        let message = match message.into_activity(received_at) {
            Ok(event) => return self.on_activity(event),
            Err(other) => other,
        };

        match message {
            HostMessage::Notes { notes } => {
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.seed_titles(notes.into_iter().map(|n| (n.id, n.title)));
                    self.logger
                        .debug(&format!("Tracking {} note titles", coordinator.known_note_count()));
                }
            }
            HostMessage::NoteCreated { id } => {
                if let Some(coordinator) = self.coordinator.as_mut() {
                    coordinator.on_note_created(&id);
                }
            }
            HostMessage::SettingChanged { key, value } => self.on_setting_changed(&key, &value),
            // activity kinds were consumed above
            HostMessage::NoteChanged(_) | HostMessage::NoteSelected(_) | HostMessage::NoteSaved(_) => {}
        }
    }

    fn on_activity(&mut self, event: ActivityEvent) {
        self.summary.activities += 1;
        match self.coordinator.as_mut() {
            Some(coordinator) => {
                if coordinator.on_activity(event, &mut self.agent).emitted() {
                    self.summary.heartbeats += 1;
                }
            }
            None => self.summary.dropped += 1,
        }
    }

    fn on_setting_changed(&mut self, key: &str, value: &serde_json::Value) {
        let change = match self.settings.apply(key, value) {
            Ok(Some(change)) => change,
            Ok(None) => {
                debug!(key = %key, "Setting unchanged or not ours");
                return;
            }
            Err(e) => {
                self.logger.warn(&e.to_string());
                return;
            }
        };

        debug!(key = change.key(), "Setting changed");
        match change {
            SettingChange::ApiKey => {
                self.agent.set_api_key(self.settings.api_key());
                if !self.settings.has_valid_api_key() {
                    self.logger.warn("Invalid WakaTime API key");
                } else if self.coordinator.is_none() {
                    self.logger
                        .warn("WakaTime API key updated; restart to enable heartbeats");
                }
            }
            SettingChange::Analytics(enabled) => {
                self.analytics.set_enabled(enabled);
                self.logger.debug(&format!(
                    "Analytics {}",
                    if enabled { "enabled" } else { "disabled" }
                ));
            }
        }
    }
}

/// Build a current-thread runtime and run the daemon on it
pub fn run(config: AppConfig, logger: SharedLogger, source: EventSource) -> Result<RunSummary> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))?;

    runtime.block_on(async move {
        let mut daemon = Daemon::new(config, logger)?;
        daemon.run_source(source).await
    })
}
