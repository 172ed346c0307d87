//! Agent process manager
//!
//! Owns everything about the external `wakatime-cli` agent:
//! - locating (and if needed installing) the binary for this platform
//! - building the argument list and environment for a heartbeat
//! - launching the agent without blocking the event loop
//! - classifying and logging how each launch ended
//!
//! Background work reports back through an [`AgentEvent`] channel that the
//! daemon's loop drains, so all state here is owned by the loop.

pub mod install;
pub mod invoke;
pub mod platform;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;

use crate::analytics::{events, Analytics};
use crate::config::AppConfig;
use crate::error::{Error, Result};
use crate::logger::SharedLogger;
use crate::util;
use crate::version;

pub use install::{InstallReport, Installer};
pub use invoke::{build_args, HeartbeatRequest, Invocation, InvocationOutcome, InvocationReport};
pub use platform::Platform;

// ─────────────────────────────────────────────────────────────────
// Sink seam
// ─────────────────────────────────────────────────────────────────

/// Where the heartbeat coordinator sends what it decided to report
pub trait HeartbeatSink {
    /// Whether the agent binary is present
    fn is_installed(&self) -> bool;

    /// Launch one heartbeat; must not block
    fn send(&mut self, request: HeartbeatRequest);
}

// ─────────────────────────────────────────────────────────────────
// State
// ─────────────────────────────────────────────────────────────────

/// Installation state, tracked for the lifetime of the process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallState {
    Unchecked,
    Checking,
    Installed,
    Installing,
    InstallFailed,
}

impl InstallState {
    pub fn is_busy(&self) -> bool {
        matches!(self, InstallState::Checking | InstallState::Installing)
    }
}

/// Completion of background agent work
#[derive(Debug)]
pub enum AgentEvent {
    InstallFinished(InstallReport),
    Exited(InvocationReport),
}

/// What [`AgentProcessManager::ensure_installed_in_background`] did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStart {
    AlreadyInstalled,
    Started,
    Busy,
}

/// A pending install, runnable off the loop
pub struct InstallJob {
    installer: Installer,
    cached_version: Option<String>,
}

impl InstallJob {
    pub async fn run(self) -> InstallReport {
        self.installer.install(self.cached_version).await
    }
}

// ─────────────────────────────────────────────────────────────────
// Manager
// ─────────────────────────────────────────────────────────────────

pub struct AgentProcessManager {
    installer: Installer,
    platform: Platform,
    binary_path: PathBuf,
    state: InstallState,
    cached_version: Option<String>,
    api_key: String,
    user_agent: String,
    logger: SharedLogger,
    analytics: Arc<Analytics>,
    events_tx: mpsc::UnboundedSender<AgentEvent>,
    in_flight: usize,
}

impl AgentProcessManager {
    /// Manager for the current platform
    pub fn new(
        config: &AppConfig,
        api_key: &str,
        logger: SharedLogger,
        analytics: Arc<Analytics>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AgentEvent>)> {
        Self::with_platform(config, Platform::current(), api_key, logger, analytics)
    }

    pub fn with_platform(
        config: &AppConfig,
        platform: Platform,
        api_key: &str,
        logger: SharedLogger,
        analytics: Arc<Analytics>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<AgentEvent>)> {
        let resource_dir = match config.agent.resource_dir.as_deref() {
            Some(dir) => PathBuf::from(dir),
            None => platform::home_dir(&platform).join(platform::RESOURCE_DIR_NAME),
        };
        let resource_dir = platform::ensure_resource_dir(&resource_dir, logger.as_ref());

        let installer = Installer::new(&config.agent, resource_dir, platform.clone(), logger.clone())?;
        let binary_path = installer.binary_path();
        let user_agent = format!(
            "{}/{} {}",
            config.host.app_name,
            config.host.app_version,
            version::build_info().plugin_tag()
        );

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let manager = Self {
            installer,
            platform,
            binary_path,
            state: InstallState::Unchecked,
            cached_version: None,
            api_key: api_key.to_string(),
            user_agent,
            logger,
            analytics,
            events_tx,
            in_flight: 0,
        };
        Ok((manager, events_rx))
    }

    pub fn binary_path(&self) -> &Path {
        &self.binary_path
    }

    pub fn resource_dir(&self) -> &Path {
        self.installer.resource_dir()
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    pub fn state(&self) -> InstallState {
        self.state
    }

    /// Release tag resolved by an earlier install, if any
    #[cfg(test)]
    pub fn cached_version(&self) -> Option<&str> {
        self.cached_version.as_deref()
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Invocations launched and not yet reported back
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn set_api_key(&mut self, api_key: &str) {
        self.api_key = api_key.to_string();
    }

    pub fn is_installed(&self) -> bool {
        self.binary_path.exists()
    }

    // ── install ──────────────────────────────────────────────────

    /// Move into `Checking` and decide whether an install is needed.
    ///
    /// Refused while a check or install is already running.
    pub fn begin_install(&mut self) -> Result<Option<InstallJob>> {
        if self.state.is_busy() {
            return Err(Error::InstallInProgress);
        }

        self.state = InstallState::Checking;
        if self.is_installed() {
            self.state = InstallState::Installed;
            return Ok(None);
        }

        self.logger.info(&format!(
            "{} not found, installing into {}",
            platform::AGENT_NAME,
            self.installer.resource_dir().display()
        ));
        self.state = InstallState::Installing;
        Ok(Some(InstallJob {
            installer: self.installer.clone(),
            cached_version: self.cached_version.clone(),
        }))
    }

    /// Record the outcome of an install; returns whether the agent is now installed
    pub fn finish_install(&mut self, report: InstallReport) -> bool {
        if let Some(version) = report.version {
            self.cached_version = Some(version);
        }

        match report.result {
            Ok(path) => {
                self.state = InstallState::Installed;
                self.logger.info(&format!(
                    "Finished installing {} to {}",
                    platform::AGENT_NAME,
                    path.display()
                ));
                self.analytics.track_event(
                    events::AGENT_INSTALLED,
                    Some(json!({ "version": self.cached_version })),
                );
                true
            }
            Err(e) => {
                self.state = InstallState::InstallFailed;
                self.logger
                    .warn_with_cause(&format!("Failed to install {}", platform::AGENT_NAME), &e);
                self.analytics.track_event(
                    events::AGENT_INSTALL_FAILED,
                    Some(json!({ "code": e.code().as_str(), "retryable": e.is_retryable() })),
                );
                false
            }
        }
    }

    /// Install if needed and wait for it; returns whether the agent is installed
    pub async fn ensure_installed(&mut self) -> bool {
        match self.begin_install() {
            Ok(None) => true,
            Ok(Some(job)) => {
                let report = job.run().await;
                self.finish_install(report)
            }
            Err(e) => {
                self.logger.warn(&e.to_string());
                false
            }
        }
    }

    /// Start an install on a background task; completion arrives as [`AgentEvent::InstallFinished`]
    pub fn ensure_installed_in_background(&mut self) -> InstallStart {
        match self.begin_install() {
            Ok(None) => InstallStart::AlreadyInstalled,
            Ok(Some(job)) => {
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let report = job.run().await;
                    let _ = tx.send(AgentEvent::InstallFinished(report));
                });
                InstallStart::Started
            }
            Err(e) => {
                self.logger.warn(&e.to_string());
                InstallStart::Busy
            }
        }
    }

    // ── invoke ───────────────────────────────────────────────────

    /// Environment for an agent launch, from the live process environment
    pub fn invocation_environment(&self) -> HashMap<String, String> {
        let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        platform::build_invocation_environment(std::env::vars().collect(), &self.platform, &cwd)
    }

    /// Binary, arguments and environment for one heartbeat
    pub fn prepare(&self, request: &HeartbeatRequest) -> Invocation {
        Invocation {
            binary: self.binary_path.clone(),
            args: build_args(request, &self.api_key, &self.user_agent),
            env: self.invocation_environment(),
            entity: request.entity.clone(),
        }
    }

    /// Launch on a background task; completion arrives as [`AgentEvent::Exited`]
    pub fn invoke(&mut self, invocation: Invocation) {
        self.logger
            .debug(&format!("Sending heartbeat: {}", invocation.command_line()));

        self.in_flight += 1;
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            let report = invocation.run().await;
            let _ = tx.send(AgentEvent::Exited(report));
        });
    }

    /// Fold a background completion into the manager's state
    pub fn handle_event(&mut self, event: AgentEvent) -> Option<InvocationOutcome> {
        match event {
            AgentEvent::InstallFinished(report) => {
                self.finish_install(report);
                None
            }
            AgentEvent::Exited(report) => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.report_exit(report)
            }
        }
    }

    /// Log how a launch ended; `None` when the process never started
    pub fn report_exit(&self, report: InvocationReport) -> Option<InvocationOutcome> {
        let (entity, code, stdout, stderr) = match report {
            InvocationReport::LaunchFailed { entity, error } => {
                self.logger.error(&util::redact_key(&format!(
                    "Heartbeat for {} failed: {}",
                    entity, error
                )));
                self.analytics
                    .track_event(events::HEARTBEAT_FAILED, Some(json!({ "code": null })));
                return None;
            }
            InvocationReport::Exited {
                entity,
                code,
                stdout,
                stderr,
            } => (entity, code, stdout, stderr),
        };

        let outcome = InvocationOutcome::from_status(code);
        if !outcome.is_success() {
            self.logger
                .debug(&format!("Heartbeat for {} failed: {:?}", entity, outcome));
            for output in [stderr.trim(), stdout.trim()] {
                if !output.is_empty() {
                    self.logger.error(&util::redact_key(output));
                }
            }
        }

        match outcome {
            InvocationOutcome::Success => {
                let now = chrono::Local::now();
                self.logger.debug(&format!(
                    "last heartbeat sent {}",
                    util::format_local_date(&now)
                ));
            }
            InvocationOutcome::ApiError => self.logger.warn(
                "WakaTime Offline, coding activity will sync when online.",
            ),
            InvocationOutcome::ConfigError => self.logger.error(
                "An error occurred while parsing $WAKATIME_HOME/.wakatime.cfg. Check $WAKATIME_HOME/.wakatime-internal.cfg for more info.",
            ),
            InvocationOutcome::AuthError => self.logger.error(
                "Invalid API Key. Make sure your API Key is correct!",
            ),
            InvocationOutcome::Unknown(code) => {
                let code = code.map_or_else(|| "signal".to_string(), |c| c.to_string());
                self.logger.error(&format!(
                    "Unknown Error ({}); Check your log file for more details.",
                    code
                ));
            }
        }

        let name = if outcome.is_success() {
            events::HEARTBEAT_SENT
        } else {
            events::HEARTBEAT_FAILED
        };
        self.analytics.track_event(name, Some(json!({ "code": code })));

        Some(outcome)
    }
}

impl HeartbeatSink for AgentProcessManager {
    fn is_installed(&self) -> bool {
        AgentProcessManager::is_installed(self)
    }

    fn send(&mut self, request: HeartbeatRequest) {
        let invocation = self.prepare(&request);
        self.invoke(invocation);
    }
}
