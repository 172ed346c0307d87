//! Logger capability handed to the heartbeat engine
//!
//! The engine never talks to `tracing` directly. It receives a [`Logger`]
//! at construction, chosen once at startup from the [`Environment`], so the
//! core has no environment branching of its own and tests can capture what
//! it logs.

use std::fmt;
use std::sync::Arc;

/// Severity of a logged message, ordered from least to most severe
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Debug => "DEBUG",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Runtime environment, selects the logger at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
}

impl Environment {
    /// Environment variable consulted by [`Environment::from_env`]
    pub const VAR: &'static str = "NOTES_WAKATIME_ENV";

    /// Read the environment from `NOTES_WAKATIME_ENV` (defaults to production)
    pub fn from_env() -> Self {
        Self::parse(std::env::var(Self::VAR).ok().as_deref())
    }

    fn parse(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "development" || v == "dev" => Environment::Development,
            _ => Environment::Production,
        }
    }
}

/// Narrow logging contract used by the heartbeat engine
pub trait Logger: Send + Sync {
    /// Emit a message at the given severity
    fn log(&self, severity: Severity, message: &str);

    fn debug(&self, message: &str) {
        self.log(Severity::Debug, message);
    }

    fn info(&self, message: &str) {
        self.log(Severity::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(Severity::Warn, message);
    }

    fn error(&self, message: &str) {
        self.log(Severity::Error, message);
    }

    fn warn_with_cause(&self, message: &str, cause: &dyn std::error::Error) {
        self.log(Severity::Warn, &format!("{}: {}", message, cause));
    }

    fn error_with_cause(&self, message: &str, cause: &dyn std::error::Error) {
        self.log(Severity::Error, &format!("{}: {}", message, cause));
    }
}

/// Shared handle to a logger
pub type SharedLogger = Arc<dyn Logger>;

/// Logger that forwards to `tracing`, dropping anything below `min`
#[derive(Debug, Clone)]
pub struct TracingLogger {
    min: Severity,
}

impl TracingLogger {
    pub fn new(min: Severity) -> Self {
        Self { min }
    }

    #[cfg(test)]
    pub fn min_severity(&self) -> Severity {
        self.min
    }
}

impl Logger for TracingLogger {
    fn log(&self, severity: Severity, message: &str) {
        if severity < self.min {
            return;
        }
        match severity {
            Severity::Debug => tracing::debug!(target: "notes_wakatime", "{}", message),
            Severity::Info => tracing::info!(target: "notes_wakatime", "{}", message),
            Severity::Warn => tracing::warn!(target: "notes_wakatime", "{}", message),
            Severity::Error => tracing::error!(target: "notes_wakatime", "{}", message),
        }
    }
}

/// Build the logger for an environment: everything in development, warnings and up in production
pub fn for_environment(environment: Environment) -> SharedLogger {
    match environment {
        Environment::Development => Arc::new(TracingLogger::new(Severity::Debug)),
        Environment::Production => Arc::new(TracingLogger::new(Severity::Warn)),
    }
}

/// Logger that records messages in memory, for tests
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryLogger {
    entries: std::sync::Mutex<Vec<(Severity, String)>>,
}

#[cfg(test)]
impl MemoryLogger {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entries(&self) -> Vec<(Severity, String)> {
        self.entries.lock().unwrap().clone()
    }

    pub fn contains(&self, severity: Severity, needle: &str) -> bool {
        self.entries()
            .iter()
            .any(|(s, m)| *s == severity && m.contains(needle))
    }

    pub fn any_contains(&self, needle: &str) -> bool {
        self.entries().iter().any(|(_, m)| m.contains(needle))
    }
}

#[cfg(test)]
impl Logger for MemoryLogger {
    fn log(&self, severity: Severity, message: &str) {
        self.entries.lock().unwrap().push((severity, message.to_string()));
    }
}
