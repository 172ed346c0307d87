//! Error types for notes-wakatime
//!
//! Provides structured error handling with:
//! - Numeric error codes for machine parsing
//! - User-friendly messages with suggestions
//! - Exit codes for CLI
//!
//! Installation and invocation failures of the agent never reach the
//! caller of the heartbeat engine; they are logged where they happen. These
//! types carry them up to the point where they are logged, and carry
//! CLI-level failures (bad config, unusable paths) to the exit code.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Result type alias for notes-wakatime operations
pub type Result<T> = std::result::Result<T, Error>;

/// Numeric error codes for machine parsing and documentation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum ErrorCode {
    // Configuration errors (1xx)
    ConfigNotFound = 100,
    ConfigParseError = 101,
    ConfigValidation = 102,

    // IO errors (2xx)
    IoRead = 200,
    IoWrite = 201,

    // Network errors (3xx)
    HttpRequest = 300,
    HttpStatus = 301,
    ReleaseUnavailable = 302,

    // Agent errors (4xx)
    AgentNotInstalled = 400,
    AgentArchive = 401,
    AgentSpawn = 402,
    AgentInstallInProgress = 403,

    // Host bridge errors (5xx)
    HostMessage = 500,

    // Internal errors (9xx)
    InternalError = 900,
}

impl ErrorCode {
    /// Get the string code (e.g., "E100")
    pub fn as_str(&self) -> String {
        format!("E{}", *self as u16)
    }

    /// Get the exit code for CLI (maps to 1-125 range)
    pub fn exit_code(&self) -> i32 {
        match *self as u16 {
            100..=199 => 10, // Config errors
            200..=299 => 20, // IO errors
            300..=399 => 30, // Network errors
            400..=499 => 40, // Agent errors
            500..=599 => 50, // Host bridge errors
            900..=999 => 90, // Internal errors
            _ => 1,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Main error type
#[derive(Error, Debug)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Configuration Errors
    // ─────────────────────────────────────────────────────────────

    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: PathBuf },

    /// Configuration parse error
    #[error("Failed to parse configuration: {message}")]
    ConfigParse {
        message: String,
        #[source]
        source: Option<toml::de::Error>,
    },

    /// Configuration validation error
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String, field: Option<String> },

    /// Generic configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    // ─────────────────────────────────────────────────────────────
    // IO Errors
    // ─────────────────────────────────────────────────────────────

    /// File read error
    #[error("Failed to read file: {path}")]
    IoRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// File write error
    #[error("Failed to write file: {path}")]
    IoWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    Toml(#[from] toml::ser::Error),

    // ─────────────────────────────────────────────────────────────
    // Network Errors
    // ─────────────────────────────────────────────────────────────

    /// HTTP request could not be completed
    #[error("Request to {url} failed: {source}")]
    HttpRequest {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    /// Server answered with a status we do not accept
    #[error("{url} responded with HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// Release index did not yield a usable version
    #[error("No agent release available: {0}")]
    ReleaseUnavailable(String),

    // ─────────────────────────────────────────────────────────────
    // Agent Errors
    // ─────────────────────────────────────────────────────────────

    /// Agent binary is missing
    #[error("Agent not installed at {path}")]
    AgentNotInstalled { path: PathBuf },

    /// Downloaded archive could not be unpacked
    #[error("Failed to unpack agent archive {path}: {message}")]
    AgentArchive { path: PathBuf, message: String },

    /// Agent process could not be started
    #[error("Failed to launch agent: {message}")]
    AgentSpawn { message: String },

    /// Another install is still running
    #[error("Agent install already in progress")]
    InstallInProgress,

    // ─────────────────────────────────────────────────────────────
    // Host Bridge Errors
    // ─────────────────────────────────────────────────────────────

    /// Malformed message from the host application
    #[error("Malformed host message: {message}")]
    HostMessage { message: String },

    // ─────────────────────────────────────────────────────────────
    // Internal Errors
    // ─────────────────────────────────────────────────────────────

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    // ─────────────────────────────────────────────────────────────
    // Error Classification
    // ─────────────────────────────────────────────────────────────

    /// Get the numeric error code
    pub fn code(&self) -> ErrorCode {
        match self {
            Error::ConfigNotFound { .. } => ErrorCode::ConfigNotFound,
            Error::ConfigParse { .. } => ErrorCode::ConfigParseError,
            Error::ConfigValidation { .. } => ErrorCode::ConfigValidation,
            Error::Config(_) => ErrorCode::ConfigValidation,

            Error::IoRead { .. } => ErrorCode::IoRead,
            Error::IoWrite { .. } => ErrorCode::IoWrite,
            Error::Toml(_) => ErrorCode::ConfigParseError,

            Error::HttpRequest { .. } => ErrorCode::HttpRequest,
            Error::HttpStatus { .. } => ErrorCode::HttpStatus,
            Error::ReleaseUnavailable(_) => ErrorCode::ReleaseUnavailable,

            Error::AgentNotInstalled { .. } => ErrorCode::AgentNotInstalled,
            Error::AgentArchive { .. } => ErrorCode::AgentArchive,
            Error::AgentSpawn { .. } => ErrorCode::AgentSpawn,
            Error::InstallInProgress => ErrorCode::AgentInstallInProgress,

            Error::HostMessage { .. } => ErrorCode::HostMessage,

            Error::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Check if the error is worth retrying on the next activity event
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::HttpRequest { .. }
                | Error::HttpStatus { .. }
                | Error::ReleaseUnavailable(_)
                | Error::AgentArchive { .. }
                | Error::AgentSpawn { .. }
                | Error::InstallInProgress
                | Error::IoRead { .. }
                | Error::IoWrite { .. }
        )
    }

    /// Get the exit code for CLI
    pub fn exit_code(&self) -> i32 {
        self.code().exit_code()
    }

    // ─────────────────────────────────────────────────────────────
    // User-Friendly Messages
    // ─────────────────────────────────────────────────────────────

    /// Get a user-friendly suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<&'static str> {
        match self {
            Error::ConfigNotFound { .. } => Some(
                "Run 'notes-wakatime config init' to create a default configuration file."
            ),
            Error::ConfigParse { .. } => Some(
                "Check your configuration file syntax. Run 'notes-wakatime config validate' to see details."
            ),
            Error::ConfigValidation { .. } | Error::Config(_) => Some(
                "Review the configuration file and fix the invalid values."
            ),
            Error::HttpRequest { .. } | Error::HttpStatus { .. } => Some(
                "Check your network connection. The agent download is retried on the next start."
            ),
            Error::ReleaseUnavailable(_) => Some(
                "The release index could not be read. Try 'notes-wakatime install' again later."
            ),
            Error::AgentNotInstalled { .. } => Some(
                "Run 'notes-wakatime install' to download the agent."
            ),
            Error::AgentArchive { .. } => Some(
                "The downloaded archive is corrupted. Run 'notes-wakatime install' to fetch it again."
            ),
            Error::AgentSpawn { .. } => Some(
                "Check that the agent binary is executable. Re-run 'notes-wakatime install' if it is damaged."
            ),
            _ => None,
        }
    }

    /// Format the error for terminal display with colors
    pub fn format_for_terminal(&self) -> String {
        let code = self.code();
        let suggestion = self.suggestion();

        let mut output = format!(
            "\x1b[31mError [{}]\x1b[0m: {}\n",
            code.as_str(),
            self
        );

        if let Some(hint) = suggestion {
            output.push_str(&format!("\n\x1b[33mHint\x1b[0m: {}\n", hint));
        }

        output
    }

    /// Format the error for logging (no colors)
    pub fn format_for_log(&self) -> String {
        format!("[{}] {}", self.code().as_str(), self)
    }
}

// ─────────────────────────────────────────────────────────────────
// Error Constructors
// ─────────────────────────────────────────────────────────────────

impl Error {
    /// Create a config not found error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Error::ConfigNotFound { path: path.into() }
    }

    /// Create a config validation error with field name
    pub fn config_field_invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Error::ConfigValidation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create an HTTP request error
    pub fn http_request(url: impl Into<String>, source: reqwest::Error) -> Self {
        Error::HttpRequest {
            url: url.into(),
            source,
        }
    }

    /// Create an archive error
    pub fn archive(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::AgentArchive {
            path: path.into(),
            message: message.into(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────
