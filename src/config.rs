//! Configuration system for notes-wakatime
//!
//! Supports multiple configuration sources with the following precedence (highest to lowest):
//! 1. Environment variables (NOTES_WAKATIME_* prefix)
//! 2. Configuration file (TOML)
//! 3. Default values
//!
//! The host application can still change the credential and the analytics
//! opt-in at runtime through the settings store; the values here only seed it.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Reporting credential
    pub credentials: CredentialSettings,

    /// Usage analytics opt-in
    pub analytics: AnalyticsSettings,

    /// Host application identity, used in the agent user agent
    pub host: HostSettings,

    /// Throttle and dedupe thresholds
    pub heartbeat: HeartbeatSettings,

    /// Agent binary location and download sources
    pub agent: AgentSettings,

    /// Logging configuration
    pub logging: LoggingSettings,
}

/// Credential settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    /// WakaTime API key (empty = reporting disabled)
    pub api_key: String,
}

/// Analytics settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsSettings {
    /// Track anonymous usage events
    pub enabled: bool,
}

/// Host application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HostSettings {
    /// Host application name
    pub app_name: String,

    /// Host application version
    pub app_version: String,
}

/// Heartbeat thresholds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatSettings {
    /// Force a heartbeat on the same document after this many milliseconds
    pub idle_refresh_ms: u64,

    /// A save is suppressed when the previous save of the same note is older than this many milliseconds
    pub dedupe_window_ms: u64,
}

/// Agent settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSettings {
    /// Directory holding the agent binary (default: <home>/.wakatime)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_dir: Option<String>,

    /// Install the agent on startup when it is missing
    pub auto_install: bool,

    /// Release index returning the latest tag as JSON
    pub releases_url: String,

    /// Prefix of release archive downloads
    pub download_prefix: String,

    /// HTTP timeout for the release index and archive in seconds
    pub download_timeout_secs: u64,
}

/// Logging settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Log file path (empty = no file logging)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    /// Number of rotated log files to keep
    pub max_files: u32,

    /// Enable JSON formatted logging
    pub json_format: bool,
}

// Default implementations

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Default for HostSettings {
    fn default() -> Self {
        Self {
            app_name: "joplin".to_string(),
            app_version: "2.8.8".to_string(),
        }
    }
}

impl Default for HeartbeatSettings {
    fn default() -> Self {
        Self {
            idle_refresh_ms: 120_000,
            dedupe_window_ms: 30 * 60_000,
        }
    }
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            resource_dir: None,
            auto_install: true,
            releases_url: "https://api.github.com/repos/wakatime/wakatime-cli/releases/latest"
                .to_string(),
            download_prefix: "https://github.com/wakatime/wakatime-cli/releases/download"
                .to_string(),
            download_timeout_secs: 300,
        }
    }
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_files: 5,
            json_format: false,
        }
    }
}

impl HeartbeatSettings {
    pub fn idle_refresh(&self) -> Duration {
        Duration::from_millis(self.idle_refresh_ms)
    }

    pub fn dedupe_window(&self) -> Duration {
        Duration::from_millis(self.dedupe_window_ms)
    }
}

impl AppConfig {
    /// Load configuration from file with environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut config = Self::default();

        // 1. Load from config file if it exists
        if let Some(path) = Self::find_config_file(config_path)? {
            debug!(path = %path.display(), "Loading configuration file");
            config = Self::from_file(&path)?;
            info!(path = %path.display(), "Configuration loaded from file");
        }

        // 2. Apply environment variable overrides
        config.apply_env_overrides();

        // 3. Expand paths
        config.expand_paths();

        // 4. Validate
        config.validate()?;

        Ok(config)
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| Error::IoRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| Error::ConfigParse {
            message: format!("{}: {}", path.display(), e.message()),
            source: Some(e),
        })
    }

    /// Find the configuration file to use
    fn find_config_file(explicit_path: Option<&str>) -> Result<Option<PathBuf>> {
        // If explicit path provided, use it (error if not found)
        if let Some(path) = explicit_path {
            let path = PathBuf::from(expand_path(path));
            if path.exists() {
                return Ok(Some(path));
            }
            return Err(Error::config_not_found(path));
        }

        let search_paths = [
            PathBuf::from("notes-wakatime.toml"),
            dirs::config_dir()
                .map(|p| p.join("notes-wakatime").join("config.toml"))
                .unwrap_or_default(),
            dirs::home_dir()
                .map(|p| p.join(".notes-wakatime").join("config.toml"))
                .unwrap_or_default(),
        ];

        for path in &search_paths {
            if !path.as_os_str().is_empty() && path.exists() {
                debug!(path = %path.display(), "Found configuration file");
                return Ok(Some(path.clone()));
            }
        }

        debug!("No configuration file found, using defaults");
        Ok(None)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("NOTES_WAKATIME_API_KEY") {
            self.credentials.api_key = val;
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_ANALYTICS") {
            self.analytics.enabled = parse_bool(&val);
        }

        if let Ok(val) = std::env::var("NOTES_WAKATIME_HOST_APP") {
            self.host.app_name = val;
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_HOST_VERSION") {
            self.host.app_version = val;
        }

        if let Ok(val) = std::env::var("NOTES_WAKATIME_IDLE_REFRESH_MS") {
            if let Ok(n) = val.parse() {
                self.heartbeat.idle_refresh_ms = n;
            }
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_DEDUPE_WINDOW_MS") {
            if let Ok(n) = val.parse() {
                self.heartbeat.dedupe_window_ms = n;
            }
        }

        if let Ok(val) = std::env::var("NOTES_WAKATIME_RESOURCE_DIR") {
            self.agent.resource_dir = Some(val);
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_AUTO_INSTALL") {
            self.agent.auto_install = parse_bool(&val);
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_RELEASES_URL") {
            self.agent.releases_url = val;
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_DOWNLOAD_PREFIX") {
            self.agent.download_prefix = val;
        }

        if let Ok(val) = std::env::var("NOTES_WAKATIME_LOG_LEVEL") {
            self.logging.level = val;
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_LOG_FILE") {
            self.logging.file = Some(val);
        }
        if let Ok(val) = std::env::var("NOTES_WAKATIME_LOG_JSON") {
            self.logging.json_format = parse_bool(&val);
        }
    }

    /// Expand ~ and other path variables
    fn expand_paths(&mut self) {
        if let Some(ref dir) = self.agent.resource_dir {
            self.agent.resource_dir = Some(expand_path(dir));
        }
        if let Some(ref file) = self.logging.file {
            self.logging.file = Some(expand_path(file));
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        validate_http_url("agent.releases_url", &self.agent.releases_url)?;
        validate_http_url("agent.download_prefix", &self.agent.download_prefix)?;

        if self.heartbeat.idle_refresh_ms == 0 {
            return Err(Error::config_field_invalid(
                "heartbeat.idle_refresh_ms",
                "idle_refresh_ms must be greater than 0",
            ));
        }
        if self.heartbeat.dedupe_window_ms == 0 {
            return Err(Error::config_field_invalid(
                "heartbeat.dedupe_window_ms",
                "dedupe_window_ms must be greater than 0",
            ));
        }

        if self.host.app_name.trim().is_empty() {
            return Err(Error::config_field_invalid(
                "host.app_name",
                "app_name cannot be empty",
            ));
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(Error::config_field_invalid(
                "logging.level",
                format!(
                    "Invalid log level '{}'. Must be one of: {}",
                    self.logging.level,
                    valid_levels.join(", ")
                ),
            ));
        }

        Ok(())
    }

    /// Copy of the configuration that is safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.credentials.api_key.is_empty() {
            copy.credentials.api_key = crate::util::mask_key(&copy.credentials.api_key);
        }
        copy
    }
}

fn validate_http_url(field: &str, value: &str) -> Result<()> {
    match url::Url::parse(value) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => Ok(()),
        Ok(_) => Err(Error::config_field_invalid(
            field,
            format!("{} must start with http:// or https://", field),
        )),
        Err(e) => Err(Error::config_field_invalid(
            field,
            format!("{} is not a valid URL: {}", field, e),
        )),
    }
}

fn parse_bool(val: &str) -> bool {
    val.to_lowercase() == "true" || val == "1"
}

/// Expand ~ and environment variables in paths
fn expand_path(path: &str) -> String {
    shellexpand::full(path)
        .unwrap_or_else(|_| std::borrow::Cow::Borrowed(path))
        .into_owned()
}

/// Initialize a new configuration file
pub fn init_config(path: Option<&str>, force: bool) -> Result<PathBuf> {
    let config_path = path
        .map(|p| PathBuf::from(expand_path(p)))
        .unwrap_or_else(|| {
            dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(".notes-wakatime")
                .join("config.toml")
        });

    if config_path.exists() && !force {
        return Err(Error::Config(format!(
            "Configuration file already exists: {}. Use --force to overwrite.",
            config_path.display()
        )));
    }

    if let Some(parent) = config_path.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::IoWrite {
            path: parent.to_path_buf(),
            source: e,
        })?;
    }

    fs::write(&config_path, generate_default_config()).map_err(|e| Error::IoWrite {
        path: config_path.clone(),
        source: e,
    })?;

    Ok(config_path)
}

/// Generate default configuration content with comments
fn generate_default_config() -> String {
    r#"# notes-wakatime configuration

[credentials]
# WakaTime API key; reporting stays off until this is a valid key
api_key = ""

[analytics]
# Track anonymous usage events
enabled = true

[host]
# Host application name and version, sent in the agent user agent
app_name = "joplin"
app_version = "2.8.8"

[heartbeat]
# Force a heartbeat on the same note after this many milliseconds
idle_refresh_ms = 120000

# Suppress a save heartbeat when the previous save of the note is older than this (ms)
dedupe_window_ms = 1800000

[agent]
# Directory holding wakatime-cli (default: ~/.wakatime)
# resource_dir = "~/.wakatime"

# Download wakatime-cli on startup when it is missing
auto_install = true

releases_url = "https://api.github.com/repos/wakatime/wakatime-cli/releases/latest"
download_prefix = "https://github.com/wakatime/wakatime-cli/releases/download"
download_timeout_secs = 300

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log file path (comment out to disable file logging)
# file = "~/.notes-wakatime/logs/notes-wakatime.log"

# Number of rotated log files to keep
max_files = 5

# Enable JSON formatted logging
json_format = false
"#
    .to_string()
}
