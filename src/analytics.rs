//! Usage analytics sink
//!
//! Tracks named events as structured `tracing` events on the `analytics`
//! target, tagged with the plugin version. Honours the opt-in setting; no
//! note content is ever passed in.

use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;

/// Event names tracked by the daemon
pub mod events {
    pub const AGENT_INSTALLED: &str = "Agent installed";
    pub const AGENT_INSTALL_FAILED: &str = "Agent install failed";
    pub const HEARTBEAT_SENT: &str = "Heartbeat sent";
    pub const HEARTBEAT_FAILED: &str = "Heartbeat failed";
}

#[derive(Debug)]
pub struct Analytics {
    enabled: AtomicBool,
    plugin_version: &'static str,
}

impl Analytics {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled: AtomicBool::new(enabled),
            plugin_version: env!("CARGO_PKG_VERSION"),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Opt in or out of tracking
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Track a named event; returns whether it was recorded
    pub fn track_event(&self, name: &str, props: Option<Value>) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let props = props.unwrap_or(Value::Null);
        tracing::info!(
            target: "analytics",
            event = name,
            plugin_version = self.plugin_version,
            props = %props,
            "Tracked event"
        );
        true
    }
}
