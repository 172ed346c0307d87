//! Heartbeat coordination
//!
//! Turns the host's stream of activity events into heartbeats: absorbs
//! renames, throttles repeated activity on the same note and suppresses
//! duplicate saves.

mod coordinator;

pub use coordinator::*;

use chrono::{DateTime, Utc};

/// One discrete piece of user activity reported by the host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActivityEvent {
    /// Stable note identity
    pub document_id: String,

    /// Current note title, reported as the heartbeat entity
    pub document_title: String,

    /// Whether the activity was a save
    pub is_save: bool,

    /// When the activity happened
    pub timestamp: DateTime<Utc>,

    /// Enclosing project (notebook) name, if the host knows it
    pub project: Option<String>,
}

impl ActivityEvent {
    pub fn new(
        document_id: impl Into<String>,
        document_title: impl Into<String>,
        is_save: bool,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_title: document_title.into(),
            is_save,
            timestamp,
            project: None,
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }
}
