//! Host bridge: messages the note-taking application writes to the daemon
//!
//! One JSON object per line, discriminated by `"type"`:
//!
//! ```text
//! {"type":"notes","notes":[{"id":"a1","title":"Groceries"}]}
//! {"type":"note_created","id":"b2"}
//! {"type":"note_selected","id":"a1","title":"Groceries","project":"Home"}
//! {"type":"note_changed","id":"a1","title":"Groceries"}
//! {"type":"note_saved","id":"a1","title":"Groceries","timestamp":"2024-03-01T09:00:00Z"}
//! {"type":"setting_changed","key":"analytics","value":false}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::heartbeat::ActivityEvent;

// ─────────────────────────────────────────────────────────────────
// Messages
// ─────────────────────────────────────────────────────────────────

/// A note in the startup snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteSummary {
    pub id: String,
    #[serde(default)]
    pub title: String,
}

/// Activity on one note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteActivity {
    pub id: String,

    #[serde(default)]
    pub title: String,

    /// Notebook the note lives in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,

    /// When the host saw the activity; defaults to when the daemon received it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl NoteActivity {
    pub fn into_event(self, is_save: bool, received_at: DateTime<Utc>) -> ActivityEvent {
        let timestamp = self.timestamp.unwrap_or(received_at);
        let event = ActivityEvent::new(self.id, self.title, is_save, timestamp);
        match self.project.filter(|p| !p.is_empty()) {
            Some(project) => event.with_project(project),
            None => event,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostMessage {
    /// Snapshot of existing notes, sent once at startup
    Notes { notes: Vec<NoteSummary> },

    /// A note was created and has no title yet
    NoteCreated { id: String },

    /// The note's content changed
    NoteChanged(NoteActivity),

    /// The user switched to a note
    NoteSelected(NoteActivity),

    /// The note was saved
    NoteSaved(NoteActivity),

    /// A plugin setting changed in the host's settings panel
    SettingChanged { key: String, value: Value },
}

impl HostMessage {
    /// The activity event this message carries, if any
    pub fn into_activity(self, received_at: DateTime<Utc>) -> std::result::Result<ActivityEvent, Self> {
        match self {
            HostMessage::NoteChanged(activity) | HostMessage::NoteSelected(activity) => {
                Ok(activity.into_event(false, received_at))
            }
            HostMessage::NoteSaved(activity) => Ok(activity.into_event(true, received_at)),
            other => Err(other),
        }
    }

    /// Short name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            HostMessage::Notes { .. } => "notes",
            HostMessage::NoteCreated { .. } => "note_created",
            HostMessage::NoteChanged(_) => "note_changed",
            HostMessage::NoteSelected(_) => "note_selected",
            HostMessage::NoteSaved(_) => "note_saved",
            HostMessage::SettingChanged { .. } => "setting_changed",
        }
    }
}

/// Parse one input line; blank lines yield `None`
pub fn parse_line(line: &str) -> Result<Option<HostMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(line)
        .map(Some)
        .map_err(|e| Error::HostMessage {
            message: format!("unreadable host message: {}", e),
        })
}

/// Parse one raw input line, rejecting bytes that are not UTF-8
pub fn parse_bytes(line: &[u8]) -> Result<Option<HostMessage>> {
    let line = std::str::from_utf8(line).map_err(|e| Error::HostMessage {
        message: format!("unreadable host message: {}", e),
    })?;
    parse_line(line)
}
