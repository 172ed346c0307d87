//! Heartbeat decision logic

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::agent::{HeartbeatRequest, HeartbeatSink};
use crate::config::HeartbeatSettings;
use crate::logger::SharedLogger;

use super::ActivityEvent;

// ─────────────────────────────────────────────────────────────────
// Decisions
// ─────────────────────────────────────────────────────────────────

/// What [`HeartbeatCoordinator::on_activity`] did with an event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Title change on a known note; cache updated, nothing reported
    Renamed,
    /// Same note, not a save, too soon since the last heartbeat
    Throttled,
    /// Handed to the sink
    Sent,
    /// Eligible, but the agent binary is missing
    NotInstalled,
    /// Eligible save whose previous save of the same title is older than the dedupe window
    Duplicate,
}

impl Decision {
    /// Whether a heartbeat was initiated, whether or not the sink was called
    pub fn emitted(&self) -> bool {
        !matches!(self, Decision::Renamed | Decision::Throttled)
    }
}

// ─────────────────────────────────────────────────────────────────
// Coordinator
// ─────────────────────────────────────────────────────────────────

/// Decides which activity events become heartbeats.
///
/// One per process. The sink is passed to each call so the daemon keeps
/// ownership of the agent manager.
pub struct HeartbeatCoordinator {
    idle_refresh: Duration,
    dedupe_window: Duration,
    last_reported_document: Option<String>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    known_titles: HashMap<String, String>,
    // never evicted; one entry per distinct saved title
    saves: HashMap<String, DateTime<Utc>>,
    logger: SharedLogger,
}

impl HeartbeatCoordinator {
    pub fn new(settings: &HeartbeatSettings, logger: SharedLogger) -> Self {
        Self::with_thresholds(settings.idle_refresh(), settings.dedupe_window(), logger)
    }

    pub fn with_thresholds(idle_refresh: Duration, dedupe_window: Duration, logger: SharedLogger) -> Self {
        Self {
            idle_refresh,
            dedupe_window,
            last_reported_document: None,
            last_heartbeat_at: None,
            known_titles: HashMap::new(),
            saves: HashMap::new(),
            logger,
        }
    }

    #[cfg(test)]
    pub fn last_reported_document(&self) -> Option<&str> {
        self.last_reported_document.as_deref()
    }

    #[cfg(test)]
    pub fn last_heartbeat_at(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat_at
    }

    /// Cached title for a note id
    #[cfg(test)]
    pub fn known_title(&self, document_id: &str) -> Option<&str> {
        self.known_titles.get(document_id).map(String::as_str)
    }

    pub fn known_note_count(&self) -> usize {
        self.known_titles.len()
    }

    /// Fill the title cache from a snapshot of existing notes
    pub fn seed_titles<I, K, V>(&mut self, notes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (id, title) in notes {
            self.known_titles.insert(id.into(), title.into());
        }
        self.logger
            .debug(&format!("Loaded {} notes", self.known_titles.len()));
    }

    /// A freshly created note starts untitled, so its first title is absorbed as a rename
    pub fn on_note_created(&mut self, document_id: &str) {
        self.known_titles
            .insert(document_id.to_string(), String::new());
    }

    /// Process one activity event
    pub fn on_activity<S>(&mut self, event: ActivityEvent, sink: &mut S) -> Decision
    where
        S: HeartbeatSink + ?Sized,
    {
        match self.known_titles.get_mut(&event.document_id) {
            Some(title) if *title != event.document_title => {
                *title = event.document_title;
                return Decision::Renamed;
            }
            Some(_) => {}
            None => {
                self.known_titles
                    .insert(event.document_id.clone(), event.document_title.clone());
            }
        }

        let now = event.timestamp;
        if !self.is_eligible(&event.document_title, event.is_save, now) {
            return Decision::Throttled;
        }

        let decision = self.dispatch(&event, sink);

        self.last_reported_document = Some(event.document_title);
        self.last_heartbeat_at = Some(later(self.last_heartbeat_at, now));
        decision
    }

    fn is_eligible(&self, title: &str, is_save: bool, now: DateTime<Utc>) -> bool {
        is_save || self.idle_refresh_due(now) || self.last_reported_document.as_deref() != Some(title)
    }

    fn idle_refresh_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_heartbeat_at {
            None => true,
            Some(last) => exceeds(now - last, self.idle_refresh),
        }
    }

    fn dispatch<S>(&mut self, event: &ActivityEvent, sink: &mut S) -> Decision
    where
        S: HeartbeatSink + ?Sized,
    {
        if !sink.is_installed() {
            self.logger.debug("wakatime-cli not installed, skipping heartbeat");
            return Decision::NotInstalled;
        }

        if event.is_save && self.is_duplicate_save(&event.document_title, event.timestamp) {
            self.logger.debug(&format!(
                "Skipping duplicate save heartbeat for {}",
                event.document_title
            ));
            return Decision::Duplicate;
        }

        sink.send(HeartbeatRequest {
            entity: event.document_title.clone(),
            project: event.project.clone(),
            is_write: event.is_save,
        });
        Decision::Sent
    }

    /// Whether the previous save of `title` has gone stale past the dedupe window.
    ///
    /// The record is refreshed either way, which re-arms the window.
    fn is_duplicate_save(&mut self, title: &str, now: DateTime<Utc>) -> bool {
        let previous = self.saves.get(title).copied();
        self.saves.insert(title.to_string(), later(previous, now));

        match previous {
            Some(last) => exceeds(now - last, self.dedupe_window),
            None => false,
        }
    }
}

/// `elapsed > limit`, negative elapsed never exceeds
fn exceeds(elapsed: chrono::Duration, limit: Duration) -> bool {
    match elapsed.to_std() {
        Ok(elapsed) => elapsed > limit,
        Err(_) => false,
    }
}

fn later(stored: Option<DateTime<Utc>>, now: DateTime<Utc>) -> DateTime<Utc> {
    match stored {
        Some(stored) if stored > now => stored,
        _ => now,
    }
}
