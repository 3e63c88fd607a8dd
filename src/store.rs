//! JSON-file event catalog.
//!
//! Stands in for the site database the upstream importer wrote to: one
//! record per imported UID, remembering which feed URL it came from and the
//! change fingerprint (sequence, LAST-MODIFIED) used on the next sync.
//! Decisions are applied in memory and persisted with write-then-rename so
//! an interrupted run never leaves a half-written state file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use icalsync_core::{
    CalendarEvent, EventId, EventStore, FeedReport, FeedSpec, RecurrenceRule, StoredEvent,
    SyncDecision,
};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One imported event as persisted in the state file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub id: EventId,
    pub feed_url: String,
    pub category: Option<String>,
    pub summary: String,
    pub description: String,
    pub location: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub all_day: bool,
    pub tzid: String,
    pub sequence: i64,
    pub last_modified: String,
    pub recurrence: Option<RecurrenceRule>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct State {
    next_id: EventId,
    /// uid -> record. BTreeMap keeps the file diff-friendly.
    events: BTreeMap<String, CatalogRecord>,
}

pub struct JsonStore {
    path: PathBuf,
    state: State,
}

impl JsonStore {
    /// Load the catalog, starting empty when the file does not exist yet.
    pub fn load(path: &Path) -> Result<Self> {
        let state = if path.exists() {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Failed to parse {}", path.display()))?
        } else {
            State {
                next_id: 1,
                events: BTreeMap::new(),
            }
        };
        Ok(Self {
            path: path.to_path_buf(),
            state,
        })
    }

    /// Persist the catalog atomically.
    pub fn save(&self) -> Result<()> {
        let text = serde_json::to_string_pretty(&self.state).context("Failed to serialize state")?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, text).with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.state.events.len()
    }

    /// Apply one feed's decisions to the in-memory catalog.
    pub fn apply(&mut self, feed: &FeedSpec, report: &FeedReport) {
        for decision in &report.decisions {
            match decision {
                SyncDecision::Create(event) => {
                    let id = self.state.next_id;
                    self.state.next_id += 1;
                    self.state
                        .events
                        .insert(event.uid.clone(), record_from_event(event, id, feed));
                }
                SyncDecision::Update(event, id) => {
                    self.state
                        .events
                        .insert(event.uid.clone(), record_from_event(event, *id, feed));
                }
                SyncDecision::Unchanged(_) => {}
                SyncDecision::Delete(id) => {
                    let uid = self
                        .state
                        .events
                        .iter()
                        .find(|(_, record)| record.id == *id)
                        .map(|(uid, _)| uid.clone());
                    match uid {
                        Some(uid) => {
                            self.state.events.remove(&uid);
                        }
                        None => warn!(id, "delete decision for unknown catalog id"),
                    }
                }
            }
        }
    }
}

fn record_from_event(event: &CalendarEvent, id: EventId, feed: &FeedSpec) -> CatalogRecord {
    CatalogRecord {
        id,
        feed_url: feed.url.clone(),
        category: feed.category.clone(),
        summary: event.summary.clone(),
        description: event.description.clone(),
        location: event.location.clone(),
        start: event.start,
        end: event.end,
        all_day: event.all_day,
        tzid: event.tzid.clone(),
        sequence: event.sequence,
        last_modified: event.last_modified.clone(),
        recurrence: event.recurrence.clone(),
    }
}

impl EventStore for JsonStore {
    fn find_by_uid(&self, uid: &str) -> Option<StoredEvent> {
        self.state.events.get(uid).map(|record| StoredEvent {
            id: record.id,
            sequence: record.sequence,
            last_modified: record.last_modified.clone(),
        })
    }

    fn uids_for_feed(&self, url: &str) -> Vec<(String, EventId)> {
        self.state
            .events
            .iter()
            .filter(|(_, record)| record.feed_url == url)
            .map(|(uid, record)| (uid.clone(), record.id))
            .collect()
    }
}
