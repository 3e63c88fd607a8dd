//! UID-keyed change detection between feeds and the stored event catalog.
//!
//! The engine is pure decision-making: it fetches feed text through a
//! [`FeedFetcher`], looks up prior state through an [`EventStore`], and emits
//! an ordered list of [`SyncDecision`]s. Applying side effects is the
//! store's transaction boundary, not this module's — which is also what
//! makes cancellation safe, since a decision list can simply be discarded.

use std::collections::HashSet;

use chrono::FixedOffset;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::FetchError;
use crate::event::CalendarEvent;
use crate::ics::parse_calendar;
use crate::timezone::TimezoneMap;

/// Identifier of an event record in the external catalog.
pub type EventId = u64;

/// A feed to import and the category its events are filed under.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedSpec {
    pub url: String,
    #[serde(default)]
    pub category: Option<String>,
}

/// Catalog record for a previously imported event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEvent {
    pub id: EventId,
    pub sequence: i64,
    /// Raw LAST-MODIFIED recorded at import time, empty when the feed had
    /// none.
    pub last_modified: String,
}

/// Supplies raw calendar text for a feed URL.
pub trait FeedFetcher {
    fn fetch(&self, url: &str) -> Result<String, FetchError>;
}

/// Keyed lookups into the external event catalog.
pub trait EventStore {
    fn find_by_uid(&self, uid: &str) -> Option<StoredEvent>;

    /// `(uid, id)` pairs of events previously imported from this feed URL.
    /// Scoping by URL keeps one feed's deletions from ever touching
    /// another's events.
    fn uids_for_feed(&self, url: &str) -> Vec<(String, EventId)>;
}

/// What to do about one UID. Consumers apply these independently and
/// idempotently.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncDecision {
    Create(CalendarEvent),
    Update(CalendarEvent, EventId),
    Unchanged(EventId),
    Delete(EventId),
}

/// Outcome of syncing one feed.
#[derive(Debug, Clone)]
pub struct FeedReport {
    pub feed_url: String,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    pub decisions: Vec<SyncDecision>,
    /// Set when the feed could not be fetched; decisions are then empty and
    /// the rest of the batch is unaffected.
    pub error: Option<FetchError>,
}

/// The sync engine. Read-only configuration in, decisions out.
pub struct Syncer<'a, F, S> {
    fetcher: &'a F,
    store: &'a S,
    zones: &'a TimezoneMap,
    report_offset: FixedOffset,
}

impl<'a, F: FeedFetcher, S: EventStore> Syncer<'a, F, S> {
    pub fn new(
        fetcher: &'a F,
        store: &'a S,
        zones: &'a TimezoneMap,
        report_offset: FixedOffset,
    ) -> Self {
        Self {
            fetcher,
            store,
            zones,
            report_offset,
        }
    }

    /// Sync every feed in order. A fetch failure fails only that feed.
    pub fn sync(&self, feeds: &[FeedSpec]) -> Vec<FeedReport> {
        feeds.iter().map(|feed| self.sync_feed(feed)).collect()
    }

    /// Diff one feed's current events against the stored catalog.
    pub fn sync_feed(&self, feed: &FeedSpec) -> FeedReport {
        let text = match self.fetcher.fetch(&feed.url) {
            Ok(text) => text,
            Err(err) => {
                warn!(url = %feed.url, %err, "feed fetch failed, skipping feed");
                return FeedReport {
                    feed_url: feed.url.clone(),
                    created: 0,
                    updated: 0,
                    deleted: 0,
                    decisions: Vec::new(),
                    error: Some(err),
                };
            }
        };

        let events = parse_calendar(&text, self.zones, self.report_offset);

        let mut decisions = Vec::with_capacity(events.len());
        let mut current_uids: HashSet<String> = HashSet::with_capacity(events.len());
        let mut created = 0;
        let mut updated = 0;

        for event in events {
            current_uids.insert(event.uid.clone());
            let decision = self.decide(event);
            match decision {
                SyncDecision::Create(_) => created += 1,
                SyncDecision::Update(..) => updated += 1,
                _ => {}
            }
            decisions.push(decision);
        }

        // Everything previously imported from this URL but missing from the
        // feed has been removed upstream.
        let mut deleted = 0;
        for (uid, id) in self.store.uids_for_feed(&feed.url) {
            if !current_uids.contains(&uid) {
                decisions.push(SyncDecision::Delete(id));
                deleted += 1;
            }
        }

        FeedReport {
            feed_url: feed.url.clone(),
            created,
            updated,
            deleted,
            decisions,
            error: None,
        }
    }

    /// Create/update/unchanged for one parsed event.
    ///
    /// Change fingerprint: LAST-MODIFIED string equality when both sides
    /// carry one, else a strictly greater SEQUENCE. Without evidence of
    /// change the event is left alone.
    fn decide(&self, event: CalendarEvent) -> SyncDecision {
        match self.store.find_by_uid(&event.uid) {
            None => SyncDecision::Create(event),
            Some(stored) => {
                let changed = if !event.last_modified.is_empty() && !stored.last_modified.is_empty()
                {
                    event.last_modified != stored.last_modified
                } else {
                    event.sequence > stored.sequence
                };
                if changed {
                    SyncDecision::Update(event, stored.id)
                } else {
                    SyncDecision::Unchanged(stored.id)
                }
            }
        }
    }
}
