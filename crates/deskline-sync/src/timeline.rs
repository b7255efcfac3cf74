// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Order-independent merge of persisted and optimistic messages.
//!
//! Persisted messages are keyed by id and their statuses merged by rank, so
//! any replay order of the same feed events converges on the same sequence.
//! Optimistic entries live in a separate pending set until the persisted
//! record that confirms them arrives.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::time::Duration;

use chrono::{DateTime, Utc};
use deskline_core::{Message, MessageDirection, MessageId, MessageStatus, TicketId};
use serde::Serialize;

/// One row of the merged sequence shown to a viewer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    #[serde(flatten)]
    pub message: Message,
    /// True for a local send not yet confirmed by storage.
    pub pending: bool,
}

#[derive(Debug, Clone)]
pub struct MessageTimeline {
    confirmed: HashMap<MessageId, Message>,
    pending: Vec<Message>,
    match_window: Duration,
}

impl MessageTimeline {
    /// `match_window` bounds how far apart an unkeyed echo and its optimistic
    /// entry may be stamped and still match.
    pub fn new(match_window: Duration) -> Self {
        Self {
            confirmed: HashMap::new(),
            pending: Vec::new(),
            match_window,
        }
    }

    /// Merges a persisted message. Returns whether the visible sequence changed.
    pub fn apply(&mut self, incoming: Message) -> bool {
        let reconciled = self.reconcile(&incoming);
        match self.confirmed.entry(incoming.id.clone()) {
            Entry::Occupied(mut existing) => {
                let merged = existing.get().status.merge(incoming.status);
                if merged == existing.get().status {
                    return reconciled;
                }
                existing.get_mut().status = merged;
                true
            }
            Entry::Vacant(slot) => {
                slot.insert(incoming);
                true
            }
        }
    }

    /// Adds an optimistic outbound entry under a temporary id.
    ///
    /// Returns `None` when the persisted record for `correlation_id` is
    /// already present, so the send is never shown twice.
    pub fn add_pending(
        &mut self,
        ticket_id: TicketId,
        body: &str,
        correlation_id: &str,
        created_at: DateTime<Utc>,
    ) -> Option<Message> {
        let confirmed = self
            .confirmed
            .values()
            .any(|m| m.correlation_id.as_deref() == Some(correlation_id));
        if confirmed {
            return None;
        }
        let message = Message {
            id: MessageId::from(format!("tmp-{correlation_id}")),
            ticket_id,
            direction: MessageDirection::Outbound,
            body: body.to_string(),
            status: MessageStatus::Sent,
            is_ai_generated: false,
            correlation_id: Some(correlation_id.to_string()),
            created_at,
        };
        self.pending.push(message.clone());
        Some(message)
    }

    /// Drops an optimistic entry whose send was rejected.
    pub fn discard_pending(&mut self, correlation_id: &str) -> bool {
        let before = self.pending.len();
        self.pending
            .retain(|m| m.correlation_id.as_deref() != Some(correlation_id));
        self.pending.len() != before
    }

    /// Removes the pending entry `incoming` confirms, if any.
    fn reconcile(&mut self, incoming: &Message) -> bool {
        if incoming.direction != MessageDirection::Outbound || self.pending.is_empty() {
            return false;
        }
        let position = match &incoming.correlation_id {
            Some(correlation) => self
                .pending
                .iter()
                .position(|p| p.correlation_id.as_ref() == Some(correlation)),
            // Unkeyed echo: same body, closest stamp inside the window.
            None => self
                .pending
                .iter()
                .enumerate()
                .filter(|(_, p)| p.body == incoming.body)
                .map(|(i, p)| (i, distance_ms(p.created_at, incoming.created_at)))
                .filter(|(_, d)| *d <= self.match_window.as_millis())
                .min_by_key(|(_, d)| *d)
                .map(|(i, _)| i),
        };
        match position {
            Some(i) => {
                self.pending.remove(i);
                true
            }
            None => false,
        }
    }

    /// The merged sequence sorted by `(created_at, id)`.
    pub fn entries(&self) -> Vec<TimelineEntry> {
        let mut entries: Vec<TimelineEntry> = self
            .confirmed
            .values()
            .map(|m| TimelineEntry {
                message: m.clone(),
                pending: false,
            })
            .chain(self.pending.iter().map(|m| TimelineEntry {
                message: m.clone(),
                pending: true,
            }))
            .collect();
        entries.sort_by(|a, b| a.message.order_key().cmp(&b.message.order_key()));
        entries
    }

    /// Ordering key of the newest persisted message, the backfill cursor.
    pub fn last_seen(&self) -> Option<(DateTime<Utc>, MessageId)> {
        self.confirmed
            .values()
            .max_by(|a, b| a.order_key().cmp(&b.order_key()))
            .map(|m| (m.created_at, m.id.clone()))
    }

    pub fn len(&self) -> usize {
        self.confirmed.len() + self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

fn distance_ms(a: DateTime<Utc>, b: DateTime<Utc>) -> u128 {
    u128::from((b - a).num_milliseconds().unsigned_abs())
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(5);

    fn at(ms: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(1_700_000_000_000 + ms).unwrap()
    }

    fn persisted(id: &str, body: &str, ms: i64, correlation: Option<&str>) -> Message {
        Message {
            id: MessageId::from(id),
            ticket_id: TicketId::from("t"),
            direction: MessageDirection::Outbound,
            body: body.to_string(),
            status: MessageStatus::Sent,
            is_ai_generated: false,
            correlation_id: correlation.map(str::to_string),
            created_at: at(ms),
        }
    }

    fn ids(timeline: &MessageTimeline) -> Vec<String> {
        timeline
            .entries()
            .into_iter()
            .map(|e| e.message.id.to_string())
            .collect()
    }

    #[test]
    fn out_of_order_delivery_is_resorted() {
        let mut timeline = MessageTimeline::new(WINDOW);
        timeline.apply(persisted("b", "second", 20, None));
        timeline.apply(persisted("a", "first", 10, None));
        timeline.apply(persisted("c", "tie", 20, None));
        assert_eq!(ids(&timeline), vec!["a", "b", "c"]);
    }

    #[test]
    fn correlated_echo_replaces_optimistic_entry() {
        let mut timeline = MessageTimeline::new(WINDOW);
        timeline
            .add_pending(TicketId::from("t"), "Olá", "c-1", at(0))
            .unwrap();
        assert_eq!(timeline.pending_len(), 1);

        assert!(timeline.apply(persisted("m1", "Olá", 40, Some("c-1"))));
        let entries = timeline.entries();
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].pending);
        assert_eq!(entries[0].message.id.as_str(), "m1");
    }

    #[test]
    fn unkeyed_echo_matches_by_body_within_window() {
        let mut timeline = MessageTimeline::new(WINDOW);
        timeline.add_pending(TicketId::from("t"), "same", "c-1", at(0));
        timeline.add_pending(TicketId::from("t"), "same", "c-2", at(3_000));

        timeline.apply(persisted("m2", "same", 3_100, None));
        assert_eq!(timeline.pending_len(), 1);
        let left = timeline.entries().into_iter().find(|e| e.pending).unwrap();
        assert_eq!(left.message.correlation_id.as_deref(), Some("c-1"));

        timeline.apply(persisted("far", "same", 60_000, None));
        assert_eq!(timeline.pending_len(), 1, "outside the window nothing matches");
    }

    #[test]
    fn echo_from_another_viewer_does_not_consume_pending() {
        let mut timeline = MessageTimeline::new(WINDOW);
        timeline.add_pending(TicketId::from("t"), "ok", "mine", at(0));
        timeline.apply(persisted("theirs", "ok", 10, Some("theirs")));
        assert_eq!(timeline.pending_len(), 1);
        assert_eq!(timeline.len(), 2);
    }

    #[test]
    fn confirmation_before_optimistic_insert_is_not_duplicated() {
        let mut timeline = MessageTimeline::new(WINDOW);
        timeline.apply(persisted("m1", "fast", 5, Some("c-1")));
        assert!(timeline.add_pending(TicketId::from("t"), "fast", "c-1", at(0)).is_none());
        assert_eq!(timeline.len(), 1);
    }

    #[test]
    fn status_updates_never_regress() {
        let mut timeline = MessageTimeline::new(WINDOW);
        let mut read = persisted("m1", "x", 0, None);
        read.status = MessageStatus::Read;
        timeline.apply(read);
        assert!(!timeline.apply(persisted("m1", "x", 0, None)));
        assert_eq!(timeline.entries()[0].message.status, MessageStatus::Read);
    }

    #[test]
    fn discarded_pending_disappears_and_cursor_ignores_pending() {
        let mut timeline = MessageTimeline::new(WINDOW);
        timeline.apply(persisted("m1", "x", 100, None));
        timeline.add_pending(TicketId::from("t"), "y", "c-9", at(500));
        assert_eq!(timeline.last_seen(), Some((at(100), MessageId::from("m1"))));
        assert!(timeline.discard_pending("c-9"));
        assert!(!timeline.discard_pending("c-9"));
        assert_eq!(timeline.len(), 1);
    }
}
