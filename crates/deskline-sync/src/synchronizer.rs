// SPDX-FileCopyrightText: 2026 Deskline Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-viewer subscriptions over the message change feed.
//!
//! A subscription is opened before history is loaded so nothing committed in
//! between is lost. When the feed drops, the task resubscribes and fetches
//! everything from one match window before the newest message it has seen.

use std::sync::Arc;
use std::time::Duration;

use deskline_config::model::SyncConfig;
use deskline_core::types::now;
use deskline_core::{
    ChangeRow, DesklineError, FeedFilter, FeedSubscription, Message, MessageId, StorageAdapter,
    Table, TicketId,
};
use deskline_router::TicketRouter;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::timeline::{MessageTimeline, TimelineEntry};

/// Shown to the viewer when a gap after a feed drop could not be filled.
pub const INCOMPLETE_SYNC_WARNING: &str = "sync may be incomplete";

#[derive(Debug, Clone)]
pub struct SyncSettings {
    pub match_window: Duration,
    /// Page size for history and backfill fetches.
    pub backfill_limit: u32,
}

impl SyncSettings {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            match_window: Duration::from_millis(config.match_window_ms),
            backfill_limit: config.backfill_limit.max(1),
        }
    }
}

/// What a viewer receives.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncUpdate {
    /// The full merged sequence after a change.
    Timeline { entries: Vec<TimelineEntry> },
    Warning { message: String },
}

type Listener = Arc<dyn Fn(SyncUpdate) + Send + Sync>;

struct Shared {
    ticket_id: TicketId,
    timeline: Mutex<MessageTimeline>,
    listener: Listener,
}

impl Shared {
    /// Applies `change` and notifies the viewer while still holding the lock,
    /// so updates reach the listener in mutation order.
    async fn mutate(&self, change: impl FnOnce(&mut MessageTimeline) -> bool) {
        let mut timeline = self.timeline.lock().await;
        if change(&mut timeline) {
            (self.listener)(SyncUpdate::Timeline {
                entries: timeline.entries(),
            });
        }
    }
}

/// Opens viewer subscriptions for tickets.
#[derive(Clone)]
pub struct Synchronizer {
    storage: Arc<dyn StorageAdapter>,
    router: Arc<TicketRouter>,
    settings: SyncSettings,
}

impl Synchronizer {
    pub fn new(
        storage: Arc<dyn StorageAdapter>,
        router: Arc<TicketRouter>,
        settings: SyncSettings,
    ) -> Self {
        Self {
            storage,
            router,
            settings,
        }
    }

    /// Subscribes a viewer to a ticket's messages.
    ///
    /// `on_event` first receives the loaded history, then one update per
    /// visible change. The subscription ends when the handle is closed or dropped.
    pub async fn subscribe<F>(
        &self,
        ticket_id: &TicketId,
        on_event: F,
    ) -> Result<SyncHandle, DesklineError>
    where
        F: Fn(SyncUpdate) + Send + Sync + 'static,
    {
        let ticket = self.router.get_ticket(ticket_id).await?;
        let filter = FeedFilter::table(Table::Messages).eq("ticket_id", &ticket.id);
        let subscription = self.storage.subscribe(filter.clone());
        let history = self
            .storage
            .recent_messages(&ticket.id, self.settings.backfill_limit)
            .await?;

        let shared = Arc::new(Shared {
            ticket_id: ticket.id.clone(),
            timeline: Mutex::new(MessageTimeline::new(self.settings.match_window)),
            listener: Arc::new(on_event),
        });
        shared
            .mutate(|timeline| {
                for message in history {
                    timeline.apply(message);
                }
                true
            })
            .await;

        let cancel = CancellationToken::new();
        let task = tokio::spawn(follow(
            Arc::clone(&shared),
            Arc::clone(&self.storage),
            subscription,
            filter,
            Backfill::from_settings(&self.settings),
            cancel.clone(),
        ));
        info!(ticket_id = %ticket.id, "viewer subscribed");

        Ok(SyncHandle {
            shared,
            router: Arc::clone(&self.router),
            cancel,
            task: Some(task),
        })
    }
}

async fn follow(
    shared: Arc<Shared>,
    storage: Arc<dyn StorageAdapter>,
    mut subscription: FeedSubscription,
    filter: FeedFilter,
    backfill: Backfill,
    cancel: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => break,
            next = subscription.recv() => next,
        };
        match next {
            Ok(event) => {
                if let ChangeRow::Message(message) = event.row {
                    shared.mutate(|timeline| timeline.apply(message)).await;
                }
            }
            Err(e) => {
                warn!(ticket_id = %shared.ticket_id, error = %e, "message feed dropped, resubscribing");
                subscription = storage.subscribe(filter.clone());
                match backfill.run(&shared, storage.as_ref()).await {
                    Ok(added) => {
                        debug!(ticket_id = %shared.ticket_id, added, "backfill complete");
                    }
                    Err(e) => {
                        warn!(ticket_id = %shared.ticket_id, error = %e, "backfill failed");
                        (shared.listener)(SyncUpdate::Warning {
                            message: INCOMPLETE_SYNC_WARNING.to_string(),
                        });
                    }
                }
            }
        }
    }
    debug!(ticket_id = %shared.ticket_id, "viewer subscription closed");
}

/// Gap fill after a feed drop.
struct Backfill {
    limit: u32,
    /// How far before the newest seen message the fetch starts. Commits
    /// stamped slightly out of order land inside this window.
    rewind: chrono::Duration,
}

impl Backfill {
    fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            limit: settings.backfill_limit.max(1),
            rewind: chrono::Duration::from_std(settings.match_window)
                .unwrap_or_else(|_| chrono::Duration::zero()),
        }
    }

    /// Pages from the rewound cursor to the end; returns how many entries changed.
    async fn run(
        &self,
        shared: &Shared,
        storage: &dyn StorageAdapter,
    ) -> Result<usize, DesklineError> {
        let mut after = shared
            .timeline
            .lock()
            .await
            .last_seen()
            .map(|(at, _)| (at - self.rewind, MessageId::from("")));
        let mut added = 0;
        loop {
            let page = storage
                .messages_since(&shared.ticket_id, after.clone(), self.limit)
                .await?;
            let count = page.len();
            if let Some(last) = page.last() {
                after = Some((last.created_at, last.id.clone()));
            }
            shared
                .mutate(|timeline| {
                    let before = added;
                    for message in page {
                        if timeline.apply(message) {
                            added += 1;
                        }
                    }
                    added > before
                })
                .await;
            if count < self.limit as usize {
                return Ok(added);
            }
        }
    }
}

/// A live viewer subscription.
pub struct SyncHandle {
    shared: Arc<Shared>,
    router: Arc<TicketRouter>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl SyncHandle {
    pub fn ticket_id(&self) -> &TicketId {
        &self.shared.ticket_id
    }

    pub async fn snapshot(&self) -> Vec<TimelineEntry> {
        self.shared.timeline.lock().await.entries()
    }

    /// Shows `body` immediately under a temporary id, then sends it.
    ///
    /// The optimistic entry is replaced by the persisted record, or removed
    /// if the send is rejected.
    pub async fn send(&self, body: &str) -> Result<Message, DesklineError> {
        let correlation = uuid::Uuid::new_v4().to_string();
        let ticket_id = self.shared.ticket_id.clone();
        self.shared
            .mutate(|timeline| {
                timeline
                    .add_pending(ticket_id.clone(), body, &correlation, now())
                    .is_some()
            })
            .await;

        match self
            .router
            .send_message(&ticket_id, body, Some(correlation.clone()))
            .await
        {
            Ok(message) => {
                let persisted = message.clone();
                self.shared
                    .mutate(|timeline| timeline.apply(persisted))
                    .await;
                Ok(message)
            }
            Err(e) => {
                self.shared
                    .mutate(|timeline| timeline.discard_pending(&correlation))
                    .await;
                Err(e)
            }
        }
    }

    /// Stops the subscription and waits for its task to finish.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for SyncHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskline_core::{Instance, InboundMessage, MessageStatus, TicketStatus};
    use deskline_gateway::EndpointResolver;
    use deskline_router::{OutboundDispatcher, RouterSettings};
    use deskline_test_utils::{MockGateway, TestHarness};
    use tokio::sync::mpsc;

    struct Fixture {
        harness: TestHarness,
        router: Arc<TicketRouter>,
        sync: Synchronizer,
        instance: Instance,
    }

    async fn fixture() -> Fixture {
        let harness = TestHarness::new().await.unwrap();
        let gateway = Arc::new(MockGateway::new());
        let endpoints = EndpointResolver::new(harness.dyn_storage(), "http://gateway.test");
        let dispatcher = OutboundDispatcher::new(harness.dyn_storage(), gateway, endpoints);
        let router = Arc::new(TicketRouter::new(
            harness.dyn_storage(),
            dispatcher,
            RouterSettings {
                default_agent_limit: 5,
            },
        ));
        let sync = Synchronizer::new(
            harness.dyn_storage(),
            Arc::clone(&router),
            SyncSettings {
                match_window: Duration::from_secs(5),
                backfill_limit: 2,
            },
        );
        let instance = harness.connected_instance("Main", None).await.unwrap();
        Fixture {
            harness,
            router,
            sync,
            instance,
        }
    }

    impl Fixture {
        async fn inbound(&self, body: &str) -> TicketId {
            self.router
                .route_inbound(InboundMessage {
                    tenant_id: self.harness.tenant.clone(),
                    instance_id: self.instance.id.clone(),
                    contact_address: "5511999999999".to_string(),
                    contact_name: None,
                    body: body.to_string(),
                })
                .await
                .unwrap()
                .ticket
                .id
        }

        async fn subscribe(
            &self,
            ticket: &TicketId,
        ) -> (SyncHandle, mpsc::UnboundedReceiver<SyncUpdate>) {
            let (tx, rx) = mpsc::unbounded_channel();
            let handle = self
                .sync
                .subscribe(ticket, move |update| {
                    let _ = tx.send(update);
                })
                .await
                .unwrap();
            (handle, rx)
        }
    }

    /// Collects updates until one satisfies `done`, failing after 5s.
    async fn until(
        rx: &mut mpsc::UnboundedReceiver<SyncUpdate>,
        done: impl Fn(&SyncUpdate) -> bool,
    ) -> Vec<SyncUpdate> {
        let mut seen = Vec::new();
        let wait = async {
            while let Some(update) = rx.recv().await {
                let finished = done(&update);
                seen.push(update);
                if finished {
                    return;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), wait)
            .await
            .expect("expected sync update never arrived");
        seen
    }

    fn bodies(update: &SyncUpdate) -> Vec<String> {
        match update {
            SyncUpdate::Timeline { entries } => {
                entries.iter().map(|e| e.message.body.clone()).collect()
            }
            SyncUpdate::Warning { .. } => Vec::new(),
        }
    }

    #[tokio::test]
    async fn history_then_live_messages_in_order() {
        let f = fixture().await;
        let ticket = f.inbound("Oi").await;
        let (_handle, mut rx) = f.subscribe(&ticket).await;

        let first = until(&mut rx, |_| true).await;
        assert_eq!(bodies(&first[0]), vec!["Oi"]);

        f.inbound("Tudo bem?").await;
        let seen = until(&mut rx, |u| bodies(u).len() == 2).await;
        assert_eq!(bodies(seen.last().unwrap()), vec!["Oi", "Tudo bem?"]);
    }

    #[tokio::test]
    async fn optimistic_send_is_never_rendered_twice() {
        let f = fixture().await;
        let ticket = f.inbound("Oi").await;
        let (handle, mut rx) = f.subscribe(&ticket).await;
        until(&mut rx, |_| true).await;

        let sent = handle.send("Olá!").await.unwrap();
        let seen = until(&mut rx, |u| {
            matches!(u, SyncUpdate::Timeline { entries } if entries.iter().any(|e| e.message.id == sent.id))
        })
        .await;

        match &seen[0] {
            SyncUpdate::Timeline { entries } => {
                assert!(entries.iter().any(|e| e.pending && e.message.body == "Olá!"));
            }
            other => panic!("unexpected update {other:?}"),
        }
        for update in &seen {
            let count = bodies(update).iter().filter(|b| b.as_str() == "Olá!").count();
            assert_eq!(count, 1, "rendered twice: {update:?}");
        }

        // The feed echo of the same record changes nothing.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let snapshot = handle.snapshot().await;
        assert_eq!(snapshot.len(), 2);
        assert!(snapshot.iter().all(|e| !e.pending));
        assert_eq!(snapshot[1].message.status, MessageStatus::Sent);
    }

    #[tokio::test]
    async fn rejected_send_removes_the_optimistic_entry() {
        let f = fixture().await;
        let ticket = f.inbound("Oi").await;
        let agent = f.harness.agent("ana").await.unwrap();
        f.router.claim(&ticket, &agent.id).await.unwrap();
        let closed = f.router.resolve(&ticket, Some(&agent.id)).await.unwrap();
        assert_eq!(closed.status, TicketStatus::Closed);

        let (handle, mut rx) = f.subscribe(&ticket).await;
        until(&mut rx, |_| true).await;
        assert!(handle.send("tarde demais").await.is_err());
        let seen = until(&mut rx, |u| bodies(u) == vec!["Oi"]).await;
        assert!(seen.iter().any(|u| bodies(u).len() == 2));
        assert_eq!(handle.snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn feed_drop_is_backfilled() {
        let f = fixture().await;
        let ticket = f.inbound("um").await;
        let (_handle, mut rx) = f.subscribe(&ticket).await;
        until(&mut rx, |_| true).await;

        f.harness.storage.feed().reset();
        f.inbound("dois").await;
        f.inbound("três").await;
        f.inbound("quatro").await;

        let seen = until(&mut rx, |u| bodies(u).len() == 4).await;
        assert_eq!(
            bodies(seen.last().unwrap()),
            vec!["um", "dois", "três", "quatro"]
        );
    }

    #[tokio::test]
    async fn backfill_picks_up_a_commit_stamped_before_the_newest_seen() {
        let f = fixture().await;
        let ticket = f.inbound("Oi").await;
        let (_handle, mut rx) = f.subscribe(&ticket).await;
        until(&mut rx, |_| true).await;

        let newest = f.router.send_message(&ticket, "B", None).await.unwrap();
        until(&mut rx, |u| bodies(u).len() == 2).await;

        // Committed after "B" but carrying an earlier timestamp, with its
        // feed event lost.
        let earlier = newest.created_at - chrono::Duration::milliseconds(5);
        let conn = rusqlite::Connection::open(f.harness.database_path()).unwrap();
        conn.execute(
            "INSERT INTO messages (id, ticket_id, direction, body, status, is_ai_generated, correlation_id, created_at)
             VALUES ('straggler', ?1, 'outbound', 'A', 'sent', 1, NULL, ?2)",
            rusqlite::params![
                ticket.as_str(),
                earlier.format("%Y-%m-%dT%H:%M:%S%.6fZ").to_string()
            ],
        )
        .unwrap();
        f.harness.storage.feed().reset();

        let seen = until(&mut rx, |u| bodies(u).len() == 3).await;
        assert_eq!(bodies(seen.last().unwrap()), vec!["Oi", "A", "B"]);
        assert!(!seen.iter().any(|u| matches!(u, SyncUpdate::Warning { .. })));
    }

    #[tokio::test]
    async fn failed_backfill_warns_the_viewer() {
        let f = fixture().await;
        let ticket = f.inbound("Oi").await;
        let (_handle, mut rx) = f.subscribe(&ticket).await;
        until(&mut rx, |_| true).await;

        let conn = rusqlite::Connection::open(f.harness.database_path()).unwrap();
        conn.execute_batch("ALTER TABLE messages RENAME TO messages_moved;")
            .unwrap();
        f.harness.storage.feed().reset();

        let seen = until(&mut rx, |u| matches!(u, SyncUpdate::Warning { .. })).await;
        assert_eq!(
            seen.last().unwrap(),
            &SyncUpdate::Warning {
                message: INCOMPLETE_SYNC_WARNING.to_string()
            }
        );
    }

    #[tokio::test]
    async fn dropping_the_handle_ends_the_subscription() {
        let f = fixture().await;
        let ticket = f.inbound("Oi").await;
        let (handle, _rx) = f.subscribe(&ticket).await;
        assert_eq!(f.harness.storage.feed().subscriber_count(), 1);
        drop(handle);

        let gone = async {
            while f.harness.storage.feed().subscriber_count() > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        };
        tokio::time::timeout(Duration::from_secs(5), gone).await.unwrap();
    }

    #[tokio::test]
    async fn unknown_ticket_cannot_be_subscribed() {
        let f = fixture().await;
        let result = f.sync.subscribe(&TicketId::from("missing"), |_| {}).await;
        assert!(matches!(result, Err(DesklineError::NotFound { .. })));
    }

    #[test]
    fn updates_serialize_with_a_type_tag() {
        let json = serde_json::to_value(SyncUpdate::Warning {
            message: INCOMPLETE_SYNC_WARNING.to_string(),
        })
        .unwrap();
        assert_eq!(json["type"], "warning");
        assert_eq!(json["message"], "sync may be incomplete");
    }
}
