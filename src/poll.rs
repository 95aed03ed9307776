//! The poll engine.
//!
//! Each cycle fetches the feed, works out which items have not been delivered
//! yet, hands them to the sink oldest first and records every success in the
//! [`StateStore`] before moving on to the next item.
//!
//! ## For contributors
//!
//! The invariant is "recorded implies delivered": state is only touched after
//! the sink acknowledged an item, and it is saved right away, so a crash can
//! lose at most the in-flight item's record.  Failed items are simply left
//! unrecorded and come back on the next cycle while they are still in the
//! feed window.  There is no retry limit or backoff.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::sink::{DeliveryError, DeliverySink};
use crate::source::{DataSource, FeedItem};
use crate::state::{DeliveryState, StateStore};

/// What one cycle did.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleReport {
    /// Items returned by the source.
    pub fetched: usize,
    /// Items that were not yet delivered when the cycle started.
    pub novel: usize,
    pub delivered: usize,
    pub failed: usize,
}

pub struct Engine {
    source: Box<dyn DataSource>,
    sink: Box<dyn DeliverySink>,
    store: StateStore,
    state: DeliveryState,
    username: String,
    interval: Duration,
}

impl Engine {
    /// Build an engine, loading the persisted state once.
    pub fn new(
        source: Box<dyn DataSource>,
        sink: Box<dyn DeliverySink>,
        store: StateStore,
        username: impl Into<String>,
        interval: Duration,
    ) -> Self {
        let state = store.load();
        debug!(
            last_guid = ?state.last_guid,
            history = state.sent_guids.len(),
            "loaded delivery state"
        );
        if !sink.enabled() {
            warn!(sink = sink.name(), "delivery is not configured; every item will fail");
        }
        Self {
            source,
            sink,
            store,
            state,
            username: username.into(),
            interval,
        }
    }

    pub fn state(&self) -> &DeliveryState {
        &self.state
    }

    /// Poll forever: one cycle, then sleep for the configured interval.
    pub async fn run(mut self) {
        info!(
            source = self.source.name(),
            interval_secs = self.interval.as_secs(),
            "polling feed"
        );

        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.interval).await;
        }
    }

    /// Run a single fetch-evaluate-deliver pass.
    pub async fn run_cycle(&mut self) -> CycleReport {
        let mut report = CycleReport::default();

        let items = match self.source.fetch().await {
            Ok(items) => items,
            Err(e) => {
                warn!(source = self.source.name(), error = %e, "feed fetch failed");
                return report;
            }
        };
        report.fetched = items.len();
        if items.is_empty() {
            debug!(source = self.source.name(), "feed returned no items");
            return report;
        }

        let novel = self.novel_items(items);
        report.novel = novel.len();
        if novel.is_empty() {
            return report;
        }
        info!(count = novel.len(), "found new items");

        for (id, item) in novel {
            // The same identifier can appear twice in one window.
            if !self.state.is_novel(&id) {
                continue;
            }
            if self.deliver(&id, &item).await {
                report.delivered += 1;
            } else {
                report.failed += 1;
            }
        }

        report
    }

    /// Feeds list newest first; return the undelivered items oldest first,
    /// paired with their identifiers.
    fn novel_items(&self, items: Vec<FeedItem>) -> Vec<(String, FeedItem)> {
        items
            .into_iter()
            .rev()
            .filter_map(|item| {
                let Some(id) = item.identifier().map(String::from) else {
                    debug!(?item, "skipping item without identifier");
                    return None;
                };
                self.state.is_novel(&id).then_some((id, item))
            })
            .collect()
    }

    async fn deliver(&mut self, id: &str, item: &FeedItem) -> bool {
        let text = item.format_message(&self.username);

        match self.sink.send(&text).await {
            Ok(()) => {
                self.state.record_delivery(id);
                if let Err(e) = self.store.save(&self.state) {
                    error!(
                        path = %self.store.path().display(),
                        error = %e,
                        "failed to persist delivery state"
                    );
                }
                info!(guid = id, "delivered");
                true
            }
            Err(e @ DeliveryError::NotConfigured(_)) => {
                error!(sink = self.sink.name(), guid = id, error = %e, "cannot deliver");
                false
            }
            Err(e) => {
                warn!(sink = self.sink.name(), guid = id, error = %e, "delivery failed, will retry");
                false
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    use std::collections::{HashSet, VecDeque};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::source::FetchError;

    /// Serves queued fetch results; repeats the last one once the queue is
    /// down to a single entry.
    struct ScriptedSource {
        results: Mutex<VecDeque<Result<Vec<FeedItem>, u16>>>,
    }

    impl ScriptedSource {
        fn new(results: Vec<Result<Vec<FeedItem>, u16>>) -> Self {
            Self {
                results: Mutex::new(results.into()),
            }
        }

        fn always(items: Vec<FeedItem>) -> Self {
            Self::new(vec![Ok(items)])
        }
    }

    #[async_trait]
    impl DataSource for ScriptedSource {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn fetch(&self) -> Result<Vec<FeedItem>, FetchError> {
            let mut results = self.results.lock().unwrap();
            let next = if results.len() > 1 {
                results.pop_front().unwrap()
            } else {
                results.front().cloned().unwrap_or(Ok(Vec::new()))
            };
            next.map_err(FetchError::Status)
        }
    }

    /// Records the summary line of every delivered message and fails the
    /// ones listed in `failing`.
    #[derive(Clone, Default)]
    struct RecordingSink {
        delivered: Arc<Mutex<Vec<String>>>,
        failing: Arc<Mutex<HashSet<String>>>,
        attempts: Arc<Mutex<usize>>,
        enabled_checks: Arc<Mutex<usize>>,
        unconfigured: bool,
    }

    impl RecordingSink {
        fn delivered(&self) -> Vec<String> {
            self.delivered.lock().unwrap().clone()
        }

        fn fail(&self, id: &str) {
            self.failing.lock().unwrap().insert(id.to_string());
        }

        fn recover(&self, id: &str) {
            self.failing.lock().unwrap().remove(id);
        }
    }

    #[async_trait]
    impl DeliverySink for RecordingSink {
        fn name(&self) -> &'static str {
            "recording"
        }

        fn enabled(&self) -> bool {
            *self.enabled_checks.lock().unwrap() += 1;
            !self.unconfigured
        }

        async fn send(&self, text: &str) -> Result<(), DeliveryError> {
            *self.attempts.lock().unwrap() += 1;
            if self.unconfigured {
                return Err(DeliveryError::NotConfigured("test"));
            }
            // Message layout puts the summary on the fourth line.
            let id = text.lines().nth(3).unwrap_or_default().to_string();
            if self.failing.lock().unwrap().contains(&id) {
                return Err(DeliveryError::Rejected {
                    description: "scripted failure".into(),
                });
            }
            self.delivered.lock().unwrap().push(id);
            Ok(())
        }
    }

    fn item(id: &str) -> FeedItem {
        FeedItem {
            id: Some(id.to_string()),
            summary: Some(id.to_string()),
            ..FeedItem::default()
        }
    }

    /// Items listed newest first, the way feeds serve them.
    fn feed(ids: &[&str]) -> Vec<FeedItem> {
        ids.iter().map(|id| item(id)).collect()
    }

    fn engine(source: ScriptedSource, sink: &RecordingSink, store: &StateStore) -> Engine {
        Engine::new(
            Box::new(source),
            Box::new(sink.clone()),
            store.clone(),
            "tester",
            Duration::from_secs(15),
        )
    }

    fn temp_store() -> (tempfile::TempDir, StateStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = StateStore::new(dir.path().join("state.json"));
        (dir, store)
    }

    #[tokio::test]
    async fn first_cycle_flushes_whole_feed_oldest_first() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let mut engine = engine(ScriptedSource::always(feed(&["A", "B", "C"])), &sink, &store);

        let report = engine.run_cycle().await;

        assert_eq!(sink.delivered(), vec!["C", "B", "A"]);
        assert_eq!(engine.state().last_guid.as_deref(), Some("A"));
        assert_eq!(
            report,
            CycleReport {
                fetched: 3,
                novel: 3,
                delivered: 3,
                failed: 0
            }
        );
    }

    #[tokio::test]
    async fn only_unseen_items_are_delivered() {
        let (_dir, store) = temp_store();
        store
            .save(&DeliveryState {
                last_guid: Some("B".into()),
                sent_guids: vec!["A".into(), "B".into()],
            })
            .unwrap();
        let sink = RecordingSink::default();
        let mut engine = engine(ScriptedSource::always(feed(&["C", "B", "A"])), &sink, &store);

        engine.run_cycle().await;

        assert_eq!(sink.delivered(), vec!["C"]);
        assert_eq!(engine.state().last_guid.as_deref(), Some("C"));
        assert_eq!(engine.state().sent_guids, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn nothing_is_delivered_twice_across_cycles() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let source = ScriptedSource::new(vec![
            Ok(feed(&["B", "A"])),
            Ok(feed(&["C", "B", "A"])),
            Ok(feed(&["D", "C", "B"])),
        ]);
        let mut engine = engine(source, &sink, &store);

        for _ in 0..4 {
            engine.run_cycle().await;
        }

        assert_eq!(sink.delivered(), vec!["A", "B", "C", "D"]);
    }

    #[tokio::test]
    async fn failed_delivery_is_not_recorded_and_retried_next_cycle() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        sink.fail("B");
        let mut engine = engine(ScriptedSource::always(feed(&["C", "B", "A"])), &sink, &store);

        let report = engine.run_cycle().await;
        assert_eq!(report.delivered, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(sink.delivered(), vec!["A", "C"], "later items still attempted");
        assert_eq!(engine.state().last_guid.as_deref(), Some("C"));
        assert!(!engine.state().sent_guids.contains(&"B".to_string()));
        assert_eq!(store.load(), *engine.state());

        sink.recover("B");
        let report = engine.run_cycle().await;
        assert_eq!(report.delivered, 1);
        assert_eq!(sink.delivered(), vec!["A", "C", "B"]);
        assert_eq!(engine.state().last_guid.as_deref(), Some("B"));
    }

    #[tokio::test]
    async fn fetch_failure_skips_cycle_without_touching_state() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let source = ScriptedSource::new(vec![Err(502), Ok(feed(&["A"]))]);
        let mut engine = engine(source, &sink, &store);

        let report = engine.run_cycle().await;
        assert_eq!(report, CycleReport::default());
        assert!(sink.delivered().is_empty());
        assert!(!store.path().exists());

        engine.run_cycle().await;
        assert_eq!(sink.delivered(), vec!["A"]);
    }

    #[tokio::test]
    async fn empty_feed_is_a_noop() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let mut engine = engine(ScriptedSource::always(Vec::new()), &sink, &store);

        assert_eq!(engine.run_cycle().await, CycleReport::default());
        assert_eq!(*engine.state(), DeliveryState::default());
    }

    #[tokio::test]
    async fn state_survives_restart() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let mut first = engine(ScriptedSource::always(feed(&["B", "A"])), &sink, &store);
        first.run_cycle().await;
        drop(first);

        let mut second = engine(ScriptedSource::always(feed(&["C", "B", "A"])), &sink, &store);
        second.run_cycle().await;

        assert_eq!(sink.delivered(), vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn items_without_identifier_are_skipped() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let anonymous = FeedItem {
            summary: Some("anon".into()),
            ..FeedItem::default()
        };
        let items = vec![item("B"), anonymous, item("A")];
        let mut engine = engine(ScriptedSource::always(items), &sink, &store);

        let report = engine.run_cycle().await;

        assert_eq!(report.fetched, 3);
        assert_eq!(report.novel, 2);
        assert_eq!(sink.delivered(), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn repeated_identifier_in_one_feed_is_delivered_once() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let mut engine = engine(ScriptedSource::always(feed(&["B", "A", "B"])), &sink, &store);

        engine.run_cycle().await;

        assert_eq!(sink.delivered(), vec!["B", "A"]);
    }

    #[tokio::test]
    async fn history_is_capped_after_many_deliveries() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink::default();
        let ids: Vec<String> = (0..201).rev().map(|i| format!("g{i}")).collect();
        let items = ids.iter().map(|id| item(id)).collect();
        let mut engine = engine(ScriptedSource::always(items), &sink, &store);

        let report = engine.run_cycle().await;

        assert_eq!(report.delivered, 201);
        let state = store.load();
        assert_eq!(state.sent_guids.len(), crate::state::MAX_SENT_GUIDS);
        assert_eq!(state.sent_guids[0], "g1", "first delivery evicted");
        assert_eq!(state.last_guid.as_deref(), Some("g200"));
    }

    #[tokio::test]
    async fn unconfigured_sink_fails_every_item_and_records_nothing() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink {
            unconfigured: true,
            ..RecordingSink::default()
        };
        let mut engine = engine(ScriptedSource::always(feed(&["B", "A"])), &sink, &store);

        let report = engine.run_cycle().await;

        assert_eq!(report.failed, 2);
        assert_eq!(*sink.attempts.lock().unwrap(), 2);
        assert_eq!(*engine.state(), DeliveryState::default());
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn save_failure_keeps_delivery_recorded_in_memory() {
        let dir = tempfile::tempdir().unwrap();
        // The store's parent is a regular file, so every save fails.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let store = StateStore::new(blocker.join("state.json"));
        let sink = RecordingSink::default();
        let mut engine = engine(ScriptedSource::always(feed(&["A"])), &sink, &store);

        let first = engine.run_cycle().await;
        let second = engine.run_cycle().await;

        assert_eq!(first.delivered, 1);
        assert_eq!(second.novel, 0);
        assert_eq!(sink.delivered(), vec!["A"], "sent exactly once");
        assert_eq!(engine.state().last_guid.as_deref(), Some("A"));
    }

    #[tokio::test]
    async fn sink_configuration_is_checked_at_construction() {
        let (_dir, store) = temp_store();
        let sink = RecordingSink {
            unconfigured: true,
            ..RecordingSink::default()
        };
        let _engine = engine(ScriptedSource::always(Vec::new()), &sink, &store);

        assert_eq!(*sink.enabled_checks.lock().unwrap(), 1);
    }
}
