//! Subscription bookkeeping shared between a connection and its event loop
//!
//! Several subscriptions may use the same filter. The broker only sees one
//! SUBSCRIBE per filter, and the filter is dropped at the broker once its
//! last local subscription goes away.
//!
//! Delivery is by topic match: every PUBLISH the broker sends reaches each
//! local subscription whose filter matches it. With overlapping filters a
//! broker may send one copy per matching broker subscription (MQTT v5 allows
//! either behavior), and then a local subscription sees each of those copies.
//! Handlers that subscribe overlapping filters must tolerate duplicates.

use super::connection::topic_matches;
use crate::transport::{Message, SubscriptionId};
use std::collections::BTreeMap;
use tokio::sync::mpsc;

#[derive(Debug)]
struct Entry {
    filter: String,
    sink: mpsc::Sender<Message>,
}

/// Local subscriptions keyed by id
#[derive(Debug, Default)]
pub struct SubscriptionTable {
    entries: BTreeMap<SubscriptionId, Entry>,
    next_id: u64,
}

impl SubscriptionTable {
    /// Record a subscription; returns its id and whether the filter is new
    pub fn insert(&mut self, filter: &str, sink: mpsc::Sender<Message>) -> (SubscriptionId, bool) {
        let first_for_filter = !self.filter_in_use(filter);
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.entries.insert(
            id,
            Entry {
                filter: filter.to_string(),
                sink,
            },
        );
        (id, first_for_filter)
    }

    /// Remove a subscription; returns its filter and whether it was the last user
    pub fn remove(&mut self, id: SubscriptionId) -> Option<(String, bool)> {
        let entry = self.entries.remove(&id)?;
        let last_for_filter = !self.filter_in_use(&entry.filter);
        Some((entry.filter, last_for_filter))
    }

    pub fn filter_in_use(&self, filter: &str) -> bool {
        self.entries.values().any(|entry| entry.filter == filter)
    }

    /// Distinct filters, for resubscribing after a reconnect
    pub fn filters(&self) -> Vec<String> {
        let mut filters: Vec<String> = self.entries.values().map(|e| e.filter.clone()).collect();
        filters.sort();
        filters.dedup();
        filters
    }

    /// Sinks whose filter matches `topic`, one entry per local subscription
    pub fn sinks_for(&self, topic: &str) -> Vec<mpsc::Sender<Message>> {
        self.entries
            .values()
            .filter(|entry| topic_matches(&entry.filter, topic))
            .map(|entry| entry.sink.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> mpsc::Sender<Message> {
        mpsc::channel(1).0
    }

    #[test]
    fn test_shared_filter_is_subscribed_once() {
        let mut table = SubscriptionTable::default();

        let (first, new_a) = table.insert("a/+", sink());
        let (second, new_b) = table.insert("a/+", sink());

        assert!(new_a);
        assert!(!new_b);
        assert_ne!(first, second);
        assert_eq!(table.filters(), vec!["a/+"]);

        assert_eq!(table.remove(first), Some(("a/+".to_string(), false)));
        assert_eq!(table.remove(second), Some(("a/+".to_string(), true)));
        assert!(table.is_empty());
    }

    #[test]
    fn test_remove_unknown_id() {
        let mut table = SubscriptionTable::default();
        assert_eq!(table.remove(SubscriptionId(7)), None);
    }

    #[test]
    fn test_sinks_for_matching_topic() {
        let mut table = SubscriptionTable::default();
        table.insert("sensors/#", sink());
        table.insert("sensors/+/temp", sink());
        table.insert("alerts", sink());

        assert_eq!(table.sinks_for("sensors/kitchen/temp").len(), 2);
        assert_eq!(table.sinks_for("alerts").len(), 1);
        assert!(table.sinks_for("other").is_empty());
    }

    #[test]
    fn test_ids_never_reused() {
        let mut table = SubscriptionTable::default();
        let (first, _) = table.insert("a", sink());
        table.remove(first);
        let (second, _) = table.insert("a", sink());
        assert_ne!(first, second);
    }
}
