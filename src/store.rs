//! Timestamped value store.
//!
//! Append-only, per-topic, time-ordered record of samples. Timestamps are
//! treated as a map key: a later write at an equal timestamp replaces the
//! prior value instead of duplicating it. Lookups are nearest-floor
//! ("latest sample with timestamp <= T"), which is what timeline scrubbing
//! needs.
//!
//! The store itself is connection-agnostic; the client facade guards
//! `bulk_load` against use while a live connection is up.

use crate::types::{Sample, Timestamp, Value};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

/// How read queries resolve "now".
///
/// Two explicit variants instead of a boolean plus nullable timestamp, so
/// a non-live cursor without a timestamp is unrepresentable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Queries resolve against the live stream as it arrives.
    Live,
    /// Queries resolve against a frozen point in stored history.
    Playback { timestamp: Timestamp },
}

impl ReadMode {
    pub fn is_live(&self) -> bool {
        matches!(self, ReadMode::Live)
    }
}

/// Per-topic time-indexed history.
pub struct ValueStore {
    // BTreeMap gives O(log n) floor lookups via range().next_back().
    history: RwLock<HashMap<String, BTreeMap<Timestamp, Value>>>,
}

impl ValueStore {
    pub fn new() -> Self {
        Self {
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Record a sample. An equal timestamp for the same topic overwrites
    /// the existing entry; this never fails.
    pub fn append(&self, topic: &str, timestamp: Timestamp, value: Value) {
        let mut history = self.history.write();
        history
            .entry(topic.to_string())
            .or_default()
            .insert(timestamp, value);
    }

    /// Latest value with timestamp <= `timestamp`, or None if the topic
    /// has no entry at or before that time.
    pub fn value_at_or_before(&self, topic: &str, timestamp: Timestamp) -> Option<Value> {
        let history = self.history.read();
        history
            .get(topic)?
            .range(..=timestamp)
            .next_back()
            .map(|(_, v)| v.clone())
    }

    /// Most recent value for a topic.
    pub fn latest(&self, topic: &str) -> Option<Value> {
        let history = self.history.read();
        history
            .get(topic)?
            .iter()
            .next_back()
            .map(|(_, v)| v.clone())
    }

    /// Most recent (timestamp, value) pair for a topic.
    pub fn latest_sample(&self, topic: &str) -> Option<Sample> {
        let history = self.history.read();
        history.get(topic)?.iter().next_back().map(|(t, v)| Sample {
            timestamp: *t,
            value: v.clone(),
        })
    }

    /// Number of stored samples for a topic.
    pub fn sample_count(&self, topic: &str) -> usize {
        self.history.read().get(topic).map_or(0, |m| m.len())
    }

    /// Greatest timestamp stored across all topics.
    pub fn max_timestamp(&self) -> Option<Timestamp> {
        let history = self.history.read();
        history
            .values()
            .filter_map(|m| m.keys().next_back().copied())
            .max()
    }

    /// Topic names with at least one stored sample.
    pub fn topic_names(&self) -> Vec<String> {
        self.history.read().keys().cloned().collect()
    }

    /// Replace a topic's history wholesale. Used by the log importer.
    pub fn bulk_load(&self, topic: &str, samples: BTreeMap<Timestamp, Value>) {
        self.history.write().insert(topic.to_string(), samples);
    }

    /// Drop all stored history.
    pub fn clear(&self) {
        self.history.write().clear();
    }
}

impl Default for ValueStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_floor_lookup_scenario() {
        let store = ValueStore::new();
        store.append("/speed", Timestamp(100), Value::Double(3.0));
        store.append("/speed", Timestamp(200), Value::Double(5.0));

        assert_eq!(
            store.value_at_or_before("/speed", Timestamp(150)),
            Some(Value::Double(3.0))
        );
        assert_eq!(
            store.value_at_or_before("/speed", Timestamp(250)),
            Some(Value::Double(5.0))
        );
        assert_eq!(store.value_at_or_before("/speed", Timestamp(50)), None);
    }

    #[test]
    fn test_exact_timestamp_is_inclusive() {
        let store = ValueStore::new();
        store.append("/t", Timestamp(100), Value::Int(1));
        assert_eq!(
            store.value_at_or_before("/t", Timestamp(100)),
            Some(Value::Int(1))
        );
    }

    #[test]
    fn test_equal_timestamp_overwrites() {
        let store = ValueStore::new();
        store.append("/t", Timestamp(100), Value::Int(1));
        store.append("/t", Timestamp(100), Value::Int(2));

        assert_eq!(store.sample_count("/t"), 1);
        assert_eq!(store.latest("/t"), Some(Value::Int(2)));
    }

    #[test]
    fn test_unknown_topic_returns_none() {
        let store = ValueStore::new();
        assert_eq!(store.value_at_or_before("/missing", Timestamp(100)), None);
        assert_eq!(store.latest("/missing"), None);
    }

    #[test]
    fn test_bulk_load_replaces_history() {
        let store = ValueStore::new();
        store.append("/t", Timestamp(1), Value::Int(1));

        let mut samples = BTreeMap::new();
        samples.insert(Timestamp(10), Value::Int(10));
        samples.insert(Timestamp(20), Value::Int(20));
        store.bulk_load("/t", samples);

        assert_eq!(store.value_at_or_before("/t", Timestamp(5)), None);
        assert_eq!(store.latest("/t"), Some(Value::Int(20)));
        assert_eq!(store.sample_count("/t"), 2);
    }

    #[test]
    fn test_read_mode_variants() {
        assert!(ReadMode::Live.is_live());
        assert!(!ReadMode::Playback {
            timestamp: Timestamp(5)
        }
        .is_live());
    }

    proptest! {
        /// Floor lookup returns the value of the greatest stored timestamp
        /// <= t, regardless of insertion order.
        #[test]
        fn prop_floor_lookup_matches_reference(
            mut entries in proptest::collection::vec((0i64..10_000, any::<i64>()), 1..64),
            query in 0i64..10_000,
        ) {
            let store = ValueStore::new();
            for (ts, v) in &entries {
                store.append("/p", Timestamp(*ts), Value::Int(*v));
            }

            // Reference: last write wins per timestamp, then greatest ts <= query.
            entries.reverse();
            let mut dedup: Vec<(i64, i64)> = Vec::new();
            for (ts, v) in entries {
                if !dedup.iter().any(|(t, _)| *t == ts) {
                    dedup.push((ts, v));
                }
            }
            let expected = dedup
                .iter()
                .filter(|(t, _)| *t <= query)
                .max_by_key(|(t, _)| *t)
                .map(|(_, v)| Value::Int(*v));

            prop_assert_eq!(store.value_at_or_before("/p", Timestamp(query)), expected);
        }
    }
}
