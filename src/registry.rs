//! Topic registry.
//!
//! Authoritative name -> topic mapping, fed by announce/unannounce
//! control messages. Deduplicates by name; the peer-assigned id stays
//! authoritative for value correlation. Change listeners receive a full
//! point-in-time snapshot, not a diff.

use crate::codec::TopicProperties;
use crate::types::{DataType, Topic, TopicId};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Token identifying a registered change listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegistryListenerToken(pub u64);

type SnapshotListener = Arc<dyn Fn(&[Topic]) + Send + Sync>;

struct Inner {
    by_name: HashMap<String, Topic>,
    by_id: HashMap<TopicId, String>,
}

pub struct TopicRegistry {
    inner: RwLock<Inner>,
    listeners: RwLock<HashMap<RegistryListenerToken, SnapshotListener>>,
    next_token: AtomicU64,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                by_name: HashMap::new(),
                by_id: HashMap::new(),
            }),
            listeners: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(1),
        }
    }

    /// Insert-or-update by name. Metadata is last-write-wins; the
    /// announced id becomes authoritative for the name.
    pub fn on_announce(
        &self,
        name: &str,
        id: TopicId,
        type_str: &str,
        properties: TopicProperties,
    ) {
        {
            let mut inner = self.inner.write();
            if let Some(existing) = inner.by_name.get(name) {
                let old_id = existing.id;
                if old_id != id {
                    inner.by_id.remove(&old_id);
                }
            }
            inner.by_id.insert(id, name.to_string());
            inner.by_name.insert(
                name.to_string(),
                Topic {
                    name: name.to_string(),
                    id,
                    data_type: DataType::from_type_string(type_str),
                    properties,
                },
            );
        }
        self.notify();
    }

    /// Remove the topic carrying this peer id. Returns the removed topic.
    pub fn on_unannounce(&self, id: TopicId) -> Option<Topic> {
        let removed = {
            let mut inner = self.inner.write();
            let name = inner.by_id.remove(&id)?;
            inner.by_name.remove(&name)
        };
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Merge a server-side property update into a topic. A null value
    /// deletes the key.
    pub fn on_properties(&self, name: &str, update: &TopicProperties) {
        let changed = {
            let mut inner = self.inner.write();
            match inner.by_name.get_mut(name) {
                Some(topic) => {
                    for (key, value) in update {
                        if value.is_null() {
                            topic.properties.remove(key);
                        } else {
                            topic.properties.insert(key.clone(), value.clone());
                        }
                    }
                    true
                }
                None => false,
            }
        };
        if changed {
            self.notify();
        }
    }

    pub fn find(&self, name: &str) -> Option<Topic> {
        self.inner.read().by_name.get(name).cloned()
    }

    pub fn find_by_id(&self, id: TopicId) -> Option<Topic> {
        let inner = self.inner.read();
        let name = inner.by_id.get(&id)?;
        inner.by_name.get(name).cloned()
    }

    /// Point-in-time copy of all topics. Later registry mutation does not
    /// affect a snapshot already taken.
    pub fn snapshot(&self) -> Vec<Topic> {
        self.inner.read().by_name.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.inner.read().by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.read().by_name.is_empty()
    }

    /// Drop all topics (connection loss, or switching to an imported
    /// recording).
    pub fn clear(&self) {
        {
            let mut inner = self.inner.write();
            inner.by_name.clear();
            inner.by_id.clear();
        }
        self.notify();
    }

    /// Replace the registry contents wholesale. Used by the log importer.
    pub fn bulk_load(&self, topics: Vec<Topic>) {
        {
            let mut inner = self.inner.write();
            inner.by_name.clear();
            inner.by_id.clear();
            for topic in topics {
                inner.by_id.insert(topic.id, topic.name.clone());
                inner.by_name.insert(topic.name.clone(), topic);
            }
        }
        self.notify();
    }

    /// Register a change listener. It is invoked with a fresh snapshot
    /// after every registry mutation.
    pub fn add_listener(
        &self,
        listener: impl Fn(&[Topic]) + Send + Sync + 'static,
    ) -> RegistryListenerToken {
        let token = RegistryListenerToken(self.next_token.fetch_add(1, Ordering::SeqCst));
        self.listeners.write().insert(token, Arc::new(listener));
        token
    }

    pub fn remove_listener(&self, token: RegistryListenerToken) {
        self.listeners.write().remove(&token);
    }

    fn notify(&self) {
        // Snapshot listeners and topics before invoking, so a callback may
        // add or remove listeners without holding any registry lock.
        let listeners: Vec<SnapshotListener> = self.listeners.read().values().cloned().collect();
        if listeners.is_empty() {
            return;
        }
        let topics = self.snapshot();
        for listener in listeners {
            listener(&topics);
        }
    }
}

impl Default for TopicRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_announce_then_unannounce() {
        let registry = TopicRegistry::new();
        registry.on_announce("/speed", TopicId(7), "double", TopicProperties::new());

        let topic = registry.find("/speed").unwrap();
        assert_eq!(topic.id, TopicId(7));
        assert_eq!(topic.data_type, DataType::Double);

        registry.on_unannounce(TopicId(7));
        assert!(registry.find("/speed").is_none());
    }

    #[test]
    fn test_reannounce_updates_in_place() {
        let registry = TopicRegistry::new();
        registry.on_announce("/t", TopicId(1), "int", TopicProperties::new());
        registry.on_announce("/t", TopicId(2), "double", TopicProperties::new());

        assert_eq!(registry.len(), 1);
        let topic = registry.find("/t").unwrap();
        assert_eq!(topic.id, TopicId(2));
        assert!(registry.find_by_id(TopicId(1)).is_none());
        assert_eq!(registry.find_by_id(TopicId(2)).unwrap().name, "/t");
    }

    #[test]
    fn test_properties_merge_and_null_delete() {
        let registry = TopicRegistry::new();
        let mut props = TopicProperties::new();
        props.insert("retained".to_string(), serde_json::Value::Bool(true));
        registry.on_announce("/t", TopicId(1), "int", props);

        let mut update = TopicProperties::new();
        update.insert("retained".to_string(), serde_json::Value::Null);
        update.insert(
            "persistent".to_string(),
            serde_json::Value::Bool(true),
        );
        registry.on_properties("/t", &update);

        let topic = registry.find("/t").unwrap();
        assert!(!topic.properties.contains_key("retained"));
        assert_eq!(topic.properties["persistent"], serde_json::Value::Bool(true));
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_mutation() {
        let registry = TopicRegistry::new();
        registry.on_announce("/a", TopicId(1), "int", TopicProperties::new());

        let snapshot = registry.snapshot();
        registry.on_announce("/b", TopicId(2), "int", TopicProperties::new());

        assert_eq!(snapshot.len(), 1);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_listener_receives_snapshots() {
        let registry = TopicRegistry::new();
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        let token = registry.add_listener(move |topics| {
            seen_clone.store(topics.len(), Ordering::SeqCst);
        });

        registry.on_announce("/a", TopicId(1), "int", TopicProperties::new());
        assert_eq!(seen.load(Ordering::SeqCst), 1);

        registry.on_announce("/b", TopicId(2), "int", TopicProperties::new());
        assert_eq!(seen.load(Ordering::SeqCst), 2);

        registry.remove_listener(token);
        registry.on_unannounce(TopicId(1));
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }
}
