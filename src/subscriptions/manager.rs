//! Subscription manager: id allocation, wire coalescing, fan-out.

use crate::codec::{ControlMessage, SubscriptionOptions};
use crate::store::ValueStore;
use crate::types::{Sample, SubscriptionId, Timestamp};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use super::types::{Listener, SubscriptionSpec};

/// Wire-level identity of a subscription: identical parameter sets share
/// one server-side subscription.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
struct WireKey {
    patterns: Vec<String>,
    prefix_mode: bool,
    send_all: bool,
    period_micros: u64,
    topics_only: bool,
}

impl WireKey {
    fn from_spec(spec: &SubscriptionSpec) -> Self {
        let mut patterns = spec.patterns.clone();
        patterns.sort();
        Self {
            patterns,
            prefix_mode: spec.prefix_mode,
            send_all: spec.send_all,
            period_micros: spec.period.as_micros() as u64,
            topics_only: spec.topics_only,
        }
    }
}

struct WireSub {
    subuid: i64,
    refcount: usize,
}

struct Subscription {
    spec: SubscriptionSpec,
    listener: Listener,
    wire_key: WireKey,
}

/// Fans incoming samples out to the listeners registered against
/// matching subscriptions.
pub struct SubscriptionManager {
    subscriptions: RwLock<HashMap<SubscriptionId, Subscription>>,
    wire: RwLock<HashMap<WireKey, WireSub>>,
    next_id: AtomicU64,
    next_subuid: AtomicI64,
}

impl SubscriptionManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            wire: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            next_subuid: AtomicI64::new(1),
        }
    }

    /// Register a subscription. Every call yields a distinct id; the
    /// returned control message is Some only when this parameter set is
    /// not already on the wire.
    pub fn subscribe(
        &self,
        spec: SubscriptionSpec,
        listener: Listener,
    ) -> (SubscriptionId, Option<ControlMessage>) {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let key = WireKey::from_spec(&spec);

        let message = {
            let mut wire = self.wire.write();
            match wire.get_mut(&key) {
                Some(entry) => {
                    entry.refcount += 1;
                    None
                }
                None => {
                    let subuid = self.next_subuid.fetch_add(1, Ordering::SeqCst);
                    wire.insert(
                        key.clone(),
                        WireSub {
                            subuid,
                            refcount: 1,
                        },
                    );
                    Some(Self::subscribe_message(&key, subuid))
                }
            }
        };

        self.subscriptions.write().insert(
            id,
            Subscription {
                spec,
                listener,
                wire_key: key,
            },
        );

        (id, message)
    }

    /// Remove a subscription and its listener. The returned control
    /// message is Some once no subscription references the wire-level
    /// parameter set anymore.
    pub fn unsubscribe(&self, id: SubscriptionId) -> Option<ControlMessage> {
        let sub = self.subscriptions.write().remove(&id)?;

        let mut wire = self.wire.write();
        let entry = wire.get_mut(&sub.wire_key)?;
        entry.refcount -= 1;
        if entry.refcount == 0 {
            let subuid = entry.subuid;
            wire.remove(&sub.wire_key);
            return Some(ControlMessage::Unsubscribe { subuid });
        }
        None
    }

    /// Subscribe messages for every standing wire subscription. Sent as a
    /// batch after a successful reconnect to re-assert intent.
    pub fn resubscribe_messages(&self) -> Vec<ControlMessage> {
        let wire = self.wire.read();
        let mut messages: Vec<_> = wire
            .iter()
            .map(|(key, entry)| Self::subscribe_message(key, entry.subuid))
            .collect();
        // Stable order keeps reconnect traffic deterministic.
        messages.sort_by_key(|m| match m {
            ControlMessage::Subscribe { subuid, .. } => *subuid,
            _ => i64::MAX,
        });
        messages
    }

    pub fn subscription_count(&self) -> usize {
        self.subscriptions.read().len()
    }

    pub fn wire_subscription_count(&self) -> usize {
        self.wire.read().len()
    }

    /// Deliver one window of live samples.
    ///
    /// All frames decoded from one binary transport message form one
    /// window. `send_all` subscriptions receive every matching sample in
    /// arrival order; the rest receive only the last matching sample per
    /// topic. Listeners are snapshotted before invocation, so a callback
    /// may subscribe or unsubscribe without affecting this pass.
    pub fn deliver_window(&self, window: &[(String, Sample)]) {
        let targets: Vec<(SubscriptionSpec, Listener)> = {
            let subs = self.subscriptions.read();
            subs.values()
                .filter(|s| !s.spec.topics_only)
                .map(|s| (s.spec.clone(), s.listener.clone()))
                .collect()
        };

        for (spec, listener) in &targets {
            if spec.send_all {
                for (topic, sample) in window {
                    if spec.matches(topic) {
                        listener(topic, sample);
                    }
                }
            } else {
                // Last matching sample per topic within the window.
                let mut last: HashMap<&str, &Sample> = HashMap::new();
                for (topic, sample) in window {
                    if spec.matches(topic) {
                        last.insert(topic.as_str(), sample);
                    }
                }
                for (topic, sample) in last {
                    listener(topic, sample);
                }
            }
        }
    }

    /// Push the nearest-floor value at `timestamp` for every stored topic
    /// to every matching listener. Used when the playback cursor moves;
    /// no wire sample is involved.
    pub fn replay_at(&self, store: &ValueStore, timestamp: Timestamp) {
        let targets: Vec<(SubscriptionSpec, Listener)> = {
            let subs = self.subscriptions.read();
            subs.values()
                .filter(|s| !s.spec.topics_only)
                .map(|s| (s.spec.clone(), s.listener.clone()))
                .collect()
        };
        if targets.is_empty() {
            return;
        }

        for topic in store.topic_names() {
            let matching: Vec<&Listener> = targets
                .iter()
                .filter(|(spec, _)| spec.matches(&topic))
                .map(|(_, l)| l)
                .collect();
            if matching.is_empty() {
                continue;
            }
            if let Some(value) = store.value_at_or_before(&topic, timestamp) {
                let sample = Sample { timestamp, value };
                for listener in matching {
                    listener(&topic, &sample);
                }
            }
        }
    }

    fn subscribe_message(key: &WireKey, subuid: i64) -> ControlMessage {
        ControlMessage::Subscribe {
            topics: key.patterns.clone(),
            subuid,
            options: SubscriptionOptions {
                all: key.send_all,
                prefix: key.prefix_mode,
                periodic: key.period_micros as f64 / 1_000_000.0,
                topicsonly: key.topics_only,
            },
        }
    }
}

impl Default for SubscriptionManager {
    fn default() -> Self {
        Self::new()
    }
}
