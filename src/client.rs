//! Client facade.
//!
//! One explicit client object owns the connection, registry, store,
//! subscription manager, and clock; nothing is ambient global state, so
//! multiple clients (e.g. in tests) stay isolated. View-layer
//! collaborators consume this surface only.

use crate::clock::ClockSync;
use crate::codec::{ControlMessage, TopicProperties, ValueFrame};
use crate::connection::{Connection, ConnectionStatus, FrameSink};
use crate::error::{ClientError, Result};
use crate::registry::{RegistryListenerToken, TopicRegistry};
use crate::store::{ReadMode, ValueStore};
use crate::subscriptions::{Listener, SubscriptionManager, SubscriptionSpec};
use crate::types::{DataType, Sample, SubscriptionId, Timestamp, Topic, TopicId, Value};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Client configuration.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Client identity, visible to the server in the connection path.
    pub identity: String,

    /// Default requested push period for subscriptions created through
    /// the convenience `subscribe` call.
    pub default_period: Duration,

    /// How often to run a clock-sync exchange while connected.
    pub sync_interval: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            identity: "ntlink".to_string(),
            default_period: Duration::from_millis(100),
            sync_interval: crate::clock::SYNC_INTERVAL,
        }
    }
}

/// Token identifying a connection-status listener.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StatusListenerToken(pub u64);

type StatusListener = Arc<dyn Fn(ConnectionStatus) + Send + Sync>;

struct PublishedTopic {
    pubuid: i64,
    data_type: DataType,
}

struct ClientCore {
    config: ClientConfig,
    registry: TopicRegistry,
    store: ValueStore,
    subscriptions: SubscriptionManager,
    clock: Arc<ClockSync>,
    connection: Mutex<Option<Connection>>,
    /// Distinguishes never-attempted (Idle) from attempted-and-down.
    ever_connected: AtomicBool,
    /// An imported recording is active; the wire is out of the picture.
    recording_mode: AtomicBool,
    mode: RwLock<ReadMode>,
    published: RwLock<HashMap<String, PublishedTopic>>,
    next_pubuid: AtomicI64,
    status_listeners: RwLock<HashMap<StatusListenerToken, StatusListener>>,
    next_status_token: AtomicU64,
}

impl ClientCore {
    fn notify_status(&self, status: ConnectionStatus) {
        let listeners: Vec<StatusListener> =
            self.status_listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(status);
        }
    }

    fn is_live(&self) -> bool {
        self.mode.read().is_live() && !self.recording_mode.load(Ordering::SeqCst)
    }

    /// Best-effort send; drops the messages when no connection is up or
    /// the connection is being replaced. Failures surface only through
    /// the disconnect event, never to the caller.
    fn try_send_control(&self, messages: &[ControlMessage]) {
        match self.connection.try_lock() {
            Some(guard) => {
                if let Some(connection) = guard.as_ref() {
                    connection.send_control(messages);
                } else {
                    debug!("dropping control send: no connection");
                }
            }
            None => debug!("dropping control send: connection busy"),
        }
    }

    fn try_send_value(&self, id: TopicId, timestamp: Timestamp, value: &Value) {
        match self.connection.try_lock() {
            Some(guard) => {
                if let Some(connection) = guard.as_ref() {
                    connection.send_value(id, timestamp, value);
                } else {
                    debug!("dropping value send: no connection");
                }
            }
            None => debug!("dropping value send: connection busy"),
        }
    }

    fn publish_messages(&self) -> Vec<ControlMessage> {
        let published = self.published.read();
        let mut messages: Vec<_> = published
            .iter()
            .map(|(name, entry)| ControlMessage::Publish {
                name: name.clone(),
                type_str: entry.data_type.type_string(),
                pubuid: entry.pubuid,
                properties: TopicProperties::new(),
            })
            .collect();
        messages.sort_by_key(|m| match m {
            ControlMessage::Publish { pubuid, .. } => *pubuid,
            _ => i64::MAX,
        });
        messages
    }

    /// Ingest one window of live value frames from the receive loop.
    fn ingest_values(&self, frames: Vec<ValueFrame>) {
        let mut window: Vec<(String, Sample)> = Vec::with_capacity(frames.len());
        for frame in frames {
            let topic = match self.registry.find_by_id(frame.id) {
                Some(topic) => topic,
                None => {
                    debug!(id = %frame.id, "dropping value for unannounced topic");
                    continue;
                }
            };
            // The wire carries structured payloads as raw bytes; the
            // declared type restores the schema name.
            let value = match (&topic.data_type, frame.value) {
                (DataType::Structured(schema), Value::Raw(data)) => Value::Structured {
                    schema: schema.clone(),
                    data,
                },
                (_, value) => value,
            };
            self.store.append(&topic.name, frame.timestamp, value.clone());
            window.push((
                topic.name,
                Sample {
                    timestamp: frame.timestamp,
                    value,
                },
            ));
        }

        // Samples reach listeners only in live mode; playback reads are
        // driven by cursor movement instead.
        if self.is_live() && !window.is_empty() {
            self.subscriptions.deliver_window(&window);
        }
    }
}

/// Adapter handing transport callbacks to the core without keeping it
/// alive: the connection holds only a weak reference.
struct CoreSink {
    core: Weak<ClientCore>,
}

impl FrameSink for CoreSink {
    fn on_connected(&self) -> Vec<ControlMessage> {
        let Some(core) = self.core.upgrade() else {
            return Vec::new();
        };
        core.notify_status(ConnectionStatus::Connected);

        let mut greeting = core.subscriptions.resubscribe_messages();
        greeting.extend(core.publish_messages());
        greeting
    }

    fn on_disconnected(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        // Topic and clock state die with the connection; subscriptions
        // and publishes survive for re-assertion on reconnect.
        core.registry.clear();
        core.clock.reset();
        core.notify_status(ConnectionStatus::Disconnected);
    }

    fn on_control(&self, messages: Vec<ControlMessage>) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        for message in messages {
            match message {
                ControlMessage::Announce {
                    name,
                    id,
                    type_str,
                    properties,
                    ..
                } => core.registry.on_announce(&name, id, &type_str, properties),
                ControlMessage::Unannounce { id, .. } => {
                    core.registry.on_unannounce(id);
                }
                ControlMessage::Properties { name, update, .. } => {
                    core.registry.on_properties(&name, &update);
                }
                other => debug!(message = ?other, "ignoring unexpected control message"),
            }
        }
    }

    fn on_values(&self, frames: Vec<ValueFrame>) {
        if let Some(core) = self.core.upgrade() {
            core.ingest_values(frames);
        }
    }
}

/// Handle to an active subscription. Unsubscribing drops the listener
/// and, once no subscription references the wire-level pattern, tells
/// the peer.
pub struct SubscriptionHandle {
    core: Weak<ClientCore>,
    id: SubscriptionId,
}

impl SubscriptionHandle {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    pub fn unsubscribe(&self) {
        let Some(core) = self.core.upgrade() else {
            return;
        };
        if let Some(message) = core.subscriptions.unsubscribe(self.id) {
            core.try_send_control(&[message]);
        }
    }
}

/// Summary returned by a recording import.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ImportSummary {
    pub topics: usize,
    pub samples: usize,
    pub skipped: usize,
}

/// The telemetry client.
pub struct NtClient {
    core: Arc<ClientCore>,
}

impl NtClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            core: Arc::new(ClientCore {
                config,
                registry: TopicRegistry::new(),
                store: ValueStore::new(),
                subscriptions: SubscriptionManager::new(),
                clock: Arc::new(ClockSync::new()),
                connection: Mutex::new(None),
                ever_connected: AtomicBool::new(false),
                recording_mode: AtomicBool::new(false),
                mode: RwLock::new(ReadMode::Live),
                published: RwLock::new(HashMap::new()),
                next_pubuid: AtomicI64::new(1),
                status_listeners: RwLock::new(HashMap::new()),
                next_status_token: AtomicU64::new(1),
            }),
        }
    }

    // --- Connection ---

    /// Connect to a server. An existing connection is forcibly
    /// disconnected first; there are never two open transports. Success
    /// or failure is reported through status listeners, not a return
    /// value.
    pub fn connect(&self, address: &str) {
        let core = &self.core;
        core.ever_connected.store(true, Ordering::SeqCst);
        core.recording_mode.store(false, Ordering::SeqCst);
        *core.mode.write() = ReadMode::Live;

        let sink = Arc::new(CoreSink {
            core: Arc::downgrade(core),
        });

        // Join the old transport without holding the connection lock: its
        // I/O thread fires listeners that may query status.
        let old = core.connection.lock().take();
        if let Some(mut old) = old {
            old.disconnect();
        }

        core.notify_status(ConnectionStatus::Connecting);
        let connection = Connection::open(
            address,
            &core.config.identity,
            sink,
            Arc::clone(&core.clock),
            core.config.sync_interval,
        );
        let displaced = core.connection.lock().replace(connection);
        if let Some(mut displaced) = displaced {
            displaced.disconnect();
        }
    }

    /// Close the transport. Idempotent.
    pub fn disconnect(&self) {
        let connection = self.core.connection.lock().take();
        if let Some(mut connection) = connection {
            connection.disconnect();
        }
    }

    pub fn status(&self) -> ConnectionStatus {
        let guard = self.core.connection.lock();
        match guard.as_ref() {
            Some(connection) => connection.status(),
            None => {
                if self.core.ever_connected.load(Ordering::SeqCst) {
                    ConnectionStatus::Disconnected
                } else {
                    ConnectionStatus::Idle
                }
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Register a listener for connection status changes. It is invoked
    /// immediately with the current status, then on every transition.
    pub fn add_status_listener(
        &self,
        listener: impl Fn(ConnectionStatus) + Send + Sync + 'static,
    ) -> StatusListenerToken {
        let token = StatusListenerToken(self.core.next_status_token.fetch_add(1, Ordering::SeqCst));
        let listener: StatusListener = Arc::new(listener);
        listener(self.status());
        self.core.status_listeners.write().insert(token, listener);
        token
    }

    pub fn remove_status_listener(&self, token: StatusListenerToken) {
        self.core.status_listeners.write().remove(&token);
    }

    // --- Topics ---

    /// Point-in-time snapshot of all known topics.
    pub fn topics(&self) -> Vec<Topic> {
        self.core.registry.snapshot()
    }

    pub fn find_topic(&self, name: &str) -> Option<Topic> {
        self.core.registry.find(name)
    }

    /// Register a listener invoked with a full topic snapshot after
    /// every registry change.
    pub fn add_topics_listener(
        &self,
        listener: impl Fn(&[Topic]) + Send + Sync + 'static,
    ) -> RegistryListenerToken {
        self.core.registry.add_listener(listener)
    }

    pub fn remove_topics_listener(&self, token: RegistryListenerToken) {
        self.core.registry.remove_listener(token);
    }

    // --- Subscriptions ---

    /// Subscribe to a single topic by exact name with default options.
    pub fn subscribe(
        &self,
        topic: impl Into<String>,
        listener: impl Fn(&str, &Sample) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let spec = SubscriptionSpec::exact(topic).with_period(self.core.config.default_period);
        self.subscribe_with(spec, listener)
    }

    /// Subscribe with explicit options (prefix matching, send-all,
    /// period, topics-only).
    pub fn subscribe_with(
        &self,
        spec: SubscriptionSpec,
        listener: impl Fn(&str, &Sample) + Send + Sync + 'static,
    ) -> SubscriptionHandle {
        let listener: Listener = Arc::new(listener);
        let (id, message) = self.core.subscriptions.subscribe(spec, listener);
        if let Some(message) = message {
            self.core.try_send_control(&[message]);
        }
        SubscriptionHandle {
            core: Arc::downgrade(&self.core),
            id,
        }
    }

    // --- Publishing ---

    /// Declare a topic this client intends to write. The declaration is
    /// standing intent: it is re-sent after every reconnect, and sending
    /// while disconnected is a logged no-op.
    pub fn publish(&self, name: impl Into<String>, data_type: DataType) -> Result<()> {
        if self.core.recording_mode.load(Ordering::SeqCst) {
            return Err(ClientError::InvalidState(
                "cannot publish while replaying an imported recording".to_string(),
            ));
        }
        let name = name.into();
        let pubuid = {
            let mut published = self.core.published.write();
            if let Some(existing) = published.get(&name) {
                existing.pubuid
            } else {
                let pubuid = self.core.next_pubuid.fetch_add(1, Ordering::SeqCst);
                published.insert(
                    name.clone(),
                    PublishedTopic {
                        pubuid,
                        data_type: data_type.clone(),
                    },
                );
                pubuid
            }
        };
        self.core.try_send_control(&[ControlMessage::Publish {
            name,
            type_str: data_type.type_string(),
            pubuid,
            properties: TopicProperties::new(),
        }]);
        Ok(())
    }

    /// Release a published topic.
    pub fn unpublish(&self, name: &str) {
        let removed = self.core.published.write().remove(name);
        if let Some(entry) = removed {
            self.core.try_send_control(&[ControlMessage::Unpublish {
                pubuid: entry.pubuid,
            }]);
        }
    }

    /// Write a value to a topic previously declared with [`publish`].
    /// Fire-and-forget: transport failures surface only via the
    /// disconnect event.
    ///
    /// [`publish`]: NtClient::publish
    pub fn set_value(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        if self.core.recording_mode.load(Ordering::SeqCst) {
            return Err(ClientError::InvalidState(
                "cannot set values while replaying an imported recording".to_string(),
            ));
        }
        let pubuid = {
            let published = self.core.published.read();
            match published.get(name) {
                Some(entry) => entry.pubuid,
                None => {
                    return Err(ClientError::InvalidState(format!(
                        "topic {} is not published by this client",
                        name
                    )))
                }
            }
        };
        let timestamp = self
            .core
            .clock
            .now_on_peer()
            .unwrap_or_else(Timestamp::local_now);
        self.core
            .try_send_value(TopicId(pubuid), timestamp, &value.into());
        Ok(())
    }

    /// Update server-side properties of a topic.
    pub fn set_properties(&self, name: impl Into<String>, update: TopicProperties) {
        self.core.try_send_control(&[ControlMessage::SetProperties {
            name: name.into(),
            update,
        }]);
    }

    // --- Clock ---

    /// Current time on the peer clock, or None before the first
    /// synchronization. While replaying a recording, the greatest
    /// recorded timestamp stands in for "now".
    pub fn current_peer_time(&self) -> Option<Timestamp> {
        if self.core.recording_mode.load(Ordering::SeqCst) {
            return self.core.store.max_timestamp();
        }
        self.core.clock.now_on_peer()
    }

    /// Peer time of the first successful clock sync after (re)connect;
    /// None until then and again after disconnect.
    pub fn connected_at_peer_time(&self) -> Option<Timestamp> {
        if self.core.recording_mode.load(Ordering::SeqCst) {
            return None;
        }
        self.core.clock.connected_at_peer_time()
    }

    // --- Playback ---

    /// Freeze all read queries and deliveries at `timestamp` and
    /// immediately re-deliver each matching topic's nearest-floor value
    /// to its listeners, without waiting for a wire sample.
    pub fn set_selected_timestamp(&self, timestamp: Timestamp) {
        *self.core.mode.write() = ReadMode::Playback { timestamp };
        self.core.subscriptions.replay_at(&self.core.store, timestamp);
    }

    /// Return to live reads. A no-op while an imported recording is
    /// active (there is no live stream to return to).
    pub fn enable_live_mode(&self) {
        if self.core.recording_mode.load(Ordering::SeqCst) {
            return;
        }
        *self.core.mode.write() = ReadMode::Live;
        if let Some(now) = self.current_peer_time() {
            self.core.subscriptions.replay_at(&self.core.store, now);
        }
    }

    pub fn is_live(&self) -> bool {
        self.core.is_live()
    }

    /// The timestamp read queries currently resolve against: "now" in
    /// live mode, the frozen cursor otherwise.
    pub fn selected_timestamp(&self) -> Option<Timestamp> {
        match *self.core.mode.read() {
            ReadMode::Live => self.current_peer_time(),
            ReadMode::Playback { timestamp } => Some(timestamp),
        }
    }

    // --- History queries ---

    /// Value of a topic as the current read mode sees it: the latest
    /// sample in live mode, the nearest-floor value at the cursor in
    /// playback.
    pub fn current_value(&self, topic: &str) -> Option<Value> {
        match *self.core.mode.read() {
            ReadMode::Live => self.core.store.latest(topic),
            ReadMode::Playback { timestamp } => {
                self.core.store.value_at_or_before(topic, timestamp)
            }
        }
    }

    /// Latest value with timestamp <= `timestamp` for a topic.
    pub fn value_at_or_before(&self, topic: &str, timestamp: Timestamp) -> Option<Value> {
        self.core.store.value_at_or_before(topic, timestamp)
    }

    // --- Recording import ---

    /// Load a recorded session for offline playback, replacing the
    /// registry and store contents. Rejected while a live connection is
    /// up; individually malformed records are skipped and counted.
    pub fn import_recording(&self, source: &str) -> Result<ImportSummary> {
        if self.is_connected() {
            return Err(ClientError::InvalidState(
                "cannot load a recording while connected".to_string(),
            ));
        }
        let parsed = crate::import::parse_recording(source)?;
        let summary = ImportSummary {
            topics: parsed.topics.len(),
            samples: parsed.sample_count(),
            skipped: parsed.skipped,
        };
        parsed.apply(&self.core.registry, &self.core.store);

        self.core.recording_mode.store(true, Ordering::SeqCst);
        let cursor = self.core.store.max_timestamp().unwrap_or(Timestamp(0));
        *self.core.mode.write() = ReadMode::Playback { timestamp: cursor };
        self.core.subscriptions.replay_at(&self.core.store, cursor);

        if summary.skipped > 0 {
            warn!(skipped = summary.skipped, "recording import skipped records");
        }
        Ok(summary)
    }

    /// Whether an imported recording is active.
    pub fn is_replaying_recording(&self) -> bool {
        self.core.recording_mode.load(Ordering::SeqCst)
    }
}

impl Default for NtClient {
    fn default() -> Self {
        Self::new(ClientConfig::default())
    }
}

impl Drop for NtClient {
    fn drop(&mut self) {
        self.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_starts_idle() {
        let client = NtClient::default();
        assert_eq!(client.status(), ConnectionStatus::Idle);
        assert!(!client.is_connected());
    }

    #[test]
    fn test_set_value_unpublished_is_invalid_state() {
        let client = NtClient::default();
        match client.set_value("/nope", 1.0) {
            Err(ClientError::InvalidState(_)) => {}
            other => panic!("Expected invalid state, got {:?}", other),
        }
    }

    #[test]
    fn test_publish_registers_standing_intent_while_offline() {
        let client = NtClient::default();
        client.publish("/cmd", DataType::Double).unwrap();
        // Offline: the send is a no-op, but set_value now has a pubuid.
        client.set_value("/cmd", 2.0).unwrap();
        client.unpublish("/cmd");
        assert!(client.set_value("/cmd", 2.0).is_err());
    }

    #[test]
    fn test_import_rejected_in_recording_mode_operations() {
        let client = NtClient::default();
        let summary = client
            .import_recording(
                r#"{"topics": {"/t": {"type": "int", "samples": {"5": 1}}}}"#,
            )
            .unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                topics: 1,
                samples: 1,
                skipped: 0
            }
        );
        assert!(client.is_replaying_recording());
        assert!(!client.is_live());
        assert!(client.publish("/x", DataType::Int).is_err());
        assert!(client.set_value("/t", 5i64).is_err());
        // "Now" in recording mode is the end of the recording.
        assert_eq!(client.current_peer_time(), Some(Timestamp(5)));
        assert_eq!(client.connected_at_peer_time(), None);
    }

    #[test]
    fn test_enable_live_mode_noop_during_recording() {
        let client = NtClient::default();
        client
            .import_recording(r#"{"topics": {"/t": {"type": "int", "samples": {"5": 1}}}}"#)
            .unwrap();
        client.enable_live_mode();
        assert!(!client.is_live());
    }
}
