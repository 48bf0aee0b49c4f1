//! Offline end-to-end tests: recording import, playback cursor, and
//! subscription re-delivery, all through the public client surface.

use ntlink::{
    ClientError, ConnectionStatus, DataType, ImportSummary, NtClient, SubscriptionSpec, Timestamp,
    Value,
};
use parking_lot::Mutex;
use std::sync::Arc;

const RECORDING: &str = r#"{
    "topics": {
        "/speed": {
            "type": "double",
            "samples": { "100": 3.0, "200": 5.0 }
        },
        "/a/b": {
            "type": "int",
            "samples": { "100": 1, "150": 2, "300": 3 }
        },
        "/c": {
            "type": "boolean",
            "samples": { "100": true }
        }
    }
}"#;

fn collector() -> (
    Arc<Mutex<Vec<(String, Value)>>>,
    impl Fn(&str, &ntlink::Sample) + Send + Sync + 'static,
) {
    let seen: Arc<Mutex<Vec<(String, Value)>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = Arc::clone(&seen);
    let listener = move |topic: &str, sample: &ntlink::Sample| {
        seen_clone.lock().push((topic.to_string(), sample.value.clone()));
    };
    (seen, listener)
}

#[test]
fn import_populates_topics_and_history() {
    let client = NtClient::default();
    let summary = client.import_recording(RECORDING).unwrap();
    assert_eq!(
        summary,
        ImportSummary {
            topics: 3,
            samples: 6,
            skipped: 0
        }
    );

    let mut names: Vec<String> = client.topics().into_iter().map(|t| t.name).collect();
    names.sort();
    assert_eq!(names, ["/a/b", "/c", "/speed"]);
    assert_eq!(
        client.find_topic("/speed").unwrap().data_type,
        DataType::Double
    );

    assert_eq!(
        client.value_at_or_before("/speed", Timestamp(150)),
        Some(Value::Double(3.0))
    );
    assert_eq!(
        client.value_at_or_before("/speed", Timestamp(250)),
        Some(Value::Double(5.0))
    );
    assert_eq!(client.value_at_or_before("/speed", Timestamp(50)), None);
}

#[test]
fn import_skips_malformed_records_without_raising() {
    let source = r#"{
        "topics": {
            "/t": {
                "type": "double",
                "samples": {
                    "1": 1.0, "2": 2.0, "3": 3.0, "4": 4.0, "5": 5.0,
                    "6": 6.0, "7": 7.0, "8": 8.0, "9": 9.0,
                    "10": "not-a-double"
                }
            }
        }
    }"#;
    let client = NtClient::default();
    let summary = client.import_recording(source).unwrap();
    assert_eq!(summary.samples, 9);
    assert_eq!(summary.skipped, 1);
}

#[test]
fn unreadable_recording_leaves_prior_state_untouched() {
    let client = NtClient::default();
    client.import_recording(RECORDING).unwrap();

    match client.import_recording("{ definitely not json") {
        Err(ClientError::Import(_)) => {}
        other => panic!("Expected import error, got {:?}", other),
    }

    // The earlier import is still fully queryable.
    assert_eq!(client.topics().len(), 3);
    assert_eq!(
        client.value_at_or_before("/speed", Timestamp(250)),
        Some(Value::Double(5.0))
    );
}

#[test]
fn cursor_movement_redelivers_floor_values() {
    let client = NtClient::default();
    let (seen, listener) = collector();
    client.subscribe("/speed", listener);

    client.import_recording(RECORDING).unwrap();
    // Import parks the cursor at the end of the recording and replays.
    assert_eq!(
        seen.lock().last(),
        Some(&("/speed".to_string(), Value::Double(5.0)))
    );

    seen.lock().clear();
    client.set_selected_timestamp(Timestamp(150));
    assert_eq!(
        seen.lock().as_slice(),
        &[("/speed".to_string(), Value::Double(3.0))]
    );

    // Before the first sample: nothing to deliver for this topic.
    seen.lock().clear();
    client.set_selected_timestamp(Timestamp(50));
    assert!(seen.lock().is_empty());
}

#[test]
fn prefix_subscription_replays_matching_topics_only() {
    let client = NtClient::default();
    let (seen, listener) = collector();
    client.subscribe_with(SubscriptionSpec::prefix("/a/"), listener);

    client.import_recording(RECORDING).unwrap();
    seen.lock().clear();

    client.set_selected_timestamp(Timestamp(200));
    let seen = seen.lock();
    assert_eq!(seen.as_slice(), &[("/a/b".to_string(), Value::Int(2))]);
}

#[test]
fn current_value_follows_read_mode() {
    let client = NtClient::default();
    client.import_recording(RECORDING).unwrap();

    // Import mode: cursor at end of recording.
    assert_eq!(client.current_value("/a/b"), Some(Value::Int(3)));
    assert_eq!(client.selected_timestamp(), Some(Timestamp(300)));

    client.set_selected_timestamp(Timestamp(160));
    assert_eq!(client.current_value("/a/b"), Some(Value::Int(2)));
    assert_eq!(client.selected_timestamp(), Some(Timestamp(160)));
}

#[test]
fn recording_mode_blocks_live_operations() {
    let client = NtClient::default();
    client.import_recording(RECORDING).unwrap();

    assert!(!client.is_live());
    assert!(matches!(
        client.publish("/x", DataType::Int),
        Err(ClientError::InvalidState(_))
    ));
    client.enable_live_mode();
    assert!(!client.is_live(), "live mode unavailable during a recording");
}

#[test]
fn status_stays_idle_until_first_connect() {
    let client = NtClient::default();
    assert_eq!(client.status(), ConnectionStatus::Idle);
    client.import_recording(RECORDING).unwrap();
    // Importing a recording is not a connection attempt.
    assert_eq!(client.status(), ConnectionStatus::Idle);
    client.disconnect();
    assert_eq!(client.status(), ConnectionStatus::Idle);
}

#[test]
fn unsubscribe_stops_replay_delivery() {
    let client = NtClient::default();
    let (seen, listener) = collector();
    let handle = client.subscribe("/speed", listener);

    client.import_recording(RECORDING).unwrap();
    seen.lock().clear();

    handle.unsubscribe();
    client.set_selected_timestamp(Timestamp(150));
    assert!(seen.lock().is_empty());
}

#[test]
fn two_clients_are_isolated() {
    let a = NtClient::default();
    let b = NtClient::default();

    a.import_recording(RECORDING).unwrap();
    assert_eq!(a.topics().len(), 3);
    assert!(b.topics().is_empty());
    assert!(!b.is_replaying_recording());
}
