//! Log importer.
//!
//! Bulk-loads a previously recorded session into the topic registry and
//! value store, enabling offline playback without a live connection.
//!
//! The recording is a JSON table mapping topic name to its declared type
//! and a timestamp -> value map:
//!
//! ```json
//! {
//!   "topics": {
//!     "/speed": { "type": "double", "samples": { "100": 3.0, "200": 5.0 } }
//!   }
//! }
//! ```
//!
//! Parsing is all-or-nothing at the import-call granularity: a
//! structurally unreadable source fails with `ImportError` and leaves
//! prior state untouched. Individually malformed records (bad timestamp
//! key, value not matching the declared type) are skipped and counted.

use crate::error::{ClientError, Result};
use crate::registry::TopicRegistry;
use crate::store::ValueStore;
use crate::types::{DataType, Timestamp, Topic, TopicId, Value};
use std::collections::{BTreeMap, HashMap};
use std::io::Read;
use std::path::Path;
use tracing::warn;

/// A fully parsed recording, staged before commit.
#[derive(Debug)]
pub struct ParsedRecording {
    pub topics: Vec<Topic>,
    pub samples: HashMap<String, BTreeMap<Timestamp, Value>>,
    /// Individually malformed records that were skipped.
    pub skipped: usize,
}

impl ParsedRecording {
    /// Total number of staged samples.
    pub fn sample_count(&self) -> usize {
        self.samples.values().map(|m| m.len()).sum()
    }

    /// Commit into the registry and store, replacing their contents.
    pub fn apply(self, registry: &TopicRegistry, store: &ValueStore) {
        store.clear();
        for (name, samples) in self.samples {
            store.bulk_load(&name, samples);
        }
        registry.bulk_load(self.topics);
    }
}

/// Parse a recording from a JSON string.
pub fn parse_recording(source: &str) -> Result<ParsedRecording> {
    let root: serde_json::Value = serde_json::from_str(source)
        .map_err(|e| ClientError::Import(format!("unreadable recording: {}", e)))?;
    let table = root
        .get("topics")
        .and_then(|t| t.as_object())
        .ok_or_else(|| ClientError::Import("recording has no topics table".to_string()))?;

    let mut topics = Vec::new();
    let mut samples = HashMap::new();
    let mut skipped = 0usize;

    // Sorted for deterministic synthetic topic ids.
    let mut names: Vec<&String> = table.keys().collect();
    names.sort();

    for (index, name) in names.into_iter().enumerate() {
        let entry = &table[name];
        let type_str = match entry.get("type").and_then(|t| t.as_str()) {
            Some(t) => t,
            None => {
                warn!(topic = %name, "skipping recorded topic without a type");
                skipped += 1;
                continue;
            }
        };
        let data_type = DataType::from_type_string(type_str);

        let mut history = BTreeMap::new();
        if let Some(recorded) = entry.get("samples").and_then(|s| s.as_object()) {
            for (key, raw) in recorded {
                let timestamp = match key.parse::<i64>() {
                    Ok(ts) => Timestamp(ts),
                    Err(_) => {
                        warn!(topic = %name, key = %key, "skipping sample with bad timestamp");
                        skipped += 1;
                        continue;
                    }
                };
                match coerce_value(raw, &data_type) {
                    Some(value) => {
                        history.insert(timestamp, value);
                    }
                    None => {
                        warn!(topic = %name, key = %key, "skipping sample not matching declared type");
                        skipped += 1;
                    }
                }
            }
        }

        topics.push(Topic {
            name: name.clone(),
            // Synthetic ids: no peer is present for an imported session.
            id: TopicId(index as i64 + 1),
            data_type,
            properties: HashMap::new(),
        });
        samples.insert(name.clone(), history);
    }

    Ok(ParsedRecording {
        topics,
        samples,
        skipped,
    })
}

/// Parse a recording from any reader.
pub fn parse_recording_from(mut reader: impl Read) -> Result<ParsedRecording> {
    let mut source = String::new();
    reader
        .read_to_string(&mut source)
        .map_err(|e| ClientError::Import(format!("unreadable recording: {}", e)))?;
    parse_recording(&source)
}

/// Parse a recording file.
pub fn parse_recording_file(path: impl AsRef<Path>) -> Result<ParsedRecording> {
    let file = std::fs::File::open(path.as_ref())
        .map_err(|e| ClientError::Import(format!("unreadable recording: {}", e)))?;
    parse_recording_from(file)
}

/// Convert a recorded JSON value to the declared type. None when the
/// shapes do not line up; the caller skips and counts.
fn coerce_value(raw: &serde_json::Value, data_type: &DataType) -> Option<Value> {
    match data_type {
        DataType::Boolean => raw.as_bool().map(Value::Boolean),
        DataType::Double => raw.as_f64().map(Value::Double),
        DataType::Int => raw.as_i64().map(Value::Int),
        DataType::Float => raw.as_f64().map(|v| Value::Float(v as f32)),
        DataType::String | DataType::Json => raw.as_str().map(|s| Value::Str(s.to_string())),
        DataType::Raw => coerce_bytes(raw).map(Value::Raw),
        DataType::Structured(schema) => coerce_bytes(raw).map(|data| Value::Structured {
            schema: schema.clone(),
            data,
        }),
        DataType::BooleanArray => raw
            .as_array()?
            .iter()
            .map(|v| v.as_bool())
            .collect::<Option<Vec<_>>>()
            .map(Value::BooleanArray),
        DataType::DoubleArray => raw
            .as_array()?
            .iter()
            .map(|v| v.as_f64())
            .collect::<Option<Vec<_>>>()
            .map(Value::DoubleArray),
        DataType::IntArray => raw
            .as_array()?
            .iter()
            .map(|v| v.as_i64())
            .collect::<Option<Vec<_>>>()
            .map(Value::IntArray),
        DataType::FloatArray => raw
            .as_array()?
            .iter()
            .map(|v| v.as_f64().map(|f| f as f32))
            .collect::<Option<Vec<_>>>()
            .map(Value::FloatArray),
        DataType::StringArray => raw
            .as_array()?
            .iter()
            .map(|v| v.as_str().map(|s| s.to_string()))
            .collect::<Option<Vec<_>>>()
            .map(Value::StringArray),
    }
}

fn coerce_bytes(raw: &serde_json::Value) -> Option<Vec<u8>> {
    raw.as_array()?
        .iter()
        .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
        .collect()
}
