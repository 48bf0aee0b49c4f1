//! Core types for the client.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Peer-assigned identifier for a topic.
///
/// Id `-1` is reserved by the wire protocol for round-trip-time frames.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TopicId(pub i64);

impl TopicId {
    /// Reserved id for clock-sync frames.
    pub const RTT: TopicId = TopicId(-1);
}

impl fmt::Debug for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TopicId({})", self.0)
    }
}

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a subscription. Never reused within a client.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self.0)
    }
}

/// Microseconds on the peer's clock (or the local clock, before offset
/// correction is applied).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Current local time.
    pub fn local_now() -> Self {
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Time went backwards");
        Timestamp(duration.as_micros() as i64)
    }

    pub fn as_micros(self) -> i64 {
        self.0
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Timestamp({})", self.0)
    }
}

/// Declared type of a topic.
///
/// Scalar and homogeneous-array types have dedicated wire tags; anything
/// else (struct/proto schemas, msgpack blobs) travels as raw bytes with
/// the declared schema name retained here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DataType {
    Boolean,
    Double,
    Int,
    Float,
    String,
    /// JSON payload; travels as a string on the wire.
    Json,
    Raw,
    BooleanArray,
    DoubleArray,
    IntArray,
    FloatArray,
    StringArray,
    /// Self-describing structured payload: schema name + raw bytes.
    Structured(String),
}

impl DataType {
    /// Wire tag for binary value frames.
    pub fn tag(&self) -> u8 {
        match self {
            DataType::Boolean => 0,
            DataType::Double => 1,
            DataType::Int => 2,
            DataType::Float => 3,
            DataType::String | DataType::Json => 4,
            DataType::Raw | DataType::Structured(_) => 5,
            DataType::BooleanArray => 16,
            DataType::DoubleArray => 17,
            DataType::IntArray => 18,
            DataType::FloatArray => 19,
            DataType::StringArray => 20,
        }
    }

    /// Resolve a wire tag to a type. Structured types are indistinguishable
    /// from raw on the wire; the declared type string disambiguates.
    pub fn from_tag(tag: u8) -> Option<DataType> {
        match tag {
            0 => Some(DataType::Boolean),
            1 => Some(DataType::Double),
            2 => Some(DataType::Int),
            3 => Some(DataType::Float),
            4 => Some(DataType::String),
            5 => Some(DataType::Raw),
            16 => Some(DataType::BooleanArray),
            17 => Some(DataType::DoubleArray),
            18 => Some(DataType::IntArray),
            19 => Some(DataType::FloatArray),
            20 => Some(DataType::StringArray),
            _ => None,
        }
    }

    /// Parse a declared type string from an announce or publish message.
    pub fn from_type_string(s: &str) -> DataType {
        match s {
            "boolean" => DataType::Boolean,
            "double" => DataType::Double,
            "int" => DataType::Int,
            "float" => DataType::Float,
            "string" => DataType::String,
            "json" => DataType::Json,
            "raw" => DataType::Raw,
            "boolean[]" => DataType::BooleanArray,
            "double[]" => DataType::DoubleArray,
            "int[]" => DataType::IntArray,
            "float[]" => DataType::FloatArray,
            "string[]" => DataType::StringArray,
            other => DataType::Structured(other.to_string()),
        }
    }

    /// Declared type string for publish messages.
    pub fn type_string(&self) -> String {
        match self {
            DataType::Boolean => "boolean".to_string(),
            DataType::Double => "double".to_string(),
            DataType::Int => "int".to_string(),
            DataType::Float => "float".to_string(),
            DataType::String => "string".to_string(),
            DataType::Json => "json".to_string(),
            DataType::Raw => "raw".to_string(),
            DataType::BooleanArray => "boolean[]".to_string(),
            DataType::DoubleArray => "double[]".to_string(),
            DataType::IntArray => "int[]".to_string(),
            DataType::FloatArray => "float[]".to_string(),
            DataType::StringArray => "string[]".to_string(),
            DataType::Structured(schema) => schema.clone(),
        }
    }
}

/// A typed topic value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Boolean(bool),
    Double(f64),
    Int(i64),
    Float(f32),
    Str(String),
    Raw(Vec<u8>),
    BooleanArray(Vec<bool>),
    DoubleArray(Vec<f64>),
    IntArray(Vec<i64>),
    FloatArray(Vec<f32>),
    StringArray(Vec<String>),
    /// Opaque structured payload with its schema name.
    Structured { schema: String, data: Vec<u8> },
}

impl Value {
    /// Wire tag used when encoding this value.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Boolean(_) => 0,
            Value::Double(_) => 1,
            Value::Int(_) => 2,
            Value::Float(_) => 3,
            Value::Str(_) => 4,
            Value::Raw(_) | Value::Structured { .. } => 5,
            Value::BooleanArray(_) => 16,
            Value::DoubleArray(_) => 17,
            Value::IntArray(_) => 18,
            Value::FloatArray(_) => 19,
            Value::StringArray(_) => 20,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::DoubleArray(v)
    }
}

/// Topic metadata. Exactly one live topic per name at any time.
#[derive(Clone, Debug, PartialEq)]
pub struct Topic {
    /// Unique name; never changes for a given peer-assigned id.
    pub name: String,

    /// Peer-assigned id; authoritative for value correlation.
    pub id: TopicId,

    /// Declared type.
    pub data_type: DataType,

    /// Server-side properties (retained, persistent, ...).
    pub properties: HashMap<String, serde_json::Value>,
}

/// One (timestamp, value) observation of a topic. Immutable once stored.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub timestamp: Timestamp,
    pub value: Value,
}
