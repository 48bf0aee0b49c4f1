//! JSON control messages.
//!
//! A text frame is a JSON array of `{"method": ..., "params": {...}}`
//! records. A frame that fails to decode is dropped as a unit by the
//! connection; decoding here stays pure.

use crate::error::Result;
use crate::types::TopicId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Server-side per-topic properties (retained, persistent, cached, ...).
pub type TopicProperties = HashMap<String, serde_json::Value>;

/// Options attached to a subscribe message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionOptions {
    /// Deliver every sample instead of only the most recent.
    #[serde(default)]
    pub all: bool,

    /// Treat the requested names as prefixes.
    #[serde(default)]
    pub prefix: bool,

    /// Requested server push period, seconds. Advisory.
    #[serde(default = "default_periodic")]
    pub periodic: f64,

    /// Announce traffic only, no value frames.
    #[serde(default)]
    pub topicsonly: bool,
}

fn default_periodic() -> f64 {
    0.1
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            all: false,
            prefix: false,
            periodic: default_periodic(),
            topicsonly: false,
        }
    }
}

/// A control record. Variable-length, self-describing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "params", rename_all = "lowercase")]
pub enum ControlMessage {
    /// Client requests publication of a topic.
    Publish {
        name: String,
        #[serde(rename = "type")]
        type_str: String,
        pubuid: i64,
        #[serde(default)]
        properties: TopicProperties,
    },

    /// Client releases a previously published topic.
    Unpublish { pubuid: i64 },

    /// Client updates server-side properties of a topic.
    SetProperties {
        name: String,
        update: TopicProperties,
    },

    /// Client requests value delivery for the named topics or prefixes.
    Subscribe {
        topics: Vec<String>,
        subuid: i64,
        #[serde(default)]
        options: SubscriptionOptions,
    },

    /// Client cancels a standing subscription.
    Unsubscribe { subuid: i64 },

    /// Server announces a topic (new, or metadata update).
    Announce {
        name: String,
        id: TopicId,
        #[serde(rename = "type")]
        type_str: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pubuid: Option<i64>,
        #[serde(default)]
        properties: TopicProperties,
    },

    /// Server removes a topic.
    Unannounce { name: String, id: TopicId },

    /// Server broadcasts a property update for a topic.
    Properties {
        name: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ack: Option<bool>,
        update: TopicProperties,
    },
}

// `rename_all = "lowercase"` maps multi-word variants correctly here
// (SetProperties -> "setproperties", Unannounce -> "unannounce") because
// serde lowercases the whole identifier without separators.

/// Encode a batch of control messages into one text frame.
pub fn encode_control(messages: &[ControlMessage]) -> Result<String> {
    Ok(serde_json::to_string(messages)?)
}

/// Decode one text frame into control messages.
///
/// Fails the whole frame on a malformed or unrecognized record; the
/// connection logs and discards it without tearing down.
pub fn decode_control(text: &str) -> Result<Vec<ControlMessage>> {
    Ok(serde_json::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_wire_shape() {
        let msg = ControlMessage::Subscribe {
            topics: vec!["/swerve/".to_string()],
            subuid: 3,
            options: SubscriptionOptions {
                prefix: true,
                ..Default::default()
            },
        };
        let text = encode_control(&[msg.clone()]).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v[0]["method"], "subscribe");
        assert_eq!(v[0]["params"]["subuid"], 3);
        assert_eq!(v[0]["params"]["options"]["prefix"], true);

        let decoded = decode_control(&text).unwrap();
        assert_eq!(decoded, vec![msg]);
    }

    #[test]
    fn test_announce_from_server_json() {
        let text = r#"[{"method":"announce","params":{"name":"/speed","id":7,"type":"double","properties":{"retained":true}}}]"#;
        let decoded = decode_control(text).unwrap();
        match &decoded[0] {
            ControlMessage::Announce {
                name,
                id,
                type_str,
                pubuid,
                properties,
            } => {
                assert_eq!(name, "/speed");
                assert_eq!(*id, TopicId(7));
                assert_eq!(type_str, "double");
                assert_eq!(*pubuid, None);
                assert_eq!(properties["retained"], serde_json::Value::Bool(true));
            }
            other => panic!("Expected announce, got {:?}", other),
        }
    }

    #[test]
    fn test_setproperties_method_name() {
        let msg = ControlMessage::SetProperties {
            name: "/speed".to_string(),
            update: TopicProperties::new(),
        };
        let text = encode_control(&[msg]).unwrap();
        assert!(text.contains(r#""method":"setproperties""#));
    }

    #[test]
    fn test_unknown_method_fails_frame() {
        let text = r#"[{"method":"frobnicate","params":{}}]"#;
        assert!(decode_control(text).is_err());
    }

    #[test]
    fn test_multiple_records_per_frame() {
        let msgs = vec![
            ControlMessage::Publish {
                name: "/a".to_string(),
                type_str: "int".to_string(),
                pubuid: 1,
                properties: TopicProperties::new(),
            },
            ControlMessage::Unsubscribe { subuid: 9 },
        ];
        let text = encode_control(&msgs).unwrap();
        assert_eq!(decode_control(&text).unwrap(), msgs);
    }
}
