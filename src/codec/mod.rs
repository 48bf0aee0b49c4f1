//! Wire codec: pure transforms between frames and structured messages.
//!
//! The protocol carries two sub-channels over one socket:
//! - a text sub-channel of JSON control records (announce, subscribe, ...)
//! - a binary sub-channel of MessagePack value frames
//!   `[topicId, timestampMicros, typeTag, payload]`
//!
//! Both directions share the same message set; which variants are legal
//! to send is a connection concern, not a codec concern.

mod control;
mod value;

pub use control::{
    decode_control, encode_control, ControlMessage, SubscriptionOptions, TopicProperties,
};
pub use value::{decode_values, encode_value, ValueFrame};
