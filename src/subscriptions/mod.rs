//! Subscription system for value delivery.
//!
//! Subscriptions are the caller-visible fan-out unit: every `subscribe`
//! call gets a distinct id and its own listener, while identical
//! parameter sets are coalesced onto one wire-level subscription with a
//! reference count. Delivery happens in windows (one decoded binary
//! transport message per window): `send_all` subscriptions see every
//! sample in arrival order, the rest see only the last sample per topic
//! in the window.
//!
//! In playback mode nothing is delivered from the wire; moving the
//! playback cursor re-pushes each matching topic's nearest-floor value
//! instead.

mod manager;
mod types;

pub use manager::SubscriptionManager;
pub use types::{Listener, SubscriptionSpec};
