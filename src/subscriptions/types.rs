//! Subscription parameter types.

use crate::types::Sample;
use std::sync::Arc;
use std::time::Duration;

/// Callback invoked with (topic name, sample). Runs synchronously on the
/// receive loop in live mode and on the caller's thread for playback
/// re-delivery; it must not block.
pub type Listener = Arc<dyn Fn(&str, &Sample) + Send + Sync>;

/// Parameters of a subscription request.
#[derive(Clone, Debug, PartialEq)]
pub struct SubscriptionSpec {
    /// Topic names, or prefixes when `prefix_mode` is set.
    pub patterns: Vec<String>,

    /// Match any topic whose name starts with a pattern.
    pub prefix_mode: bool,

    /// Deliver every sample instead of only the most recent per window.
    pub send_all: bool,

    /// Requested server push period. Advisory to the peer; not enforced
    /// client-side.
    pub period: Duration,

    /// Announce traffic only; the subscription never receives values.
    pub topics_only: bool,
}

impl Default for SubscriptionSpec {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            prefix_mode: false,
            send_all: false,
            period: Duration::from_millis(100),
            topics_only: false,
        }
    }
}

impl SubscriptionSpec {
    /// Subscribe to one topic by exact name.
    pub fn exact(name: impl Into<String>) -> Self {
        Self {
            patterns: vec![name.into()],
            ..Default::default()
        }
    }

    /// Subscribe to every topic under a prefix.
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self {
            patterns: vec![prefix.into()],
            prefix_mode: true,
            ..Default::default()
        }
    }

    /// Enumerate topics under a prefix without value traffic.
    pub fn topics_only(prefix: impl Into<String>) -> Self {
        Self {
            patterns: vec![prefix.into()],
            prefix_mode: true,
            topics_only: true,
            ..Default::default()
        }
    }

    pub fn with_send_all(mut self, send_all: bool) -> Self {
        self.send_all = send_all;
        self
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// Whether a topic name matches this subscription.
    pub fn matches(&self, topic: &str) -> bool {
        if self.prefix_mode {
            self.patterns.iter().any(|p| topic.starts_with(p.as_str()))
        } else {
            self.patterns.iter().any(|p| p == topic)
        }
    }
}
