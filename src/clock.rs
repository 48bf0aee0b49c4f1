//! Clock synchronization with the peer.
//!
//! The client periodically sends its local time on the reserved RTT topic
//! and the server echoes it together with its own time. The echoed local
//! time doubles as the nonce: a reply to a superseded request no longer
//! matches and is discarded. The offset from the minimum-RTT exchange is
//! kept as authoritative, since it carries the least queueing jitter.

use crate::types::Timestamp;
use parking_lot::RwLock;
use std::time::Duration;

/// Default interval between time requests while connected.
pub const SYNC_INTERVAL: Duration = Duration::from_secs(3);

#[derive(Default)]
struct ClockState {
    /// Additive correction: peer time = local time + offset.
    offset_micros: Option<i64>,
    /// RTT of the exchange that produced the current offset.
    best_rtt_micros: Option<i64>,
    /// Peer time observed at the first successful sync after (re)connect.
    connected_at: Option<Timestamp>,
    /// Local-time nonce of the single in-flight request.
    pending_nonce: Option<Timestamp>,
}

pub struct ClockSync {
    state: RwLock<ClockState>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ClockState::default()),
        }
    }

    /// Start a new time request, superseding any unanswered one.
    /// Returns the nonce to put on the wire.
    pub fn begin_ping(&self) -> Timestamp {
        let nonce = Timestamp::local_now();
        self.state.write().pending_nonce = Some(nonce);
        nonce
    }

    /// Apply a time reply. `echoed_nonce` is the local time we sent,
    /// `peer_time` the server clock at reply, `local_now` the local clock
    /// at receipt. A reply whose nonce does not match the in-flight
    /// request is ignored.
    pub fn on_pong(&self, echoed_nonce: Timestamp, peer_time: Timestamp, local_now: Timestamp) {
        let mut state = self.state.write();
        if state.pending_nonce != Some(echoed_nonce) {
            return;
        }
        state.pending_nonce = None;

        let rtt = local_now.0 - echoed_nonce.0;
        if rtt < 0 {
            return;
        }

        // Half-RTT compensation: the server stamped its clock roughly in
        // the middle of the round trip.
        let offset = peer_time.0 + rtt / 2 - local_now.0;

        let better = match state.best_rtt_micros {
            Some(best) => rtt < best,
            None => true,
        };
        if better {
            state.best_rtt_micros = Some(rtt);
            state.offset_micros = Some(offset);
        }

        // Latched exactly once per connection, at the first successful sync.
        if state.connected_at.is_none() {
            let effective = state.offset_micros.unwrap_or(offset);
            state.connected_at = Some(Timestamp(local_now.0 + effective));
        }
    }

    /// Current time on the peer clock, or None before the first sync.
    pub fn now_on_peer(&self) -> Option<Timestamp> {
        let offset = self.state.read().offset_micros?;
        Some(Timestamp(Timestamp::local_now().0 + offset))
    }

    /// Offset-adjust an arbitrary local time.
    pub fn to_peer_time(&self, local: Timestamp) -> Option<Timestamp> {
        let offset = self.state.read().offset_micros?;
        Some(Timestamp(local.0 + offset))
    }

    /// Peer time of the first successful sync after (re)connect; None
    /// until then.
    pub fn connected_at_peer_time(&self) -> Option<Timestamp> {
        self.state.read().connected_at
    }

    /// Whether a request is in flight and unanswered.
    pub fn has_pending(&self) -> bool {
        self.state.read().pending_nonce.is_some()
    }

    /// Forget everything. Called on disconnect; the next connection
    /// re-latches `connected_at` from scratch.
    pub fn reset(&self) {
        *self.state.write() = ClockState::default();
    }
}

impl Default for ClockSync {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive one exchange with explicit clocks instead of wall time.
    fn pong(clock: &ClockSync, nonce: Timestamp, peer_time: i64, local_now: i64) {
        clock.on_pong(nonce, Timestamp(peer_time), Timestamp(local_now));
    }

    #[test]
    fn test_offset_from_half_rtt() {
        let clock = ClockSync::new();
        let nonce = clock.begin_ping();

        // 2000us round trip, server clock 1_000_000us ahead at reply.
        let local_now = Timestamp(nonce.0 + 2000);
        pong(&clock, nonce, local_now.0 + 1_000_000 - 1000, local_now.0);

        let offset = clock.to_peer_time(local_now).unwrap().0 - local_now.0;
        assert_eq!(offset, 1_000_000 - 1000 + 1000);
    }

    #[test]
    fn test_stale_nonce_discarded() {
        let clock = ClockSync::new();
        let first = clock.begin_ping();
        let _second = clock.begin_ping(); // supersedes

        pong(&clock, first, 999_999, first.0 + 100);
        assert!(clock.now_on_peer().is_none());
        assert!(clock.has_pending());
    }

    #[test]
    fn test_min_rtt_sample_wins() {
        let clock = ClockSync::new();

        // High-RTT exchange first.
        let n1 = clock.begin_ping();
        pong(&clock, n1, n1.0 + 500_000, n1.0 + 10_000);
        let offset_after_first = clock.to_peer_time(Timestamp(0)).unwrap().0;

        // Lower-RTT exchange replaces the offset.
        let n2 = clock.begin_ping();
        pong(&clock, n2, n2.0 + 600_000, n2.0 + 100);
        let offset_after_second = clock.to_peer_time(Timestamp(0)).unwrap().0;
        assert_ne!(offset_after_first, offset_after_second);

        // Higher-RTT exchange does not.
        let n3 = clock.begin_ping();
        pong(&clock, n3, n3.0 + 700_000, n3.0 + 50_000);
        assert_eq!(clock.to_peer_time(Timestamp(0)).unwrap().0, offset_after_second);
    }

    #[test]
    fn test_connected_at_latched_once_and_reset() {
        let clock = ClockSync::new();
        assert!(clock.connected_at_peer_time().is_none());

        let n1 = clock.begin_ping();
        pong(&clock, n1, n1.0 + 1_000_000, n1.0 + 200);
        let latched = clock.connected_at_peer_time().unwrap();

        let n2 = clock.begin_ping();
        pong(&clock, n2, n2.0 + 1_000_000, n2.0 + 100);
        assert_eq!(clock.connected_at_peer_time(), Some(latched));

        clock.reset();
        assert!(clock.connected_at_peer_time().is_none());
        assert!(clock.now_on_peer().is_none());
    }

    #[test]
    fn test_negative_rtt_rejected() {
        let clock = ClockSync::new();
        let nonce = clock.begin_ping();
        pong(&clock, nonce, 1_000, nonce.0 - 50);
        assert!(clock.now_on_peer().is_none());
    }
}
