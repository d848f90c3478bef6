/// Link counters
///
/// Lock-free counters bumped from both the sending thread and the
/// transport's notification context; read them as a [`StatsSnapshot`].
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct LinkStats {
    frames_sent: AtomicU64,
    send_failures: AtomicU64,
    link_failures: AtomicU64,
    frames_received: AtomicU64,
    frames_dropped: AtomicU64,
    acks_matched: AtomicU64,
    deliveries: AtomicU64,
    delivery_failures: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Frames the transport accepted
    pub frames_sent: u64,
    /// Frames the transport refused to enqueue
    pub send_failures: u64,
    /// Send-status notifications reporting failure
    pub link_failures: u64,
    pub frames_received: u64,
    /// Inbound frames discarded: empty, malformed, or unknown tag
    pub frames_dropped: u64,
    pub acks_matched: u64,
    pub deliveries: u64,
    pub delivery_failures: u64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl LinkStats {
    pub(crate) fn record_sent(&self) {
        bump(&self.frames_sent);
    }

    pub(crate) fn record_send_failure(&self) {
        bump(&self.send_failures);
    }

    pub(crate) fn record_link_failure(&self) {
        bump(&self.link_failures);
    }

    pub(crate) fn record_received(&self) {
        bump(&self.frames_received);
    }

    pub(crate) fn record_dropped(&self) {
        bump(&self.frames_dropped);
    }

    pub(crate) fn record_ack_matched(&self) {
        bump(&self.acks_matched);
    }

    pub(crate) fn record_delivery(&self) {
        bump(&self.deliveries);
    }

    pub(crate) fn record_delivery_failure(&self) {
        bump(&self.delivery_failures);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            send_failures: self.send_failures.load(Ordering::Relaxed),
            link_failures: self.link_failures.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            acks_matched: self.acks_matched.load(Ordering::Relaxed),
            deliveries: self.deliveries.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
        }
    }
}
