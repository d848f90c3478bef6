/// ACK Manager module - application-level reliability
///
/// Implements the single-outstanding-ACK handshake: a reliable send
/// stamps the frame with a fresh message id, transmits, and sleeps on a
/// condition variable until the receive path reports a matching `Ack`
/// frame or the per-attempt timeout elapses. Up to `retries` attempts are
/// made; the first matching ACK ends the send.
///
/// The transport's own send-status callback is not used for this: it only
/// says the frame left the radio, not that the remote application
/// consumed it.
use std::sync::atomic::{AtomicI32, Ordering};
use std::thread;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};
use tracing::{debug, warn};

use crate::config::LinkConfig;
use crate::contracts::{LegacyDataFrame, PeerAddress};
use crate::errors::{NowLinkError, Result};
use crate::stats::LinkStats;
use crate::transmitter::Transmitter;
use crate::transport::Transport;

/// Snapshot of the pending-ACK slot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PendingAck {
    /// Message id currently awaiting acknowledgment
    pub waiting_id: Option<i32>,

    /// Set by the receive path when the matching ACK arrives
    pub received: bool,
}

/// Retry parameters for one reliable send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub ack_timeout: Duration,
    pub send_failure_backoff: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, ack_timeout: Duration) -> Self {
        Self {
            retries,
            ack_timeout,
            send_failure_backoff: Duration::from_millis(crate::SEND_FAILURE_BACKOFF_MS),
        }
    }

    pub fn with_send_failure_backoff(mut self, backoff: Duration) -> Self {
        self.send_failure_backoff = backoff;
        self
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&LinkConfig::default())
    }
}

impl From<&LinkConfig> for RetryPolicy {
    fn from(config: &LinkConfig) -> Self {
        Self {
            retries: config.retries,
            ack_timeout: config.ack_timeout,
            send_failure_backoff: config.send_failure_backoff,
        }
    }
}

/// Successful reliable send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    /// Id stamped on the frame and echoed by the ACK
    pub id: i32,

    /// Transmission attempts made, including the acknowledged one
    pub attempts: u32,
}

/// ACK Manager - owns the message id counter and the pending-ACK slot
pub struct AckManager {
    next_id: AtomicI32,
    slot: Mutex<PendingAck>,
    acked: Condvar,
}

impl AckManager {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Start the message id counter at `first_id`
    pub fn starting_at(first_id: i32) -> Self {
        Self {
            next_id: AtomicI32::new(first_id),
            slot: Mutex::new(PendingAck::default()),
            acked: Condvar::new(),
        }
    }

    /// Id the next reliable send will use
    pub fn peek_next_id(&self) -> i32 {
        self.next_id.load(Ordering::Relaxed)
    }

    pub fn pending(&self) -> PendingAck {
        *self.slot.lock()
    }

    /// Claim the pending slot for a new message id
    ///
    /// The slot is released when the returned guard drops.
    ///
    /// # Errors
    /// `SendInProgress` if another reliable send holds the slot
    pub fn begin(&self) -> Result<PendingGuard<'_>> {
        let mut slot = self.slot.lock();
        if let Some(pending_id) = slot.waiting_id {
            return Err(NowLinkError::SendInProgress { pending_id });
        }

        // fetch_add wraps at i32::MAX
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        slot.waiting_id = Some(id);
        slot.received = false;
        Ok(PendingGuard { manager: self, id })
    }

    /// Record an ACK for `id`; true if it matched the pending message
    pub fn acknowledge(&self, id: i32) -> bool {
        let mut slot = self.slot.lock();
        if slot.waiting_id != Some(id) {
            return false;
        }
        slot.received = true;
        drop(slot);
        self.acked.notify_all();
        true
    }

    /// Send `frame` and wait for its application ACK, retrying per `policy`
    ///
    /// `frame.id` is overwritten with the assigned message id and stays the
    /// same across every attempt. A local transport refusal costs the
    /// send-failure backoff instead of an ACK wait.
    ///
    /// # Errors
    /// - `SendInProgress` if another reliable send is pending
    /// - `DeliveryFailed` once all attempts are used up
    pub fn send_with_ack<T: Transport + ?Sized>(
        &self,
        transport: &T,
        destination: PeerAddress,
        frame: &mut LegacyDataFrame,
        policy: RetryPolicy,
        stats: &LinkStats,
    ) -> Result<Delivery> {
        let pending = self.begin()?;
        let id = pending.id();
        frame.id = id;
        let wire = Transmitter::serialize_data(frame)?;

        for attempt in 1..=policy.retries {
            pending.arm();

            if let Err(e) = Transmitter::send_raw(transport, destination, &wire) {
                stats.record_send_failure();
                warn!(id, attempt, retries = policy.retries, error = %e, "send attempt failed");
                thread::sleep(policy.send_failure_backoff);
                continue;
            }
            stats.record_sent();
            debug!(id, attempt, retries = policy.retries, %destination, "message sent, awaiting ACK");

            if pending.wait(policy.ack_timeout) {
                stats.record_delivery();
                debug!(id, attempt, "application ACK received");
                return Ok(Delivery { id, attempts: attempt });
            }

            debug!(
                id,
                attempt,
                timeout_ms = policy.ack_timeout.as_millis() as u64,
                "no ACK within wait window"
            );
        }

        stats.record_delivery_failure();
        warn!(id, attempts = policy.retries, %destination, "message not acknowledged");
        Err(NowLinkError::DeliveryFailed {
            id,
            attempts: policy.retries,
        })
    }
}

impl Default for AckManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Holds the pending slot for one message id; releases it on drop
pub struct PendingGuard<'a> {
    manager: &'a AckManager,
    id: i32,
}

impl PendingGuard<'_> {
    pub fn id(&self) -> i32 {
        self.id
    }

    /// Clear the received flag before a new attempt
    pub fn arm(&self) {
        self.manager.slot.lock().received = false;
    }

    /// Block until the ACK arrives or `timeout` elapses
    ///
    /// A zero timeout checks the flag once without sleeping.
    pub fn wait(&self, timeout: Duration) -> bool {
        let mut slot = self.manager.slot.lock();
        if !slot.received && !timeout.is_zero() {
            self.manager
                .acked
                .wait_while_for(&mut slot, |s: &mut PendingAck| !s.received, timeout);
        }
        slot.received
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.manager.slot.lock();
        if slot.waiting_id == Some(self.id) {
            *slot = PendingAck::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::LoopbackMedium;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn test_ids_are_monotonic_and_wrap() {
        let manager = AckManager::starting_at(i32::MAX);
        let first = manager.begin().unwrap().id();
        let second = manager.begin().unwrap().id();
        assert_eq!(first, i32::MAX);
        assert_eq!(second, i32::MIN);
        assert_eq!(manager.peek_next_id(), i32::MIN + 1);
    }

    #[test]
    fn test_second_reliable_send_is_rejected() {
        let manager = AckManager::new();
        let guard = manager.begin().unwrap();
        match manager.begin() {
            Err(NowLinkError::SendInProgress { pending_id }) => assert_eq!(pending_id, guard.id()),
            _ => panic!("expected SendInProgress"),
        }
        // The rejected call must not consume an id
        assert_eq!(manager.peek_next_id(), 1);
        drop(guard);
        assert_eq!(manager.pending(), PendingAck::default());
        assert!(manager.begin().is_ok());
    }

    #[test]
    fn test_acknowledge_matches_only_pending_id() {
        let manager = AckManager::new();
        assert!(!manager.acknowledge(0), "nothing pending");

        let guard = manager.begin().unwrap();
        assert!(!manager.acknowledge(guard.id() + 1));
        assert!(!manager.pending().received);

        assert!(manager.acknowledge(guard.id()));
        assert!(manager.pending().received);

        guard.arm();
        assert!(!manager.pending().received);
    }

    #[test]
    fn test_wait_wakes_on_ack_from_other_thread() {
        let manager = Arc::new(AckManager::new());
        let guard = manager.begin().unwrap();
        let id = guard.id();

        let acker = {
            let manager = manager.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                manager.acknowledge(id)
            })
        };

        let start = Instant::now();
        assert!(guard.wait(Duration::from_secs(5)));
        assert!(start.elapsed() < Duration::from_secs(5));
        assert!(acker.join().unwrap());
    }

    #[test]
    fn test_zero_timeout_checks_once() {
        let manager = AckManager::new();
        let guard = manager.begin().unwrap();

        let start = Instant::now();
        assert!(!guard.wait(Duration::ZERO));
        assert!(start.elapsed() < Duration::from_millis(50));

        manager.acknowledge(guard.id());
        assert!(guard.wait(Duration::ZERO));
    }

    #[test]
    fn test_zero_retries_fails_without_sending() {
        let medium = LoopbackMedium::new();
        let sender = PeerAddress::new([0xA1; 6]);
        let peer = PeerAddress::new([0xB2; 6]);
        let transport = medium.attach(sender);
        transport.init().unwrap();
        transport.register_peer(peer, 0, false).unwrap();

        let manager = AckManager::new();
        let stats = LinkStats::default();
        let mut frame = LegacyDataFrame::sensor_data(1.0, 2.0, "x");
        let result = manager.send_with_ack(
            &transport,
            peer,
            &mut frame,
            RetryPolicy::new(0, Duration::from_millis(10)),
            &stats,
        );

        assert!(matches!(result, Err(NowLinkError::DeliveryFailed { id: 0, attempts: 0 })));
        assert!(medium.frames().is_empty());
        assert_eq!(manager.pending().waiting_id, None);
    }

    #[test]
    fn test_unacknowledged_send_uses_every_attempt() {
        let medium = LoopbackMedium::new();
        let sender = PeerAddress::new([0xA1; 6]);
        let peer = PeerAddress::new([0xB2; 6]);
        let transport = medium.attach(sender);
        transport.init().unwrap();
        transport.register_peer(peer, 0, false).unwrap();

        let manager = AckManager::new();
        let stats = LinkStats::default();
        let mut frame = LegacyDataFrame::sensor_data(1.0, 2.0, "x");
        let result = manager.send_with_ack(
            &transport,
            peer,
            &mut frame,
            RetryPolicy::new(3, Duration::from_millis(5)),
            &stats,
        );

        assert!(matches!(result, Err(NowLinkError::DeliveryFailed { attempts: 3, .. })));
        assert_eq!(medium.frames_from(sender).len(), 3);
        assert_eq!(stats.snapshot().frames_sent, 3);
        assert_eq!(stats.snapshot().delivery_failures, 1);
    }
}
