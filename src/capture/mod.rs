//! Packet capture sources.
//!
//! The receive loop drives a [`CaptureSource`] with a per-packet callback.
//! Packet buffers are borrowed from the source and valid only for the
//! duration of one callback. `init` and `cleanup` bracket the loop and are
//! skipped entirely in dry-run mode.

#[cfg(target_os = "linux")]
pub mod af_packet;

use std::any::Any;
use std::collections::VecDeque;
use std::ops::ControlFlow;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::state::SendState;

#[cfg(target_os = "linux")]
pub use af_packet::AfPacketCapture;

/// Errors from opening or configuring a capture source.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("capture socket error: {0}")]
    Socket(String),

    #[error("interface '{0}' not found")]
    InterfaceNotFound(String),

    #[error("capture on '{interface}' failed: {source}")]
    Bind {
        interface: String,
        source: std::io::Error,
    },

    #[error("packet capture is not supported on this platform")]
    Unsupported,
}

/// A queued packet in [`MockCapture`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedPacket {
    pub data: Vec<u8>,
    pub timestamp: DateTime<Utc>,
}

/// Cumulative capture counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    /// Packets delivered by the kernel.
    pub received: u64,
    /// Packets dropped because the capture buffer was full.
    pub dropped: u64,
    /// Packets dropped by the interface or driver.
    pub if_dropped: u64,
}

/// Source of captured packets.
pub trait CaptureSource: Send {
    /// Open the capture. Called once before the receive loop starts.
    fn init(&mut self) -> Result<(), CaptureError>;

    /// Wait up to `timeout_ms` for packets and pass each available one to
    /// `on_packet`. Stops early, returning `Break`, when the callback does.
    fn poll(
        &mut self,
        timeout_ms: u64,
        on_packet: &mut dyn FnMut(&[u8], DateTime<Utc>) -> ControlFlow<()>,
    ) -> ControlFlow<()>;

    /// Counters since `init`.
    fn stats(&mut self) -> CaptureStats;

    /// Release the capture. Called once after the receive loop exits.
    fn cleanup(&mut self);

    /// Return `self` as `&dyn Any` to enable safe downcasting in tests.
    fn as_any(&self) -> &dyn Any;
}

// =============================================================================
// Mock implementation for unit testing
// =============================================================================

/// In-memory capture returning pre-queued packets, one per `poll`.
#[derive(Debug, Default)]
pub struct MockCapture {
    queue: VecDeque<CapturedPacket>,
    /// Number of `init` calls.
    pub init_calls: usize,
    /// Number of `cleanup` calls.
    pub cleanup_calls: usize,
    /// Number of `poll` calls.
    pub poll_calls: usize,
    /// Whether `init` should fail.
    pub fail_init: bool,
    /// Reported by `stats` as buffer drops.
    pub dropped: u64,
    delivered: u64,
    complete_when_drained: Option<Arc<SendState>>,
}

impl MockCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a packet stamped with the current time.
    pub fn queue_packet(&mut self, data: Vec<u8>) {
        self.queue_packet_at(data, Utc::now());
    }

    pub fn queue_packet_at(&mut self, data: Vec<u8>, timestamp: DateTime<Utc>) {
        self.queue.push_back(CapturedPacket { data, timestamp });
    }

    /// Mark `send` complete the first time `poll` finds the queue empty.
    pub fn complete_when_drained(mut self, send: Arc<SendState>) -> Self {
        self.complete_when_drained = Some(send);
        self
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }
}

impl CaptureSource for MockCapture {
    fn init(&mut self) -> Result<(), CaptureError> {
        self.init_calls += 1;
        if self.fail_init {
            return Err(CaptureError::Socket("mock init failure".into()));
        }
        Ok(())
    }

    fn poll(
        &mut self,
        _timeout_ms: u64,
        on_packet: &mut dyn FnMut(&[u8], DateTime<Utc>) -> ControlFlow<()>,
    ) -> ControlFlow<()> {
        self.poll_calls += 1;
        match self.queue.pop_front() {
            Some(pkt) => {
                self.delivered += 1;
                on_packet(&pkt.data, pkt.timestamp)
            }
            None => {
                if let Some(send) = self.complete_when_drained.take() {
                    send.mark_complete();
                }
                ControlFlow::Continue(())
            }
        }
    }

    fn stats(&mut self) -> CaptureStats {
        CaptureStats {
            received: self.delivered,
            dropped: self.dropped,
            if_dropped: 0,
        }
    }

    fn cleanup(&mut self) {
        self.cleanup_calls += 1;
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn poll_once(cap: &mut impl CaptureSource) -> Vec<Vec<u8>> {
        let mut seen = Vec::new();
        let _ = cap.poll(0, &mut |data: &[u8], _ts: DateTime<Utc>| {
            seen.push(data.to_vec());
            ControlFlow::Continue(())
        });
        seen
    }

    #[test]
    fn test_mock_capture_fifo_one_per_poll() {
        let mut cap = MockCapture::new();
        cap.queue_packet(vec![1]);
        cap.queue_packet(vec![2]);
        assert_eq!(poll_once(&mut cap), vec![vec![1]]);
        assert_eq!(poll_once(&mut cap), vec![vec![2]]);
        assert!(poll_once(&mut cap).is_empty());
        assert_eq!(cap.stats().received, 2);
        assert_eq!(cap.poll_calls, 3);
    }

    #[test]
    fn test_mock_capture_propagates_break() {
        let mut cap = MockCapture::new();
        cap.queue_packet(vec![9]);
        let flow = cap.poll(0, &mut |_: &[u8], _: DateTime<Utc>| ControlFlow::Break(()));
        assert!(flow.is_break());
        let flow = cap.poll(0, &mut |_: &[u8], _: DateTime<Utc>| ControlFlow::Break(()));
        assert!(flow.is_continue(), "an empty poll never invokes the callback");
    }

    #[test]
    fn test_mock_capture_signals_completion_when_drained() {
        let send = Arc::new(SendState::new());
        let mut cap = MockCapture::new().complete_when_drained(Arc::clone(&send));
        cap.queue_packet(vec![0]);
        poll_once(&mut cap);
        assert!(!send.is_complete());
        poll_once(&mut cap);
        assert!(send.is_complete());
    }

    #[test]
    fn test_mock_capture_init_failure() {
        let mut cap = MockCapture::new();
        cap.fail_init = true;
        assert!(matches!(cap.init(), Err(CaptureError::Socket(_))));
        assert_eq!(cap.init_calls, 1);
    }
}
