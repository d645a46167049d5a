//! Cross-thread scan state.
//!
//! [`SendState`] is written by the sender and read by the receiver;
//! [`RecvStats`] is written by the receiver and read by anyone reporting
//! progress. Each side has exactly one writer, so plain atomics suffice.
//! Readers may observe a value one loop iteration late.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicU8, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use serde::Serialize;

use crate::RecvPhase;

/// Sentinel for "timestamp not yet recorded".
const UNSET: i64 = i64::MIN;

fn load_ts(cell: &AtomicI64, order: Ordering) -> Option<DateTime<Utc>> {
    match cell.load(order) {
        UNSET => None,
        us => Utc.timestamp_micros(us).single(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Send side
// ─────────────────────────────────────────────────────────────────────────────

/// Sender completion flag and finish time.
#[derive(Debug)]
pub struct SendState {
    complete: AtomicBool,
    finish_us: AtomicI64,
}

impl SendState {
    pub fn new() -> Self {
        Self {
            complete: AtomicBool::new(false),
            finish_us: AtomicI64::new(UNSET),
        }
    }

    /// Signal that every probe has been sent.
    pub fn mark_complete(&self) {
        self.mark_complete_at(Utc::now());
    }

    /// Signal completion with an explicit finish time. The finish time is
    /// published before the flag, so a reader that sees the flag also sees
    /// the time.
    pub fn mark_complete_at(&self, finished: DateTime<Utc>) {
        self.finish_us.store(finished.timestamp_micros(), Ordering::Relaxed);
        self.complete.store(true, Ordering::Release);
    }

    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn finished_at(&self) -> Option<DateTime<Utc>> {
        if !self.is_complete() {
            return None;
        }
        load_ts(&self.finish_us, Ordering::Relaxed)
    }

    /// True once the sender has finished and strictly more than `cooldown`
    /// has passed since.
    pub fn cooldown_elapsed(&self, cooldown: Duration, now: DateTime<Utc>) -> bool {
        let Some(finished) = self.finished_at() else {
            return false;
        };
        match (now - finished).to_std() {
            Ok(since) => since > cooldown,
            Err(_) => false,
        }
    }
}

impl Default for SendState {
    fn default() -> Self {
        Self::new()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Receive side
// ─────────────────────────────────────────────────────────────────────────────

/// Monotonic receive counters.
///
/// Only the receive thread writes. Counters use relaxed ordering; the
/// completion flag uses release/acquire so a reader that sees `complete`
/// also sees the final counter values.
#[derive(Debug)]
pub struct RecvStats {
    pub(crate) validation_passed: AtomicU64,
    pub(crate) validation_failed: AtomicU64,
    pub(crate) success_total: AtomicU64,
    pub(crate) success_unique: AtomicU64,
    pub(crate) app_success_total: AtomicU64,
    pub(crate) app_success_unique: AtomicU64,
    pub(crate) failure_total: AtomicU64,
    pub(crate) cooldown_total: AtomicU64,
    pub(crate) cooldown_unique: AtomicU64,
    pub(crate) filter_success: AtomicU64,
    pub(crate) ip_fragments: AtomicU64,
    pub(crate) probe_errors: AtomicU64,
    pub(crate) output_errors: AtomicU64,
    pub(crate) capture_received: AtomicU64,
    pub(crate) capture_dropped: AtomicU64,
    pub(crate) capture_if_dropped: AtomicU64,
    start_us: AtomicI64,
    finish_us: AtomicI64,
    complete: AtomicBool,
    phase: AtomicU8,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) -> u64 {
    counter.fetch_add(1, Ordering::Relaxed) + 1
}

impl RecvStats {
    pub fn new() -> Self {
        Self {
            validation_passed: AtomicU64::new(0),
            validation_failed: AtomicU64::new(0),
            success_total: AtomicU64::new(0),
            success_unique: AtomicU64::new(0),
            app_success_total: AtomicU64::new(0),
            app_success_unique: AtomicU64::new(0),
            failure_total: AtomicU64::new(0),
            cooldown_total: AtomicU64::new(0),
            cooldown_unique: AtomicU64::new(0),
            filter_success: AtomicU64::new(0),
            ip_fragments: AtomicU64::new(0),
            probe_errors: AtomicU64::new(0),
            output_errors: AtomicU64::new(0),
            capture_received: AtomicU64::new(0),
            capture_dropped: AtomicU64::new(0),
            capture_if_dropped: AtomicU64::new(0),
            start_us: AtomicI64::new(UNSET),
            finish_us: AtomicI64::new(UNSET),
            complete: AtomicBool::new(false),
            phase: AtomicU8::new(RecvPhase::Idle as u8),
        }
    }

    pub fn phase(&self) -> RecvPhase {
        RecvPhase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: RecvPhase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    pub(crate) fn mark_started(&self, at: DateTime<Utc>) {
        self.start_us.store(at.timestamp_micros(), Ordering::Relaxed);
    }

    pub(crate) fn mark_finished(&self, at: DateTime<Utc>) {
        self.finish_us.store(at.timestamp_micros(), Ordering::Relaxed);
    }

    pub(crate) fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    /// Receive loop has exited and the capture has been torn down.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    pub fn success_unique(&self) -> u64 {
        self.success_unique.load(Ordering::Relaxed)
    }

    pub fn filter_success(&self) -> u64 {
        self.filter_success.load(Ordering::Relaxed)
    }

    pub(crate) fn set_capture(&self, received: u64, dropped: u64, if_dropped: u64) {
        self.capture_received.store(received, Ordering::Relaxed);
        self.capture_dropped.store(dropped, Ordering::Relaxed);
        self.capture_if_dropped.store(if_dropped, Ordering::Relaxed);
    }

    /// Point-in-time copy of every counter.
    pub fn snapshot(&self) -> RecvStatsSnapshot {
        let complete = self.is_complete();
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        RecvStatsSnapshot {
            phase: self.phase(),
            complete,
            started_at: load_ts(&self.start_us, Ordering::Relaxed),
            finished_at: load_ts(&self.finish_us, Ordering::Relaxed),
            validation_passed: get(&self.validation_passed),
            validation_failed: get(&self.validation_failed),
            success_total: get(&self.success_total),
            success_unique: get(&self.success_unique),
            app_success_total: get(&self.app_success_total),
            app_success_unique: get(&self.app_success_unique),
            failure_total: get(&self.failure_total),
            cooldown_total: get(&self.cooldown_total),
            cooldown_unique: get(&self.cooldown_unique),
            filter_success: get(&self.filter_success),
            ip_fragments: get(&self.ip_fragments),
            probe_errors: get(&self.probe_errors),
            output_errors: get(&self.output_errors),
            capture_received: get(&self.capture_received),
            capture_dropped: get(&self.capture_dropped),
            capture_if_dropped: get(&self.capture_if_dropped),
        }
    }
}

impl Default for RecvStats {
    fn default() -> Self {
        Self::new()
    }
}

/// Plain copy of [`RecvStats`] for reporting and serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecvStatsSnapshot {
    pub phase: RecvPhase,
    pub complete: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
    pub validation_passed: u64,
    pub validation_failed: u64,
    pub success_total: u64,
    pub success_unique: u64,
    pub app_success_total: u64,
    pub app_success_unique: u64,
    pub failure_total: u64,
    pub cooldown_total: u64,
    pub cooldown_unique: u64,
    pub filter_success: u64,
    pub ip_fragments: u64,
    pub probe_errors: u64,
    pub output_errors: u64,
    pub capture_received: u64,
    pub capture_dropped: u64,
    pub capture_if_dropped: u64,
}

impl RecvStatsSnapshot {
    /// Wall-clock receive duration, if both ends were recorded.
    pub fn duration(&self) -> Option<Duration> {
        let (start, end) = (self.started_at?, self.finished_at?);
        (end - start).to_std().ok()
    }

    /// Unique successes as a percentage of validated replies.
    pub fn hit_rate(&self) -> f64 {
        if self.validation_passed == 0 {
            return 0.0;
        }
        self.success_unique as f64 * 100.0 / self.validation_passed as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_send_state_initially_incomplete() {
        let s = SendState::new();
        assert!(!s.is_complete());
        assert!(s.finished_at().is_none());
        assert!(!s.cooldown_elapsed(Duration::ZERO, Utc::now()));
    }

    #[test]
    fn test_cooldown_is_strictly_greater() {
        let s = SendState::new();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        s.mark_complete_at(t0);
        let cd = Duration::from_secs(8);
        assert!(!s.cooldown_elapsed(cd, t0 + chrono::Duration::seconds(7)));
        assert!(!s.cooldown_elapsed(cd, t0 + chrono::Duration::seconds(8)));
        assert!(s.cooldown_elapsed(cd, t0 + chrono::Duration::milliseconds(8001)));
    }

    #[test]
    fn test_cooldown_clock_skew_does_not_elapse() {
        let s = SendState::new();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        s.mark_complete_at(t0);
        assert!(!s.cooldown_elapsed(Duration::ZERO, t0 - chrono::Duration::seconds(1)));
    }

    #[test]
    fn test_completion_visible_across_threads() {
        let s = Arc::new(SendState::new());
        let t0 = Utc.timestamp_opt(1_700_000_000, 500_000).unwrap();
        let writer = {
            let s = Arc::clone(&s);
            std::thread::spawn(move || s.mark_complete_at(t0))
        };
        writer.join().unwrap();
        assert!(s.is_complete());
        assert_eq!(s.finished_at(), Some(t0));
    }

    #[test]
    fn test_recv_stats_snapshot() {
        let stats = RecvStats::new();
        bump(&stats.validation_passed);
        bump(&stats.validation_passed);
        assert_eq!(bump(&stats.success_unique), 1);
        stats.set_capture(10, 2, 1);
        stats.set_phase(RecvPhase::Running);
        let snap = stats.snapshot();
        assert_eq!(snap.validation_passed, 2);
        assert_eq!(snap.success_unique, 1);
        assert_eq!(snap.capture_received, 10);
        assert_eq!(snap.capture_dropped, 2);
        assert_eq!(snap.capture_if_dropped, 1);
        assert_eq!(snap.phase, RecvPhase::Running);
        assert!(!snap.complete);
        assert_eq!(snap.hit_rate(), 50.0);
    }

    #[test]
    fn test_snapshot_duration() {
        let stats = RecvStats::new();
        let t0 = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        stats.mark_started(t0);
        assert!(stats.snapshot().duration().is_none());
        stats.mark_finished(t0 + chrono::Duration::seconds(12));
        assert_eq!(stats.snapshot().duration(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn test_snapshot_serializes() {
        let stats = RecvStats::new();
        stats.mark_complete();
        let json = serde_json::to_value(stats.snapshot()).unwrap();
        assert_eq!(json["complete"], true);
        assert_eq!(json["phase"], "idle");
        assert_eq!(json["success_total"], 0);
    }
}
