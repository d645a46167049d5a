//! Output modules: sinks for filtered result records.
//!
//! The receive pipeline hands each record that survives filtering to
//! [`OutputModule::process_ip`]. A module that declares an
//! [`update_interval`](OutputModule::update_interval) also gets a periodic
//! [`update`](OutputModule::update) call with the scan's live state.

pub mod json;

use std::any::Any;
use std::num::NonZeroU64;

use crate::config::RecvConfig;
use crate::fieldset::OutputRecord;
use crate::state::{RecvStatsSnapshot, SendState};

pub use json::JsonLinesOutput;

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("output I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Result sink.
pub trait OutputModule: Send {
    fn name(&self) -> &'static str;

    /// Write one record.
    fn process_ip(&mut self, record: &OutputRecord) -> Result<(), OutputError>;

    /// Call [`update`](OutputModule::update) every N unique successes.
    fn update_interval(&self) -> Option<NonZeroU64> {
        None
    }

    /// Periodic refresh hook.
    fn update(
        &mut self,
        _config: &RecvConfig,
        _send: &SendState,
        _recv: &RecvStatsSnapshot,
    ) -> Result<(), OutputError> {
        Ok(())
    }

    /// Flush and release resources. Called once when the receive loop exits.
    fn close(&mut self) -> Result<(), OutputError> {
        Ok(())
    }

    /// Return `self` as `&dyn Any` to enable safe downcasting in tests.
    fn as_any(&self) -> &dyn Any;
}

// =============================================================================
// In-memory implementation
// =============================================================================

/// Sink that keeps every record in memory.
///
/// Used by tests and by library callers that post-process results themselves.
#[derive(Debug, Default)]
pub struct RecordingOutput {
    /// Records received via `process_ip`, in order.
    pub records: Vec<OutputRecord>,
    /// `success_unique` value observed at each `update` call.
    pub updates: Vec<u64>,
    /// Whether `close` has been called.
    pub closed: bool,
    interval: Option<NonZeroU64>,
    /// Whether the next `process_ip` should fail.
    pub fail_next_write: bool,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_update_interval(interval: NonZeroU64) -> Self {
        Self {
            interval: Some(interval),
            ..Self::default()
        }
    }
}

impl OutputModule for RecordingOutput {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn process_ip(&mut self, record: &OutputRecord) -> Result<(), OutputError> {
        if self.fail_next_write {
            self.fail_next_write = false;
            return Err(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "recording output failure").into());
        }
        self.records.push(record.clone());
        Ok(())
    }

    fn update_interval(&self) -> Option<NonZeroU64> {
        self.interval
    }

    fn update(
        &mut self,
        _config: &RecvConfig,
        _send: &SendState,
        recv: &RecvStatsSnapshot,
    ) -> Result<(), OutputError> {
        self.updates.push(recv.success_unique);
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.closed = true;
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
