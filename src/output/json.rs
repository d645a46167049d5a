//! Newline-delimited JSON sink.

use std::any::Any;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::num::NonZeroU64;
use std::path::Path;

use super::{OutputError, OutputModule};
use crate::config::RecvConfig;
use crate::fieldset::OutputRecord;
use crate::state::{RecvStatsSnapshot, SendState};

/// Default number of unique successes between flushes.
pub const DEFAULT_FLUSH_INTERVAL: u64 = 1000;

/// Writes one JSON object per line. Buffered; flushed on every update and
/// on close.
pub struct JsonLinesOutput<W: Write + Send> {
    writer: BufWriter<W>,
    flush_every: NonZeroU64,
    written: u64,
}

impl JsonLinesOutput<File> {
    /// Create (or truncate) `path`.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, OutputError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl JsonLinesOutput<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> JsonLinesOutput<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            flush_every: NonZeroU64::new(DEFAULT_FLUSH_INTERVAL).unwrap_or(NonZeroU64::MIN),
            written: 0,
        }
    }

    pub fn with_flush_interval(mut self, every: NonZeroU64) -> Self {
        self.flush_every = every;
        self
    }

    /// Records written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}

impl<W: Write + Send + 'static> OutputModule for JsonLinesOutput<W> {
    fn name(&self) -> &'static str {
        "json"
    }

    fn process_ip(&mut self, record: &OutputRecord) -> Result<(), OutputError> {
        serde_json::to_writer(&mut self.writer, record)?;
        self.writer.write_all(b"\n")?;
        self.written += 1;
        Ok(())
    }

    fn update_interval(&self) -> Option<NonZeroU64> {
        Some(self.flush_every)
    }

    fn update(
        &mut self,
        _config: &RecvConfig,
        _send: &SendState,
        _recv: &RecvStatsSnapshot,
    ) -> Result<(), OutputError> {
        self.writer.flush()?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), OutputError> {
        self.writer.flush()?;
        tracing::debug!(records = self.written, "json output closed");
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
