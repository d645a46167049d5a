//! Receive loop and lifecycle.
//!
//! [`Receiver::run`] is the receive thread's entry point. It moves through
//! `idle → ready → running → draining → finished`:
//!
//! 1. open the capture (skipped in dry-run) and build the dedup store;
//! 2. publish readiness through the [`Handshake`] so the sender may start;
//! 3. classify packets until the result cap is hit, or the sender has
//!    finished and the cooldown has elapsed;
//! 4. snapshot capture statistics, tear the capture down under the
//!    handshake lock, and mark the receive side complete.

pub mod classifier;
pub mod handshake;

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::capture::{CaptureError, CaptureSource};
use crate::config::{ConfigError, RecvConfig};
use crate::dedup::{DedupError, DedupStore};
use crate::fieldset::{FieldsetError, FieldsetSchema, Translation};
use crate::filter::{Filter, FilterError};
use crate::output::OutputModule;
use crate::probe::{PortSet, ProbeModule};
use crate::state::{RecvStats, RecvStatsSnapshot, SendState};
use crate::validate::Validator;
use crate::RecvPhase;

pub use classifier::{Classifier, Disposition};
pub use handshake::Handshake;

/// Start-up failures. Everything after start-up is counted, not returned.
#[derive(Debug, thiserror::Error)]
pub enum RecvError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid probe field schema: {0}")]
    Fieldset(#[from] FieldsetError),

    #[error("invalid filter expression: {0}")]
    Filter(#[from] FilterError),

    #[error(transparent)]
    Dedup(#[from] DedupError),

    #[error("failed to open capture: {0}")]
    Capture(#[from] CaptureError),
}

// ─────────────────────────────────────────────────────────────────────────────
// Scan context
// ─────────────────────────────────────────────────────────────────────────────

/// Everything the classifier needs, assembled once before the loop starts.
pub struct ScanContext {
    config: RecvConfig,
    validator: Arc<Validator>,
    probe: Box<dyn ProbeModule>,
    output: Option<Box<dyn OutputModule>>,
    target_ports: PortSet,
    schema: FieldsetSchema,
    translation: Translation,
    filter: Filter,
    send: Arc<SendState>,
    stats: Arc<RecvStats>,
}

impl ScanContext {
    /// Validate `config`, build the field schema from `probe`, and compile
    /// the output projection and filter against it.
    pub fn new(
        config: RecvConfig,
        validator: Arc<Validator>,
        probe: Box<dyn ProbeModule>,
        output: Option<Box<dyn OutputModule>>,
        send: Arc<SendState>,
    ) -> Result<Self, RecvError> {
        config.validate()?;
        let schema = FieldsetSchema::build(probe.fields())?;
        let translation = Translation::new(&schema, &config.output_fields)?;
        let filter = match config.filter.as_deref() {
            Some(expr) => Filter::parse(expr, &schema)?,
            None => Filter::pass_all(),
        };
        Ok(Self {
            target_ports: PortSet::new(&config.target_ports),
            config,
            validator,
            probe,
            output,
            schema,
            translation,
            filter,
            send,
            stats: Arc::new(RecvStats::new()),
        })
    }

    pub fn config(&self) -> &RecvConfig {
        &self.config
    }

    pub fn output(&self) -> Option<&dyn OutputModule> {
        self.output.as_deref()
    }

    /// Receive counters. Written only by the receive thread.
    pub fn stats(&self) -> &Arc<RecvStats> {
        &self.stats
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Receiver
// ─────────────────────────────────────────────────────────────────────────────

/// Why the main loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    MaxResults,
    Cooldown,
}

/// Receive thread: a scan context plus the capture it reads from.
pub struct Receiver {
    ctx: ScanContext,
    capture: Box<dyn CaptureSource>,
}

impl Receiver {
    pub fn new(ctx: ScanContext, capture: Box<dyn CaptureSource>) -> Self {
        Self { ctx, capture }
    }

    pub fn context(&self) -> &ScanContext {
        &self.ctx
    }

    pub fn capture(&self) -> &dyn CaptureSource {
        self.capture.as_ref()
    }

    pub fn stats(&self) -> Arc<RecvStats> {
        Arc::clone(&self.ctx.stats)
    }

    /// Run the receive loop to completion.
    ///
    /// Returns `Err` only for start-up failures; readiness is never signalled
    /// in that case.
    pub fn run(&mut self, handshake: &Handshake) -> Result<RecvStatsSnapshot, RecvError> {
        let config = self.ctx.config.clone();
        let stats = Arc::clone(&self.ctx.stats);
        let send = Arc::clone(&self.ctx.send);

        tracing::debug!(interface = %config.interface, "capturing responses");
        let dedup = DedupStore::new(config.dedup_method, config.dedup_window_size)?;
        if !config.dryrun {
            self.capture.init()?;
        }
        tracing::info!(
            dedup = %config.dedup_method,
            probe = self.ctx.probe.name(),
            dryrun = config.dryrun,
            "receiver initialised"
        );
        if config.default_mode {
            tracing::info!("duplicate responses will be excluded from output");
            tracing::info!("unsuccessful responses will be excluded from output");
        } else {
            tracing::info!("duplicate responses will be passed to the output module");
            tracing::info!("unsuccessful responses will be passed to the output module");
        }

        handshake.mark_ready();
        stats.set_phase(RecvPhase::Ready);
        stats.mark_started(Utc::now());
        stats.set_phase(RecvPhase::Running);

        let capture = self.capture.as_mut();
        let mut classifier = Classifier::new(&mut self.ctx, dedup);
        let poll_timeout = config.poll_timeout_ms;
        let idle = Duration::from_millis(config.dryrun_idle_ms);
        let stats_interval = Duration::from_millis(config.stats_interval_ms);
        let mut last_stats = Instant::now();

        let exit = loop {
            if config.dryrun {
                std::thread::sleep(idle);
            } else {
                let flow = capture.poll(poll_timeout, &mut |data: &[u8], ts: DateTime<Utc>| {
                    classifier.handle_packet(data, ts);
                    if config.max_results > 0 && stats.filter_success() >= config.max_results {
                        ControlFlow::Break(())
                    } else {
                        ControlFlow::Continue(())
                    }
                });
                if flow.is_break() {
                    break ExitReason::MaxResults;
                }
                if last_stats.elapsed() >= stats_interval {
                    let cs = capture.stats();
                    stats.set_capture(cs.received, cs.dropped, cs.if_dropped);
                    last_stats = Instant::now();
                }
            }
            if send.is_complete() && stats.phase() == RecvPhase::Running {
                stats.set_phase(RecvPhase::Draining);
                tracing::info!(cooldown_secs = config.cooldown_secs, "sender finished, draining");
            }
            if send.cooldown_elapsed(config.cooldown(), Utc::now()) {
                break ExitReason::Cooldown;
            }
        };
        drop(classifier);

        stats.mark_finished(Utc::now());
        if !config.dryrun {
            let cs = capture.stats();
            stats.set_capture(cs.received, cs.dropped, cs.if_dropped);
            handshake.with_lock(|| capture.cleanup());
        }
        if let Some(out) = self.ctx.output.as_mut() {
            if let Err(e) = out.close() {
                tracing::warn!(output = out.name(), error = %e, "output module close failed");
            }
        }
        stats.mark_complete();
        stats.set_phase(RecvPhase::Finished);

        let snapshot = stats.snapshot();
        tracing::info!(
            reason = ?exit,
            validated = snapshot.validation_passed,
            unique = snapshot.success_unique,
            "receiver finished"
        );
        tracing::debug!(stats = ?snapshot, "final receive counters");
        Ok(snapshot)
    }
}
