//! Per-packet receive pipeline.
//!
//! Stages run strictly in order and any of them may discard the packet:
//! bounds check, source-port extraction, validation, fragment accounting,
//! field extraction, deduplication, outcome accounting, output filtering,
//! and the periodic output hook. Noise is only counted, never logged.

use chrono::{DateTime, Utc};

use super::ScanContext;
use crate::dedup::{DedupStore, ResponderKey};
use crate::fieldset::FieldValue;
use crate::packet::{transport_src_port, Ipv4Header, SyntheticLink, ETHER_HEADER_LEN};
use crate::probe::ProbeError;
use crate::state::bump;

/// Where a packet left the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Too short to hold the link and IPv4 headers.
    Truncated,
    /// Not a reply to one of our probes.
    Invalid,
    /// The probe module could not parse a validated reply.
    ProbeError,
    /// Unsuccessful or repeated, and excluded from output by default mode.
    Suppressed,
    /// Rejected by the filter expression.
    FilteredOut,
    /// Passed to the output module.
    Accepted,
}

/// Single-threaded packet classifier. Owns the dedup store and the
/// synthetic link buffer for the lifetime of one receive loop.
pub struct Classifier<'a> {
    ctx: &'a mut ScanContext,
    dedup: DedupStore,
    link: Option<SyntheticLink>,
}

impl<'a> Classifier<'a> {
    pub fn new(ctx: &'a mut ScanContext, dedup: DedupStore) -> Self {
        // Probe modules parse from a fixed Ethernet offset; any other link
        // layout is re-framed.
        let needs_link = ctx.config.send_ip_pkts || ctx.config.data_link_size != ETHER_HEADER_LEN;
        Self {
            ctx,
            dedup,
            link: needs_link.then(SyntheticLink::new),
        }
    }

    pub fn handle_packet(&mut self, bytes: &[u8], ts: DateTime<Utc>) -> Disposition {
        let ctx = &mut *self.ctx;
        let stats = &*ctx.stats;

        let Some(ip_bytes) = bytes.get(ctx.config.data_link_size..) else {
            return Disposition::Truncated;
        };
        let Ok(ip) = Ipv4Header::parse(ip_bytes) else {
            return Disposition::Truncated;
        };

        let src_port = transport_src_port(&ip).unwrap_or(0);
        let token = ctx.validator.generate(ip.dst(), ip.src(), src_port);
        let mut src = ip.src();
        if !ctx
            .probe
            .validate_packet(&ip, &mut src, &token, &ctx.target_ports)
        {
            bump(&stats.validation_failed);
            return Disposition::Invalid;
        }
        bump(&stats.validation_passed);

        if ip.more_fragments() {
            bump(&stats.ip_fragments);
        }

        let frame = match self.link.as_mut() {
            Some(link) => link.wrap(ip_bytes),
            None => bytes,
        };
        let mut fs = ctx.schema.new_fieldset();
        let filled = fs
            .add_ip_fields(&ip)
            .map_err(ProbeError::from)
            .and_then(|()| ctx.probe.process_packet(frame, &mut fs, &token, ts));
        if filled.is_err() {
            bump(&stats.probe_errors);
            return Disposition::ProbeError;
        }

        let send_complete = ctx.send.is_complete();
        let key = ResponderKey::new(src, src_port);
        let is_repeat = self.dedup.is_repeat(key);
        if fs.add_system_fields(is_repeat, send_complete, ts).is_err() {
            bump(&stats.probe_errors);
            return Disposition::ProbeError;
        }

        let flag = |index: usize| fs.get_by_index(index).is_ok_and(FieldValue::is_truthy);
        let is_success = flag(ctx.schema.success_index());
        let is_app_success = ctx.schema.app_success_index().map(flag);

        let mut new_unique = None;
        if is_success {
            bump(&stats.success_total);
            if !is_repeat {
                new_unique = Some(bump(&stats.success_unique));
                self.dedup.mark_success(key);
            }
            if send_complete {
                bump(&stats.cooldown_total);
                if !is_repeat {
                    bump(&stats.cooldown_unique);
                }
            }
        } else {
            bump(&stats.failure_total);
        }
        if is_app_success == Some(true) {
            bump(&stats.app_success_total);
            if !is_repeat {
                bump(&stats.app_success_unique);
            }
        }

        let disposition = if ctx.config.default_mode && (!is_success || is_repeat) {
            Disposition::Suppressed
        } else if !ctx.filter.evaluate(&fs) {
            Disposition::FilteredOut
        } else {
            bump(&stats.filter_success);
            let record = ctx.translation.translate(&fs);
            if let Some(out) = ctx.output.as_mut() {
                if let Err(e) = out.process_ip(&record) {
                    if bump(&stats.output_errors) == 1 {
                        tracing::warn!(output = out.name(), error = %e, "output module write failed");
                    }
                }
            }
            Disposition::Accepted
        };
        drop(fs);

        if let (Some(unique), Some(out)) = (new_unique, ctx.output.as_mut()) {
            if let Some(interval) = out.update_interval() {
                if unique % interval.get() == 0 {
                    let snapshot = stats.snapshot();
                    if let Err(e) = out.update(&ctx.config, &ctx.send, &snapshot) {
                        if bump(&stats.output_errors) == 1 {
                            tracing::warn!(output = out.name(), error = %e, "output module update failed");
                        }
                    }
                }
            }
        }

        disposition
    }
}
