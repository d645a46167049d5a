//! Summary formatters for a finished receive run.
//!
//! Supports pretty (human-readable) and JSON output formats.

use std::time::Duration;

use crate::config::RecvConfig;
use crate::state::RecvStatsSnapshot;

/// Format the final counters as human-readable text.
pub fn format_pretty(snap: &RecvStatsSnapshot, config: &RecvConfig) -> String {
    let mut out = String::new();

    let version = env!("CARGO_PKG_VERSION");
    out.push_str(&format!("scanrecv {version}\n"));
    out.push_str(&format!(
        "Interface {} (dedup: {}, cooldown: {}s)\n",
        config.interface, config.dedup_method, config.cooldown_secs
    ));
    let duration = snap.duration().map(format_duration).unwrap_or_else(|| "-".to_string());
    out.push_str(&format!("Received for {duration} ({})\n", snap.phase));
    out.push('\n');

    let rows: [(&str, u64, u64); 4] = [
        ("success", snap.success_total, snap.success_unique),
        ("app-success", snap.app_success_total, snap.app_success_unique),
        ("cooldown", snap.cooldown_total, snap.cooldown_unique),
        ("failure", snap.failure_total, 0),
    ];
    out.push_str(&format!("{:<14}{:>12}{:>12}\n", "RESPONSES", "TOTAL", "UNIQUE"));
    for (label, total, unique) in rows {
        let unique_label = if label == "failure" {
            "-".to_string()
        } else {
            unique.to_string()
        };
        out.push_str(&format!("{label:<14}{total:>12}{unique_label:>12}\n"));
    }
    out.push('\n');

    out.push_str(&format!(
        "validated {} / rejected {} ({:.2}% hit rate)\n",
        snap.validation_passed,
        snap.validation_failed,
        snap.hit_rate()
    ));
    out.push_str(&format!("{} results passed the output filter\n", snap.filter_success));

    let mut notes = Vec::new();
    if snap.ip_fragments > 0 {
        notes.push(format!("{} fragments", snap.ip_fragments));
    }
    if snap.probe_errors > 0 {
        notes.push(format!("{} probe errors", snap.probe_errors));
    }
    if snap.output_errors > 0 {
        notes.push(format!("{} output errors", snap.output_errors));
    }
    if !notes.is_empty() {
        out.push_str(&format!("({})\n", notes.join(", ")));
    }

    out.push_str(&format!(
        "capture: {} received, {} dropped, {} interface drops\n",
        snap.capture_received, snap.capture_dropped, snap.capture_if_dropped
    ));

    out
}

/// Format the final counters as JSON.
pub fn format_json(snap: &RecvStatsSnapshot, config: &RecvConfig) -> String {
    serde_json::to_string_pretty(&JsonSummary { interface: &config.interface, stats: snap })
        .unwrap_or_else(|e| format!("{{\"error\": \"serialization failed: {e}\"}}"))
}

#[derive(serde::Serialize)]
struct JsonSummary<'a> {
    interface: &'a str,
    #[serde(flatten)]
    stats: &'a RecvStatsSnapshot,
}

/// Format a duration to a human-readable string.
pub fn format_duration(d: Duration) -> String {
    let ms = d.as_millis();
    if ms >= 60_000 {
        format!("{}m{:02}s", ms / 60_000, (ms % 60_000) / 1000)
    } else if ms >= 1000 {
        format!("{:.2}s", d.as_secs_f64())
    } else {
        format!("{ms}ms")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RecvPhase;
    use chrono::{TimeZone, Utc};

    fn make_snapshot() -> RecvStatsSnapshot {
        RecvStatsSnapshot {
            phase: RecvPhase::Finished,
            complete: true,
            started_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()),
            finished_at: Some(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 12).unwrap()),
            validation_passed: 8,
            validation_failed: 3,
            success_total: 5,
            success_unique: 4,
            failure_total: 3,
            filter_success: 4,
            capture_received: 11,
            ..RecvStatsSnapshot::default()
        }
    }

    fn config() -> RecvConfig {
        RecvConfig {
            interface: "eth0".into(),
            ..RecvConfig::default()
        }
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_millis(1500)), "1.50s");
        assert_eq!(format_duration(Duration::from_secs(125)), "2m05s");
    }

    #[test]
    fn test_format_pretty_header() {
        let out = format_pretty(&make_snapshot(), &config());
        assert!(out.starts_with("scanrecv "));
        assert!(out.contains("Interface eth0 (dedup: full, cooldown: 8s)"));
        assert!(out.contains("Received for 12.00s (finished)"));
    }

    #[test]
    fn test_format_pretty_counters() {
        let out = format_pretty(&make_snapshot(), &config());
        assert!(out.contains(&format!("{:<14}{:>12}{:>12}", "success", 5, 4)));
        assert!(out.contains(&format!("{:<14}{:>12}{:>12}", "failure", 3, "-")));
        assert!(out.contains("validated 8 / rejected 3 (50.00% hit rate)"));
        assert!(out.contains("4 results passed the output filter"));
        assert!(!out.contains("probe errors"), "zero counters are omitted");
    }

    #[test]
    fn test_format_pretty_notes() {
        let snap = RecvStatsSnapshot {
            ip_fragments: 2,
            output_errors: 1,
            ..make_snapshot()
        };
        let out = format_pretty(&snap, &config());
        assert!(out.contains("(2 fragments, 1 output errors)"));
    }

    #[test]
    fn test_format_json_structure() {
        let json = format_json(&make_snapshot(), &config());
        let v: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(v["interface"], "eth0");
        assert_eq!(v["phase"], "finished");
        assert_eq!(v["success_unique"], 4);
        assert_eq!(v["complete"], true);
    }
}
