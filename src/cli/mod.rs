//! CLI entrypoint for scanrecv.
//!
//! Builds a [`RecvConfig`] from an optional JSON file plus flags, discovers the
//! capture interface, runs the receive loop on its own thread, and formats
//! the final counters.

pub mod output;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};

use crate::config::{DedupMethod, RecvConfig};
use crate::output::json::JsonLinesOutput;
use crate::output::OutputModule;
use crate::probe::TcpSynProbe;
use crate::recv::{Handshake, Receiver, ScanContext};
use crate::state::{RecvStatsSnapshot, SendState};
use crate::validate::Validator;
use crate::{gateway, PortSpec};

pub use output::{format_json, format_pretty};

// ─────────────────────────────────────────────────────────────────────────────
// CLI definition
// ─────────────────────────────────────────────────────────────────────────────

/// scanrecv: receive side of a stateless SYN scanner.
#[derive(Parser, Debug)]
#[command(name = "scanrecv", version, about)]
#[command(
    long_about = "Captures responses to stateless SYN probes, validates them against a keyed \
    token, suppresses duplicates, and writes one JSON record per accepted response. \
    Requires CAP_NET_RAW (sudo) on Linux."
)]
pub struct Cli {
    /// JSON config file; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Capture interface (auto-detect from routing table if omitted)
    #[arg(short, long)]
    pub interface: Option<String>,

    /// Probed destination ports: "80", "1-1024", "80,443,8080"
    #[arg(short = 'p', long)]
    pub ports: Option<String>,

    /// Source-port range used by the sender
    #[arg(long, default_value = "32768-61000")]
    pub source_ports: String,

    /// Hex-encoded 32-byte validation key shared with the sender
    #[arg(long)]
    pub validation_key: Option<String>,

    /// Seconds to keep receiving after the sender finishes
    #[arg(long)]
    pub cooldown_secs: Option<u64>,

    /// Stop after this many filtered results (0 = unlimited)
    #[arg(long)]
    pub max_results: Option<u64>,

    /// Duplicate suppression method
    #[arg(long, value_enum)]
    pub dedup: Option<DedupArg>,

    /// Capacity of the window dedup cache
    #[arg(long)]
    pub dedup_window_size: Option<usize>,

    /// Pass failures and repeats to the output module
    #[arg(long)]
    pub output_all: bool,

    /// Output filter expression, e.g. "success = 1 && repeat = 0"
    #[arg(long)]
    pub filter: Option<String>,

    /// Comma-separated output fields (all fields if omitted)
    #[arg(long)]
    pub output_fields: Option<String>,

    /// Write records here instead of stdout
    #[arg(short, long)]
    pub output_file: Option<PathBuf>,

    /// Capture IP packets without link-layer headers
    #[arg(long)]
    pub ip_only: bool,

    /// Run the lifecycle without opening a capture
    #[arg(long)]
    pub dry_run: bool,

    /// Mark the send side complete after this many seconds
    #[arg(long, default_value = "0")]
    pub send_duration_secs: u64,

    /// Summary format
    #[arg(long, default_value = "pretty", value_enum)]
    pub summary: OutputFmt,
}

/// Dedup method argument.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DedupArg {
    Full,
    Window,
    #[value(name = "none")]
    Off,
}

impl From<DedupArg> for DedupMethod {
    fn from(d: DedupArg) -> Self {
        match d {
            DedupArg::Full => DedupMethod::Full,
            DedupArg::Window => DedupMethod::Window,
            DedupArg::Off => DedupMethod::None,
        }
    }
}

/// Summary format argument.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFmt {
    #[default]
    Pretty,
    Json,
}

impl Cli {
    /// Merge the config file (if any) with flag overrides.
    pub fn build_config(&self) -> Result<RecvConfig, String> {
        let mut config = match &self.config {
            Some(path) => RecvConfig::from_json_file(path).map_err(|e| e.to_string())?,
            None => RecvConfig::default(),
        };
        if let Some(iface) = &self.interface {
            config.interface = iface.clone();
        }
        if let Some(ports) = &self.ports {
            config.target_ports = PortSpec::parse(ports)
                .map_err(|e| format!("invalid --ports '{ports}': {e}"))?
                .expand();
        }
        if let Some(v) = self.cooldown_secs {
            config.cooldown_secs = v;
        }
        if let Some(v) = self.max_results {
            config.max_results = v;
        }
        if let Some(d) = self.dedup {
            config.dedup_method = d.into();
        }
        if let Some(v) = self.dedup_window_size {
            config.dedup_window_size = v;
        }
        if self.output_all {
            config.default_mode = false;
        }
        if let Some(f) = &self.filter {
            config.filter = Some(f.clone());
        }
        if let Some(fields) = &self.output_fields {
            config.output_fields = fields
                .split(',')
                .map(str::trim)
                .filter(|f| !f.is_empty())
                .map(String::from)
                .collect();
        }
        if self.ip_only {
            config.send_ip_pkts = true;
            config.data_link_size = 0;
        }
        if self.dry_run {
            config.dryrun = true;
        }
        config.validate().map_err(|e| e.to_string())?;
        Ok(config)
    }

    /// Source-port range as `(first, last)`.
    pub fn source_port_range(&self) -> Result<(u16, u16), String> {
        PortSpec::parse(&self.source_ports)
            .map_err(|e| format!("invalid --source-ports '{}': {e}", self.source_ports))?
            .bounds()
            .ok_or_else(|| "empty --source-ports".to_string())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Listen driver
// ─────────────────────────────────────────────────────────────────────────────

/// Run the receiver until it finishes and return its final counters.
///
/// The send side is driven by a timer: it is marked complete
/// `--send-duration-secs` after the receiver signals readiness.
pub fn run_listen(cli: &Cli) -> Result<(RecvConfig, RecvStatsSnapshot), String> {
    let mut config = cli.build_config()?;
    if config.interface.is_empty() {
        config.interface =
            gateway::default_interface().map_err(|e| format!("interface detection failed: {e}"))?;
    }
    let net = gateway::discover(&config.interface, config.send_ip_pkts)
        .map_err(|e| format!("network discovery failed: {e}"))?;
    tracing::info!(
        interface = %net.interface,
        ip = %net.ipv4,
        gateway = %net.gateway,
        mac = %net.hw_addr.as_ref().map(gateway::format_mac).unwrap_or_else(|| "-".into()),
        "capture interface"
    );

    let validator = match &cli.validation_key {
        Some(hex) => Validator::from_hex_key(hex).map_err(|e| e.to_string())?,
        None => {
            tracing::warn!("no --validation-key given; using a random key");
            Validator::new()
        }
    };
    let (first, last) = cli.source_port_range()?;
    let probe = Box::new(TcpSynProbe::new(first, last));
    let output: Box<dyn OutputModule> = match &cli.output_file {
        Some(path) => Box::new(JsonLinesOutput::create(path).map_err(|e| e.to_string())?),
        None => Box::new(JsonLinesOutput::stdout()),
    };

    let send = Arc::new(SendState::new());
    let ctx = ScanContext::new(
        config.clone(),
        Arc::new(validator),
        probe,
        Some(output),
        Arc::clone(&send),
    )
    .map_err(|e| e.to_string())?;
    let capture = open_capture(&config)?;
    let mut receiver = Receiver::new(ctx, capture);

    let handshake = Arc::new(Handshake::new());
    let thread = {
        let handshake = Arc::clone(&handshake);
        std::thread::Builder::new()
            .name("recv".into())
            .spawn(move || receiver.run(&handshake))
            .map_err(|e| format!("failed to spawn receive thread: {e}"))?
    };

    // A failed start-up never signals readiness; stop waiting once the thread exits.
    while !handshake.wait_ready(Some(Duration::from_millis(100))) {
        if thread.is_finished() {
            break;
        }
    }
    if handshake.is_ready() {
        let deadline = Instant::now() + Duration::from_secs(cli.send_duration_secs);
        while Instant::now() < deadline && !thread.is_finished() {
            std::thread::sleep(Duration::from_millis(50));
        }
        send.mark_complete();
        tracing::info!("send side complete");
    }

    let snapshot = thread
        .join()
        .map_err(|_| "receive thread panicked".to_string())?
        .map_err(|e| e.to_string())?;
    Ok((config, snapshot))
}

#[cfg(target_os = "linux")]
fn open_capture(config: &RecvConfig) -> Result<Box<dyn crate::capture::CaptureSource>, String> {
    use crate::capture::AfPacketCapture;
    Ok(Box::new(AfPacketCapture::new(
        config.interface.clone(),
        config.send_ip_pkts,
    )))
}

#[cfg(not(target_os = "linux"))]
fn open_capture(config: &RecvConfig) -> Result<Box<dyn crate::capture::CaptureSource>, String> {
    if config.dryrun {
        return Ok(Box::new(crate::capture::MockCapture::new()));
    }
    Err(crate::capture::CaptureError::Unsupported.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        let mut argv = vec!["scanrecv"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap()
    }

    #[test]
    fn test_defaults_match_config_defaults() {
        let cli = parse(&[]);
        let config = cli.build_config().unwrap();
        let defaults = RecvConfig::default();
        assert_eq!(config.cooldown_secs, defaults.cooldown_secs);
        assert_eq!(config.dedup_method, DedupMethod::Full);
        assert!(config.default_mode);
        assert_eq!(cli.source_port_range().unwrap(), (32768, 61000));
        assert_eq!(cli.summary, OutputFmt::Pretty);
    }

    #[test]
    fn test_flags_override_config() {
        let cli = parse(&[
            "-i",
            "eth1",
            "--ports",
            "443,80",
            "--dedup",
            "window",
            "--dedup-window-size",
            "10",
            "--max-results",
            "5",
            "--output-all",
            "--output-fields",
            "saddr, sport,success",
            "--ip-only",
        ]);
        let config = cli.build_config().unwrap();
        assert_eq!(config.interface, "eth1");
        assert_eq!(config.target_ports, vec![80, 443]);
        assert_eq!(config.dedup_method, DedupMethod::Window);
        assert_eq!(config.dedup_window_size, 10);
        assert_eq!(config.max_results, 5);
        assert!(!config.default_mode);
        assert_eq!(config.output_fields, vec!["saddr", "sport", "success"]);
        assert!(config.send_ip_pkts);
        assert_eq!(config.data_link_size, 0);
    }

    #[test]
    fn test_invalid_window_rejected() {
        let cli = parse(&["--dedup", "window", "--dedup-window-size", "0"]);
        assert!(cli.build_config().is_err());
    }

    #[test]
    fn test_invalid_ports_rejected() {
        assert!(parse(&["--ports", "1-x"]).build_config().is_err());
        assert!(parse(&["--source-ports", "9-1"]).source_port_range().is_err());
    }

    #[test]
    fn test_config_file_then_flags() {
        let path = std::env::temp_dir().join(format!("scanrecv-cli-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"cooldown_secs": 3, "dedup_method": "none"}"#).unwrap();
        let cli = parse(&["--config", path.to_str().unwrap(), "--cooldown-secs", "1"]);
        let config = cli.build_config().unwrap();
        std::fs::remove_file(&path).ok();
        assert_eq!(config.cooldown_secs, 1);
        assert_eq!(config.dedup_method, DedupMethod::None);
    }

    #[test]
    fn test_dedup_arg_conversion() {
        assert_eq!(DedupMethod::from(DedupArg::Off), DedupMethod::None);
        assert_eq!(DedupMethod::from(DedupArg::Full), DedupMethod::Full);
    }

    #[test]
    fn test_run_listen_unknown_interface_fails() {
        let cli = parse(&["-i", "nonexistent-if0", "--dry-run"]);
        let err = run_listen(&cli).unwrap_err();
        assert!(err.starts_with("network discovery failed"), "{err}");
    }
}
