//! scanrecv: receive side of a stateless SYN scanner.
//!
//! Usage:
//!   scanrecv [--interface <IF>] [--ports <SPEC>] [--validation-key <HEX>] [--summary json|pretty]
//!   scanrecv --config recv.json --send-duration-secs 30

use clap::Parser;
use scanrecv::cli::{self, Cli, OutputFmt};
use tracing_subscriber::EnvFilter;

fn main() {
    // Initialise logging (RUST_LOG=debug etc.)
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Cli::parse();

    match cli::run_listen(&args) {
        Ok((config, snapshot)) => match args.summary {
            OutputFmt::Pretty => eprint!("{}", cli::format_pretty(&snapshot, &config)),
            OutputFmt::Json => eprintln!("{}", cli::format_json(&snapshot, &config)),
        },
        Err(e) => {
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }
}
