//! The `editor` binary: one collaborative peer.
//!
//! ```text
//! editor <user_id>
//! ```
//!
//! Exit codes: 0 normal, 1 bad usage, 2 registry or queue open failure,
//! 3 registry full, 4 document access failure.

use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use synctext::config::PeerConfig;
use synctext::peer::Peer;
use synctext::render::TermDisplay;
use synctext::userid::UserId;

#[derive(Parser, Debug)]
#[command(name = "editor", about = "SyncText collaborative editor peer")]
struct Cli {
    /// Participant identifier (filesystem-safe, at most 31 bytes).
    user_id: String,
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let user_id = match UserId::parse(&cli.user_id) {
        Ok(id) => id,
        Err(e) => {
            eprintln!("invalid user id: {e}");
            return ExitCode::from(1);
        }
    };

    let shutdown = Arc::new(AtomicBool::new(false));
    for sig in [signal_hook::consts::SIGINT, signal_hook::consts::SIGTERM] {
        if let Err(e) = signal_hook::flag::register(sig, shutdown.clone()) {
            eprintln!("cannot install signal handler: {e}");
            return ExitCode::from(2);
        }
    }

    let peer = match Peer::bootstrap(
        user_id,
        PeerConfig::default(),
        shutdown.clone(),
        Box::new(TermDisplay::new()),
    ) {
        Ok(peer) => peer,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    peer.run();
    ExitCode::SUCCESS
}
