use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};

use flowpulse::cli::{self, Cli, LogFormat};
use flowpulse::status::ExitStatus;
use flowpulse::{logging, signals};

/// Entry point - catches Ctrl+C and dispatches the subcommand
///
/// Returns ExitStatus directly, which implements std::process::Termination.
fn main() -> ExitStatus {
    // The handler only sets a flag so running cases can wind down and
    // the token scheduler can be stopped cleanly
    ctrlc::set_handler(move || {
        signals::set_interrupted();
        eprintln!("\nInterrupted");

        // Second Ctrl+C: force exit
        static SECOND_CTRL_C: AtomicBool = AtomicBool::new(false);
        if SECOND_CTRL_C.swap(true, Ordering::SeqCst) {
            std::process::exit(ExitStatus::Interrupted as i32);
        }
    })
    .ok();

    let args = Cli::parse();
    logging::init(args.verbose, args.log_format == LogFormat::Json);

    let status = match cli::execute(&args) {
        Ok(status) => status,
        Err(e) => {
            eprintln!("flowpulse: {:#}", e);
            ExitStatus::Error
        }
    };

    if signals::was_interrupted() {
        return ExitStatus::Interrupted;
    }
    status
}
