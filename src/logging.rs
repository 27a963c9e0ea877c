//! Structured logging setup
//!
//! `RUST_LOG` wins when set; otherwise the verbosity count picks the level
//! for this crate.

use tracing_subscriber::EnvFilter;

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "flowpulse=info",
        1 => "flowpulse=debug",
        _ => "flowpulse=trace",
    }
}

/// Install the global subscriber. Safe to call more than once.
pub fn init(verbosity: u8, json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbosity > 0)
        .with_writer(std::io::stderr);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Shorten a secret for log output
pub fn mask_secret(secret: &str) -> String {
    const VISIBLE: usize = 10;
    if secret.chars().count() <= VISIBLE {
        return secret.to_string();
    }
    let head: String = secret.chars().take(VISIBLE).collect();
    format!("{}...", head)
}
