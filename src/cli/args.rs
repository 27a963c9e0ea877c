//! CLI argument definitions using clap

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(name = "flowpulse", version, about = "Run data-driven API test suites", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log line format on stderr
    #[arg(long = "log-format", value_name = "FORMAT", value_enum, default_value_t = LogFormat::Text, global = true)]
    pub log_format: LogFormat,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Execute one or more suite files
    Run(RunArgs),
    /// Parse suite files and check their dependencies without sending requests
    Validate {
        #[arg(value_name = "SUITE", required = true)]
        suites: Vec<PathBuf>,
    },
    /// Show the resolved environment configuration
    Env(TargetArgs),
    /// Generate a suite from an OpenAPI or Swagger document
    Import(ImportArgs),
}

/// Which environment to use and where its config lives
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Environment code (dev, test, stage, prod); falls back to $ENV, then $FLOWPULSE_PROFILE
    #[arg(short = 'e', long = "env", value_name = "NAME")]
    pub env: Option<String>,

    /// Environment config file (YAML or TOML)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[arg(value_name = "SUITE", required = true)]
    pub suites: Vec<PathBuf>,

    #[command(flatten)]
    pub target: TargetArgs,

    /// Only run cases carrying one of these tags
    #[arg(short = 't', long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Skip cases carrying any of these tags
    #[arg(long = "exclude-tag", value_name = "TAG")]
    pub exclude_tags: Vec<String>,

    /// Seed a pool variable, e.g. --var userId=42
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub vars: Vec<(String, String)>,

    /// Print the report as JSON lines
    #[arg(long = "json", action = ArgAction::SetTrue)]
    pub json: bool,

    /// Per-request timeout, e.g. 30s or 1m
    #[arg(long = "timeout", value_name = "DURATION", value_parser = humantime::parse_duration, default_value = "30s")]
    pub timeout: Duration,

    /// How often cached tokens are checked for renewal
    #[arg(long = "refresh-interval", value_name = "DURATION", value_parser = humantime::parse_duration, default_value = "60s")]
    pub refresh_interval: Duration,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Document path or http(s) URL
    #[arg(value_name = "SOURCE")]
    pub source: String,

    /// Write the suite here (.json for JSON, YAML otherwise); stdout if omitted
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Only import operations carrying one of these tags
    #[arg(short = 't', long = "tag", value_name = "TAG")]
    pub tags: Vec<String>,

    /// Also import deprecated operations
    #[arg(long = "include-deprecated", action = ArgAction::SetTrue)]
    pub include_deprecated: bool,

    /// Suite name; defaults to the document title
    #[arg(long = "name", value_name = "NAME")]
    pub name: Option<String>,

    /// Timeout when fetching a URL
    #[arg(long = "timeout", value_name = "DURATION", value_parser = humantime::parse_duration, default_value = "30s")]
    pub timeout: Duration,
}

/// Log output format
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Plain text output (default)
    #[default]
    Text,
    /// JSON Lines format for parsing
    Json,
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("empty variable name in '{}'", s));
    }
    Ok((key.to_string(), value.to_string()))
}
