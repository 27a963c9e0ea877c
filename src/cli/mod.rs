//! Command-line interface

pub mod args;
pub mod commands;

pub use args::{Cli, Command, ImportArgs, LogFormat, RunArgs, TargetArgs};
pub use commands::execute;
