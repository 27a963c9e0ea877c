//! Multi-environment configuration

#[allow(clippy::module_inception)]
pub mod config;
pub mod environment;
pub mod registry;

pub use config::{default_config_dir, find_config_file, load_document, ConfigFile};
pub use environment::{DatabaseConfig, EnvConfig, Environment, MockConfig};
pub use registry::EnvRegistry;
