//! vla-infer
//!
//! Command-line driver: parses arguments, merges them with the optional YAML
//! config file, and runs one prediction through a `ModelFactory` backend.

pub mod cli;
pub mod config;
pub mod driver;

pub use cli::{Cli, Commands, RunArgs};
pub use config::AppConfig;
pub use driver::{Driver, IMAGE_REQUIRED, VERSION_STRING};
