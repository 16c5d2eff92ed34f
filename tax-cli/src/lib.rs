//! Command-line front end for the net-worth tax engine: configuration,
//! logging setup, subcommands and report rendering.

pub mod commands;
pub mod config;
pub mod logging;
pub mod report;

pub use commands::{AggregateOptions, Engine, OutputFormat};
pub use config::{AppConfig, ConfigError};
