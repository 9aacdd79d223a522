//! harvest-sync CLI library.
//!
//! This crate wires configuration, the ICS calendar source and the Harvest
//! client into the reconciliation engine.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Config, ConfigError, Settings};
