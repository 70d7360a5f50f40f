//! Pulse CLI library.
//!
//! This crate provides the CLI interface for the pulse streaming engine.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands, RunArgs};
pub use config::Config;
