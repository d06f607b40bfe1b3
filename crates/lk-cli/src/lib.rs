//! Lickometer analysis CLI library.
//!
//! This crate provides the `lick` command-line interface over `lk-core`.

mod cli;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use config::{Collaborators, Config, PhaseEntry, VolumeEntry};
